use std::sync::Arc;

use burrow::buffer::BufferPoolManager;
use burrow::common::DEFAULT_BUFFER_POOL_SIZE;
use burrow::index::{BPlusTree, NaturalComparator};
use burrow::storage::disk::DiskManager;
use burrow::{PageId, RecordId, SlotId};

fn main() {
    println!("Burrow - a buffer-pool-backed B+Tree");
    println!("====================================\n");

    let db_path = "demo.db";

    let disk_manager =
        Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(DEFAULT_BUFFER_POOL_SIZE, disk_manager.clone()));
    println!("Created buffer pool manager with {} frames\n", bpm.pool_size());

    {
        let tree =
            BPlusTree::<i64, _>::with_max_sizes("demo_pk", bpm.clone(), NaturalComparator, 4, 4)
                .expect("Failed to create index");

        for key in [50i64, 10, 40, 20, 30, 70, 60, 80, 90] {
            let rid = RecordId::new(PageId::new(key as u32), SlotId::new(0));
            tree.insert(&key, rid).expect("Failed to insert");
        }
        println!("Inserted 9 keys, tree now looks like:");
        print!("{}", tree.dump().expect("Failed to dump tree"));

        let accepted = tree
            .insert(&40, RecordId::new(PageId::new(0), SlotId::new(0)))
            .expect("Failed to insert");
        println!("\nDuplicate insert of 40 accepted: {}", accepted);

        for key in [20i64, 30, 40] {
            tree.remove(&key).expect("Failed to remove");
        }
        println!("\nAfter removing 20, 30 and 40:");
        print!("{}", tree.dump().expect("Failed to dump tree"));

        println!("\nScan of [25, 75]:");
        for (key, rid) in tree.range_scan(&25, &75).expect("Failed to scan") {
            println!("  - {} -> {}", key, rid);
        }

        tree.validate().expect("Tree failed validation");
    }

    bpm.flush_all_pages().expect("Failed to flush pages");
    println!(
        "\nFlushed to disk ({} reads, {} writes)",
        disk_manager.get_num_reads(),
        disk_manager.get_num_writes()
    );

    // Reopen by name from the header page
    let tree = BPlusTree::<i64, _>::with_max_sizes("demo_pk", bpm.clone(), NaturalComparator, 4, 4)
        .expect("Failed to reopen index");
    println!("Reopened index, root is {}", tree.root_page_id());
    println!("Lookup 60: {:?}", tree.get_value(&60).expect("Failed to look up"));

    drop(tree);
    drop(bpm);
    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
