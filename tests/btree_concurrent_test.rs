//! Multi-threaded B+Tree workloads

use std::sync::{Arc, Barrier};
use std::thread;

use burrow::buffer::BufferPoolManager;
use burrow::common::{PageId, RecordId, SlotId};
use burrow::index::{BPlusTree, NaturalComparator};
use burrow::storage::disk::DiskManager;
use rand::seq::SliceRandom;
use rand::thread_rng;
use tempfile::NamedTempFile;

type Tree = BPlusTree<i64, NaturalComparator>;

fn create_tree(pool_size: usize) -> (Arc<Tree>, Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    let tree = Tree::with_max_sizes("concurrent", bpm.clone(), NaturalComparator, 4, 4).unwrap();
    (Arc::new(tree), bpm, temp_file)
}

fn rid(key: i64) -> RecordId {
    RecordId::new(PageId::new(key as u32), SlotId::new(0))
}

fn collect_keys(tree: &Tree) -> Vec<i64> {
    tree.begin().unwrap().map(|r| r.unwrap().0).collect()
}

#[test]
fn test_concurrent_inserts_disjoint_keys() {
    let (tree, bpm, _temp) = create_tree(256);
    let threads = 8;
    let per_thread = 250;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let mut keys: Vec<i64> = (0..per_thread).map(|i| i * threads + t).collect();
                keys.shuffle(&mut thread_rng());
                for key in keys {
                    assert!(tree.insert(&key, rid(key)).unwrap());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    tree.validate().unwrap();
    assert_eq!(collect_keys(&tree), (0..threads * per_thread).collect::<Vec<_>>());
    assert!(bpm.all_unpinned());
}

#[test]
fn test_concurrent_same_key_inserted_once() {
    let (tree, _bpm, _temp) = create_tree(256);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || (0..200).filter(|k| tree.insert(k, rid(*k)).unwrap()).count())
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 200);
    tree.validate().unwrap();
}

#[test]
fn test_concurrent_removes() {
    let (tree, bpm, _temp) = create_tree(256);
    for key in 0..2000 {
        tree.insert(&key, rid(key)).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                // Each thread removes its residue class except multiples of 5
                let mut keys: Vec<i64> = (0..2000).filter(|k| k % 4 == t && k % 5 != 0).collect();
                keys.shuffle(&mut thread_rng());
                for key in keys {
                    assert!(tree.remove(&key).unwrap());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    tree.validate().unwrap();
    assert_eq!(collect_keys(&tree), (0..2000).step_by(5).collect::<Vec<_>>());
    assert!(bpm.all_unpinned());
}

#[test]
fn test_concurrent_mixed_readers_and_writers() {
    let (tree, bpm, _temp) = create_tree(256);

    // Even keys are stable and always visible to readers
    for key in (0..1000).step_by(2) {
        tree.insert(&key, rid(key)).unwrap();
    }

    let mut handles = Vec::new();
    for t in 0..3i64 {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            for round in 0..3 {
                for key in (0..1000).filter(|k| k % 2 == 1 && (k / 2) % 3 == t) {
                    if round % 2 == 0 {
                        tree.insert(&key, rid(key)).unwrap();
                    } else {
                        tree.remove(&key).unwrap();
                    }
                }
            }
        }));
    }
    for _ in 0..3 {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            for _ in 0..3 {
                for key in (0..1000).step_by(2) {
                    assert_eq!(tree.get_value(&key).unwrap(), Some(rid(key)), "lost key {}", key);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Writers finished on an insert round
    tree.validate().unwrap();
    assert_eq!(collect_keys(&tree), (0..1000).collect::<Vec<_>>());
    assert!(bpm.all_unpinned());
}

#[test]
fn test_iterators_run_alongside_writers() {
    let (tree, bpm, _temp) = create_tree(256);

    // Even keys below 2000 are never touched by the writers
    for key in 0..2000 {
        tree.insert(&key, rid(key)).unwrap();
    }

    let mut handles = Vec::new();
    {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            let mut keys: Vec<i64> = (1..2000).step_by(2).collect();
            keys.shuffle(&mut thread_rng());
            for key in keys {
                assert!(tree.remove(&key).unwrap());
            }
        }));
    }
    {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            let mut keys: Vec<i64> = (2000..4000).collect();
            keys.shuffle(&mut thread_rng());
            for key in keys {
                assert!(tree.insert(&key, rid(key)).unwrap());
            }
        }));
    }

    let mut scanners = Vec::new();
    for _ in 0..3 {
        let tree = Arc::clone(&tree);
        scanners.push(thread::spawn(move || {
            for _ in 0..5 {
                let keys: Vec<i64> = tree.begin().unwrap().map(|r| r.unwrap().0).collect();
                assert!(keys.windows(2).all(|pair| pair[0] < pair[1]), "scan out of order");
                let stable: Vec<i64> = keys
                    .iter()
                    .copied()
                    .filter(|k| k % 2 == 0 && *k < 2000)
                    .collect();
                assert_eq!(stable, (0..2000).step_by(2).collect::<Vec<_>>());

                let from: Vec<i64> =
                    tree.begin_at(&1000).unwrap().map(|r| r.unwrap().0).collect();
                assert!(from.windows(2).all(|pair| pair[0] < pair[1]));
                assert_eq!(from.first(), Some(&1000));
            }
        }));
    }

    for handle in handles.into_iter().chain(scanners) {
        handle.join().unwrap();
    }

    tree.validate().unwrap();
    let expected: Vec<i64> = (0..2000).step_by(2).chain(2000..4000).collect();
    assert_eq!(collect_keys(&tree), expected);
    assert!(bpm.all_unpinned());
}

#[test]
fn test_concurrent_open_on_empty_store() {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads as i64)
        .map(|t| {
            let bpm = Arc::clone(&bpm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let name = format!("index_{}", t);
                let tree = Tree::with_max_sizes(&name, bpm, NaturalComparator, 4, 4).unwrap();
                for key in 0..20 {
                    tree.insert(&(key * 100 + t), rid(key)).unwrap();
                }
                tree.root_page_id()
            })
        })
        .collect();

    let roots: Vec<PageId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every index kept its own root, recorded in the one header page
    for (t, root) in roots.iter().enumerate() {
        let name = format!("index_{}", t);
        let tree = Tree::with_max_sizes(&name, Arc::clone(&bpm), NaturalComparator, 4, 4).unwrap();
        assert_eq!(tree.root_page_id(), *root);
        assert_eq!(collect_keys(&tree).len(), 20);
        assert!(collect_keys(&tree).iter().all(|k| k % 100 == t as i64));
    }
    let mut distinct = roots.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), threads);
    assert!(bpm.all_unpinned());
}
