//! Burrow - a buffer-pool-backed B+Tree index in Rust
//!
//! Pages live on disk and are cached in a fixed number of in-memory frames.
//! A concurrent B+Tree index is built on top of the cache, with every tree
//! node stored in one page.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): disk I/O and on-page layouts
//!   - `DiskManager`: reads, writes and allocates fixed-size pages in a file
//!   - `PageStore`: the trait the buffer pool talks to
//!   - `HeaderPage`: maps index names to their root page ids
//!
//! - **Buffer Pool** (`buffer`): memory management for pages
//!   - `BufferPoolManager`: pins pages into frames, evicting when needed
//!   - `LruReplacer`: evicts the least recently unpinned frame
//!   - `ExtendibleHashTable`: the page id to frame id directory
//!   - `PinnedPage`/`ReadPageGuard`/`WritePageGuard`: RAII pins and latches
//!
//! - **Index** (`index`): B+Tree over fixed-width keys
//!   - `BPlusTree`: insert, remove and lookup with latch crabbing
//!   - `LeafPage`/`InternalPage`: node views over raw page bytes
//!   - `IndexIterator`: ordered scan, one latched leaf at a time
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use burrow::buffer::BufferPoolManager;
//! use burrow::index::{BPlusTree, NaturalComparator};
//! use burrow::storage::disk::DiskManager;
//! use burrow::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let tree = BPlusTree::<i64, _>::new("orders_pk", bpm.clone(), NaturalComparator).unwrap();
//! tree.insert(&42, RecordId::new(PageId::new(7), SlotId::new(3))).unwrap();
//! assert!(tree.get_value(&42).unwrap().is_some());
//!
//! bpm.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{BurrowError, PageId, RecordId, Result, SlotId};
