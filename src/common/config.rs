use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Page reserved for the index root-pointer directory
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Default number of entries a page directory bucket holds before it splits
pub const DEFAULT_BUCKET_SIZE: usize = 8;

/// Fixed width of an index name in the header page
pub const INDEX_NAME_SIZE: usize = 32;
