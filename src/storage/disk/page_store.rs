use crate::common::{PageId, Result};

/// Block-level storage the buffer pool reads from and writes back to.
///
/// Every call transfers exactly one `PAGE_SIZE` block. Implementations must be
/// safe to share between threads; the buffer pool calls them while holding its
/// own lock.
pub trait PageStore: Send + Sync {
    /// Reads page `page_id` into `data`.
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()>;

    /// Writes `data` as the contents of page `page_id`.
    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()>;

    /// Hands out a page id that is not currently in use.
    fn allocate_page(&self) -> Result<PageId>;

    /// Returns `page_id` to the store for reuse.
    fn deallocate_page(&self, page_id: PageId) -> Result<()>;

    /// Number of page slots the store has ever handed out.
    fn num_pages(&self) -> u32;
}
