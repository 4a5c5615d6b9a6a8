use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::common::{
    BurrowError, FrameId, PageId, Result, DEFAULT_BUCKET_SIZE, HEADER_PAGE_ID, PAGE_SIZE,
};
use crate::storage::disk::PageStore;

use super::{
    ExtendibleHashTable, FrameHeader, LruReplacer, PinnedPage, ReadPageGuard, WritePageGuard,
};

/// Bookkeeping guarded by the pool lock
struct PoolInner {
    /// Page directory: maps page IDs to frame IDs
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Frames that hold no page
    free_list: VecDeque<FrameId>,
}

/// Internal state that can be shared with outstanding page guards
struct BufferPoolState {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// The pool lock. Held for the duration of each pool operation, never
    /// while waiting on a page latch.
    inner: Mutex<PoolInner>,
    /// Unpinned frames in eviction order; only touched under `inner`
    replacer: LruReplacer,
    store: Arc<dyn PageStore>,
}

impl BufferPoolState {
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();

        let Some(frame_id) = inner.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];

        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.unpin(frame_id);
                }
                true
            }
        }
    }

    /// Takes a frame off the free list, or evicts the least recently unpinned
    /// page, writing it back first if it is dirty.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(BurrowError::BufferPoolFull)?;
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let data = frame.data.read();
            if let Err(e) = self.store.write_page(old_page_id, &data[..]) {
                drop(data);
                self.replacer.unpin(frame_id);
                return Err(e);
            }
        }

        trace!("evicting {} from {}", old_page_id, frame_id);
        inner.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}

/// BufferPoolManager caches a fixed number of pages in memory on top of a
/// [`PageStore`].
///
/// Callers pin pages through [`fetch_page`](Self::fetch_page) and
/// [`new_page`](Self::new_page); the returned guards unpin on drop. A pinned
/// page is never evicted.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    state: Arc<BufferPoolState>,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size over `store`.
    pub fn new(pool_size: usize, store: Arc<dyn PageStore>) -> Self {
        Self::with_bucket_size(pool_size, DEFAULT_BUCKET_SIZE, store)
    }

    /// Like [`new`](Self::new), with an explicit page directory bucket size.
    pub fn with_bucket_size(
        pool_size: usize,
        bucket_size: usize,
        store: Arc<dyn PageStore>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            frames.push(Arc::new(FrameHeader::new()));
            free_list.push_back(FrameId::new(i as u32));
        }

        let state = Arc::new(BufferPoolState {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: ExtendibleHashTable::new(bucket_size),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
            store,
        });

        Self { pool_size, state }
    }

    fn make_pinned(&self, page_id: PageId, frame_id: FrameId) -> PinnedPage {
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let state = Arc::clone(&self.state);
        PinnedPage::new(
            page_id,
            frame,
            Box::new(move |pid, is_dirty| {
                state.unpin_page(pid, is_dirty);
            }),
        )
    }

    /// Pins `page_id`, reading it from the page store if it is not resident.
    ///
    /// Fails with [`BurrowError::BufferPoolFull`] when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PinnedPage> {
        if !page_id.is_valid() {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let mut inner = self.state.inner.lock();

        if let Some(frame_id) = inner.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin() == 1 {
                self.state.replacer.pin(frame_id);
            }
            trace!("hit {} in {}", page_id, frame_id);
            return Ok(self.make_pinned(page_id, frame_id));
        }

        let frame_id = self.state.acquire_frame(&mut inner)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        {
            let mut data = frame.data.write();
            if let Err(e) = self.state.store.read_page(page_id, &mut data[..]) {
                inner.free_list.push_back(frame_id);
                return Err(e);
            }
        }

        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        trace!("miss {}, loaded into {}", page_id, frame_id);

        Ok(self.make_pinned(page_id, frame_id))
    }

    /// Fetches a page and takes its shared latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        self.fetch_page(page_id).map(PinnedPage::read)
    }

    /// Fetches a page and takes its exclusive latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.fetch_page(page_id).map(PinnedPage::write)
    }

    /// Allocates a fresh page id and pins a zeroed frame for it.
    ///
    /// No page id is allocated when every frame is pinned.
    pub fn new_page(&self) -> Result<PinnedPage> {
        let mut inner = self.state.inner.lock();

        let frame_id = self.state.acquire_frame(&mut inner)?;
        let page_id = match self.state.store.allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                inner.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.reset_memory();
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        trace!("new {} in {}", page_id, frame_id);

        Ok(self.make_pinned(page_id, frame_id))
    }

    /// Allocates a new page and takes its exclusive latch.
    pub fn new_page_write(&self) -> Result<WritePageGuard> {
        self.new_page().map(PinnedPage::write)
    }

    /// Applies `f` to the bytes of `page_id`, leaving the page dirty.
    ///
    /// A resident page is changed in its frame under the exclusive latch. A
    /// page that is not resident is patched in the store while the pool lock
    /// keeps it from being loaded, so no frame is needed and this never fails
    /// with [`BurrowError::BufferPoolFull`].
    pub fn modify_page<F>(&self, page_id: PageId, f: F) -> Result<()>
    where
        F: FnOnce(&mut [u8]),
    {
        if !page_id.is_valid() {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let inner = self.state.inner.lock();

        if let Some(frame_id) = inner.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin() == 1 {
                self.state.replacer.pin(frame_id);
            }
            let pin = self.make_pinned(page_id, frame_id);
            drop(inner);

            let mut guard = pin.write();
            f(guard.data_mut());
            return Ok(());
        }

        let mut data = vec![0u8; PAGE_SIZE];
        self.state.store.read_page(page_id, &mut data)?;
        f(&mut data);
        self.state.store.write_page(page_id, &data)?;
        trace!("patched {} in the store", page_id);
        Ok(())
    }

    /// Releases one pin on `page_id`, OR-ing in the dirty flag.
    ///
    /// Returns false if the page is not resident or not pinned. Page guards
    /// call this on drop; calling it by hand while a guard is alive breaks
    /// the pin accounting.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin_page(page_id, is_dirty)
    }

    /// Writes a resident page back to the store if it is dirty.
    /// Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let inner = self.state.inner.lock();
        let Some(frame_id) = inner.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);

        if frame.pin_count() == 0 {
            // No guard exists, so the latch is free.
            if frame.is_dirty() {
                self.state.store.write_page(page_id, &frame.data.read()[..])?;
                frame.set_dirty(false);
            }
            return Ok(true);
        }

        // Someone holds the page; wait for its latch outside the pool lock.
        frame.pin();
        let pin = self.make_pinned(page_id, frame_id);
        drop(inner);

        let guard = pin.read();
        if frame.is_dirty() {
            self.state.store.write_page(page_id, guard.data())?;
            frame.set_dirty(false);
        }
        Ok(true)
    }

    /// Flushes all resident pages to the store.
    pub fn flush_all_pages(&self) -> Result<()> {
        let resident: Vec<PageId> = {
            let inner = self.state.inner.lock();
            inner.page_table.iter().map(|(&page_id, _)| page_id).collect()
        };

        for page_id in resident {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drops a page from the pool and returns its id to the store.
    ///
    /// Returns false, leaving everything untouched, if the page is pinned.
    /// The header page and invalid ids are refused with
    /// [`BurrowError::InvalidPageId`]; ids the store never allocated are
    /// refused by the store.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() || page_id == HEADER_PAGE_ID {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let mut inner = self.state.inner.lock();

        if let Some(frame_id) = inner.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin_count() > 0 {
                warn!(
                    "cannot delete {}: pinned {} times",
                    page_id,
                    frame.pin_count()
                );
                return Ok(false);
            }

            self.state.store.deallocate_page(page_id)?;
            inner.page_table.remove(&page_id);
            self.state.replacer.pin(frame_id);
            frame.reset();
            inner.free_list.push_back(frame_id);
        } else {
            self.state.store.deallocate_page(page_id)?;
        }

        debug!("deleted {}", page_id);
        Ok(true)
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the dirty flag for a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].is_dirty())
    }

    /// True when no frame is pinned.
    pub fn all_unpinned(&self) -> bool {
        let _inner = self.state.inner.lock();
        self.state.frames.iter().all(|frame| frame.pin_count() == 0)
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of frames holding no page.
    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_list.len()
    }

    /// Returns the number of frames that could be evicted right now.
    pub fn evictable_count(&self) -> usize {
        let _inner = self.state.inner.lock();
        self.state.replacer.size()
    }

    pub fn page_store(&self) -> &Arc<dyn PageStore> {
        &self.state.store
    }
}
