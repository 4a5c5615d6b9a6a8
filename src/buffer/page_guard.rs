use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock};

use crate::common::PageId;

use super::{FrameHeader, PageData};

/// Callback that returns a pin to the buffer pool
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// A pin on a resident page, without its latch.
///
/// While this value is alive the page cannot be evicted. Dropping it unpins
/// the page, passing along whether it was marked dirty. Convert it with
/// [`PinnedPage::read`] or [`PinnedPage::write`] to access the bytes.
pub struct PinnedPage {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    release_callback: Option<ReleaseCallback>,
    is_dirty: bool,
}

impl PinnedPage {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            page_id,
            frame,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Reports the page as modified when the pin is released.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Blocks until the shared page latch is available.
    pub fn read(self) -> ReadPageGuard {
        let data_guard = self.frame.data.read_arc();
        ReadPageGuard {
            data_guard,
            pin: self,
        }
    }

    /// Blocks until the exclusive page latch is available.
    pub fn write(self) -> WritePageGuard {
        let data_guard = self.frame.data.write_arc();
        WritePageGuard {
            data_guard,
            pin: self,
        }
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// RAII guard for read-only access to a page.
/// Releases the latch and then the pin when dropped.
pub struct ReadPageGuard {
    // Declared before `pin` so the latch is released first.
    data_guard: ArcRwLockReadGuard<RawRwLock, PageData>,
    pin: PinnedPage,
}

impl ReadPageGuard {
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

/// RAII guard for read-write access to a page.
/// Marks the page dirty if it was mutated, then releases latch and pin on drop.
pub struct WritePageGuard {
    data_guard: ArcRwLockWriteGuard<RawRwLock, PageData>,
    pin: PinnedPage,
}

impl WritePageGuard {
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard[..]
    }

    /// Returns a mutable reference to the page data.
    /// Automatically marks the page as dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pin.is_dirty = true;
        &mut self.data_guard[..]
    }

    pub fn is_dirty(&self) -> bool {
        self.pin.is_dirty
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}
