use parking_lot::Mutex;

use crate::common::FrameId;

/// Links for one frame slot in the eviction list.
#[derive(Debug, Clone, Copy, Default)]
struct Link {
    prev: Option<u32>,
    next: Option<u32>,
    linked: bool,
}

/// Doubly linked list over frame indices, stored as parallel arrays so that
/// erase-by-frame is O(1) without a separate index map.
#[derive(Debug)]
struct EvictionList {
    links: Vec<Link>,
    /// Least recently unpinned frame
    head: Option<u32>,
    /// Most recently unpinned frame
    tail: Option<u32>,
    len: usize,
}

impl EvictionList {
    fn new(capacity: usize) -> Self {
        Self {
            links: vec![Link::default(); capacity],
            head: None,
            tail: None,
            len: 0,
        }
    }

    fn contains(&self, idx: u32) -> bool {
        self.links[idx as usize].linked
    }

    fn push_back(&mut self, idx: u32) {
        self.links[idx as usize] = Link {
            prev: self.tail,
            next: None,
            linked: true,
        };
        match self.tail {
            Some(tail) => self.links[tail as usize].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
    }

    fn unlink(&mut self, idx: u32) {
        let Link { prev, next, .. } = self.links[idx as usize];
        match prev {
            Some(p) => self.links[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.links[n as usize].prev = prev,
            None => self.tail = prev,
        }
        self.links[idx as usize] = Link::default();
        self.len -= 1;
    }

    fn pop_front(&mut self) -> Option<u32> {
        let head = self.head?;
        self.unlink(head);
        Some(head)
    }
}

/// LRU replacement policy ordered by unpin time.
///
/// A frame becomes a candidate when its pin count drops to zero and stops
/// being one when it is pinned again. `victim` hands out the frame that has
/// been sitting unpinned the longest. Re-unpinning a frame that is already a
/// candidate does not refresh its position.
pub struct LruReplacer {
    /// Maximum number of frames the replacer can track
    max_frames: usize,
    list: Mutex<EvictionList>,
}

impl LruReplacer {
    /// Creates a replacer able to track frames `0..max_frames`.
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames,
            list: Mutex::new(EvictionList::new(max_frames)),
        }
    }

    /// Removes and returns the least recently unpinned frame.
    /// Returns None if no frame is evictable.
    pub fn victim(&self) -> Option<FrameId> {
        self.list.lock().pop_front().map(FrameId::new)
    }

    /// Marks the frame as in use. No-op if it is not a candidate.
    pub fn pin(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut list = self.list.lock();
        if list.contains(frame_id.as_u32()) {
            list.unlink(frame_id.as_u32());
        }
    }

    /// Makes the frame the most recently unpinned candidate.
    /// No-op if it is already a candidate.
    pub fn unpin(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut list = self.list.lock();
        if !list.contains(frame_id.as_u32()) {
            list.push_back(frame_id.as_u32());
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.list.lock().len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_evict_empty() {
        let replacer = LruReplacer::new(4);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_unpin_order() {
        let replacer = LruReplacer::new(8);
        for i in [3, 1, 4, 5] {
            replacer.unpin(FrameId::new(i));
        }
        assert_eq!(replacer.size(), 4);

        assert_eq!(replacer.victim(), Some(FrameId::new(3)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_lru_replacer_duplicate_unpin_keeps_position() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(0));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_replacer_pin_removes_candidate() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));

        replacer.pin(FrameId::new(1));
        replacer.pin(FrameId::new(3));
        assert_eq!(replacer.size(), 2);

        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_pin_head_and_tail() {
        let replacer = LruReplacer::new(4);
        for i in 0..4 {
            replacer.unpin(FrameId::new(i));
        }
        replacer.pin(FrameId::new(0));
        replacer.pin(FrameId::new(3));
        replacer.unpin(FrameId::new(0));

        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_ignores_out_of_range() {
        let replacer = LruReplacer::new(2);
        replacer.unpin(FrameId::new(7));
        replacer.pin(FrameId::new(7));
        assert_eq!(replacer.size(), 0);
    }
}
