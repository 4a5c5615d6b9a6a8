use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::common::{PageId, RecordId, PAGE_SIZE};

use super::b_plus_tree_page::{
    read_u32, shift_entries, slot_capacity, write_u32, IndexPageType, TreePage, TreePageMut,
    NEXT_PAGE_ID_OFFSET, TREE_PAGE_HEADER_SIZE,
};
use super::key_comparator::{IndexKey, KeyComparator};

/// View of a leaf page: sorted `(key, record id)` entries plus a link to the
/// next leaf.
///
/// `B` is the page buffer, borrowed from a page guard: `&[u8]` for reading,
/// `&mut [u8]` for writing.
pub struct LeafPage<B, K> {
    data: B,
    _key: PhantomData<K>,
}

impl<B, K: IndexKey> LeafPage<B, K> {
    pub const ENTRY_SIZE: usize = K::SIZE + RecordId::ENCODED_SIZE;

    /// Largest usable max size. One slot stays free for the entry that
    /// overflows a full leaf right before it splits.
    pub const MAX_SIZE_LIMIT: usize = slot_capacity(Self::ENTRY_SIZE) - 1;

    fn entry_offset(index: usize) -> usize {
        TREE_PAGE_HEADER_SIZE + index * Self::ENTRY_SIZE
    }
}

impl<B: AsRef<[u8]>, K: IndexKey> TreePage for LeafPage<B, K> {
    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: IndexKey> TreePageMut for LeafPage<B, K> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

impl<B: AsRef<[u8]>, K: IndexKey> LeafPage<B, K> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self {
            data,
            _key: PhantomData,
        }
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(read_u32(self.bytes(), NEXT_PAGE_ID_OFFSET))
    }

    pub fn key_at(&self, index: usize) -> K {
        let offset = Self::entry_offset(index);
        K::decode(&self.bytes()[offset..offset + K::SIZE])
    }

    pub fn value_at(&self, index: usize) -> RecordId {
        let offset = Self::entry_offset(index) + K::SIZE;
        RecordId::decode(&self.bytes()[offset..offset + RecordId::ENCODED_SIZE])
    }

    pub fn item(&self, index: usize) -> (K, RecordId) {
        (self.key_at(index), self.value_at(index))
    }

    /// First index whose key is >= `key`; `size()` if there is none.
    pub fn key_index<C: KeyComparator<K>>(&self, key: &K, comparator: &C) -> usize {
        let mut left = 0;
        let mut right = self.size();

        while left < right {
            let mid = left + (right - left) / 2;
            if comparator.compare(&self.key_at(mid), key) == Ordering::Less {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        left
    }

    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, comparator: &C) -> Option<RecordId> {
        let index = self.key_index(key, comparator);
        if index < self.size() && comparator.compare(&self.key_at(index), key) == Ordering::Equal {
            Some(self.value_at(index))
        } else {
            None
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: IndexKey> LeafPage<B, K> {
    pub fn init(&mut self, page_id: PageId, parent_page_id: PageId, max_size: usize) {
        assert!(max_size <= Self::MAX_SIZE_LIMIT, "leaf max size {max_size} does not fit a page");
        self.init_header(IndexPageType::Leaf, page_id, parent_page_id, max_size);
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        write_u32(self.bytes_mut(), NEXT_PAGE_ID_OFFSET, page_id.as_u32());
    }

    fn set_entry(&mut self, index: usize, key: &K, value: RecordId) {
        let offset = Self::entry_offset(index);
        let data = self.bytes_mut();
        key.encode(&mut data[offset..offset + K::SIZE]);
        value.encode(&mut data[offset + K::SIZE..offset + Self::ENTRY_SIZE]);
    }

    /// Inserts in key order. Returns false, changing nothing, if the key is
    /// already present.
    ///
    /// A leaf may briefly hold `max_size + 1` entries; the caller splits it.
    pub fn insert<C: KeyComparator<K>>(
        &mut self,
        key: &K,
        value: RecordId,
        comparator: &C,
    ) -> bool {
        let size = self.size();
        let index = self.key_index(key, comparator);
        if index < size && comparator.compare(&self.key_at(index), key) == Ordering::Equal {
            return false;
        }
        assert!(size <= self.max_size(), "leaf {} overflowed", self.page_id());

        shift_entries(self.bytes_mut(), Self::ENTRY_SIZE, index, size, 1);
        self.set_entry(index, key, value);
        self.set_size(size + 1);
        true
    }

    /// Removes `key` if present.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, comparator: &C) -> bool {
        let size = self.size();
        let index = self.key_index(key, comparator);
        if index >= size || comparator.compare(&self.key_at(index), key) != Ordering::Equal {
            return false;
        }

        shift_entries(self.bytes_mut(), Self::ENTRY_SIZE, index + 1, size, -1);
        self.set_size(size - 1);
        true
    }

    /// Appends entries `[from, to)` of this page to `recipient`.
    fn copy_range_to<R>(&self, from: usize, to: usize, recipient: &mut LeafPage<R, K>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let dest_size = recipient.size();
        let src = &self.bytes()[Self::entry_offset(from)..Self::entry_offset(to)];
        let dest = Self::entry_offset(dest_size);
        recipient.bytes_mut()[dest..dest + src.len()].copy_from_slice(src);
        recipient.set_size(dest_size + to - from);
    }

    /// Split: keeps the first `size / 2` entries and moves the rest to the
    /// empty `recipient`, which is linked in as the next leaf.
    pub fn move_half_to<R>(&mut self, recipient: &mut LeafPage<R, K>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let keep = size / 2;
        debug_assert_eq!(recipient.size(), 0);

        self.copy_range_to(keep, size, recipient);
        self.set_size(keep);

        recipient.set_next_page_id(self.next_page_id());
        self.set_next_page_id(recipient.page_id());
    }

    /// Merge: appends every entry to `recipient`, the left neighbour, which
    /// takes over this page's next link.
    pub fn move_all_to<R>(&mut self, recipient: &mut LeafPage<R, K>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        self.copy_range_to(0, size, recipient);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Gives the first entry to `recipient`, the left neighbour.
    pub fn move_first_to_end_of<R>(&mut self, recipient: &mut LeafPage<R, K>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        self.copy_range_to(0, 1, recipient);
        shift_entries(self.bytes_mut(), Self::ENTRY_SIZE, 1, size, -1);
        self.set_size(size - 1);
    }

    /// Gives the last entry to `recipient`, the right neighbour.
    pub fn move_last_to_front_of<R>(&mut self, recipient: &mut LeafPage<R, K>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let (key, value) = self.item(size - 1);
        let dest_size = recipient.size();

        shift_entries(recipient.bytes_mut(), Self::ENTRY_SIZE, 0, dest_size, 1);
        recipient.set_entry(0, &key, value);
        recipient.set_size(dest_size + 1);
        self.set_size(size - 1);
    }
}
