use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::common::{PageId, PAGE_SIZE};

use super::b_plus_tree_page::{
    read_u32, shift_entries, slot_capacity, write_u32, IndexPageType, TreePage, TreePageMut,
    TREE_PAGE_HEADER_SIZE,
};
use super::key_comparator::{IndexKey, KeyComparator};

const CHILD_SIZE: usize = 4;

/// View of an internal page: `size` children, each paired with the
/// separator key that bounds its subtree from below.
///
/// The key in slot 0 is unused; child 0 holds everything below key 1.
pub struct InternalPage<B, K> {
    data: B,
    _key: PhantomData<K>,
}

impl<B, K: IndexKey> InternalPage<B, K> {
    pub const ENTRY_SIZE: usize = K::SIZE + CHILD_SIZE;

    /// Largest usable max size, keeping one slot for the overflow entry.
    pub const MAX_SIZE_LIMIT: usize = slot_capacity(Self::ENTRY_SIZE) - 1;

    fn entry_offset(index: usize) -> usize {
        TREE_PAGE_HEADER_SIZE + index * Self::ENTRY_SIZE
    }
}

impl<B: AsRef<[u8]>, K: IndexKey> TreePage for InternalPage<B, K> {
    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: IndexKey> TreePageMut for InternalPage<B, K> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

impl<B: AsRef<[u8]>, K: IndexKey> InternalPage<B, K> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self {
            data,
            _key: PhantomData,
        }
    }

    pub fn key_at(&self, index: usize) -> K {
        let offset = Self::entry_offset(index);
        K::decode(&self.bytes()[offset..offset + K::SIZE])
    }

    pub fn value_at(&self, index: usize) -> PageId {
        PageId::new(read_u32(self.bytes(), Self::entry_offset(index) + K::SIZE))
    }

    /// Slot holding `child`, if any.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    /// Child whose subtree would contain `key`: the last slot whose key is
    /// <= `key`, or slot 0.
    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, comparator: &C) -> PageId {
        self.value_at(self.lookup_index(key, comparator))
    }

    /// Slot of the child [`lookup`](Self::lookup) returns.
    pub fn lookup_index<C: KeyComparator<K>>(&self, key: &K, comparator: &C) -> usize {
        let size = self.size();
        assert!(size > 0, "lookup in empty internal page {}", self.page_id());

        // First slot in [1, size) whose key is greater than `key`
        let mut left = 1;
        let mut right = size;
        while left < right {
            let mid = left + (right - left) / 2;
            if comparator.compare(&self.key_at(mid), key) == Ordering::Greater {
                right = mid;
            } else {
                left = mid + 1;
            }
        }

        left - 1
    }

    pub fn children(&self) -> Vec<PageId> {
        (0..self.size()).map(|i| self.value_at(i)).collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: IndexKey> InternalPage<B, K> {
    pub fn init(&mut self, page_id: PageId, parent_page_id: PageId, max_size: usize) {
        assert!(
            max_size <= Self::MAX_SIZE_LIMIT,
            "internal max size {max_size} does not fit a page"
        );
        self.init_header(IndexPageType::Internal, page_id, parent_page_id, max_size);
    }

    pub fn set_key_at(&mut self, index: usize, key: &K) {
        let offset = Self::entry_offset(index);
        key.encode(&mut self.bytes_mut()[offset..offset + K::SIZE]);
    }

    pub fn set_value_at(&mut self, index: usize, child: PageId) {
        let offset = Self::entry_offset(index) + K::SIZE;
        write_u32(self.bytes_mut(), offset, child.as_u32());
    }

    fn set_entry(&mut self, index: usize, key: &K, child: PageId) {
        self.set_key_at(index, key);
        self.set_value_at(index, child);
    }

    /// Fills a fresh root after its old root split into `left` and `right`.
    pub fn populate_new_root(&mut self, left: PageId, key: &K, right: PageId) {
        self.set_value_at(0, left);
        self.set_entry(1, key, right);
        self.set_size(2);
    }

    /// Inserts `(key, new_child)` right after the slot holding `old_child`
    /// and returns the new size.
    pub fn insert_node_after(&mut self, old_child: PageId, key: &K, new_child: PageId) -> usize {
        let size = self.size();
        let index = self
            .value_index(old_child)
            .unwrap_or_else(|| panic!("{} is not a child of {}", old_child, self.page_id()))
            + 1;
        assert!(size <= self.max_size(), "internal page {} overflowed", self.page_id());

        shift_entries(self.bytes_mut(), Self::ENTRY_SIZE, index, size, 1);
        self.set_entry(index, key, new_child);
        self.set_size(size + 1);
        size + 1
    }

    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        assert!(index < size);
        shift_entries(self.bytes_mut(), Self::ENTRY_SIZE, index + 1, size, -1);
        self.set_size(size - 1);
    }

    /// Empties a root that is down to one child and returns that child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        assert_eq!(self.size(), 1, "root {} has more than one child", self.page_id());
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    /// Appends entries `[from, to)` to `recipient` and returns the children
    /// that moved.
    fn copy_range_to<R>(
        &self,
        from: usize,
        to: usize,
        recipient: &mut InternalPage<R, K>,
    ) -> Vec<PageId>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let dest_size = recipient.size();
        let src = &self.bytes()[Self::entry_offset(from)..Self::entry_offset(to)];
        let dest = Self::entry_offset(dest_size);
        recipient.bytes_mut()[dest..dest + src.len()].copy_from_slice(src);
        recipient.set_size(dest_size + to - from);

        (from..to).map(|i| self.value_at(i)).collect()
    }

    /// Split: keeps `size / 2` children and moves the rest to the empty
    /// `recipient`. The recipient's slot 0 key is the separator to push up.
    ///
    /// Returns the moved children; their parent pointers must be updated.
    pub fn move_half_to<R>(&mut self, recipient: &mut InternalPage<R, K>) -> Vec<PageId>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let keep = size / 2;
        debug_assert_eq!(recipient.size(), 0);

        let moved = self.copy_range_to(keep, size, recipient);
        self.set_size(keep);
        moved
    }

    /// Merge into the left neighbour. `middle_key` is the parent's separator
    /// for this page; it comes down as the key of the first moved child.
    pub fn move_all_to<R>(
        &mut self,
        recipient: &mut InternalPage<R, K>,
        middle_key: &K,
    ) -> Vec<PageId>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        self.set_key_at(0, middle_key);
        let moved = self.copy_range_to(0, size, recipient);
        self.set_size(0);
        moved
    }

    /// Gives the first child to `recipient`, the left neighbour, under the
    /// parent's separator `middle_key`. Afterwards slot 0's key is the new
    /// separator for this page.
    pub fn move_first_to_end_of<R>(
        &mut self,
        recipient: &mut InternalPage<R, K>,
        middle_key: &K,
    ) -> PageId
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let child = self.value_at(0);
        let dest_size = recipient.size();

        recipient.set_entry(dest_size, middle_key, child);
        recipient.set_size(dest_size + 1);

        shift_entries(self.bytes_mut(), Self::ENTRY_SIZE, 1, size, -1);
        self.set_size(size - 1);
        child
    }

    /// Gives the last child to `recipient`, the right neighbour. The old
    /// separator `middle_key` moves down into the recipient's slot 1 and the
    /// recipient's slot 0 key becomes the new separator.
    pub fn move_last_to_front_of<R>(
        &mut self,
        recipient: &mut InternalPage<R, K>,
        middle_key: &K,
    ) -> PageId
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let key = self.key_at(size - 1);
        let child = self.value_at(size - 1);
        let dest_size = recipient.size();

        shift_entries(recipient.bytes_mut(), Self::ENTRY_SIZE, 0, dest_size, 1);
        recipient.set_key_at(1, middle_key);
        recipient.set_entry(0, &key, child);
        recipient.set_size(dest_size + 1);

        self.set_size(size - 1);
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INVALID_PAGE_ID;
    use crate::index::NaturalComparator;

    fn p(n: u32) -> PageId {
        PageId::new(n)
    }

    /// Builds an internal page with children 100, 101, ... and the given
    /// separators for slots 1..
    fn internal_with(data: &mut [u8], page_id: u32, separators: &[u32]) {
        let mut node = InternalPage::<_, u32>::new(data);
        node.init(p(page_id), INVALID_PAGE_ID, 4);
        node.populate_new_root(p(100), &separators[0], p(101));
        for (i, k) in separators.iter().enumerate().skip(1) {
            node.insert_node_after(p(100 + i as u32), k, p(101 + i as u32));
        }
    }

    fn separators_of(data: &[u8]) -> Vec<u32> {
        let node = InternalPage::<_, u32>::new(data);
        (1..node.size()).map(|i| node.key_at(i)).collect()
    }

    #[test]
    fn test_lookup() {
        let mut data = vec![0u8; PAGE_SIZE];
        internal_with(&mut data, 1, &[10, 20, 30]);

        let node = InternalPage::<_, u32>::new(&data[..]);
        assert_eq!(node.size(), 4);
        assert_eq!(node.lookup(&5, &NaturalComparator), p(100));
        assert_eq!(node.lookup(&10, &NaturalComparator), p(101));
        assert_eq!(node.lookup(&19, &NaturalComparator), p(101));
        assert_eq!(node.lookup(&20, &NaturalComparator), p(102));
        assert_eq!(node.lookup(&99, &NaturalComparator), p(103));
        assert_eq!(node.value_index(p(102)), Some(2));
        assert_eq!(node.value_index(p(7)), None);
    }

    #[test]
    fn test_insert_node_after_middle() {
        let mut data = vec![0u8; PAGE_SIZE];
        internal_with(&mut data, 1, &[10, 30]);

        let mut node = InternalPage::<_, u32>::new(&mut data[..]);
        assert_eq!(node.insert_node_after(p(101), &20, p(200)), 4);
        assert_eq!(node.children(), vec![p(100), p(101), p(200), p(102)]);
        assert_eq!(separators_of(&data), vec![10, 20, 30]);
    }

    #[test]
    fn test_move_half_to() {
        let mut left = vec![0u8; PAGE_SIZE];
        let mut right = vec![0u8; PAGE_SIZE];
        internal_with(&mut left, 1, &[10, 20, 30, 40]);

        let moved = {
            let mut l = InternalPage::<_, u32>::new(&mut left[..]);
            let mut r = InternalPage::<_, u32>::new(&mut right[..]);
            r.init(p(2), INVALID_PAGE_ID, 4);
            l.move_half_to(&mut r)
        };

        assert_eq!(moved, vec![p(102), p(103), p(104)]);
        let l = InternalPage::<_, u32>::new(&left[..]);
        let r = InternalPage::<_, u32>::new(&right[..]);
        assert_eq!(l.children(), vec![p(100), p(101)]);
        assert_eq!(r.key_at(0), 20);
        assert_eq!(separators_of(&right), vec![30, 40]);
    }

    #[test]
    fn test_move_all_to_pulls_down_separator() {
        let mut left = vec![0u8; PAGE_SIZE];
        let mut right = vec![0u8; PAGE_SIZE];
        internal_with(&mut left, 1, &[10]);
        internal_with(&mut right, 2, &[60]);

        let moved = {
            let mut l = InternalPage::<_, u32>::new(&mut left[..]);
            let mut r = InternalPage::<_, u32>::new(&mut right[..]);
            r.move_all_to(&mut l, &50)
        };

        assert_eq!(moved, vec![p(100), p(101)]);
        assert_eq!(separators_of(&left), vec![10, 50, 60]);
        assert_eq!(InternalPage::<_, u32>::new(&right[..]).size(), 0);
    }

    #[test]
    fn test_redistribute_through_separator() {
        let mut left = vec![0u8; PAGE_SIZE];
        let mut right = vec![0u8; PAGE_SIZE];
        internal_with(&mut left, 1, &[10, 20]);
        internal_with(&mut right, 2, &[60]);

        // Parent separator between them is 50
        let child = {
            let mut l = InternalPage::<_, u32>::new(&mut left[..]);
            let mut r = InternalPage::<_, u32>::new(&mut right[..]);
            l.move_last_to_front_of(&mut r, &50)
        };
        assert_eq!(child, p(102));
        let r = InternalPage::<_, u32>::new(&right[..]);
        assert_eq!(r.key_at(0), 20);
        assert_eq!(r.children(), vec![p(102), p(100), p(101)]);
        assert_eq!(separators_of(&right), vec![50, 60]);

        // And back again, with 20 as the separator now
        let child = {
            let mut l = InternalPage::<_, u32>::new(&mut left[..]);
            let mut r = InternalPage::<_, u32>::new(&mut right[..]);
            r.move_first_to_end_of(&mut l, &20)
        };
        assert_eq!(child, p(102));
        assert_eq!(separators_of(&left), vec![10, 20]);
        assert_eq!(InternalPage::<_, u32>::new(&right[..]).key_at(0), 50);
    }

    #[test]
    fn test_remove_and_only_child() {
        let mut data = vec![0u8; PAGE_SIZE];
        internal_with(&mut data, 1, &[10]);

        let mut node = InternalPage::<_, u32>::new(&mut data[..]);
        node.remove(1);
        assert_eq!(node.remove_and_return_only_child(), p(100));
        assert_eq!(node.size(), 0);
    }
}
