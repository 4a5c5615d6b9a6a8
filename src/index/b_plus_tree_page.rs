use crate::common::{BurrowError, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};

// Header shared by leaf and internal pages:
// | type (1) | pad (3) | size (4) | max size (4) | parent (4) | page id (4) | next (4) |
const PAGE_TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
const PARENT_PAGE_ID_OFFSET: usize = 12;
const PAGE_ID_OFFSET: usize = 16;
pub(crate) const NEXT_PAGE_ID_OFFSET: usize = 20;

pub const TREE_PAGE_HEADER_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPageType {
    Invalid = 0,
    Leaf = 1,
    Internal = 2,
}

impl IndexPageType {
    fn from_u8(tag: u8) -> Self {
        match tag {
            1 => IndexPageType::Leaf,
            2 => IndexPageType::Internal,
            _ => IndexPageType::Invalid,
        }
    }
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Reads the type tag of a tree page, failing on anything that is not a
/// leaf or internal page.
pub fn page_type_of(data: &[u8]) -> Result<IndexPageType> {
    match IndexPageType::from_u8(data[PAGE_TYPE_OFFSET]) {
        IndexPageType::Invalid => Err(BurrowError::IndexCorrupted(format!(
            "page {} is not a tree page",
            PageId::new(read_u32(data, PAGE_ID_OFFSET))
        ))),
        page_type => Ok(page_type),
    }
}

/// Rewrites the parent pointer of a tree page of either kind.
pub fn set_parent_of(data: &mut [u8], parent_page_id: PageId) {
    write_u32(data, PARENT_PAGE_ID_OFFSET, parent_page_id.as_u32());
}

/// Header accessors common to both node kinds.
pub trait TreePage {
    fn bytes(&self) -> &[u8];

    fn page_type(&self) -> IndexPageType {
        IndexPageType::from_u8(self.bytes()[PAGE_TYPE_OFFSET])
    }

    fn is_leaf(&self) -> bool {
        self.page_type() == IndexPageType::Leaf
    }

    fn size(&self) -> usize {
        read_u32(self.bytes(), SIZE_OFFSET) as usize
    }

    fn max_size(&self) -> usize {
        read_u32(self.bytes(), MAX_SIZE_OFFSET) as usize
    }

    /// Smallest legal size. The root is exempt from half-full: a root leaf
    /// needs one entry and a root internal page two children.
    fn min_size(&self) -> usize {
        if self.is_root() {
            if self.is_leaf() {
                1
            } else {
                2
            }
        } else {
            (self.max_size() + 1) / 2
        }
    }

    fn page_id(&self) -> PageId {
        PageId::new(read_u32(self.bytes(), PAGE_ID_OFFSET))
    }

    fn parent_page_id(&self) -> PageId {
        PageId::new(read_u32(self.bytes(), PARENT_PAGE_ID_OFFSET))
    }

    fn is_root(&self) -> bool {
        self.parent_page_id() == INVALID_PAGE_ID
    }
}

pub trait TreePageMut: TreePage {
    fn bytes_mut(&mut self) -> &mut [u8];

    fn set_size(&mut self, size: usize) {
        write_u32(self.bytes_mut(), SIZE_OFFSET, size as u32);
    }

    fn set_parent_page_id(&mut self, parent_page_id: PageId) {
        set_parent_of(self.bytes_mut(), parent_page_id);
    }

    /// Writes a fresh header. Entries are left as they are.
    fn init_header(
        &mut self,
        page_type: IndexPageType,
        page_id: PageId,
        parent_page_id: PageId,
        max_size: usize,
    ) {
        let data = self.bytes_mut();
        data[PAGE_TYPE_OFFSET] = page_type as u8;
        write_u32(data, SIZE_OFFSET, 0);
        write_u32(data, MAX_SIZE_OFFSET, max_size as u32);
        write_u32(data, PARENT_PAGE_ID_OFFSET, parent_page_id.as_u32());
        write_u32(data, PAGE_ID_OFFSET, page_id.as_u32());
        write_u32(data, NEXT_PAGE_ID_OFFSET, INVALID_PAGE_ID.as_u32());
    }
}

/// Header-only view of a tree page of either kind.
pub struct TreeHeader<B>(pub B);

impl<B: AsRef<[u8]>> TreePage for TreeHeader<B> {
    fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// Number of entries of `entry_size` bytes a page can physically hold.
pub(crate) const fn slot_capacity(entry_size: usize) -> usize {
    (PAGE_SIZE - TREE_PAGE_HEADER_SIZE) / entry_size
}

/// Moves the entries `[from, size)` by `shift` slots (positive = right).
pub(crate) fn shift_entries(
    data: &mut [u8],
    entry_size: usize,
    from: usize,
    size: usize,
    shift: isize,
) {
    if from >= size {
        return;
    }
    let start = TREE_PAGE_HEADER_SIZE + from * entry_size;
    let end = TREE_PAGE_HEADER_SIZE + size * entry_size;
    let dest = (start as isize + shift * entry_size as isize) as usize;
    data.copy_within(start..end, dest);
}
