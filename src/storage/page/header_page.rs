use crate::common::{BurrowError, PageId, Result, INDEX_NAME_SIZE, INVALID_PAGE_ID, PAGE_SIZE};

const MAGIC_NUMBER: u32 = 0x4255_5257; // "BURW"
const VERSION: u32 = 1;

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const RECORD_COUNT_OFFSET: usize = 8;
const RECORDS_OFFSET: usize = 12;

const RECORD_SIZE: usize = INDEX_NAME_SIZE + 4; // name + root page id
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// One `(index name, root page id)` entry of the header page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub name: String,
    pub root_page_id: PageId,
}

fn encode_name(name: &str) -> Result<[u8; INDEX_NAME_SIZE]> {
    let bytes = name.as_bytes();
    if bytes.len() > INDEX_NAME_SIZE {
        return Err(BurrowError::IndexNameTooLong(INDEX_NAME_SIZE));
    }
    let mut buf = [0u8; INDEX_NAME_SIZE];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn record_offset(index: usize) -> usize {
    RECORDS_OFFSET + index * RECORD_SIZE
}

fn find_slot(data: &[u8], name: &[u8; INDEX_NAME_SIZE]) -> Option<usize> {
    let count = read_u32(data, RECORD_COUNT_OFFSET) as usize;
    (0..count).find(|&i| {
        let offset = record_offset(i);
        &data[offset..offset + INDEX_NAME_SIZE] == name
    })
}

fn record_at(data: &[u8], index: usize) -> HeaderRecord {
    let offset = record_offset(index);
    let raw = &data[offset..offset + INDEX_NAME_SIZE];
    let len = raw.iter().position(|&b| b == 0).unwrap_or(INDEX_NAME_SIZE);
    HeaderRecord {
        name: String::from_utf8_lossy(&raw[..len]).into_owned(),
        root_page_id: PageId::new(read_u32(data, offset + INDEX_NAME_SIZE)),
    }
}

/// Mutable view of the header page: the directory mapping index names to
/// their current root page id.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
        self.write_u32(MAGIC_OFFSET, MAGIC_NUMBER);
        self.write_u32(VERSION_OFFSET, VERSION);
        self.set_record_count(0);
    }

    pub fn is_valid(&self) -> bool {
        read_u32(self.data, MAGIC_OFFSET) == MAGIC_NUMBER
    }

    pub fn record_count(&self) -> usize {
        read_u32(self.data, RECORD_COUNT_OFFSET) as usize
    }

    fn set_record_count(&mut self, count: usize) {
        self.write_u32(RECORD_COUNT_OFFSET, count as u32);
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn write_record(&mut self, index: usize, name: &[u8; INDEX_NAME_SIZE], root: PageId) {
        let offset = record_offset(index);
        self.data[offset..offset + INDEX_NAME_SIZE].copy_from_slice(name);
        self.write_u32(offset + INDEX_NAME_SIZE, root.as_u32());
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        HeaderPageRef::new(self.data).get_root_id(name)
    }

    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> Result<()> {
        let encoded = encode_name(name)?;
        if find_slot(self.data, &encoded).is_some() {
            return Err(BurrowError::IndexAlreadyExists(name.to_string()));
        }

        let count = self.record_count();
        if count >= MAX_HEADER_RECORDS {
            return Err(BurrowError::DirectoryFull);
        }

        self.write_record(count, &encoded, root_page_id);
        self.set_record_count(count + 1);
        Ok(())
    }

    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> Result<()> {
        let encoded = encode_name(name)?;
        let slot = find_slot(self.data, &encoded)
            .ok_or_else(|| BurrowError::IndexNotFound(name.to_string()))?;
        self.write_record(slot, &encoded, root_page_id);
        Ok(())
    }

    /// Removes the record, moving the last record into its slot.
    pub fn delete_record(&mut self, name: &str) -> Result<HeaderRecord> {
        let encoded = encode_name(name)?;
        let slot = find_slot(self.data, &encoded)
            .ok_or_else(|| BurrowError::IndexNotFound(name.to_string()))?;

        let removed = record_at(self.data, slot);
        let last = self.record_count() - 1;
        if slot < last {
            let from = record_offset(last);
            self.data
                .copy_within(from..from + RECORD_SIZE, record_offset(slot));
        }
        self.set_record_count(last);
        Ok(removed)
    }

    pub fn records(&self) -> Vec<HeaderRecord> {
        HeaderPageRef::new(self.data).records()
    }
}

/// Read-only view of the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn is_valid(&self) -> bool {
        read_u32(self.data, MAGIC_OFFSET) == MAGIC_NUMBER
    }

    pub fn record_count(&self) -> usize {
        read_u32(self.data, RECORD_COUNT_OFFSET) as usize
    }

    /// Returns the stored root for `name`. A tree that exists but is empty
    /// reports `Some(INVALID_PAGE_ID)`.
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let encoded = encode_name(name).ok()?;
        find_slot(self.data, &encoded).map(|slot| record_at(self.data, slot).root_page_id)
    }

    pub fn records(&self) -> Vec<HeaderRecord> {
        (0..self.record_count())
            .map(|i| record_at(self.data, i))
            .collect()
    }

    pub fn has_empty_tree(&self, name: &str) -> bool {
        self.get_root_id(name) == Some(INVALID_PAGE_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> [u8; PAGE_SIZE] {
        let mut data = [0u8; PAGE_SIZE];
        HeaderPage::new(&mut data).init();
        data
    }

    #[test]
    fn test_header_page_init() {
        let mut data = [0u8; PAGE_SIZE];
        assert!(!HeaderPageRef::new(&data).is_valid());

        let mut page = HeaderPage::new(&mut data);
        page.init();
        assert!(page.is_valid());
        assert_eq!(page.record_count(), 0);
    }

    #[test]
    fn test_header_page_insert_and_update() {
        let mut data = header();
        let mut page = HeaderPage::new(&mut data);

        page.insert_record("orders_pk", PageId::new(3)).unwrap();
        page.insert_record("users_pk", INVALID_PAGE_ID).unwrap();
        assert_eq!(page.get_root_id("orders_pk"), Some(PageId::new(3)));

        page.update_record("users_pk", PageId::new(9)).unwrap();
        assert_eq!(page.get_root_id("users_pk"), Some(PageId::new(9)));
        assert_eq!(page.get_root_id("missing"), None);
    }

    #[test]
    fn test_header_page_duplicate_and_missing() {
        let mut data = header();
        let mut page = HeaderPage::new(&mut data);

        page.insert_record("idx", PageId::new(1)).unwrap();
        assert!(matches!(
            page.insert_record("idx", PageId::new(2)),
            Err(BurrowError::IndexAlreadyExists(_))
        ));
        assert!(matches!(
            page.update_record("other", PageId::new(2)),
            Err(BurrowError::IndexNotFound(_))
        ));
        let long_name = "x".repeat(INDEX_NAME_SIZE + 1);
        assert!(matches!(
            page.insert_record(&long_name, PageId::new(2)),
            Err(BurrowError::IndexNameTooLong(_))
        ));
    }

    #[test]
    fn test_header_page_delete_record() {
        let mut data = header();
        let mut page = HeaderPage::new(&mut data);

        page.insert_record("a", PageId::new(1)).unwrap();
        page.insert_record("b", PageId::new(2)).unwrap();
        page.insert_record("c", PageId::new(3)).unwrap();

        let removed = page.delete_record("a").unwrap();
        assert_eq!(removed.root_page_id, PageId::new(1));
        assert_eq!(page.record_count(), 2);
        assert_eq!(page.get_root_id("c"), Some(PageId::new(3)));
        assert_eq!(page.get_root_id("a"), None);
    }

    #[test]
    fn test_header_page_full() {
        let mut data = header();
        let mut page = HeaderPage::new(&mut data);

        for i in 0..MAX_HEADER_RECORDS {
            page.insert_record(&format!("idx{}", i), PageId::new(i as u32))
                .unwrap();
        }
        assert!(matches!(
            page.insert_record("overflow", PageId::new(0)),
            Err(BurrowError::DirectoryFull)
        ));
    }

    #[test]
    fn test_header_page_ref() {
        let mut data = header();
        HeaderPage::new(&mut data)
            .insert_record("pk", INVALID_PAGE_ID)
            .unwrap();

        let page = HeaderPageRef::new(&data);
        assert!(page.has_empty_tree("pk"));
        assert_eq!(
            page.records(),
            vec![HeaderRecord {
                name: "pk".to_string(),
                root_page_id: INVALID_PAGE_ID
            }]
        );
    }
}
