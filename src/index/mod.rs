mod b_plus_tree;
mod b_plus_tree_internal_page;
mod b_plus_tree_leaf_page;
mod b_plus_tree_page;
mod index_iterator;
mod key_comparator;

pub use b_plus_tree::{bootstrap_header_page, BPlusTree};
pub use b_plus_tree_internal_page::InternalPage;
pub use b_plus_tree_leaf_page::LeafPage;
pub use b_plus_tree_page::{
    page_type_of, IndexPageType, TreeHeader, TreePage, TreePageMut, TREE_PAGE_HEADER_SIZE,
};
pub use index_iterator::IndexIterator;
pub use key_comparator::{
    BytewiseComparator, GenericKey, IndexKey, IntegerComparator, KeyComparator, NaturalComparator,
};
