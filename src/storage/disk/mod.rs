mod disk_manager;
mod page_store;

pub use disk_manager::*;
pub use page_store::*;
