mod buffer_pool_manager;
mod extendible_hash;
mod frame_header;
mod lru_replacer;
mod page_guard;

pub use buffer_pool_manager::*;
pub use extendible_hash::*;
pub use frame_header::*;
pub use lru_replacer::*;
pub use page_guard::*;
