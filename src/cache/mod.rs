//! Cache module - byte-budgeted LRU cache for disk pages

pub mod page_cache;

pub use page_cache::{CacheStats, PageCache};
