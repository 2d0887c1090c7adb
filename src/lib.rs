//! pagetree - generic B-tree with in-memory and disk-paged storage
//!
//! ## Features
//! - Order-`t` B-tree with duplicate items (multiset semantics)
//! - Lazy ascending/descending iteration, from the start or from a pivot
//! - One algorithm over two stores: a memory slab and fixed-size disk pages
//! - Byte-budgeted LRU page cache in front of the disk store
//! - Fixed-width item codecs for the common primitive types
//!
//! ## Architecture
//! - Algorithms: [`btree`] drives every split, merge and rotation through
//!   the [`NodeStore`] hooks
//! - Stores: [`storage::MemoryStore`] and [`storage::DiskPageStore`]
//! - Caching: [`cache::PageCache`] keyed by stream offset
//! - Encoding: [`codec`] registry of [`ItemCodec`]s
//!
//! ## Example
//! ```no_run
//! use pagetree::{BTree, BTreeConfig, DiskBTree};
//! use std::fs::File;
//!
//! # fn main() -> pagetree::Result<()> {
//! let mut tree: DiskBTree<u64, File> = BTree::open_path("ids.db", &BTreeConfig::default())?;
//! tree.insert(42)?;
//! assert!(tree.contains(&42)?);
//! for item in tree.iter_from(&10, false)? {
//!     println!("{}", item?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod btree;
pub mod cache;
pub mod codec;
pub mod config;
pub mod storage;
pub mod types;

mod error;
mod shared;

pub use btree::{BTree, Comparer, DiskBTree, Iter, NaturalOrder, Node, NodeId, Reverse};
pub use cache::{CacheStats, PageCache};
pub use codec::{default_codec, ItemCodec, PrimitiveCodec};
pub use config::BTreeConfig;
pub use error::{Result, StorageError};
pub use shared::SharedBTree;
pub use storage::{DiskPageStore, MemoryStore, NodeStore};
pub use types::Timestamp;
