//! Storage layer implementation
//!
//! The B-tree algorithms are written once against [`NodeStore`]. Two stores
//! implement it: [`MemoryStore`] (every persistence hook is a no-op) and
//! [`DiskPageStore`] (fixed-size pages over a seekable byte stream).

pub mod disk;
pub mod memory;
pub mod page;

pub use disk::DiskPageStore;
pub use memory::MemoryStore;
pub use page::{PageHeader, PageLayout, PageTag};

use crate::btree::{Node, NodeId};
use crate::Result;

/// Persistence hooks driven by the tree algorithms
///
/// The tree decides *what* changes; the store decides where node shells
/// live and how they reach durable storage. Calls happen at fixed points:
///
/// - `node`/`node_mut` before a node's content is inspected
/// - `write` after a node was mutated
/// - `delete` when a node left the tree
/// - `store_root` when the root handle changed
/// - `free` once a traversal has fully consumed a node
/// - `release` when a logical operation completed
pub trait NodeStore<T> {
    /// Root handle, creating an empty leaf root for an empty store
    fn load_root(&mut self) -> Result<NodeId>;

    /// Persist a new root handle
    fn store_root(&mut self, id: NodeId) -> Result<()>;

    /// Create a fresh, empty node shell
    fn allocate(&mut self, is_leaf: bool) -> Result<NodeId>;

    /// Node content, loading it on first access
    fn node(&mut self, id: NodeId) -> Result<&Node<T>>;

    /// Mutable node content, loading it on first access
    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<T>>;

    /// Persist the current content of a node
    fn write(&mut self, id: NodeId) -> Result<()>;

    /// Drop a node from the tree and recycle its slot
    fn delete(&mut self, id: NodeId) -> Result<()>;

    /// Forget the in-memory content of one node
    fn free(&mut self, _id: NodeId) {}

    /// Forget every in-memory node shell
    fn release(&mut self) {}
}
