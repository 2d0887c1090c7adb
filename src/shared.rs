//! Thread-safe handle over a tree
//!
//! Every tree operation, including lookups, may load and release node
//! shells, so a single lock serializes all access.

use crate::btree::{BTree, Comparer, NaturalOrder};
use crate::storage::{MemoryStore, NodeStore};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable, lock-protected [`BTree`]
pub struct SharedBTree<T, S = MemoryStore<T>, C = NaturalOrder> {
    inner: Arc<Mutex<BTree<T, S, C>>>,
}

impl<T, S, C> Clone for SharedBTree<T, S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone, S: NodeStore<T>, C: Comparer<T>> SharedBTree<T, S, C> {
    pub fn new(tree: BTree<T, S, C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    pub fn insert(&self, item: T) -> Result<()> {
        self.inner.lock().insert(item)
    }

    pub fn remove(&self, item: &T) -> Result<bool> {
        self.inner.lock().remove(item)
    }

    pub fn update<F>(&self, item: &T, transform: F) -> Result<bool>
    where
        F: FnOnce(&T) -> T,
    {
        self.inner.lock().update(item, transform)
    }

    pub fn contains(&self, item: &T) -> Result<bool> {
        self.inner.lock().contains(item)
    }

    /// Snapshot of every item in order
    pub fn collect(&self, reverse: bool) -> Result<Vec<T>> {
        let mut tree = self.inner.lock();
        let items = tree.iter(reverse)?.collect();
        items
    }

    /// Snapshot of the items from `pivot` on
    pub fn collect_from(&self, pivot: &T, reverse: bool) -> Result<Vec<T>> {
        let mut tree = self.inner.lock();
        let items = tree.iter_from(pivot, reverse)?.collect();
        items
    }

    /// Run `f` with the tree locked
    ///
    /// Use this for lazy walks that should stop early.
    pub fn with<R>(&self, f: impl FnOnce(&mut BTree<T, S, C>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// The tree, if this is the last handle
    pub fn into_inner(self) -> Option<BTree<T, S, C>> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}
