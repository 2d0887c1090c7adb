//! Generic order-t B-tree
//!
//! ## Design Principles
//! - **One algorithm, many stores**: insert/remove/update/search are written
//!   against [`NodeStore`]; the in-memory and disk trees share every line.
//! - **Handles, not pointers**: nodes live in the store's arena and refer to
//!   each other by [`NodeId`], so split/merge/borrow only move ids around.
//! - **Multiset semantics**: items comparing equal are all kept and may span
//!   node boundaries.
//! - **Preemptive rebalancing**: insert splits full nodes on the way down,
//!   remove tops up thin nodes on the way down; neither ever walks back up.
//!
//! ## Node occupancy
//! ```text
//! root:      0 ..= 2t-1 items
//! non-root:  t-1 ..= 2t-1 items
//! non-leaf:  items + 1 children
//! ```

mod comparer;
mod iter;
mod node;

pub use comparer::{Comparer, NaturalOrder, Reverse};
pub use iter::Iter;
pub use node::{Node, NodeId};

use crate::codec::{default_codec, ItemCodec};
use crate::config::{validate_order, BTreeConfig};
use crate::storage::{DiskPageStore, MemoryStore, NodeStore};
use crate::{Result, StorageError};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::marker::PhantomData;
use std::path::Path;

/// B-tree over a disk page store
pub type DiskBTree<T, F, C = NaturalOrder> = BTree<T, DiskPageStore<T, F>, C>;

/// Balanced multiway search tree
///
/// Not synchronized: concurrent use of one tree must be serialized by the
/// caller (see [`crate::SharedBTree`]).
pub struct BTree<T, S = MemoryStore<T>, C = NaturalOrder> {
    /// Order `t`
    order: usize,

    /// Item ordering
    comparer: C,

    /// Node arena and persistence hooks
    store: S,

    /// Root handle, `None` until the first operation loads it
    root: Option<NodeId>,

    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + Ord> BTree<T> {
    /// In-memory tree of order `t` using `Ord`
    pub fn new(order: usize) -> Result<Self> {
        Self::with_comparer(order, NaturalOrder)
    }

    /// In-memory tree from a configuration
    pub fn with_config(config: &BTreeConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.order)
    }
}

impl<T: Clone, C: Comparer<T>> BTree<T, MemoryStore<T>, C> {
    /// In-memory tree of order `t` with a custom comparer
    pub fn with_comparer(order: usize, comparer: C) -> Result<Self> {
        validate_order(order)?;
        Self::with_store(order, comparer, MemoryStore::new(order))
    }
}

impl<T: Clone + Ord + 'static, F: Read + Write + Seek> BTree<T, DiskPageStore<T, F>> {
    /// Disk tree over `stream` using the built-in codec for `T`
    ///
    /// An empty stream is initialised with a header and an empty root page.
    /// Pass `&mut stream` to keep ownership of the stream.
    pub fn from_stream(stream: F, config: &BTreeConfig) -> Result<Self> {
        Self::from_stream_with(stream, config, NaturalOrder, default_codec::<T>()?)
    }
}

impl<T: Clone + Ord + 'static> BTree<T, DiskPageStore<T, File>> {
    /// Disk tree over a file, created if missing
    pub fn open_path<P: AsRef<Path>>(path: P, config: &BTreeConfig) -> Result<Self> {
        config.validate()?;
        let store = DiskPageStore::open_path(path, config, default_codec::<T>()?)?;
        Self::with_store(config.order, NaturalOrder, store)
    }
}

impl<T: Clone, F: Read + Write + Seek, C: Comparer<T>> BTree<T, DiskPageStore<T, F>, C> {
    /// Disk tree with an explicit comparer and codec
    pub fn from_stream_with(
        stream: F,
        config: &BTreeConfig,
        comparer: C,
        codec: Box<dyn ItemCodec<T>>,
    ) -> Result<Self> {
        config.validate()?;
        let store = DiskPageStore::open(stream, config, codec)?;
        Self::with_store(config.order, comparer, store)
    }

    /// Flush and release the backing stream
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}

impl<T: Clone, S: NodeStore<T>, C: Comparer<T>> BTree<T, S, C> {
    /// Tree over an arbitrary store; `order` must match the store's
    pub fn with_store(order: usize, comparer: C, store: S) -> Result<Self> {
        validate_order(order)?;
        Ok(Self {
            order,
            comparer,
            store,
            root: None,
            _marker: PhantomData,
        })
    }

    /// Order `t`
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Insert an item; duplicates are kept
    pub fn insert(&mut self, item: T) -> Result<()> {
        let result = self.insert_item(item);
        self.finish(result)
    }

    /// Remove one occurrence of `item`
    pub fn remove(&mut self, item: &T) -> Result<bool> {
        let result = self.remove_item(item);
        self.finish(result)
    }

    /// Replace one occurrence of `item` with `transform(occurrence)`
    ///
    /// A result comparing equal to the original is written in place; any
    /// other result is moved to its new position (remove, then insert).
    /// Returns `false` when `item` is absent.
    pub fn update<F>(&mut self, item: &T, transform: F) -> Result<bool>
    where
        F: FnOnce(&T) -> T,
    {
        let result = self.update_item(item, transform);
        self.finish(result)
    }

    /// Whether at least one occurrence of `item` is stored
    pub fn contains(&mut self, item: &T) -> Result<bool> {
        let result = self.search_any(item).map(|found| found.is_some());
        self.finish(result)
    }

    /// Lazy in-order walk; `reverse` walks from the largest item down
    pub fn iter(&mut self, reverse: bool) -> Result<Iter<'_, T, S, C>> {
        match self.root_id() {
            Ok(root) => Iter::from_root(self, root, reverse),
            Err(e) => self.finish(Err(e)),
        }
    }

    /// Lazy walk starting at `pivot`
    ///
    /// Ascending yields every item `>= pivot`; descending yields every item
    /// `<= pivot`. Subtrees entirely on the other side are never read.
    pub fn iter_from(&mut self, pivot: &T, reverse: bool) -> Result<Iter<'_, T, S, C>> {
        match self.root_id() {
            Ok(root) => Iter::from_pivot(self, root, pivot, reverse),
            Err(e) => self.finish(Err(e)),
        }
    }

    /// Check every structural invariant of the tree
    ///
    /// Verifies occupancy bounds, child counts, item order across node
    /// boundaries and uniform leaf depth.
    pub fn validate(&mut self) -> Result<()> {
        let result = match self.root_id() {
            Ok(root) => self.validate_subtree(root, true, None, None).map(|_| ()),
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    #[inline]
    fn max_items(&self) -> usize {
        2 * self.order - 1
    }

    /// End of a logical operation: drop node shells, forget the root on error
    fn finish<R>(&mut self, result: Result<R>) -> Result<R> {
        self.store.release();
        if result.is_err() {
            self.root = None;
        }
        result
    }

    fn root_id(&mut self) -> Result<NodeId> {
        match self.root {
            Some(id) => Ok(id),
            None => {
                let id = self.store.load_root()?;
                self.root = Some(id);
                Ok(id)
            }
        }
    }

    fn set_root(&mut self, id: NodeId) -> Result<()> {
        self.root = Some(id);
        self.store.store_root(id)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Any node and index holding an item equal to `item`
    fn search_any(&mut self, item: &T) -> Result<Option<(NodeId, usize)>> {
        let mut id = self.root_id()?;
        loop {
            let node = self.store.node(id)?;
            let pos = left_border(&self.comparer, &node.items, item, search(&self.comparer, &node.items, item));
            match pos {
                Ok(i) => return Ok(Some((id, i))),
                Err(_) if node.is_leaf => return Ok(None),
                Err(i) => id = child_at(node, id, i)?,
            }
        }
    }

    fn max_item(&mut self, mut id: NodeId) -> Result<T> {
        loop {
            let node = self.store.node(id)?;
            if node.is_leaf {
                return node
                    .items
                    .last()
                    .cloned()
                    .ok_or(StorageError::CorruptedNode { page_id: id });
            }
            id = child_at(node, id, node.len())?;
        }
    }

    fn min_item(&mut self, mut id: NodeId) -> Result<T> {
        loop {
            let node = self.store.node(id)?;
            if node.is_leaf {
                return node
                    .items
                    .first()
                    .cloned()
                    .ok_or(StorageError::CorruptedNode { page_id: id });
            }
            id = child_at(node, id, 0)?;
        }
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    fn insert_item(&mut self, item: T) -> Result<()> {
        let root = self.root_id()?;
        if self.store.node(root)?.len() == self.max_items() {
            let new_root = self.store.allocate(false)?;
            self.store.node_mut(new_root)?.children.push(root);
            self.split_child(new_root, 0)?;
            self.set_root(new_root)?;
            self.insert_non_full(new_root, item)
        } else {
            self.insert_non_full(root, item)
        }
    }

    /// Descend from a node known not to be full, splitting full children
    /// before entering them
    fn insert_non_full(&mut self, mut id: NodeId, item: T) -> Result<()> {
        loop {
            let node = self.store.node(id)?;
            let mut i = upper_bound(&self.comparer, &node.items, &item);
            if node.is_leaf {
                self.store.node_mut(id)?.items.insert(i, item);
                return self.store.write(id);
            }
            let child = child_at(node, id, i)?;
            if self.store.node(child)?.len() == self.max_items() {
                self.split_child(id, i)?;
                let median = &self.store.node(id)?.items[i];
                if self.comparer.compare(&item, median) == Ordering::Greater {
                    i += 1;
                }
            }
            id = child_at(self.store.node(id)?, id, i)?;
        }
    }

    /// Split the full child `i` of `parent` around its median
    fn split_child(&mut self, parent: NodeId, i: usize) -> Result<()> {
        let t = self.order;
        let left = child_at(self.store.node(parent)?, parent, i)?;

        let (is_leaf, median, right_items, right_children) = {
            let node = self.store.node_mut(left)?;
            let right_items = node.items.split_off(t);
            let median = node
                .items
                .pop()
                .ok_or(StorageError::CorruptedNode { page_id: left })?;
            let right_children = if node.is_leaf {
                Vec::new()
            } else {
                node.children.split_off(t)
            };
            (node.is_leaf, median, right_items, right_children)
        };

        let right = self.store.allocate(is_leaf)?;
        {
            let node = self.store.node_mut(right)?;
            node.items = right_items;
            node.children = right_children;
        }
        {
            let node = self.store.node_mut(parent)?;
            node.items.insert(i, median);
            node.children.insert(i + 1, right);
        }

        self.store.write(left)?;
        self.store.write(right)?;
        self.store.write(parent)
    }

    // ------------------------------------------------------------------
    // Remove
    // ------------------------------------------------------------------

    fn remove_item(&mut self, item: &T) -> Result<bool> {
        let root = self.root_id()?;
        let removed = self.remove_from(root, item.clone())?;
        // A merge on the way down may have emptied the root even when the
        // item turned out to be absent.
        self.shrink_root(root)?;
        Ok(removed)
    }

    /// Replace an empty internal root by its only child
    fn shrink_root(&mut self, root: NodeId) -> Result<()> {
        let (empty, is_leaf) = {
            let node = self.store.node(root)?;
            (node.is_empty(), node.is_leaf)
        };
        if empty && !is_leaf {
            let new_root = child_at(self.store.node(root)?, root, 0)?;
            self.set_root(new_root)?;
            self.store.delete(root)?;
        }
        Ok(())
    }

    /// Remove `target` from the subtree at `id`
    ///
    /// Every child entered holds at least `t` items, so removing one item
    /// from it never leaves it under-full.
    fn remove_from(&mut self, mut id: NodeId, mut target: T) -> Result<bool> {
        let t = self.order;
        loop {
            let (pos, is_leaf) = {
                let node = self.store.node(id)?;
                (search(&self.comparer, &node.items, &target), node.is_leaf)
            };

            match pos {
                Ok(i) if is_leaf => {
                    self.store.node_mut(id)?.items.remove(i);
                    self.store.write(id)?;
                    return Ok(true);
                }
                Ok(i) => {
                    let (left, right) = {
                        let node = self.store.node(id)?;
                        (child_at(node, id, i)?, child_at(node, id, i + 1)?)
                    };

                    if self.store.node(left)?.len() >= t {
                        let pred = self.max_item(left)?;
                        self.store.node_mut(id)?.items[i] = pred.clone();
                        self.store.write(id)?;
                        id = left;
                        target = pred;
                    } else if self.store.node(right)?.len() >= t {
                        let succ = self.min_item(right)?;
                        self.store.node_mut(id)?.items[i] = succ.clone();
                        self.store.write(id)?;
                        id = right;
                        target = succ;
                    } else {
                        self.merge(id, i)?;
                        self.store.write(id)?;
                        id = left;
                    }
                }
                Err(_) if is_leaf => return Ok(false),
                Err(mut i) => {
                    let child = child_at(self.store.node(id)?, id, i)?;
                    if self.store.node(child)?.len() < t {
                        self.fill(id, i)?;
                        // Merging the last child into its left sibling shifts it down.
                        if i > self.store.node(id)?.len() {
                            i -= 1;
                        }
                    }
                    id = child_at(self.store.node(id)?, id, i)?;
                }
            }
        }
    }

    /// Bring child `i` of `parent` up to at least `t` items
    fn fill(&mut self, parent: NodeId, i: usize) -> Result<()> {
        let t = self.order;
        let (len, prev, next) = {
            let node = self.store.node(parent)?;
            let prev = if i > 0 { Some(child_at(node, parent, i - 1)?) } else { None };
            let next = if i < node.len() { Some(child_at(node, parent, i + 1)?) } else { None };
            (node.len(), prev, next)
        };

        if let Some(prev) = prev {
            if self.store.node(prev)?.len() >= t {
                self.borrow_from_prev(parent, i)?;
                return self.store.write(parent);
            }
        }
        if let Some(next) = next {
            if self.store.node(next)?.len() >= t {
                self.borrow_from_next(parent, i)?;
                return self.store.write(parent);
            }
        }

        if i < len {
            self.merge(parent, i)?;
        } else if i > 0 {
            self.merge(parent, i - 1)?;
        } else {
            return Err(StorageError::CorruptedNode { page_id: parent });
        }
        self.store.write(parent)
    }

    /// Rotate the last item of child `i-1` through the parent into child `i`
    fn borrow_from_prev(&mut self, parent: NodeId, i: usize) -> Result<()> {
        let (child, sibling) = {
            let node = self.store.node(parent)?;
            (child_at(node, parent, i)?, child_at(node, parent, i - 1)?)
        };

        let (moved_item, moved_child) = {
            let node = self.store.node_mut(sibling)?;
            let item = node
                .items
                .pop()
                .ok_or(StorageError::CorruptedNode { page_id: sibling })?;
            let child = if node.is_leaf { None } else { node.children.pop() };
            (item, child)
        };

        let separator = std::mem::replace(&mut self.store.node_mut(parent)?.items[i - 1], moved_item);
        {
            let node = self.store.node_mut(child)?;
            node.items.insert(0, separator);
            if let Some(moved) = moved_child {
                node.children.insert(0, moved);
            }
        }

        self.store.write(child)?;
        self.store.write(sibling)
    }

    /// Rotate the first item of child `i+1` through the parent into child `i`
    fn borrow_from_next(&mut self, parent: NodeId, i: usize) -> Result<()> {
        let (child, sibling) = {
            let node = self.store.node(parent)?;
            (child_at(node, parent, i)?, child_at(node, parent, i + 1)?)
        };

        let (moved_item, moved_child) = {
            let node = self.store.node_mut(sibling)?;
            if node.is_empty() {
                return Err(StorageError::CorruptedNode { page_id: sibling });
            }
            let item = node.items.remove(0);
            let child = if node.is_leaf || node.children.is_empty() {
                None
            } else {
                Some(node.children.remove(0))
            };
            (item, child)
        };

        let separator = std::mem::replace(&mut self.store.node_mut(parent)?.items[i], moved_item);
        {
            let node = self.store.node_mut(child)?;
            node.items.push(separator);
            if let Some(moved) = moved_child {
                node.children.push(moved);
            }
        }

        self.store.write(child)?;
        self.store.write(sibling)
    }

    /// Merge child `i + 1` and separator `i` into child `i`; the right
    /// sibling is deleted
    fn merge(&mut self, parent: NodeId, i: usize) -> Result<()> {
        let (child, sibling, separator) = {
            let node = self.store.node_mut(parent)?;
            let separator = node.items.remove(i);
            let sibling = node.children.remove(i + 1);
            (node.children[i], sibling, separator)
        };

        let (items, children) = {
            let node = self.store.node_mut(sibling)?;
            (std::mem::take(&mut node.items), std::mem::take(&mut node.children))
        };
        {
            let node = self.store.node_mut(child)?;
            node.items.push(separator);
            node.items.extend(items);
            if !node.is_leaf {
                node.children.extend(children);
            }
        }

        self.store.write(child)?;
        self.store.delete(sibling)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    fn update_item<F>(&mut self, item: &T, transform: F) -> Result<bool>
    where
        F: FnOnce(&T) -> T,
    {
        let Some((id, i)) = self.search_any(item)? else {
            return Ok(false);
        };

        let old = self.store.node(id)?.items[i].clone();
        let new = transform(&old);
        if self.comparer.compare(&old, &new) == Ordering::Equal {
            self.store.node_mut(id)?.items[i] = new;
            self.store.write(id)?;
        } else {
            self.remove_item(&old)?;
            self.insert_item(new)?;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Returns the leaf depth below `id`
    fn validate_subtree(
        &mut self,
        id: NodeId,
        is_root: bool,
        lower: Option<&T>,
        upper: Option<&T>,
    ) -> Result<usize> {
        let node = self.store.node(id)?.clone();
        let corrupt = |reason: &str| {
            tracing::warn!(node = id, reason, "B-tree invariant violated");
            StorageError::CorruptedNode { page_id: id }
        };

        if node.len() > self.max_items() {
            return Err(corrupt("too many items"));
        }
        if !is_root && node.len() < self.order - 1 {
            return Err(corrupt("too few items"));
        }
        if node.items.windows(2).any(|w| self.comparer.compare(&w[0], &w[1]) == Ordering::Greater) {
            return Err(corrupt("items out of order"));
        }
        if let (Some(lower), Some(first)) = (lower, node.items.first()) {
            if self.comparer.compare(first, lower) == Ordering::Less {
                return Err(corrupt("item below separator"));
            }
        }
        if let (Some(upper), Some(last)) = (upper, node.items.last()) {
            if self.comparer.compare(last, upper) == Ordering::Greater {
                return Err(corrupt("item above separator"));
            }
        }
        if node.is_leaf {
            return if node.children.is_empty() {
                Ok(0)
            } else {
                Err(corrupt("leaf with children"))
            };
        }
        if node.is_empty() {
            return Err(corrupt("empty internal node"));
        }
        if node.children.len() != node.len() + 1 {
            return Err(corrupt("child count mismatch"));
        }

        let mut depth = None;
        for (c, &child) in node.children.iter().enumerate() {
            let lo = if c == 0 { lower } else { node.items.get(c - 1) };
            let hi = if c == node.len() { upper } else { node.items.get(c) };
            let d = self.validate_subtree(child, false, lo, hi)?;
            match depth {
                None => depth = Some(d),
                Some(expected) if expected != d => return Err(corrupt("uneven leaf depth")),
                Some(_) => {}
            }
        }
        Ok(depth.unwrap_or(0) + 1)
    }
}

/// Binary search: `Ok` at some equal item, `Err` at the insertion point
#[inline]
pub(crate) fn search<T, C: Comparer<T>>(cmp: &C, items: &[T], item: &T) -> std::result::Result<usize, usize> {
    items.binary_search_by(|candidate| cmp.compare(candidate, item))
}

/// Move a hit to the leftmost equal item
#[inline]
pub(crate) fn left_border<T, C: Comparer<T>>(
    cmp: &C,
    items: &[T],
    item: &T,
    pos: std::result::Result<usize, usize>,
) -> std::result::Result<usize, usize> {
    match pos {
        Ok(mut i) => {
            while i > 0 && cmp.compare(item, &items[i - 1]) == Ordering::Equal {
                i -= 1;
            }
            Ok(i)
        }
        Err(i) => Err(i),
    }
}

/// Move a hit one past the rightmost equal item
#[inline]
pub(crate) fn right_border<T, C: Comparer<T>>(
    cmp: &C,
    items: &[T],
    item: &T,
    pos: std::result::Result<usize, usize>,
) -> std::result::Result<usize, usize> {
    match pos {
        Ok(mut i) => {
            while i < items.len() && cmp.compare(item, &items[i]) == Ordering::Equal {
                i += 1;
            }
            Ok(i)
        }
        Err(i) => Err(i),
    }
}

/// Number of items `<= item`: where a new duplicate goes
#[inline]
fn upper_bound<T, C: Comparer<T>>(cmp: &C, items: &[T], item: &T) -> usize {
    items.partition_point(|candidate| cmp.compare(candidate, item) != Ordering::Greater)
}

#[inline]
pub(crate) fn child_at<T>(node: &Node<T>, id: NodeId, i: usize) -> Result<NodeId> {
    node.children
        .get(i)
        .copied()
        .ok_or(StorageError::CorruptedNode { page_id: id })
}
