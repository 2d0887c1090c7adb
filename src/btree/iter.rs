//! Lazy in-order traversal
//!
//! The iterator keeps an explicit stack of `(node, cursor)` frames instead
//! of recursing, so a walk can be suspended between any two items. Nodes
//! are loaded only when their frame is first visited and freed as soon as
//! the walk has left them for good.
//!
//! Cursor meaning per frame:
//!
//! ```text
//!              ascending                      descending
//! leaf         next item index                items still to yield
//! non-leaf     next child to enter;           next child to enter;
//!              item[c-1] is yielded first     item[c] is yielded first
//! ```

use super::{child_at, left_border, right_border, search, BTree, Comparer, NodeId};
use crate::storage::NodeStore;
use crate::Result;

#[derive(Debug, Clone, Copy)]
struct Frame {
    id: NodeId,
    cursor: usize,
}

/// Ordered iterator over a [`BTree`]
///
/// Yields `Result<T>`: a failed node load is reported once and ends the
/// walk. The tree stays mutably borrowed until the iterator is dropped,
/// at which point every node shell it loaded is released.
pub struct Iter<'a, T, S: NodeStore<T>, C> {
    tree: &'a mut BTree<T, S, C>,
    stack: Vec<Frame>,
    reverse: bool,
}

impl<'a, T: Clone, S: NodeStore<T>, C: Comparer<T>> Iter<'a, T, S, C> {
    /// Walk the whole tree
    pub(super) fn from_root(tree: &'a mut BTree<T, S, C>, root: NodeId, reverse: bool) -> Result<Self> {
        let mut iter = Self {
            tree,
            stack: Vec::new(),
            reverse,
        };
        let cursor = if reverse {
            iter.tree.store.node(root).map(|node| node.len())
        } else {
            Ok(0)
        };
        let started = cursor.map(|cursor| iter.stack.push(Frame { id: root, cursor }));
        iter.started(started)
    }

    /// Walk from the first item `>= pivot` up, or the last item `<= pivot` down
    pub(super) fn from_pivot(
        tree: &'a mut BTree<T, S, C>,
        root: NodeId,
        pivot: &T,
        reverse: bool,
    ) -> Result<Self> {
        let mut iter = Self {
            tree,
            stack: Vec::new(),
            reverse,
        };
        let started = if reverse {
            iter.search_last(root, pivot)
        } else {
            iter.search_first(root, pivot)
        };
        iter.started(started)
    }

    /// A walk that failed to start forgets the cached root, as any failed
    /// tree operation does; dropping `self` releases what was loaded.
    fn started(mut self, result: Result<()>) -> Result<Self> {
        match result {
            Ok(()) => Ok(self),
            Err(e) => {
                self.tree.root = None;
                Err(e)
            }
        }
    }

    /// Stack leading to the leftmost item not less than `pivot`
    fn search_first(&mut self, mut id: NodeId, pivot: &T) -> Result<()> {
        let tree = &mut *self.tree;
        loop {
            let node = tree.store.node(id)?;
            let pos = left_border(&tree.comparer, &node.items, pivot, search(&tree.comparer, &node.items, pivot));
            if node.is_leaf {
                let (Ok(start) | Err(start)) = pos;
                self.stack.push(Frame { id, cursor: start });
                return Ok(());
            }

            let len = node.len();
            let next = match pos {
                Ok(i) => {
                    self.stack.push(Frame { id, cursor: i + 1 });
                    child_at(node, id, i)?
                }
                Err(i) => {
                    let child = child_at(node, id, i)?;
                    if i < len {
                        self.stack.push(Frame { id, cursor: i + 1 });
                    } else {
                        tree.store.free(id);
                    }
                    child
                }
            };
            id = next;
        }
    }

    /// Stack leading to the rightmost item not greater than `pivot`
    fn search_last(&mut self, mut id: NodeId, pivot: &T) -> Result<()> {
        let tree = &mut *self.tree;
        loop {
            let node = tree.store.node(id)?;
            let pos = right_border(&tree.comparer, &node.items, pivot, search(&tree.comparer, &node.items, pivot));
            if node.is_leaf {
                let (Ok(end) | Err(end)) = pos;
                self.stack.push(Frame { id, cursor: end });
                return Ok(());
            }

            let next = match pos {
                Ok(i) => {
                    // `i` is one past an equal item, so `i >= 1`.
                    self.stack.push(Frame { id, cursor: i - 1 });
                    child_at(node, id, i)?
                }
                Err(i) => {
                    let child = child_at(node, id, i)?;
                    if i > 0 {
                        self.stack.push(Frame { id, cursor: i - 1 });
                    } else {
                        tree.store.free(id);
                    }
                    child
                }
            };
            id = next;
        }
    }

    fn next_ascending(&mut self) -> Result<Option<T>> {
        while let Some(&Frame { id, cursor }) = self.stack.last() {
            let node = self.tree.store.node(id)?;

            if node.is_leaf {
                if let Some(item) = node.items.get(cursor) {
                    let item = item.clone();
                    if let Some(top) = self.stack.last_mut() {
                        top.cursor += 1;
                    }
                    return Ok(Some(item));
                }
                self.stack.pop();
                self.tree.store.free(id);
                continue;
            }

            let len = node.len();
            let child = child_at(node, id, cursor)?;
            let item = cursor.checked_sub(1).map(|i| node.items[i].clone());

            self.stack.pop();
            if cursor < len {
                self.stack.push(Frame { id, cursor: cursor + 1 });
            } else {
                self.tree.store.free(id);
            }
            self.stack.push(Frame { id: child, cursor: 0 });

            if item.is_some() {
                return Ok(item);
            }
        }
        Ok(None)
    }

    fn next_descending(&mut self) -> Result<Option<T>> {
        while let Some(&Frame { id, cursor }) = self.stack.last() {
            let node = self.tree.store.node(id)?;

            if node.is_leaf {
                if cursor > 0 {
                    let item = node.items[cursor - 1].clone();
                    if let Some(top) = self.stack.last_mut() {
                        top.cursor -= 1;
                    }
                    return Ok(Some(item));
                }
                self.stack.pop();
                self.tree.store.free(id);
                continue;
            }

            let child = child_at(node, id, cursor)?;
            let item = node.items.get(cursor).cloned();

            self.stack.pop();
            if cursor > 0 {
                self.stack.push(Frame { id, cursor: cursor - 1 });
            } else {
                self.tree.store.free(id);
            }
            let child_len = self.tree.store.node(child)?.len();
            self.stack.push(Frame { id: child, cursor: child_len });

            if item.is_some() {
                return Ok(item);
            }
        }
        Ok(None)
    }
}

impl<'a, T: Clone, S: NodeStore<T>, C: Comparer<T>> Iterator for Iter<'a, T, S, C> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = if self.reverse {
            self.next_descending()
        } else {
            self.next_ascending()
        };
        match step {
            Ok(item) => item.map(Ok),
            Err(e) => {
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}

impl<'a, T, S: NodeStore<T>, C> Drop for Iter<'a, T, S, C> {
    fn drop(&mut self) {
        self.tree.store.release();
    }
}

#[cfg(test)]
mod tests {
    use crate::btree::BTree;

    fn filled(order: usize, values: impl IntoIterator<Item = i32>) -> BTree<i32> {
        let mut tree = BTree::new(order).unwrap();
        for v in values {
            tree.insert(v).unwrap();
        }
        tree
    }

    fn from(tree: &mut BTree<i32>, pivot: i32, reverse: bool) -> Vec<i32> {
        tree.iter_from(&pivot, reverse).unwrap().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_iter_from_scenario() {
        let mut tree = filled(2, [1, 2, 3, 5, 5, 7]);
        assert_eq!(from(&mut tree, 4, false), vec![5, 5, 7]);
        assert_eq!(from(&mut tree, 5, true), vec![5, 5, 3, 2, 1]);
        assert_eq!(from(&mut tree, 5, false), vec![5, 5, 7]);
        assert_eq!(from(&mut tree, 4, true), vec![3, 2, 1]);
    }

    #[test]
    fn test_iter_from_out_of_range() {
        let mut tree = filled(2, 10..20);
        assert!(from(&mut tree, 100, false).is_empty());
        assert!(from(&mut tree, -1, true).is_empty());
        assert_eq!(from(&mut tree, -1, false), (10..20).collect::<Vec<_>>());
        assert_eq!(from(&mut tree, 100, true), (10..20).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_iter_from_every_pivot_against_sorted_vec() {
        let values: Vec<i32> = (0..300).map(|i| (i * 37) % 101).collect();
        let mut tree = filled(3, values.iter().copied());
        let mut sorted = values.clone();
        sorted.sort();

        for pivot in -1..=102 {
            let up: Vec<i32> = sorted.iter().copied().filter(|&v| v >= pivot).collect();
            let down: Vec<i32> = sorted.iter().rev().copied().filter(|&v| v <= pivot).collect();
            assert_eq!(from(&mut tree, pivot, false), up, "ascending from {}", pivot);
            assert_eq!(from(&mut tree, pivot, true), down, "descending from {}", pivot);
        }
    }

    #[test]
    fn test_partial_walk_then_mutate() {
        let mut tree = filled(2, 0..100);
        let first: Vec<i32> = tree.iter(false).unwrap().take(3).map(|r| r.unwrap()).collect();
        assert_eq!(first, vec![0, 1, 2]);
        tree.insert(-5).unwrap();
        let first = tree.iter(false).unwrap().next().unwrap().unwrap();
        assert_eq!(first, -5);
    }

    #[test]
    fn test_duplicates_across_levels() {
        let mut tree = filled(2, std::iter::repeat(7).take(40).chain([1, 20]));
        assert_eq!(from(&mut tree, 7, false).len(), 41);
        assert_eq!(from(&mut tree, 7, true).len(), 41);
        assert_eq!(from(&mut tree, 8, false), vec![20]);
        assert_eq!(from(&mut tree, 6, true), vec![1]);
    }

    #[test]
    fn test_failed_start_forgets_cached_root() {
        let mut tree = filled(2, 0..20);

        tree.root = Some(9999);
        assert!(tree.iter(true).is_err());
        assert_eq!(tree.root, None);
        assert_eq!(tree.iter(false).unwrap().count(), 20);

        tree.root = Some(9999);
        assert!(tree.iter_from(&5, false).is_err());
        assert_eq!(tree.root, None);
        assert_eq!(from(&mut tree, 15, false), vec![15, 16, 17, 18, 19]);
    }
}
