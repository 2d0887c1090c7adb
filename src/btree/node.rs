//! Node shells shared by every store

/// Stable node handle: a slab index in memory, a page id on disk
pub type NodeId = u64;

/// One B-tree node
///
/// `items.len()` is the item count `N`. A non-leaf node with `N` items
/// holds exactly `N + 1` children; leaves hold none.
#[derive(Debug, Clone, PartialEq)]
pub struct Node<T> {
    pub is_leaf: bool,
    pub items: Vec<T>,
    pub children: Vec<NodeId>,
}

impl<T> Node<T> {
    /// Empty shell with room for a full node of order `t`
    pub fn with_order(order: usize, is_leaf: bool) -> Self {
        Self {
            is_leaf,
            items: Vec::with_capacity(2 * order - 1),
            children: if is_leaf {
                Vec::new()
            } else {
                Vec::with_capacity(2 * order)
            },
        }
    }

    /// Item count
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_order_capacity() {
        let node: Node<u32> = Node::with_order(3, false);
        assert!(node.items.capacity() >= 5);
        assert!(node.children.capacity() >= 6);
        assert!(node.is_empty());
    }

    #[test]
    fn test_len_counts_items() {
        let node = Node {
            is_leaf: false,
            items: vec![1, 2],
            children: vec![7, 8, 9],
        };
        assert_eq!(node.len(), 2);
        assert!(!node.is_empty());
    }
}
