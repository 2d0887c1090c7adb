//! In-memory node arena

use super::NodeStore;
use crate::btree::{Node, NodeId};
use crate::{Result, StorageError};

/// Slab of nodes addressed by index
///
/// Nothing is persisted; `write`, `store_root`, `free` and `release` only
/// keep the bookkeeping straight. Deleted slots are recycled.
#[derive(Debug)]
pub struct MemoryStore<T> {
    order: usize,
    slots: Vec<Option<Node<T>>>,
    vacant: Vec<NodeId>,
    root: Option<NodeId>,
}

impl<T> MemoryStore<T> {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            slots: Vec::new(),
            vacant: Vec::new(),
            root: None,
        }
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }

    fn missing(id: NodeId) -> StorageError {
        StorageError::CorruptedNode { page_id: id }
    }
}

impl<T> NodeStore<T> for MemoryStore<T> {
    fn load_root(&mut self) -> Result<NodeId> {
        match self.root {
            Some(id) => Ok(id),
            None => {
                let id = self.allocate(true)?;
                self.root = Some(id);
                Ok(id)
            }
        }
    }

    fn store_root(&mut self, id: NodeId) -> Result<()> {
        self.root = Some(id);
        Ok(())
    }

    fn allocate(&mut self, is_leaf: bool) -> Result<NodeId> {
        let node = Node::with_order(self.order, is_leaf);
        match self.vacant.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(node);
                Ok(id)
            }
            None => {
                self.slots.push(Some(node));
                Ok((self.slots.len() - 1) as NodeId)
            }
        }
    }

    fn node(&mut self, id: NodeId) -> Result<&Node<T>> {
        self.slots
            .get(id as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Self::missing(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<T>> {
        self.slots
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| Self::missing(id))
    }

    fn write(&mut self, _id: NodeId) -> Result<()> {
        Ok(())
    }

    fn delete(&mut self, id: NodeId) -> Result<()> {
        let slot = self
            .slots
            .get_mut(id as usize)
            .ok_or_else(|| Self::missing(id))?;
        if slot.take().is_some() {
            self.vacant.push(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_root() {
        let mut store: MemoryStore<u32> = MemoryStore::new(2);
        assert_eq!(store.node_count(), 0);
        let root = store.load_root().unwrap();
        assert!(store.node(root).unwrap().is_leaf);
        assert_eq!(store.load_root().unwrap(), root);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_deleted_slots_are_reused() {
        let mut store: MemoryStore<u32> = MemoryStore::new(2);
        let a = store.allocate(true).unwrap();
        let b = store.allocate(false).unwrap();
        store.delete(a).unwrap();
        assert!(store.node(a).is_err());
        let c = store.allocate(true).unwrap();
        assert_eq!(c, a);
        assert!(!store.node(b).unwrap().is_leaf);
        assert_eq!(store.node_count(), 2);
    }
}
