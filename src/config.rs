//! Tree configuration
//!
//! Construction parameters shared by the in-memory and disk-backed trees.

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};

/// Default order `t` (a node holds between `t-1` and `2t-1` items)
pub const DEFAULT_ORDER: usize = 20;

/// Number of pages the backing file grows by when it runs out of room
pub const DEFAULT_GROWTH_PAGES: u64 = 1024;

/// B-tree configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BTreeConfig {
    /// Order `t` of the tree (must be at least 2)
    pub order: usize,

    /// Byte budget of the page cache in front of the disk store.
    ///
    /// `None` disables caching; the in-memory tree ignores it.
    pub memory_budget: Option<u64>,

    /// File growth batch, in pages
    pub growth_pages: u64,
}

impl Default for BTreeConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            memory_budget: None,
            growth_pages: DEFAULT_GROWTH_PAGES,
        }
    }
}

impl BTreeConfig {
    /// Default configuration with a custom order
    pub fn with_order(order: usize) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Enable the page cache with the given byte budget
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Override the file growth batch
    pub fn with_growth_pages(mut self, pages: u64) -> Self {
        self.growth_pages = pages;
        self
    }

    /// Reject parameters no tree can be built with
    pub fn validate(&self) -> Result<()> {
        validate_order(self.order)?;
        if self.growth_pages == 0 {
            return Err(StorageError::InvalidArgument(
                "'growth_pages' must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Check that `t` describes a valid B-tree order
pub(crate) fn validate_order(order: usize) -> Result<()> {
    if order <= 1 {
        return Err(StorageError::InvalidArgument(format!(
            "'t' must be a positive number and greater than 1, got {}",
            order
        )));
    }
    Ok(())
}
