//! Error types for the pagetree storage engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A page could not be decoded as a live node.
    ///
    /// Raised for an unknown tag, a deleted page where a node was expected,
    /// a short read, or an item count outside `[0, 2t-1]`.
    #[error("Node {page_id} is corrupted")]
    CorruptedNode { page_id: u64 },

    #[error("Header is corrupted: {0}")]
    CorruptedHeader(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Type '{0}' is not supported, supply a custom ItemCodec")]
    UnsupportedType(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// True for errors that mean the backing stream can no longer be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::CorruptedNode { .. } | StorageError::CorruptedHeader(_)
        )
    }
}
