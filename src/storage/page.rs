//! On-disk page format
//!
//! ## File Layout
//! ```text
//! ┌──────────────────────────────┐ 0
//! │ root page id          i64 LE │
//! │ free-list head        i64 LE │ 8   (-1 = empty)
//! │ highest allocated id  i64 LE │ 16  (-1 = none)
//! ├──────────────────────────────┤ 24
//! │ page 0                       │
//! │ page 1                       │
//! │ ...                          │
//! └──────────────────────────────┘
//! ```
//!
//! ## Page Layout
//! ```text
//! live:     [tag u8][count i32 LE][count × item][(count+1) × child i64 LE]
//!                                                 non-leaf only, -1 = absent
//! deleted:  [tag=2 u8][next free id i64 LE]
//! ```
//!
//! Every page occupies `1 + 4 + (2t-1)·w + 2t·8` bytes regardless of how
//! much of it is in use, so page `id` lives at `24 + id·page_size`.

use crate::btree::{Node, NodeId};
use crate::codec::ItemCodec;
use crate::{Result, StorageError};

/// Header size in bytes
pub const HEADER_SIZE: u64 = 24;

/// Header field offsets
pub const ROOT_OFFSET: u64 = 0;
pub const FREE_HEAD_OFFSET: u64 = 8;
pub const HIGH_WATER_OFFSET: u64 = 16;

/// Size of a tombstone body
pub const TOMBSTONE_SIZE: usize = 9;

const TAG_SIZE: usize = 1;
const COUNT_SIZE: usize = 4;
const CHILD_ID_SIZE: usize = 8;
const ABSENT_CHILD: i64 = -1;

/// Leading byte of every page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageTag {
    NonLeaf = 0,
    Leaf = 1,
    Deleted = 2,
}

impl PageTag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PageTag::NonLeaf),
            1 => Some(PageTag::Leaf),
            2 => Some(PageTag::Deleted),
            _ => None,
        }
    }
}

/// File header: root pointer and page allocation bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub root: i64,
    pub free_head: i64,
    pub high_water: i64,
}

impl PageHeader {
    /// Header of a store with no pages yet
    pub fn fresh() -> Self {
        Self {
            root: 0,
            free_head: -1,
            high_water: -1,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&self.root.to_le_bytes());
        buf[8..16].copy_from_slice(&self.free_head.to_le_bytes());
        buf[16..24].copy_from_slice(&self.high_water.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Self {
        let field = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[at..at + 8]);
            i64::from_le_bytes(bytes)
        };
        Self {
            root: field(0),
            free_head: field(8),
            high_water: field(16),
        }
    }

    /// Reject bookkeeping no sequence of operations could have produced
    pub fn validate(&self, stream_len: u64) -> Result<()> {
        let corrupt = |reason: String| Err(StorageError::CorruptedHeader(reason));

        if self.high_water < -1 {
            return corrupt(format!("high-water id {} is negative", self.high_water));
        }
        if self.high_water == -1 && stream_len > HEADER_SIZE {
            return corrupt("no page allocated but the file holds page data".into());
        }
        if self.free_head < -1 || self.free_head > self.high_water {
            return corrupt(format!(
                "free-list head {} outside allocated pages (high-water {})",
                self.free_head, self.high_water
            ));
        }
        if self.high_water >= 0 && (self.root < 0 || self.root > self.high_water) {
            return corrupt(format!(
                "root {} outside allocated pages (high-water {})",
                self.root, self.high_water
            ));
        }
        Ok(())
    }
}

/// Page geometry for one order and item width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    order: usize,
    item_width: usize,
}

impl PageLayout {
    pub fn new(order: usize, item_width: usize) -> Result<Self> {
        if item_width == 0 {
            return Err(StorageError::InvalidArgument(
                "codec reports a zero item width".into(),
            ));
        }
        Ok(Self { order, item_width })
    }

    #[inline]
    pub fn max_items(&self) -> usize {
        2 * self.order - 1
    }

    #[inline]
    pub fn item_width(&self) -> usize {
        self.item_width
    }

    /// Fixed page size
    #[inline]
    pub fn page_size(&self) -> usize {
        TAG_SIZE + COUNT_SIZE + self.max_items() * self.item_width + 2 * self.order * CHILD_ID_SIZE
    }

    /// Byte offset of page `id`
    #[inline]
    pub fn offset(&self, id: NodeId) -> u64 {
        HEADER_SIZE + id * self.page_size() as u64
    }

    /// Encode a live node; returns the number of bytes used
    pub fn encode<T>(&self, node: &Node<T>, codec: &dyn ItemCodec<T>, buf: &mut [u8]) -> Result<usize> {
        let count = node.len();
        if count > self.max_items() || buf.len() < self.page_size() {
            return Err(StorageError::Serialization(format!(
                "node with {} items does not fit a page of order {}",
                count, self.order
            )));
        }

        buf[0] = if node.is_leaf {
            PageTag::Leaf as u8
        } else {
            PageTag::NonLeaf as u8
        };
        buf[TAG_SIZE..TAG_SIZE + COUNT_SIZE].copy_from_slice(&(count as i32).to_le_bytes());

        let mut pos = TAG_SIZE + COUNT_SIZE;
        for item in &node.items {
            codec.encode(item, &mut buf[pos..pos + self.item_width]);
            pos += self.item_width;
        }

        if !node.is_leaf {
            for slot in 0..=count {
                let id = node.children.get(slot).map_or(ABSENT_CHILD, |&c| c as i64);
                buf[pos..pos + CHILD_ID_SIZE].copy_from_slice(&id.to_le_bytes());
                pos += CHILD_ID_SIZE;
            }
        }
        Ok(pos)
    }

    /// Decode page `id`
    ///
    /// Fails with [`StorageError::CorruptedNode`] for a deleted or unknown
    /// tag, a count outside `[0, 2t-1]`, or an absent child slot.
    pub fn decode<T>(&self, id: NodeId, buf: &[u8], codec: &dyn ItemCodec<T>) -> Result<Node<T>> {
        let corrupt = || StorageError::CorruptedNode { page_id: id };
        if buf.len() < self.page_size() {
            return Err(corrupt());
        }

        let is_leaf = match PageTag::from_byte(buf[0]) {
            Some(PageTag::Leaf) => true,
            Some(PageTag::NonLeaf) => false,
            Some(PageTag::Deleted) | None => return Err(corrupt()),
        };

        let count = read_i32(&buf[TAG_SIZE..]);
        if count < 0 || count as usize > self.max_items() {
            return Err(corrupt());
        }
        let count = count as usize;

        let mut node = Node::with_order(self.order, is_leaf);
        let mut pos = TAG_SIZE + COUNT_SIZE;
        for _ in 0..count {
            node.items.push(codec.decode(&buf[pos..pos + self.item_width])?);
            pos += self.item_width;
        }

        if !is_leaf {
            for _ in 0..=count {
                let child = read_i64(&buf[pos..]);
                if child < 0 {
                    return Err(corrupt());
                }
                node.children.push(child as NodeId);
                pos += CHILD_ID_SIZE;
            }
        }
        Ok(node)
    }

    /// Tombstone for a deleted page pointing at the previous free-list head
    pub fn encode_tombstone(next_free: i64) -> [u8; TOMBSTONE_SIZE] {
        let mut buf = [0u8; TOMBSTONE_SIZE];
        buf[0] = PageTag::Deleted as u8;
        buf[1..].copy_from_slice(&next_free.to_le_bytes());
        buf
    }

    /// Next free id stored in the tombstone of page `id`
    pub fn decode_tombstone(id: NodeId, buf: &[u8]) -> Result<i64> {
        if buf.len() < TOMBSTONE_SIZE || PageTag::from_byte(buf[0]) != Some(PageTag::Deleted) {
            return Err(StorageError::CorruptedNode { page_id: id });
        }
        Ok(read_i64(&buf[1..]))
    }
}

#[inline]
fn read_i32(buf: &[u8]) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[..4]);
    i32::from_le_bytes(bytes)
}

#[inline]
fn read_i64(buf: &[u8]) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[..8]);
    i64::from_le_bytes(bytes)
}
