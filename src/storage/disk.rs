//! Disk-resident node store
//!
//! Turns the tree's persistence hooks into page I/O over any
//! `Read + Write + Seek` stream. Node shells are decoded on first access
//! within an operation and dropped again when the operation completes, so
//! memory stays bounded by the nodes one operation touches.
//!
//! ## Allocation
//! 1. Pop the free-list head (LIFO reuse of deleted pages)
//! 2. Otherwise take `high_water + 1`, growing the stream by a batch of
//!    pages when the new page would end past it
//!
//! Every header change is written through immediately and every write is
//! followed by a flush.

use super::page::{
    PageHeader, PageLayout, FREE_HEAD_OFFSET, HEADER_SIZE, HIGH_WATER_OFFSET, ROOT_OFFSET,
    TOMBSTONE_SIZE,
};
use super::NodeStore;
use crate::btree::{Node, NodeId};
use crate::cache::{CacheStats, PageCache};
use crate::codec::ItemCodec;
use crate::config::BTreeConfig;
use crate::{Result, StorageError};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Page store over a seekable byte stream
///
/// Pass `&mut stream` instead of `stream` to keep ownership of the stream
/// after the store is gone.
pub struct DiskPageStore<T, F> {
    stream: F,

    /// Current stream length in bytes
    stream_len: u64,

    /// Order `t`
    order: usize,

    layout: PageLayout,

    /// In-memory mirror of the on-disk header
    header: PageHeader,

    /// Pages added per growth step
    growth_pages: u64,

    codec: Box<dyn ItemCodec<T>>,

    /// Optional read-through/write-through cache keyed by offset
    cache: Option<PageCache>,

    /// Node shells loaded during the current operation
    nodes: HashMap<NodeId, Node<T>>,
}

impl<T> DiskPageStore<T, File> {
    /// Open (or create) a page file
    pub fn open_path<P: AsRef<Path>>(
        path: P,
        config: &BTreeConfig,
        codec: Box<dyn ItemCodec<T>>,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "opening page file");
        Self::open(file, config, codec)
    }
}

impl<T, F: Read + Write + Seek> DiskPageStore<T, F> {
    /// Attach to `stream`, initialising it when shorter than a header
    pub fn open(mut stream: F, config: &BTreeConfig, codec: Box<dyn ItemCodec<T>>) -> Result<Self> {
        config.validate()?;
        let layout = PageLayout::new(config.order, codec.max_encoded_len())?;
        let stream_len = stream.seek(SeekFrom::End(0))?;

        let mut store = Self {
            stream,
            stream_len,
            order: config.order,
            layout,
            header: PageHeader::fresh(),
            growth_pages: config.growth_pages,
            codec,
            cache: config.memory_budget.map(PageCache::new),
            nodes: HashMap::new(),
        };

        if stream_len < HEADER_SIZE {
            store.initialize()?;
        } else {
            store.header = store.read_header()?;
            store.header.validate(stream_len)?;
            if store.header.high_water < 0 {
                // Header written but no page yet.
                store.create_root()?;
            }
        }

        tracing::debug!(
            order = config.order,
            page_size = layout.page_size(),
            root = store.header.root,
            high_water = store.header.high_water,
            "page store ready"
        );
        Ok(store)
    }

    /// Page geometry
    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Current header values
    pub fn header(&self) -> PageHeader {
        self.header
    }

    /// Number of node shells currently held in memory
    pub fn loaded_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(PageCache::stats)
    }

    pub fn cache(&self) -> Option<&PageCache> {
        self.cache.as_ref()
    }

    /// Flush and drop the stream
    pub fn close(mut self) -> Result<()> {
        self.nodes.clear();
        self.stream.flush()?;
        Ok(())
    }

    /// Flush and hand back the stream
    pub fn into_inner(mut self) -> Result<F> {
        self.stream.flush()?;
        Ok(self.stream)
    }

    fn initialize(&mut self) -> Result<()> {
        tracing::debug!("initialising empty page store");
        self.header = PageHeader::fresh();
        let bytes = self.header.to_bytes();
        self.stream.seek(SeekFrom::Start(0))?;
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        self.stream_len = self.stream_len.max(HEADER_SIZE);
        self.create_root()
    }

    /// Allocate and persist an empty leaf as the root
    fn create_root(&mut self) -> Result<()> {
        let root = self.allocate(true)?;
        self.write(root)?;
        self.store_root(root)?;
        self.nodes.clear();
        Ok(())
    }

    fn read_header(&mut self) -> Result<PageHeader> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        self.stream.seek(SeekFrom::Start(0))?;
        if read_full(&mut self.stream, &mut buf)? < buf.len() {
            return Err(StorageError::CorruptedHeader("short header".into()));
        }
        Ok(PageHeader::from_bytes(&buf))
    }

    fn write_header_field(&mut self, offset: u64, value: i64) -> Result<()> {
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream.write_all(&value.to_le_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read `buf.len()` bytes at `offset`; `false` on a short read
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<bool> {
        if let Some(cache) = self.cache.as_mut() {
            if cache.try_get(offset, buf) {
                return Ok(true);
            }
        }

        self.stream.seek(SeekFrom::Start(offset))?;
        if read_full(&mut self.stream, buf)? < buf.len() {
            return Ok(false);
        }
        if let Some(cache) = self.cache.as_mut() {
            cache.set(offset, buf);
        }
        Ok(true)
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        if let Some(cache) = self.cache.as_mut() {
            cache.set(offset, bytes);
        }
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Extend the stream so page `id` fits, in batches of pages
    fn ensure_capacity(&mut self, id: NodeId) -> Result<()> {
        let page_size = self.layout.page_size() as u64;
        if self.layout.offset(id) + page_size <= self.stream_len {
            return Ok(());
        }

        let new_len = self.layout.offset(id + self.growth_pages) + page_size;
        self.stream.seek(SeekFrom::Start(new_len - 1))?;
        self.stream.write_all(&[0u8])?;
        self.stream.flush()?;
        tracing::debug!(from = self.stream_len, to = new_len, "grew page file");
        self.stream_len = new_len;
        Ok(())
    }

    /// Next free id stored in the tombstone of page `id`
    fn read_tombstone(&mut self, id: NodeId) -> Result<i64> {
        let mut buf = [0u8; TOMBSTONE_SIZE];
        if !self.read_at(self.layout.offset(id), &mut buf)? {
            return Err(StorageError::CorruptedNode { page_id: id });
        }
        let next = PageLayout::decode_tombstone(id, &buf)?;
        if next < -1 || next > self.header.high_water {
            return Err(StorageError::CorruptedNode { page_id: id });
        }
        Ok(next)
    }

    fn load(&mut self, id: NodeId) -> Result<Node<T>> {
        if id as i64 > self.header.high_water {
            tracing::warn!(page = id, high_water = self.header.high_water, "page beyond high-water mark");
            return Err(StorageError::CorruptedNode { page_id: id });
        }

        let mut buf = vec![0u8; self.layout.page_size()];
        if !self.read_at(self.layout.offset(id), &mut buf)? {
            tracing::warn!(page = id, "short read");
            return Err(StorageError::CorruptedNode { page_id: id });
        }
        self.layout.decode(id, &buf, self.codec.as_ref())
    }

    fn shell(&mut self, id: NodeId) -> Result<&mut Node<T>> {
        if !self.nodes.contains_key(&id) {
            let node = self.load(id)?;
            tracing::trace!(page = id, items = node.len(), "loaded page");
            self.nodes.insert(id, node);
        }
        self.nodes
            .get_mut(&id)
            .ok_or(StorageError::CorruptedNode { page_id: id })
    }
}

impl<T, F: Read + Write + Seek> NodeStore<T> for DiskPageStore<T, F> {
    fn load_root(&mut self) -> Result<NodeId> {
        Ok(self.header.root as NodeId)
    }

    fn store_root(&mut self, id: NodeId) -> Result<()> {
        self.header.root = id as i64;
        self.write_header_field(ROOT_OFFSET, self.header.root)
    }

    fn allocate(&mut self, is_leaf: bool) -> Result<NodeId> {
        let id = if self.header.free_head >= 0 {
            let id = self.header.free_head as NodeId;
            let next = self.read_tombstone(id)?;
            self.header.free_head = next;
            self.write_header_field(FREE_HEAD_OFFSET, next)?;
            id
        } else {
            let id = (self.header.high_water + 1) as NodeId;
            self.ensure_capacity(id)?;
            self.header.high_water = id as i64;
            self.write_header_field(HIGH_WATER_OFFSET, self.header.high_water)?;
            id
        };

        tracing::trace!(page = id, is_leaf, "allocated page");
        self.nodes.insert(id, Node::with_order(self.order, is_leaf));
        Ok(id)
    }

    fn node(&mut self, id: NodeId) -> Result<&Node<T>> {
        self.shell(id).map(|node| &*node)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<T>> {
        self.shell(id)
    }

    fn write(&mut self, id: NodeId) -> Result<()> {
        let mut page = vec![0u8; self.layout.page_size()];
        let used = {
            let node = self
                .nodes
                .get(&id)
                .ok_or(StorageError::CorruptedNode { page_id: id })?;
            self.layout.encode(node, self.codec.as_ref(), &mut page)?
        };
        self.write_at(self.layout.offset(id), &page[..used])
    }

    fn delete(&mut self, id: NodeId) -> Result<()> {
        let tombstone = PageLayout::encode_tombstone(self.header.free_head);
        self.write_at(self.layout.offset(id), &tombstone)?;
        self.header.free_head = id as i64;
        self.write_header_field(FREE_HEAD_OFFSET, self.header.free_head)?;
        self.nodes.remove(&id);
        tracing::trace!(page = id, "deleted page");
        Ok(())
    }

    fn free(&mut self, id: NodeId) {
        self.nodes.remove(&id);
    }

    fn release(&mut self) {
        self.nodes.clear();
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
