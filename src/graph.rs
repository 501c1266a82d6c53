use std::fs::File;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::OnceLock;

use lru::LruCache;
use memmap2::Mmap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::access::SymbolNode;
use crate::buffer::ImageBuffer;
use crate::error::{CographError, Result};
use crate::interval::IntervalIndex;
use crate::schema::Header;
use crate::verify::{self, IntegrityReport};

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Open-time knobs; the defaults map the file read-only and keep a
/// bounded spatial-query cache.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    pub use_mmap: bool,
    pub cache_capacity: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            use_mmap: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl GraphOptions {
    /// Loads the whole file into memory instead of mapping it.
    pub fn in_memory() -> Self {
        Self {
            use_mmap: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub node_count: u32,
    pub edge_count: u32,
    pub source_len: u32,
    pub image_len: usize,
    pub flags: u16,
    pub interval_entries: u32,
}

/// Read-side façade over one image: root access, stats, and the spatial
/// query. Cloning accessors out of it is free; the graph only owns the
/// buffer, the lazily loaded interval index, and the query cache.
#[derive(Debug)]
pub struct Graph {
    buffer: ImageBuffer,
    index: OnceLock<Option<IntervalIndex>>,
    cache: Mutex<LruCache<u32, Vec<u32>>>,
}

impl Graph {
    /// Opens a graph over owned image bytes.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        Self::from_buffer(ImageBuffer::open(bytes)?, DEFAULT_CACHE_CAPACITY)
    }

    /// Opens a graph from a file read-only, memory-mapping it for the
    /// graph's lifetime.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_file_with_options(path, GraphOptions::default())
    }

    pub fn open_file_with_options(
        path: impl AsRef<Path>,
        options: GraphOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let buffer = if options.use_mmap {
            let map = unsafe { Mmap::map(&file)? };
            debug!(path = %path.display(), bytes = map.len(), "mapped image read-only");
            ImageBuffer::from_mmap(map)?
        } else {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            debug!(path = %path.display(), bytes = bytes.len(), "loaded image into memory");
            ImageBuffer::open(bytes)?
        };
        Self::from_buffer(buffer, options.cache_capacity)
    }

    fn from_buffer(buffer: ImageBuffer, cache_capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(cache_capacity)
            .unwrap_or(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).expect("nonzero default"));
        Ok(Self {
            buffer,
            index: OnceLock::new(),
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn buffer(&self) -> &ImageBuffer {
        &self.buffer
    }

    pub fn header(&self) -> Header {
        self.buffer.header()
    }

    /// The symbol-node accessor at `header.root_offset`.
    pub fn root(&self) -> Result<SymbolNode<'_>> {
        let offset = self.buffer.header().root_offset;
        if offset == 0 {
            return Err(CographError::NotFound("root node"));
        }
        SymbolNode::read(&self.buffer, offset)
    }

    /// Symbol-node accessor at an arbitrary image offset.
    pub fn node_at(&self, offset: u32) -> Result<SymbolNode<'_>> {
        SymbolNode::read(&self.buffer, offset)
    }

    pub fn source_text(&self) -> Result<&str> {
        self.buffer.source_text()
    }

    pub fn stats(&self) -> Result<Stats> {
        let header = self.buffer.header();
        Ok(Stats {
            node_count: header.node_count,
            edge_count: header.edge_count,
            source_len: header.source_len,
            image_len: self.buffer.len(),
            flags: header.flags,
            interval_entries: self.buffer.list_count(header.interval_index_offset)?,
        })
    }

    fn interval_index(&self) -> Result<Option<&IntervalIndex>> {
        if let Some(loaded) = self.index.get() {
            return Ok(loaded.as_ref());
        }
        let loaded = match self.buffer.header().interval_index_offset {
            0 => None,
            offset => Some(IntervalIndex::load(&self.buffer, offset)?),
        };
        Ok(self.index.get_or_init(|| loaded).as_ref())
    }

    /// Offsets of every node whose source span contains `point`, in
    /// ascending span-start order; empty when the image carries no index.
    /// Results are served from a bounded per-graph cache.
    pub fn find_nodes_at(&self, point: u32) -> Result<Vec<u32>> {
        if let Some(hit) = self.cache.lock().get(&point) {
            return Ok(hit.clone());
        }
        let nodes = match self.interval_index()? {
            Some(index) => index.nodes_at(point),
            None => Vec::new(),
        };
        self.cache.lock().put(point, nodes.clone());
        Ok(nodes)
    }

    /// Invokes `visitor` for each node whose span contains `point`,
    /// without materializing an offset list.
    pub fn process_nodes_at<F>(&self, point: u32, mut visitor: F) -> Result<()>
    where
        F: FnMut(SymbolNode<'_>) -> Result<()>,
    {
        let Some(index) = self.interval_index()? else {
            return Ok(());
        };
        for entry in index.find_at(point) {
            visitor(SymbolNode::read(&self.buffer, entry.node_offset)?)?;
        }
        Ok(())
    }

    /// Walks the whole image checking the format invariants; corrupt
    /// images produce findings, never panics.
    pub fn verify_integrity(&self) -> IntegrityReport {
        verify::verify_image(&self.buffer)
    }
}
