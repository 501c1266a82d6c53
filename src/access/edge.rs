use crate::buffer::ImageBuffer;
use crate::error::{CographError, Result};
use crate::schema::{CpgEdgeRecord, EdgeKind, NULL_OFFSET};
use crate::value::Value;

use super::list::OffsetList;
use super::node::SymbolNode;
use super::props::Properties;

/// View over one CPG edge attached to a derivation.
#[derive(Debug, Copy, Clone)]
pub struct CpgEdge<'a> {
    buffer: &'a ImageBuffer,
    offset: u32,
    record: CpgEdgeRecord,
}

impl<'a> CpgEdge<'a> {
    pub(crate) fn read(buffer: &'a ImageBuffer, offset: u32) -> Result<Self> {
        let record = buffer.read(offset)?;
        Ok(Self {
            buffer,
            offset,
            record,
        })
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn kind(&self) -> EdgeKind {
        self.record.kind
    }

    pub fn target_offset(&self) -> u32 {
        self.record.target_node_offset
    }

    /// Dereferences the target symbol node; the target slot may hold the
    /// deletion sentinel, which reads as `NotFound`.
    pub fn target(&self) -> Result<SymbolNode<'a>> {
        if self.record.target_node_offset == NULL_OFFSET {
            return Err(CographError::NotFound("edge target"));
        }
        SymbolNode::read(self.buffer, self.record.target_node_offset)
    }

    pub fn properties(&self) -> Result<Properties<'a>> {
        Properties::load(self.buffer, self.record.properties_list_offset)
    }

    pub fn try_property(&self, key: &str) -> Option<Value<'a>> {
        self.properties().ok()?.find(key).ok()?
    }

    pub(crate) fn record(&self) -> CpgEdgeRecord {
        self.record
    }
}

/// Collection of CPG edges under a derivation, in builder-emission order.
#[derive(Debug, Copy, Clone)]
pub struct CpgEdges<'a> {
    buffer: &'a ImageBuffer,
    offsets: OffsetList<'a>,
}

impl<'a> CpgEdges<'a> {
    pub(crate) fn load(buffer: &'a ImageBuffer, offset: u32) -> Result<Self> {
        Ok(Self {
            buffer,
            offsets: OffsetList::load(buffer, offset)?,
        })
    }

    pub fn count(&self) -> u32 {
        self.offsets.count()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> OffsetList<'a> {
        self.offsets
    }

    pub fn get(&self, index: u32) -> Result<CpgEdge<'a>> {
        CpgEdge::read(self.buffer, self.offsets.get(index)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<CpgEdge<'a>>> + 'a {
        let buffer = self.buffer;
        self.offsets
            .iter()
            .map(move |offset| CpgEdge::read(buffer, offset))
    }

    /// Lazy filter keeping only edges of the requested kind, preserving
    /// relative order. Decode failures pass through unfiltered.
    pub fn of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = Result<CpgEdge<'a>>> + 'a {
        self.iter().filter(move |entry| match entry {
            Ok(edge) => edge.kind() == kind,
            Err(_) => true,
        })
    }
}
