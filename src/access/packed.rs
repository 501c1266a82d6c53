use crate::buffer::ImageBuffer;
use crate::error::Result;
use crate::schema::{PackedNodeRecord, NULL_OFFSET};

use super::edge::CpgEdges;
use super::list::OffsetList;
use super::node::SymbolNode;

/// View over one packed node, a single derivation of a symbol.
#[derive(Debug, Copy, Clone)]
pub struct PackedNode<'a> {
    buffer: &'a ImageBuffer,
    offset: u32,
    record: PackedNodeRecord,
}

impl<'a> PackedNode<'a> {
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

    pub fn rule_id(&self) -> u16 {
        self.record.rule_id
    }

    pub fn children(&self) -> Result<ChildNodes<'a>> {
        Ok(ChildNodes {
            buffer: self.buffer,
            offsets: OffsetList::load(self.buffer, self.record.child_list_offset)?,
        })
    }

    pub fn edges(&self) -> Result<CpgEdges<'a>> {
        CpgEdges::load(self.buffer, self.record.cpg_edges_list_offset)
    }

    pub(crate) fn record(&self) -> PackedNodeRecord {
        self.record
    }
}

/// Collection of packed nodes under a symbol, in builder-emission order.
#[derive(Debug, Copy, Clone)]
pub struct PackedNodes<'a> {
    buffer: &'a ImageBuffer,
    offsets: OffsetList<'a>,
}

impl<'a> PackedNodes<'a> {
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

    pub fn get(&self, index: u32) -> Result<PackedNode<'a>> {
        PackedNode::read(self.buffer, self.offsets.get(index)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<PackedNode<'a>>> + 'a {
        let buffer = self.buffer;
        self.offsets
            .iter()
            .map(move |offset| PackedNode::read(buffer, offset))
    }
}

/// Child symbol nodes of a derivation. Offset 0 entries are deletion
/// sentinels and are skipped by iteration.
#[derive(Debug, Copy, Clone)]
pub struct ChildNodes<'a> {
    buffer: &'a ImageBuffer,
    offsets: OffsetList<'a>,
}

impl<'a> ChildNodes<'a> {
    pub fn count(&self) -> u32 {
        self.offsets.count()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> OffsetList<'a> {
        self.offsets
    }

    /// Child at `index`, or `None` when the slot holds the deletion
    /// sentinel.
    pub fn get(&self, index: u32) -> Result<Option<SymbolNode<'a>>> {
        let offset = self.offsets.get(index)?;
        if offset == NULL_OFFSET {
            return Ok(None);
        }
        Ok(Some(SymbolNode::read(self.buffer, offset)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<SymbolNode<'a>>> + 'a {
        let buffer = self.buffer;
        self.offsets
            .iter()
            .filter(|&offset| offset != NULL_OFFSET)
            .map(move |offset| SymbolNode::read(buffer, offset))
    }
}
