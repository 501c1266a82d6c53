use crate::buffer::ImageBuffer;
use crate::error::{CographError, Result};
use crate::schema::SymbolNodeRecord;
use crate::value::Value;

use super::packed::PackedNodes;
use super::props::Properties;

/// View over one symbol node, the SPPF parent for a grammar symbol
/// instance at a source span.
#[derive(Debug, Copy, Clone)]
pub struct SymbolNode<'a> {
    buffer: &'a ImageBuffer,
    offset: u32,
    record: SymbolNodeRecord,
}

impl<'a> SymbolNode<'a> {
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

    pub fn symbol_id(&self) -> u16 {
        self.record.symbol_id
    }

    pub fn node_type(&self) -> u16 {
        self.record.node_type
    }

    pub fn source_start(&self) -> u32 {
        self.record.source_start
    }

    pub fn source_length(&self) -> u32 {
        self.record.source_length
    }

    pub fn source_end(&self) -> u32 {
        self.record.source_start.saturating_add(self.record.source_length)
    }

    /// True when at least two derivations exist for this symbol at its
    /// span.
    pub fn is_ambiguous(&self) -> Result<bool> {
        if self.record.packed_list_offset == 0 {
            return Ok(false);
        }
        Ok(self.buffer.list_count(self.record.packed_list_offset)? > 1)
    }

    pub fn packed_nodes(&self) -> Result<PackedNodes<'a>> {
        PackedNodes::load(self.buffer, self.record.packed_list_offset)
    }

    pub fn properties(&self) -> Result<Properties<'a>> {
        Properties::load(self.buffer, self.record.properties_list_offset)
    }

    /// First property with a matching key, or an error when no property
    /// carries the key.
    pub fn property(&self, key: &str) -> Result<Value<'a>> {
        self.properties()?
            .find(key)?
            .ok_or(CographError::NotFound("property"))
    }

    /// Absent-on-failure form of [`SymbolNode::property`].
    pub fn try_property(&self, key: &str) -> Option<Value<'a>> {
        self.properties().ok()?.find(key).ok()?
    }

    /// Borrows the slice of the original source text this node spans.
    pub fn source_text(&self) -> Result<&'a str> {
        let header = self.buffer.header();
        let end = self
            .record
            .source_start
            .checked_add(self.record.source_length)
            .ok_or_else(|| {
                CographError::OutOfRange(format!(
                    "source span of node at {} overflows",
                    self.offset
                ))
            })?;
        if end > header.source_len {
            return Err(CographError::OutOfRange(format!(
                "source span {}..{end} of node at {} exceeds source length {}",
                self.record.source_start, self.offset, header.source_len
            )));
        }
        let span_offset = header
            .source_offset
            .checked_add(self.record.source_start)
            .ok_or_else(|| {
                CographError::OutOfRange(format!(
                    "source section offset of node at {} overflows",
                    self.offset
                ))
            })?;
        let bytes = self
            .buffer
            .slice(span_offset, self.record.source_length as usize)?;
        std::str::from_utf8(bytes).map_err(|_| CographError::InvalidUtf8(span_offset))
    }

    pub(crate) fn record(&self) -> SymbolNodeRecord {
        self.record
    }
}
