use std::io::{Cursor, Seek, SeekFrom, Write};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{CographError, Result};
use crate::interval::IntervalIndex;
use crate::schema::{
    flags, CpgEdgeRecord, EdgeKind, FixedRecord, Header, PackedNodeRecord, PropertyRecord,
    SymbolNodeRecord, ValueHeaderRecord, FORMAT_VERSION, HEADER_SIZE,
};
use crate::value::PropValue;

const MAX_IMAGE_LEN: u64 = u32::MAX as u64;

/// Shared append pipeline behind both builder variants: a running write
/// offset, the string intern map, record counters, and the interval
/// entries collected for the index.
struct BuilderCore<W: Write + Seek> {
    sink: W,
    position: u32,
    strings: FxHashMap<String, u32>,
    node_count: u32,
    edge_count: u32,
    flags: u16,
    intervals: Option<IntervalIndex>,
}

impl<W: Write + Seek> BuilderCore<W> {
    fn append(&mut self, bytes: &[u8]) -> Result<u32> {
        let offset = self.position;
        if u64::from(offset) + bytes.len() as u64 > MAX_IMAGE_LEN {
            return Err(CographError::InvalidArgument(
                "image exceeds the 32-bit offset space".into(),
            ));
        }
        self.sink.write_all(bytes)?;
        self.position += bytes.len() as u32;
        Ok(offset)
    }

    fn intern_string(&mut self, text: &str) -> Result<u32> {
        if let Some(&offset) = self.strings.get(text) {
            return Ok(offset);
        }
        if text.as_bytes().contains(&0) {
            return Err(CographError::InvalidArgument(
                "interned strings must not contain NUL".into(),
            ));
        }
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        let offset = self.append(&bytes)?;
        self.strings.insert(text.to_owned(), offset);
        Ok(offset)
    }

    fn write_value(&mut self, value: PropValue<'_>) -> Result<u32> {
        let mut payload = Vec::new();
        value.append_payload(&mut payload);
        let byte_length = u32::try_from(payload.len()).map_err(|_| {
            CographError::InvalidArgument("value payload exceeds u32::MAX bytes".into())
        })?;
        let mut bytes = Vec::with_capacity(ValueHeaderRecord::SIZE + payload.len());
        ValueHeaderRecord {
            kind: value.kind(),
            byte_length,
        }
        .append_to(&mut bytes);
        bytes.extend_from_slice(&payload);
        self.append(&bytes)
    }

    fn write_offset_list(&mut self, offsets: &[u32]) -> Result<u32> {
        let count = u32::try_from(offsets.len())
            .map_err(|_| CographError::InvalidArgument("list exceeds u32::MAX elements".into()))?;
        let mut bytes = Vec::with_capacity(4 + offsets.len() * 4);
        bytes.extend_from_slice(&count.to_le_bytes());
        for offset in offsets {
            bytes.extend_from_slice(&offset.to_le_bytes());
        }
        self.append(&bytes)
    }

    fn write_properties(&mut self, properties: &[(&str, PropValue<'_>)]) -> Result<u32> {
        if properties.is_empty() {
            return Ok(0);
        }
        let mut records = Vec::with_capacity(properties.len());
        for (key, value) in properties {
            let key_offset = self.intern_string(key)?;
            let value_offset = self.write_value(*value)?;
            records.push(PropertyRecord {
                key_offset,
                value_offset,
            });
        }
        let count = u32::try_from(records.len())
            .map_err(|_| CographError::InvalidArgument("list exceeds u32::MAX elements".into()))?;
        let mut bytes = Vec::with_capacity(4 + records.len() * PropertyRecord::SIZE);
        bytes.extend_from_slice(&count.to_le_bytes());
        for record in &records {
            record.append_to(&mut bytes);
        }
        self.append(&bytes)
    }

    fn write_cpg_edge(
        &mut self,
        kind: EdgeKind,
        target_offset: u32,
        properties: &[(&str, PropValue<'_>)],
    ) -> Result<u32> {
        let properties_list_offset = self.write_properties(properties)?;
        let record = CpgEdgeRecord {
            kind,
            target_node_offset: target_offset,
            properties_list_offset,
        };
        let mut bytes = Vec::with_capacity(CpgEdgeRecord::SIZE);
        record.append_to(&mut bytes);
        let offset = self.append(&bytes)?;
        self.edge_count += 1;
        Ok(offset)
    }

    fn write_packed_node(
        &mut self,
        rule_id: u16,
        children: &[u32],
        edges: &[u32],
    ) -> Result<u32> {
        let child_list_offset = if children.is_empty() {
            0
        } else {
            self.write_offset_list(children)?
        };
        let cpg_edges_list_offset = if edges.is_empty() {
            0
        } else {
            self.write_offset_list(edges)?
        };
        self.append_packed_record(PackedNodeRecord {
            rule_id,
            child_list_offset,
            cpg_edges_list_offset,
        })
    }

    fn append_packed_record(&mut self, record: PackedNodeRecord) -> Result<u32> {
        let mut bytes = Vec::with_capacity(PackedNodeRecord::SIZE);
        record.append_to(&mut bytes);
        self.append(&bytes)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_symbol_node(
        &mut self,
        symbol_id: u16,
        node_type: u16,
        source_start: u32,
        source_length: u32,
        packed: &[u32],
        properties: &[(&str, PropValue<'_>)],
    ) -> Result<u32> {
        let packed_list_offset = if packed.is_empty() {
            0
        } else {
            self.write_offset_list(packed)?
        };
        let properties_list_offset = self.write_properties(properties)?;
        self.append_symbol_record(SymbolNodeRecord {
            symbol_id,
            node_type,
            source_start,
            source_length,
            packed_list_offset,
            properties_list_offset,
        })
    }

    fn append_symbol_record(&mut self, record: SymbolNodeRecord) -> Result<u32> {
        let span_end = record
            .source_start
            .checked_add(record.source_length)
            .ok_or_else(|| {
                CographError::InvalidArgument("node source span overflows u32".into())
            })?;
        // Node records keep natural 4-byte alignment; interned strings
        // and value payloads leave the write offset at arbitrary
        // positions.
        let padding = (4 - self.position % 4) % 4;
        if padding != 0 {
            self.append(&[0u8; 3][..padding as usize])?;
        }
        let mut bytes = Vec::with_capacity(SymbolNodeRecord::SIZE);
        record.append_to(&mut bytes);
        let offset = self.append(&bytes)?;
        self.node_count += 1;
        if let Some(intervals) = &mut self.intervals {
            // Closed interval over the span's byte positions; zero-length
            // spans cover their start byte only.
            let end = if record.source_length == 0 {
                record.source_start
            } else {
                span_end - 1
            };
            intervals.insert(record.source_start, end, offset)?;
        }
        Ok(offset)
    }

    fn finalize(&mut self, root_offset: u32, source_text: &str) -> Result<()> {
        if root_offset != 0
            && (root_offset < HEADER_SIZE as u32 || root_offset >= self.position)
        {
            return Err(CographError::InvalidArgument(format!(
                "root offset {root_offset} is outside the image"
            )));
        }
        let source_len = u32::try_from(source_text.len()).map_err(|_| {
            CographError::InvalidArgument("source text exceeds u32::MAX bytes".into())
        })?;
        let source_offset = self.append(source_text.as_bytes())?;
        let interval_index_offset = match self.intervals.take() {
            Some(index) if !index.is_empty() => self.append(&index.to_bytes())?,
            _ => 0,
        };
        let header = Header {
            version: FORMAT_VERSION,
            flags: self.flags,
            root_offset,
            node_count: self.node_count,
            edge_count: self.edge_count,
            source_len,
            source_offset,
            interval_index_offset,
        };
        // The magic goes down with the rest of the header, last; an
        // interrupted build leaves the zeroed reservation, which no reader
        // accepts.
        self.sink.seek(SeekFrom::Start(0))?;
        self.sink.write_all(&header.encode())?;
        self.sink.flush()?;
        debug!(
            nodes = self.node_count,
            edges = self.edge_count,
            bytes = self.position,
            "finalized image"
        );
        Ok(())
    }
}

/// Single-writer incremental builder over a growable in-memory image.
/// Records are appended in the order the `write_*` operations run; every
/// returned offset stays valid in the final image. `build` consumes the
/// builder, so a finished builder cannot be reused.
pub struct GraphBuilder {
    core: BuilderCore<Cursor<Vec<u8>>>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        let mut sink = Cursor::new(vec![0u8; HEADER_SIZE]);
        sink.set_position(HEADER_SIZE as u64);
        Self {
            core: BuilderCore {
                sink,
                position: HEADER_SIZE as u32,
                strings: FxHashMap::default(),
                node_count: 0,
                edge_count: 0,
                flags: flags::FULLY_PARSED,
                intervals: Some(IntervalIndex::new()),
            },
        }
    }

    /// Current append position; the offset the next record will land at.
    pub fn position(&self) -> u32 {
        self.core.position
    }

    pub fn flags(&self) -> u16 {
        self.core.flags
    }

    pub fn set_flag(&mut self, flag: u16) {
        self.core.flags |= flag;
    }

    pub fn clear_flag(&mut self, flag: u16) {
        self.core.flags &= !flag;
    }

    /// Replaces the whole flag bitset.
    pub fn set_flags(&mut self, flags: u16) {
        self.core.flags = flags;
    }

    /// Drops interval tracking; the emitted header records no index.
    pub fn skip_interval_index(&mut self) {
        self.core.intervals = None;
    }

    /// Interns a string, appending its null-terminated UTF-8 encoding on
    /// first sight and returning the recorded offset afterwards.
    pub fn intern_string(&mut self, text: &str) -> Result<u32> {
        self.core.intern_string(text)
    }

    /// Appends a value header plus payload; returns the value offset.
    pub fn write_value(&mut self, value: PropValue<'_>) -> Result<u32> {
        self.core.write_value(value)
    }

    /// Appends a count-prefixed list of 32-bit offsets.
    pub fn write_offset_list(&mut self, offsets: &[u32]) -> Result<u32> {
        self.core.write_offset_list(offsets)
    }

    /// Appends a property list (interning keys, appending values first);
    /// an empty slice records the absent-list sentinel 0.
    pub fn write_properties(&mut self, properties: &[(&str, PropValue<'_>)]) -> Result<u32> {
        self.core.write_properties(properties)
    }

    /// Appends a CPG edge after its property list; returns the record
    /// offset.
    pub fn write_cpg_edge(
        &mut self,
        kind: EdgeKind,
        target_offset: u32,
        properties: &[(&str, PropValue<'_>)],
    ) -> Result<u32> {
        self.core.write_cpg_edge(kind, target_offset, properties)
    }

    /// Appends a packed node after its child and edge lists; the returned
    /// offset is the post-list position of the record itself.
    pub fn write_packed_node(
        &mut self,
        rule_id: u16,
        children: &[u32],
        edges: &[u32],
    ) -> Result<u32> {
        self.core.write_packed_node(rule_id, children, edges)
    }

    /// Appends a symbol node after its packed-offsets and property lists;
    /// returns the record offset. The node's span feeds the interval
    /// index unless tracking is disabled.
    pub fn write_symbol_node(
        &mut self,
        symbol_id: u16,
        node_type: u16,
        source_start: u32,
        source_length: u32,
        packed: &[u32],
        properties: &[(&str, PropValue<'_>)],
    ) -> Result<u32> {
        self.core.write_symbol_node(
            symbol_id,
            node_type,
            source_start,
            source_length,
            packed,
            properties,
        )
    }

    /// Appends the source text and the interval index, back-patches the
    /// header, and returns the finished image.
    pub fn build(mut self, root_offset: u32, source_text: &str) -> Result<Vec<u8>> {
        self.core.finalize(root_offset, source_text)?;
        Ok(self.core.sink.into_inner())
    }

    pub(crate) fn append_packed_record(&mut self, record: PackedNodeRecord) -> Result<u32> {
        self.core.append_packed_record(record)
    }

    pub(crate) fn append_symbol_record(&mut self, record: SymbolNodeRecord) -> Result<u32> {
        self.core.append_symbol_record(record)
    }

    /// Overwrites a previously appended 32-bit slot in place. Offsets
    /// already handed out stay stable.
    pub(crate) fn patch_u32(&mut self, at: u32, value: u32) -> Result<()> {
        let image = self.core.sink.get_mut();
        let start = at as usize;
        if start + 4 > image.len() {
            return Err(CographError::OutOfRange(format!(
                "patch position {at} exceeds image length {}",
                image.len()
            )));
        }
        image[start..start + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

/// Builder variant that writes records straight to a seekable stream
/// (typically a file), buffering nothing but the header region it
/// back-patches at [`StreamBuilder::finish`].
pub struct StreamBuilder<W: Write + Seek> {
    core: BuilderCore<W>,
    finished: bool,
}

impl<W: Write + Seek> StreamBuilder<W> {
    pub fn new(mut sink: W) -> Result<Self> {
        sink.write_all(&[0u8; HEADER_SIZE])?;
        Ok(Self {
            core: BuilderCore {
                sink,
                position: HEADER_SIZE as u32,
                strings: FxHashMap::default(),
                node_count: 0,
                edge_count: 0,
                flags: flags::FULLY_PARSED,
                intervals: Some(IntervalIndex::new()),
            },
            finished: false,
        })
    }

    fn guard(&self) -> Result<()> {
        if self.finished {
            return Err(CographError::BuilderState("write after finish"));
        }
        Ok(())
    }

    pub fn set_flag(&mut self, flag: u16) {
        self.core.flags |= flag;
    }

    pub fn clear_flag(&mut self, flag: u16) {
        self.core.flags &= !flag;
    }

    pub fn skip_interval_index(&mut self) {
        self.core.intervals = None;
    }

    pub fn intern_string(&mut self, text: &str) -> Result<u32> {
        self.guard()?;
        self.core.intern_string(text)
    }

    pub fn write_value(&mut self, value: PropValue<'_>) -> Result<u32> {
        self.guard()?;
        self.core.write_value(value)
    }

    pub fn write_offset_list(&mut self, offsets: &[u32]) -> Result<u32> {
        self.guard()?;
        self.core.write_offset_list(offsets)
    }

    pub fn write_properties(&mut self, properties: &[(&str, PropValue<'_>)]) -> Result<u32> {
        self.guard()?;
        self.core.write_properties(properties)
    }

    pub fn write_cpg_edge(
        &mut self,
        kind: EdgeKind,
        target_offset: u32,
        properties: &[(&str, PropValue<'_>)],
    ) -> Result<u32> {
        self.guard()?;
        self.core.write_cpg_edge(kind, target_offset, properties)
    }

    pub fn write_packed_node(
        &mut self,
        rule_id: u16,
        children: &[u32],
        edges: &[u32],
    ) -> Result<u32> {
        self.guard()?;
        self.core.write_packed_node(rule_id, children, edges)
    }

    pub fn write_symbol_node(
        &mut self,
        symbol_id: u16,
        node_type: u16,
        source_start: u32,
        source_length: u32,
        packed: &[u32],
        properties: &[(&str, PropValue<'_>)],
    ) -> Result<u32> {
        self.guard()?;
        self.core.write_symbol_node(
            symbol_id,
            node_type,
            source_start,
            source_length,
            packed,
            properties,
        )
    }

    /// Seeks back to the header region and writes the final header; a
    /// second call is a [`CographError::BuilderState`] error.
    pub fn finish(&mut self, root_offset: u32, source_text: &str) -> Result<()> {
        if self.finished {
            return Err(CographError::BuilderState("image already finalized"));
        }
        self.core.finalize(root_offset, source_text)?;
        self.finished = true;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.core.sink
    }
}
