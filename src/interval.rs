use tracing::trace;

use crate::buffer::ImageBuffer;
use crate::error::{CographError, Result};
use crate::schema::{FixedRecord, IntervalEntry, INTERVAL_ENTRY_SIZE};

/// Spatial index mapping source byte offsets to the nodes whose spans
/// contain them. Entries are kept sorted by `start`, ties in insertion
/// order; the point query is a linear scan over that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalIndex {
    entries: Vec<IntervalEntry>,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IntervalEntry] {
        &self.entries
    }

    /// Inserts a closed interval, keeping the vector sorted by `start`
    /// with insertion order among equal starts.
    pub fn insert(&mut self, start: u32, end: u32, node_offset: u32) -> Result<()> {
        if start > end {
            return Err(CographError::InvalidArgument(format!(
                "interval start {start} exceeds end {end}"
            )));
        }
        let entry = IntervalEntry {
            start,
            end,
            node_offset,
        };
        let at = self.entries.partition_point(|existing| existing.start <= start);
        self.entries.insert(at, entry);
        Ok(())
    }

    /// Every entry whose `[start, end]` interval contains `point`, in
    /// ascending `start` order.
    pub fn find_at(&self, point: u32) -> impl Iterator<Item = &IntervalEntry> {
        self.entries
            .iter()
            .take_while(move |entry| entry.start <= point)
            .filter(move |entry| entry.contains(point))
    }

    /// Node offsets of [`IntervalIndex::find_at`], collected.
    pub fn nodes_at(&self, point: u32) -> Vec<u32> {
        self.find_at(point).map(|entry| entry.node_offset).collect()
    }

    /// Leading 32-bit count, then the fixed 12-byte records.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.entries.len() * INTERVAL_ENTRY_SIZE);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            entry.append_to(&mut out);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(CographError::Truncated(
                "interval index shorter than its count field".into(),
            ));
        }
        let count = u32::from_le_bytes(bytes[..4].try_into().expect("slice has exactly 4 bytes"))
            as usize;
        let expected = 4u64 + count as u64 * INTERVAL_ENTRY_SIZE as u64;
        if (bytes.len() as u64) < expected {
            return Err(CographError::Truncated(format!(
                "interval index declares {count} entries but holds {} bytes",
                bytes.len()
            )));
        }
        let mut entries = Vec::with_capacity(count);
        let mut previous_start = 0u32;
        for index in 0..count {
            let at = 4 + index * INTERVAL_ENTRY_SIZE;
            let entry = IntervalEntry::from_bytes(&bytes[at..at + INTERVAL_ENTRY_SIZE])?;
            if entry.start > entry.end {
                return Err(CographError::InvalidArgument(format!(
                    "interval entry {index} has start {} after end {}",
                    entry.start, entry.end
                )));
            }
            if entry.start < previous_start {
                return Err(CographError::InvalidArgument(format!(
                    "interval entry {index} breaks start ordering"
                )));
            }
            previous_start = entry.start;
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    pub(crate) fn load(buffer: &ImageBuffer, offset: u32) -> Result<Self> {
        let count = buffer.list_count(offset)? as usize;
        let span = buffer.list_span(offset, INTERVAL_ENTRY_SIZE)?;
        let index = Self::from_bytes(buffer.slice(offset, 4 + span.len())?)?;
        trace!(entries = count, offset, "loaded interval index");
        Ok(index)
    }
}
