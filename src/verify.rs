//! Integrity verification: walks an opened image and checks the format
//! invariants record by record. Corrupt input produces findings, never a
//! panic.

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::buffer::ImageBuffer;
use crate::error::Result;
use crate::interval::IntervalIndex;
use crate::schema::{
    CpgEdgeRecord, FixedRecord, PackedNodeRecord, PropertyRecord, SymbolNodeRecord, HEADER_SIZE,
    PROPERTY_SIZE, SYMBOL_NODE_SIZE,
};
use crate::value::Value;

const MAX_FINDINGS: usize = 32;

/// Indicates the severity of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational message about the verification walk.
    Info,
    /// Non-critical oddity that may indicate a problem.
    Warning,
    /// Invariant violation indicating a corrupt or unsafe image.
    Error,
}

/// A single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

/// Statistics collected while walking the image.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    pub nodes_visited: u64,
    pub packed_nodes_visited: u64,
    pub edges_visited: u64,
    pub properties_visited: u64,
    pub interval_entries: u64,
}

/// Complete report of a verification walk.
#[derive(Clone, Debug, Serialize)]
pub struct IntegrityReport {
    pub success: bool,
    pub findings: Vec<Finding>,
    pub counts: VerifyCounts,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.success
    }
}

struct Walker<'a> {
    buffer: &'a ImageBuffer,
    findings: Vec<Finding>,
    counts: VerifyCounts,
    visited_nodes: FxHashSet<u32>,
    visited_packed: FxHashSet<u32>,
}

impl<'a> Walker<'a> {
    fn record(&mut self, severity: Severity, message: impl Into<String>) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(Finding {
                severity,
                message: message.into(),
            });
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        self.record(Severity::Error, message);
    }

    fn run(&mut self) {
        let header = self.buffer.header();
        let image_len = self.buffer.len() as u64;

        if u64::from(header.source_offset) + u64::from(header.source_len) > image_len {
            self.error(format!(
                "source section {}..+{} exceeds image length {image_len}",
                header.source_offset, header.source_len
            ));
        }

        if header.root_offset == 0 {
            self.record(Severity::Warning, "image has no root node");
        } else if u64::from(header.root_offset) < HEADER_SIZE as u64
            || u64::from(header.root_offset) + SYMBOL_NODE_SIZE as u64 > image_len
        {
            self.error(format!(
                "root offset {} is outside the image",
                header.root_offset
            ));
        } else {
            self.walk_nodes(header.root_offset);
        }

        if self.counts.nodes_visited != u64::from(header.node_count) {
            self.record(
                Severity::Info,
                format!(
                    "header counts {} nodes, walk reached {}",
                    header.node_count, self.counts.nodes_visited
                ),
            );
        }

        self.check_interval_index(header.interval_index_offset);
    }

    fn walk_nodes(&mut self, root: u32) {
        let mut pending = vec![root];
        while let Some(offset) = pending.pop() {
            if !self.visited_nodes.insert(offset) {
                continue;
            }
            self.counts.nodes_visited += 1;
            if offset % 4 != 0 {
                self.error(format!("node record at {offset} is not 4-byte aligned"));
            }
            let record: SymbolNodeRecord = match self.buffer.read(offset) {
                Ok(record) => record,
                Err(err) => {
                    self.error(format!("symbol node at {offset}: {err}"));
                    continue;
                }
            };
            self.check_span(offset, &record);
            self.check_properties(record.properties_list_offset, "node", offset);
            match self.buffer.list_span(record.packed_list_offset, 4) {
                Ok(span) => {
                    for chunk in span.chunks_exact(4) {
                        let packed =
                            u32::from_le_bytes(chunk.try_into().expect("chunk has 4 bytes"));
                        self.walk_packed(packed, &mut pending);
                    }
                }
                Err(err) => self.error(format!("packed list of node at {offset}: {err}")),
            }
        }
    }

    fn check_span(&mut self, offset: u32, record: &SymbolNodeRecord) {
        let header = self.buffer.header();
        match record.source_start.checked_add(record.source_length) {
            Some(end) if end <= header.source_len => {}
            _ => self.error(format!(
                "node at {offset} spans {}..+{} beyond source length {}",
                record.source_start, record.source_length, header.source_len
            )),
        }
    }

    fn walk_packed(&mut self, offset: u32, pending: &mut Vec<u32>) {
        if !self.visited_packed.insert(offset) {
            return;
        }
        self.counts.packed_nodes_visited += 1;
        let record = match self.buffer.read::<PackedNodeRecord>(offset) {
            Ok(record) => record,
            Err(err) => {
                self.error(format!("packed node at {offset}: {err}"));
                return;
            }
        };
        match self.buffer.list_span(record.child_list_offset, 4) {
            Ok(span) => {
                for chunk in span.chunks_exact(4) {
                    let child = u32::from_le_bytes(chunk.try_into().expect("chunk has 4 bytes"));
                    if child != 0 {
                        pending.push(child);
                    }
                }
            }
            Err(err) => self.error(format!("child list of packed node at {offset}: {err}")),
        }
        match self.buffer.list_span(record.cpg_edges_list_offset, 4) {
            Ok(span) => {
                for chunk in span.chunks_exact(4) {
                    let edge = u32::from_le_bytes(chunk.try_into().expect("chunk has 4 bytes"));
                    self.check_edge(edge, pending);
                }
            }
            Err(err) => self.error(format!("edge list of packed node at {offset}: {err}")),
        }
    }

    fn check_edge(&mut self, offset: u32, pending: &mut Vec<u32>) {
        self.counts.edges_visited += 1;
        let record: CpgEdgeRecord = match self.buffer.read(offset) {
            Ok(record) => record,
            Err(err) => {
                self.error(format!("CPG edge at {offset}: {err}"));
                return;
            }
        };
        if record.target_node_offset != 0 {
            pending.push(record.target_node_offset);
        }
        self.check_properties(record.properties_list_offset, "edge", offset);
    }

    fn check_properties(&mut self, list_offset: u32, owner: &str, owner_offset: u32) {
        let span = match self.buffer.list_span(list_offset, PROPERTY_SIZE) {
            Ok(span) => span,
            Err(err) => {
                self.error(format!(
                    "property list of {owner} at {owner_offset}: {err}"
                ));
                return;
            }
        };
        for chunk in span.chunks_exact(PROPERTY_SIZE) {
            self.counts.properties_visited += 1;
            if let Err(err) = self.check_property(chunk) {
                self.error(format!("property of {owner} at {owner_offset}: {err}"));
            }
        }
    }

    fn check_property(&mut self, chunk: &[u8]) -> Result<()> {
        let record = PropertyRecord::from_bytes(chunk)?;
        self.buffer.read_cstring(record.key_offset)?;
        Value::read(self.buffer, record.value_offset)?;
        Ok(())
    }

    fn check_interval_index(&mut self, offset: u32) {
        if offset == 0 {
            return;
        }
        let index = match IntervalIndex::load(self.buffer, offset) {
            Ok(index) => index,
            Err(err) => {
                self.error(format!("interval index at {offset}: {err}"));
                return;
            }
        };
        self.counts.interval_entries = index.len() as u64;
        let image_len = self.buffer.len() as u64;
        for entry in index.entries() {
            if u64::from(entry.node_offset) + SYMBOL_NODE_SIZE as u64 > image_len {
                self.error(format!(
                    "interval entry points at node offset {} outside the image",
                    entry.node_offset
                ));
            }
        }
    }
}

pub(crate) fn verify_image(buffer: &ImageBuffer) -> IntegrityReport {
    let mut walker = Walker {
        buffer,
        findings: Vec::new(),
        counts: VerifyCounts::default(),
        visited_nodes: FxHashSet::default(),
        visited_packed: FxHashSet::default(),
    };
    walker.run();
    let success = walker
        .findings
        .iter()
        .all(|finding| finding.severity != Severity::Error);
    IntegrityReport {
        success,
        findings: walker.findings,
        counts: walker.counts,
    }
}
