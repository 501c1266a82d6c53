//! Persistent, zero-copy binary container for a shared packed parse
//! forest (SPPF) overlaid with a code property graph (CPG).
//!
//! An image is one contiguous byte sequence: a fixed header, then nodes,
//! derivations, edges, properties, interned strings, the original source
//! text, and an optional spatial index. Every internal reference is a
//! 32-bit byte offset, so images persist and map without pointer
//! rewriting. Readers borrow; [`GraphBuilder`] is the single writer;
//! [`GraphEditor`] rewrites into a fresh image.

pub mod access;
pub mod buffer;
pub mod builder;
pub mod editor;
pub mod error;
pub mod graph;
pub mod interval;
pub mod query;
pub mod schema;
pub mod value;
pub mod verify;

pub use crate::access::{
    ChildNodes, CpgEdge, CpgEdges, OffsetList, PackedNode, PackedNodes, Properties, Property,
    SymbolNode,
};
pub use crate::buffer::ImageBuffer;
pub use crate::builder::{GraphBuilder, StreamBuilder};
pub use crate::editor::{GraphEditor, NodeDraft, TOP_LEVEL};
pub use crate::error::{CographError, Result};
pub use crate::graph::{Graph, GraphOptions, Stats, DEFAULT_CACHE_CAPACITY};
pub use crate::interval::IntervalIndex;
pub use crate::schema::{flags, EdgeKind, Header, ValueKind, FORMAT_VERSION, MAGIC};
pub use crate::value::{OwnedPropValue, PropValue, Value};
pub use crate::verify::{Finding, IntegrityReport, Severity, VerifyCounts};
