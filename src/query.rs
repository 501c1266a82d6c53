//! Minimal query recognizer. Two predicates are understood, both matched
//! against the root node; anything else falls back to returning the root
//! offset. A richer engine can replace this module wholesale as long as
//! the input/output shape stays.

use crate::error::{CographError, Result};
use crate::graph::Graph;

const SYMBOL_ID_PREDICATE: &str = "symbolId:";
const NODE_TYPE_PREDICATE: &str = "nodeType:";

/// Evaluates `query` against the graph's root node and returns the
/// matching node offsets.
pub fn match_root(graph: &Graph, query: &str) -> Result<Vec<u32>> {
    let root = graph.root()?;
    let query = query.trim();
    if let Some(raw) = query.strip_prefix(SYMBOL_ID_PREDICATE) {
        let wanted = parse_id(raw, "symbolId")?;
        return Ok(if root.symbol_id() == wanted {
            vec![root.offset()]
        } else {
            Vec::new()
        });
    }
    if let Some(raw) = query.strip_prefix(NODE_TYPE_PREDICATE) {
        let wanted = parse_id(raw, "nodeType")?;
        return Ok(if root.node_type() == wanted {
            vec![root.offset()]
        } else {
            Vec::new()
        });
    }
    Ok(vec![root.offset()])
}

fn parse_id(raw: &str, predicate: &str) -> Result<u16> {
    raw.trim().parse().map_err(|_| {
        CographError::InvalidArgument(format!("{predicate} predicate needs a u16, got {raw:?}"))
    })
}
