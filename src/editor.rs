use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::builder::GraphBuilder;
use crate::error::{CographError, Result};
use crate::graph::Graph;
use crate::schema::{PackedNodeRecord, SymbolNodeRecord, NULL_OFFSET};
use crate::value::{OwnedPropValue, PropValue};

/// Parent sentinel for [`GraphEditor::insert_node`]: the new node is a
/// top-level addition, attached to no existing parent.
pub const TOP_LEVEL: u32 = NULL_OFFSET;

/// Field set for an inserted or replacement node.
#[derive(Debug, Clone, Default)]
pub struct NodeDraft {
    pub symbol_id: u16,
    pub node_type: u16,
    pub source_start: u32,
    pub source_length: u32,
    pub properties: Vec<(String, OwnedPropValue)>,
}

#[derive(Debug, Clone)]
enum EditOp {
    Replace(NodeDraft),
    Delete,
    Move { start: u32, length: u32 },
    SetProperty { key: String, value: OwnedPropValue },
    RemoveProperty { key: String },
}

/// Queues operations against a source graph and emits a new image. The
/// source image is never touched; the rebuild walks it depth-first from
/// the root, applies queued operations at their target offsets, and
/// copies everything else as-is.
pub struct GraphEditor<'g> {
    graph: &'g Graph,
    ops: FxHashMap<u32, Vec<EditOp>>,
    inserts: FxHashMap<u32, Vec<NodeDraft>>,
}

impl<'g> GraphEditor<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            ops: FxHashMap::default(),
            inserts: FxHashMap::default(),
        }
    }

    /// Schedules a node to be appended under `parent` (a node offset in
    /// the source image, or [`TOP_LEVEL`]).
    pub fn insert_node(&mut self, parent: u32, draft: NodeDraft) {
        self.inserts.entry(parent).or_default().push(draft);
    }

    /// Replaces the target node's fields and properties wholesale.
    pub fn replace_node(&mut self, target: u32, draft: NodeDraft) {
        self.ops.entry(target).or_default().push(EditOp::Replace(draft));
    }

    /// Omits the target node from the rebuilt image; parents keep a
    /// sentinel 0 in its child slot.
    pub fn delete_node(&mut self, target: u32) {
        self.ops.entry(target).or_default().push(EditOp::Delete);
    }

    /// Changes only the target's source span.
    pub fn move_node(&mut self, target: u32, start: u32, length: u32) {
        self.ops
            .entry(target)
            .or_default()
            .push(EditOp::Move { start, length });
    }

    /// Overwrites (or adds) a single property on the target node.
    pub fn update_property(&mut self, target: u32, key: impl Into<String>, value: OwnedPropValue) {
        self.ops.entry(target).or_default().push(EditOp::SetProperty {
            key: key.into(),
            value,
        });
    }

    /// Removes a single property from the target node.
    pub fn remove_property(&mut self, target: u32, key: impl Into<String>) {
        self.ops
            .entry(target)
            .or_default()
            .push(EditOp::RemoveProperty { key: key.into() });
    }

    /// Rebuilds the graph into a new image with all queued operations
    /// applied. Inserting under a node that the same batch deletes is
    /// rejected: the insertion would have no surviving parent.
    pub fn build(self) -> Result<Vec<u8>> {
        let GraphEditor {
            graph,
            ops,
            inserts,
        } = self;
        for (&parent, drafts) in &inserts {
            if parent == TOP_LEVEL || drafts.is_empty() {
                continue;
            }
            let parent_deleted = ops
                .get(&parent)
                .map(|queued| queued.iter().any(|op| matches!(op, EditOp::Delete)))
                .unwrap_or(false);
            if parent_deleted {
                return Err(CographError::InvalidArgument(format!(
                    "cannot insert under node at {parent}: the same batch deletes it"
                )));
            }
        }
        let header = graph.header();
        let mut rebuild = Rebuild {
            graph,
            builder: GraphBuilder::new(),
            mapping: FxHashMap::default(),
            in_progress: FxHashSet::default(),
            patches: Vec::new(),
        };
        rebuild.builder.set_flags(header.flags);

        let new_root = match header.root_offset {
            NULL_OFFSET => NULL_OFFSET,
            root => match rebuild.rebuild_node(root, &ops, &inserts)? {
                Resolved::At(offset) => offset,
                Resolved::Deferred(_) => unreachable!("root rebuild cannot self-depend"),
            },
        };

        // Top-level insertions are standalone additions.
        if let Some(drafts) = inserts.get(&TOP_LEVEL) {
            for draft in drafts {
                rebuild.emit_draft(draft)?;
            }
        }

        // Forward and cyclic references were emitted with their old
        // offsets; rewrite them now that the mapping is complete.
        let patches = std::mem::take(&mut rebuild.patches);
        for (position, old_offset) in patches {
            let new_offset = rebuild.mapping.get(&old_offset).copied().unwrap_or(0);
            rebuild.builder.patch_u32(position, new_offset)?;
        }

        let source = graph.source_text()?.to_owned();
        debug!(
            nodes = rebuild.mapping.len(),
            root = new_root,
            "rebuilt image from editor queue"
        );
        rebuild.builder.build(new_root, &source)
    }
}

enum Resolved {
    At(u32),
    /// The node is an ancestor currently being emitted; the referencing
    /// slot must be patched once its offset is known.
    Deferred(u32),
}

struct Rebuild<'g> {
    graph: &'g Graph,
    builder: GraphBuilder,
    mapping: FxHashMap<u32, u32>,
    in_progress: FxHashSet<u32>,
    patches: Vec<(u32, u32)>,
}

impl Rebuild<'_> {
    fn rebuild_node(
        &mut self,
        old_offset: u32,
        ops: &FxHashMap<u32, Vec<EditOp>>,
        inserts: &FxHashMap<u32, Vec<NodeDraft>>,
    ) -> Result<Resolved> {
        if old_offset == NULL_OFFSET {
            return Ok(Resolved::At(NULL_OFFSET));
        }
        if let Some(&new_offset) = self.mapping.get(&old_offset) {
            return Ok(Resolved::At(new_offset));
        }
        let node_ops = ops.get(&old_offset);
        if node_ops
            .map(|queued| queued.iter().any(|op| matches!(op, EditOp::Delete)))
            .unwrap_or(false)
        {
            self.mapping.insert(old_offset, NULL_OFFSET);
            return Ok(Resolved::At(NULL_OFFSET));
        }
        if !self.in_progress.insert(old_offset) {
            return Ok(Resolved::Deferred(old_offset));
        }

        let node = self.graph.node_at(old_offset)?;
        let mut record = node.record();
        let mut properties = copy_properties(node.properties()?)?;
        if let Some(queued) = node_ops {
            apply_ops(&mut record, &mut properties, queued);
        }

        let mut inserted_children = Vec::new();
        if let Some(drafts) = inserts.get(&old_offset) {
            for draft in drafts {
                inserted_children.push(self.emit_draft(draft)?);
            }
        }

        let mut packed_offsets = Vec::new();
        let packed_nodes = node.packed_nodes()?;
        for (index, packed) in packed_nodes.iter().enumerate() {
            let packed = packed?;
            let extra = if index == 0 {
                inserted_children.as_slice()
            } else {
                &[]
            };
            packed_offsets.push(self.rebuild_packed(packed.record(), extra, ops, inserts)?);
        }
        if packed_nodes.is_empty() && !inserted_children.is_empty() {
            // A parent without derivations grows one to hold the
            // insertions.
            let child_list = self.builder.write_offset_list(&inserted_children)?;
            packed_offsets.push(self.builder.append_packed_record(PackedNodeRecord {
                rule_id: 0,
                child_list_offset: child_list,
                cpg_edges_list_offset: NULL_OFFSET,
            })?);
        }

        let packed_list_offset = if packed_offsets.is_empty() {
            NULL_OFFSET
        } else {
            self.builder.write_offset_list(&packed_offsets)?
        };
        let property_refs: Vec<(&str, PropValue<'_>)> = properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_ref()))
            .collect();
        let properties_list_offset = self.builder.write_properties(&property_refs)?;

        record.packed_list_offset = packed_list_offset;
        record.properties_list_offset = properties_list_offset;
        let new_offset = self.builder.append_symbol_record(record)?;

        self.in_progress.remove(&old_offset);
        self.mapping.insert(old_offset, new_offset);
        Ok(Resolved::At(new_offset))
    }

    fn rebuild_packed(
        &mut self,
        record: PackedNodeRecord,
        extra_children: &[u32],
        ops: &FxHashMap<u32, Vec<EditOp>>,
        inserts: &FxHashMap<u32, Vec<NodeDraft>>,
    ) -> Result<u32> {
        let child_offsets: Vec<u32> = self
            .graph
            .buffer()
            .list_span(record.child_list_offset, 4)?
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes(chunk.try_into().expect("chunk has 4 bytes")))
            .collect();
        let mut children = Vec::with_capacity(child_offsets.len() + extra_children.len());
        let mut deferred = Vec::new();
        for old_child in child_offsets {
            match self.rebuild_node(old_child, ops, inserts)? {
                Resolved::At(new_child) => children.push(new_child),
                Resolved::Deferred(old) => {
                    deferred.push((children.len(), old));
                    children.push(old);
                }
            }
        }
        children.extend_from_slice(extra_children);

        let child_list_offset = if children.is_empty() {
            NULL_OFFSET
        } else {
            let list = self.builder.write_offset_list(&children)?;
            for (index, old) in deferred {
                self.patches.push((list + 4 + 4 * index as u32, old));
            }
            list
        };

        let edge_offsets: Vec<u32> = self
            .graph
            .buffer()
            .list_span(record.cpg_edges_list_offset, 4)?
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes(chunk.try_into().expect("chunk has 4 bytes")))
            .collect();
        let mut edges = Vec::with_capacity(edge_offsets.len());
        for old_edge in edge_offsets {
            edges.push(self.rebuild_edge(old_edge, ops, inserts)?);
        }
        let cpg_edges_list_offset = if edges.is_empty() {
            NULL_OFFSET
        } else {
            self.builder.write_offset_list(&edges)?
        };

        self.builder.append_packed_record(PackedNodeRecord {
            rule_id: record.rule_id,
            child_list_offset,
            cpg_edges_list_offset,
        })
    }

    fn rebuild_edge(
        &mut self,
        old_offset: u32,
        ops: &FxHashMap<u32, Vec<EditOp>>,
        inserts: &FxHashMap<u32, Vec<NodeDraft>>,
    ) -> Result<u32> {
        let edge = crate::access::CpgEdge::read(self.graph.buffer(), old_offset)?;
        let record = edge.record();
        let properties = copy_properties(edge.properties()?)?;
        let property_refs: Vec<(&str, PropValue<'_>)> = properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_ref()))
            .collect();
        let (target, deferred_target) =
            match self.rebuild_node(record.target_node_offset, ops, inserts)? {
                Resolved::At(new_target) => (new_target, None),
                Resolved::Deferred(old) => (old, Some(old)),
            };
        let new_offset = self
            .builder
            .write_cpg_edge(record.kind, target, &property_refs)?;
        if let Some(old) = deferred_target {
            // The target field sits 4 bytes into the edge record.
            self.patches.push((new_offset + 4, old));
        }
        Ok(new_offset)
    }

    fn emit_draft(&mut self, draft: &NodeDraft) -> Result<u32> {
        let property_refs: Vec<(&str, PropValue<'_>)> = draft
            .properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_ref()))
            .collect();
        self.builder.write_symbol_node(
            draft.symbol_id,
            draft.node_type,
            draft.source_start,
            draft.source_length,
            &[],
            &property_refs,
        )
    }
}

fn copy_properties(
    properties: crate::access::Properties<'_>,
) -> Result<Vec<(String, OwnedPropValue)>> {
    let mut owned = Vec::with_capacity(properties.count() as usize);
    for entry in properties.iter() {
        let property = entry?;
        owned.push((property.key()?.to_owned(), property.value()?.to_owned()?));
    }
    Ok(owned)
}

fn apply_ops(
    record: &mut SymbolNodeRecord,
    properties: &mut Vec<(String, OwnedPropValue)>,
    queued: &[EditOp],
) {
    for op in queued {
        match op {
            EditOp::Replace(draft) => {
                record.symbol_id = draft.symbol_id;
                record.node_type = draft.node_type;
                record.source_start = draft.source_start;
                record.source_length = draft.source_length;
                *properties = draft.properties.clone();
            }
            EditOp::Move { start, length } => {
                record.source_start = *start;
                record.source_length = *length;
            }
            EditOp::SetProperty { key, value } => {
                if let Some(existing) = properties.iter_mut().find(|(k, _)| k == key) {
                    existing.1 = value.clone();
                } else {
                    properties.push((key.clone(), value.clone()));
                }
            }
            EditOp::RemoveProperty { key } => {
                if let Some(index) = properties.iter().position(|(k, _)| k == key) {
                    properties.remove(index);
                }
            }
            EditOp::Delete => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EdgeKind;

    fn two_level_graph() -> (Graph, u32, u32) {
        let mut builder = GraphBuilder::new();
        let leaf = builder
            .write_symbol_node(
                2,
                20,
                0,
                1,
                &[],
                &[("name", PropValue::Str("leaf"))],
            )
            .expect("leaf");
        let packed = builder.write_packed_node(1, &[leaf], &[]).expect("packed");
        let root = builder
            .write_symbol_node(
                1,
                10,
                0,
                3,
                &[packed],
                &[("name", PropValue::Str("root"))],
            )
            .expect("root");
        let image = builder.build(root, "abc").expect("build");
        (Graph::open(image).expect("open"), root, leaf)
    }

    #[test]
    fn update_property_rewrites_one_node() {
        let (graph, root, _leaf) = two_level_graph();
        let mut editor = GraphEditor::new(&graph);
        editor.update_property(root, "name", OwnedPropValue::Str("renamed".into()));
        let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");
        let new_root = rebuilt.root().expect("root");
        assert_eq!(
            new_root.try_property("name").and_then(|v| v.try_as_str()),
            Some("renamed")
        );
        // The leaf came through untouched.
        let packed = new_root.packed_nodes().expect("packed").get(0).expect("first");
        let child = packed
            .children()
            .expect("children")
            .get(0)
            .expect("slot")
            .expect("present");
        assert_eq!(
            child.try_property("name").and_then(|v| v.try_as_str()),
            Some("leaf")
        );
    }

    #[test]
    fn delete_leaves_sentinel_in_child_list() {
        let (graph, _root, leaf) = two_level_graph();
        let mut editor = GraphEditor::new(&graph);
        editor.delete_node(leaf);
        let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");
        let packed = rebuilt
            .root()
            .expect("root")
            .packed_nodes()
            .expect("packed")
            .get(0)
            .expect("first");
        let children = packed.children().expect("children");
        assert_eq!(children.count(), 1);
        assert!(children.get(0).expect("slot").is_none());
        assert!(children.iter().next().is_none());
    }

    #[test]
    fn cyclic_edge_targets_are_patched() {
        // leaf --CALLS--> root, a cycle through offset indirection.
        let mut builder = GraphBuilder::new();
        let placeholder_target = 0;
        let edge = builder
            .write_cpg_edge(EdgeKind::Calls, placeholder_target, &[])
            .expect("edge");
        let leaf_packed = builder
            .write_packed_node(2, &[], &[edge])
            .expect("leaf packed");
        let leaf = builder
            .write_symbol_node(2, 20, 0, 1, &[leaf_packed], &[])
            .expect("leaf");
        let root_packed = builder
            .write_packed_node(1, &[leaf], &[])
            .expect("root packed");
        let root = builder
            .write_symbol_node(1, 10, 0, 2, &[root_packed], &[])
            .expect("root");
        builder.patch_u32(edge + 4, root).expect("close the cycle");
        let graph = Graph::open(builder.build(root, "ab").expect("build")).expect("open");

        let editor = GraphEditor::new(&graph);
        let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");
        let new_root = rebuilt.root().expect("root");
        let child = new_root
            .packed_nodes()
            .expect("packed")
            .get(0)
            .expect("first")
            .children()
            .expect("children")
            .get(0)
            .expect("slot")
            .expect("present");
        let edge = child
            .packed_nodes()
            .expect("leaf packed")
            .get(0)
            .expect("first")
            .edges()
            .expect("edges")
            .get(0)
            .expect("edge");
        assert_eq!(edge.kind(), EdgeKind::Calls);
        assert_eq!(edge.target_offset(), new_root.offset());
    }
}
