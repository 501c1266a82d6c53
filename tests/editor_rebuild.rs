use cograph::{
    EdgeKind, Graph, GraphBuilder, GraphEditor, NodeDraft, OwnedPropValue, PropValue, TOP_LEVEL,
};

const SOURCE: &str = "let total = base + rate";

/// root(Statement) -> packed -> [lhs(Identifier), rhs(Expression)]
/// rhs -> packed -> [base(Identifier), rate(Identifier)], with a
/// DATA_FLOW edge from rhs's derivation to lhs.
fn build_fixture() -> (Graph, Fixture) {
    let mut builder = GraphBuilder::new();
    let lhs = builder
        .write_symbol_node(3, 30, 4, 5, &[], &[("name", PropValue::Str("total"))])
        .expect("lhs");
    let base = builder
        .write_symbol_node(3, 30, 12, 4, &[], &[("name", PropValue::Str("base"))])
        .expect("base");
    let rate = builder
        .write_symbol_node(3, 30, 19, 4, &[], &[("name", PropValue::Str("rate"))])
        .expect("rate");
    let flow = builder
        .write_cpg_edge(EdgeKind::DataFlow, lhs, &[])
        .expect("flow");
    let rhs_packed = builder
        .write_packed_node(12, &[base, rate], &[flow])
        .expect("rhs packed");
    let rhs = builder
        .write_symbol_node(4, 40, 12, 11, &[rhs_packed], &[])
        .expect("rhs");
    let root_packed = builder
        .write_packed_node(1, &[lhs, rhs], &[])
        .expect("root packed");
    let root = builder
        .write_symbol_node(1, 10, 0, 23, &[root_packed], &[])
        .expect("root");
    let image = builder.build(root, SOURCE).expect("build");
    (
        Graph::open(image).expect("open"),
        Fixture {
            root,
            lhs,
            rhs,
            base,
            rate,
        },
    )
}

struct Fixture {
    root: u32,
    lhs: u32,
    rhs: u32,
    base: u32,
    rate: u32,
}

#[test]
fn noop_rebuild_preserves_structure_and_verifies() {
    let (graph, fixture) = build_fixture();
    let rebuilt = Graph::open(GraphEditor::new(&graph).build().expect("rebuild")).expect("reopen");

    assert!(rebuilt.verify_integrity().is_clean());
    assert_eq!(rebuilt.source_text().expect("source"), SOURCE);
    assert_eq!(rebuilt.stats().expect("stats").node_count, 5);
    assert_eq!(rebuilt.stats().expect("stats").edge_count, 1);

    let root = rebuilt.root().expect("root");
    assert_eq!(root.symbol_id(), 1);
    let children = root
        .packed_nodes()
        .expect("packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children");
    assert_eq!(children.count(), 2);
    let rhs = children.get(1).expect("slot").expect("present");
    assert_eq!(rhs.node_type(), 40);
    let flow = rhs
        .packed_nodes()
        .expect("rhs packed")
        .get(0)
        .expect("derivation")
        .edges()
        .expect("edges")
        .get(0)
        .expect("edge");
    assert_eq!(flow.kind(), EdgeKind::DataFlow);
    // The edge target was remapped to the rebuilt lhs.
    assert_eq!(
        flow.target()
            .expect("target")
            .try_property("name")
            .and_then(|v| v.try_as_str()),
        Some("total")
    );
    let _ = fixture;
}

#[test]
fn move_changes_only_the_span() {
    let (graph, fixture) = build_fixture();
    let mut editor = GraphEditor::new(&graph);
    editor.move_node(fixture.rate, 19, 2);
    let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");

    let root = rebuilt.root().expect("root");
    let rhs = root
        .packed_nodes()
        .expect("packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children")
        .get(1)
        .expect("slot")
        .expect("present");
    let rate = rhs
        .packed_nodes()
        .expect("rhs packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children")
        .get(1)
        .expect("slot")
        .expect("present");
    assert_eq!(rate.source_start(), 19);
    assert_eq!(rate.source_length(), 2);
    assert_eq!(rate.source_text().expect("span"), "ra");
    assert_eq!(
        rate.try_property("name").and_then(|v| v.try_as_str()),
        Some("rate")
    );
}

#[test]
fn replace_swaps_fields_and_properties_wholesale() {
    let (graph, fixture) = build_fixture();
    let mut editor = GraphEditor::new(&graph);
    editor.replace_node(
        fixture.base,
        NodeDraft {
            symbol_id: 6,
            node_type: 60,
            source_start: 12,
            source_length: 4,
            properties: vec![("kind".into(), OwnedPropValue::Str("constant".into()))],
        },
    );
    let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");

    let rhs = rebuilt
        .root()
        .expect("root")
        .packed_nodes()
        .expect("packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children")
        .get(1)
        .expect("slot")
        .expect("present");
    let base = rhs
        .packed_nodes()
        .expect("rhs packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children")
        .get(0)
        .expect("slot")
        .expect("present");
    assert_eq!(base.symbol_id(), 6);
    assert_eq!(base.node_type(), 60);
    assert!(base.try_property("name").is_none());
    assert_eq!(
        base.try_property("kind").and_then(|v| v.try_as_str()),
        Some("constant")
    );
}

#[test]
fn property_update_and_removal() {
    let (graph, fixture) = build_fixture();
    let mut editor = GraphEditor::new(&graph);
    editor.update_property(fixture.lhs, "name", OwnedPropValue::Str("sum".into()));
    editor.update_property(fixture.lhs, "mutable", OwnedPropValue::Bool(false));
    editor.remove_property(fixture.base, "name");
    let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");

    let root = rebuilt.root().expect("root");
    let children = root
        .packed_nodes()
        .expect("packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children");
    let lhs = children.get(0).expect("slot").expect("present");
    assert_eq!(
        lhs.try_property("name").and_then(|v| v.try_as_str()),
        Some("sum")
    );
    assert_eq!(
        lhs.try_property("mutable").and_then(|v| v.try_as_bool()),
        Some(false)
    );
    let rhs = children.get(1).expect("slot").expect("present");
    let base = rhs
        .packed_nodes()
        .expect("rhs packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children")
        .get(0)
        .expect("slot")
        .expect("present");
    assert!(base.try_property("name").is_none());
}

#[test]
fn delete_prunes_subtree_and_sentinels_the_slot() {
    let (graph, fixture) = build_fixture();
    let mut editor = GraphEditor::new(&graph);
    editor.delete_node(fixture.rhs);
    let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");

    assert!(rebuilt.verify_integrity().is_clean());
    let children = rebuilt
        .root()
        .expect("root")
        .packed_nodes()
        .expect("packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children");
    assert_eq!(children.count(), 2);
    assert!(children.get(1).expect("slot").is_none());
    // rhs, base, and rate are all gone; lhs and root remain.
    assert_eq!(rebuilt.stats().expect("stats").node_count, 2);
}

#[test]
fn delete_target_blanks_referencing_edges() {
    let (graph, fixture) = build_fixture();
    let mut editor = GraphEditor::new(&graph);
    editor.delete_node(fixture.lhs);
    let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");

    let rhs = rebuilt
        .root()
        .expect("root")
        .packed_nodes()
        .expect("packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children")
        .get(1)
        .expect("slot")
        .expect("present");
    let flow = rhs
        .packed_nodes()
        .expect("rhs packed")
        .get(0)
        .expect("derivation")
        .edges()
        .expect("edges")
        .get(0)
        .expect("edge");
    assert_eq!(flow.target_offset(), 0);
    assert!(matches!(
        flow.target(),
        Err(cograph::CographError::NotFound(_))
    ));
}

#[test]
fn insert_under_parent_and_at_top_level() {
    let (graph, fixture) = build_fixture();
    let mut editor = GraphEditor::new(&graph);
    editor.insert_node(
        fixture.rhs,
        NodeDraft {
            symbol_id: 9,
            node_type: 90,
            source_start: 17,
            source_length: 1,
            properties: vec![("name".into(), OwnedPropValue::Str("+".into()))],
        },
    );
    editor.insert_node(
        TOP_LEVEL,
        NodeDraft {
            symbol_id: 99,
            node_type: 1,
            source_start: 0,
            source_length: 0,
            properties: Vec::new(),
        },
    );
    let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");

    assert!(rebuilt.verify_integrity().is_clean());
    // 5 original + 1 child insertion + 1 top-level insertion.
    assert_eq!(rebuilt.stats().expect("stats").node_count, 7);

    let rhs = rebuilt
        .root()
        .expect("root")
        .packed_nodes()
        .expect("packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children")
        .get(1)
        .expect("slot")
        .expect("present");
    let rhs_children = rhs
        .packed_nodes()
        .expect("rhs packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children");
    assert_eq!(rhs_children.count(), 3);
    let inserted = rhs_children.get(2).expect("slot").expect("present");
    assert_eq!(inserted.symbol_id(), 9);
    assert_eq!(inserted.source_text().expect("span"), "+");
}

#[test]
fn insert_under_deleted_node_is_rejected() {
    let (graph, fixture) = build_fixture();
    let mut editor = GraphEditor::new(&graph);
    editor.delete_node(fixture.rhs);
    editor.insert_node(
        fixture.rhs,
        NodeDraft {
            symbol_id: 9,
            node_type: 90,
            source_start: 17,
            source_length: 1,
            properties: Vec::new(),
        },
    );
    let err = editor.build().unwrap_err();
    assert!(matches!(err, cograph::CographError::InvalidArgument(_)));
}

#[test]
fn edits_compose_in_queue_order() {
    let (graph, fixture) = build_fixture();
    let mut editor = GraphEditor::new(&graph);
    editor.update_property(fixture.lhs, "name", OwnedPropValue::Str("first".into()));
    editor.update_property(fixture.lhs, "name", OwnedPropValue::Str("second".into()));
    editor.remove_property(fixture.lhs, "name");
    let rebuilt = Graph::open(editor.build().expect("rebuild")).expect("reopen");
    let lhs = rebuilt
        .root()
        .expect("root")
        .packed_nodes()
        .expect("packed")
        .get(0)
        .expect("derivation")
        .children()
        .expect("children")
        .get(0)
        .expect("slot")
        .expect("present");
    assert!(lhs.try_property("name").is_none());
}
