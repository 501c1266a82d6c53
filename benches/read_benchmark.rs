use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use cograph::{EdgeKind, Graph, GraphBuilder, PropValue};

const LEAF_COUNT: usize = 4_096;

/// Builds a two-level forest: one root derivation over `LEAF_COUNT`
/// leaves, every fourth leaf carrying a CALLS edge back to a neighbor.
fn build_image() -> Vec<u8> {
    let mut source = String::new();
    for index in 0..LEAF_COUNT {
        source.push_str(&format!("tok{index:04} "));
    }

    let mut builder = GraphBuilder::new();
    let mut leaves = Vec::with_capacity(LEAF_COUNT);
    for index in 0..LEAF_COUNT {
        let start = (index * 8) as u32;
        let leaf = builder
            .write_symbol_node(
                2,
                20,
                start,
                7,
                &[],
                &[
                    ("NodeType", PropValue::Str("Token")),
                    ("ordinal", PropValue::U32(index as u32)),
                ],
            )
            .expect("leaf");
        leaves.push(leaf);
    }

    let mut edges = Vec::new();
    for pair in leaves.chunks(4) {
        if pair.len() == 4 {
            edges.push(
                builder
                    .write_cpg_edge(EdgeKind::Calls, pair[0], &[])
                    .expect("edge"),
            );
        }
    }
    let packed = builder
        .write_packed_node(1, &leaves, &edges)
        .expect("packed");
    let root = builder
        .write_symbol_node(1, 10, 0, source.len() as u32, &[packed], &[])
        .expect("root");
    builder.build(root, &source).expect("build")
}

fn read_benchmark(c: &mut Criterion) {
    let graph = Graph::open(build_image()).expect("open");

    let mut group = c.benchmark_group("read");
    group.throughput(Throughput::Elements(1));
    group.bench_function("root_access", |b| {
        b.iter(|| black_box(graph.root().expect("root").symbol_id()));
    });

    group.bench_function("property_lookup", |b| {
        let root = graph.root().expect("root");
        let leaf = root
            .packed_nodes()
            .expect("packed")
            .get(0)
            .expect("derivation")
            .children()
            .expect("children")
            .get(100)
            .expect("slot")
            .expect("present");
        b.iter(|| black_box(leaf.try_property("ordinal").and_then(|v| v.try_as_u32())));
    });

    group.throughput(Throughput::Elements(LEAF_COUNT as u64 / 4));
    group.bench_function("edge_kind_filter", |b| {
        let derivation = graph
            .root()
            .expect("root")
            .packed_nodes()
            .expect("packed")
            .get(0)
            .expect("derivation");
        b.iter(|| {
            let edges = derivation.edges().expect("edges");
            let mut hits = 0usize;
            for edge in edges.of_kind(EdgeKind::Calls) {
                let _ = black_box(edge.expect("edge").target_offset());
                hits += 1;
            }
            black_box(hits)
        });
    });

    group.throughput(Throughput::Elements(1));
    group.bench_function("find_nodes_at", |b| {
        let mut point = 0u32;
        b.iter(|| {
            point = (point + 97) % 32_000;
            black_box(graph.find_nodes_at(point).expect("query").len())
        });
    });

    group.finish();
}

criterion_group!(benches, read_benchmark);
criterion_main!(benches);
