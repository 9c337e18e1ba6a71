//! Benchmark suite for pathway-algo
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pathway_algo::{
    Concept, ConceptEdge, ConceptIndex, EdgeKind, GraphPathfinder, GraphSnapshot, InteractionEvent,
    KnowledgeTracer, MasteryMap, PathQuery, TracerConfig,
};

/// Layered DAG: `width` concepts per layer, every concept linked to every
/// concept of the next layer.
fn layered_graph(layers: usize, width: usize) -> GraphSnapshot {
    let id = |l: usize, w: usize| format!("L{}_{}", l, w);
    let mut concepts = Vec::new();
    let mut edges = Vec::new();
    for l in 0..layers {
        for w in 0..width {
            concepts.push(Concept::new(id(l, w), 1.0 + (l % 10) as f64, 20.0 + w as f64));
            if l + 1 < layers {
                for next in 0..width {
                    edges.push(ConceptEdge::new(id(l, w), id(l + 1, next), EdgeKind::Prerequisite));
                }
            }
        }
    }
    GraphSnapshot::from_parts(concepts, edges)
}

fn bench_pathfinding(c: &mut Criterion) {
    let graph = layered_graph(8, 4);
    let pathfinder = GraphPathfinder::default();
    let mastery = MasteryMap::new();

    c.bench_function("find_optimal_path 8x4", |b| {
        b.iter(|| {
            let query = PathQuery::new("L7_0").start(Some("L0_0")).mastery(&mastery);
            pathfinder.find_optimal_path(black_box(&graph), &query)
        })
    });

    c.bench_function("find_candidates 8x4", |b| {
        b.iter(|| {
            let query = PathQuery::new("L7_0").start(Some("L0_0")).mastery(&mastery);
            pathfinder.find_candidates(black_box(&graph), &query, 5)
        })
    });
}

fn bench_dkt_inference(c: &mut Criterion) {
    let tracer = KnowledgeTracer::new(TracerConfig::default());
    let ids: Vec<String> = (0..100).map(|i| format!("c{:03}", i)).collect();
    let index = ConceptIndex::new(ids.clone(), tracer.config().num_concepts).unwrap();
    let history: Vec<InteractionEvent> = (0..50)
        .map(|i| InteractionEvent::new(ids[i % ids.len()].clone(), i % 3 != 0))
        .collect();

    c.bench_function("dkt infer 50 events", |b| {
        b.iter(|| tracer.infer(black_box(&history), &index))
    });
}

criterion_group!(benches, bench_pathfinding, bench_dkt_inference);
criterion_main!(benches);
