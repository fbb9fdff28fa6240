//! Forward-pass cost of the full classifier at atlas scale.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use roigraph_core::{cpu_device, CpuBackend, GraphBatch, GraphLabel, RngKey, RoiGraph};
use roigraph_models::BrainGnnConfig;

const NUM_ROIS: usize = 116;

fn subject(key: RngKey) -> RoiGraph {
    let mut rng = key.rng();
    let features = (0..NUM_ROIS).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let connectivity: Vec<f32> = (0..NUM_ROIS * NUM_ROIS)
        .map(|_| rng.gen_range(-1.0f32..1.0))
        .collect();
    RoiGraph::from_dense_connectivity(1, features, &connectivity, 0.7, false, GraphLabel::Class(0), 0)
        .expect("valid subject")
}

fn benchmark_forward(c: &mut Criterion) {
    let device = cpu_device();
    let config = BrainGnnConfig::new(1, NUM_ROIS);
    let model = config
        .init::<CpuBackend>(RngKey::new(0), &device)
        .expect("valid config");

    let mut group = c.benchmark_group("brain_gnn_forward");
    for batch_size in [1usize, 4, 16] {
        let graphs: Vec<RoiGraph> = RngKey::new(1).split(batch_size).into_iter().map(subject).collect();
        let batch = GraphBatch::new(&graphs, &device).expect("valid batch");

        group.bench_with_input(BenchmarkId::new("batch", batch_size), &batch, |b, batch| {
            b.iter(|| model.forward(black_box(batch)).expect("forward"));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_forward);
criterion_main!(benches);
