//! Shared helpers for the roigraph-models integration tests.

#![allow(dead_code)]

use rand::seq::SliceRandom;
use rand::Rng;
use roigraph_core::{to_vec_f32, GraphEdge, GraphLabel, RngKey, RoiGraph};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Subject graph with random features and a random symmetric connectivity
/// matrix thresholded at 0.3.
pub fn random_subject(key: RngKey, num_rois: usize, label: GraphLabel, task_id: usize) -> RoiGraph {
    let mut rng = key.rng();
    let features: Vec<f32> = (0..num_rois).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut connectivity = vec![0.0f32; num_rois * num_rois];
    for i in 0..num_rois {
        for j in (i + 1)..num_rois {
            let c: f32 = rng.gen_range(-1.0..1.0);
            connectivity[i * num_rois + j] = c;
            connectivity[j * num_rois + i] = c;
        }
    }

    RoiGraph::from_dense_connectivity(1, features, &connectivity, 0.3, false, label, task_id)
        .expect("valid random subject")
}

/// Every ordered pair connected with weight 1, self-loops included.
pub fn complete_graph(features: Vec<f32>, label: GraphLabel, task_id: usize) -> RoiGraph {
    let n = features.len();
    let edges = (0..n)
        .flat_map(|s| (0..n).map(move |d| GraphEdge::new(s, d, 1.0)))
        .collect();
    RoiGraph::new(1, features, edges, label, task_id).expect("valid complete graph")
}

/// Random permutation of `0..n`.
pub fn random_permutation(key: RngKey, n: usize) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..n).collect();
    perm.shuffle(&mut key.rng());
    perm
}

pub fn host<B: Backend, const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
    to_vec_f32(t).expect("read tensor")
}

pub fn assert_close(a: &[f32], b: &[f32], tol: f32) {
    assert_eq!(a.len(), b.len(), "length mismatch");
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() <= tol, "index {i}: {x} vs {y} (tol {tol})");
    }
}
