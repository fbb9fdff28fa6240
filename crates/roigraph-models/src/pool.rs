//! Learned top-k node selection.
//!
//! Nodes are scored by projecting their embedding on a learned direction
//! `p`, normalized by `‖p‖`. Inside every graph the highest-scoring
//! `ceil(keep_ratio * n)` nodes survive (at least one), ties broken by the
//! lower current index. Survivors keep their relative order and are gated by
//! `sigmoid(score)` so the score receives gradient from everything
//! downstream.
//!
//! The restricted graph is a fresh [`GraphTopology`]; the input is never
//! modified.

use std::cmp::Ordering;

use burn::module::{Module, Param};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use roigraph_core::{index_tensor, to_vec_f32, GnnError, GraphTopology, Result, RngKey};

use crate::config::validate_keep_ratio;
use crate::init::init_matrix;

/// Number of nodes a graph of `n` nodes keeps: `ceil(ratio * n)`, clamped to `[1, n]`.
pub fn keep_count(n: usize, keep_ratio: f64) -> usize {
    if n == 0 {
        return 0;
    }
    // the epsilon keeps 0.5 * 4 from rounding up to 3 through float noise
    let k = (keep_ratio * n as f64 - 1e-9).ceil();
    (k.max(0.0) as usize).clamp(1, n)
}

/// Batch-global indices of the nodes to keep, ascending.
///
/// Ranking is done per graph: score descending, then index ascending.
pub fn select_top_k(scores: &[f32], topology: &GraphTopology, keep_ratio: f64) -> Vec<usize> {
    let mut keep = Vec::new();
    for g in 0..topology.num_graphs() {
        let range = topology.graph_range(g);
        let k = keep_count(range.len(), keep_ratio);

        let mut ranked: Vec<usize> = range.collect();
        ranked.sort_by(|&a, &b| match scores[b].total_cmp(&scores[a]) {
            Ordering::Equal => a.cmp(&b),
            ord => ord,
        });

        let mut kept = ranked[..k].to_vec();
        kept.sort_unstable();
        keep.extend(kept);
    }
    keep
}

/// Output of one pooling step.
#[derive(Clone, Debug)]
pub struct PoolOutput<B: Backend> {
    /// `[N', dim]` gated embeddings of the survivors.
    pub embeddings: Tensor<B, 2>,
    /// `[N', R]` identity rows of the survivors.
    pub identity: Tensor<B, 2>,
    /// Restricted topology.
    pub topology: GraphTopology,
    /// `[N]` gate values `sigmoid(raw_scores)` for every input node.
    pub scores: Tensor<B, 1>,
    /// `[N]` normalized projections `x · p / ‖p‖`.
    pub raw_scores: Tensor<B, 1>,
    /// `[1]` norm of the projection direction.
    pub direction_norm: Tensor<B, 1>,
    /// Input index of every survivor (new node `i` was input node `perm[i]`).
    pub perm: Vec<usize>,
}

#[derive(Module, Debug)]
pub struct TopKPool<B: Backend> {
    /// `[dim, 1]` projection direction.
    pub(crate) weight: Param<Tensor<B, 2>>,
    dim: usize,
    keep_ratio: f64,
}

impl<B: Backend> TopKPool<B> {
    /// # Errors
    ///
    /// [`GnnError::InvalidConfig`] if `keep_ratio` is outside `(0, 1]`.
    pub fn new(dim: usize, keep_ratio: f64, key: RngKey, device: &B::Device) -> Result<Self> {
        validate_keep_ratio(keep_ratio)?;
        let bound = 1.0 / (dim.max(1) as f32).sqrt();
        Ok(Self {
            weight: init_matrix(dim, 1, bound, key, device),
            dim,
            keep_ratio,
        })
    }

    pub fn forward(
        &self,
        x: Tensor<B, 2>,
        identity: Tensor<B, 2>,
        topology: &GraphTopology,
    ) -> Result<PoolOutput<B>> {
        let [n, dim] = x.dims();
        if dim != self.dim {
            return Err(GnnError::dim("pooling input width", self.dim, dim));
        }
        if topology.num_nodes() != n {
            return Err(GnnError::dim("topology node count", n, topology.num_nodes()));
        }

        let device = x.device();
        let direction = self.weight.val();
        let direction_norm = (direction.clone() * direction.clone()).sum().sqrt();
        let raw_scores = (x.clone().matmul(direction) / direction_norm.clone().reshape([1, 1]))
            .reshape([n]);
        let scores = sigmoid(raw_scores.clone());

        let perm = select_top_k(&to_vec_f32(raw_scores.clone())?, topology, self.keep_ratio);
        let indices = index_tensor::<B>(&perm, &device);

        let gate = scores
            .clone()
            .select(0, indices.clone())
            .reshape([perm.len(), 1]);
        let embeddings = x.select(0, indices.clone()) * gate;
        let identity = identity.select(0, indices);
        let restricted = topology.restrict(&perm);

        Ok(PoolOutput {
            embeddings,
            identity,
            topology: restricted,
            scores,
            raw_scores,
            direction_norm,
            perm,
        })
    }

    pub const fn keep_ratio(&self) -> f64 {
        self.keep_ratio
    }

    pub const fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roigraph_core::{cpu_device, identity_rows, tensor_2d, CpuBackend, GraphEdge};

    fn line_topology(counts: &[usize]) -> GraphTopology {
        let mut graph_ptr = vec![0];
        let mut roi_index = Vec::new();
        let mut edges = Vec::new();
        for &c in counts {
            let offset = roi_index.len();
            for i in 0..c {
                if i + 1 < c {
                    edges.push(GraphEdge::new(offset + i, offset + i + 1, 1.0));
                }
                roi_index.push(i);
            }
            graph_ptr.push(roi_index.len());
        }
        GraphTopology {
            edges,
            graph_ptr,
            roi_index,
        }
    }

    #[test]
    fn test_keep_count() {
        assert_eq!(keep_count(4, 0.5), 2);
        assert_eq!(keep_count(5, 0.5), 3);
        assert_eq!(keep_count(116, 0.5), 58);
        assert_eq!(keep_count(10, 0.8), 8);
        assert_eq!(keep_count(1, 0.5), 1);
        assert_eq!(keep_count(3, 0.01), 1);
        assert_eq!(keep_count(7, 1.0), 7);
        assert_eq!(keep_count(0, 0.5), 0);
    }

    #[test]
    fn test_select_top_k_per_graph() {
        let topo = line_topology(&[4, 3]);
        let scores = [0.1, 0.9, 0.5, 0.7, 3.0, -1.0, 2.0];
        // graph 0 keeps 1 and 3, graph 1 keeps 4 and 6 (ceil(1.5) = 2)
        assert_eq!(select_top_k(&scores, &topo, 0.5), vec![1, 3, 4, 6]);
    }

    #[test]
    fn test_select_top_k_tie_break_by_index() {
        let topo = line_topology(&[4]);
        assert_eq!(select_top_k(&[1.0; 4], &topo, 0.5), vec![0, 1]);
    }

    #[test]
    fn test_invalid_keep_ratio() {
        let device = cpu_device();
        assert!(TopKPool::<CpuBackend>::new(4, 0.0, RngKey::new(0), &device).is_err());
        assert!(TopKPool::<CpuBackend>::new(4, 1.2, RngKey::new(0), &device).is_err());
    }

    #[test]
    fn test_pool_restricts_everything() {
        let device = cpu_device();
        let pool = TopKPool::<CpuBackend>::new(2, 0.5, RngKey::new(9), &device).unwrap();
        let topo = line_topology(&[4, 4]);
        let x = tensor_2d(
            &[0.1, 0.2, 0.9, -0.4, 0.3, 0.3, -0.8, 0.5, 0.2, 0.1, 0.4, 0.4, -0.3, 0.6, 0.7, -0.7],
            8,
            2,
            &device,
        );
        let identity = tensor_2d(&[identity_rows(4), identity_rows(4)].concat(), 8, 4, &device);
        let out = pool.forward(x, identity, &topo).unwrap();

        assert_eq!(out.perm.len(), 4);
        assert_eq!(out.embeddings.dims(), [4, 2]);
        assert_eq!(out.identity.dims(), [4, 4]);
        assert_eq!(out.scores.dims(), [8]);
        assert_eq!(out.topology.graph_ptr, vec![0, 2, 4]);
        assert!(out.perm[..2].iter().all(|&i| i < 4));
        assert!(out.perm[2..].iter().all(|&i| i >= 4));
        assert!(out.perm.windows(2).all(|w| w[0] < w[1]));

        // identity rows travel with their nodes
        let id = to_vec_f32(out.identity).unwrap();
        for (row, &old) in out.perm.iter().enumerate() {
            let roi = topo.roi_index[old];
            assert_eq!(id[row * 4 + roi], 1.0);
            assert_eq!(out.topology.roi_index[row], roi);
        }

        let s = to_vec_f32(out.scores).unwrap();
        assert!(s.iter().all(|v| *v > 0.0 && *v < 1.0));
    }

    #[test]
    fn test_single_node_is_kept() {
        let device = cpu_device();
        let pool = TopKPool::<CpuBackend>::new(3, 0.5, RngKey::new(4), &device).unwrap();
        let topo = line_topology(&[1]);
        let x = tensor_2d(&[0.0, 0.0, 0.0], 1, 3, &device);
        let identity = tensor_2d(&[1.0], 1, 1, &device);
        let out = pool.forward(x, identity, &topo).unwrap();
        assert_eq!(out.perm, vec![0]);
        assert_eq!(out.topology, topo);
        assert_eq!(to_vec_f32(out.embeddings).unwrap(), vec![0.0, 0.0, 0.0]);
    }
}
