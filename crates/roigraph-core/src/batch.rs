//! Disjoint-union batches of ROI graphs.
//!
//! A [`GraphBatch`] packs several [`RoiGraph`]s into one node set. Nodes of a
//! graph stay contiguous, so graph membership is a list of offsets
//! (`graph_ptr`) rather than a scatter index. Pooling produces a new
//! [`GraphTopology`] with the same layout; nothing is mutated in place.
//!
//! ```text
//! graph_ptr = [0, 4, 8]      graph 0 owns nodes 0..4, graph 1 owns 4..8
//! roi_index = [0,1,2,3, 2,0,3,1]   atlas ROI of every node
//! ```
//!
//! `roi_index` comes from each graph's own ROI bookkeeping, so a relabelled
//! subject still reports the ROIs its nodes stand for.

use std::ops::Range;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::backend::tensor_2d;
use crate::error::{GnnError, Result};
use crate::graph::{GraphEdge, GraphLabel, RoiGraph};

/// Host-side structure of a (possibly pooled) batch.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphTopology {
    /// Edges with batch-global node indices.
    pub edges: Vec<GraphEdge>,
    /// Node offsets per graph, length `num_graphs + 1`.
    pub graph_ptr: Vec<usize>,
    /// Original ROI index of every node.
    pub roi_index: Vec<usize>,
}

impl GraphTopology {
    /// Number of nodes across all graphs.
    pub fn num_nodes(&self) -> usize {
        self.roi_index.len()
    }

    pub fn num_graphs(&self) -> usize {
        self.graph_ptr.len().saturating_sub(1)
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Node range of graph `g`.
    pub fn graph_range(&self, g: usize) -> Range<usize> {
        self.graph_ptr[g]..self.graph_ptr[g + 1]
    }

    /// Node count of every graph.
    pub fn node_counts(&self) -> Vec<usize> {
        self.graph_ptr.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Graph id of every node.
    pub fn graph_membership(&self) -> Vec<usize> {
        let mut membership = Vec::with_capacity(self.num_nodes());
        for (g, w) in self.graph_ptr.windows(2).enumerate() {
            membership.extend(std::iter::repeat(g).take(w[1] - w[0]));
        }
        membership
    }

    /// Per-edge mean-aggregation coefficients `w_e / indeg(dst_e)`, in edge order.
    ///
    /// Summing `coef_e * m_src` into every destination gives the weighted
    /// mean over incoming edges (parallel edges count separately). Nodes
    /// without incoming edges receive nothing.
    pub fn mean_coefficients(&self) -> Vec<f32> {
        let mut in_degree = vec![0usize; self.num_nodes()];
        for edge in &self.edges {
            in_degree[edge.dst] += 1;
        }
        self.edges
            .iter()
            .map(|e| e.weight / in_degree[e.dst] as f32)
            .collect()
    }

    /// Source endpoint of every edge.
    pub fn sources(&self) -> Vec<usize> {
        self.edges.iter().map(|e| e.src).collect()
    }

    /// Destination endpoint of every edge.
    pub fn destinations(&self) -> Vec<usize> {
        self.edges.iter().map(|e| e.dst).collect()
    }

    /// Restrict to the nodes in `keep` (sorted batch-global indices).
    ///
    /// Edges touching a dropped node are removed, surviving edges are
    /// re-indexed, and `graph_ptr` / `roi_index` follow the new ordering.
    pub fn restrict(&self, keep: &[usize]) -> GraphTopology {
        let n = self.num_nodes();
        let mut old_to_new = vec![None; n];
        for (new, &old) in keep.iter().enumerate() {
            old_to_new[old] = Some(new);
        }

        let edges = self
            .edges
            .iter()
            .filter_map(|e| match (old_to_new[e.src], old_to_new[e.dst]) {
                (Some(src), Some(dst)) => Some(GraphEdge::new(src, dst, e.weight)),
                _ => None,
            })
            .collect();

        let membership = self.graph_membership();
        let mut graph_ptr = vec![0usize; self.num_graphs() + 1];
        for &old in keep {
            graph_ptr[membership[old] + 1] += 1;
        }
        for g in 0..self.num_graphs() {
            graph_ptr[g + 1] += graph_ptr[g];
        }

        let roi_index = keep.iter().map(|&old| self.roi_index[old]).collect();

        GraphTopology {
            edges,
            graph_ptr,
            roi_index,
        }
    }
}

/// A batch of graphs ready for the encoder.
#[derive(Clone, Debug)]
pub struct GraphBatch<B: Backend> {
    /// `[N, in_dim]` node features.
    pub node_features: Tensor<B, 2>,
    /// `[N, R]` node identity rows.
    pub node_identity: Tensor<B, 2>,
    /// Edges, offsets and ROI bookkeeping.
    pub topology: GraphTopology,
    /// One label per graph.
    pub labels: Vec<GraphLabel>,
    /// Task id shared by every graph in the batch.
    pub task_id: usize,
    in_dim: usize,
    identity_dim: usize,
}

impl<B: Backend> GraphBatch<B> {
    /// Pack graphs into a disjoint union.
    ///
    /// # Errors
    ///
    /// - [`GnnError::EmptyBatch`] for an empty slice
    /// - [`GnnError::DimensionMismatch`] if graphs disagree on `in_dim` or identity width
    /// - [`GnnError::MixedTaskBatch`] if task ids differ
    pub fn new(graphs: &[RoiGraph], device: &B::Device) -> Result<Self> {
        let first = graphs.first().ok_or(GnnError::EmptyBatch)?;
        let in_dim = first.in_dim();
        let identity_dim = first.identity_dim();
        let task_id = first.task_id();

        let total_nodes: usize = graphs.iter().map(RoiGraph::num_nodes).sum();
        let mut features = Vec::with_capacity(total_nodes * in_dim);
        let mut identity = Vec::with_capacity(total_nodes * identity_dim);
        let mut edges = Vec::new();
        let mut graph_ptr = Vec::with_capacity(graphs.len() + 1);
        let mut roi_index = Vec::with_capacity(total_nodes);
        let mut labels = Vec::with_capacity(graphs.len());

        graph_ptr.push(0);
        for (g, graph) in graphs.iter().enumerate() {
            if graph.in_dim() != in_dim {
                return Err(GnnError::dim("in_dim", in_dim, graph.in_dim()));
            }
            if graph.identity_dim() != identity_dim {
                return Err(GnnError::dim(
                    "node_identity width",
                    identity_dim,
                    graph.identity_dim(),
                ));
            }
            if graph.task_id() != task_id {
                return Err(GnnError::MixedTaskBatch {
                    expected: task_id,
                    got: graph.task_id(),
                    graph: g,
                });
            }

            let offset = roi_index.len();
            features.extend_from_slice(graph.node_features());
            identity.extend_from_slice(graph.node_identity());
            edges.extend(
                graph
                    .edges()
                    .iter()
                    .map(|e| GraphEdge::new(e.src + offset, e.dst + offset, e.weight)),
            );
            roi_index.extend_from_slice(graph.roi_index());
            graph_ptr.push(roi_index.len());
            labels.push(graph.label());
        }

        log::debug!(
            "packed {} graphs: {} nodes, {} edges, task {}",
            graphs.len(),
            total_nodes,
            edges.len(),
            task_id
        );

        Ok(Self {
            node_features: tensor_2d(&features, total_nodes, in_dim, device),
            node_identity: tensor_2d(&identity, total_nodes, identity_dim, device),
            topology: GraphTopology {
                edges,
                graph_ptr,
                roi_index,
            },
            labels,
            task_id,
            in_dim,
            identity_dim,
        })
    }

    pub fn num_graphs(&self) -> usize {
        self.topology.num_graphs()
    }

    pub fn num_nodes(&self) -> usize {
        self.topology.num_nodes()
    }

    pub const fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub const fn identity_dim(&self) -> usize {
        self.identity_dim
    }

    /// Class ids of every graph, or an error if any label is continuous.
    pub fn class_labels(&self) -> Result<Vec<usize>> {
        self.labels
            .iter()
            .enumerate()
            .map(|(g, l)| {
                l.class().ok_or_else(|| {
                    GnnError::LabelMismatch(format!("graph {g} has a continuous label"))
                })
            })
            .collect()
    }
}
