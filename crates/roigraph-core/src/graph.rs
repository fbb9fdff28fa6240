//! Per-subject functional-connectivity graphs.
//!
//! - [`GraphEdge`]: a directed edge with a non-negative connectivity weight
//! - [`GraphLabel`]: class id or continuous target
//! - [`RoiGraph`]: one subject's graph (ROI features, identity rows, edges)
//!
//! Graphs are validated once at construction and are immutable afterwards.
//! Every node carries the atlas ROI it stands for. Node order inside a graph
//! is free; the ROI index is what stays fixed under relabelling.

use serde::{Deserialize, Serialize};

use crate::error::{GnnError, Result};

/// An edge in a graph connecting two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node index
    pub src: usize,
    /// Destination node index
    pub dst: usize,
    /// Connectivity strength
    pub weight: f32,
}

impl GraphEdge {
    /// Create a new edge.
    pub const fn new(src: usize, dst: usize, weight: f32) -> Self {
        Self { src, dst, weight }
    }
}

/// Graph-level target. Its meaning depends on the graph's task id.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GraphLabel {
    /// Class id for classification tasks.
    Class(usize),
    /// Continuous target for regression tasks.
    Value(f32),
}

impl GraphLabel {
    /// Class id, if this is a classification label.
    pub const fn class(&self) -> Option<usize> {
        match self {
            GraphLabel::Class(c) => Some(*c),
            GraphLabel::Value(_) => None,
        }
    }

    /// Continuous target, if this is a regression label.
    pub const fn value(&self) -> Option<f32> {
        match self {
            GraphLabel::Class(_) => None,
            GraphLabel::Value(v) => Some(*v),
        }
    }
}

/// One subject's ROI graph.
///
/// Node features and identity rows are stored row-major. The identity width
/// is the full ROI count of the atlas and defaults to the one-hot encoding of
/// each node's own index. `roi_index[i]` is the atlas ROI of node `i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiGraph {
    num_nodes: usize,
    in_dim: usize,
    node_features: Vec<f32>,
    identity_dim: usize,
    node_identity: Vec<f32>,
    roi_index: Vec<usize>,
    edges: Vec<GraphEdge>,
    label: GraphLabel,
    task_id: usize,
}

impl RoiGraph {
    /// Create a graph with the default identity encoding (`R x R` identity).
    ///
    /// # Arguments
    ///
    /// * `in_dim` - Feature width per ROI
    /// * `node_features` - `[R * in_dim]` row-major features
    /// * `edges` - Directed edges with non-negative weights
    /// * `label` - Graph-level target
    /// * `task_id` - Head selector
    ///
    /// # Errors
    ///
    /// Returns an error when the feature buffer does not divide into rows of
    /// `in_dim`, when the graph has no nodes, or when an edge is out of range
    /// or carries a negative / non-finite weight.
    pub fn new(
        in_dim: usize,
        node_features: Vec<f32>,
        edges: Vec<GraphEdge>,
        label: GraphLabel,
        task_id: usize,
    ) -> Result<Self> {
        if in_dim == 0 {
            return Err(GnnError::InvalidConfig("in_dim must be positive".into()));
        }
        if node_features.is_empty() {
            return Err(GnnError::dim("node count", 1, 0));
        }
        if node_features.len() % in_dim != 0 {
            return Err(GnnError::dim(
                "node_features length",
                (node_features.len() / in_dim + 1) * in_dim,
                node_features.len(),
            ));
        }
        let num_nodes = node_features.len() / in_dim;
        validate_edges(&edges, num_nodes)?;

        Ok(Self {
            num_nodes,
            in_dim,
            node_features,
            identity_dim: num_nodes,
            node_identity: identity_rows(num_nodes),
            roi_index: (0..num_nodes).collect(),
            edges,
            label,
            task_id,
        })
    }

    /// Build a graph from a dense `R x R` connectivity matrix.
    ///
    /// An edge `i -> j` is added for every entry with `|c_ij| > threshold`,
    /// weighted by `|c_ij|`. Diagonal entries become self-loops only when
    /// `self_loops` is set, with weight 1.
    pub fn from_dense_connectivity(
        in_dim: usize,
        node_features: Vec<f32>,
        connectivity: &[f32],
        threshold: f32,
        self_loops: bool,
        label: GraphLabel,
        task_id: usize,
    ) -> Result<Self> {
        if in_dim == 0 {
            return Err(GnnError::InvalidConfig("in_dim must be positive".into()));
        }
        let n = node_features.len() / in_dim;
        if connectivity.len() != n * n {
            return Err(GnnError::dim("connectivity entries", n * n, connectivity.len()));
        }

        let mut edges = Vec::new();
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    if self_loops {
                        edges.push(GraphEdge::new(i, j, 1.0));
                    }
                    continue;
                }
                let c = connectivity[i * n + j].abs();
                if c > threshold {
                    edges.push(GraphEdge::new(i, j, c));
                }
            }
        }

        Self::new(in_dim, node_features, edges, label, task_id)
    }

    /// Replace the identity encoding.
    ///
    /// `identity` is `[R * identity_dim]` row-major; one row per node. When
    /// the rows are distinct one-hot vectors, the hot column becomes each
    /// node's ROI index; any other encoding keeps the current ROI indices.
    pub fn with_identity(mut self, identity: Vec<f32>, identity_dim: usize) -> Result<Self> {
        if identity_dim == 0 {
            return Err(GnnError::InvalidConfig("identity_dim must be positive".into()));
        }
        if identity.len() != self.num_nodes * identity_dim {
            return Err(GnnError::dim(
                "node_identity entries",
                self.num_nodes * identity_dim,
                identity.len(),
            ));
        }
        if let Some(rois) = one_hot_columns(&identity, identity_dim) {
            self.roi_index = rois;
        }
        self.node_identity = identity;
        self.identity_dim = identity_dim;
        Ok(self)
    }

    /// Set the atlas ROI of every node explicitly.
    ///
    /// # Errors
    ///
    /// The list must have one entry per node, each below the identity width,
    /// with no ROI repeated.
    pub fn with_roi_index(mut self, roi_index: Vec<usize>) -> Result<Self> {
        if roi_index.len() != self.num_nodes {
            return Err(GnnError::dim("roi_index length", self.num_nodes, roi_index.len()));
        }
        let mut seen = vec![false; self.identity_dim];
        for &roi in &roi_index {
            if roi >= self.identity_dim || seen[roi] {
                return Err(GnnError::InvalidConfig(format!(
                    "roi index {roi} is out of range for {} ROIs or repeated",
                    self.identity_dim
                )));
            }
            seen[roi] = true;
        }
        self.roi_index = roi_index;
        Ok(self)
    }

    /// Relabel nodes so that new node `i` is old node `perm[i]`.
    ///
    /// Features, identity rows and edge endpoints move together, so the
    /// result describes the same subject.
    pub fn permuted(&self, perm: &[usize]) -> Result<Self> {
        let n = self.num_nodes;
        if perm.len() != n {
            return Err(GnnError::dim("permutation length", n, perm.len()));
        }
        let mut old_to_new = vec![usize::MAX; n];
        for (new, &old) in perm.iter().enumerate() {
            if old >= n || old_to_new[old] != usize::MAX {
                return Err(GnnError::InvalidConfig(format!(
                    "permutation entry {old} is out of range or repeated"
                )));
            }
            old_to_new[old] = new;
        }

        let mut features = Vec::with_capacity(self.node_features.len());
        let mut identity = Vec::with_capacity(self.node_identity.len());
        let mut roi_index = Vec::with_capacity(n);
        for &old in perm {
            features.extend_from_slice(self.feature_row(old));
            identity.extend_from_slice(self.identity_row(old));
            roi_index.push(self.roi_index[old]);
        }
        let edges = self
            .edges
            .iter()
            .map(|e| GraphEdge::new(old_to_new[e.src], old_to_new[e.dst], e.weight))
            .collect();

        Ok(Self {
            num_nodes: n,
            in_dim: self.in_dim,
            node_features: features,
            identity_dim: self.identity_dim,
            node_identity: identity,
            roi_index,
            edges,
            label: self.label,
            task_id: self.task_id,
        })
    }

    pub const fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub const fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub const fn identity_dim(&self) -> usize {
        self.identity_dim
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn node_features(&self) -> &[f32] {
        &self.node_features
    }

    pub fn node_identity(&self) -> &[f32] {
        &self.node_identity
    }

    /// Atlas ROI of every node.
    pub fn roi_index(&self) -> &[usize] {
        &self.roi_index
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub const fn label(&self) -> GraphLabel {
        self.label
    }

    pub const fn task_id(&self) -> usize {
        self.task_id
    }

    /// Feature row of one node.
    pub fn feature_row(&self, node: usize) -> &[f32] {
        &self.node_features[node * self.in_dim..(node + 1) * self.in_dim]
    }

    /// Identity row of one node.
    pub fn identity_row(&self, node: usize) -> &[f32] {
        &self.node_identity[node * self.identity_dim..(node + 1) * self.identity_dim]
    }
}

/// Row-major `n x n` identity matrix.
pub fn identity_rows(n: usize) -> Vec<f32> {
    let mut data = vec![0.0f32; n * n];
    for i in 0..n {
        data[i * n + i] = 1.0;
    }
    data
}

/// Hot column of every row, if each row is one-hot and no column repeats.
fn one_hot_columns(identity: &[f32], width: usize) -> Option<Vec<usize>> {
    let mut seen = vec![false; width];
    identity
        .chunks(width)
        .map(|row| {
            let hot = row.iter().position(|&v| v == 1.0)?;
            let one_hot = row.iter().enumerate().all(|(c, &v)| v == 0.0 || c == hot);
            (one_hot && !std::mem::replace(&mut seen[hot], true)).then_some(hot)
        })
        .collect()
}

fn validate_edges(edges: &[GraphEdge], num_nodes: usize) -> Result<()> {
    for (index, edge) in edges.iter().enumerate() {
        if edge.src >= num_nodes || edge.dst >= num_nodes {
            return Err(GnnError::InvalidEdge {
                src: edge.src,
                dst: edge.dst,
                num_nodes,
            });
        }
        if !edge.weight.is_finite() || edge.weight < 0.0 {
            return Err(GnnError::InvalidEdgeWeight {
                index,
                weight: edge.weight,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> RoiGraph {
        let edges = (0..n - 1).map(|i| GraphEdge::new(i, i + 1, 0.5)).collect();
        let features = (0..n).map(|i| i as f32).collect();
        RoiGraph::new(1, features, edges, GraphLabel::Class(1), 0).expect("valid chain")
    }

    #[test]
    fn test_default_identity_is_one_hot() {
        let g = chain(3);
        assert_eq!(g.identity_dim(), 3);
        assert_eq!(g.identity_row(0), &[1.0, 0.0, 0.0]);
        assert_eq!(g.identity_row(2), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_rejects_out_of_range_edge() {
        let err = RoiGraph::new(
            1,
            vec![0.0, 1.0],
            vec![GraphEdge::new(0, 2, 1.0)],
            GraphLabel::Class(0),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, GnnError::InvalidEdge { dst: 2, .. }));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let err = RoiGraph::new(
            1,
            vec![0.0, 1.0],
            vec![GraphEdge::new(0, 1, -0.3)],
            GraphLabel::Class(0),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, GnnError::InvalidEdgeWeight { index: 0, .. }));
    }

    #[test]
    fn test_rejects_ragged_features() {
        let err = RoiGraph::new(2, vec![0.0, 1.0, 2.0], vec![], GraphLabel::Class(0), 0)
            .unwrap_err();
        assert!(matches!(err, GnnError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_rejects_empty_graph() {
        let err = RoiGraph::new(1, vec![], vec![], GraphLabel::Class(0), 0).unwrap_err();
        assert!(matches!(err, GnnError::DimensionMismatch { field: "node count", .. }));
    }

    #[test]
    fn test_with_identity_checks_shape() {
        let g = chain(2);
        assert!(g.clone().with_identity(vec![1.0; 6], 3).is_ok());
        assert!(g.with_identity(vec![1.0; 5], 3).is_err());
    }

    #[test]
    fn test_dense_connectivity_threshold() {
        // 3 ROIs, only (0,1) and (1,0) above threshold
        let conn = [1.0, 0.8, 0.1, -0.8, 1.0, 0.05, 0.1, 0.05, 1.0];
        let g = RoiGraph::from_dense_connectivity(
            1,
            vec![0.0; 3],
            &conn,
            0.5,
            false,
            GraphLabel::Class(0),
            0,
        )
        .unwrap();
        assert_eq!(g.num_edges(), 2);
        assert!(g.edges().iter().all(|e| (e.weight - 0.8).abs() < 1e-6));

        let with_loops = RoiGraph::from_dense_connectivity(
            1,
            vec![0.0; 3],
            &conn,
            0.5,
            true,
            GraphLabel::Class(0),
            0,
        )
        .unwrap();
        assert_eq!(with_loops.num_edges(), 5);
    }

    #[test]
    fn test_permuted_moves_rows_and_edges() {
        let g = chain(3);
        let p = g.permuted(&[2, 0, 1]).unwrap();
        assert_eq!(p.feature_row(0), &[2.0]);
        assert_eq!(p.identity_row(0), &[0.0, 0.0, 1.0]);
        // old edge 0->1 becomes 1->2, old 1->2 becomes 2->0
        assert_eq!(p.edges()[0], GraphEdge::new(1, 2, 0.5));
        assert_eq!(p.edges()[1], GraphEdge::new(2, 0, 0.5));
    }

    #[test]
    fn test_permuted_carries_roi_index() {
        let g = chain(4);
        assert_eq!(g.roi_index(), &[0, 1, 2, 3]);
        let p = g.permuted(&[3, 1, 0, 2]).unwrap();
        assert_eq!(p.roi_index(), &[3, 1, 0, 2]);
        // permuting back restores the original order
        let back = p.permuted(&[2, 1, 3, 0]).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_with_identity_reads_one_hot_rois() {
        // three nodes standing for ROIs 4, 0 and 2 of a 5-ROI atlas
        let mut identity = vec![0.0; 15];
        identity[4] = 1.0;
        identity[5] = 1.0;
        identity[12] = 1.0;
        let g = chain(3).with_identity(identity, 5).unwrap();
        assert_eq!(g.roi_index(), &[4, 0, 2]);

        // dense encodings keep positional ROIs
        let dense = chain(3).with_identity(vec![0.5; 15], 5).unwrap();
        assert_eq!(dense.roi_index(), &[0, 1, 2]);
    }

    #[test]
    fn test_with_roi_index_validates() {
        let g = chain(3).with_identity(vec![0.2; 12], 4).unwrap();
        assert_eq!(g.clone().with_roi_index(vec![3, 0, 1]).unwrap().roi_index(), &[3, 0, 1]);
        assert!(g.clone().with_roi_index(vec![0, 1]).is_err());
        assert!(g.clone().with_roi_index(vec![0, 0, 1]).is_err());
        assert!(g.with_roi_index(vec![0, 1, 4]).is_err());
    }

    #[test]
    fn test_permuted_rejects_repeats() {
        assert!(chain(3).permuted(&[0, 0, 1]).is_err());
    }
}
