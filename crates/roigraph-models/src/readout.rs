//! Graph-level readout.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use roigraph_core::{GnnError, GraphTopology, Result};

/// `[G, 2 * dim]` concatenation of per-graph max and mean of `x`.
///
/// Every graph must own at least one node, which pooling guarantees.
pub fn max_mean_readout<B: Backend>(x: Tensor<B, 2>, topology: &GraphTopology) -> Result<Tensor<B, 2>> {
    let [n, _] = x.dims();
    if topology.num_nodes() != n {
        return Err(GnnError::dim("topology node count", n, topology.num_nodes()));
    }

    let mut rows = Vec::with_capacity(topology.num_graphs());
    for g in 0..topology.num_graphs() {
        let range = topology.graph_range(g);
        if range.is_empty() {
            return Err(GnnError::dim("nodes in graph", 1, 0));
        }
        let nodes = x.clone().narrow(0, range.start, range.len());
        let max = nodes.clone().max_dim(0);
        let mean = nodes.mean_dim(0);
        rows.push(Tensor::cat(vec![max, mean], 1));
    }
    Ok(Tensor::cat(rows, 0))
}
