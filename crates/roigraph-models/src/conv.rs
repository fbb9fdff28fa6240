//! Identity-conditioned graph convolution.
//!
//! Every node transforms its own features with the kernel generated from its
//! identity row; messages are then scaled by edge weight and mean-aggregated
//! at the destination:
//!
//! ```text
//! m_s   = x_s · K(identity_s)                       [out_dim]
//! h_d   = 1/|in(d)| · Σ_{e: s->d} w_e · m_s
//! ```
//!
//! Aggregation gathers one message per edge and scatter-adds it into the
//! destination row, so cost grows with the edge count rather than with the
//! square of the batch node count. A node with no incoming edges gets the
//! zero vector. There is no bias term, so that holds exactly.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use roigraph_core::{index_tensor, GnnError, GraphTopology, Result, RngKey};

use crate::kernel::KernelGenerator;

/// Output of one convolution.
#[derive(Clone, Debug)]
pub struct ConvOutput<B: Backend> {
    /// `[N, out_dim]` node embeddings.
    pub embeddings: Tensor<B, 2>,
    /// `[N, in_dim, out_dim]` generated kernels.
    pub kernels: Tensor<B, 3>,
    /// `[N]` Frobenius norm of every node's kernel.
    pub kernel_norms: Tensor<B, 1>,
}

#[derive(Module, Debug)]
pub struct IdentityConv<B: Backend> {
    pub(crate) kernel: KernelGenerator<B>,
    in_dim: usize,
    out_dim: usize,
}

impl<B: Backend> IdentityConv<B> {
    pub fn new(
        in_dim: usize,
        out_dim: usize,
        roi_count: usize,
        rank: usize,
        key: RngKey,
        device: &B::Device,
    ) -> Self {
        Self {
            kernel: KernelGenerator::new(roi_count, rank, in_dim, out_dim, key, device),
            in_dim,
            out_dim,
        }
    }

    /// Convolve `x` over `topology`.
    ///
    /// `x`, `identity` and `topology` must describe the same `N` nodes.
    pub fn forward(
        &self,
        x: Tensor<B, 2>,
        identity: Tensor<B, 2>,
        topology: &GraphTopology,
    ) -> Result<ConvOutput<B>> {
        let [n, in_dim] = x.dims();
        if in_dim != self.in_dim {
            return Err(GnnError::dim("node feature width", self.in_dim, in_dim));
        }
        let [identity_rows, _] = identity.dims();
        if identity_rows != n {
            return Err(GnnError::dim("node_identity rows", n, identity_rows));
        }
        if topology.num_nodes() != n {
            return Err(GnnError::dim("topology node count", n, topology.num_nodes()));
        }

        let device = x.device();
        let kernels = self.kernel.forward(identity)?;
        let kernel_norms = (kernels.clone() * kernels.clone())
            .sum_dim(2)
            .sum_dim(1)
            .sqrt()
            .reshape([n]);

        let num_edges = topology.num_edges();
        let embeddings = if num_edges == 0 {
            Tensor::zeros([n, self.out_dim], &device)
        } else {
            // [N, 1, in] x [N, in, out] -> [N, 1, out]
            let messages = x
                .reshape([n, 1, self.in_dim])
                .matmul(kernels.clone())
                .reshape([n, self.out_dim]);
            let coefficients: Tensor<B, 1> =
                Tensor::from_data(topology.mean_coefficients().as_slice(), &device);
            let edge_messages = messages.select(0, index_tensor(&topology.sources(), &device))
                * coefficients.reshape([num_edges, 1]);
            let destinations = index_tensor::<B>(&topology.destinations(), &device)
                .reshape([num_edges, 1])
                .repeat_dim(1, self.out_dim);
            // scatter sums rows that share a destination
            Tensor::zeros([n, self.out_dim], &device).scatter(0, destinations, edge_messages)
        };

        Ok(ConvOutput {
            embeddings,
            kernels,
            kernel_norms,
        })
    }

    pub const fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub const fn in_dim(&self) -> usize {
        self.in_dim
    }
}
