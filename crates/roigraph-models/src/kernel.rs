//! Per-node kernel generator.
//!
//! A two-layer hypernetwork turns each node's identity row into its own
//! `in_dim x out_dim` transform:
//!
//! ```text
//! identity [N, R] --Linear(R, k)--> ReLU --Linear(k, in*out)--> reshape [N, in, out]
//! ```
//!
//! The bottleneck `k` acts as a community count: ROIs whose identity rows
//! load on the same bottleneck units share most of their transform.

use burn::module::Module;
use burn::nn::Linear;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use roigraph_core::{GnnError, Result, RngKey};

use crate::init::init_linear;

#[derive(Module, Debug)]
pub struct KernelGenerator<B: Backend> {
    pub(crate) hidden: Linear<B>,
    pub(crate) output: Linear<B>,
    roi_count: usize,
    in_dim: usize,
    out_dim: usize,
}

impl<B: Backend> KernelGenerator<B> {
    pub fn new(
        roi_count: usize,
        rank: usize,
        in_dim: usize,
        out_dim: usize,
        key: RngKey,
        device: &B::Device,
    ) -> Self {
        let (hidden_key, output_key) = key.split_two();
        Self {
            hidden: init_linear(roi_count, rank, false, hidden_key, device),
            output: init_linear(rank, in_dim * out_dim, true, output_key, device),
            roi_count,
            in_dim,
            out_dim,
        }
    }

    /// Generate one kernel per identity row.
    ///
    /// # Errors
    ///
    /// [`GnnError::DimensionMismatch`] if the identity width is not the ROI
    /// count this generator was built for.
    pub fn forward(&self, identity: Tensor<B, 2>) -> Result<Tensor<B, 3>> {
        let [n, width] = identity.dims();
        if width != self.roi_count {
            return Err(GnnError::dim("node_identity width", self.roi_count, width));
        }

        let h = relu(self.hidden.forward(identity));
        Ok(self.output.forward(h).reshape([n, self.in_dim, self.out_dim]))
    }

    pub const fn roi_count(&self) -> usize {
        self.roi_count
    }

    /// `(in_dim, out_dim)` of every generated kernel.
    pub const fn kernel_shape(&self) -> (usize, usize) {
        (self.in_dim, self.out_dim)
    }
}
