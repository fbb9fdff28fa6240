//! Seeded parameter initialization.
//!
//! burn's own initializers draw from a backend-global RNG. Every learnable
//! tensor here is instead filled from an [`RngKey`], so two models built
//! from the same key are bit-identical on any backend.

use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use roigraph_core::{tensor_2d, RngKey};

/// `U[-1/sqrt(fan_in), 1/sqrt(fan_in))`, the usual linear-layer default.
fn fan_in_bound(fan_in: usize) -> f32 {
    1.0 / (fan_in.max(1) as f32).sqrt()
}

/// Linear layer `d_in -> d_out` with weights drawn from `key`.
pub(crate) fn init_linear<B: Backend>(
    d_in: usize,
    d_out: usize,
    bias: bool,
    key: RngKey,
    device: &B::Device,
) -> Linear<B> {
    let bound = fan_in_bound(d_in);
    let (weight_key, bias_key) = key.split_two();

    let mut linear = LinearConfig::new(d_in, d_out).with_bias(bias).init(device);
    linear.weight = Param::from_tensor(tensor_2d(
        &weight_key.uniform(d_in * d_out, bound),
        d_in,
        d_out,
        device,
    ));
    if bias {
        linear.bias = Some(Param::from_tensor(tensor_1d(
            &bias_key.uniform(d_out, bound),
            device,
        )));
    }
    linear
}

/// `[rows, cols]` parameter drawn from `U[-bound, bound)`.
pub(crate) fn init_matrix<B: Backend>(
    rows: usize,
    cols: usize,
    bound: f32,
    key: RngKey,
    device: &B::Device,
) -> Param<Tensor<B, 2>> {
    Param::from_tensor(tensor_2d(&key.uniform(rows * cols, bound), rows, cols, device))
}

/// Constant-filled vector parameter.
pub(crate) fn init_constant<B: Backend>(len: usize, value: f32, device: &B::Device) -> Param<Tensor<B, 1>> {
    Param::from_tensor(tensor_1d(&vec![value; len], device))
}

pub(crate) fn tensor_1d<B: Backend>(data: &[f32], device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(data, device)
}
