//! Backend aliases and tensor helpers shared by the workspace.
//!
//! The classifier is generic over [`Backend`]; these aliases pick the
//! concrete backends used by tests, benches and the demo binaries.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use crate::error::{GnnError, Result};

/// CPU inference backend.
pub type CpuBackend = burn::backend::NdArray;

/// CPU training backend with reverse-mode autodiff.
pub type TrainBackend = burn::backend::Autodiff<CpuBackend>;

#[cfg(feature = "gpu")]
pub type WgpuBackend = burn::backend::Wgpu;

/// Default CPU device.
pub fn cpu_device() -> <CpuBackend as Backend>::Device {
    Default::default()
}

#[cfg(feature = "gpu")]
pub fn init_gpu_device() -> burn::backend::wgpu::WgpuDevice {
    // Metal is picked automatically on macOS when available
    burn::backend::wgpu::WgpuDevice::default()
}

/// Read a float tensor back to the host as `f32` values in row-major order.
pub fn to_vec_f32<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| GnnError::TensorData(format!("{e:?}")))
}

/// Build a 2D float tensor from row-major host data.
pub fn tensor_2d<B: Backend>(data: &[f32], rows: usize, cols: usize, device: &B::Device) -> Tensor<B, 2> {
    let flat: Tensor<B, 1> = Tensor::from_data(data, device);
    flat.reshape([rows, cols])
}

/// Build a 1D index tensor from host node indices.
pub fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
    Tensor::from_data(TensorData::new(data, [indices.len()]), device)
}
