//! Parameter persistence.
//!
//! Parameters are flattened into a [`ParameterStore`] under dotted names
//! (`encoder.stages.0.conv.kernel.hidden.weight`, `head.heads.2.output.bias`,
//! ...) and written as a safetensors file (F32, little endian). The model
//! config travels in the safetensors metadata as JSON, so a checkpoint can
//! only be restored into a model of the same configuration.
//!
//! Values round-trip bit for bit.

use std::collections::HashMap;
use std::path::Path;

use burn::module::Param;
use burn::nn::Linear;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use indexmap::IndexMap;
use roigraph_core::{tensor_2d, to_vec_f32, GnnError, Result, RngKey};
use safetensors::tensor::{Dtype, SafeTensors, TensorView};

use crate::config::BrainGnnConfig;
use crate::conv::IdentityConv;
use crate::encoder::{EncoderStage, HierarchicalEncoder};
use crate::head::{FeatureNorm, MultiTaskHead, TaskHead};
use crate::init::tensor_1d;
use crate::kernel::KernelGenerator;
use crate::model::BrainGnn;
use crate::pool::TopKPool;

/// Metadata key holding the JSON model config.
pub const CONFIG_METADATA_KEY: &str = "roigraph.config";
/// Metadata key holding the format version.
pub const FORMAT_METADATA_KEY: &str = "roigraph.format";
const FORMAT_VERSION: &str = "1";

/// Flat, ordered collection of named host tensors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterStore {
    tensors: IndexMap<String, (Vec<usize>, Vec<f32>)>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) {
        self.tensors.insert(name.into(), (shape, values));
    }

    /// Shape and values of `name`.
    pub fn get(&self, name: &str) -> Option<(&[usize], &[f32])> {
        self.tensors
            .get(name)
            .map(|(shape, values)| (shape.as_slice(), values.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total scalar count.
    pub fn num_values(&self) -> usize {
        self.tensors.values().map(|(_, v)| v.len()).sum()
    }

    fn read(&self, name: &str, expected: &[usize]) -> Result<&[f32]> {
        let (shape, values) = self
            .get(name)
            .ok_or_else(|| GnnError::MissingParameter(name.to_string()))?;
        if shape != expected {
            return Err(GnnError::ParameterShape {
                name: name.to_string(),
                expected: expected.to_vec(),
                got: shape.to_vec(),
            });
        }
        Ok(values)
    }

    fn tensor_2d<B: Backend>(&self, name: &str, shape: [usize; 2], device: &B::Device) -> Result<Tensor<B, 2>> {
        let values = self.read(name, &shape)?;
        Ok(tensor_2d(values, shape[0], shape[1], device))
    }

    fn tensor_1d<B: Backend>(&self, name: &str, len: usize, device: &B::Device) -> Result<Tensor<B, 1>> {
        let values = self.read(name, &[len])?;
        Ok(tensor_1d(values, device))
    }

    fn insert_tensor<B: Backend, const D: usize>(&mut self, name: String, tensor: Tensor<B, D>) -> Result<()> {
        let shape = tensor.dims().to_vec();
        let values = to_vec_f32(tensor)?;
        self.insert(name, shape, values);
        Ok(())
    }

    /// Encode as safetensors bytes with the given metadata.
    pub fn to_safetensors(&self, metadata: HashMap<String, String>) -> Result<Vec<u8>> {
        let bytes: Vec<(&str, &[usize], Vec<u8>)> = self
            .tensors
            .iter()
            .map(|(name, (shape, values))| {
                let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                (name.as_str(), shape.as_slice(), data)
            })
            .collect();

        let mut views = Vec::with_capacity(bytes.len());
        for (name, shape, data) in &bytes {
            views.push((*name, TensorView::new(Dtype::F32, shape.to_vec(), data)?));
        }
        Ok(safetensors::serialize(views, &Some(metadata))?)
    }

    /// Decode safetensors bytes. Returns the store and the file metadata.
    pub fn from_safetensors(bytes: &[u8]) -> Result<(Self, HashMap<String, String>)> {
        let (_, header) = SafeTensors::read_metadata(bytes)?;
        let metadata = header.metadata().clone().unwrap_or_default();
        let tensors = SafeTensors::deserialize(bytes)?;

        let mut names: Vec<String> = tensors.names().into_iter().cloned().collect();
        names.sort();

        let mut store = Self::new();
        for name in names {
            let view = tensors.tensor(&name)?;
            if view.dtype() != Dtype::F32 {
                return Err(GnnError::TensorData(format!(
                    "parameter '{name}' has dtype {:?}, expected F32",
                    view.dtype()
                )));
            }
            let values = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            store.insert(name, view.shape().to_vec(), values);
        }
        Ok((store, metadata))
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Modules that can be flattened into / restored from a [`ParameterStore`].
///
/// `restore_params` consumes a freshly built module of the same shape and
/// replaces every parameter with the stored values.
pub trait NamedParameters<B: Backend>: Sized {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()>;

    fn restore_params(self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self>;
}

impl<B: Backend> NamedParameters<B> for Linear<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        store.insert_tensor(join(prefix, "weight"), self.weight.val())?;
        if let Some(bias) = &self.bias {
            store.insert_tensor(join(prefix, "bias"), bias.val())?;
        }
        Ok(())
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        let shape = self.weight.dims();
        self.weight = Param::from_tensor(store.tensor_2d(&join(prefix, "weight"), shape, device)?);
        if let Some(bias) = &self.bias {
            let [len] = bias.dims();
            self.bias = Some(Param::from_tensor(store.tensor_1d(&join(prefix, "bias"), len, device)?));
        }
        Ok(self)
    }
}

impl<B: Backend> NamedParameters<B> for KernelGenerator<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        self.hidden.collect_params(&join(prefix, "hidden"), store)?;
        self.output.collect_params(&join(prefix, "output"), store)
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        self.hidden = self.hidden.restore_params(&join(prefix, "hidden"), store, device)?;
        self.output = self.output.restore_params(&join(prefix, "output"), store, device)?;
        Ok(self)
    }
}

impl<B: Backend> NamedParameters<B> for IdentityConv<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        self.kernel.collect_params(&join(prefix, "kernel"), store)
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        self.kernel = self.kernel.restore_params(&join(prefix, "kernel"), store, device)?;
        Ok(self)
    }
}

impl<B: Backend> NamedParameters<B> for TopKPool<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        store.insert_tensor(join(prefix, "weight"), self.weight.val())
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        let shape = self.weight.dims();
        self.weight = Param::from_tensor(store.tensor_2d(&join(prefix, "weight"), shape, device)?);
        Ok(self)
    }
}

impl<B: Backend> NamedParameters<B> for EncoderStage<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        self.conv.collect_params(&join(prefix, "conv"), store)?;
        self.pool.collect_params(&join(prefix, "pool"), store)?;
        if let Some(project) = &self.project {
            project.collect_params(&join(prefix, "project"), store)?;
        }
        Ok(())
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        self.conv = self.conv.restore_params(&join(prefix, "conv"), store, device)?;
        self.pool = self.pool.restore_params(&join(prefix, "pool"), store, device)?;
        self.project = self
            .project
            .map(|p| p.restore_params(&join(prefix, "project"), store, device))
            .transpose()?;
        Ok(self)
    }
}

impl<B: Backend> NamedParameters<B> for HierarchicalEncoder<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        for (i, stage) in self.stages.iter().enumerate() {
            stage.collect_params(&join(prefix, &format!("stages.{i}")), store)?;
        }
        Ok(())
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        self.stages = std::mem::take(&mut self.stages)
            .into_iter()
            .enumerate()
            .map(|(i, stage)| stage.restore_params(&join(prefix, &format!("stages.{i}")), store, device))
            .collect::<Result<_>>()?;
        Ok(self)
    }
}

impl<B: Backend> NamedParameters<B> for FeatureNorm<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        store.insert_tensor(join(prefix, "gamma"), self.gamma.val())?;
        store.insert_tensor(join(prefix, "beta"), self.beta.val())
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        let [len] = self.gamma.dims();
        self.gamma = Param::from_tensor(store.tensor_1d(&join(prefix, "gamma"), len, device)?);
        self.beta = Param::from_tensor(store.tensor_1d(&join(prefix, "beta"), len, device)?);
        Ok(self)
    }
}

impl<B: Backend> NamedParameters<B> for TaskHead<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        if let Some(hidden) = &self.hidden {
            hidden.collect_params(&join(prefix, "hidden"), store)?;
        }
        if let Some(norm) = &self.norm {
            norm.collect_params(&join(prefix, "norm"), store)?;
        }
        self.output.collect_params(&join(prefix, "output"), store)
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        self.hidden = self
            .hidden
            .map(|h| h.restore_params(&join(prefix, "hidden"), store, device))
            .transpose()?;
        self.norm = self
            .norm
            .map(|n| n.restore_params(&join(prefix, "norm"), store, device))
            .transpose()?;
        self.output = self.output.restore_params(&join(prefix, "output"), store, device)?;
        Ok(self)
    }
}

impl<B: Backend> NamedParameters<B> for MultiTaskHead<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        for (i, head) in self.heads.iter().enumerate() {
            head.collect_params(&join(prefix, &format!("heads.{i}")), store)?;
        }
        Ok(())
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        self.heads = std::mem::take(&mut self.heads)
            .into_iter()
            .enumerate()
            .map(|(i, head)| head.restore_params(&join(prefix, &format!("heads.{i}")), store, device))
            .collect::<Result<_>>()?;
        Ok(self)
    }
}

impl<B: Backend> NamedParameters<B> for BrainGnn<B> {
    fn collect_params(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
        self.encoder.collect_params(&join(prefix, "encoder"), store)?;
        self.head.collect_params(&join(prefix, "head"), store)
    }

    fn restore_params(mut self, prefix: &str, store: &ParameterStore, device: &B::Device) -> Result<Self> {
        self.encoder = self.encoder.restore_params(&join(prefix, "encoder"), store, device)?;
        self.head = self.head.restore_params(&join(prefix, "head"), store, device)?;
        Ok(self)
    }
}

impl<B: Backend> BrainGnn<B> {
    /// All trainable parameters under their dotted names.
    pub fn parameters(&self) -> Result<ParameterStore> {
        let mut store = ParameterStore::new();
        self.collect_params("", &mut store)?;
        Ok(store)
    }

    /// Write parameters and `config` to a safetensors file.
    ///
    /// `config` must be the configuration this model was built from.
    pub fn save(&self, config: &BrainGnnConfig, path: &Path) -> Result<()> {
        let store = self.parameters()?;
        let mut metadata = HashMap::new();
        metadata.insert(CONFIG_METADATA_KEY.to_string(), serde_json::to_string(config)?);
        metadata.insert(FORMAT_METADATA_KEY.to_string(), FORMAT_VERSION.to_string());

        let bytes = store.to_safetensors(metadata)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        log::info!(
            "saved {} parameters ({} values) to {}",
            store.len(),
            store.num_values(),
            path.display()
        );
        Ok(())
    }
}

/// Read the model config stored in a checkpoint.
pub fn read_checkpoint_config(path: &Path) -> Result<BrainGnnConfig> {
    let bytes = std::fs::read(path)?;
    let (_, header) = SafeTensors::read_metadata(&bytes)?;
    config_from_metadata(header.metadata().as_ref())
}

fn config_from_metadata(metadata: Option<&HashMap<String, String>>) -> Result<BrainGnnConfig> {
    let json = metadata
        .and_then(|m| m.get(CONFIG_METADATA_KEY))
        .ok_or_else(|| GnnError::ConfigMismatch("checkpoint carries no model config".into()))?;
    Ok(serde_json::from_str(json)?)
}

impl BrainGnnConfig {
    /// Build a model of this configuration and restore its parameters from
    /// `path`.
    ///
    /// # Errors
    ///
    /// - [`GnnError::ConfigMismatch`] if the checkpoint was written for a
    ///   different configuration
    /// - [`GnnError::MissingParameter`] / [`GnnError::ParameterShape`] for
    ///   incomplete or malformed checkpoints
    pub fn init_from_checkpoint<B: Backend>(&self, path: &Path, device: &B::Device) -> Result<BrainGnn<B>> {
        let bytes = std::fs::read(path)?;
        let (store, metadata) = ParameterStore::from_safetensors(&bytes)?;
        let stored = config_from_metadata(Some(&metadata))?;
        if &stored != self {
            return Err(GnnError::ConfigMismatch(format!(
                "checkpoint has {stored:?}, model has {self:?}"
            )));
        }

        // parameters are overwritten below, the init key is irrelevant
        let model = self.init::<B>(RngKey::new(0), device)?;
        let expected = model.parameters()?;
        if let Some(extra) = store.names().find(|n| expected.get(n).is_none()) {
            log::warn!("ignoring unknown checkpoint parameter '{extra}'");
        }

        let model = model.restore_params("", &store, device)?;
        log::info!("restored {} parameters from {}", store.len(), path.display());
        Ok(model)
    }
}

/// Load a checkpoint together with the config stored in it.
pub fn load_checkpoint<B: Backend>(path: &Path, device: &B::Device) -> Result<(BrainGnnConfig, BrainGnn<B>)> {
    let config = read_checkpoint_config(path)?;
    let model = config.init_from_checkpoint(path, device)?;
    Ok((config, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roigraph_core::{cpu_device, CpuBackend};

    #[test]
    fn test_parameter_names() {
        let device = cpu_device();
        let config = BrainGnnConfig::dev(4)
            .with_hidden_dims(vec![8, 6, 8])
            .with_head_hidden(5, 0.1);
        let model = config.init::<CpuBackend>(RngKey::new(0), &device).unwrap();
        let store = model.parameters().unwrap();
        let names: Vec<&str> = store.names().collect();

        assert!(names.contains(&"encoder.stages.0.conv.kernel.hidden.weight"));
        assert!(names.contains(&"encoder.stages.0.conv.kernel.output.bias"));
        assert!(names.contains(&"encoder.stages.2.pool.weight"));
        assert!(names.contains(&"encoder.stages.1.project.weight"));
        assert!(!names.contains(&"encoder.stages.0.project.weight"));
        assert!(names.contains(&"head.heads.3.norm.gamma"));
        assert!(!names.contains(&"encoder.stages.0.conv.kernel.hidden.bias"));

        let (shape, _) = store.get("encoder.stages.0.conv.kernel.hidden.weight").unwrap();
        assert_eq!(shape, &[4, 4]);
        let (shape, _) = store.get("encoder.stages.1.conv.kernel.output.weight").unwrap();
        assert_eq!(shape, &[4, 8 * 6]);
    }

    #[test]
    fn test_store_safetensors_bytes_roundtrip() {
        let mut store = ParameterStore::new();
        store.insert("a.weight", vec![2, 2], vec![1.5, -0.0, f32::MIN_POSITIVE, 3.25]);
        store.insert("b", vec![1], vec![7.0]);
        let bytes = store.to_safetensors(HashMap::new()).unwrap();
        let (decoded, _) = ParameterStore::from_safetensors(&bytes).unwrap();
        for name in store.names() {
            let (s1, v1) = store.get(name).unwrap();
            let (s2, v2) = decoded.get(name).unwrap();
            assert_eq!(s1, s2);
            let bits1: Vec<u32> = v1.iter().map(|v| v.to_bits()).collect();
            let bits2: Vec<u32> = v2.iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits1, bits2);
        }
    }

    #[test]
    fn test_restore_reports_missing_and_misshaped() {
        let device = cpu_device();
        let config = BrainGnnConfig::dev(4);
        let model = config.init::<CpuBackend>(RngKey::new(0), &device).unwrap();

        let err = model
            .clone()
            .restore_params("", &ParameterStore::new(), &device)
            .unwrap_err();
        assert!(matches!(err, GnnError::MissingParameter(_)));

        let mut store = model.parameters().unwrap();
        store.insert("encoder.stages.0.pool.weight", vec![3, 1], vec![0.0; 3]);
        let err = model.restore_params("", &store, &device).unwrap_err();
        assert!(matches!(err, GnnError::ParameterShape { .. }));
    }
}
