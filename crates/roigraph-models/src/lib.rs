//! # roigraph-models
//!
//! ROI-aware graph neural network for brain-state classification.
//!
//! ## Architecture
//!
//! ```text
//! GraphBatch ─► [IdentityConv ─► TopKPool ─► readout] x stages ─► Σ readouts ─► MultiTaskHead
//!                    ▲                │
//!             KernelGenerator    scores, kernel norms ─► structural losses
//! ```
//!
//! - [`KernelGenerator`]: hypernetwork from ROI identity to a per-node kernel
//! - [`IdentityConv`]: mean-aggregated message passing with per-node kernels
//! - [`TopKPool`]: learned per-graph top-k node selection
//! - [`HierarchicalEncoder`]: stacked conv + pool with max/mean readout
//! - [`MultiTaskHead`]: task-id dispatched classification / regression heads
//! - [`losses`]: unit-norm, top-k separation, within-class consistency, task loss
//! - [`persistence`]: named parameters in safetensors files
//!
//! ## Example
//!
//! ```rust,ignore
//! use roigraph_core::{cpu_device, CpuBackend, GraphBatch, RngKey};
//! use roigraph_models::{BrainGnnConfig, LossWeights};
//!
//! let device = cpu_device();
//! let config = BrainGnnConfig::new(1, 116);
//! let model = config.init::<CpuBackend>(RngKey::new(42), &device)?;
//!
//! let batch = GraphBatch::new(&graphs, &device)?;
//! let output = model.forward(&batch)?;
//! let classes = output.predicted_classes()?;
//! ```

pub mod config;
pub mod conv;
pub mod encoder;
pub mod head;
mod init;
pub mod kernel;
pub mod losses;
pub mod model;
pub mod persistence;
pub mod pool;
pub mod readout;

pub use config::*;
pub use conv::*;
pub use encoder::*;
pub use head::*;
pub use kernel::*;
pub use model::*;
pub use persistence::*;
pub use pool::*;
pub use readout::*;
