//! # roigraph-core
//!
//! Core types for ROI-aware brain graph classification.
//!
//! - [`RoiGraph`]: one subject's functional-connectivity graph (ROI features,
//!   ROI identity rows, weighted edges, label, task id)
//! - [`GraphBatch`]: disjoint union of graphs with per-graph node ranges
//! - [`GraphTopology`]: host-side edge / membership / ROI bookkeeping that
//!   pooling restricts stage by stage
//! - [`GnnError`]: configuration and shape errors
//! - [`RngKey`]: explicit, splittable RNG handle
//! - [`PathConfig`]: output directory for checkpoints
//!
//! ```rust,ignore
//! use roigraph_core::{GraphBatch, GraphEdge, GraphLabel, RoiGraph, cpu_device, CpuBackend};
//!
//! let graph = RoiGraph::new(1, features, edges, GraphLabel::Class(1), 0)?;
//! let batch = GraphBatch::<CpuBackend>::new(&[graph], &cpu_device())?;
//! ```

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod graph;
pub mod rng;

pub use backend::*;
pub use batch::*;
pub use config::*;
pub use error::*;
pub use graph::*;
pub use rng::*;
