//! Configuration for the ROI graph classifier.
//!
//! [`BrainGnnConfig`] fixes every shape the model will accept: the feature
//! width, the ROI count (identity width), per-stage hidden widths, the
//! pooling ratio, the hypernetwork bottleneck and the task heads. It can be
//! built in code with `with_*` setters or loaded from TOML:
//!
//! ```toml
//! in_dim = 1
//! roi_count = 116
//! hidden_dims = [32, 32, 32]
//! readout_dim = 32
//! keep_ratio = 0.5
//! kernel_rank = 8
//!
//! [[tasks]]
//! kind = "classification"
//! classes = 2
//!
//! [[tasks]]
//! kind = "regression"
//! ```

use std::path::Path;

use roigraph_core::error::{GnnError, Result};
use serde::{Deserialize, Serialize};

/// What a task head predicts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Log-probabilities over `classes` classes.
    Classification { classes: usize },
    /// One unconstrained scalar per graph.
    Regression,
}

impl TaskKind {
    /// Width of the head output.
    pub const fn output_width(&self) -> usize {
        match self {
            TaskKind::Classification { classes } => *classes,
            TaskKind::Regression => 1,
        }
    }

    pub const fn is_classification(&self) -> bool {
        matches!(self, TaskKind::Classification { .. })
    }
}

/// Model configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainGnnConfig {
    /// Feature width per ROI.
    pub in_dim: usize,
    /// Number of ROIs in the atlas; also the identity width.
    pub roi_count: usize,
    /// Convolution output width of every encoder stage.
    pub hidden_dims: Vec<usize>,
    /// Common node width used for readout. Stages of another width are projected.
    pub readout_dim: usize,
    /// Fraction of nodes kept by each pooling stage, in `(0, 1]`.
    pub keep_ratio: f64,
    /// Hypernetwork bottleneck width (community count).
    pub kernel_rank: usize,
    /// Hidden width of the task heads. `None` gives plain linear heads.
    pub head_hidden: Option<usize>,
    /// Dropout before the head output layer (training backends only).
    pub head_dropout: f64,
    /// One entry per task head, indexed by task id.
    // kept last: TOML arrays of tables must follow plain values
    pub tasks: Vec<TaskKind>,
}

impl Default for BrainGnnConfig {
    fn default() -> Self {
        Self {
            in_dim: 1,
            roi_count: 116,
            hidden_dims: vec![32, 32, 32],
            readout_dim: 32,
            keep_ratio: 0.5,
            kernel_rank: 8,
            head_hidden: None,
            head_dropout: 0.5,
            tasks: vec![
                TaskKind::Classification { classes: 2 },
                TaskKind::Classification { classes: 3 },
                TaskKind::Regression,
                TaskKind::Classification { classes: 2 },
            ],
        }
    }
}

impl BrainGnnConfig {
    /// Default configuration for a given feature width and ROI count.
    pub fn new(in_dim: usize, roi_count: usize) -> Self {
        Self {
            in_dim,
            roi_count,
            ..Self::default()
        }
    }

    /// Small config for tests and demos.
    pub fn dev(roi_count: usize) -> Self {
        Self {
            in_dim: 1,
            roi_count,
            hidden_dims: vec![8, 8, 8],
            readout_dim: 8,
            keep_ratio: 0.5,
            kernel_rank: 4,
            ..Self::default()
        }
    }

    pub fn with_hidden_dims(mut self, hidden_dims: Vec<usize>) -> Self {
        self.hidden_dims = hidden_dims;
        self
    }

    pub const fn with_readout_dim(mut self, readout_dim: usize) -> Self {
        self.readout_dim = readout_dim;
        self
    }

    pub const fn with_keep_ratio(mut self, keep_ratio: f64) -> Self {
        self.keep_ratio = keep_ratio;
        self
    }

    pub const fn with_kernel_rank(mut self, kernel_rank: usize) -> Self {
        self.kernel_rank = kernel_rank;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskKind>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Enable the hidden-layer head (linear, normalization, ReLU, dropout, linear).
    pub const fn with_head_hidden(mut self, hidden: usize, dropout: f64) -> Self {
        self.head_hidden = Some(hidden);
        self.head_dropout = dropout;
        self
    }

    /// Number of conv + pool stages.
    pub fn num_stages(&self) -> usize {
        self.hidden_dims.len()
    }

    /// Width of the encoder output per graph.
    pub const fn readout_width(&self) -> usize {
        2 * self.readout_dim
    }

    /// Check every configuration rule.
    pub fn validate(&self) -> Result<()> {
        if self.in_dim == 0 {
            return Err(GnnError::InvalidConfig("in_dim must be positive".into()));
        }
        if self.roi_count == 0 {
            return Err(GnnError::InvalidConfig("roi_count must be positive".into()));
        }
        if self.hidden_dims.is_empty() {
            return Err(GnnError::InvalidConfig(
                "hidden_dims needs one width per encoder stage".into(),
            ));
        }
        if let Some(stage) = self.hidden_dims.iter().position(|&d| d == 0) {
            return Err(GnnError::InvalidConfig(format!(
                "hidden_dims[{stage}] must be positive"
            )));
        }
        if self.readout_dim == 0 {
            return Err(GnnError::InvalidConfig("readout_dim must be positive".into()));
        }
        validate_keep_ratio(self.keep_ratio)?;
        if self.kernel_rank == 0 {
            return Err(GnnError::InvalidConfig("kernel_rank must be positive".into()));
        }
        if self.tasks.is_empty() {
            return Err(GnnError::InvalidConfig("at least one task head is required".into()));
        }
        for (id, task) in self.tasks.iter().enumerate() {
            if let TaskKind::Classification { classes } = task {
                if *classes < 2 {
                    return Err(GnnError::InvalidConfig(format!(
                        "task {id}: classification needs at least 2 classes, got {classes}"
                    )));
                }
            }
        }
        if self.head_hidden == Some(0) {
            return Err(GnnError::InvalidConfig("head_hidden must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.head_dropout) {
            return Err(GnnError::InvalidConfig(format!(
                "head_dropout must be in [0, 1), got {}",
                self.head_dropout
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML config.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| GnnError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| GnnError::InvalidConfig(e.to_string()))
    }
}

/// `keep_ratio` must lie in `(0, 1]`.
pub fn validate_keep_ratio(keep_ratio: f64) -> Result<()> {
    if keep_ratio > 0.0 && keep_ratio <= 1.0 {
        Ok(())
    } else {
        Err(GnnError::InvalidConfig(format!(
            "keep_ratio must be in (0, 1], got {keep_ratio}"
        )))
    }
}

/// Weights of the training objective terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossWeights {
    /// Task loss (NLL or MSE).
    pub task: f32,
    /// Generated-kernel unit-norm loss, per stage.
    pub unit: f32,
    /// Pooling-direction unit-norm loss, per stage.
    pub pool_unit: f32,
    /// Top-k separation loss, per stage.
    pub topk: f32,
    /// Within-class consistency loss on first-stage scores.
    pub consistency: f32,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            task: 1.0,
            unit: 0.1,
            pool_unit: 0.0,
            topk: 0.1,
            consistency: 0.1,
        }
    }
}

impl LossWeights {
    /// Task loss only.
    pub const fn task_only() -> Self {
        Self {
            task: 1.0,
            unit: 0.0,
            pool_unit: 0.0,
            topk: 0.0,
            consistency: 0.0,
        }
    }
}
