//! Multi-task prediction heads.
//!
//! One head per configured task. The batch's task id picks the head, and the
//! head reports its [`TaskKind`] so the caller knows whether it got
//! log-probabilities or a regression value.

use burn::module::{Module, Param};
use burn::nn::{Dropout, DropoutConfig, Linear};
use burn::tensor::activation::{log_softmax, relu};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use roigraph_core::{GnnError, Result, RngKey};

use crate::config::{BrainGnnConfig, TaskKind};
use crate::init::{init_constant, init_linear};

const NORM_EPSILON: f64 = 1e-5;

/// Per-sample feature normalization with a learned scale and shift.
#[derive(Module, Debug)]
pub struct FeatureNorm<B: Backend> {
    pub(crate) gamma: Param<Tensor<B, 1>>,
    pub(crate) beta: Param<Tensor<B, 1>>,
    dim: usize,
}

impl<B: Backend> FeatureNorm<B> {
    pub fn new(dim: usize, device: &B::Device) -> Self {
        Self {
            gamma: init_constant(dim, 1.0, device),
            beta: init_constant(dim, 0.0, device),
            dim,
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mean = x.clone().mean_dim(1);
        let centered = x - mean;
        let var = (centered.clone() * centered.clone()).mean_dim(1);
        let normalized = centered / (var + NORM_EPSILON).sqrt();
        normalized * self.gamma.val().reshape([1, self.dim]) + self.beta.val().reshape([1, self.dim])
    }
}

/// A single task head.
#[derive(Module, Debug)]
pub struct TaskHead<B: Backend> {
    pub(crate) hidden: Option<Linear<B>>,
    pub(crate) norm: Option<FeatureNorm<B>>,
    dropout: Dropout,
    pub(crate) output: Linear<B>,
    output_width: usize,
    classification: bool,
}

impl<B: Backend> TaskHead<B> {
    pub fn new(
        input_width: usize,
        kind: TaskKind,
        hidden: Option<usize>,
        dropout: f64,
        key: RngKey,
        device: &B::Device,
    ) -> Self {
        let (hidden_key, output_key) = key.split_two();
        let output_width = kind.output_width();
        let (hidden, norm, output) = match hidden {
            Some(width) => (
                Some(init_linear(input_width, width, true, hidden_key, device)),
                Some(FeatureNorm::new(width, device)),
                init_linear(width, output_width, true, output_key, device),
            ),
            None => (None, None, init_linear(input_width, output_width, true, output_key, device)),
        };

        Self {
            hidden,
            norm,
            dropout: DropoutConfig::new(dropout).init(),
            output,
            output_width,
            classification: kind.is_classification(),
        }
    }

    /// Log-probabilities `[G, classes]` or values `[G, 1]`.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut h = x;
        if let Some(hidden) = &self.hidden {
            h = hidden.forward(h);
            if let Some(norm) = &self.norm {
                h = norm.forward(h);
            }
            // dropout is a no-op unless the backend tracks gradients
            h = self.dropout.forward(relu(h));
        }

        let out = self.output.forward(h);
        if self.classification {
            log_softmax(out, 1)
        } else {
            out
        }
    }

    pub fn kind(&self) -> TaskKind {
        if self.classification {
            TaskKind::Classification {
                classes: self.output_width,
            }
        } else {
            TaskKind::Regression
        }
    }
}

/// Prediction of the selected head.
#[derive(Clone, Debug)]
pub struct HeadOutput<B: Backend> {
    pub values: Tensor<B, 2>,
    pub kind: TaskKind,
}

#[derive(Module, Debug)]
pub struct MultiTaskHead<B: Backend> {
    pub(crate) heads: Vec<TaskHead<B>>,
}

impl<B: Backend> MultiTaskHead<B> {
    pub fn new(config: &BrainGnnConfig, key: RngKey, device: &B::Device) -> Self {
        let heads = config
            .tasks
            .iter()
            .zip(key.split(config.tasks.len()))
            .map(|(&kind, head_key)| {
                TaskHead::new(
                    config.readout_width(),
                    kind,
                    config.head_hidden,
                    config.head_dropout,
                    head_key,
                    device,
                )
            })
            .collect();
        Self { heads }
    }

    /// Head for `task_id`, or [`GnnError::UnknownTask`].
    pub fn head(&self, task_id: usize) -> Result<&TaskHead<B>> {
        self.heads.get(task_id).ok_or(GnnError::UnknownTask {
            task_id,
            num_tasks: self.heads.len(),
        })
    }

    pub fn forward(&self, x: Tensor<B, 2>, task_id: usize) -> Result<HeadOutput<B>> {
        let head = self.head(task_id)?;
        Ok(HeadOutput {
            values: head.forward(x),
            kind: head.kind(),
        })
    }

    pub fn num_tasks(&self) -> usize {
        self.heads.len()
    }
}
