//! The full classifier: hierarchical encoder plus multi-task head.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use roigraph_core::{to_vec_f32, GnnError, GraphBatch, Result, RngKey};
use serde::Serialize;

use crate::config::{BrainGnnConfig, LossWeights, TaskKind};
use crate::encoder::{HierarchicalEncoder, StageAux};
use crate::head::MultiTaskHead;
use crate::losses::{consistency_loss, pool_unit_loss, task_loss, topk_separation_loss, unit_norm_loss};

#[derive(Module, Debug)]
pub struct BrainGnn<B: Backend> {
    pub(crate) encoder: HierarchicalEncoder<B>,
    pub(crate) head: MultiTaskHead<B>,
    in_dim: usize,
    roi_count: usize,
}

impl BrainGnnConfig {
    /// Build a model with parameters drawn from `key`.
    ///
    /// # Errors
    ///
    /// [`GnnError::InvalidConfig`] if the configuration does not validate.
    pub fn init<B: Backend>(&self, key: RngKey, device: &B::Device) -> Result<BrainGnn<B>> {
        self.validate()?;
        let (encoder_key, head_key) = key.split_two();
        log::debug!(
            "building model: R={}, in_dim={}, stages={:?}, k={}, tasks={}",
            self.roi_count,
            self.in_dim,
            self.hidden_dims,
            self.kernel_rank,
            self.tasks.len()
        );
        Ok(BrainGnn {
            encoder: HierarchicalEncoder::new(self, encoder_key, device)?,
            head: MultiTaskHead::new(self, head_key, device),
            in_dim: self.in_dim,
            roi_count: self.roi_count,
        })
    }
}

/// Everything one forward pass produces.
#[derive(Clone, Debug)]
pub struct ModelOutput<B: Backend> {
    /// `[G, classes]` log-probabilities or `[G, 1]` regression values.
    pub values: Tensor<B, 2>,
    /// Kind of the head that produced `values`.
    pub kind: TaskKind,
    pub task_id: usize,
    /// `[G, 2 * readout_dim]` encoder output.
    pub encoding: Tensor<B, 2>,
    /// Per-stage scores, kernel norms and retained ROIs.
    pub stages: Vec<StageAux<B>>,
}

impl<B: Backend> ModelOutput<B> {
    /// Argmax class per graph (lowest index on ties).
    ///
    /// # Errors
    ///
    /// [`GnnError::LabelMismatch`] for a regression output.
    pub fn predicted_classes(&self) -> Result<Vec<usize>> {
        let TaskKind::Classification { classes } = self.kind else {
            return Err(GnnError::LabelMismatch(format!(
                "task {} is a regression task and has no classes",
                self.task_id
            )));
        };
        let values = to_vec_f32(self.values.clone())?;
        Ok(values
            .chunks(classes)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (c, &v)| if v > best.1 { (c, v) } else { best })
                    .0
            })
            .collect())
    }

    /// Original ROIs of graph `graph` that survived stage `stage`.
    pub fn retained_rois(&self, stage: usize, graph: usize) -> Option<&[usize]> {
        let aux = self.stages.get(stage)?;
        (graph + 1 < aux.retained_graph_ptr.len()).then(|| aux.retained_rois_of(graph))
    }
}

/// Host copies of the weighted objective terms, for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct LossBreakdown {
    pub task: f32,
    pub unit: f32,
    pub pool_unit: f32,
    pub topk: f32,
    pub consistency: f32,
    pub total: f32,
}

/// Scalar training objective and its parts.
#[derive(Clone, Debug)]
pub struct TrainingLoss<B: Backend> {
    /// `[1]` weighted sum, ready for `backward()`.
    pub total: Tensor<B, 1>,
    pub breakdown: LossBreakdown,
}

impl<B: Backend> BrainGnn<B> {
    /// Run the encoder and the batch's task head.
    ///
    /// # Errors
    ///
    /// - [`GnnError::DimensionMismatch`] if the batch feature width, identity
    ///   width or any graph's node count differs from the configured
    ///   `in_dim` / `roi_count`
    /// - [`GnnError::UnknownTask`] if the batch task id has no head
    pub fn forward(&self, batch: &GraphBatch<B>) -> Result<ModelOutput<B>> {
        if batch.in_dim() != self.in_dim {
            return Err(GnnError::dim("in_dim", self.in_dim, batch.in_dim()));
        }
        if batch.identity_dim() != self.roi_count {
            return Err(GnnError::dim(
                "node_identity width",
                self.roi_count,
                batch.identity_dim(),
            ));
        }
        if let Some(&n) = batch
            .topology
            .node_counts()
            .iter()
            .find(|&&n| n != self.roi_count)
        {
            return Err(GnnError::dim("nodes per graph", self.roi_count, n));
        }
        self.head.head(batch.task_id)?;

        let encoded = self.encoder.forward(
            batch.node_features.clone(),
            batch.node_identity.clone(),
            &batch.topology,
        )?;
        let head = self.head.forward(encoded.readout.clone(), batch.task_id)?;

        Ok(ModelOutput {
            values: head.values,
            kind: head.kind,
            task_id: batch.task_id,
            encoding: encoded.readout,
            stages: encoded.stages,
        })
    }

    /// Weighted training objective for `output` against the batch labels.
    ///
    /// The consistency term needs class labels and equal node counts per
    /// graph; it is skipped for regression tasks and when its weight is zero.
    pub fn objective(
        &self,
        output: &ModelOutput<B>,
        batch: &GraphBatch<B>,
        weights: &LossWeights,
    ) -> Result<TrainingLoss<B>> {
        let device = output.values.device();
        let zero = || Tensor::<B, 1>::zeros([1], &device);

        let task = task_loss(output.values.clone(), output.kind, &batch.labels)?;

        let (mut unit, mut pool_unit, mut topk) = (zero(), zero(), zero());
        for stage in &output.stages {
            unit = unit + unit_norm_loss(stage.kernel_norms.clone());
            pool_unit = pool_unit + pool_unit_loss(stage.direction_norm.clone());
            topk = topk
                + topk_separation_loss(
                    stage.scores.clone(),
                    &stage.input_graph_ptr,
                    &stage.kept_per_graph(),
                )?;
        }

        let consistency = match output.stages.first() {
            Some(first) if weights.consistency > 0.0 && output.kind.is_classification() => {
                consistency_loss(
                    first.scores.clone(),
                    &first.input_graph_ptr,
                    &first.input_rois,
                    &batch.class_labels()?,
                )?
            }
            _ => zero(),
        };

        let total = task.clone() * weights.task
            + unit.clone() * weights.unit
            + pool_unit.clone() * weights.pool_unit
            + topk.clone() * weights.topk
            + consistency.clone() * weights.consistency;

        let read = |t: Tensor<B, 1>| -> Result<f32> { Ok(to_vec_f32(t)?.first().copied().unwrap_or(0.0)) };
        let breakdown = LossBreakdown {
            task: read(task)?,
            unit: read(unit)?,
            pool_unit: read(pool_unit)?,
            topk: read(topk)?,
            consistency: read(consistency)?,
            total: read(total.clone())?,
        };

        Ok(TrainingLoss { total, breakdown })
    }

    pub const fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub const fn roi_count(&self) -> usize {
        self.roi_count
    }

    pub fn num_tasks(&self) -> usize {
        self.head.num_tasks()
    }

    pub fn num_stages(&self) -> usize {
        self.encoder.num_stages()
    }
}
