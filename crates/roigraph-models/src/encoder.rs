//! Hierarchical encoder: repeated (convolution -> pooling) with a readout
//! after every pooling step.
//!
//! ```text
//! x0, id0, topo0 ──conv──pool──► x1, id1, topo1 ──conv──pool──► x2 ...
//!                          │                            │
//!                     readout(x1)        +         readout(x2)      + ...  = encoding
//! ```
//!
//! Later stages condition on the surviving identity rows, so they still see
//! original-ROI identity. Stages whose width differs from the readout width
//! pass through a bias-free projection before readout only.

use burn::module::Module;
use burn::nn::Linear;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use roigraph_core::{GnnError, GraphTopology, Result, RngKey};

use crate::config::BrainGnnConfig;
use crate::conv::IdentityConv;
use crate::init::init_linear;
use crate::pool::TopKPool;
use crate::readout::max_mean_readout;

/// Intermediate values of one stage, kept for the structural losses and for
/// interpretation.
#[derive(Clone, Debug)]
pub struct StageAux<B: Backend> {
    /// `[N]` kernel norms of the stage input nodes.
    pub kernel_norms: Tensor<B, 1>,
    /// `[N]` pooling gates `sigmoid(raw_scores)`.
    pub scores: Tensor<B, 1>,
    /// `[N]` normalized projections.
    pub raw_scores: Tensor<B, 1>,
    /// `[1]` norm of the pooling direction.
    pub direction_norm: Tensor<B, 1>,
    /// Node offsets of the stage input.
    pub input_graph_ptr: Vec<usize>,
    /// Original ROI of every stage input node.
    pub input_rois: Vec<usize>,
    /// Node offsets after pooling.
    pub retained_graph_ptr: Vec<usize>,
    /// Original ROI of every surviving node.
    pub retained_rois: Vec<usize>,
}

impl<B: Backend> StageAux<B> {
    /// Surviving node count of every graph.
    pub fn kept_per_graph(&self) -> Vec<usize> {
        self.retained_graph_ptr.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Original ROIs kept in graph `g`.
    pub fn retained_rois_of(&self, g: usize) -> &[usize] {
        &self.retained_rois[self.retained_graph_ptr[g]..self.retained_graph_ptr[g + 1]]
    }
}

#[derive(Clone, Debug)]
pub struct EncoderOutput<B: Backend> {
    /// `[G, 2 * readout_dim]` sum of the stage readouts.
    pub readout: Tensor<B, 2>,
    pub stages: Vec<StageAux<B>>,
}

#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    pub(crate) conv: IdentityConv<B>,
    pub(crate) pool: TopKPool<B>,
    pub(crate) project: Option<Linear<B>>,
}

#[derive(Module, Debug)]
pub struct HierarchicalEncoder<B: Backend> {
    pub(crate) stages: Vec<EncoderStage<B>>,
    readout_dim: usize,
}

impl<B: Backend> HierarchicalEncoder<B> {
    /// Build the stages described by `config`. The config must be valid.
    pub fn new(config: &BrainGnnConfig, key: RngKey, device: &B::Device) -> Result<Self> {
        let keys = key.split(config.num_stages());
        let mut stages = Vec::with_capacity(config.num_stages());
        let mut in_dim = config.in_dim;

        for (&out_dim, stage_key) in config.hidden_dims.iter().zip(keys) {
            let [conv_key, pool_key, project_key] = [0, 1, 2].map(|tag| stage_key.fold_in(tag));
            let project = (out_dim != config.readout_dim)
                .then(|| init_linear(out_dim, config.readout_dim, false, project_key, device));
            stages.push(EncoderStage {
                conv: IdentityConv::new(
                    in_dim,
                    out_dim,
                    config.roi_count,
                    config.kernel_rank,
                    conv_key,
                    device,
                ),
                pool: TopKPool::new(out_dim, config.keep_ratio, pool_key, device)?,
                project,
            });
            in_dim = out_dim;
        }

        Ok(Self {
            stages,
            readout_dim: config.readout_dim,
        })
    }

    pub fn forward(
        &self,
        features: Tensor<B, 2>,
        identity: Tensor<B, 2>,
        topology: &GraphTopology,
    ) -> Result<EncoderOutput<B>> {
        let mut x = features;
        let mut identity = identity;
        let mut topology = topology.clone();
        let mut readout: Option<Tensor<B, 2>> = None;
        let mut aux = Vec::with_capacity(self.stages.len());

        for (i, stage) in self.stages.iter().enumerate() {
            let conv = stage.conv.forward(x, identity.clone(), &topology)?;
            let pooled = stage.pool.forward(conv.embeddings, identity, &topology)?;

            let stage_nodes = match &stage.project {
                Some(project) => project.forward(pooled.embeddings.clone()),
                None => pooled.embeddings.clone(),
            };
            let stage_readout = max_mean_readout(stage_nodes, &pooled.topology)?;
            readout = Some(match readout {
                Some(acc) => acc + stage_readout,
                None => stage_readout,
            });

            log::debug!(
                "stage {}: {} -> {} nodes, {} -> {} edges",
                i,
                topology.num_nodes(),
                pooled.topology.num_nodes(),
                topology.num_edges(),
                pooled.topology.num_edges()
            );

            aux.push(StageAux {
                kernel_norms: conv.kernel_norms,
                scores: pooled.scores,
                raw_scores: pooled.raw_scores,
                direction_norm: pooled.direction_norm,
                input_graph_ptr: topology.graph_ptr.clone(),
                input_rois: topology.roi_index.clone(),
                retained_graph_ptr: pooled.topology.graph_ptr.clone(),
                retained_rois: pooled.topology.roi_index.clone(),
            });

            x = pooled.embeddings;
            identity = pooled.identity;
            topology = pooled.topology;
        }

        let readout = readout.ok_or_else(|| GnnError::InvalidConfig("encoder has no stages".into()))?;
        Ok(EncoderOutput {
            readout,
            stages: aux,
        })
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Width of the encoder output.
    pub const fn output_width(&self) -> usize {
        2 * self.readout_dim
    }
}
