//! Error taxonomy for the ROI graph classifier.
//!
//! Every variant is a caller or integration bug: shapes that do not match the
//! configured model, invalid configuration values, or unreadable checkpoints.
//! Degenerate but valid input (zero edges, single-node graphs) never produces
//! an error.

use thiserror::Error;

/// Errors raised by graph construction, the model core and persistence.
#[derive(Debug, Error)]
pub enum GnnError {
    /// A tensor or graph dimension does not match the configured contract.
    #[error("{field} mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Task id outside the configured head range.
    #[error("unknown task_id {task_id}: model has {num_tasks} task heads")]
    UnknownTask { task_id: usize, num_tasks: usize },

    /// Graphs with different task ids were put in the same batch.
    #[error("mixed-task batch: graph {graph} has task_id {got}, batch task_id is {expected}")]
    MixedTaskBatch {
        expected: usize,
        got: usize,
        graph: usize,
    },

    /// A batch needs at least one graph.
    #[error("batch contains no graphs")]
    EmptyBatch,

    /// Edge endpoint outside the node range.
    #[error("edge ({src}, {dst}) out of range for graph with {num_nodes} nodes")]
    InvalidEdge {
        src: usize,
        dst: usize,
        num_nodes: usize,
    },

    /// Connectivity strength must be finite and non-negative.
    #[error("edge {index} has invalid weight {weight}: expected a finite non-negative value")]
    InvalidEdgeWeight { index: usize, weight: f32 },

    /// Graphs compared ROI by ROI do not cover the same ROIs.
    #[error("graph {graph} covers a different ROI set than graph 0")]
    RoiSetMismatch { graph: usize },

    /// Labels or targets do not line up with the model output.
    #[error("label mismatch: {0}")]
    LabelMismatch(String),

    /// Checkpoint is missing a named parameter.
    #[error("missing parameter '{0}' in checkpoint")]
    MissingParameter(String),

    /// Checkpoint parameter has the wrong shape.
    #[error("parameter '{name}' has shape {got:?}, expected {expected:?}")]
    ParameterShape {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Checkpoint was written by a model with a different configuration.
    #[error("checkpoint config does not match model config: {0}")]
    ConfigMismatch(String),

    /// Underlying tensor data could not be read back from the backend.
    #[error("tensor data error: {0}")]
    TensorData(String),

    #[error("safetensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GnnError>;

impl GnnError {
    /// Shorthand for [`GnnError::DimensionMismatch`].
    pub fn dim(field: &'static str, expected: usize, got: usize) -> Self {
        Self::DimensionMismatch {
            field,
            expected,
            got,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_message_names_field() {
        let err = GnnError::dim("node_identity width", 116, 90);
        let msg = err.to_string();
        assert!(msg.contains("node_identity width"));
        assert!(msg.contains("116"));
        assert!(msg.contains("90"));
    }

    #[test]
    fn test_unknown_task_message() {
        let err = GnnError::UnknownTask {
            task_id: 7,
            num_tasks: 4,
        };
        assert_eq!(
            err.to_string(),
            "unknown task_id 7: model has 4 task heads"
        );
    }
}
