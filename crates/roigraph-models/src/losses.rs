//! Task loss and structural regularizers.
//!
//! All losses return a `[1]` tensor so they can be weighted and summed into
//! one objective and back-propagated together.
//!
//! | Loss | Input | Target |
//! |------|-------|--------|
//! | [`unit_norm_loss`] | per-node kernel norms | every kernel has norm 1 |
//! | [`pool_unit_loss`] | pooling direction norm | direction has norm 1 |
//! | [`topk_separation_loss`] | pooling gates | kept nodes near 1, dropped near 0 |
//! | [`consistency_loss`] | first-stage gates | same-class graphs share a selection pattern |
//! | [`task_loss`] | head output | NLL or MSE |

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use roigraph_core::{index_tensor, tensor_2d, to_vec_f32, GnnError, GraphLabel, Result};

use crate::config::TaskKind;

/// Added inside logarithms.
pub const LOG_EPSILON: f32 = 1e-10;

/// Mean over nodes of `(‖K_i‖ - 1)²`.
pub fn unit_norm_loss<B: Backend>(kernel_norms: Tensor<B, 1>) -> Tensor<B, 1> {
    let diff = kernel_norms - 1.0;
    (diff.clone() * diff).mean()
}

/// `(‖p‖ - 1)²` for a pooling direction norm.
pub fn pool_unit_loss<B: Backend>(direction_norm: Tensor<B, 1>) -> Tensor<B, 1> {
    let diff = direction_norm - 1.0;
    (diff.clone() * diff).sum()
}

/// Pushes the `kept[g]` highest gates of every graph towards 1 and the rest
/// towards 0:
///
/// ```text
/// L_g = -mean(log(s_kept + ε)) - mean(log(1 - s_dropped + ε))
/// ```
///
/// averaged over graphs. A graph that keeps every node has no dropped term.
pub fn topk_separation_loss<B: Backend>(
    scores: Tensor<B, 1>,
    graph_ptr: &[usize],
    kept: &[usize],
) -> Result<Tensor<B, 1>> {
    let [n] = scores.dims();
    let num_graphs = graph_ptr.len().saturating_sub(1);
    if graph_ptr.last().copied().unwrap_or(0) != n {
        return Err(GnnError::dim("score count", graph_ptr.last().copied().unwrap_or(0), n));
    }
    if kept.len() != num_graphs {
        return Err(GnnError::dim("kept counts", num_graphs, kept.len()));
    }
    if num_graphs == 0 {
        return Err(GnnError::EmptyBatch);
    }

    let device = scores.device();
    let host = to_vec_f32(scores.clone())?;
    let mut total: Option<Tensor<B, 1>> = None;

    for g in 0..num_graphs {
        let (start, end) = (graph_ptr[g], graph_ptr[g + 1]);
        let mut ranked: Vec<usize> = (start..end).collect();
        ranked.sort_by(|&a, &b| host[b].total_cmp(&host[a]).then(a.cmp(&b)));
        let k = kept[g].min(ranked.len());

        let mut term = Tensor::<B, 1>::zeros([1], &device);
        if k > 0 {
            let high = scores.clone().select(0, index_tensor(&ranked[..k], &device));
            term = term - (high + LOG_EPSILON).log().mean();
        }
        if k < ranked.len() {
            let low = scores.clone().select(0, index_tensor(&ranked[k..], &device));
            term = term - (low.neg() + (1.0 + LOG_EPSILON)).log().mean();
        }
        total = Some(match total {
            Some(acc) => acc + term,
            None => term,
        });
    }

    total
        .map(|t| t / num_graphs as f32)
        .ok_or(GnnError::EmptyBatch)
}

/// Within-class smoothness of the selection scores.
///
/// `scores` holds `n` scores per graph and `rois[i]` is the atlas ROI of
/// node `i`. Each graph's scores are first put in ascending ROI order, so
/// graphs are compared ROI against ROI whatever their node order. For each
/// class `c` with members `S_c` (`[n_c, n]`) and the Laplacian of the
/// complete graph over those members `L_c = n_c·I - J`:
///
/// ```text
/// L = Σ_c trace(S_cᵀ L_c S_c) / n_c²
/// ```
///
/// # Errors
///
/// - [`GnnError::DimensionMismatch`] if graphs have different node counts or
///   the label / ROI counts do not match
/// - [`GnnError::RoiSetMismatch`] if a graph covers other ROIs than graph 0
pub fn consistency_loss<B: Backend>(
    scores: Tensor<B, 1>,
    graph_ptr: &[usize],
    rois: &[usize],
    labels: &[usize],
) -> Result<Tensor<B, 1>> {
    let num_graphs = graph_ptr.len().saturating_sub(1);
    if labels.len() != num_graphs {
        return Err(GnnError::dim("label count", num_graphs, labels.len()));
    }
    if num_graphs == 0 {
        return Err(GnnError::EmptyBatch);
    }
    let n = graph_ptr[1] - graph_ptr[0];
    for w in graph_ptr.windows(2) {
        if w[1] - w[0] != n {
            return Err(GnnError::dim("nodes per graph", n, w[1] - w[0]));
        }
    }
    let [total_scores] = scores.dims();
    if total_scores != n * num_graphs {
        return Err(GnnError::dim("score count", n * num_graphs, total_scores));
    }
    if rois.len() != total_scores {
        return Err(GnnError::dim("roi count", total_scores, rois.len()));
    }

    // node order of every graph, sorted by ROI
    let mut order = Vec::with_capacity(total_scores);
    let mut reference: Vec<usize> = Vec::new();
    for g in 0..num_graphs {
        let mut nodes: Vec<usize> = (graph_ptr[g]..graph_ptr[g + 1]).collect();
        nodes.sort_by_key(|&i| rois[i]);
        let sorted_rois: Vec<usize> = nodes.iter().map(|&i| rois[i]).collect();
        if g == 0 {
            reference = sorted_rois;
        } else if sorted_rois != reference {
            return Err(GnnError::RoiSetMismatch { graph: g });
        }
        order.extend(nodes);
    }

    let device = scores.device();
    let per_graph = scores
        .select(0, index_tensor(&order, &device))
        .reshape([num_graphs, n]);
    let num_classes = labels.iter().max().map_or(0, |m| m + 1);
    let mut loss = Tensor::<B, 1>::zeros([1], &device);

    for class in 0..num_classes {
        let members: Vec<usize> = (0..num_graphs).filter(|&g| labels[g] == class).collect();
        let m = members.len();
        if m < 2 {
            continue;
        }

        let mut laplacian = vec![-1.0f32; m * m];
        for i in 0..m {
            laplacian[i * m + i] = (m - 1) as f32;
        }
        let laplacian = tensor_2d::<B>(&laplacian, m, m, &device);
        let s = per_graph.clone().select(0, index_tensor(&members, &device));
        let quad = (laplacian.matmul(s.clone()) * s).sum();
        loss = loss + quad / (m * m) as f32;
    }
    Ok(loss)
}

/// Negative log-likelihood for classification heads, mean squared error for
/// regression heads.
pub fn task_loss<B: Backend>(values: Tensor<B, 2>, kind: TaskKind, labels: &[GraphLabel]) -> Result<Tensor<B, 1>> {
    let [rows, cols] = values.dims();
    if labels.len() != rows {
        return Err(GnnError::dim("label count", rows, labels.len()));
    }
    let device = values.device();

    match kind {
        TaskKind::Classification { classes } => {
            let mut mask = vec![0.0f32; rows * cols];
            for (g, label) in labels.iter().enumerate() {
                let class = label.class().ok_or_else(|| {
                    GnnError::LabelMismatch(format!("graph {g}: classification head needs a class label"))
                })?;
                if class >= classes {
                    return Err(GnnError::LabelMismatch(format!(
                        "graph {g}: class {class} out of range for {classes} classes"
                    )));
                }
                mask[g * cols + class] = 1.0;
            }
            let mask = tensor_2d::<B>(&mask, rows, cols, &device);
            Ok((values * mask).sum().neg() / rows as f32)
        }
        TaskKind::Regression => {
            let targets = labels
                .iter()
                .enumerate()
                .map(|(g, label)| {
                    label.value().ok_or_else(|| {
                        GnnError::LabelMismatch(format!(
                            "graph {g}: regression head needs a continuous label"
                        ))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            let diff = values - tensor_2d::<B>(&targets, rows, 1, &device);
            Ok((diff.clone() * diff).mean())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::tensor_1d;
    use roigraph_core::{cpu_device, CpuBackend};

    fn scalar(t: Tensor<CpuBackend, 1>) -> f32 {
        to_vec_f32(t).unwrap()[0]
    }

    #[test]
    fn test_unit_norm_loss() {
        let device = cpu_device();
        let norms = tensor_1d::<CpuBackend>(&[1.0, 3.0, 0.0, 1.0], &device);
        // (0 + 4 + 1 + 0) / 4
        assert!((scalar(unit_norm_loss(norms)) - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_pool_unit_loss() {
        let device = cpu_device();
        let norm = tensor_1d::<CpuBackend>(&[0.5], &device);
        assert!((scalar(pool_unit_loss(norm)) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_topk_separation_prefers_clean_split() {
        let device = cpu_device();
        let clean = tensor_1d::<CpuBackend>(&[0.99, 0.01, 0.98, 0.02], &device);
        let blurry = tensor_1d::<CpuBackend>(&[0.6, 0.4, 0.55, 0.45], &device);
        let a = scalar(topk_separation_loss(clean, &[0, 4], &[2]).unwrap());
        let b = scalar(topk_separation_loss(blurry, &[0, 4], &[2]).unwrap());
        assert!(a < b);
        assert!(a >= 0.0);
    }

    #[test]
    fn test_topk_separation_value() {
        let device = cpu_device();
        let scores = tensor_1d::<CpuBackend>(&[0.5, 0.8, 0.25, 0.5], &device);
        // graph 0 keeps 0.8, drops 0.5; graph 1 keeps both
        let loss = scalar(topk_separation_loss(scores, &[0, 2, 4], &[1, 2]).unwrap());
        let g0 = -(0.8f32.ln()) - 0.5f32.ln();
        let g1 = -(0.25f32.ln() + 0.5f32.ln()) / 2.0;
        assert!((loss - (g0 + g1) / 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_consistency_zero_for_identical_scores() {
        let device = cpu_device();
        let scores = tensor_1d::<CpuBackend>(&[0.2, 0.7, 0.2, 0.7, 0.9, 0.1], &device);
        let loss = consistency_loss(scores, &[0, 2, 4, 6], &[0, 1, 0, 1, 0, 1], &[0, 0, 1]).unwrap();
        assert!(scalar(loss).abs() < 1e-6);
    }

    #[test]
    fn test_consistency_pair_value() {
        let device = cpu_device();
        // two graphs of one class: trace(SᵀLS) = sum over nodes of (a - b)²
        let scores = tensor_1d::<CpuBackend>(&[1.0, 0.0, 0.0, 0.5], &device);
        let loss = scalar(consistency_loss(scores, &[0, 2, 4], &[0, 1, 0, 1], &[1, 1]).unwrap());
        assert!((loss - (1.0 + 0.25) / 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_consistency_rejects_ragged_batch() {
        let device = cpu_device();
        let scores = tensor_1d::<CpuBackend>(&[0.1, 0.2, 0.3], &device);
        assert!(consistency_loss(scores, &[0, 2, 3], &[0, 1, 0], &[0, 0]).is_err());
    }

    #[test]
    fn test_consistency_compares_by_roi() {
        let device = cpu_device();
        // the second graph lists the same ROI scores in another node order
        let scores = tensor_1d::<CpuBackend>(&[0.9, 0.2, 0.6, 0.2, 0.6, 0.9], &device);
        let rois = [0, 1, 2, 1, 2, 0];
        let loss = consistency_loss(scores, &[0, 3, 6], &rois, &[1, 1]).unwrap();
        assert!(scalar(loss).abs() < 1e-6);
    }

    #[test]
    fn test_consistency_rejects_different_roi_sets() {
        let device = cpu_device();
        let scores = tensor_1d::<CpuBackend>(&[0.1, 0.2, 0.3, 0.4], &device);
        let err = consistency_loss(scores, &[0, 2, 4], &[0, 1, 0, 3], &[0, 0]).unwrap_err();
        assert!(matches!(err, GnnError::RoiSetMismatch { graph: 1 }));
    }

    #[test]
    fn test_task_loss_nll() {
        let device = cpu_device();
        let log_probs = tensor_2d::<CpuBackend>(
            &[0.25f32.ln(), 0.75f32.ln(), 0.5f32.ln(), 0.5f32.ln()],
            2,
            2,
            &device,
        );
        let labels = [GraphLabel::Class(1), GraphLabel::Class(0)];
        let loss = scalar(task_loss(log_probs, TaskKind::Classification { classes: 2 }, &labels).unwrap());
        assert!((loss - (-(0.75f32.ln()) - 0.5f32.ln()) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_task_loss_rejects_bad_labels() {
        let device = cpu_device();
        let values = tensor_2d::<CpuBackend>(&[0.0, 0.0], 1, 2, &device);
        let kind = TaskKind::Classification { classes: 2 };
        assert!(task_loss(values.clone(), kind, &[GraphLabel::Class(2)]).is_err());
        assert!(task_loss(values, kind, &[GraphLabel::Value(0.3)]).is_err());

        let value = tensor_2d::<CpuBackend>(&[0.5], 1, 1, &device);
        let err = task_loss(value, TaskKind::Regression, &[GraphLabel::Class(1)]).unwrap_err();
        assert!(matches!(err, GnnError::LabelMismatch(_)));
    }

    #[test]
    fn test_task_loss_mse() {
        let device = cpu_device();
        let values = tensor_2d::<CpuBackend>(&[1.0, 3.0], 2, 1, &device);
        let labels = [GraphLabel::Value(0.0), GraphLabel::Value(3.0)];
        let loss = scalar(task_loss(values, TaskKind::Regression, &labels).unwrap());
        assert!((loss - 0.5).abs() < 1e-6);
    }
}
