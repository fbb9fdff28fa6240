//! # roigraph-examples utilities
//!
//! Synthetic subject cohorts for the demo binaries. Each class plants a
//! signal on its own block of ROIs (raised activation and stronger mutual
//! connectivity), so a model that selects the right ROIs can separate the
//! classes.

use rand::seq::SliceRandom;
use rand::Rng;
use roigraph_core::{GraphLabel, Result, RngKey, RoiGraph};

/// Shape of a synthetic cohort.
#[derive(Debug, Clone)]
pub struct CohortSpec {
    pub num_rois: usize,
    pub num_classes: usize,
    pub subjects_per_class: usize,
    /// ROIs carrying the class signal, per class.
    pub signal_rois: usize,
    /// Activation offset on signal ROIs.
    pub signal_strength: f32,
    /// Connectivity threshold for edges.
    pub threshold: f32,
    pub task_id: usize,
}

impl Default for CohortSpec {
    fn default() -> Self {
        Self {
            num_rois: 32,
            num_classes: 2,
            subjects_per_class: 16,
            signal_rois: 4,
            signal_strength: 1.5,
            threshold: 0.3,
            task_id: 0,
        }
    }
}

impl CohortSpec {
    pub const fn with_rois(mut self, num_rois: usize) -> Self {
        self.num_rois = num_rois;
        self
    }

    pub const fn with_subjects_per_class(mut self, subjects: usize) -> Self {
        self.subjects_per_class = subjects;
        self
    }

    pub const fn with_task(mut self, task_id: usize, num_classes: usize) -> Self {
        self.task_id = task_id;
        self.num_classes = num_classes;
        self
    }

    /// ROIs that carry the signal of `class` (wrapping around the atlas).
    pub fn signal_block(&self, class: usize) -> Vec<usize> {
        (0..self.signal_rois)
            .map(|i| (class * self.signal_rois + i) % self.num_rois)
            .collect()
    }
}

/// One subject of class `class`.
pub fn synthetic_subject(cohort: &CohortSpec, class: usize, key: RngKey) -> Result<RoiGraph> {
    let n = cohort.num_rois;
    let mut rng = key.rng();
    let block = cohort.signal_block(class);

    let mut features: Vec<f32> = (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect();
    for &roi in &block {
        features[roi] += cohort.signal_strength;
    }

    let mut connectivity = vec![0.0f32; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let mut c: f32 = rng.gen_range(-0.6..0.6);
            if block.contains(&i) && block.contains(&j) {
                c = 0.9;
            }
            connectivity[i * n + j] = c;
            connectivity[j * n + i] = c;
        }
    }

    RoiGraph::from_dense_connectivity(
        1,
        features,
        &connectivity,
        cohort.threshold,
        true,
        GraphLabel::Class(class),
        cohort.task_id,
    )
}

/// Balanced cohort, class-major order.
pub fn synthetic_cohort(cohort: &CohortSpec, key: RngKey) -> Result<Vec<RoiGraph>> {
    let total = cohort.num_classes * cohort.subjects_per_class;
    let keys = key.split(total);
    let graphs = keys
        .into_iter()
        .enumerate()
        .map(|(i, k)| synthetic_subject(cohort, i / cohort.subjects_per_class, k))
        .collect::<Result<Vec<_>>>()?;
    log::info!(
        "generated {} subjects ({} classes, {} ROIs)",
        graphs.len(),
        cohort.num_classes,
        cohort.num_rois
    );
    Ok(graphs)
}

/// Shuffle and cut into batches of at most `batch_size` graphs.
pub fn shuffled_batches(graphs: &[RoiGraph], batch_size: usize, key: RngKey) -> Vec<Vec<RoiGraph>> {
    let mut order: Vec<usize> = (0..graphs.len()).collect();
    order.shuffle(&mut key.rng());
    order
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.iter().map(|&i| graphs[i].clone()).collect())
        .collect()
}

/// Fraction of matching entries.
pub fn accuracy(predicted: &[usize], labels: &[usize]) -> f32 {
    if predicted.is_empty() {
        return 0.0;
    }
    let correct = predicted.iter().zip(labels).filter(|(p, l)| p == l).count();
    correct as f32 / predicted.len() as f32
}

/// `env_logger` with `info` as the default level.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
