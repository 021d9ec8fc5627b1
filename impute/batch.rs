//! Batch-imputation job interface.
//!
//! Imputation runs are scheduled as independent array jobs: each task id owns
//! its own seed and writes one deterministically named artifact. The jobs
//! share no mutable state; the synchronization barrier (waiting for all
//! artifacts) is the scheduler's job, not this module's. The combiner then
//! demands exactly the expected artifact count and refuses to proceed with a
//! partial ensemble.

use super::aggregate::{DroppedColumn, average_completions};
use super::pmm::impute_once;
use super::{ImputeError, QualityReport};
use crate::config::ImputationConfig;
use crate::types::{FeatureMatrix, MatrixArtifact, PredictorGroups};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Deterministic artifact name for one task id.
pub fn artifact_name(task_id: u32) -> String {
    format!("imputed_job_{task_id:02}.json")
}

/// What one batch job writes: the completed matrix, its provenance, and the
/// run's quality report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobArtifact {
    pub task_id: u32,
    pub seed: u64,
    pub completed: MatrixArtifact,
    pub quality: QualityReport,
}

/// Runs one imputation job (seed = `base_seed + task_id`) and writes its
/// artifact into `out_dir`.
pub fn run_job(
    source: &FeatureMatrix,
    groups: &PredictorGroups,
    config: &ImputationConfig,
    base_seed: u64,
    task_id: u32,
    out_dir: &Path,
) -> Result<PathBuf, ImputeError> {
    let seed = base_seed.wrapping_add(task_id as u64);
    log::info!("imputation job {task_id} starting (seed {seed})");
    let (completed, quality) = impute_once(source, groups, config, seed)?;

    let artifact = JobArtifact {
        task_id,
        seed,
        completed: MatrixArtifact::from(&completed),
        quality,
    };
    let path = out_dir.join(artifact_name(task_id));
    let file = File::create(&path)?;
    serde_json::to_writer(BufWriter::new(file), &artifact)?;
    log::info!("imputation job {task_id} wrote {}", path.display());
    Ok(path)
}

/// The combined output: averaged matrix plus the modeling design matrix `X`
/// and outcome vector `y` over outcome-observed rows.
#[derive(Debug)]
pub struct CombinedData {
    pub matrix: FeatureMatrix,
    pub dropped: Vec<DroppedColumn>,
    pub quality: QualityReport,
    pub x: Array2<f64>,
    pub x_names: Vec<String>,
    pub y: Array1<f64>,
    pub row_ids: Vec<String>,
}

/// Reads back exactly `expected` artifacts (task ids `0..expected`), averages
/// the completions, and derives the design matrix and outcome vector.
pub fn combine_jobs(
    source: &FeatureMatrix,
    artifact_dir: &Path,
    expected: u32,
) -> Result<CombinedData, ImputeError> {
    let mut completions = Vec::with_capacity(expected as usize);
    let mut reports = Vec::with_capacity(expected as usize);
    let mut missing = Vec::new();

    for task_id in 0..expected {
        let path = artifact_dir.join(artifact_name(task_id));
        if !path.exists() {
            missing.push(artifact_name(task_id));
            continue;
        }
        let file = File::open(&path)?;
        let artifact: JobArtifact = serde_json::from_reader(BufReader::new(file))?;
        completions.push(FeatureMatrix::try_from(artifact.completed)?);
        reports.push(artifact.quality);
    }

    if !missing.is_empty() {
        return Err(ImputeError::MissingArtifacts {
            dir: artifact_dir.display().to_string(),
            expected,
            found: completions.len(),
            missing,
        });
    }

    let aggregated = average_completions(source, &completions)?;
    let matrix = aggregated.matrix;

    let eligible = matrix.eligible_rows()?;
    let (x, x_names) = matrix.design_for_rows(&eligible);
    let y = matrix.outcome_for_rows(&eligible)?;
    let row_ids = eligible
        .iter()
        .map(|&r| matrix.participant_ids()[r].clone())
        .collect();

    log::info!(
        "combined {} imputation artifacts: {} eligible rows, {} predictors",
        expected,
        y.len(),
        x_names.len()
    );

    Ok(CombinedData {
        matrix,
        dropped: aggregated.dropped,
        quality: QualityReport::merge(&reports),
        x,
        x_names,
        y,
        row_ids,
    })
}
