//! # Result Persistence
//!
//! All computation upstream returns in-memory structures; this module is the
//! only place result artifacts touch disk. Tables go out as CSV, structured
//! summaries and batch artifacts as JSON. Nothing here is called from inside
//! a compute loop.

use crate::aggregate::{PerformanceSummary, PredictorSummary};
use crate::evaluate::HarnessReport;
use crate::impute::{DroppedColumn, QualityReport};
use crate::search::RankedCandidate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error writing report: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("CSV writing error: {0}")]
    Csv(#[from] csv::Error),
}

/// The top-level JSON summary of a selection run.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultSummary {
    pub performance: PerformanceSummary,
    pub predictors: Vec<PredictorSummary>,
    pub dropped_columns: Vec<DroppedColumn>,
    pub imputation_quality: QualityReport,
}

/// Writes any serializable artifact as pretty-printed JSON.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ReportError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// One row per predictor: selection frequency and selected-only coefficient
/// statistics.
pub fn write_predictor_table(
    path: &Path,
    summaries: &[PredictorSummary],
) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "predictor",
        "selection_frequency",
        "n_selected",
        "mean_coefficient",
        "sd_coefficient",
        "se_coefficient",
        "ci_low",
        "ci_high",
    ])?;
    for s in summaries {
        writer.write_record([
            s.name.clone(),
            format_value(s.selection_frequency),
            s.n_selected.to_string(),
            format_value(s.mean_coefficient),
            format_value(s.sd_coefficient),
            format_value(s.se_coefficient),
            format_value(s.ci_low),
            format_value(s.ci_high),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// The full ranked candidate table, one row per hyperparameter combination.
pub fn write_candidate_table(path: &Path, ranked: &[RankedCandidate]) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "rank",
        "candidate_id",
        "combined_score",
        "mean_r2",
        "sd_r2",
        "worst_r2",
        "stability",
        "mean_rmse",
        "sd_rmse",
        "n_splits_ok",
        "n_splits_skipped",
        "n_trees",
        "max_depth",
        "learning_rate",
        "subsample",
        "colsample",
        "min_child_weight",
        "reg_alpha",
        "reg_lambda",
    ])?;
    for c in ranked {
        let r = &c.record;
        writer.write_record([
            c.rank.to_string(),
            r.id.to_string(),
            format_value(c.combined),
            format_value(r.mean_r2),
            format_value(r.sd_r2),
            format_value(r.worst_r2),
            format_value(r.stability),
            format_value(r.mean_rmse),
            format_value(r.sd_rmse),
            r.n_splits_ok.to_string(),
            r.n_splits_skipped.to_string(),
            r.params.n_trees.to_string(),
            r.params.max_depth.to_string(),
            format_value(r.params.learning_rate),
            format_value(r.params.subsample),
            format_value(r.params.colsample),
            format_value(r.params.min_child_weight),
            format_value(r.params.reg_alpha),
            format_value(r.params.reg_lambda),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Raw held-out predictions, one row per (split, participant).
pub fn write_prediction_table(path: &Path, report: &HarnessReport) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["split", "participant_id", "actual", "predicted"])?;
    for record in &report.records {
        for p in &record.predictions {
            writer.write_record([
                record.split_index.to_string(),
                p.participant_id.clone(),
                format_value(p.actual),
                format_value(p.predicted),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Final-model feature importances, descending.
pub fn write_importance_table(
    path: &Path,
    names: &[String],
    importances: &[f64],
) -> Result<(), ReportError> {
    let mut rows: Vec<(&String, f64)> = names.iter().zip(importances.iter().copied()).collect();
    rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["feature", "importance"])?;
    for (name, importance) in rows {
        writer.write_record([name.clone(), format_value(importance)])?;
    }
    writer.flush()?;
    Ok(())
}

/// NaN renders as an empty cell so downstream spreadsheet tools read the
/// column as numeric.
fn format_value(v: f64) -> String {
    if v.is_finite() { format!("{v:.6}") } else { String::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::summarize_coefficients;
    use crate::evaluate::{PredictionRecord, SplitMetrics, SplitRecord};
    use tempfile::tempdir;

    fn small_report() -> HarnessReport {
        HarnessReport {
            feature_names: vec!["age".into(), "erp_p3b".into()],
            records: vec![SplitRecord {
                split_index: 1,
                seed: 7,
                metrics: Some(SplitMetrics {
                    rmse: 0.9,
                    mae: 0.7,
                    r_squared: 0.4,
                    tuning_criterion: 0.8,
                }),
                coefficients: vec![0.3, 0.0],
                n_predictors_retained: 1,
                removed_columns: Vec::new(),
                predictions: vec![PredictionRecord {
                    participant_id: "sub01".into(),
                    actual: 1.0,
                    predicted: 1.2,
                }],
                failure: None,
            }],
            n_succeeded: 1,
            n_skipped: 0,
        }
    }

    #[test]
    fn predictor_table_has_header_and_one_row_per_feature() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("predictors.csv");
        write_predictor_table(&path, &summarize_coefficients(&small_report())).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("predictor,selection_frequency"));
        assert!(lines[1].starts_with("age,1.000000"));
    }

    #[test]
    fn prediction_table_flattens_splits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        write_prediction_table(&path, &small_report()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("1,sub01,1.000000,1.200000"));
    }

    #[test]
    fn json_round_trip_preserves_summary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/summary.json");
        let report = small_report();
        let summary = ResultSummary {
            performance: crate::aggregate::summarize_performance(&report, 50, 11),
            predictors: summarize_coefficients(&report),
            dropped_columns: Vec::new(),
            imputation_quality: QualityReport::default(),
        };
        save_json(&path, &summary).unwrap();
        let loaded: ResultSummary = load_json(&path).unwrap();
        assert_eq!(loaded.predictors.len(), 2);
        assert_eq!(loaded.performance.n_succeeded, 1);
    }

    #[test]
    fn importance_table_sorts_descending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("importance.csv");
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        write_importance_table(&path, &names, &[0.1, 0.7, 0.2]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].starts_with("b,"));
        assert!(lines[2].starts_with("c,"));
        assert!(lines[3].starts_with("a,"));
    }
}
