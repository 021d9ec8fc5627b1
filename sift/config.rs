//! Pipeline configuration: every seed, threshold, and grid lives here, loaded
//! from a TOML file with serde defaults so a minimal file stays minimal.
//! Stochastic stages never touch ambient RNG state; they derive their seeds
//! from [`PipelineConfig::base_seed`] plus a stage offset and unit index.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Stage offsets for seed derivation. Each stochastic stage draws from its own
/// seed lane so adding splits never perturbs imputation draws and vice versa.
#[derive(Debug, Clone, Copy)]
pub enum SeedStage {
    ImputationRun,
    Split,
    Fold,
    Candidate,
    Bootstrap,
}

impl SeedStage {
    fn offset(self) -> u64 {
        match self {
            SeedStage::ImputationRun => 0,
            SeedStage::Split => 10_000,
            SeedStage::Fold => 20_000,
            SeedStage::Candidate => 30_000,
            SeedStage::Bootstrap => 40_000,
        }
    }
}

/// Deterministic per-unit seed: `base + stage_offset + index`.
pub fn derive_seed(base: u64, stage: SeedStage, index: u64) -> u64 {
    base.wrapping_add(stage.offset()).wrapping_add(index)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    /// Number of independent imputation runs (`m`).
    pub runs: usize,
    /// Chained-equation sweeps per run. Five is sufficient below ~25% missingness.
    pub iterations: usize,
    /// Donor pool size for predictive mean matching.
    pub donors: usize,
    /// quickpred-style minimum |Pearson r| for automatic predictor inclusion.
    pub min_correlation: f64,
    /// quickpred-style minimum proportion of jointly observed cases.
    pub min_usable_cases: f64,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            runs: 20,
            iterations: 5,
            donors: 5,
            min_correlation: 0.1,
            min_usable_cases: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Repeated train/test splits (R).
    pub splits: usize,
    pub train_proportion: f64,
    /// Inner cross-validation folds (k).
    pub cv_folds: usize,
    /// Pairwise-correlation cutoff for predictor pruning in each split.
    pub correlation_cutoff: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            splits: 50,
            train_proportion: 0.7,
            cv_folds: 10,
            correlation_cutoff: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Outer repeated splits per hyperparameter candidate.
    pub outer_splits: usize,
    /// Inner folds for the per-candidate criterion.
    pub inner_folds: usize,
    pub train_proportion: f64,
    /// Top-K window for the robust-choice intersection rule.
    pub top_k: usize,
    /// Composite weights for {performance, stability, robustness}.
    pub weights: (f64, f64, f64),
    /// Bootstrap resamples for metric confidence intervals.
    pub bootstrap_samples: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            outer_splits: 10,
            inner_folds: 5,
            train_proportion: 0.7,
            top_k: 5,
            weights: (0.5, 0.3, 0.2),
            bootstrap_samples: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Name of the participant-key column shared by every input table.
    pub key_column: String,
    /// Name of the outcome column.
    pub outcome: String,
    /// Columns force-included as imputation predictors regardless of thresholds.
    pub auxiliaries: Vec<String>,
    /// Declarative predictor groups: members mutually predict one another
    /// during imputation, overriding the automatic filter.
    pub groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub base_seed: u64,
    pub assembly: AssemblyConfig,
    pub imputation: ImputationConfig,
    pub evaluation: EvaluationConfig,
    pub search: SearchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_seed: 20240117,
            assembly: AssemblyConfig::default(),
            imputation: ImputationConfig::default(),
            evaluation: EvaluationConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.evaluation.train_proportion)
            || self.evaluation.train_proportion <= 0.0
        {
            return Err(ConfigError::Invalid(format!(
                "train_proportion must be in (0, 1), got {}",
                self.evaluation.train_proportion
            )));
        }
        if self.evaluation.cv_folds < 2 {
            return Err(ConfigError::Invalid(
                "cv_folds must be at least 2".to_string(),
            ));
        }
        if self.imputation.runs == 0 {
            return Err(ConfigError::Invalid(
                "imputation.runs must be positive".to_string(),
            ));
        }
        if self.imputation.donors == 0 {
            return Err(ConfigError::Invalid(
                "imputation.donors must be positive".to_string(),
            ));
        }
        let (wp, ws, wr) = self.search.weights;
        if wp < 0.0 || ws < 0.0 || wr < 0.0 {
            return Err(ConfigError::Invalid(
                "search.weights must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn minimal_toml_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "base_seed = 7\n[assembly]\noutcome = \"brief_total\"").unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.base_seed, 7);
        assert_eq!(config.assembly.outcome, "brief_total");
        assert_eq!(config.imputation.iterations, 5);
        assert_eq!(config.evaluation.splits, 50);
        assert_eq!(config.search.weights, (0.5, 0.3, 0.2));
    }

    #[test]
    fn invalid_train_proportion_rejected() {
        let mut config = PipelineConfig::default();
        config.evaluation.train_proportion = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn seed_lanes_do_not_collide_across_stages() {
        let a = derive_seed(100, SeedStage::ImputationRun, 3);
        let b = derive_seed(100, SeedStage::Split, 3);
        let c = derive_seed(100, SeedStage::Candidate, 3);
        assert_ne!(a, b);
        assert_ne!(b, c);
        // Within a stage, consecutive indices give consecutive seeds.
        assert_eq!(derive_seed(100, SeedStage::Split, 4), b + 1);
    }
}
