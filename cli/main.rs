#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use biosift::aggregate::{summarize_coefficients, summarize_performance};
use biosift::assemble::{TableAssembler, load_domain_table};
use biosift::config::{PipelineConfig, SeedStage, derive_seed};
use biosift::evaluate::{HarnessConfig, ImputePolicy, run_harness};
use biosift::impute::batch::{combine_jobs, run_job};
use biosift::impute::{DroppedColumn, QualityReport};
use biosift::model::ModelFitter;
use biosift::model::boost::{BoostParams, GradientBooster};
use biosift::model::linear::ElasticNet;
use biosift::report::{
    ResultSummary, load_json, save_json, write_candidate_table, write_importance_table,
    write_prediction_table, write_predictor_table,
};
use biosift::search::{BoostGrid, evaluate_candidates, rank_candidates, recommend};
use biosift::types::{FeatureMatrix, MatrixArtifact, PredictorGroups};
use serde::{Deserialize, Serialize};

/// The assembled matrix plus its predictor groups, passed between stages.
#[derive(Serialize, Deserialize)]
struct AssembledArtifact {
    matrix: MatrixArtifact,
    groups: PredictorGroups,
}

/// The averaged post-imputation matrix with its provenance.
#[derive(Serialize, Deserialize)]
struct CombinedArtifact {
    matrix: MatrixArtifact,
    dropped: Vec<DroppedColumn>,
    quality: QualityReport,
}

#[derive(Args)]
struct AssembleArgs {
    /// Pipeline configuration TOML.
    #[arg(long)]
    config: PathBuf,

    /// Domain CSV tables to join (one or more).
    #[arg(value_name = "TABLE", required = true)]
    tables: Vec<PathBuf>,

    /// Output path for the assembled matrix artifact.
    #[arg(long, default_value = "assembled.json")]
    out: PathBuf,
}

#[derive(Args)]
struct ImputeArgs {
    #[arg(long)]
    config: PathBuf,

    /// Assembled matrix artifact (from `assemble`).
    #[arg(long)]
    matrix: PathBuf,

    /// Which imputation run this invocation performs (0-based).
    #[arg(long)]
    task_id: u32,

    /// Directory collecting per-job artifacts.
    #[arg(long, default_value = "imputed")]
    out_dir: PathBuf,
}

#[derive(Args)]
struct CombineArgs {
    #[arg(long)]
    config: PathBuf,

    #[arg(long)]
    matrix: PathBuf,

    /// Directory holding the per-job artifacts.
    #[arg(long, default_value = "imputed")]
    artifact_dir: PathBuf,

    /// Output path for the combined matrix artifact.
    #[arg(long, default_value = "combined.json")]
    out: PathBuf,
}

#[derive(Args)]
struct SelectArgs {
    #[arg(long)]
    config: PathBuf,

    /// Assembled matrix artifact; imputation happens per split inside the
    /// evaluation loop (training-fold medians only).
    #[arg(long)]
    matrix: PathBuf,

    /// L1 mixing weight (1.0 = LASSO, 0.0 = ridge).
    #[arg(long, default_value = "1.0")]
    alpha: f64,

    /// Prefer the sparser one-standard-error penalty over the CV minimum.
    #[arg(long)]
    one_se: bool,

    #[arg(long, default_value = "selection")]
    out_dir: PathBuf,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    config: PathBuf,

    /// Combined matrix artifact (from `combine`).
    #[arg(long)]
    combined: PathBuf,

    /// Optional JSON overriding the built-in hyperparameter grid.
    #[arg(long)]
    grid: Option<PathBuf>,

    #[arg(long, default_value = "search")]
    out_dir: PathBuf,
}

#[derive(Args)]
struct FinalModelArgs {
    #[arg(long)]
    config: PathBuf,

    #[arg(long)]
    combined: PathBuf,

    /// Hyperparameters JSON; `search` writes the recommended set as
    /// `recommended_params.json`.
    #[arg(long)]
    params: PathBuf,

    #[arg(long, default_value = "final_model")]
    out_dir: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "biosift",
    about = "Feature selection for small clinical cohorts with missing data",
    long_about = "Assembles multi-domain cohort tables, multiply imputes missing values via \
                 predictive mean matching, and ranks predictors through repeated-split \
                 penalized regression and gradient-boosting hyperparameter search."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join domain CSV tables into one feature matrix
    #[command(about = "Join domain tables into one matrix (outputs: assembled.json)")]
    Assemble(AssembleArgs),

    /// Run one imputation job; invoke once per task id for the full ensemble
    #[command(about = "Run one PMM imputation job")]
    Impute(ImputeArgs),

    /// Average the imputation ensemble into a single complete matrix
    #[command(about = "Average imputation artifacts (outputs: combined.json)")]
    Combine(CombineArgs),

    /// Repeated-split penalized-regression predictor selection
    #[command(about = "Select predictors via repeated-split penalized regression")]
    Select(SelectArgs),

    /// Grid-search boosting hyperparameters with composite ranking
    #[command(about = "Rank boosting hyperparameters over repeated splits")]
    Search(SearchArgs),

    /// Evaluate and fit the final boosting model
    #[command(about = "Evaluate the chosen hyperparameters and fit the final model")]
    FinalModel(FinalModelArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Assemble(args)) => run_assemble(args),
        Some(Commands::Impute(args)) => run_impute(args),
        Some(Commands::Combine(args)) => run_combine(args),
        Some(Commands::Select(args)) => run_select(args),
        Some(Commands::Search(args)) => run_search(args),
        Some(Commands::FinalModel(args)) => run_final_model(args),
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn load_assembled(path: &Path) -> Result<(FeatureMatrix, PredictorGroups), Box<dyn std::error::Error>> {
    let artifact: AssembledArtifact = load_json(path)?;
    let matrix = FeatureMatrix::try_from(artifact.matrix)?;
    Ok((matrix, artifact.groups))
}

fn run_assemble(args: AssembleArgs) -> CliResult {
    let config = PipelineConfig::load(&args.config)?;
    let mut tables = Vec::with_capacity(args.tables.len());
    for path in &args.tables {
        tables.push(load_domain_table(path, &config.assembly.key_column)?);
    }

    let assembler = TableAssembler::new(tables);
    let (matrix, groups) = assembler.assemble(&config.assembly)?;
    log::info!(
        "assembled {} participants x {} columns from {} tables",
        matrix.n_rows(),
        matrix.n_cols(),
        args.tables.len()
    );

    let artifact = AssembledArtifact {
        matrix: MatrixArtifact::from(&matrix),
        groups,
    };
    save_json(&args.out, &artifact)?;
    println!("Wrote {}", args.out.display());
    Ok(())
}

fn run_impute(args: ImputeArgs) -> CliResult {
    let config = PipelineConfig::load(&args.config)?;
    if args.task_id as usize >= config.imputation.runs {
        return Err(format!(
            "task id {} out of range: config requests {} imputation runs",
            args.task_id, config.imputation.runs
        )
        .into());
    }
    let (matrix, groups) = load_assembled(&args.matrix)?;
    std::fs::create_dir_all(&args.out_dir)?;

    let path = run_job(
        &matrix,
        &groups,
        &config.imputation,
        config.base_seed,
        args.task_id,
        &args.out_dir,
    )?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn run_combine(args: CombineArgs) -> CliResult {
    let config = PipelineConfig::load(&args.config)?;
    let (matrix, _groups) = load_assembled(&args.matrix)?;

    let combined = combine_jobs(&matrix, &args.artifact_dir, config.imputation.runs as u32)?;
    for dropped in &combined.dropped {
        log::warn!(
            "dropped column '{}': {} cells still missing ({:.1}%)",
            dropped.name,
            dropped.n_missing,
            100.0 * dropped.missing_fraction
        );
    }

    let artifact = CombinedArtifact {
        matrix: MatrixArtifact::from(&combined.matrix),
        dropped: combined.dropped,
        quality: combined.quality,
    };
    save_json(&args.out, &artifact)?;
    println!("Wrote {}", args.out.display());
    Ok(())
}

fn run_select(args: SelectArgs) -> CliResult {
    let config = PipelineConfig::load(&args.config)?;
    let (matrix, _groups) = load_assembled(&args.matrix)?;

    let harness_config = HarnessConfig {
        splits: config.evaluation.splits,
        train_proportion: config.evaluation.train_proportion,
        cv_folds: config.evaluation.cv_folds,
        correlation_cutoff: config.evaluation.correlation_cutoff,
        base_seed: config.base_seed,
        impute_policy: ImputePolicy::PerSplitMedian,
    };
    let fitter = ElasticNet {
        alpha: args.alpha,
        one_se_rule: args.one_se,
        ..ElasticNet::default()
    };
    let report = run_harness(&matrix, &harness_config, &fitter)?;

    write_stage_reports(
        &args.out_dir,
        &report,
        config.search.bootstrap_samples,
        config.base_seed,
        Vec::new(),
        QualityReport::default(),
    )
}

fn run_search(args: SearchArgs) -> CliResult {
    let config = PipelineConfig::load(&args.config)?;
    let artifact: CombinedArtifact = load_json(&args.combined)?;
    let matrix = FeatureMatrix::try_from(artifact.matrix)?;

    let grid = match &args.grid {
        Some(path) => load_json::<BoostGrid>(path)?,
        None => BoostGrid::default(),
    };

    let records = evaluate_candidates(
        &matrix,
        &grid,
        &config.search,
        config.evaluation.correlation_cutoff,
        config.base_seed,
    );
    if records.is_empty() {
        return Err("every hyperparameter candidate failed evaluation".into());
    }

    let ranked = rank_candidates(records, config.search.weights);
    let recommendations = recommend(&ranked, config.search.top_k)
        .ok_or("candidate ranking produced no recommendation")?;
    let best = ranked
        .iter()
        .find(|c| c.record.id == recommendations.best_overall)
        .ok_or("recommended candidate missing from the ranked table")?;

    std::fs::create_dir_all(&args.out_dir)?;
    write_candidate_table(&args.out_dir.join("candidates.csv"), &ranked)?;
    save_json(&args.out_dir.join("recommendations.json"), &recommendations)?;
    save_json(&args.out_dir.join("recommended_params.json"), &best.record.params)?;
    println!(
        "Best candidate: id {} (combined score {:.3}); wrote {}",
        best.record.id,
        best.combined,
        args.out_dir.display()
    );
    Ok(())
}

fn run_final_model(args: FinalModelArgs) -> CliResult {
    let config = PipelineConfig::load(&args.config)?;
    let artifact: CombinedArtifact = load_json(&args.combined)?;
    let matrix = FeatureMatrix::try_from(artifact.matrix)?;
    let params: BoostParams = load_json(&args.params)?;

    let harness_config = HarnessConfig {
        splits: config.evaluation.splits,
        train_proportion: config.evaluation.train_proportion,
        cv_folds: config.evaluation.cv_folds,
        correlation_cutoff: config.evaluation.correlation_cutoff,
        base_seed: config.base_seed,
        impute_policy: ImputePolicy::PreCompleted,
    };
    let fitter = GradientBooster::new(params);
    let report = run_harness(&matrix, &harness_config, &fitter)?;

    // One plain fit on all eligible rows for the reported importances.
    let eligible = matrix.eligible_rows()?;
    let (x, x_names) = matrix.design_for_rows(&eligible);
    let y = matrix.outcome_for_rows(&eligible)?;
    let final_fit = fitter.fit(
        x.view(),
        y.view(),
        &[],
        derive_seed(config.base_seed, SeedStage::Split, 0),
    )?;

    std::fs::create_dir_all(&args.out_dir)?;
    write_importance_table(
        &args.out_dir.join("importance.csv"),
        &x_names,
        final_fit.coefficients().as_slice().unwrap_or(&[]),
    )?;

    write_stage_reports(
        &args.out_dir,
        &report,
        config.search.bootstrap_samples,
        config.base_seed,
        artifact.dropped,
        artifact.quality,
    )
}

/// Shared tail for `select` and `final-model`: predictor table, raw per-split
/// predictions, and the JSON summary with bootstrap CIs.
fn write_stage_reports(
    out_dir: &Path,
    report: &biosift::evaluate::HarnessReport,
    bootstrap_samples: usize,
    base_seed: u64,
    dropped_columns: Vec<DroppedColumn>,
    imputation_quality: QualityReport,
) -> CliResult {
    std::fs::create_dir_all(out_dir)?;

    let predictors = summarize_coefficients(report);
    let performance = summarize_performance(
        report,
        bootstrap_samples,
        derive_seed(base_seed, SeedStage::Bootstrap, 0),
    );
    log::info!(
        "{}/{} splits succeeded; mean R^2 {:.3}",
        report.n_succeeded,
        report.n_succeeded + report.n_skipped,
        performance.r_squared.mean
    );

    write_predictor_table(&out_dir.join("predictors.csv"), &predictors)?;
    write_prediction_table(&out_dir.join("predictions.csv"), report)?;
    save_json(
        &out_dir.join("summary.json"),
        &ResultSummary {
            performance,
            predictors,
            dropped_columns,
            imputation_quality,
        },
    )?;
    println!("Wrote {}", out_dir.display());
    Ok(())
}
