//! Tradecast CLI: data pipeline and submission commands.
//!
//! Commands:
//! - `pipeline`: run the trade / external / comtrade / indicators stages
//! - `validate`: check a submission file against the submission rules
//! - `evaluate`: score a submission against ground truth (sMAPE)
//! - `baseline`: write a latest-value submission from model-ready tables

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tradecast_core::submission::ValidationReport;
use tradecast_runner::baseline::DEFAULT_FILE_NAME;
use tradecast_runner::{
    evaluate_submission, run_pipeline, validate_submission, write_baseline, ExternalSources,
    PipelineConfig, PipelineOptions, RunManifest,
};

#[derive(Parser)]
#[command(
    name = "tradecast",
    about = "Tradecast CLI: bilateral trade data pipeline and submission tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the data pipeline.
    Pipeline {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// FRED API key for commodity prices.
        #[arg(long, env = "FRED_API_KEY", hide_env_values = true)]
        fred_api_key: Option<String>,

        /// Reuse aggregated trade tables from an earlier run.
        #[arg(long, default_value_t = false)]
        skip_trade: bool,

        /// Skip external series; reuse earlier enriched tables if current.
        #[arg(long, default_value_t = false)]
        skip_external: bool,

        /// Reuse normalized comtrade tables from an earlier run.
        #[arg(long, default_value_t = false)]
        skip_comtrade: bool,

        /// Skip the indicator merge.
        #[arg(long, default_value_t = false)]
        skip_indicators: bool,

        /// Refetch external series even when cached.
        #[arg(long, default_value_t = false)]
        force_fetch: bool,
    },
    /// Validate a submission file and write validation.json.
    Validate {
        /// Submission CSV.
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Score a submission against ground truth and write score.json.
    Evaluate {
        #[arg(long)]
        submission: PathBuf,

        #[arg(long)]
        truth: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a latest-observed-value submission from model-ready tables.
    Baseline {
        /// Model-ready table(s) to read.
        #[arg(long = "input", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Output CSV. Defaults to the forecasts directory.
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pipeline {
            config,
            fred_api_key,
            skip_trade,
            skip_external,
            skip_comtrade,
            skip_indicators,
            force_fetch,
        } => {
            let options = PipelineOptions {
                skip_trade,
                skip_external,
                skip_comtrade,
                skip_indicators,
                force_fetch,
            };
            run_pipeline_cmd(config.as_deref(), fred_api_key.as_deref(), &options)
        }
        Commands::Validate { file, config } => run_validate(&file, config.as_deref()),
        Commands::Evaluate {
            submission,
            truth,
            config,
        } => run_evaluate(&submission, &truth, config.as_deref()),
        Commands::Baseline {
            inputs,
            output,
            config,
        } => run_baseline(&inputs, output, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let config = PipelineConfig::default();
            config.validate()?;
            config
        }
    };
    Ok(config)
}

fn run_pipeline_cmd(
    config_path: Option<&Path>,
    fred_api_key: Option<&str>,
    options: &PipelineOptions,
) -> Result<()> {
    let config = load_config(config_path)?;
    let sources = if options.skip_external {
        ExternalSources::none()
    } else {
        ExternalSources::from_config(&config.external, fred_api_key)?
    };

    let manifest = match run_pipeline(&config, options, &sources) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!(error = %e, "pipeline failed");
            return Err(e.into());
        }
    };

    print_manifest(&manifest);
    println!("Manifest written to: {}", config.manifest_path().display());
    Ok(())
}

fn print_manifest(manifest: &RunManifest) {
    println!();
    println!("=== Pipeline Run ===");
    let fingerprint = &manifest.config_fingerprint;
    println!("Config:      {}", fingerprint.get(..16).unwrap_or(fingerprint));
    for record in &manifest.stages {
        println!(
            "{:<12} {:<10} {} table(s)",
            record.stage.as_str(),
            record.status.as_str(),
            record.outputs.len()
        );
        for output in &record.outputs {
            match output.rows {
                Some(rows) => println!("  {:<28} {:>10} rows", output.name, rows),
                None => println!("  {:<28} {:>10}", output.name, "reused"),
            }
        }
        for note in &record.notes {
            println!("  note: {note}");
        }
    }
    for source in &manifest.external {
        println!(
            "external     {:<18} {} series, {} months{}",
            source.source,
            source.series,
            source.months,
            if source.from_cache { " (cached)" } else { "" }
        );
    }
}

fn print_validation(report: &ValidationReport) {
    println!();
    println!("=== Submission Validation ===");
    println!("Rows:        {}", report.rows);
    println!("Passed:      {}", report.passed);
    for violation in &report.errors {
        println!("  [{}] {} ({} rows)", violation.rule, violation.message, violation.rows);
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
}

fn run_validate(file: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let (report, written) =
        validate_submission(file, &config.submission, &config.paths.evaluation)?;
    print_validation(&report);
    println!("Report written to: {}", written.display());

    if !report.passed {
        std::process::exit(1);
    }
    Ok(())
}

fn run_evaluate(submission: &Path, truth: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let (report, written) =
        evaluate_submission(submission, truth, &config.submission, &config.paths.evaluation)?;

    println!();
    println!("=== Evaluation ===");
    println!("Metric:      {}", report.metric);
    println!("Score:       {:.4}", report.score);
    println!("Rows:        {}", report.rows);
    println!("Report written to: {}", written.display());
    Ok(())
}

fn run_baseline(
    inputs: &[PathBuf],
    output: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let output = output.unwrap_or_else(|| config.paths.forecasts.join(DEFAULT_FILE_NAME));
    let outcome = write_baseline(inputs, &output, &config.submission, &config.paths.evaluation)?;
    info!(rows = outcome.rows, path = %outcome.path.display(), "baseline ready");

    print_validation(&outcome.report);
    println!("Baseline written to: {}", outcome.path.display());
    if !outcome.report.passed {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn baseline_accepts_several_inputs() {
        let cli = Cli::try_parse_from([
            "tradecast",
            "baseline",
            "--input",
            "a.csv",
            "b.csv",
            "--output",
            "out.csv",
        ])
        .unwrap();
        match cli.command {
            Commands::Baseline { inputs, output, .. } => {
                assert_eq!(inputs, vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")]);
                assert_eq!(output, Some(PathBuf::from("out.csv")));
            }
            _ => panic!("expected baseline"),
        }
    }

    #[test]
    fn pipeline_flags_parse() {
        let cli = Cli::try_parse_from([
            "tradecast",
            "pipeline",
            "--skip-trade",
            "--force-fetch",
            "--fred-api-key",
            "k",
        ])
        .unwrap();
        match cli.command {
            Commands::Pipeline {
                skip_trade,
                skip_external,
                force_fetch,
                fred_api_key,
                ..
            } => {
                assert!(skip_trade && force_fetch && !skip_external);
                assert_eq!(fred_api_key.as_deref(), Some("k"));
            }
            _ => panic!("expected pipeline"),
        }
    }
}
