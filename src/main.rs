mod code_metrics;
mod config;
mod context;
mod coverage;
mod error;
mod executor;
mod ledger;
mod llm;
mod mutation;
mod pipeline;
mod repair;
mod resolver;
mod stats;
#[cfg(test)]
mod test_support;
mod verification;

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;
use crate::executor::JavaToolchain;
use crate::llm::find_available_endpoint;
use crate::pipeline::{run_comparison, EvaluationPhase, JavaMeasurer, VerificationPhase};
use crate::repair::RepairAdapter;
use crate::verification::parser_for;

#[derive(Parser)]
#[command(name = "verifine")]
#[command(version)]
#[command(about = "Verifies and measures model-refined unit tests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that refined tests preserve the original oracle
    Verify(VerifyArgs),
    /// Measure coverage and mutation score of verified tests
    Evaluate(EvaluateArgs),
    /// Compare baseline and refined metrics
    Compare(CompareArgs),
    /// Verify, evaluate, then compare
    Run,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct VerifyArgs {
    /// Refinement ledger to read
    #[arg(long)]
    input: Option<PathBuf>,
    /// Verification ledger to write
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Verification ledger to read
    #[arg(long)]
    input: Option<PathBuf>,
    /// Metrics ledger to write
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct CompareArgs {
    /// Verification ledger to read
    #[arg(long)]
    verification: Option<PathBuf>,
    /// Metrics ledger to read
    #[arg(long)]
    metrics: Option<PathBuf>,
    /// Baseline generation ledger to read
    #[arg(long)]
    baseline: Option<PathBuf>,
    /// Report to write
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Config::default_config_path);
    let config = Config::load(cli.config.as_deref())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::info!(
        "Config path: {}",
        config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );

    let paths = &config.paths;
    match cli.command {
        Commands::Verify(args) => {
            let input = ledger_path(&config, args.input, &paths.refined_ledger);
            let output = ledger_path(&config, args.output, &paths.verification_ledger);
            verify(&config, &input, &output).await?;
        }
        Commands::Evaluate(args) => {
            let input = ledger_path(&config, args.input, &paths.verification_ledger);
            let output = ledger_path(&config, args.output, &paths.metrics_ledger);
            evaluate(&config, &input, &output).await?;
        }
        Commands::Compare(args) => {
            let verification = ledger_path(&config, args.verification, &paths.verification_ledger);
            let metrics = ledger_path(&config, args.metrics, &paths.metrics_ledger);
            let baseline = ledger_path(&config, args.baseline, &paths.baseline_ledger);
            let output = ledger_path(&config, args.output, &paths.comparison_report);
            run_comparison(&verification, &metrics, &baseline, &output)?;
        }
        Commands::Init { force } => {
            let path = config_path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("No config path available; pass --config"))?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(Some(&path))?;
            tracing::info!("Wrote default configuration to {}", path.display());
        }
        Commands::Run => {
            let refined = config.resolve(&paths.refined_ledger);
            let verification = config.resolve(&paths.verification_ledger);
            let metrics = config.resolve(&paths.metrics_ledger);
            verify(&config, &refined, &verification).await?;
            evaluate(&config, &verification, &metrics).await?;
            run_comparison(
                &verification,
                &metrics,
                &config.resolve(&paths.baseline_ledger),
                &config.resolve(&paths.comparison_report),
            )?;
        }
    }

    Ok(())
}

fn ledger_path(config: &Config, flag: Option<PathBuf>, configured: &Path) -> PathBuf {
    flag.unwrap_or_else(|| config.resolve(configured))
}

async fn verify(config: &Config, input: &Path, output: &Path) -> anyhow::Result<()> {
    let toolchain = JavaToolchain::from_config(config);
    let adapter = find_available_endpoint(&config.endpoints).await;
    if adapter.is_none() {
        tracing::warn!("No repair endpoint available; non-compiling tests will not be repaired");
    }

    let phase = VerificationPhase::new(
        config,
        &toolchain,
        &toolchain,
        &toolchain,
        parser_for(config.toolchain.outcome_parser),
        adapter.as_ref().map(|a| a as &dyn RepairAdapter),
    );
    phase.run_ledger(input, output).await?;
    Ok(())
}

async fn evaluate(config: &Config, input: &Path, output: &Path) -> anyhow::Result<()> {
    let toolchain = JavaToolchain::from_config(config);
    let measurer = JavaMeasurer::new(&toolchain, config.repair.max_error_chars);
    EvaluationPhase::new(config, &measurer)
        .run_ledger(input, output)
        .await?;
    Ok(())
}
