//! grundvand-risk - groundwater contamination risk screening.
//!
//! Screens contaminated sites by distance to the nearest river segment,
//! estimates pollutant flux to the segment and compares the mixed
//! concentration with the environmental quality standard.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grundvand_risk::categories::CategoryRegistry;
use grundvand_risk::concentration::StandardConcentrations;
use grundvand_risk::mixing::MkkThresholds;
use grundvand_risk::{RiskModel, WorkflowSettings};

#[derive(Parser)]
#[command(name = "grundvand-risk")]
#[command(about = "Groundwater contamination risk and river flux screening")]
#[command(version)]
struct Cli {
    /// Workflow settings (TOML)
    #[arg(short, long, global = true, env = "GRUNDVAND_RISK_CONFIG")]
    config: Option<PathBuf>,

    /// Category registry replacing the built-in one (TOML)
    #[arg(long, global = true)]
    categories: Option<PathBuf>,

    /// Standard concentrations replacing the built-in table (TOML)
    #[arg(long, global = true)]
    concentrations: Option<PathBuf>,

    /// MKK thresholds replacing the built-in table (TOML)
    #[arg(long, global = true)]
    mkk: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage on the input files of a data directory
    Run {
        /// Directory holding the input CSV files
        #[arg(short, long, default_value = ".")]
        data_dir: PathBuf,
        /// Directory the output tables are written to
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Classify substance texts and print category and distance threshold
    Classify {
        substances: Vec<String>,
    },

    /// Print the distance thresholds of the category registry
    Categories,
}

fn load_registry(cli: &Cli) -> anyhow::Result<CategoryRegistry> {
    Ok(match &cli.categories {
        Some(path) => CategoryRegistry::load(path)
            .with_context(|| format!("loading categories from {}", path.display()))?,
        None => CategoryRegistry::builtin(),
    })
}

fn build_model(cli: &Cli, data_dir: PathBuf) -> anyhow::Result<RiskModel> {
    let settings = match &cli.config {
        Some(path) => WorkflowSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => WorkflowSettings::default(),
    };
    let concentrations = match &cli.concentrations {
        Some(path) => StandardConcentrations::load(path)
            .with_context(|| format!("loading concentrations from {}", path.display()))?,
        None => StandardConcentrations::builtin(),
    };
    let mkk = match &cli.mkk {
        Some(path) => MkkThresholds::load(path)
            .with_context(|| format!("loading MKK thresholds from {}", path.display()))?,
        None => MkkThresholds::builtin(),
    };
    Ok(RiskModel::with_tables(
        data_dir,
        settings,
        load_registry(cli)?,
        concentrations,
        mkk,
    ))
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    match &cli.command {
        Commands::Run {
            data_dir,
            output_dir,
        } => {
            let model = build_model(&cli, data_dir.clone())?;
            let outcome = model.run();
            let written = outcome
                .write_outputs(output_dir)
                .with_context(|| format!("writing outputs to {}", output_dir.display()))?;

            println!("Run {} ({})", outcome.run_id, outcome.started_at);
            for report in &outcome.reports {
                let status = if report.passed { "PASS" } else { "FAIL" };
                println!("  [{status}] {:<20} {}", report.stage, report.message);
            }
            if let Some(summary) = &outcome.summary {
                let scenario = &model.settings().primary_flow_scenario;
                let failing = summary
                    .iter()
                    .filter(|s| s.primary_exceedance_ratio.is_some_and(|r| r > 1.0))
                    .count();
                println!(
                    "  {failing} of {} segment(s) exceed MKK under {scenario}",
                    summary.len()
                );
            }
            println!("{} table(s) written to {}", written.len(), output_dir.display());
            Ok(outcome.passed())
        }
        Commands::Classify { substances } => {
            let model = build_model(&cli, PathBuf::from("."))?;
            for substance in substances {
                let c = model.classifier().classify(substance);
                println!("{substance}\t{}\t{} m", c.category, c.distance_m);
            }
            Ok(true)
        }
        Commands::Categories => {
            let registry = load_registry(&cli)?;
            for (distance_m, names) in registry.distance_distribution() {
                println!("{distance_m:>6} m  {}", names.join(", "));
            }
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grundvand_risk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
