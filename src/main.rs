use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod at_risk;
mod client;
mod config;
mod console;
mod evaluation;
mod models;
mod paginate;
mod report;
mod risk;
mod session;
mod workflow;

use config::Config;
use evaluation::{EvaluationSelector, EvaluationState};
use session::Session;
use workflow::{TrainingState, TrainingWorkflow};

#[derive(Parser)]
#[command(name = "churn-results")]
#[command(about = "Review churn predictions, at-risk customers and model evaluations", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List uploaded datasets
    Files,
    /// Upload a CSV dataset
    Upload {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Train models on a dataset and show one page of predictions
    Predict {
        #[arg(long)]
        dataset: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// List customers at or above a churn threshold
    AtRisk {
        #[arg(long)]
        dataset: String,
    },
    /// Compare model metrics of persisted training runs
    Evaluate {
        #[arg(long)]
        run: Option<String>,
    },
    /// Generate a markdown report for a dataset
    Report {
        #[arg(long)]
        dataset: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export predictions with risk tiers to CSV
    Export {
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Interactive session
    Console,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the caches, select the named dataset and run training to completion.
async fn trained_workflow(
    config: &Config,
    dataset: &str,
) -> anyhow::Result<(Session, TrainingWorkflow)> {
    let mut session = Session::new(config.service());
    session.activate().await;
    let file = session
        .find_dataset(dataset)
        .cloned()
        .with_context(|| format!("no uploaded dataset named {dataset}"))?;

    let mut workflow = TrainingWorkflow::new(config.page_size, config.results_table());
    workflow.select(file);
    workflow::train(&mut workflow, session.service()).await;
    if let TrainingState::Failed(_) = workflow.state() {
        anyhow::bail!("Training failed - retry?");
    }
    session.refresh_runs().await;
    Ok((session, workflow))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = cli.config;

    match cli.command {
        Commands::Files => {
            let mut session = Session::new(config.service());
            session.refresh_files().await;
            println!("{}", console::render_files(&session));
        }
        Commands::Upload { csv } => {
            let mut session = Session::new(config.service());
            let response = session
                .upload(&csv)
                .await
                .with_context(|| format!("upload of {} failed", csv.display()))?;
            println!(
                "CSV uploaded successfully! Saved as: {}",
                response.filename.as_deref().unwrap_or("(unknown)")
            );
        }
        Commands::Predict { dataset, page } => {
            let (_, mut workflow) = trained_workflow(&config, &dataset).await?;
            for _ in 1..page {
                workflow.next_page();
            }
            println!("{}", console::render_training(&workflow));
        }
        Commands::AtRisk { dataset } => {
            let mut session = Session::new(config.service());
            session.refresh_files().await;
            let file = session
                .find_dataset(&dataset)
                .cloned()
                .with_context(|| format!("no uploaded dataset named {dataset}"))?;
            let mut filter = at_risk::AtRiskFilter::new(config.at_risk_table());
            if !at_risk::analyze(&mut filter, session.service(), &config.threshold, Some(&file)).await {
                println!("Enter a numeric threshold");
                return Ok(());
            }
            println!("{}", console::render_at_risk(&filter));
        }
        Commands::Evaluate { run } => {
            let service = config.service();
            let mut selector = EvaluationSelector::new();
            evaluation::activate(&mut selector, &service).await;
            if let EvaluationState::Failed(reason) = selector.state() {
                anyhow::bail!("failed to fetch results: {reason}");
            }
            match run {
                Some(id) => {
                    selector.select(&id);
                    println!("{}", console::render_comparison(&selector));
                }
                None => println!("{}", console::render_runs(&selector)),
            }
        }
        Commands::Report { dataset, out } => {
            let (session, workflow) = trained_workflow(&config, &dataset).await?;
            let file = workflow
                .dataset()
                .context("dataset selection was lost")?;
            let results = workflow.results().cloned().unwrap_or_default();
            let run = report::latest_run_for(session.runs(), &file.original_name);
            let output = report::build_report(
                file,
                &results,
                run,
                &config.results_table(),
                chrono::Utc::now(),
            );
            std::fs::write(&out, output)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { dataset, out } => {
            let (_, workflow) = trained_workflow(&config, &dataset).await?;
            let results = workflow.results().cloned().unwrap_or_default();
            let written = report::export_csv(&out, &results, &config.results_table())?;
            println!("Exported {written} predictions to {}.", out.display());
        }
        Commands::Console => {
            console::run(&config).await?;
        }
    }

    Ok(())
}
