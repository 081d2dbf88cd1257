//! Workflow orchestration CLI.
//!
//! Analyzes a task description, selects a stage plan and runs it against
//! command-backed stage agents configured in `.conductor/config.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use conductor::core::analyzer::analyze;
use conductor::core::metrics::summarize_events;
use conductor::core::types::ExecutionStatus;
use conductor::exit_codes;
use conductor::io::config::{ConductorConfig, load_config};
use conductor::io::init::{ConductorPaths, InitOptions, init_conductor};
use conductor::io::metrics_log::load_events;
use conductor::logging;
use conductor::workflow::{Workflow, plan_for};

#[derive(Parser)]
#[command(
    name = "conductor",
    version,
    about = "Quality-gated workflow orchestration for agent tasks"
)]
struct Cli {
    /// Project root containing `.conductor/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.conductor/config.toml` with defaults.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the task analysis as JSON.
    Analyze { description: String },
    /// Print the selected stage plan as JSON.
    Plan { description: String },
    /// Run the selected plan and print the workflow result as JSON.
    Run { description: String },
    /// Summarize a finished execution from the metrics log.
    Metrics { execution_id: String },
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let root = cli.root.as_path();
    match cli.command {
        Command::Init { force } => cmd_init(root, force),
        Command::Analyze { description } => {
            print_json(&analyze(&description))?;
            Ok(exit_codes::OK)
        }
        Command::Plan { description } => cmd_plan(root, &description),
        Command::Run { description } => cmd_run(root, &description).await,
        Command::Metrics { execution_id } => cmd_metrics(root, &execution_id),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_conductor(root, &InitOptions { force })?;
    println!("{}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_plan(root: &Path, description: &str) -> Result<i32> {
    let config = load_root_config(root)?;
    let (_, plan) = plan_for(description, &config.selector_config()?);
    print_json(&plan)?;
    Ok(exit_codes::OK)
}

async fn cmd_run(root: &Path, description: &str) -> Result<i32> {
    let config = load_root_config(root)?;
    let workflow = Workflow::from_config(root, &config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => on_interrupt.cancel(),
            Err(err) => warn!(err = %err, "cannot listen for interrupts"),
        }
    });

    let report = workflow.run(description, cancel).await?;
    print_json(&report.result)?;
    Ok(match report.result.status {
        ExecutionStatus::Succeeded => exit_codes::OK,
        ExecutionStatus::Aborted => exit_codes::RUN_ABORTED,
        _ => exit_codes::RUN_FAILED,
    })
}

fn cmd_metrics(root: &Path, execution_id: &str) -> Result<i32> {
    let config = load_root_config(root)?;
    let log_path = config.metrics_log_path(root);
    let events = load_events(&log_path)?;
    let metrics = summarize_events(execution_id, &events).with_context(|| {
        format!(
            "no events for execution {execution_id} in {}",
            log_path.display()
        )
    })?;
    print_json(&metrics)?;
    Ok(exit_codes::OK)
}

fn load_root_config(root: &Path) -> Result<ConductorConfig> {
    let paths = ConductorPaths::new(root);
    load_config(&paths.config_path)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
