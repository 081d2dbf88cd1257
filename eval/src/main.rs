mod case;
mod cli;
mod judge;
mod report;
mod results;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "eval",
    version,
    about = "Calibration harness for conductor task analysis and plan selection"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    List,
    Run {
        /// Judge only this case.
        case_id: Option<String>,
    },
    Report {
        eval_run_id: String,
    },
}

fn main() -> Result<()> {
    conductor::logging::init_with_default("eval=info");
    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;
    match cli.command {
        Command::List => cli::list_cases(&repo_root),
        Command::Run { case_id } => cli::run_cases(&repo_root, case_id.as_deref()),
        Command::Report { eval_run_id } => cli::report_run(&repo_root, &eval_run_id),
    }
}
