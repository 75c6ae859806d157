use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;

use storyland::models::{Budget, Pace};
use storyland::web::DEFAULT_PORT;
use storyland::workflow::DEFAULT_USER_ID;

mod cmd;

#[derive(Parser)]
#[command(name = "storyland")]
#[command(version, about = "Turn a book into a literary travel itinerary")]
pub struct Cli {
    /// Title of the book to travel through (omit with --dev to browse stored runs)
    #[arg(required_unless_present = "dev")]
    pub book_title: Option<String>,

    /// Author of the book, to disambiguate common titles
    #[arg(short, long)]
    pub author: Option<String>,

    #[arg(short, long, default_value = DEFAULT_USER_ID)]
    pub user_id: String,

    /// Persist runs in SQLite instead of memory
    #[arg(short, long)]
    pub database: bool,

    /// Workflow timeout in seconds (default: WORKFLOW_TIMEOUT or 300)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    #[arg(long, value_enum)]
    pub budget: Option<Budget>,

    #[arg(long, value_enum)]
    pub pace: Option<Pace>,

    /// Prefer museums and archives
    #[arg(long, overrides_with = "no_museums")]
    pub museums: bool,

    /// Prefer outdoor sites, cafes and walks over museums
    #[arg(long, overrides_with = "museums")]
    pub no_museums: bool,

    /// Plan for travelling with children
    #[arg(long)]
    pub with_kids: bool,

    /// Keep every discovered region without prompting
    #[arg(long)]
    pub select_all: bool,

    #[arg(short, long)]
    pub verbose: bool,

    /// Serve run snapshots over HTTP for a browser UI while the workflow runs
    #[arg(long)]
    pub dev: bool,

    /// Port for --dev
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding .env and storyland.toml (default: current directory)
    #[arg(long)]
    pub project_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cmd::run_itinerary(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "workflow_failed");
            eprintln!("{} {:#}", style("Error:").red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
