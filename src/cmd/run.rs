//! `storyland <BOOK_TITLE>`: run the itinerary workflow end to end.
//!
//! `storyland --dev` without a title only serves the stored runs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use storyland::backend::GeminiBackend;
use storyland::checkpoint::{CheckpointPolicy, TerminalInput};
use storyland::config::Config;
use storyland::logging;
use storyland::models::TravelPreferences;
use storyland::state::open_store;
use storyland::supervisor::{PhaseSupervisor, SupervisorConfig};
use storyland::tools::default_registry;
use storyland::ui::{self, RunProgress, SuspendedInput};
use storyland::workflow::{ItineraryRequest, StorylandWorkflow};

use super::super::Cli;
use super::dev::DevServer;

fn preferences(cli: &Cli) -> TravelPreferences {
    let prefers_museums = if cli.museums {
        Some(true)
    } else if cli.no_museums {
        Some(false)
    } else {
        None
    };
    TravelPreferences {
        budget: cli.budget,
        preferred_pace: cli.pace,
        prefers_museums,
        travels_with_kids: cli.with_kids.then_some(true),
        ..Default::default()
    }
}

fn request(cli: &Cli, title: &str) -> Result<ItineraryRequest> {
    let title = title.trim();
    if title.is_empty() {
        bail!("Book title must not be empty");
    }
    let mut request = ItineraryRequest::new(title)
        .user_id(cli.user_id.clone())
        .preferences(preferences(cli));
    if let Some(author) = cli.author.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        request = request.author(author);
    }
    match cli.timeout {
        Some(0) => bail!("--timeout must be greater than zero"),
        Some(secs) => request = request.timeout(Duration::from_secs(secs)),
        None => {}
    }
    Ok(request)
}

fn checkpoint_policy(cli: &Cli) -> CheckpointPolicy {
    if cli.select_all || !console::user_attended() {
        CheckpointPolicy::SelectAll
    } else {
        CheckpointPolicy::Interactive
    }
}

/// Cancel `cancel` on the first Ctrl+C; quit outright on the second.
fn interrupt_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupted");
        eprintln!("Interrupted. Saving the partial run; press Ctrl+C again to quit now.");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    })
}

fn load_config(cli: &Cli) -> Result<Config> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let mut config = Config::load(&project_dir)?;
    if cli.database {
        config.use_database = true;
    }
    if cli.verbose {
        config.log_level = "debug".to_string();
    }
    Ok(config)
}

/// Serve the stored runs until Ctrl+C, without starting a workflow.
async fn serve_store(cli: &Cli, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    info!(store = %store.describe(), port = cli.port, "dev_server_only");
    DevServer::start(cli.port, store).linger().await
}

pub async fn run_itinerary(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    logging::init(&config.log_level, config.log_format);

    let Some(title) = cli.book_title.as_deref() else {
        if cli.dev {
            return serve_store(cli, &config).await;
        }
        bail!("A book title is required unless --dev is set");
    };

    let request = request(cli, title)?;
    let backend = Arc::new(GeminiBackend::from_config(&config)?);
    let store = open_store(&config)?;
    info!(model = %config.model_name, store = %store.describe(), "config_loaded");

    let (tx, rx) = mpsc::channel(256);
    let renderer = RunProgress::new(cli.verbose);
    let terminal = renderer.terminal();
    let progress = renderer.spawn(rx);
    let cancel = CancellationToken::new();
    let interrupt = interrupt_on_ctrl_c(cancel.clone());
    let supervisor = PhaseSupervisor::new(
        SupervisorConfig::from_config(&config),
        backend,
        default_registry(),
    )
    .with_event_channel(tx)
    .with_cancellation(cancel.clone());

    let mut workflow = StorylandWorkflow::from_config(&config, supervisor, store.clone())
        .with_checkpoint_policy(checkpoint_policy(cli));
    let dev = cli.dev.then(|| DevServer::start(cli.port, store.clone()));
    if let Some(dev) = &dev {
        workflow = workflow.with_observer(dev.observer.clone());
    }

    println!("{}", ui::header(&request.book_title, request.author.as_deref()));
    let mut input = SuspendedInput::new(TerminalInput, terminal);
    let result = workflow.create_itinerary(&request, &mut input).await;
    interrupt.abort();

    // Dropping the workflow closes the event channel so the renderer can finish.
    drop(workflow);
    if let Err(err) = progress.await {
        warn!(error = %err, "progress_renderer_failed");
    }

    let result = if cancel.is_cancelled() {
        result.context("Run interrupted; the partial run was saved")?
    } else {
        result?
    };
    println!("{}", ui::render_result(&result));

    if let Some(dev) = dev {
        dev.linger().await?;
    }
    Ok(())
}
