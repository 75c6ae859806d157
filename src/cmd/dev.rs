//! `--dev`: serve run snapshots while the workflow runs.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use storyland::state::{RunRecord, RunStore};
use storyland::web::{self, AppState};

pub struct DevServer {
    pub observer: watch::Sender<Option<RunRecord>>,
    handle: JoinHandle<()>,
}

impl DevServer {
    pub fn start(port: u16, store: Arc<dyn RunStore>) -> Self {
        let (observer, current) = watch::channel(None);
        let state = Arc::new(AppState { current, store });
        let handle = tokio::spawn(async move {
            if let Err(err) = web::serve(port, state).await {
                error!(error = %err, "dev_server_failed");
            }
        });
        Self { observer, handle }
    }

    /// Keep serving the finished run until Ctrl+C.
    pub async fn linger(self) -> Result<()> {
        println!("Dev server still running with the final run. Press Ctrl+C to exit.");
        tokio::signal::ctrl_c().await?;
        self.handle.abort();
        Ok(())
    }
}
