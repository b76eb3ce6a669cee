//! `cityforge-watch` -- command-line watcher for one generation job.
//!
//! Opens a session against the engine, logs every progress callback,
//! and exits once the job resolves.  An interrupt (Ctrl-C) aborts the
//! job on the engine before closing the session.  Exit code 0 on
//! success, 1 on failure, 130 when interrupted.
//!
//! # Usage
//!
//! ```text
//! cityforge-watch <job-id>
//! ```
//!
//! # Environment variables
//!
//! | Variable               | Required | Default | Description                                   |
//! |------------------------|----------|---------|-----------------------------------------------|
//! | `ENGINE_API_URL`       | yes      | --      | Engine REST base, e.g. `http://host:8188/api` |
//! | `ENGINE_WS_URL`        | yes      | --      | Engine WebSocket base, e.g. `ws://host:8188`  |
//! | `SESSION_TIMEOUT_SECS` | no       | `300`   | Hard deadline for the whole session           |
//! | `POLL_INTERVAL_SECS`   | no       | `3`     | Fallback polling cadence                      |

use std::time::Duration;

use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cityforge_core::error::SessionError;
use cityforge_core::events::ProgressUpdate;
use cityforge_core::observer::SessionObserver;
use cityforge_core::progress::{DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SESSION_TIMEOUT_SECS};
use cityforge_core::types::{JobId, ResultRef};
use cityforge_session::api::EngineApi;
use cityforge_session::session::{GenerationSession, SessionConfig};

/// Observer that logs progress and sends the terminal outcome back to
/// `main` for the exit code.
struct WatchObserver {
    outcome: Option<oneshot::Sender<Result<ResultRef, SessionError>>>,
}

impl SessionObserver for WatchObserver {
    fn on_connect(&mut self) {
        tracing::info!("Push channel connected");
    }

    fn on_progress(&mut self, update: &ProgressUpdate) {
        tracing::info!(
            percent = update.percent,
            detail = update.message.as_deref().unwrap_or(""),
            stage = update.stage.as_deref().unwrap_or(""),
            "Progress",
        );
    }

    fn on_complete(&mut self, result: &ResultRef) {
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(Ok(result.clone()));
        }
    }

    fn on_error(&mut self, error: &SessionError) {
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(Err(error.clone()));
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cityforge_watch=info,cityforge_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let job_id: JobId = match std::env::args().nth(1) {
        Some(raw) => JobId::from(raw),
        None => {
            tracing::error!("Usage: cityforge-watch <job-id>");
            std::process::exit(1);
        }
    };

    let api_url = std::env::var("ENGINE_API_URL").unwrap_or_else(|_| {
        tracing::error!("ENGINE_API_URL environment variable is required");
        std::process::exit(1);
    });

    let ws_url = std::env::var("ENGINE_WS_URL").unwrap_or_else(|_| {
        tracing::error!("ENGINE_WS_URL environment variable is required");
        std::process::exit(1);
    });

    let timeout_secs: u64 = std::env::var("SESSION_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS);

    let poll_secs: u64 = std::env::var("POLL_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

    let engine = EngineApi::new(api_url.clone());
    let config = SessionConfig::new(api_url, ws_url)
        .with_poll_interval(Duration::from_secs(poll_secs))
        .with_session_timeout(Duration::from_secs(timeout_secs));

    tracing::info!(
        job_id = %job_id,
        timeout_secs,
        poll_secs,
        "Watching generation job",
    );

    let (outcome_tx, outcome_rx) = oneshot::channel();
    let observer = WatchObserver {
        outcome: Some(outcome_tx),
    };

    let session = GenerationSession::start(job_id.clone(), config, observer);

    // The abort is best-effort and bounded; the session closes either way.
    let closer = session.close_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, aborting the job");
            match tokio::time::timeout(Duration::from_secs(5), engine.cancel_job(&job_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::warn!(error = %error, "Job abort request failed"),
                Err(_) => tracing::warn!("Job abort request timed out"),
            }
            closer.close();
        }
    });

    session.join().await;

    // The sender lives in the observer, which the session task has dropped
    // by now; a closed channel means no terminal callback ever fired.
    match outcome_rx.await {
        Ok(Ok(reference)) => {
            tracing::info!(result = %reference, "Generation complete");
        }
        Ok(Err(error)) => {
            tracing::error!(error = %error, "Generation failed");
            std::process::exit(1);
        }
        Err(_) => {
            tracing::info!("Session closed before the job resolved");
            std::process::exit(130);
        }
    }
}
