//! Session orchestrator.
//!
//! [`GenerationSession`] owns the lifecycle of one tracked job: it
//! establishes the push channel, falls back to polling when the channel
//! degrades, folds both drivers' signals into observer callbacks through
//! one normalized vocabulary, resolves the final result exactly once,
//! and enforces the hard session deadline.
//!
//! One tokio task runs per session. The two drivers run in sequence on
//! that task, never concurrently, so a discarded push channel can never
//! race the poll loop for terminal delivery. Every cancellation select
//! is biased toward the close signal, so a close requested from inside
//! a callback is observed at the next await even when more work is
//! already ready behind it.

use std::time::Duration;

use futures::Stream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use cityforge_core::error::SessionError;
use cityforge_core::events::SessionEvent;
use cityforge_core::observer::SessionObserver;
use cityforge_core::progress::{
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SESSION_TIMEOUT_SECS, INITIAL_PROGRESS_PERCENT,
};
use cityforge_core::state::SessionState;
use cityforge_core::tracker::SessionTracker;
use cityforge_core::types::JobId;

use crate::api::{EngineApi, JobApi};
use crate::channel::{self, ChannelConnector, ChannelError, PushSignal, WsChannel};
use crate::poller::{self, PollFailureTally};
use crate::resolver;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Endpoints and tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base HTTP URL of the engine, e.g. `http://host:9040`.
    pub api_url: String,
    /// WebSocket base URL of the engine, e.g. `ws://host:9040`.
    pub ws_url: String,
    /// Delay between status polls on the fallback path.
    pub poll_interval: Duration,
    /// Hard deadline for the whole session.
    pub session_timeout: Duration,
}

impl SessionConfig {
    /// Configuration for one engine instance with default timing.
    pub fn new(api_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ws_url: ws_url.into(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
        }
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the session deadline.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Handle to one tracked generation session.
///
/// Created via [`start`](Self::start) (live engine) or
/// [`spawn`](Self::spawn) (explicit transports). The session runs on its
/// own tokio task; dropping the handle closes the session.
pub struct GenerationSession {
    job_id: JobId,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

/// Cloneable closer for a session, detached from the owning handle.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    cancel: CancellationToken,
}

impl CloseHandle {
    /// Close the session. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl GenerationSession {
    /// Start tracking a job on a live engine.
    pub fn start<O>(job_id: JobId, config: SessionConfig, observer: O) -> Self
    where
        O: SessionObserver + 'static,
    {
        let api = EngineApi::new(config.api_url.clone());
        let connector = WsChannel::new(config.ws_url.clone());
        Self::spawn(job_id, config, api, connector, observer)
    }

    /// Start tracking a job with explicit transports.
    ///
    /// Only the timing fields of `config` apply here; the endpoints are
    /// whatever the supplied transports talk to.
    pub fn spawn<A, C, O>(
        job_id: JobId,
        config: SessionConfig,
        api: A,
        connector: C,
        observer: O,
    ) -> Self
    where
        A: JobApi + 'static,
        C: ChannelConnector + 'static,
        C::Frames: 'static,
        O: SessionObserver + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_job_id = job_id.clone();

        let task = tokio::spawn(async move {
            run_session(task_job_id, config, api, connector, observer, task_cancel).await;
        });

        Self {
            job_id,
            cancel,
            task: Some(task),
        }
    }

    /// Identifier of the tracked job.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Stop the session. Idempotent; no callbacks fire after the session
    /// task observes the close.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// A cloneable closer usable from other tasks.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Wait for the session task to finish, either because a terminal
    /// callback was delivered or because a close was observed.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Close and wait for the task to wind down.
    pub async fn shutdown(self) {
        self.close();
        self.join().await;
    }
}

impl Drop for GenerationSession {
    fn drop(&mut self) {
        // A discarded handle must not leave its task running.
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

async fn run_session<A, C, O>(
    job_id: JobId,
    config: SessionConfig,
    api: A,
    connector: C,
    mut observer: O,
    cancel: CancellationToken,
) where
    A: JobApi,
    C: ChannelConnector,
    O: SessionObserver,
{
    let timeout_secs = config.session_timeout.as_secs();
    let mut tracker = SessionTracker::new(job_id, timeout_secs);

    tracing::info!(job_id = %tracker.job_id(), timeout_secs, "Session started");

    let outcome = tokio::time::timeout(
        config.session_timeout,
        drive(&config, &api, &connector, &mut observer, &mut tracker, &cancel),
    )
    .await;

    if outcome.is_err() && tracker.fail() {
        let err = SessionError::Timeout(timeout_secs);
        tracing::warn!(job_id = %tracker.job_id(), "Session deadline reached");
        observer.on_error(&err);
    }

    tracker.close();
    tracing::info!(
        job_id = %tracker.job_id(),
        state = tracker.state().as_str(),
        "Session closed",
    );
}

/// Drive the session to a terminal callback or a close.
///
/// The hard deadline is enforced by the caller wrapping this future in
/// [`tokio::time::timeout`].
async fn drive<A, C, O>(
    config: &SessionConfig,
    api: &A,
    connector: &C,
    observer: &mut O,
    tracker: &mut SessionTracker,
    cancel: &CancellationToken,
) where
    A: JobApi,
    C: ChannelConnector,
    O: SessionObserver,
{
    tracker.transition(SessionState::Connecting);

    let mut triggered = false;
    match attempt_push(api, connector, tracker.job_id(), cancel).await {
        PushAttempt::Open(frames) => {
            triggered = true;
            tracker.transition(SessionState::ActivePush);
            observer.on_connect();

            // Synthetic first event so the caller sees life before the
            // engine's first real signal.
            let update = tracker.apply_progress(INITIAL_PROGRESS_PERCENT, None);
            observer.on_progress(&update);

            match run_push_phase(frames, observer, tracker, cancel).await {
                PushPhaseEnd::Completed => {
                    resolve_and_finish(api, observer, tracker, cancel).await;
                    return;
                }
                PushPhaseEnd::Failed(message) => {
                    deliver_failure(observer, tracker, SessionError::RemoteFailure(message));
                    return;
                }
                PushPhaseEnd::ChannelLost(e) => {
                    tracing::warn!(
                        job_id = %tracker.job_id(),
                        error = %e,
                        "Push channel lost, falling back to polling",
                    );
                }
                PushPhaseEnd::Cancelled => return,
            }
        }
        PushAttempt::Failed(e) => {
            tracing::warn!(
                job_id = %tracker.job_id(),
                error = %e,
                "Push channel unavailable, falling back to polling",
            );
        }
        PushAttempt::Cancelled => return,
    }

    tracker.transition(SessionState::ActivePoll);

    if !triggered {
        // The push attempt never got a trigger through, so the job may
        // not be running at all yet. A failure here is terminal.
        if let Err(e) = api.trigger(tracker.job_id()).await {
            deliver_failure(observer, tracker, SessionError::Trigger(e.to_string()));
            return;
        }
    }

    match run_poll_phase(api, observer, tracker, config, cancel).await {
        PollPhaseEnd::Completed => resolve_and_finish(api, observer, tracker, cancel).await,
        PollPhaseEnd::Failed(message) => {
            deliver_failure(observer, tracker, SessionError::RemoteFailure(message));
        }
        PollPhaseEnd::Stalled(detail) => {
            tracing::warn!(
                job_id = %tracker.job_id(),
                detail = %detail,
                "Poll loop stalled, giving up",
            );
            let elapsed = (chrono::Utc::now() - tracker.started_at())
                .num_seconds()
                .max(0) as u64;
            deliver_failure(observer, tracker, SessionError::Timeout(elapsed));
        }
        PollPhaseEnd::Cancelled => {}
    }
}

// ---------------------------------------------------------------------------
// Push phase
// ---------------------------------------------------------------------------

enum PushAttempt<F> {
    /// Channel open and the start trigger accepted.
    Open(F),
    /// Channel never became usable, or the start trigger failed on an
    /// open channel. Either way the session falls back to polling.
    Failed(ChannelError),
    Cancelled,
}

async fn attempt_push<A, C>(
    api: &A,
    connector: &C,
    job_id: &JobId,
    cancel: &CancellationToken,
) -> PushAttempt<C::Frames>
where
    A: JobApi,
    C: ChannelConnector,
{
    let establish = async {
        let frames = connector.connect(job_id).await?;
        // Channel is open; ask the engine to start the job. A trigger
        // failure is folded into the channel-error path so the session
        // falls back and re-triggers from the poll side.
        api.trigger(job_id)
            .await
            .map_err(|e| ChannelError::Connection(format!("job trigger failed: {e}")))?;
        Ok(frames)
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => PushAttempt::Cancelled,
        result = establish => match result {
            Ok(frames) => PushAttempt::Open(frames),
            Err(e) => PushAttempt::Failed(e),
        },
    }
}

enum PushPhaseEnd {
    Completed,
    Failed(String),
    ChannelLost(ChannelError),
    Cancelled,
}

async fn run_push_phase<F, O>(
    mut frames: F,
    observer: &mut O,
    tracker: &mut SessionTracker,
    cancel: &CancellationToken,
) -> PushPhaseEnd
where
    F: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    O: SessionObserver,
{
    loop {
        let signal = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PushPhaseEnd::Cancelled,
            signal = channel::next_signal(&mut frames, tracker.job_id()) => signal,
        };

        match signal {
            PushSignal::Event(msg) => match apply_event(msg.into(), tracker, observer) {
                Applied::Continue => {}
                Applied::Completed => return PushPhaseEnd::Completed,
                Applied::Failed(message) => return PushPhaseEnd::Failed(message),
            },
            PushSignal::Lost(e) => return PushPhaseEnd::ChannelLost(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Poll phase
// ---------------------------------------------------------------------------

enum PollPhaseEnd {
    Completed,
    Failed(String),
    /// Too many consecutive poll failures; carries the last error text.
    Stalled(String),
    Cancelled,
}

async fn run_poll_phase<A, O>(
    api: &A,
    observer: &mut O,
    tracker: &mut SessionTracker,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> PollPhaseEnd
where
    A: JobApi,
    O: SessionObserver,
{
    let mut interval = tokio::time::interval(config.poll_interval);
    let mut poll_count: u32 = 0;
    let mut tally = PollFailureTally::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollPhaseEnd::Cancelled,
            _ = interval.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollPhaseEnd::Cancelled,
            fetched = api.fetch_status(tracker.job_id()) => fetched,
        };

        match fetched {
            Ok(report) => {
                tally.record_success();
                let event = poller::map_report(&report, poll_count);
                poll_count = poll_count.saturating_add(1);
                match apply_event(event, tracker, observer) {
                    Applied::Continue => {}
                    Applied::Completed => return PollPhaseEnd::Completed,
                    Applied::Failed(message) => return PollPhaseEnd::Failed(message),
                }
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %tracker.job_id(),
                    error = %e,
                    consecutive = tally.consecutive() + 1,
                    "Poll attempt failed",
                );
                if tally.record_failure() {
                    return PollPhaseEnd::Stalled(e.to_string());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event application and terminal delivery
// ---------------------------------------------------------------------------

/// Disposition after applying one normalized event.
enum Applied {
    Continue,
    Completed,
    Failed(String),
}

/// Fold a normalized event into the session record and invoke the
/// matching observer callback.
///
/// Terminal events carry no callback of their own here: completion goes
/// through the resolver and failure through [`deliver_failure`], both
/// after the phase loop has wound down.
fn apply_event<O: SessionObserver>(
    event: SessionEvent,
    tracker: &mut SessionTracker,
    observer: &mut O,
) -> Applied {
    match event {
        SessionEvent::Connected => {
            tracing::debug!(job_id = %tracker.job_id(), "Engine acknowledged the channel");
            Applied::Continue
        }
        SessionEvent::Progress { percent, message } => {
            let update = tracker.apply_progress(percent, message);
            observer.on_progress(&update);
            Applied::Continue
        }
        SessionEvent::Stage { label } => {
            let update = tracker.apply_stage(label);
            observer.on_progress(&update);
            Applied::Continue
        }
        SessionEvent::Completed => Applied::Completed,
        SessionEvent::Failed { message } => Applied::Failed(message),
    }
}

/// Resolve the authoritative result and deliver the terminal callback.
async fn resolve_and_finish<A, O>(
    api: &A,
    observer: &mut O,
    tracker: &mut SessionTracker,
    cancel: &CancellationToken,
) where
    A: JobApi,
    O: SessionObserver,
{
    tracker.transition(SessionState::Resolving);

    let resolved = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        resolved = resolver::resolve(api, tracker.job_id()) => resolved,
    };

    match resolved {
        Ok(reference) => {
            if tracker.complete(reference.clone()) {
                tracing::info!(
                    job_id = %tracker.job_id(),
                    result = %reference,
                    "Session completed",
                );
                observer.on_complete(&reference);
            }
        }
        Err(err) => deliver_failure(observer, tracker, err),
    }
}

/// Deliver a terminal error, at most once per session.
fn deliver_failure<O: SessionObserver>(
    observer: &mut O,
    tracker: &mut SessionTracker,
    err: SessionError,
) {
    if tracker.fail() {
        tracing::warn!(
            job_id = %tracker.job_id(),
            kind = err.kind(),
            error = %err,
            "Session failed",
        );
        observer.on_error(&err);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
