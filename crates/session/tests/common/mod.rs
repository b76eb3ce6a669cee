//! Shared test doubles for session integration tests.
//!
//! [`ScriptedConnector`] and [`FakeEngine`] stand in for the engine's
//! WebSocket and HTTP surfaces, serving pre-scripted outcomes in order.
//! [`RecordingObserver`] captures every callback for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::{self, Message};

use cityforge_core::error::SessionError;
use cityforge_core::events::ProgressUpdate;
use cityforge_core::observer::SessionObserver;
use cityforge_core::types::{JobId, ResultRef};
use cityforge_session::api::{EngineApiError, JobApi, JobStatusReport, RemoteStatus};
use cityforge_session::channel::{ChannelConnector, ChannelError};
use cityforge_session::session::SessionConfig;

// ---------------------------------------------------------------------------
// General helpers
// ---------------------------------------------------------------------------

pub fn job() -> JobId {
    JobId::from("job-1")
}

/// Config with endpoints that are never dialled (tests use scripted
/// transports) and timing fast enough for real-time tests.
pub fn fast_config() -> SessionConfig {
    SessionConfig::new("http://engine.test", "ws://engine.test")
        .with_poll_interval(Duration::from_millis(10))
        .with_session_timeout(Duration::from_secs(5))
}

/// A text frame carrying the given JSON.
pub fn text_frame(json: &str) -> Result<Message, tungstenite::Error> {
    Ok(Message::Text(json.to_string()))
}

pub fn progress_frame(percent: u8, message: &str) -> Result<Message, tungstenite::Error> {
    text_frame(&format!(
        r#"{{"type":"progress","progress":{percent},"message":"{message}"}}"#
    ))
}

pub fn completed_frame() -> Result<Message, tungstenite::Error> {
    text_frame(r#"{"type":"completed"}"#)
}

pub fn error_frame(message: &str) -> Result<Message, tungstenite::Error> {
    text_frame(&format!(r#"{{"type":"error","error":"{message}"}}"#))
}

// ---------------------------------------------------------------------------
// Scripted push channel
// ---------------------------------------------------------------------------

pub type FrameScript = Vec<Result<Message, tungstenite::Error>>;

/// What one connect attempt should do.
pub enum ConnectScript {
    /// Serve these frames, then end the stream.
    Frames(FrameScript),
    /// Serve these frames, then stay silent forever.
    FramesThenHang(FrameScript),
    /// Refuse the connection attempt.
    Refuse(String),
}

/// Connector whose attempts play back a fixed script.
pub struct ScriptedConnector {
    attempts: Mutex<VecDeque<ConnectScript>>,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<ConnectScript>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
        }
    }

    /// Connector that serves one stream of frames.
    pub fn serving(frames: FrameScript) -> Self {
        Self::new(vec![ConnectScript::Frames(frames)])
    }

    /// Connector that refuses every attempt.
    pub fn refusing() -> Self {
        Self::new(vec![ConnectScript::Refuse("connection refused".to_string())])
    }
}

impl ChannelConnector for ScriptedConnector {
    type Frames = stream::BoxStream<'static, Result<Message, tungstenite::Error>>;

    async fn connect(&self, _job_id: &JobId) -> Result<Self::Frames, ChannelError> {
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(ConnectScript::Frames(frames)) => Ok(stream::iter(frames).boxed()),
            Some(ConnectScript::FramesThenHang(frames)) => {
                Ok(stream::iter(frames).chain(stream::pending()).boxed())
            }
            Some(ConnectScript::Refuse(reason)) => Err(ChannelError::Connection(reason)),
            None => Err(ChannelError::Connection(
                "no scripted attempts left".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted engine API
// ---------------------------------------------------------------------------

/// Scripted stand-in for the engine's job API.
///
/// Results are served in scripting order and call counts recorded. An
/// exhausted trigger script keeps succeeding; an exhausted status script
/// keeps reporting `processing`, so non-terminal tests never run dry.
#[derive(Clone)]
pub struct FakeEngine {
    inner: Arc<EngineState>,
}

struct EngineState {
    triggers: Mutex<VecDeque<Result<(), String>>>,
    statuses: Mutex<VecDeque<Result<JobStatusReport, String>>>,
    trigger_calls: Mutex<u32>,
    status_calls: Mutex<u32>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineState {
                triggers: Mutex::new(VecDeque::new()),
                statuses: Mutex::new(VecDeque::new()),
                trigger_calls: Mutex::new(0),
                status_calls: Mutex::new(0),
            }),
        }
    }

    /// Queue a trigger result.
    pub fn script_trigger(&self, result: Result<(), String>) {
        self.inner.triggers.lock().unwrap().push_back(result);
    }

    /// Queue a status fetch result.
    pub fn script_status(&self, result: Result<JobStatusReport, String>) {
        self.inner.statuses.lock().unwrap().push_back(result);
    }

    pub fn trigger_calls(&self) -> u32 {
        *self.inner.trigger_calls.lock().unwrap()
    }

    pub fn status_calls(&self) -> u32 {
        *self.inner.status_calls.lock().unwrap()
    }
}

impl JobApi for FakeEngine {
    async fn trigger(&self, _job_id: &JobId) -> Result<(), EngineApiError> {
        *self.inner.trigger_calls.lock().unwrap() += 1;
        match self.inner.triggers.lock().unwrap().pop_front() {
            Some(Ok(())) | None => Ok(()),
            Some(Err(reason)) => Err(EngineApiError::Api {
                status: 500,
                body: reason,
            }),
        }
    }

    async fn fetch_status(&self, _job_id: &JobId) -> Result<JobStatusReport, EngineApiError> {
        *self.inner.status_calls.lock().unwrap() += 1;
        match self.inner.statuses.lock().unwrap().pop_front() {
            Some(Ok(report)) => Ok(report),
            Some(Err(reason)) => Err(EngineApiError::Api {
                status: 500,
                body: reason,
            }),
            None => Ok(processing(None)),
        }
    }
}

// ---- status report constructors ----

pub fn queued() -> JobStatusReport {
    JobStatusReport {
        status: RemoteStatus::Queued,
        progress: None,
        error: None,
        result_reference: None,
    }
}

pub fn processing(progress: Option<u8>) -> JobStatusReport {
    JobStatusReport {
        status: RemoteStatus::Processing,
        progress,
        error: None,
        result_reference: None,
    }
}

pub fn completed(reference: &str) -> JobStatusReport {
    JobStatusReport {
        status: RemoteStatus::Completed,
        progress: Some(100),
        error: None,
        result_reference: Some(reference.to_string()),
    }
}

pub fn completed_without_reference() -> JobStatusReport {
    JobStatusReport {
        status: RemoteStatus::Completed,
        progress: Some(100),
        error: None,
        result_reference: None,
    }
}

pub fn failed(error: &str) -> JobStatusReport {
    JobStatusReport {
        status: RemoteStatus::Failed,
        progress: None,
        error: Some(error.to_string()),
        result_reference: None,
    }
}

// ---------------------------------------------------------------------------
// Recording observer
// ---------------------------------------------------------------------------

/// One recorded callback invocation.
#[derive(Debug, Clone)]
pub enum Callback {
    Connect,
    Progress(ProgressUpdate),
    Complete(ResultRef),
    Error(SessionError),
}

/// Observer that records every callback for later assertions.
///
/// Clones share the same log; keep one clone in the test and move the
/// other into the session.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    log: Arc<Mutex<Vec<Callback>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Callback> {
        self.log.lock().unwrap().clone()
    }

    /// Percent values in delivery order.
    pub fn percents(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Callback::Progress(update) => Some(update.percent),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<ResultRef> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Callback::Complete(reference) => Some(reference),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<SessionError> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Callback::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    /// Total terminal callbacks of either kind.
    pub fn terminal_count(&self) -> usize {
        self.completions().len() + self.errors().len()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_connect(&mut self) {
        self.log.lock().unwrap().push(Callback::Connect);
    }

    fn on_progress(&mut self, update: &ProgressUpdate) {
        self.log.lock().unwrap().push(Callback::Progress(update.clone()));
    }

    fn on_complete(&mut self, result: &ResultRef) {
        self.log.lock().unwrap().push(Callback::Complete(result.clone()));
    }

    fn on_error(&mut self, error: &SessionError) {
        self.log.lock().unwrap().push(Callback::Error(error.clone()));
    }
}
