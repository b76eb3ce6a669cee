//! WebSocket push channel to the engine.
//!
//! [`WsChannel`] establishes the per-job WebSocket connection;
//! [`next_signal`] reads raw frames off an established channel and
//! normalizes them into [`PushSignal`]s for the session orchestrator.
//! Every way the channel can degrade (close, receive error, decode
//! failure) surfaces as a single [`PushSignal::Lost`] shape so the
//! orchestrator can fall back to polling without distinguishing causes.

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use cityforge_core::types::JobId;

use crate::messages::{parse_message, ChannelMessage};

/// Errors that can occur on the push channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The channel closed before a terminal event arrived.
    #[error("Channel closed: {0}")]
    Closed(String),

    /// A transport-level error on an established connection.
    #[error("Receive error: {0}")]
    Receive(String),

    /// An inbound frame could not be parsed.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// One normalized signal read off the push channel.
#[derive(Debug)]
pub enum PushSignal {
    /// A well-formed engine frame.
    Event(ChannelMessage),
    /// The channel is no longer usable; the session should fall back.
    Lost(ChannelError),
}

/// Transport seam for establishing a per-job push channel.
///
/// Implemented by [`WsChannel`] against the real engine; tests substitute
/// an implementation yielding scripted frames.
pub trait ChannelConnector: Send + Sync {
    /// Frame stream produced by a successful connect.
    type Frames: Stream<Item = Result<Message, tungstenite::Error>> + Send + Unpin;

    /// Open the push channel for one job.
    fn connect(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<Self::Frames, ChannelError>> + Send;
}

/// WebSocket connector for a single engine instance.
pub struct WsChannel {
    ws_url: String,
}

impl WsChannel {
    /// Create a connector targeting an engine instance.
    ///
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:9040`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// WebSocket base URL (e.g. `ws://host:9040`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }
}

impl ChannelConnector for WsChannel {
    type Frames = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    /// Connect to the engine's per-job WebSocket endpoint.
    ///
    /// Generates a unique `clientId` (UUID v4) and appends it as a query
    /// parameter so the engine can address frames back to this specific
    /// watcher.
    async fn connect(&self, job_id: &JobId) -> Result<Self::Frames, ChannelError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/ws/jobs/{}?clientId={}", self.ws_url, job_id, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ChannelError::Connection(format!(
                "Failed to connect to engine at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            job_id = %job_id,
            client_id = %client_id,
            "Connected to engine channel at {}",
            self.ws_url,
        );

        Ok(ws_stream)
    }
}

/// Read the next meaningful signal from an established channel.
///
/// Skips frames that carry no session information (binary previews,
/// ping/pong). Returns [`PushSignal::Lost`] when the stream errors,
/// closes, ends, or yields an unparseable text frame; after a `Lost`
/// the stream must not be read again.
pub async fn next_signal<S>(frames: &mut S, job_id: &JobId) -> PushSignal
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match frames.next().await {
            Some(Ok(Message::Text(text))) => match parse_message(&text) {
                Ok(msg) => return PushSignal::Event(msg),
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        error = %e,
                        raw_frame = %text,
                        "Failed to parse engine frame",
                    );
                    return PushSignal::Lost(ChannelError::Decode(e.to_string()));
                }
            },
            Some(Ok(Message::Binary(_))) => {
                // The engine streams binary mesh previews on the same socket.
                tracing::trace!(job_id = %job_id, "Ignoring binary frame (mesh preview)");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(job_id = %job_id, ?frame, "Engine channel closed");
                return PushSignal::Lost(ChannelError::Closed(
                    "closed by the engine".to_string(),
                ));
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(job_id = %job_id, error = %e, "Channel receive error");
                return PushSignal::Lost(ChannelError::Receive(e.to_string()));
            }
            None => {
                return PushSignal::Lost(ChannelError::Closed(
                    "stream ended without a close frame".to_string(),
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
