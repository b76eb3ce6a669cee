//! Engine push-channel frame types and parser.
//!
//! The engine sends JSON frames over WebSocket with a flat shape carrying
//! a `"type"` discriminator, e.g. `{"type":"progress","progress":42}`.
//! This module deserializes them into a strongly-typed [`ChannelMessage`]
//! enum.

use serde::Deserialize;

use cityforge_core::events::SessionEvent;

/// All known push-channel frame types.
///
/// Deserialized via the internally-tagged `"type"` field; the remaining
/// fields sit flat beside the tag. Unknown extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// Handshake acknowledgement from the engine. Informational only.
    Connected,

    /// Progress update with a percent and an optional human-readable note.
    Progress {
        /// Percent complete, 0-100.
        progress: u8,
        #[serde(default)]
        message: Option<String>,
    },

    /// Intermediate mesh telemetry. Surfaced as a stage hint only; it
    /// never changes the percent and never terminates the session.
    MeshUpdate {
        #[serde(default)]
        stage: Option<String>,
    },

    /// Terminal success signal. The authoritative result reference still
    /// comes from the status endpoint afterwards.
    Completed,

    /// Terminal failure signal carrying the engine's error message.
    Error { error: String },
}

/// Parse a push-channel text frame into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// treat either as a channel error so the session falls back to polling.
pub fn parse_message(text: &str) -> Result<ChannelMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Normalize a wire frame into the driver-independent event vocabulary.
///
/// A `mesh_update` without a stage label is surfaced under the frame
/// kind itself so the hint is never silently dropped.
impl From<ChannelMessage> for SessionEvent {
    fn from(msg: ChannelMessage) -> Self {
        match msg {
            ChannelMessage::Connected => SessionEvent::Connected,
            ChannelMessage::Progress { progress, message } => SessionEvent::Progress {
                percent: progress,
                message,
            },
            ChannelMessage::MeshUpdate { stage } => SessionEvent::Stage {
                label: stage.unwrap_or_else(|| "mesh_update".to_string()),
            },
            ChannelMessage::Completed => SessionEvent::Completed,
            ChannelMessage::Error { error } => SessionEvent::Failed { message: error },
        }
    }
}
