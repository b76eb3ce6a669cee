//! Session-level error kinds surfaced through the observer contract.

/// A terminal (or internally recoverable) session failure.
///
/// Every kind carries a human-readable message via `Display`. The channel
/// kinds are recoverable locally: the orchestrator falls back to polling
/// and only logs them, so under normal operation they never reach the
/// caller's error callback. All other kinds are terminal and always
/// surfaced, exactly once.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The push channel could not be established.
    #[error("Channel establishment failed: {0}")]
    ChannelEstablishment(String),

    /// An inbound frame could not be decoded, or the channel broke
    /// mid-stream.
    #[error("Channel decode failed: {0}")]
    ChannelDecode(String),

    /// The job-start trigger request was rejected.
    #[error("Job trigger failed: {0}")]
    Trigger(String),

    /// The engine explicitly reported the job as failed.
    #[error("Generation failed: {0}")]
    RemoteFailure(String),

    /// The engine reported completion but no usable result reference could
    /// be obtained.
    #[error("Generation completed without a usable result reference: {0}")]
    MissingResult(String),

    /// The session deadline elapsed before a terminal signal arrived.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),
}

impl SessionError {
    /// Short kind tag for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::ChannelEstablishment(_) => "channel_establishment",
            SessionError::ChannelDecode(_) => "channel_decode",
            SessionError::Trigger(_) => "trigger",
            SessionError::RemoteFailure(_) => "remote_failure",
            SessionError::MissingResult(_) => "missing_result",
            SessionError::Timeout(_) => "timeout",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
