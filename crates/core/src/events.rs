//! Normalized session events.
//!
//! Both drivers (push channel and poll loop) translate their raw signals
//! into [`SessionEvent`] values, so the orchestrator only ever handles one
//! vocabulary regardless of the transport in use.

/// A normalized event emitted by the active driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The push channel reported that it is attached to the job.
    /// Informational only; polling sessions never produce it.
    Connected,

    /// Forward progress with an optional human-readable status text.
    Progress {
        /// Completion percentage (0-100).
        percent: u8,
        message: Option<String>,
    },

    /// Telemetry stage hint (mesh updates and similar). Never terminal and
    /// never changes the numeric percentage on its own.
    Stage { label: String },

    /// Terminal success signal. The result resolver still owns the
    /// authoritative fetch of the artifact reference.
    Completed,

    /// Terminal failure with the remote-supplied message.
    Failed { message: String },
}

/// Progress snapshot delivered to the observer.
///
/// Carries the session's sticky state: `message` and `stage` keep their
/// last-seen values when an event does not update them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Completion percentage (0-100), monotonically non-decreasing.
    pub percent: u8,
    /// Last human-readable status text received.
    pub message: Option<String>,
    /// Last telemetry stage hint received.
    pub stage: Option<String>,
}
