//! Callback surface through which session outcomes are delivered.

use crate::error::SessionError;
use crate::events::ProgressUpdate;
use crate::types::ResultRef;

/// Receiver for the normalized callbacks of one tracked session.
///
/// All methods run synchronously on the session task, in arrival order.
/// For a given session exactly one of [`on_complete`](Self::on_complete)
/// or [`on_error`](Self::on_error) is invoked, after which no further
/// callbacks follow. Implementations should return quickly; a slow
/// callback delays subsequent event handling for its session.
pub trait SessionObserver: Send {
    /// The push channel finished its handshake. Optional; sessions that
    /// fall back to polling may never see it.
    fn on_connect(&mut self) {}

    /// A progress snapshot. Percent is monotonic per session.
    fn on_progress(&mut self, update: &ProgressUpdate);

    /// The session resolved to a usable result reference.
    fn on_complete(&mut self, result: &ResultRef);

    /// The session ended without a result.
    fn on_error(&mut self, error: &SessionError);
}
