//! Session lifecycle states and the forward-only transition rules.

/// Lifecycle state of one generation session.
///
/// Exactly one state holds at any instant. Sessions only move forward
/// through this set; `Closed` is terminal and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet started.
    Idle,
    /// Push channel attempt in flight.
    Connecting,
    /// Push channel delivering events.
    ActivePush,
    /// Poll loop delivering events (fallback, or push never connected).
    ActivePoll,
    /// Terminal success signal received; authoritative result fetch in
    /// flight.
    Resolving,
    /// Completion callback fired with a result reference.
    Completed,
    /// Error callback fired.
    Failed,
    /// Torn down. No further callbacks fire.
    Closed,
}

impl SessionState {
    /// String representation for log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::ActivePush => "active_push",
            SessionState::ActivePoll => "active_poll",
            SessionState::Resolving => "resolving",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        }
    }

    /// Whether no further driver events are expected in this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Closed
        )
    }

    /// Whether a direct transition `self -> next` is allowed.
    ///
    /// Teardown (`Closed`) is reachable from everywhere; failure is
    /// reachable from every non-terminal state; the remaining edges follow
    /// the push-then-poll lifecycle. Backward edges are never allowed.
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Idle, Connecting) => true,
            (Connecting, ActivePush | ActivePoll) => true,
            (ActivePush, ActivePoll | Resolving) => true,
            (ActivePoll, Resolving) => true,
            (Resolving, Completed) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
