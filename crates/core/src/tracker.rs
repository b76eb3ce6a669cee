//! Per-session mutable record enforcing the data-model invariants.
//!
//! [`SessionTracker`] is the single place where progress monotonicity,
//! forward-only state transitions, and at-most-once terminal delivery are
//! enforced. The orchestrator in `cityforge-session` owns one tracker per
//! session and consults its return values before invoking any observer
//! callback.

use chrono::Utc;

use crate::events::ProgressUpdate;
use crate::progress::clamp_percent;
use crate::state::SessionState;
use crate::types::{JobId, ResultRef, Timestamp};

/// Mutable state of one tracked generation session.
#[derive(Debug)]
pub struct SessionTracker {
    job_id: JobId,
    state: SessionState,
    progress_percent: u8,
    last_message: Option<String>,
    last_stage: Option<String>,
    result_reference: Option<ResultRef>,
    started_at: Timestamp,
    deadline_at: Timestamp,
    terminal_delivered: bool,
}

impl SessionTracker {
    /// Create a tracker in `Idle` with its deadline fixed at
    /// `now + timeout_secs`.
    pub fn new(job_id: JobId, timeout_secs: u64) -> Self {
        let started_at = Utc::now();
        let deadline_at = started_at + chrono::Duration::seconds(timeout_secs as i64);
        Self {
            job_id,
            state: SessionState::Idle,
            progress_percent: 0,
            last_message: None,
            last_stage: None,
            result_reference: None,
            started_at,
            deadline_at,
            terminal_delivered: false,
        }
    }

    // ---- accessors ----

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn last_stage(&self) -> Option<&str> {
        self.last_stage.as_deref()
    }

    pub fn result_reference(&self) -> Option<&ResultRef> {
        self.result_reference.as_ref()
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn deadline_at(&self) -> Timestamp {
        self.deadline_at
    }

    /// Whether a terminal callback (completion or error) has been handed
    /// out already.
    pub fn terminal_delivered(&self) -> bool {
        self.terminal_delivered
    }

    // ---- mutations ----

    /// Attempt a state transition. Returns `false` and leaves the state
    /// unchanged when the edge is not allowed.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition(next) {
            return false;
        }
        self.state = next;
        true
    }

    /// Fold a progress event in and return the update to deliver.
    ///
    /// The percent is clamped to 0-100 and never decreases: a regressing
    /// value is a no-op on the number while the message still refreshes.
    /// An event without a message keeps the previous one.
    pub fn apply_progress(&mut self, percent: u8, message: Option<String>) -> ProgressUpdate {
        let clamped = clamp_percent(percent).max(self.progress_percent);
        self.progress_percent = clamped;
        if message.is_some() {
            self.last_message = message;
        }
        self.snapshot()
    }

    /// Record a telemetry stage hint. The percent is left untouched.
    pub fn apply_stage(&mut self, label: String) -> ProgressUpdate {
        self.last_stage = Some(label);
        self.snapshot()
    }

    /// Record terminal success. Returns `true` exactly once, and only from
    /// `Resolving`; the completion callback may fire iff this returns
    /// `true`, which is also the only path that sets the result reference.
    pub fn complete(&mut self, result: ResultRef) -> bool {
        if self.terminal_delivered || !self.transition(SessionState::Completed) {
            return false;
        }
        self.terminal_delivered = true;
        self.result_reference = Some(result);
        true
    }

    /// Record terminal failure. Returns `true` exactly once, from any
    /// non-terminal state; the error callback may fire iff this returns
    /// `true`.
    pub fn fail(&mut self) -> bool {
        if self.terminal_delivered || !self.transition(SessionState::Failed) {
            return false;
        }
        self.terminal_delivered = true;
        true
    }

    /// Enter the absorbing `Closed` state. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.transition(SessionState::Closed);
        }
    }

    fn snapshot(&self) -> ProgressUpdate {
        ProgressUpdate {
            percent: self.progress_percent,
            message: self.last_message.clone(),
            stage: self.last_stage.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> SessionTracker {
        SessionTracker::new(JobId::from("job-1"), 300)
    }

    fn active_tracker() -> SessionTracker {
        let mut t = tracker();
        assert!(t.transition(SessionState::Connecting));
        assert!(t.transition(SessionState::ActivePush));
        t
    }

    // -- construction --

    #[test]
    fn starts_idle_with_zero_progress() {
        let t = tracker();
        assert_eq!(t.state(), SessionState::Idle);
        assert_eq!(t.progress_percent(), 0);
        assert!(t.last_message().is_none());
        assert!(t.result_reference().is_none());
        assert!(!t.terminal_delivered());
    }

    #[test]
    fn deadline_is_started_at_plus_timeout() {
        let t = SessionTracker::new(JobId::from("job-1"), 300);
        let delta = t.deadline_at() - t.started_at();
        assert_eq!(delta.num_seconds(), 300);
    }

    // -- transitions --

    #[test]
    fn invalid_transition_leaves_state_unchanged() {
        let mut t = tracker();
        assert!(!t.transition(SessionState::Resolving));
        assert_eq!(t.state(), SessionState::Idle);
    }

    // -- progress --

    #[test]
    fn progress_updates_percent_and_message() {
        let mut t = active_tracker();
        let update = t.apply_progress(40, Some("meshing".to_string()));
        assert_eq!(update.percent, 40);
        assert_eq!(update.message.as_deref(), Some("meshing"));
        assert_eq!(t.progress_percent(), 40);
    }

    #[test]
    fn progress_regression_is_a_no_op_on_the_percent() {
        let mut t = active_tracker();
        t.apply_progress(60, None);
        let update = t.apply_progress(30, Some("still going".to_string()));
        assert_eq!(update.percent, 60, "percent must not decrease");
        assert_eq!(update.message.as_deref(), Some("still going"));
    }

    #[test]
    fn progress_without_message_keeps_previous_text() {
        let mut t = active_tracker();
        t.apply_progress(10, Some("texturing".to_string()));
        let update = t.apply_progress(20, None);
        assert_eq!(update.message.as_deref(), Some("texturing"));
    }

    #[test]
    fn wire_percent_above_100_is_clamped() {
        let mut t = active_tracker();
        let update = t.apply_progress(180, None);
        assert_eq!(update.percent, 100);
    }

    #[test]
    fn stage_hint_never_touches_the_percent() {
        let mut t = active_tracker();
        t.apply_progress(50, Some("building".to_string()));
        let update = t.apply_stage("mesh_update".to_string());
        assert_eq!(update.percent, 50);
        assert_eq!(update.stage.as_deref(), Some("mesh_update"));
        assert_eq!(update.message.as_deref(), Some("building"));
    }

    // -- terminal delivery --

    #[test]
    fn complete_fires_once_and_sets_the_reference() {
        let mut t = active_tracker();
        assert!(t.transition(SessionState::Resolving));
        assert!(t.complete(ResultRef::from("r1")));
        assert_eq!(t.state(), SessionState::Completed);
        assert_eq!(t.result_reference().map(ResultRef::as_str), Some("r1"));

        // A second terminal of either kind is refused.
        assert!(!t.complete(ResultRef::from("r2")));
        assert!(!t.fail());
        assert_eq!(t.result_reference().map(ResultRef::as_str), Some("r1"));
    }

    #[test]
    fn complete_outside_resolving_is_refused() {
        let mut t = active_tracker();
        assert!(!t.complete(ResultRef::from("r1")));
        assert!(t.result_reference().is_none());
        assert!(!t.terminal_delivered());
    }

    #[test]
    fn fail_fires_once_from_any_active_state() {
        let mut t = active_tracker();
        assert!(t.fail());
        assert_eq!(t.state(), SessionState::Failed);
        assert!(!t.fail(), "second failure must not fire a callback");
    }

    #[test]
    fn fail_after_complete_is_refused() {
        let mut t = active_tracker();
        assert!(t.transition(SessionState::Resolving));
        assert!(t.complete(ResultRef::from("r1")));
        assert!(!t.fail());
        assert_eq!(t.state(), SessionState::Completed);
    }

    // -- close --

    #[test]
    fn close_is_idempotent() {
        let mut t = active_tracker();
        t.close();
        assert_eq!(t.state(), SessionState::Closed);
        t.close();
        assert_eq!(t.state(), SessionState::Closed);
    }

    #[test]
    fn nothing_fires_after_close() {
        let mut t = active_tracker();
        t.close();
        assert!(!t.fail());
        assert!(!t.complete(ResultRef::from("r1")));
        assert!(!t.transition(SessionState::ActivePoll));
    }
}
