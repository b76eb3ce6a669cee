//! Polling fallback policy.
//!
//! Pure mapping from engine status reports to normalized
//! [`SessionEvent`]s, plus the consecutive-failure cutoff that stops a
//! stalled loop. The orchestrator in [`crate::session`] owns the
//! interval timer and applies these to the session record.

use cityforge_core::events::SessionEvent;
use cityforge_core::progress::{
    poll_progress, MAX_CONSECUTIVE_POLL_FAILURES, QUEUED_PROGRESS_PERCENT,
};

use crate::api::{JobStatusReport, RemoteStatus};

// ---------------------------------------------------------------------------
// Report mapping
// ---------------------------------------------------------------------------

/// Map one status report to a normalized session event.
///
/// `poll_count` is the number of polls completed before this one; it
/// drives the estimated ramp for `processing` reports, folded with any
/// percent the engine reports itself. The ramp stays below 100 so
/// completion is only ever claimed when the engine says so.
pub fn map_report(report: &JobStatusReport, poll_count: u32) -> SessionEvent {
    match report.status {
        RemoteStatus::Queued => SessionEvent::Progress {
            percent: QUEUED_PROGRESS_PERCENT,
            message: Some("Queued".to_string()),
        },
        RemoteStatus::Processing => SessionEvent::Progress {
            percent: poll_progress(poll_count, report.progress),
            message: None,
        },
        RemoteStatus::Completed => SessionEvent::Completed,
        RemoteStatus::Failed => SessionEvent::Failed {
            message: report
                .error
                .clone()
                .unwrap_or_else(|| "job failed without a detail message".to_string()),
        },
    }
}

// ---------------------------------------------------------------------------
// Failure tally
// ---------------------------------------------------------------------------

/// Consecutive hard-failure counter for the poll loop.
///
/// Individual poll failures are tolerated (the job may still be running
/// while the status endpoint hiccups); only an unbroken run of
/// [`MAX_CONSECUTIVE_POLL_FAILURES`] failures declares the loop stalled.
#[derive(Debug, Default)]
pub struct PollFailureTally {
    consecutive: u32,
}

impl PollFailureTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed poll. Returns `true` when the cutoff is reached.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= MAX_CONSECUTIVE_POLL_FAILURES
    }

    /// Record a successful poll, breaking any failure run.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Current unbroken failure run length.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
