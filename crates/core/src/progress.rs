//! Progress display policy and session tunables.
//!
//! The poll-side percentages are client-side estimates, not engine truth:
//! the status endpoint only distinguishes queued/processing, so the ramp
//! below exists purely to keep a progress bar moving. Nothing may assume
//! the estimate and an engine-reported percent are ever equal.

// ---------------------------------------------------------------------------
// Tunables
// ---------------------------------------------------------------------------

/// Seconds between poll attempts.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

/// Hard ceiling on total session duration, in seconds.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;

/// Synthetic percent emitted right after the push channel attaches, before
/// the first real frame arrives.
pub const INITIAL_PROGRESS_PERCENT: u8 = 5;

/// Percent shown while the engine still has the job queued.
pub const QUEUED_PROGRESS_PERCENT: u8 = 10;

/// Starting percent of the processing-state estimate ramp.
pub const POLL_PROGRESS_BASE: u8 = 20;

/// Percent added per successful processing poll.
pub const POLL_PROGRESS_STEP: u8 = 10;

/// The estimate never claims more than this before the engine itself
/// confirms completion.
pub const POLL_PROGRESS_CEILING: u8 = 90;

/// Consecutive hard poll failures tolerated before the loop gives up.
pub const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 5;

// ---------------------------------------------------------------------------
// Policy functions
// ---------------------------------------------------------------------------

/// Clamp a wire-supplied percent into the displayable 0-100 range.
pub fn clamp_percent(percent: u8) -> u8 {
    percent.min(100)
}

/// Estimate display progress for a processing job after `poll_count`
/// completed processing polls: `min(90, 20 + poll_count * 10)`.
pub fn estimate_poll_progress(poll_count: u32) -> u8 {
    let ramp = u32::from(POLL_PROGRESS_BASE)
        .saturating_add(poll_count.saturating_mul(u32::from(POLL_PROGRESS_STEP)));
    ramp.min(u32::from(POLL_PROGRESS_CEILING)) as u8
}

/// Combine the ramp estimate with an engine-reported percent, when the
/// status document carries one. The larger of the two wins so a real number
/// never displays lower than a client guess, and the ceiling still applies
/// until the engine confirms completion.
pub fn poll_progress(poll_count: u32, reported: Option<u8>) -> u8 {
    let estimate = estimate_poll_progress(poll_count);
    match reported {
        Some(percent) => estimate.max(clamp_percent(percent).min(POLL_PROGRESS_CEILING)),
        None => estimate,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
