//! Exactly-once result resolution.
//!
//! After a terminal `completed` signal from either driver, the session
//! performs one authoritative status fetch to obtain the artifact
//! reference. A `completed` signal without a usable reference is a
//! backend inconsistency surfaced as a session failure, never as a
//! silent success.

use cityforge_core::error::SessionError;
use cityforge_core::types::{JobId, ResultRef};

use crate::api::{JobApi, RemoteStatus};

/// Fetch the authoritative result reference for a job that signalled
/// completion.
///
/// Performs exactly one status fetch. The caller must not retry: a
/// session that reaches resolution either completes with the returned
/// reference or fails with the returned error.
pub async fn resolve<A: JobApi>(api: &A, job_id: &JobId) -> Result<ResultRef, SessionError> {
    let report = match api.fetch_status(job_id).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Result fetch failed");
            return Err(SessionError::MissingResult(format!(
                "result fetch failed: {e}"
            )));
        }
    };

    // The engine can retroactively report failure for a job whose channel
    // claimed completion; the engine's verdict wins.
    if report.status == RemoteStatus::Failed {
        return Err(SessionError::RemoteFailure(report.error.unwrap_or_else(
            || "job failed without a detail message".to_string(),
        )));
    }

    match report.result_reference {
        Some(reference) if !reference.is_empty() => Ok(ResultRef::new(reference)),
        _ => Err(SessionError::MissingResult(
            "status report carried no result reference".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
