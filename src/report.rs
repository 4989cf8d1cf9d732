//! Run reports and the accepted-source artifact.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::controller::{RunState, RunStatus};
use crate::error::{Error, Result};

/// Terminal status as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Accepted,
    Exhausted,
    AbortedUnsafe,
}

/// Summary emitted once a run reaches its terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: ReportStatus,
    /// Index of the accepted attempt, when accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_attempt: Option<usize>,
    pub attempt_count: usize,
    /// Accepted source, or the last candidate of an exhausted run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_source: Option<String>,
    /// Tagged feedback of the last attempt, if it produced any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_feedback: Option<String>,
}

impl RunReport {
    /// Builds the report for a finished run.
    ///
    /// A run that is still pending is reported as exhausted; the controller
    /// never does this.
    pub fn from_state(state: &RunState) -> Self {
        let (status, accepted_attempt) = match state.status() {
            RunStatus::Accepted { attempt } => (ReportStatus::Accepted, Some(attempt)),
            RunStatus::AbortedUnsafe => (ReportStatus::AbortedUnsafe, None),
            RunStatus::Exhausted | RunStatus::Pending => (ReportStatus::Exhausted, None),
        };

        let final_source = match status {
            ReportStatus::Accepted => state.accepted_attempt().and_then(|a| a.source.clone()),
            ReportStatus::Exhausted => state.last_source().map(str::to_string),
            ReportStatus::AbortedUnsafe => None,
        };

        let last = match status {
            ReportStatus::Accepted => state.accepted_attempt(),
            _ => state.last_attempt(),
        };
        let final_feedback = last.and_then(|a| a.feedback.as_ref()).map(|f| f.to_string());

        Self {
            run_id: state.run_id(),
            status,
            accepted_attempt,
            attempt_count: state.attempts().len(),
            final_source,
            final_feedback,
        }
    }

    /// Returns true if a candidate was accepted.
    pub fn is_accepted(&self) -> bool {
        self.status == ReportStatus::Accepted
    }

    /// Serializes the report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("failed to encode report: {}", e)))
    }

    /// Writes the accepted source to `path`, creating parent directories.
    ///
    /// Returns `Ok(false)` without touching the filesystem unless the run
    /// was accepted.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let source = match (&self.status, &self.final_source) {
            (ReportStatus::Accepted, Some(source)) => source,
            _ => {
                tracing::debug!(run_id = %self.run_id, status = ?self.status, "nothing to persist");
                return Ok(false);
            }
        };

        if path.as_os_str().is_empty() || path.is_dir() {
            return Err(Error::InvalidPath(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, source)?;

        tracing::info!(
            run_id = %self.run_id,
            path = ?path,
            source_bytes = source.len(),
            "accepted source written"
        );
        Ok(true)
    }
}
