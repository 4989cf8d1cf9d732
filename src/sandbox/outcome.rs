//! Execution outcome types produced by the sandbox.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why an execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The wall-clock limit was exceeded and the worker was discarded.
    Timeout,
    /// The candidate raised during compilation or execution.
    RuntimeError,
    /// The sandbox process died without reporting a result.
    Crashed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "Timeout"),
            FailureKind::RuntimeError => write!(f, "RuntimeError"),
            FailureKind::Crashed => write!(f, "Crashed"),
        }
    }
}

/// The structured result of running one candidate.
///
/// Created once by an executor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The entry point returned within the time limit.
    Success {
        stdout: String,
        return_value: Value,
    },
    /// The candidate failed; `partial_output` is whatever it printed first.
    Failure {
        kind: FailureKind,
        message: String,
        partial_output: String,
        #[serde(default)]
        stack_summary: Vec<String>,
    },
}

impl ExecutionOutcome {
    /// Builds a timeout failure.
    pub fn timeout(limit: std::time::Duration, partial_output: impl Into<String>) -> Self {
        ExecutionOutcome::Failure {
            kind: FailureKind::Timeout,
            message: format!("execution exceeded the {:.1}s time limit", limit.as_secs_f64()),
            partial_output: partial_output.into(),
            stack_summary: Vec::new(),
        }
    }

    /// Returns true for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Returns the failure kind, if this is a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Returns the return value on success.
    pub fn return_value(&self) -> Option<&Value> {
        match self {
            ExecutionOutcome::Success { return_value, .. } => Some(return_value),
            ExecutionOutcome::Failure { .. } => None,
        }
    }

    /// Returns captured stdout (partial output for failures).
    pub fn stdout(&self) -> &str {
        match self {
            ExecutionOutcome::Success { stdout, .. } => stdout,
            ExecutionOutcome::Failure { partial_output, .. } => partial_output,
        }
    }

    /// One-line description of a failure, used in feedback.
    pub fn failure_summary(&self) -> Option<String> {
        match self {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Failure {
                kind,
                message,
                stack_summary,
                ..
            } => {
                let mut summary = format!("execution failed ({}): {}", kind, message);
                if let Some(last) = stack_summary.last() {
                    summary.push_str(&format!(" at {}", last));
                }
                Some(summary)
            }
        }
    }
}
