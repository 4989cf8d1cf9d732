//! Run state owned by the iteration controller.
//!
//! The attempt history is append-only and ordered by index, the retry budget
//! only ever decreases, and the terminal status is set exactly once.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::safety::SafetyVerdict;
use crate::sandbox::ExecutionOutcome;
use crate::validator::Validation;

/// What kind of problem a round's feedback describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// The code generator itself failed; the candidate was never produced.
    GenerationUnavailable,
    /// The candidate used a construct the sandbox forbids.
    UnsafeConstruct,
    /// The candidate raised, timed out, or crashed.
    ExecutionFailure,
    /// The candidate ran but assertions failed.
    AssertionFailure,
}

impl FeedbackKind {
    /// Tag used when feedback is rendered into a prompt.
    pub fn tag(&self) -> &'static str {
        match self {
            FeedbackKind::GenerationUnavailable => "generation-unavailable",
            FeedbackKind::UnsafeConstruct => "unsafe-construct",
            FeedbackKind::ExecutionFailure => "execution-failure",
            FeedbackKind::AssertionFailure => "assertion-failure",
        }
    }
}

/// Feedback derived from a round, threaded into the next generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub kind: FeedbackKind,
    pub message: String,
}

impl Feedback {
    pub fn new(kind: FeedbackKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns true if the feedback is about the candidate rather than the service.
    pub fn concerns_candidate(&self) -> bool {
        self.kind != FeedbackKind::GenerationUnavailable
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.tag(), self.message)
    }
}

/// One generate-check-execute-validate round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// 0-based position in the run.
    pub index: usize,
    /// Candidate source; absent when generation failed.
    pub source: Option<String>,
    /// Absent when generation failed.
    pub safety: Option<SafetyVerdict>,
    /// Absent unless the candidate was allowed and executed.
    pub outcome: Option<ExecutionOutcome>,
    /// Absent unless the candidate was executed.
    pub validation: Option<Validation>,
    pub feedback: Option<Feedback>,
}

impl Attempt {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            source: None,
            safety: None,
            outcome: None,
            validation: None,
            feedback: None,
        }
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    /// The attempt at this index passed validation.
    Accepted { attempt: usize },
    /// The retry budget ran out.
    Exhausted,
    /// The first candidate was unsafe.
    AbortedUnsafe,
}

impl RunStatus {
    /// Returns true for every status except `Pending`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending)
    }
}

/// State of a single run.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    run_id: Uuid,
    instruction: String,
    attempts: Vec<Attempt>,
    budget_remaining: u32,
    status: RunStatus,
}

impl RunState {
    /// Starts a pending run with a fresh id.
    pub fn new(instruction: impl Into<String>, retry_budget: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            instruction: instruction.into(),
            attempts: Vec::new(),
            budget_remaining: retry_budget,
            status: RunStatus::Pending,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Attempts in index order.
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn budget_remaining(&self) -> u32 {
        self.budget_remaining
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Index the next attempt will have.
    pub fn next_index(&self) -> usize {
        self.attempts.len()
    }

    /// The most recent attempt.
    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Source of the most recent attempt that produced one.
    pub fn last_source(&self) -> Option<&str> {
        self.attempts.iter().rev().find_map(|a| a.source.as_deref())
    }

    /// The attempt marked accepted, if any.
    pub fn accepted_attempt(&self) -> Option<&Attempt> {
        match self.status {
            RunStatus::Accepted { attempt } => self.attempts.get(attempt),
            _ => None,
        }
    }

    /// Appends a completed round and consumes one unit of budget.
    pub(crate) fn record(&mut self, mut attempt: Attempt) {
        attempt.index = self.attempts.len();
        self.attempts.push(attempt);
        self.budget_remaining = self.budget_remaining.saturating_sub(1);
    }

    /// Sets the terminal status. Later calls are ignored.
    pub(crate) fn finish(&mut self, status: RunStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            tracing::warn!(
                run_id = %self.run_id,
                current = ?self.status,
                requested = ?status,
                "ignoring status change"
            );
            return false;
        }
        self.status = status;
        true
    }
}
