//! Code generator collaborators.
//!
//! A generator turns an instruction (plus feedback from the previous round)
//! into candidate source text. It owns its own timeout and retry policy; the
//! iteration controller only distinguishes "the service failed" from "the
//! service is misconfigured".

mod command;

pub use command::CommandGenerator;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::controller::Feedback;
use crate::sandbox::Invocation;

/// Failure of the generator collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Upstream call failed or timed out. Retried by the controller.
    #[error("generation unavailable: {0}")]
    Unavailable(String),

    /// The generator cannot work as configured. Fatal for the run.
    #[error("generator misconfigured: {0}")]
    Misconfigured(String),
}

/// Everything a generator needs for one round.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub run_id: Uuid,
    pub attempt: usize,
    pub instruction: String,
    /// How the candidate will be called.
    pub invocation: Invocation,
    /// Modules the candidate may import.
    pub allowed_modules: Vec<String>,
    /// Source of the previous round, if one was produced.
    pub previous_source: Option<String>,
    /// Feedback from the previous round; `None` on round 0.
    pub feedback: Option<Feedback>,
}

impl GenerationRequest {
    /// Creates a first-round request.
    pub fn new(instruction: impl Into<String>, invocation: Invocation) -> Self {
        Self {
            run_id: Uuid::nil(),
            attempt: 0,
            instruction: instruction.into(),
            invocation,
            allowed_modules: Vec::new(),
            previous_source: None,
            feedback: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_attempt(mut self, attempt: usize) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_allowed_modules(mut self, modules: impl IntoIterator<Item = String>) -> Self {
        self.allowed_modules = modules.into_iter().collect();
        self
    }

    pub fn with_previous_source(mut self, source: Option<String>) -> Self {
        self.previous_source = source;
        self
    }

    pub fn with_feedback(mut self, feedback: Option<Feedback>) -> Self {
        self.feedback = feedback;
        self
    }
}

/// Trait for code generators.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Produces candidate source for the request.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Returns the name of this generator.
    fn name(&self) -> &str;
}
