//! Iterative Programmer - LLM code synthesis with sandboxed execution
//!
//! This library drives a synthesis-and-repair loop: a code generator proposes
//! candidate source for a natural-language instruction, a static safety check
//! rejects forbidden constructs, an isolated interpreter runs the candidate,
//! and assertions decide whether to accept it or retry with feedback.

pub mod backoff;
pub mod config;
pub mod controller;
pub mod error;
pub mod generator;
pub mod prompt;
pub mod report;
pub mod safety;
pub mod sandbox;
pub mod validator;

pub use error::{Error, Result};

pub use backoff::ExponentialBackoff;
pub use config::{
    GeneratorConfig, ProgrammerConfig, SandboxConfig, Validate, ValidationResult,
    DANGEROUS_BUILTINS, DANGEROUS_MODULES, MAX_TIME_LIMIT_SECS,
};
pub use controller::{
    Attempt, BatchJob, CompletedRun, ControllerConfig, Feedback, FeedbackKind,
    IterationController, RunState, RunStatus,
};
pub use generator::{CodeGenerator, CommandGenerator, GenerationError, GenerationRequest};
pub use prompt::{build_prompt, extract_code};
pub use report::{ReportStatus, RunReport};
pub use safety::{ConstructCategory, SafetyAnalyzer, SafetyVerdict};
pub use sandbox::{
    Capabilities, ExecutionOutcome, Executor, FailureKind, Invocation, PythonSandbox,
    DEFAULT_BUILTINS, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MODULES,
};
pub use validator::{
    assertions_from_specs, Assertion, AssertionKind, AssertionResult, AssertionSet,
    AssertionSpec, Check, CheckSpec, Dependency, SuggestionPolicy, Validation, Validator,
};
