//! Error types for the iterative programmer.
//!
//! Only infrastructure faults live here. Anything a generated candidate does
//! wrong is reported as a value (`ExecutionOutcome::Failure`, a failed
//! assertion, a denied safety verdict), never as an `Error`.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for synthesis runs.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration is missing, malformed, or fails validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error outside of candidate execution.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The sandbox interpreter could not be started or broke its protocol.
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// The code generator collaborator is misconfigured.
    #[error("code generator error: {0}")]
    Generator(String),

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A concurrently executing run panicked or was cancelled.
    #[error("run task failed: {0}")]
    Task(String),

    /// The artifact path is not usable.
    #[error("invalid artifact path: {0}")]
    InvalidPath(PathBuf),
}

/// Result type alias for synthesis operations.
pub type Result<T> = std::result::Result<T, Error>;
