//! Sandbox module for executing untrusted candidates.
//!
//! This module provides the [`Executor`] trait for running a candidate once
//! under a time limit, and the [`PythonSandbox`] implementation that hosts
//! candidates in an isolated interpreter behind a single controlled entry
//! point. Nothing else in the crate evaluates generated text.

mod capabilities;
mod executor;
mod harness;
mod outcome;

pub use capabilities::{Capabilities, DEFAULT_BUILTINS, DEFAULT_MODULES};
pub use executor::{Executor, Invocation, PythonSandbox, DEFAULT_MAX_OUTPUT_BYTES};
pub use outcome::{ExecutionOutcome, FailureKind};
