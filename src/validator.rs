//! Assertion engine for execution outcomes.
//!
//! An assertion is a named predicate over `(instruction, outcome)`. The
//! validator runs every assertion (no short-circuiting) so the feedback for a
//! failed round is as informative as possible.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sandbox::{ExecutionOutcome, Invocation};

/// Whether a failed assertion is a hard requirement or a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionKind {
    /// Must pass for the attempt to be accepted.
    #[default]
    Assert,
    /// Desired; whether it blocks acceptance depends on the [`SuggestionPolicy`].
    Suggest,
}

/// How failed `Suggest` assertions are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionPolicy {
    /// Suggestions block acceptance and are retried like assertions.
    #[default]
    Retry,
    /// Suggestions never block acceptance; their messages are reported only.
    Advisory,
}

/// What part of the outcome an assertion reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    /// The whole outcome, success or failure.
    Outcome,
    /// The return value; fails automatically when execution failed.
    ReturnValue,
    /// Captured stdout; fails automatically when execution failed.
    Stdout,
}

/// Result of a single predicate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub passed: bool,
    pub message: String,
}

impl Check {
    /// A passing check.
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: String::new(),
        }
    }

    /// A failing check with an explanation.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

type Predicate = Arc<dyn Fn(&str, &ExecutionOutcome) -> Check + Send + Sync>;

/// A named predicate over an execution outcome.
#[derive(Clone)]
pub struct Assertion {
    name: String,
    kind: AssertionKind,
    dependency: Dependency,
    predicate: Predicate,
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assertion")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("dependency", &self.dependency)
            .finish_non_exhaustive()
    }
}

impl Assertion {
    /// Assertion over the whole outcome.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str, &ExecutionOutcome) -> Check + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: AssertionKind::Assert,
            dependency: Dependency::Outcome,
            predicate: Arc::new(predicate),
        }
    }

    /// Assertion over the return value of a successful run.
    pub fn on_return_value<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str, &Value) -> Check + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: AssertionKind::Assert,
            dependency: Dependency::ReturnValue,
            predicate: Arc::new(move |instruction: &str, outcome: &ExecutionOutcome| {
                match outcome.return_value() {
                    Some(value) => predicate(instruction, value),
                    None => Check::fail("no return value"),
                }
            }),
        }
    }

    /// Assertion over the stdout of a successful run.
    pub fn on_stdout<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str, &str) -> Check + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: AssertionKind::Assert,
            dependency: Dependency::Stdout,
            predicate: Arc::new(move |instruction: &str, outcome: &ExecutionOutcome| {
                predicate(instruction, outcome.stdout())
            }),
        }
    }

    /// Marks this assertion as a suggestion.
    pub fn suggest(mut self) -> Self {
        self.kind = AssertionKind::Suggest;
        self
    }

    /// Sets the assertion kind.
    pub fn with_kind(mut self, kind: AssertionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the assertion name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the assertion kind.
    pub fn kind(&self) -> AssertionKind {
        self.kind
    }

    /// Returns what the assertion reads.
    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    fn evaluate(&self, instruction: &str, outcome: &ExecutionOutcome) -> Check {
        if self.dependency != Dependency::Outcome {
            if let Some(summary) = outcome.failure_summary() {
                return Check::fail(summary);
            }
        }

        match catch_unwind(AssertUnwindSafe(|| (self.predicate)(instruction, outcome))) {
            Ok(check) => check,
            Err(_) => {
                tracing::warn!(assertion = %self.name, "assertion predicate panicked");
                Check::fail(format!("assertion '{}' could not be evaluated", self.name))
            }
        }
    }
}

/// Ordered set of assertions, evaluated in declaration order.
#[derive(Debug, Clone, Default)]
pub struct AssertionSet {
    assertions: Vec<Assertion>,
}

impl AssertionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an assertion.
    pub fn with(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Appends an assertion in place.
    pub fn push(&mut self, assertion: Assertion) {
        self.assertions.push(assertion);
    }

    /// Number of assertions.
    pub fn len(&self) -> usize {
        self.assertions.len()
    }

    /// Returns true if there are no assertions.
    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }

    /// Iterates in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Assertion> {
        self.assertions.iter()
    }
}

impl FromIterator<Assertion> for AssertionSet {
    fn from_iter<I: IntoIterator<Item = Assertion>>(iter: I) -> Self {
        Self {
            assertions: iter.into_iter().collect(),
        }
    }
}

/// Result of one assertion against one outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub name: String,
    pub kind: AssertionKind,
    pub dependency: Dependency,
    pub passed: bool,
    pub message: String,
}

/// Results of validating one outcome against an assertion set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// Per-assertion results in declaration order.
    pub results: Vec<AssertionResult>,
    /// True iff every assertion passed (or, with no assertions, execution succeeded).
    pub overall_passed: bool,
    /// Summary of the execution failure, if the run failed.
    pub execution_failure: Option<String>,
}

impl Validation {
    /// Looks up a result by assertion name.
    pub fn get(&self, name: &str) -> Option<&AssertionResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Failed results in declaration order.
    pub fn failures(&self) -> impl Iterator<Item = &AssertionResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// Returns true if the attempt is acceptable under `policy`.
    pub fn accepts(&self, policy: SuggestionPolicy) -> bool {
        match policy {
            SuggestionPolicy::Retry => self.overall_passed,
            SuggestionPolicy::Advisory => {
                if self.overall_passed {
                    return true;
                }
                if self.results.is_empty() || !self.run_accepted() {
                    return false;
                }
                self.failures().all(|r| r.kind == AssertionKind::Suggest)
            }
        }
    }

    /// A run that raised only counts when a blocking whole-outcome assertion
    /// (such as `raises`) passed on it.
    fn run_accepted(&self) -> bool {
        self.execution_failure.is_none()
            || self.results.iter().any(|r| {
                r.passed && r.kind == AssertionKind::Assert && r.dependency == Dependency::Outcome
            })
    }

    /// Feedback text: failed messages in declaration order, deduplicated.
    ///
    /// Falls back to the execution failure when no assertion failed.
    pub fn feedback(&self) -> Option<String> {
        let mut seen: Vec<&str> = Vec::new();
        for result in self.failures() {
            if !seen.contains(&result.message.as_str()) {
                seen.push(&result.message);
            }
        }

        if seen.is_empty() {
            if self.overall_passed {
                return None;
            }
            return self.execution_failure.clone();
        }
        Some(seen.join("\n"))
    }
}

/// Runs assertion sets against execution outcomes.
pub struct Validator;

impl Validator {
    /// Validates an outcome against every assertion in the set.
    pub fn validate(
        instruction: &str,
        outcome: &ExecutionOutcome,
        assertions: &AssertionSet,
    ) -> Validation {
        let results: Vec<AssertionResult> = assertions
            .iter()
            .map(|assertion| {
                let check = assertion.evaluate(instruction, outcome);
                AssertionResult {
                    name: assertion.name.clone(),
                    kind: assertion.kind,
                    dependency: assertion.dependency,
                    passed: check.passed,
                    message: check.message,
                }
            })
            .collect();

        let overall_passed = if results.is_empty() {
            outcome.is_success()
        } else {
            results.iter().all(|r| r.passed)
        };

        Validation {
            results,
            overall_passed,
            execution_failure: outcome.failure_summary(),
        }
    }
}

/// Declarative check, loadable from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckSpec {
    /// The entry point returns `value`.
    Returns { value: Value },
    /// Stdout contains `text`.
    StdoutContains { text: String },
    /// Stdout equals `text`, ignoring trailing whitespace.
    StdoutEquals { text: String },
    /// The run raises `exception`.
    Raises { exception: String },
    /// The run completes without raising.
    Succeeds,
}

/// Declarative assertion, loadable from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionSpec {
    pub name: String,
    #[serde(default)]
    pub kind: AssertionKind,
    pub check: CheckSpec,
}

impl AssertionSpec {
    /// Builds the executable assertion for the given invocation.
    pub fn to_assertion(&self, invocation: &Invocation) -> Assertion {
        let call = invocation.to_string();
        let assertion = match self.check.clone() {
            CheckSpec::Returns { value } => {
                Assertion::on_return_value(&self.name, move |_, actual| {
                    if values_match(&value, actual) {
                        Check::pass()
                    } else {
                        Check::fail(format!(
                            "expected {} to return {}, got {}",
                            call, value, actual
                        ))
                    }
                })
            }
            CheckSpec::StdoutContains { text } => Assertion::on_stdout(&self.name, move |_, stdout| {
                if stdout.contains(&text) {
                    Check::pass()
                } else {
                    Check::fail(format!(
                        "expected stdout to contain {:?}, got {:?}",
                        text,
                        clip(stdout)
                    ))
                }
            }),
            CheckSpec::StdoutEquals { text } => Assertion::on_stdout(&self.name, move |_, stdout| {
                if stdout.trim_end() == text.trim_end() {
                    Check::pass()
                } else {
                    Check::fail(format!(
                        "expected stdout to equal {:?}, got {:?}",
                        text,
                        clip(stdout)
                    ))
                }
            }),
            CheckSpec::Raises { exception } => Assertion::new(&self.name, move |_, outcome| {
                match outcome {
                    ExecutionOutcome::Success { return_value, .. } => Check::fail(format!(
                        "expected {} to raise {}, but it returned {}",
                        call, exception, return_value
                    )),
                    ExecutionOutcome::Failure { message, .. }
                        if message == &exception
                            || message.starts_with(&format!("{}:", exception)) =>
                    {
                        Check::pass()
                    }
                    ExecutionOutcome::Failure { .. } => Check::fail(format!(
                        "expected {} to raise {}, but {}",
                        call,
                        exception,
                        outcome.failure_summary().unwrap_or_default()
                    )),
                }
            }),
            CheckSpec::Succeeds => Assertion::new(&self.name, |_, outcome| {
                match outcome.failure_summary() {
                    None => Check::pass(),
                    Some(summary) => Check::fail(summary),
                }
            }),
        };
        assertion.with_kind(self.kind)
    }
}

/// Builds an assertion set from declarative specs.
pub fn assertions_from_specs(specs: &[AssertionSpec], invocation: &Invocation) -> AssertionSet {
    specs.iter().map(|spec| spec.to_assertion(invocation)).collect()
}

fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected.as_f64(), actual.as_f64()) {
        (Some(a), Some(b)) if expected.is_number() && actual.is_number() => {
            (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0)
        }
        _ => expected == actual,
    }
}

fn clip(text: &str) -> String {
    const LIMIT: usize = 200;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
