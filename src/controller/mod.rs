//! The iteration controller: generate, check, execute, validate, decide.
//!
//! Each run owns its own [`RunState`]. Rounds are strictly sequential because
//! every generation request depends on the previous round's feedback, while
//! independent runs can proceed concurrently via [`IterationController::run_batch`].

mod state;

pub use state::{Attempt, Feedback, FeedbackKind, RunState, RunStatus};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::ProgrammerConfig;
use crate::error::{Error, Result};
use crate::generator::{CodeGenerator, GenerationError, GenerationRequest};
use crate::report::RunReport;
use crate::safety::{SafetyAnalyzer, SafetyVerdict};
use crate::sandbox::{Executor, Invocation};
use crate::validator::{AssertionSet, SuggestionPolicy, Validator};

/// Settings the controller needs for every run.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub retry_budget: u32,
    pub time_limit: Duration,
    pub suggestion_policy: SuggestionPolicy,
    pub invocation: Invocation,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&ProgrammerConfig::default())
    }
}

impl From<&ProgrammerConfig> for ControllerConfig {
    fn from(config: &ProgrammerConfig) -> Self {
        Self {
            retry_budget: config.retry_budget,
            time_limit: config.time_limit(),
            suggestion_policy: config.suggestion_policy,
            invocation: config.invocation.clone(),
        }
    }
}

impl ControllerConfig {
    /// Creates a config for the given invocation with default limits.
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            ..Self::default()
        }
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_suggestion_policy(mut self, policy: SuggestionPolicy) -> Self {
        self.suggestion_policy = policy;
        self
    }
}

/// A finished run: the report plus the full attempt history.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub report: RunReport,
    pub state: RunState,
}

/// One independent run for [`IterationController::run_batch`].
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub instruction: String,
    pub assertions: AssertionSet,
}

impl BatchJob {
    pub fn new(instruction: impl Into<String>, assertions: AssertionSet) -> Self {
        Self {
            instruction: instruction.into(),
            assertions,
        }
    }
}

/// How a round ended, before the status transition is applied.
enum RoundResult {
    Passed,
    Unsafe,
    Failed,
}

/// Drives the synthesis-and-repair loop.
#[derive(Clone)]
pub struct IterationController {
    generator: Arc<dyn CodeGenerator>,
    executor: Arc<dyn Executor>,
    analyzer: Arc<SafetyAnalyzer>,
    config: ControllerConfig,
}

impl IterationController {
    /// Creates a controller from its collaborators.
    pub fn new(
        generator: Arc<dyn CodeGenerator>,
        executor: Arc<dyn Executor>,
        analyzer: SafetyAnalyzer,
        config: ControllerConfig,
    ) -> Self {
        Self {
            generator,
            executor,
            analyzer: Arc::new(analyzer),
            config,
        }
    }

    /// Returns the controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Runs one instruction to a terminal status.
    ///
    /// Candidate faults never surface as `Err`; only infrastructure faults do
    /// (a misconfigured generator, an interpreter that cannot be started).
    pub async fn run(&self, instruction: &str, assertions: &AssertionSet) -> Result<CompletedRun> {
        let mut state = RunState::new(instruction, self.config.retry_budget);
        let span = tracing::info_span!("run", run_id = %state.run_id());

        async move {
            let started = Instant::now();
            tracing::info!(
                budget = self.config.retry_budget,
                assertions = assertions.len(),
                generator = %self.generator.name(),
                executor = %self.executor.name(),
                "run started"
            );

            while !state.is_terminal() {
                if state.budget_remaining() == 0 {
                    state.finish(RunStatus::Exhausted);
                    break;
                }

                let index = state.next_index();
                let (attempt, result) = self
                    .round(&state, assertions)
                    .instrument(tracing::debug_span!("attempt", attempt = index))
                    .await?;
                state.record(attempt);

                match result {
                    RoundResult::Passed => {
                        state.finish(RunStatus::Accepted { attempt: index });
                    }
                    RoundResult::Unsafe if index == 0 => {
                        state.finish(RunStatus::AbortedUnsafe);
                    }
                    RoundResult::Unsafe | RoundResult::Failed => {
                        if state.budget_remaining() == 0 {
                            state.finish(RunStatus::Exhausted);
                        }
                    }
                }
            }

            let report = RunReport::from_state(&state);
            tracing::info!(
                status = ?state.status(),
                attempts = state.attempts().len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run finished"
            );
            Ok::<_, Error>(CompletedRun { report, state })
        }
        .instrument(span)
        .await
    }

    /// Runs independent instructions concurrently, each with its own state.
    ///
    /// Results are returned in job order.
    pub async fn run_batch(&self, jobs: Vec<BatchJob>) -> Vec<Result<CompletedRun>> {
        let mut set = JoinSet::new();
        let count = jobs.len();

        for (position, job) in jobs.into_iter().enumerate() {
            let controller = self.clone();
            set.spawn(async move {
                let result = controller.run(&job.instruction, &job.assertions).await;
                (position, result)
            });
        }

        let mut results: Vec<Option<Result<CompletedRun>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((position, result)) => results[position] = Some(result),
                Err(e) => tracing::error!(error = %e, "batch run task failed"),
            }
        }

        results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(Error::Task("run did not complete".to_string()))))
            .collect()
    }

    async fn round(
        &self,
        state: &RunState,
        assertions: &AssertionSet,
    ) -> Result<(Attempt, RoundResult)> {
        let index = state.next_index();
        let mut attempt = Attempt::new(index);

        let request = GenerationRequest::new(state.instruction(), self.config.invocation.clone())
            .with_run_id(state.run_id())
            .with_attempt(index)
            .with_allowed_modules(self.analyzer.capabilities().allowed_modules.iter().cloned())
            .with_previous_source(state.last_source().map(str::to_string))
            .with_feedback(state.last_attempt().and_then(|a| a.feedback.clone()));

        let source = match self.generator.generate(&request).await {
            Ok(source) => source,
            Err(GenerationError::Misconfigured(reason)) => {
                tracing::error!(reason = %reason, "code generator misconfigured");
                return Err(Error::Generator(reason));
            }
            Err(GenerationError::Unavailable(reason)) => {
                tracing::warn!(reason = %reason, "generation unavailable");
                attempt.feedback = Some(Feedback::new(FeedbackKind::GenerationUnavailable, reason));
                return Ok((attempt, RoundResult::Failed));
            }
        };
        tracing::debug!(source_bytes = source.len(), "candidate generated");

        let verdict = self.analyzer.check(&source);
        attempt.source = Some(source);
        if let SafetyVerdict::Denied { construct, category } = &verdict {
            tracing::warn!(construct = %construct, category = %category, "candidate denied");
            attempt.feedback = Some(Feedback::new(
                FeedbackKind::UnsafeConstruct,
                format!(
                    "the code uses `{}` ({}), which is not permitted; solve the task without it",
                    construct, category
                ),
            ));
            attempt.safety = Some(verdict);
            return Ok((attempt, RoundResult::Unsafe));
        }
        attempt.safety = Some(verdict);

        let source = attempt.source.as_deref().unwrap_or_default();
        let outcome = self
            .executor
            .run(source, &self.config.invocation, self.config.time_limit)
            .await?;
        let validation = Validator::validate(state.instruction(), &outcome, assertions);

        let passed = validation.accepts(self.config.suggestion_policy);
        let kind = if outcome.is_success() {
            FeedbackKind::AssertionFailure
        } else {
            FeedbackKind::ExecutionFailure
        };
        attempt.feedback = validation
            .feedback()
            .or_else(|| (!passed).then(|| "validation failed".to_string()))
            .map(|message| Feedback::new(kind, message));

        if passed {
            tracing::info!(outcome_success = outcome.is_success(), "attempt accepted");
        } else {
            tracing::warn!(
                kind = ?outcome.failure_kind(),
                failed = validation.failures().count(),
                "attempt failed validation"
            );
        }

        attempt.outcome = Some(outcome);
        attempt.validation = Some(validation);
        let result = if passed {
            RoundResult::Passed
        } else {
            RoundResult::Failed
        };
        Ok((attempt, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{Capabilities, ExecutionOutcome, FailureKind};
    use crate::validator::{Assertion, Check};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed list of responses, recording every request.
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<std::result::Result<String, GenerationError>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<std::result::Result<String, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CodeGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<String, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Unavailable("script exhausted".to_string())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Returns `len(source)` for each run and counts calls.
    struct LengthExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Executor for LengthExecutor {
        async fn run(
            &self,
            source: &str,
            _invocation: &Invocation,
            _time_limit: Duration,
        ) -> Result<ExecutionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if source.contains("raise") {
                return Ok(ExecutionOutcome::Failure {
                    kind: FailureKind::RuntimeError,
                    message: "ValueError: boom".to_string(),
                    partial_output: String::new(),
                    stack_summary: vec![],
                });
            }
            Ok(ExecutionOutcome::Success {
                stdout: String::new(),
                return_value: Value::from(source.len()),
            })
        }

        fn name(&self) -> &str {
            "length"
        }
    }

    fn controller(
        generator: Arc<ScriptedGenerator>,
        budget: u32,
    ) -> (IterationController, Arc<LengthExecutor>) {
        let executor = Arc::new(LengthExecutor {
            calls: AtomicUsize::new(0),
        });
        let controller = IterationController::new(
            generator,
            executor.clone(),
            SafetyAnalyzer::new(Capabilities::default()),
            ControllerConfig::new(Invocation::module()).with_retry_budget(budget),
        );
        (controller, executor)
    }

    fn length_is(expected: usize) -> AssertionSet {
        AssertionSet::new().with(Assertion::on_return_value("length", move |_, v| {
            if v.as_u64() == Some(expected as u64) {
                Check::pass()
            } else {
                Check::fail(format!("expected {}, got {}", expected, v))
            }
        }))
    }

    #[tokio::test]
    async fn accepts_on_first_passing_round() {
        let generator = ScriptedGenerator::new(vec![Ok("abc".to_string())]);
        let (controller, executor) = controller(generator, 3);

        let run = controller.run("x", &length_is(3)).await.unwrap();

        assert_eq!(run.state.status(), RunStatus::Accepted { attempt: 0 });
        assert_eq!(run.state.budget_remaining(), 2);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(run.report.attempt_count, 1);
    }

    #[tokio::test]
    async fn feedback_is_threaded_into_next_request() {
        let generator = ScriptedGenerator::new(vec![Ok("ab".to_string()), Ok("abc".to_string())]);
        let (controller, _) = controller(generator.clone(), 3);

        let run = controller.run("x", &length_is(3)).await.unwrap();

        assert_eq!(run.state.status(), RunStatus::Accepted { attempt: 1 });
        let requests = generator.requests.lock().unwrap();
        assert!(requests[0].feedback.is_none());
        let feedback = requests[1].feedback.as_ref().unwrap();
        assert_eq!(feedback.kind, FeedbackKind::AssertionFailure);
        assert_eq!(feedback.message, "expected 3, got 2");
        assert_eq!(requests[1].previous_source.as_deref(), Some("ab"));
        assert_eq!(requests[1].attempt, 1);
    }

    #[tokio::test]
    async fn unsafe_first_round_aborts_without_execution() {
        let generator = ScriptedGenerator::new(vec![Ok("import os\nos.system('ls')\n".to_string())]);
        let (controller, executor) = controller(generator, 3);

        let run = controller.run("x", &length_is(3)).await.unwrap();

        assert_eq!(run.state.status(), RunStatus::AbortedUnsafe);
        assert_eq!(run.state.attempts().len(), 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert!(run.state.attempts()[0].outcome.is_none());
    }

    #[tokio::test]
    async fn unsafe_later_round_is_retried() {
        let generator = ScriptedGenerator::new(vec![
            Ok("ab".to_string()),
            Ok("eval('1')".to_string()),
            Ok("abc".to_string()),
        ]);
        let (controller, executor) = controller(generator.clone(), 3);

        let run = controller.run("x", &length_is(3)).await.unwrap();

        assert_eq!(run.state.status(), RunStatus::Accepted { attempt: 2 });
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
        let requests = generator.requests.lock().unwrap();
        assert_eq!(
            requests[2].feedback.as_ref().unwrap().kind,
            FeedbackKind::UnsafeConstruct
        );
    }

    #[tokio::test]
    async fn generation_failures_consume_budget_with_distinct_tag() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::Unavailable("503".to_string())),
            Ok("abc".to_string()),
        ]);
        let (controller, _) = controller(generator.clone(), 3);

        let run = controller.run("x", &length_is(3)).await.unwrap();

        assert_eq!(run.state.status(), RunStatus::Accepted { attempt: 1 });
        assert!(run.state.attempts()[0].source.is_none());
        let requests = generator.requests.lock().unwrap();
        let feedback = requests[1].feedback.as_ref().unwrap();
        assert_eq!(feedback.to_string(), "[generation-unavailable] 503");
    }

    #[tokio::test]
    async fn unsafe_after_generation_failure_is_not_aborted() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::Unavailable("503".to_string())),
            Ok("import socket\n".to_string()),
        ]);
        let (controller, _) = controller(generator, 2);

        let run = controller.run("x", &length_is(3)).await.unwrap();

        assert_eq!(run.state.status(), RunStatus::Exhausted);
        assert_eq!(run.state.attempts().len(), 2);
    }

    #[tokio::test]
    async fn misconfigured_generator_propagates() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::Misconfigured(
            "no binary".to_string(),
        ))]);
        let (controller, _) = controller(generator, 3);

        let err = controller.run("x", &length_is(3)).await.unwrap_err();
        assert!(matches!(err, Error::Generator(_)));
    }

    #[tokio::test]
    async fn exhausts_after_exactly_budget_attempts() {
        for budget in 1..=4u32 {
            let responses = (0..10).map(|_| Ok("a".to_string())).collect();
            let generator = ScriptedGenerator::new(responses);
            let (controller, executor) = controller(generator, budget);

            let run = controller.run("x", &length_is(3)).await.unwrap();

            assert_eq!(run.state.status(), RunStatus::Exhausted);
            assert_eq!(run.state.attempts().len(), budget as usize);
            assert_eq!(executor.calls.load(Ordering::SeqCst), budget as usize);
            assert_eq!(run.state.budget_remaining(), 0);
        }
    }

    #[tokio::test]
    async fn zero_budget_exhausts_without_attempts() {
        let generator = ScriptedGenerator::new(vec![Ok("abc".to_string())]);
        let (controller, _) = controller(generator.clone(), 0);

        let run = controller.run("x", &length_is(3)).await.unwrap();

        assert_eq!(run.state.status(), RunStatus::Exhausted);
        assert!(run.state.attempts().is_empty());
        assert!(generator.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_assertion_set_accepts_bare_success() {
        let generator =
            ScriptedGenerator::new(vec![Ok("raise".to_string()), Ok("fine".to_string())]);
        let (controller, _) = controller(generator, 3);

        let run = controller.run("x", &AssertionSet::new()).await.unwrap();

        assert_eq!(run.state.status(), RunStatus::Accepted { attempt: 1 });
        let first = &run.state.attempts()[0];
        assert_eq!(
            first.feedback.as_ref().unwrap().kind,
            FeedbackKind::ExecutionFailure
        );
    }

    #[tokio::test]
    async fn advisory_suggestions_do_not_block() {
        let generator = ScriptedGenerator::new(vec![Ok("abc".to_string())]);
        let executor = Arc::new(LengthExecutor {
            calls: AtomicUsize::new(0),
        });
        let controller = IterationController::new(
            generator,
            executor,
            SafetyAnalyzer::new(Capabilities::default()),
            ControllerConfig::new(Invocation::module())
                .with_suggestion_policy(SuggestionPolicy::Advisory),
        );
        let assertions = length_is(3)
            .with(Assertion::new("style", |_, _| Check::fail("prefer a loop")).suggest());

        let run = controller.run("x", &assertions).await.unwrap();

        assert_eq!(run.state.status(), RunStatus::Accepted { attempt: 0 });
        assert_eq!(
            run.report.final_feedback.as_deref(),
            Some("[assertion-failure] prefer a loop")
        );
    }

    #[tokio::test]
    async fn batch_runs_are_independent_and_ordered() {
        struct EchoInstruction;
        #[async_trait]
        impl CodeGenerator for EchoInstruction {
            async fn generate(
                &self,
                request: &GenerationRequest,
            ) -> std::result::Result<String, GenerationError> {
                Ok(request.instruction.clone())
            }
            fn name(&self) -> &str {
                "echo"
            }
        }
        let controller = IterationController::new(
            Arc::new(EchoInstruction),
            Arc::new(LengthExecutor {
                calls: AtomicUsize::new(0),
            }),
            SafetyAnalyzer::new(Capabilities::default()),
            ControllerConfig::new(Invocation::module()).with_retry_budget(2),
        );

        let results = controller
            .run_batch(vec![
                BatchJob::new("abc", length_is(3)),
                BatchJob::new("abcd", length_is(3)),
                BatchJob::new("xyz", length_is(3)),
            ])
            .await;

        let statuses: Vec<RunStatus> = results
            .iter()
            .map(|r| r.as_ref().unwrap().state.status())
            .collect();
        assert_eq!(
            statuses,
            vec![
                RunStatus::Accepted { attempt: 0 },
                RunStatus::Exhausted,
                RunStatus::Accepted { attempt: 0 },
            ]
        );
        let ids: Vec<_> = results
            .iter()
            .map(|r| r.as_ref().unwrap().state.run_id())
            .collect();
        assert_ne!(ids[0], ids[2]);
    }
}
