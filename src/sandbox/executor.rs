//! Executor trait and the Python subprocess sandbox.

use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};

use super::capabilities::Capabilities;
use super::harness::{HarnessPayload, HarnessReport, HARNESS_SOURCE};
use super::outcome::{ExecutionOutcome, FailureKind};

/// How a candidate is invoked after its module body runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Function to call; `None` runs the module body only.
    #[serde(default)]
    pub entry_point: Option<String>,
    /// Positional arguments passed to the entry point.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Invocation {
    /// Invocation that calls `entry_point(*args)`.
    pub fn call(entry_point: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            entry_point: Some(entry_point.into()),
            args,
        }
    }

    /// Invocation that only runs the module body.
    pub fn module() -> Self {
        Self::default()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entry_point {
            Some(name) => {
                let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
            None => write!(f, "<module>"),
        }
    }
}

/// Trait for sandboxed executors.
///
/// `Err` is reserved for infrastructure faults (the interpreter cannot be
/// started). Anything the candidate does wrong is an `ExecutionOutcome::Failure`.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs the candidate once, bounded by `time_limit`.
    async fn run(
        &self,
        source: &str,
        invocation: &Invocation,
        time_limit: Duration,
    ) -> Result<ExecutionOutcome>;

    /// Returns the name of this executor.
    fn name(&self) -> &str;
}

/// Default cap on captured candidate stdout.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Executes candidates in a fresh, isolated Python interpreter per run.
///
/// Each run spawns `python3 -I -S -B` with a cleared environment, feeds the
/// harness payload on stdin, and kills the process if the deadline passes.
pub struct PythonSandbox {
    interpreter: String,
    capabilities: Capabilities,
    max_output_bytes: usize,
}

impl PythonSandbox {
    /// Creates a sandbox using the default `python3` interpreter.
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            interpreter: "python3".to_string(),
            capabilities,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Uses a custom interpreter path.
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Caps the captured stdout.
    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// Returns the capabilities exposed to candidates.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(["-I", "-S", "-B", "-c", HARNESS_SOURCE])
            .current_dir(&self.capabilities.allowed_root)
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("PYTHONHASHSEED", "0")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn classify(&self, status: std::process::ExitStatus, stdout: &str, stderr: &str) -> ExecutionOutcome {
        match HarnessReport::parse(stdout) {
            Some(Ok(report)) if report.ok => ExecutionOutcome::Success {
                stdout: report.stdout_with_notice(),
                return_value: report.return_value,
            },
            Some(Ok(report)) => {
                let exception = report.exception.as_deref().unwrap_or("Exception");
                let message = match report.message.as_deref() {
                    Some(msg) if !msg.is_empty() => format!("{}: {}", exception, msg),
                    _ => exception.to_string(),
                };
                ExecutionOutcome::Failure {
                    kind: FailureKind::RuntimeError,
                    message,
                    partial_output: report.stdout_with_notice(),
                    stack_summary: report.stack,
                }
            }
            Some(Err(e)) => ExecutionOutcome::Failure {
                kind: FailureKind::Crashed,
                message: format!("sandbox report was malformed: {}", e),
                partial_output: String::new(),
                stack_summary: Vec::new(),
            },
            None => {
                let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
                let tail: Vec<&str> = tail.into_iter().rev().collect();
                ExecutionOutcome::Failure {
                    kind: FailureKind::Crashed,
                    message: format!(
                        "sandbox process exited ({}) without a result: {}",
                        status,
                        tail.join(" | ")
                    ),
                    partial_output: String::new(),
                    stack_summary: Vec::new(),
                }
            }
        }
    }
}

#[async_trait]
impl Executor for PythonSandbox {
    async fn run(
        &self,
        source: &str,
        invocation: &Invocation,
        time_limit: Duration,
    ) -> Result<ExecutionOutcome> {
        let payload = HarnessPayload {
            source,
            entry_point: invocation.entry_point.as_deref(),
            args: &invocation.args,
            builtins: &self.capabilities.allowed_builtins,
            modules: &self.capabilities.allowed_modules,
            root: &self.capabilities.allowed_root,
            max_output: self.max_output_bytes,
        };
        let payload = serde_json::to_vec(&payload)
            .map_err(|e| Error::Serialization(format!("failed to encode harness payload: {}", e)))?;

        let started = Instant::now();
        let mut child = self.command().spawn().map_err(|e| {
            Error::Sandbox(format!("failed to spawn {}: {}", self.interpreter, e))
        })?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Sandbox("stdin was not piped".to_string()))?;

        tracing::debug!(
            interpreter = %self.interpreter,
            invocation = %invocation,
            source_bytes = source.len(),
            "started sandbox process"
        );

        // The child moves into this future; dropping it on timeout kills the process.
        let exchange = async move {
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e);
                }
            }
            drop(stdin);
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(time_limit, exchange).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Sandbox(format!("sandbox IO failed: {}", e)));
            }
            Err(_) => {
                tracing::warn!(
                    limit_ms = time_limit.as_millis() as u64,
                    "candidate exceeded time limit, sandbox process discarded"
                );
                // Output is buffered inside the harness, so nothing partial is recoverable.
                return Ok(ExecutionOutcome::timeout(time_limit, ""));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let outcome = self.classify(output.status, &stdout, &stderr);

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = outcome.is_success(),
            "sandbox process finished"
        );

        Ok(outcome)
    }

    fn name(&self) -> &str {
        "python-sandbox"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::harness::REPORT_MARKER;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn sandbox() -> PythonSandbox {
        PythonSandbox::new(Capabilities::default())
    }

    fn exit_ok() -> std::process::ExitStatus {
        std::process::ExitStatus::default()
    }

    #[test]
    fn invocation_displays_call() {
        let invocation = Invocation::call("factorial", vec![Value::from(5)]);
        assert_eq!(invocation.to_string(), "factorial(5)");
        assert_eq!(Invocation::module().to_string(), "<module>");
    }

    #[test]
    fn classify_maps_success_report() {
        let stdout = format!(
            "{}{{\"ok\": true, \"return_value\": 120, \"stdout\": \"hi\\n\", \"truncated\": 0}}\n",
            REPORT_MARKER
        );
        let outcome = sandbox().classify(exit_ok(), &stdout, "");

        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                stdout: "hi\n".to_string(),
                return_value: Value::from(120),
            }
        );
    }

    #[test]
    fn classify_maps_exception_report() {
        let stdout = format!(
            "{}{{\"ok\": false, \"exception\": \"ValueError\", \"message\": \"bad\", \"stack\": [\"line 2 in f\"], \"stdout\": \"\", \"truncated\": 0}}\n",
            REPORT_MARKER
        );
        let outcome = sandbox().classify(exit_ok(), &stdout, "");

        match outcome {
            ExecutionOutcome::Failure {
                kind,
                message,
                stack_summary,
                ..
            } => {
                assert_eq!(kind, FailureKind::RuntimeError);
                assert_eq!(message, "ValueError: bad");
                assert_eq!(stack_summary, vec!["line 2 in f"]);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn classify_without_report_is_crash() {
        let outcome = sandbox().classify(exit_ok(), "", "Killed\n");
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Crashed));
    }

    #[tokio::test]
    async fn runs_entry_point_and_captures_stdout() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let source = "def greet(name):\n    print('hello', name)\n    return len(name)\n";
        let outcome = sandbox()
            .run(
                source,
                &Invocation::call("greet", vec![Value::from("ada")]),
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                stdout: "hello ada\n".to_string(),
                return_value: Value::from(3),
            }
        );
    }

    #[tokio::test]
    async fn raising_candidate_is_runtime_error() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let source = "def divide(a, b):\n    return a / b\n";
        let outcome = sandbox()
            .run(
                source,
                &Invocation::call("divide", vec![Value::from(1), Value::from(0)]),
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::RuntimeError));
        let summary = outcome.failure_summary().unwrap();
        assert!(summary.contains("ZeroDivisionError"));
        assert!(summary.contains("divide"));
    }

    #[tokio::test]
    async fn infinite_loop_times_out_within_grace() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let limit = Duration::from_secs(1);
        let started = Instant::now();
        let outcome = sandbox()
            .run("while True:\n    pass\n", &Invocation::module(), limit)
            .await
            .unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
        assert!(started.elapsed() < limit + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unlisted_builtin_is_unavailable_at_runtime() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let outcome = sandbox()
            .run("open('x.txt')\n", &Invocation::module(), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::RuntimeError));
        assert!(outcome.failure_summary().unwrap().contains("NameError"));
    }

    #[tokio::test]
    async fn unlisted_module_import_fails_at_runtime() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let outcome = sandbox()
            .run("import json\n", &Invocation::module(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(outcome.failure_summary().unwrap().contains("not permitted"));
    }

    #[tokio::test]
    async fn missing_entry_point_is_runtime_error() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let outcome = sandbox()
            .run("x = 1\n", &Invocation::call("solve", vec![]), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(outcome.failure_summary().unwrap().contains("entry point 'solve'"));
    }

    #[tokio::test]
    async fn classification_is_reproducible() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let source = "def f(n):\n    return sorted({'b': 1, 'a': 2})[0] * n\n";
        let invocation = Invocation::call("f", vec![Value::from(2)]);
        let first = sandbox()
            .run(source, &invocation, Duration::from_secs(10))
            .await
            .unwrap();
        let second = sandbox()
            .run(source, &invocation, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.return_value(), Some(&Value::from("aa")));
    }

    #[tokio::test]
    async fn missing_interpreter_is_infrastructure_error() {
        let sandbox = sandbox().with_interpreter("definitely-not-a-python-binary");
        let result = sandbox
            .run("x = 1\n", &Invocation::module(), Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(Error::Sandbox(_))));
    }

    #[tokio::test]
    async fn stdout_is_capped_with_notice() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let outcome = sandbox()
            .with_max_output_bytes(10)
            .run("print('x' * 50)\n", &Invocation::module(), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(outcome.stdout(), "xxxxxxxxxx\n[stdout truncated 41 chars]\n");
    }

    #[tokio::test]
    async fn output_cap_holds_across_many_writes() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let source = "def noisy(n):\n    for i in range(n):\n        print('abcd')\n    return n\n";
        let outcome = sandbox()
            .with_max_output_bytes(8)
            .run(
                source,
                &Invocation::call("noisy", vec![Value::from(1000)]),
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        // 1000 lines of "abcd\n", of which the first 8 chars are kept.
        assert_eq!(outcome.stdout(), "abcd\nabc\n[stdout truncated 4992 chars]\n");
        assert_eq!(outcome.return_value(), Some(&Value::from(1000)));
    }

    #[tokio::test]
    async fn unencodable_return_value_is_runtime_error() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let source = "\
def nest():
    value = []
    for i in range(100000):
        value = [value]
    return value
";
        let outcome = sandbox()
            .run(source, &Invocation::call("nest", vec![]), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::RuntimeError));
        assert!(outcome.failure_summary().unwrap().contains("RecursionError"));
    }
}
