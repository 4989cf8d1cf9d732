//! Configuration for synthesis runs.
//!
//! Loaded from TOML or YAML and validated before a run starts. The parsed
//! config is passed explicitly into the controller and generator; nothing
//! reads ambient process state after startup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::sandbox::{Capabilities, Invocation, DEFAULT_MAX_OUTPUT_BYTES};
use crate::validator::{assertions_from_specs, AssertionSet, AssertionSpec, SuggestionPolicy};

/// Upper bound on the per-attempt time limit, in seconds.
pub const MAX_TIME_LIMIT_SECS: f64 = 3600.0;

/// Builtins that reopen doors the sandbox closes.
pub const DANGEROUS_BUILTINS: &[&str] = &[
    "open",
    "eval",
    "exec",
    "compile",
    "__import__",
    "getattr",
    "setattr",
    "delattr",
    "globals",
    "locals",
    "vars",
    "breakpoint",
    "input",
];

/// Modules that grant process, filesystem, or network access.
pub const DANGEROUS_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "shutil",
    "socket",
    "pathlib",
    "io",
    "importlib",
    "ctypes",
    "multiprocessing",
    "urllib",
    "http",
    "requests",
    "pickle",
];

/// Top-level configuration for a synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammerConfig {
    /// Maximum number of rounds per run.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Wall-clock limit for one candidate execution.
    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: f64,

    /// Whether failed `suggest` assertions block acceptance.
    #[serde(default)]
    pub suggestion_policy: SuggestionPolicy,

    /// How each candidate is invoked.
    #[serde(default = "default_invocation")]
    pub invocation: Invocation,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Declarative assertions, in evaluation order.
    #[serde(default)]
    pub assertions: Vec<AssertionSpec>,
}

fn default_retry_budget() -> u32 {
    3
}

fn default_time_limit_secs() -> f64 {
    5.0
}

fn default_invocation() -> Invocation {
    Invocation::call("solve", Vec::<Value>::new())
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            time_limit_secs: default_time_limit_secs(),
            suggestion_policy: SuggestionPolicy::default(),
            invocation: default_invocation(),
            sandbox: SandboxConfig::default(),
            generator: GeneratorConfig::default(),
            assertions: Vec::new(),
        }
    }
}

impl ProgrammerConfig {
    /// Loads a config file, choosing YAML or TOML by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Parses a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Parses a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Returns the per-attempt time limit, clamped to
    /// [`MAX_TIME_LIMIT_SECS`].
    pub fn time_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_limit_secs.clamp(0.0, MAX_TIME_LIMIT_SECS))
            .unwrap_or(Duration::ZERO)
    }

    /// Builds the executable assertion set from the declarative list.
    pub fn assertion_set(&self) -> AssertionSet {
        assertions_from_specs(&self.assertions, &self.invocation)
    }
}

/// Sandbox settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter binary used to host candidates.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(flatten)]
    pub capabilities: Capabilities,

    /// Cap on captured candidate stdout.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            capabilities: Capabilities::default(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

/// Settings for the command-line code generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// LM CLI binary.
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments placed before the prompt.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Model to request (e.g., "sonnet", "haiku").
    #[serde(default)]
    pub model: Option<String>,

    /// Timeout for a single CLI call.
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after an unavailable response.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_command() -> String {
    "claude".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_generator_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            model: None,
            timeout_secs: default_generator_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl GeneratorConfig {
    /// Creates a config for a custom command with no extra arguments.
    pub fn for_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_retries(mut self, max_retries: u32, initial_ms: u64, max_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_initial_ms = initial_ms;
        self.backoff_max_ms = max_ms;
        self
    }

    /// Returns the per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for ProgrammerConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.retry_budget == 0 {
            result.add_error("retry_budget must be at least 1");
        }
        if self.retry_budget > 20 {
            result.add_warning("retry_budget > 20 may lead to excessive generator calls");
        }

        if !self.time_limit_secs.is_finite() || self.time_limit_secs <= 0.0 {
            result.add_error("time_limit_secs must be a positive number");
        } else if self.time_limit_secs > MAX_TIME_LIMIT_SECS {
            result.add_error(format!(
                "time_limit_secs cannot exceed {} seconds",
                MAX_TIME_LIMIT_SECS
            ));
        }

        if let Some(entry_point) = &self.invocation.entry_point {
            if entry_point.trim().is_empty() {
                result.add_error("invocation.entry_point cannot be empty");
            }
        }

        let mut names: Vec<&str> = Vec::new();
        for spec in &self.assertions {
            if spec.name.trim().is_empty() {
                result.add_error("assertion names cannot be empty");
            } else if names.contains(&spec.name.as_str()) {
                result.add_error(format!("duplicate assertion name '{}'", spec.name));
            } else {
                names.push(&spec.name);
            }
        }

        result.merge(self.sandbox.validate());
        result.merge(self.generator.validate());
        result
    }
}

impl Validate for SandboxConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.interpreter.trim().is_empty() {
            result.add_error("sandbox.interpreter cannot be empty");
        }

        if self.max_output_bytes == 0 {
            result.add_warning("sandbox.max_output_bytes = 0 discards all candidate output");
        }

        for name in &self.capabilities.allowed_builtins {
            if DANGEROUS_BUILTINS.contains(&name.as_str()) {
                result.add_warning(format!(
                    "builtin '{}' is whitelisted - candidates may escape the sandbox",
                    name
                ));
            }
        }

        for module in &self.capabilities.allowed_modules {
            if DANGEROUS_MODULES.contains(&module.as_str()) {
                result.add_warning(format!(
                    "module '{}' is whitelisted - candidates may reach the host",
                    module
                ));
            }
        }

        let root = &self.capabilities.allowed_root;
        if root.as_os_str().is_empty() || root == Path::new("/") {
            result.add_warning("sandbox.allowed_root is the filesystem root");
        }

        result
    }
}

impl Validate for GeneratorConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.command.trim().is_empty() {
            result.add_error("generator.command cannot be empty");
        }

        if self.timeout_secs == 0 {
            result.add_error("generator.timeout_secs must be at least 1");
        }

        if self.max_retries > 10 {
            result.add_warning("generator.max_retries > 10 may stall a run on an unavailable service");
        }

        if self.backoff_initial_ms > self.backoff_max_ms {
            result.add_warning("generator.backoff_initial_ms exceeds backoff_max_ms");
        }

        result
    }
}
