//! Code generator backed by an LM command-line tool.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::backoff::ExponentialBackoff;
use crate::config::GeneratorConfig;
use crate::prompt::{build_prompt, extract_code};

use super::{CodeGenerator, GenerationError, GenerationRequest};

/// Runs an LM CLI (`claude --print` by default) once per request.
///
/// Each call is bounded by the configured timeout. Unavailable responses
/// (non-zero exit, timeout, empty output) are retried with exponential
/// backoff before the error is handed back to the controller.
pub struct CommandGenerator {
    config: GeneratorConfig,
}

impl Default for CommandGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

impl CommandGenerator {
    /// Creates a generator from configuration.
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Returns the generator configuration.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Builds the command arguments for one prompt.
    fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = self.config.args.clone();

        if let Some(model) = &self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        args.push(prompt.to_string());
        args
    }

    async fn invoke_once(&self, prompt: &str) -> Result<String, GenerationError> {
        let args = self.build_args(prompt);

        let child = Command::new(&self.config.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    GenerationError::Misconfigured(format!(
                        "failed to spawn {}: {}",
                        self.config.command, e
                    ))
                }
                _ => GenerationError::Unavailable(format!(
                    "failed to spawn {}: {}",
                    self.config.command, e
                )),
            })?;

        let output = match tokio::time::timeout(self.config.timeout(), child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(GenerationError::Unavailable(format!(
                    "failed to wait for {}: {}",
                    self.config.command, e
                )));
            }
            Err(_) => {
                return Err(GenerationError::Unavailable(format!(
                    "{} did not respond within {}s",
                    self.config.command, self.config.timeout_secs
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("").trim();
            return Err(GenerationError::Unavailable(format!(
                "{} exited with {}: {}",
                self.config.command, output.status, detail
            )));
        }

        let response = String::from_utf8_lossy(&output.stdout);
        let code = extract_code(&response);
        if code.trim().is_empty() {
            return Err(GenerationError::Unavailable(format!(
                "{} returned no code",
                self.config.command
            )));
        }
        Ok(code)
    }
}

#[async_trait]
impl CodeGenerator for CommandGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let prompt = build_prompt(request);
        let mut backoff =
            ExponentialBackoff::from_millis(self.config.backoff_initial_ms, self.config.backoff_max_ms);
        let mut tries = 0;

        tracing::info!(
            run_id = %request.run_id,
            attempt = request.attempt,
            cli = %self.config.command,
            prompt_bytes = prompt.len(),
            "requesting candidate"
        );

        loop {
            match self.invoke_once(&prompt).await {
                Ok(code) => {
                    tracing::debug!(
                        run_id = %request.run_id,
                        source_bytes = code.len(),
                        "received candidate"
                    );
                    return Ok(code);
                }
                Err(GenerationError::Unavailable(reason)) if tries < self.config.max_retries => {
                    tries += 1;
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        run_id = %request.run_id,
                        reason = %reason,
                        retry = tries,
                        delay_ms = delay.as_millis() as u64,
                        "generator unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        &self.config.command
    }
}
