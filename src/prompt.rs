//! Prompt building and code extraction for generation requests.

use crate::generator::GenerationRequest;

/// Response format instruction appended to every prompt.
pub const RESPONSE_FORMAT_INSTRUCTION: &str = "Respond with the complete Python source in a single ```python fenced code block and nothing else. Do not read or write files, start processes, open network connections, or use eval/exec.";

/// Renders the prompt for a generation request.
///
/// Round 0 carries only the task. Later rounds also carry the previous
/// source and the tagged feedback, so the model can tell "your code failed"
/// apart from "the service failed".
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str("Write a Python module for the following task.\n\n");
    prompt.push_str("## Task\n");
    prompt.push_str(request.instruction.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## Requirements\n");
    match &request.invocation.entry_point {
        Some(entry_point) => {
            prompt.push_str(&format!(
                "- Define a top-level function `{}` taking {} positional argument(s); it will be called as `{}`.\n",
                entry_point,
                request.invocation.args.len(),
                request.invocation
            ));
        }
        None => prompt.push_str("- The module is run top to bottom; print the result to stdout.\n"),
    }
    if request.allowed_modules.is_empty() {
        prompt.push_str("- Do not import any modules.\n");
    } else {
        prompt.push_str(&format!(
            "- Only these modules may be imported: {}.\n",
            request.allowed_modules.join(", ")
        ));
    }

    if let Some(feedback) = &request.feedback {
        prompt.push_str(&format!("\n## Attempt {} feedback\n", request.attempt));
        if let Some(source) = request.previous_source.as_deref().filter(|_| feedback.concerns_candidate()) {
            prompt.push_str("Your previous code was:\n```python\n");
            prompt.push_str(source.trim_end());
            prompt.push_str("\n```\n");
        }
        prompt.push_str(&feedback.to_string());
        prompt.push('\n');
        if !feedback.concerns_candidate() {
            prompt.push_str("The previous request failed before any code was produced; this is not a problem with your code.\n");
        }
    }

    prompt.push('\n');
    prompt.push_str(RESPONSE_FORMAT_INSTRUCTION);
    prompt
}

/// Extracts candidate source from a model response.
///
/// Takes the body of the first fenced code block (an unterminated fence runs
/// to the end). A response without a fence is used verbatim after trimming.
pub fn extract_code(response: &str) -> String {
    let mut lines = response.lines();
    let opened = lines.by_ref().any(|line| line.trim_start().starts_with("```"));
    if !opened {
        return response.trim().to_string();
    }

    let body: Vec<&str> = lines
        .take_while(|line| line.trim() != "```")
        .collect();
    let code = body.join("\n");
    let code = code.trim_matches('\n');
    if code.trim().is_empty() {
        tracing::debug!("fenced block was empty");
    }
    format!("{}\n", code.trim_end())
}
