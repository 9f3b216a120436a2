//! Command-based validation service.
//!
//! Writes the candidate file set into a throwaway directory and runs each
//! configured tool there. A tool passes when it exits with status 0; its
//! combined output becomes the result detail. A built-in check that no file
//! was emptied always runs first, so the result list is never empty.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use reforge_core::workflow::node::ValidationService;
use reforge_types::config::ValidationToolConfig;
use reforge_types::error::CollaboratorError;
use reforge_types::workflow::ValidationResult;

use crate::filesystem::is_safe_relative;

const FILES_PLACEHOLDER: &str = "{files}";
const MAX_DETAIL_CHARS: usize = 4_000;
const BUILTIN_TOOL: &str = "non_empty";

pub struct CommandValidator {
    tools: Vec<ValidationToolConfig>,
}

impl CommandValidator {
    pub fn new(tools: Vec<ValidationToolConfig>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[ValidationToolConfig] {
        &self.tools
    }
}

/// Fails when any file in the proposal has no content.
fn check_non_empty(files: &BTreeMap<String, String>) -> ValidationResult {
    let empty: Vec<&str> = files
        .iter()
        .filter(|(_, content)| content.trim().is_empty())
        .map(|(path, _)| path.as_str())
        .collect();
    if empty.is_empty() {
        ValidationResult::pass(BUILTIN_TOOL, format!("{} file(s) have content", files.len()))
    } else {
        ValidationResult::fail(BUILTIN_TOOL, format!("empty file(s): {}", empty.join(", ")))
    }
}

/// Substitute `{files}` with the file paths, or append them when the
/// placeholder is absent.
fn expand_args(args: &[String], paths: &[&str]) -> Vec<String> {
    let mut expanded = Vec::with_capacity(args.len() + paths.len());
    let mut substituted = false;
    for arg in args {
        if arg == FILES_PLACEHOLDER {
            expanded.extend(paths.iter().map(|p| p.to_string()));
            substituted = true;
        } else {
            expanded.push(arg.clone());
        }
    }
    if !substituted {
        expanded.extend(paths.iter().map(|p| p.to_string()));
    }
    expanded
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((idx, _)) => format!("{}\n... (truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

async fn write_sandbox(dir: &Path, files: &BTreeMap<String, String>) -> Result<(), CollaboratorError> {
    for (path, content) in files {
        if !is_safe_relative(path) {
            return Err(CollaboratorError::Rejected(format!(
                "refusing to validate file outside the sandbox: {path}"
            )));
        }
        let target = dir.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| sandbox_error(path, e))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| sandbox_error(path, e))?;
    }
    Ok(())
}

/// Sandbox I/O failures are retried only when they can clear on their own.
/// Path collisions, permissions and the like fail the same way every time.
fn sandbox_error(path: &str, e: std::io::Error) -> CollaboratorError {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::Interrupted
        | ErrorKind::TimedOut
        | ErrorKind::WouldBlock
        | ErrorKind::StorageFull
        | ErrorKind::ResourceBusy => {
            CollaboratorError::Unavailable(format!("sandbox setup failed for {path}: {e}"))
        }
        _ => CollaboratorError::Rejected(format!("cannot lay out {path} in the sandbox: {e}")),
    }
}

/// Run one tool. `Ok(None)` means an optional tool is not installed.
async fn run_tool(
    tool: &ValidationToolConfig,
    dir: &Path,
    paths: &[&str],
) -> Result<Option<ValidationResult>, CollaboratorError> {
    let args = expand_args(&tool.args, paths);
    let child = tokio::process::Command::new(&tool.program)
        .args(&args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if tool.optional {
                tracing::info!(tool = %tool.name, program = %tool.program, "optional validation tool not installed, skipping");
                return Ok(None);
            }
            return Err(CollaboratorError::Rejected(format!(
                "validation tool '{}' not found: {}",
                tool.name, tool.program
            )));
        }
        Err(e) => {
            return Err(CollaboratorError::Unavailable(format!(
                "failed to start validation tool '{}': {e}",
                tool.name
            )));
        }
    };

    let timeout = Duration::from_secs(tool.timeout_secs);
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(CollaboratorError::Unavailable(format!(
                "validation tool '{}' failed: {e}",
                tool.name
            )));
        }
        Err(_) => {
            tracing::warn!(tool = %tool.name, timeout_secs = tool.timeout_secs, "validation tool timed out");
            return Ok(Some(ValidationResult::fail(
                &tool.name,
                format!("timed out after {}s", tool.timeout_secs),
            )));
        }
    };

    let mut detail = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !detail.is_empty() {
            detail.push('\n');
        }
        detail.push_str(stderr.trim());
    }
    let detail = truncate(&detail);

    let result = if output.status.success() {
        ValidationResult::pass(&tool.name, if detail.is_empty() { "ok".to_string() } else { detail })
    } else {
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        ValidationResult::fail(&tool.name, format!("exit {code}: {detail}"))
    };
    Ok(Some(result))
}

impl ValidationService for CommandValidator {
    async fn validate(
        &self,
        files: &BTreeMap<String, String>,
    ) -> Result<Vec<ValidationResult>, CollaboratorError> {
        let mut results = vec![check_non_empty(files)];
        if self.tools.is_empty() {
            return Ok(results);
        }

        let sandbox = tempfile::tempdir().map_err(|e| sandbox_error("the sandbox directory", e))?;
        write_sandbox(sandbox.path(), files).await?;

        let paths: Vec<&str> = files.keys().map(String::as_str).collect();
        for tool in &self.tools {
            if let Some(result) = run_tool(tool, sandbox.path(), &paths).await? {
                tracing::debug!(tool = %result.tool_name, passed = result.passed, "validation tool finished");
                results.push(result);
            }
        }
        Ok(results)
    }
}
