//! Prompt construction for the LLM-backed nodes.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use reforge_types::workflow::{ValidationResult, WorkflowState};

use super::extract::truncate_chars;

/// Longest tool output quoted back to the model, per stream.
const MAX_DETAIL_CHARS: usize = 2_000;

pub const ANALYZE_SYSTEM: &str = "You are a senior engineer reviewing code before a refactoring. \
Describe the structure of the given files, their dependencies on each other, and anything that \
makes the requested change risky. Be concise.";

pub const GENERATE_SYSTEM: &str = "You are a careful refactoring assistant. Apply the requested \
change to the given files without altering behaviour beyond what is asked.\n\n\
Reply in exactly this format:\n\
[SUMMARY]\n<one paragraph describing the change>\n\n\
[FILE <path>]\n```\n<complete new content of the file>\n```\n\n\
Repeat the [FILE <path>] section for every file you were given, including unchanged ones. \
If a file contains lines of backticks, use a fence longer than any of them. \
Always return complete file contents, never fragments.";

pub const REFLECT_SYSTEM: &str = "You analyse why a proposed code change failed automated \
validation. Reply with two sections:\n\
Error Summary: <what went wrong, citing the tools>\n\
Suggested Fix: <concrete instructions for the next attempt>";

pub fn analysis_prompt(state: &WorkflowState) -> String {
    let mut prompt = format!("Goal: {}\n\n", state.goal);
    push_files(&mut prompt, &state.original_files);
    prompt
}

/// The generation request. Carries the latest critique once the workflow
/// has retried, and any reviewer feedback waiting to be consumed.
pub fn generation_prompt(state: &WorkflowState) -> String {
    let mut prompt = format!("Goal: {}\n\n", state.goal);

    if let Some(analysis) = state.analysis.as_ref().filter(|a| !a.summary.is_empty()) {
        let _ = write!(prompt, "Analysis:\n{}\n\n", analysis.summary);
    }

    push_files(&mut prompt, &state.files);

    if state.iteration_count > 0 {
        if let Some(critique) = state.latest_critique() {
            let _ = write!(
                prompt,
                "\nThe previous attempt (iteration {}) failed validation.\n{}\n",
                critique.iteration,
                critique.as_guidance()
            );
        }
    }

    if let Some(feedback) = &state.human_feedback {
        let _ = write!(prompt, "\nReviewer feedback to address:\n{feedback}\n");
    }

    prompt
}

pub fn reflection_prompt(state: &WorkflowState, notes: &[String]) -> String {
    let mut prompt = format!(
        "Goal: {}\nAttempt: {} of {}\n\n",
        state.goal,
        state.iteration_count + 1,
        state.max_iterations
    );

    if !state.summary.is_empty() {
        let _ = write!(prompt, "Proposed change:\n{}\n\n", state.summary);
    }
    if !state.current_diff.is_empty() {
        let _ = write!(prompt, "Diff:\n```diff\n{}```\n\n", state.current_diff);
    }

    prompt.push_str("Validation failures:\n");
    push_failures(&mut prompt, &state.validation_results);

    for note in notes {
        let _ = writeln!(prompt, "Note: {note}");
    }
    prompt
}

fn push_files(prompt: &mut String, files: &BTreeMap<String, String>) {
    prompt.push_str("Files:\n");
    for (path, content) in files {
        let fence = fence_for(content);
        let newline = if content.ends_with('\n') { "" } else { "\n" };
        let _ = write!(prompt, "[FILE {path}]\n{fence}\n{content}{newline}{fence}\n\n");
    }
}

/// A backtick fence longer than any backtick run in `content`.
fn fence_for(content: &str) -> String {
    let longest = content
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn push_failures(prompt: &mut String, results: &[ValidationResult]) {
    let failures: Vec<_> = results.iter().filter(|r| !r.passed).collect();
    if failures.is_empty() {
        prompt.push_str("- no validation tool reported a pass\n");
        return;
    }
    for result in failures {
        let _ = writeln!(
            prompt,
            "- {}:\n{}",
            result.tool_name,
            truncate_chars(&result.detail, MAX_DETAIL_CHARS)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reforge_types::workflow::{AnalysisSummary, Critique};

    fn state() -> WorkflowState {
        let files = BTreeMap::from([("a.py".to_string(), "def f(x): return x".to_string())]);
        WorkflowState::new("add type hints", files, 3, Utc::now())
    }

    #[test]
    fn test_first_generation_has_no_critique() {
        let mut s = state();
        s.analysis = Some(AnalysisSummary {
            summary: "one function".to_string(),
            degraded: false,
        });
        s.critique_history.push(Critique {
            iteration: 0,
            error_summary: "stale".to_string(),
            suggested_fix: "n/a".to_string(),
            notes: Vec::new(),
            degraded: false,
        });

        let prompt = generation_prompt(&s);
        assert!(prompt.contains("Goal: add type hints"));
        assert!(prompt.contains("Analysis:\none function"));
        assert!(prompt.contains("[FILE a.py]"));
        assert!(!prompt.contains("stale"));
    }

    #[test]
    fn test_files_with_backticks_get_a_wider_fence() {
        let files = BTreeMap::from([("README.md".to_string(), "```sh\nmake\n```\n".to_string())]);
        let mut prompt = String::new();
        push_files(&mut prompt, &files);
        assert!(prompt.contains("[FILE README.md]\n````\n```sh\nmake\n```\n````\n"));
    }

    #[test]
    fn test_retry_generation_includes_latest_critique_and_feedback() {
        let mut s = state();
        s.iteration_count = 1;
        s.human_feedback = Some("keep original naming".to_string());
        s.critique_history.push(Critique {
            iteration: 0,
            error_summary: "x is untyped".to_string(),
            suggested_fix: "annotate x".to_string(),
            notes: Vec::new(),
            degraded: false,
        });

        let prompt = generation_prompt(&s);
        assert!(prompt.contains("x is untyped"));
        assert!(prompt.contains("annotate x"));
        assert!(prompt.contains("keep original naming"));
    }

    #[test]
    fn test_reflection_prompt_lists_only_failures() {
        let mut s = state();
        s.validation_results = vec![
            ValidationResult::pass("ruff", "clean"),
            ValidationResult::fail("mypy", "a.py:1: error: missing annotation"),
        ];
        let prompt = reflection_prompt(&s, &["attempt repeats attempt 1".to_string()]);
        assert!(prompt.contains("Attempt: 1 of 3"));
        assert!(prompt.contains("- mypy:\na.py:1: error: missing annotation"));
        assert!(!prompt.contains("ruff"));
        assert!(prompt.contains("Note: attempt repeats attempt 1"));
    }
}
