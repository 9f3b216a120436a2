//! CLI workflow subcommands.
//!
//! Create, drive, inspect, review and cancel refactoring workflows. Every
//! command works against the persisted checkpoints, so a workflow created in
//! one invocation can be resumed from another.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use reforge_core::workflow::coordinator::{CancelOutcome, NewWorkflow};
use reforge_infra::filesystem::read_files;
use reforge_types::workflow::{
    ReviewAction, ReviewDecision, WorkflowId, WorkflowStatus, WorkflowView,
};

use crate::state::AppState;

/// Create a workflow from files on disk and, unless told otherwise, drive it
/// until it needs review.
pub async fn create_workflow(
    state: &AppState,
    goal: String,
    files: Vec<PathBuf>,
    max_iterations: Option<u32>,
    no_drive: bool,
    json: bool,
) -> Result<()> {
    let files = read_files(&files).await?;
    let request = NewWorkflow {
        goal,
        files,
        max_iterations,
    };

    let workflow = if no_drive {
        state.coordinator.create(request).await?
    } else {
        if !json {
            println!();
            println!("  {} Running refactoring cycle...", style("*").cyan().bold());
        }
        state.coordinator.start(request).await?
    };

    print_view(&workflow.view(), json)
}

/// Show a workflow's status, optionally with its current diff.
pub async fn show_status(state: &AppState, id: &str, diff: bool, json: bool) -> Result<()> {
    let view = state.coordinator.status(parse_id(id)?).await?;
    print_view(&view, json)?;

    if diff && !json {
        if view.current_diff.is_empty() {
            println!("  {}", style("No changes proposed.").dim());
        } else {
            print_diff(&view.current_diff);
        }
        println!();
    }
    Ok(())
}

/// List workflows, newest first.
pub async fn list_workflows(state: &AppState, status: Option<String>, json: bool) -> Result<()> {
    let status = status
        .as_deref()
        .map(str::parse::<WorkflowStatus>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let summaries = state.coordinator.list(status).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        println!("  No workflows found.");
        println!(
            "  Start one with: {}",
            style("reforge create <goal> <files>...").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Goal"),
            Cell::new("Iteration"),
            Cell::new("Files"),
            Cell::new("Updated"),
        ]);

    for s in &summaries {
        table.add_row(vec![
            Cell::new(s.workflow_id.to_string()),
            status_cell(s.status),
            Cell::new(truncate(&s.goal, 48)),
            Cell::new(format!("{}/{}", s.iteration_count, s.max_iterations)),
            Cell::new(s.files_total),
            Cell::new(s.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// Approve or reject a parked workflow and keep driving it.
pub async fn resume_workflow(
    state: &AppState,
    id: &str,
    action: ReviewAction,
    feedback: Option<String>,
    json: bool,
) -> Result<()> {
    let decision = ReviewDecision { action, feedback };
    let workflow = state.coordinator.resume(parse_id(id)?, decision).await?;
    print_view(&workflow.view(), json)
}

/// Queue feedback on a parked workflow.
pub async fn submit_feedback(state: &AppState, id: &str, text: String, json: bool) -> Result<()> {
    let workflow = state.coordinator.submit_feedback(parse_id(id)?, text).await?;
    if json {
        return print_view(&workflow.view(), json);
    }
    println!();
    println!(
        "  {} Feedback queued for workflow {}",
        style("*").green().bold(),
        style(workflow.workflow_id).cyan()
    );
    println!(
        "  It will be used if you run: {}",
        style(format!("reforge resume {} reject", workflow.workflow_id)).dim()
    );
    println!();
    Ok(())
}

pub async fn cancel_workflow(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id = parse_id(id)?;
    match state.coordinator.cancel(id).await? {
        CancelOutcome::Cancelled(workflow) => print_view(&workflow.view(), json),
        CancelOutcome::Requested => {
            if json {
                let out = serde_json::json!({ "workflow_id": id, "outcome": "requested" });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!(
                    "  {} Cancellation requested; workflow {} stops before its next step.",
                    style("*").yellow().bold(),
                    style(id).cyan()
                );
                println!();
            }
            Ok(())
        }
    }
}

/// Show every checkpoint written for a workflow.
pub async fn show_history(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id = parse_id(id)?;
    let history = state.coordinator.history(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Version").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Iteration"),
            Cell::new("Recorded"),
        ]);

    for record in &history {
        table.add_row(vec![
            Cell::new(record.version),
            status_cell(record.status),
            Cell::new(record.iteration_count),
            Cell::new(record.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }

    println!();
    println!("  {} {}", style("History:").bold(), style(id).cyan());
    println!("{table}");
    println!();
    Ok(())
}

/// Drive a single workflow from its latest checkpoint.
pub async fn drive_workflow(state: &AppState, id: &str, json: bool) -> Result<()> {
    let workflow = state.coordinator.drive(parse_id(id)?).await?;
    print_view(&workflow.view(), json)
}

/// Re-drive every workflow left mid-cycle.
pub async fn recover(state: &AppState, json: bool) -> Result<()> {
    let report = state.coordinator.recover().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    if report.resumed.is_empty() && report.skipped.is_empty() && report.failed.is_empty() {
        println!("  Nothing to recover.");
        println!();
        return Ok(());
    }
    for s in &report.resumed {
        println!(
            "  {} {} -> {}",
            style("*").green().bold(),
            style(s.workflow_id).cyan(),
            format_status(s.status)
        );
    }
    for id in &report.skipped {
        println!("  {} {} already running", style("-").dim(), style(id).cyan());
    }
    for (id, error) in &report.failed {
        println!("  {} {}: {}", style("!").red().bold(), style(id).cyan(), style(error).red());
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering helpers
// ---------------------------------------------------------------------------

fn parse_id(id: &str) -> Result<WorkflowId> {
    id.parse()
        .with_context(|| format!("invalid workflow id '{id}'"))
}

fn print_view(view: &WorkflowView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Workflow:").bold(),
        style(view.workflow_id).cyan()
    );
    println!("  Status:    {}", format_status(view.status));
    println!("  Goal:      {}", view.refactoring_goal);
    println!(
        "  Iteration: {}/{}",
        view.iteration_count, view.max_iterations
    );
    println!(
        "  Files:     {} changed of {}",
        view.files_changed, view.files_total
    );
    if !view.refactoring_summary.is_empty() {
        println!("  Summary:   {}", view.refactoring_summary);
    }
    if view.partial {
        println!(
            "  {}",
            style("Proposal was only partially extracted; unchanged files kept.").yellow()
        );
    }
    if let Some(feedback) = &view.pending_feedback {
        println!("  Feedback:  {}", style(feedback).italic());
    }
    if let Some(error) = &view.error_message {
        println!("  Error:     {}", style(error).red());
    }

    if !view.validation_results.is_empty() {
        println!();
        for result in &view.validation_results {
            let mark = if result.passed {
                style("pass").green()
            } else {
                style("fail").red()
            };
            println!(
                "    [{mark}] {} {}",
                result.tool_name,
                style(truncate(result.detail.lines().next().unwrap_or(""), 72)).dim()
            );
        }
    }

    if view.status == WorkflowStatus::AwaitingReview {
        println!();
        println!(
            "  Review with: {}",
            style(format!(
                "reforge status {} --diff",
                view.workflow_id
            ))
            .dim()
        );
        println!(
            "  Then:        {}",
            style(format!(
                "reforge resume {} approve|reject [--feedback <text>]",
                view.workflow_id
            ))
            .dim()
        );
    }
    println!();
    Ok(())
}

fn print_diff(diff: &str) {
    println!();
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("  {}", style(line).bold());
        } else if line.starts_with("@@") {
            println!("  {}", style(line).cyan());
        } else if line.starts_with('+') {
            println!("  {}", style(line).green());
        } else if line.starts_with('-') {
            println!("  {}", style(line).red());
        } else {
            println!("  {line}");
        }
    }
}

fn status_color(status: WorkflowStatus) -> Color {
    match status {
        WorkflowStatus::Completed => Color::Green,
        WorkflowStatus::AwaitingReview => Color::Yellow,
        WorkflowStatus::Error => Color::Red,
        WorkflowStatus::Rejected | WorkflowStatus::Cancelled => Color::DarkGrey,
        _ => Color::Cyan,
    }
}

fn status_cell(status: WorkflowStatus) -> Cell {
    Cell::new(status.as_str()).fg(status_color(status))
}

fn format_status(status: WorkflowStatus) -> String {
    let styled = match status {
        WorkflowStatus::Completed => style(status.as_str()).green().bold(),
        WorkflowStatus::AwaitingReview => style(status.as_str()).yellow().bold(),
        WorkflowStatus::Error => style(status.as_str()).red().bold(),
        WorkflowStatus::Rejected | WorkflowStatus::Cancelled => style(status.as_str()).dim(),
        _ => style(status.as_str()).cyan(),
    };
    styled.to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = WorkflowId::new();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
        let err = parse_id("not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_status_colors() {
        assert_eq!(status_color(WorkflowStatus::Completed), Color::Green);
        assert_eq!(status_color(WorkflowStatus::Error), Color::Red);
        assert_eq!(status_color(WorkflowStatus::Validating), Color::Cyan);
    }
}
