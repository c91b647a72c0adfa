//! The completion gate and checklist execution.
//!
//! `finish` is two-phase: an impact report first, then the ordered gate.
//! Blocking alerts refuse even `force=true`; everything else yields to an
//! explicit override.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use chainguard_core::analyzers::ImpactAnalyzer;
use chainguard_core::checklist::ChecklistRunner;
use chainguard_core::error::{ChainguardError, Result};
use chainguard_core::history::{HistoryEntry, HistoryManager};
use chainguard_protocol::format_timestamp;

use crate::dispatch::ToolCall;
use crate::handlers::{arg_bool, AppState};

pub async fn run_checklist(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let (items, project_path) = {
        let project_state = call.project.state().await;
        let items = project_state
            .scope
            .as_ref()
            .map(|s| s.checklist.clone())
            .unwrap_or_default();
        (items, project_state.project_path.clone())
    };

    if items.is_empty() {
        return Ok(vec!["No checklist defined for this scope.".to_string()]);
    }

    let outcomes = ChecklistRunner::default()
        .run_all(&items, Path::new(&project_path))
        .await;

    let mut project_state = call.project.state().await;
    let mut lines = Vec::new();
    let mut passed = 0;
    for outcome in &outcomes {
        project_state
            .checklist_results
            .insert(outcome.item.clone(), outcome.passed);
        if outcome.passed {
            passed += 1;
            lines.push(format!("✓ {}", outcome.item));
        } else {
            lines.push(format!("✗ {} — {}", outcome.item, outcome.detail));
        }
    }
    project_state.add_action(&format!("checklist: {}/{}", passed, outcomes.len()));
    project_state.touch();
    call.project.save(&project_state, false).await?;

    lines.insert(0, format!("Checklist: {}/{} passed", passed, outcomes.len()));
    Ok(vec![lines.join("\n")])
}

pub async fn finish(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let confirmed = arg_bool(&call.args, "confirmed");
    let force = arg_bool(&call.args, "force");

    let mut project_state = call.project.state().await;
    if project_state.scope.is_none() {
        return Err(ChainguardError::ScopeMissing);
    }

    // Phase one: the impact report.
    if !confirmed {
        let hints = ImpactAnalyzer::report(&project_state.changed_files);
        project_state.impact_check_pending = true;
        call.project.save(&project_state, true).await?;

        let mut lines = vec![format!(
            "IMPACT CHECK — {} file(s) changed this scope.",
            project_state.changed_files.len()
        )];
        if hints.is_empty() {
            lines.push("No pattern-derived reminders.".to_string());
        } else {
            for hint in hints {
                lines.push(format!("- {}", hint));
            }
        }
        lines.push("Review the above, then call finish(confirmed=true).".to_string());
        return Ok(vec![lines.join("\n")]);
    }

    // Phase two: the gate. First failure wins; advisory issues only warn.
    let (issues, advisories): (Vec<_>, Vec<_>) = project_state
        .completion_issues()
        .into_iter()
        .partition(|issue| !issue.advisory);
    if let Some(first) = issues.first() {
        if first.hard {
            let mut lines = vec![format!(
                "BLOCKED: {} — blocking alerts cannot be overridden, not even with force=true.",
                first.message
            )];
            for detail in &first.details {
                lines.push(format!("  - {}", detail));
            }
            lines.push("Resolve them, acknowledge with clear_alerts, then finish again.".to_string());
            return Ok(vec![lines.join("\n")]);
        }

        if !force {
            let mut lines = vec![format!("Not finished: {}", first.message)];
            for detail in &first.details {
                lines.push(format!("  - {}", detail));
            }
            if issues.len() > 1 {
                lines.push(format!("({} more issue(s) behind this one.)", issues.len() - 1));
            }
            lines.push("Fix the issues or pass force=true to override.".to_string());
            return Ok(vec![lines.join("\n")]);
        }
    }

    let forced = !issues.is_empty();
    let scope_desc = project_state
        .scope
        .as_ref()
        .map(|s| s.description.clone())
        .unwrap_or_default();
    let scope_id = project_state
        .scope
        .as_ref()
        .map(|s| s.created_at.clone())
        .unwrap_or_default();
    let files_changed = project_state.files_changed;

    project_state.finish_scope();
    call.project.save(&project_state, true).await?;
    drop(project_state);

    let history = HistoryManager::new(&call.project.dir, state.manager.path_locks());
    history
        .log_change(&HistoryEntry {
            ts: format_timestamp(Utc::now()),
            file: String::new(),
            action: if forced { "finish(forced)" } else { "finish" }.to_string(),
            validation: "PASS".to_string(),
            scope_id,
            scope_desc: scope_desc.clone(),
            fix_applied: None,
        })
        .await?;

    let mut lines = vec![format!(
        "✓ Task complete: {} ({} file(s) changed{}). Scope cleared, phase=done.",
        scope_desc,
        files_changed,
        if forced { ", forced past open issues" } else { "" }
    )];
    for advisory in &advisories {
        lines.push(format!("Warning: {}", advisory.message));
        for detail in &advisory.details {
            lines.push(format!("  - {}", detail));
        }
    }
    Ok(vec![lines.join("\n")])
}
