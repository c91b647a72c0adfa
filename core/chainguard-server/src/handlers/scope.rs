//! Scope lifecycle, status, phases, criteria, validation records, alerts and
//! server administration.

use std::sync::Arc;

use chrono::Utc;

use chainguard_core::config::SCOPE_DESCRIPTION_MAX;
use chainguard_core::error::{ChainguardError, Result};
use chainguard_core::mode::{mode_preamble, TaskMode};
use chainguard_core::model::{Alert, AlertSeverity, ChecklistItem, Phase, ScopeDefinition};
use chainguard_protocol::format_timestamp;

use crate::dispatch::ToolCall;
use crate::handlers::{arg_str, arg_str_vec, arg_u64, required_str, AppState};

pub async fn set_scope(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let mut description = required_str(&call.args, "description")?.to_string();
    let mut chunks = Vec::new();

    if description.chars().count() > SCOPE_DESCRIPTION_MAX {
        description = description.chars().take(SCOPE_DESCRIPTION_MAX).collect();
        chunks.push(format!(
            "Note: description truncated to {} characters.",
            SCOPE_DESCRIPTION_MAX
        ));
    }

    let mode_arg = arg_str(&call.args, "mode");
    let mode = mode_arg.map(TaskMode::parse).unwrap_or_default();
    if let Some(raw) = mode_arg {
        let normalized = raw.trim().to_ascii_lowercase();
        if mode == TaskMode::Programming && normalized != "programming" {
            chunks.push(format!("Note: unknown mode `{}`, using programming.", raw));
        }
    }

    let checklist: Vec<ChecklistItem> = call
        .args
        .get("checklist")
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(ChecklistItem {
                        item: item.get("item")?.as_str()?.to_string(),
                        check: item.get("check")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let scope = ScopeDefinition {
        description: description.clone(),
        modules: arg_str_vec(&call.args, "modules"),
        acceptance_criteria: arg_str_vec(&call.args, "acceptance_criteria"),
        checklist,
        created_at: format_timestamp(Utc::now()),
    };

    let criteria = scope.acceptance_criteria.len();
    let checks = scope.checklist.len();
    let modules = scope.modules.len();

    let mut state = call.project.state().await;
    state.begin_scope(scope, mode);
    call.project.save(&state, true).await?;
    drop(state);

    let mut summary = format!("✓ Scope: {}\nMode: {}", description, mode.as_str());
    if modules > 0 {
        summary.push_str(&format!("\nModules: {}", modules));
    }
    if criteria > 0 {
        summary.push_str(&format!("\nAcceptance criteria: {}", criteria));
    }
    if checks > 0 {
        summary.push_str(&format!("\nChecklist items: {}", checks));
    }

    chunks.insert(0, summary);
    chunks.push(mode_preamble(mode).to_string());
    Ok(chunks)
}

pub async fn status(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let threshold = state.manager.config().validation_reminder_threshold;
    let project = call.project.state().await;
    let mut line = project.status_line(threshold);
    let mode_line = project.mode_status_line();
    if !mode_line.is_empty() {
        line.push('\n');
        line.push_str(&mode_line);
    }
    Ok(vec![line])
}

pub async fn context(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let project = call.project.state().await;
    let mut lines = vec![
        format!("Project: {} ({})", project.project_name, project.project_id),
        format!("Path: {}", project.project_path),
        format!("Phase: {} | Mode: {}", project.phase.as_str(), project.mode.as_str()),
    ];

    match &project.scope {
        Some(scope) => {
            lines.push(format!("Scope: {}", scope.description));
            if !scope.modules.is_empty() {
                lines.push(format!("Modules: {}", scope.modules.join(", ")));
            }
            for criterion in &scope.acceptance_criteria {
                let mark = if project.criteria_status.get(criterion).copied().unwrap_or(false) {
                    "✓"
                } else {
                    "✗"
                };
                lines.push(format!("  {} {}", mark, criterion));
            }
        }
        None => lines.push("Scope: none".to_string()),
    }

    lines.push(format!(
        "Files: {} changed, {} since validation | Validations: {} passed, {} failed",
        project.files_changed,
        project.files_since_validation,
        project.validations_passed,
        project.validations_failed
    ));

    if !project.checklist_results.is_empty() {
        let passed = project.checklist_results.values().filter(|v| **v).count();
        lines.push(format!(
            "Checklist: {}/{} passed",
            passed,
            project.checklist_results.len()
        ));
    }

    match project.schema_check_age() {
        Some(age) => lines.push(format!("DB schema checked {}s ago", age)),
        None => lines.push("DB schema not checked".to_string()),
    }

    if project.http_tests_performed > 0 {
        lines.push(format!("HTTP tests: {}", project.http_tests_performed));
    }

    let open: Vec<String> = project
        .unacknowledged_alerts()
        .map(|a| format!("  [{:?}] {}", a.severity, a.message))
        .collect();
    if !open.is_empty() {
        lines.push(format!("Alerts ({}):", open.len()));
        lines.extend(open);
    }

    if !project.out_of_scope_files.is_empty() {
        lines.push(format!(
            "Out of scope: {}",
            project.out_of_scope_files.join(", ")
        ));
    }

    if !project.recent_actions.is_empty() {
        lines.push("Recent:".to_string());
        for action in &project.recent_actions {
            lines.push(format!("  {}", action));
        }
    }

    Ok(vec![lines.join("\n")])
}

pub async fn set_phase(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let phase_arg = required_str(&call.args, "phase")?;
    let phase = Phase::parse(phase_arg).ok_or_else(|| {
        ChainguardError::InvalidInput(format!(
            "unknown phase `{}` (planning, implementation, testing, review, done)",
            phase_arg
        ))
    })?;

    let mut state = call.project.state().await;
    state.phase = phase;
    if let Some(task) = arg_str(&call.args, "task") {
        state.current_task = task.to_string();
    }
    state.add_action(&format!("phase: {}", phase.as_str()));
    state.touch();
    call.project.save(&state, false).await?;

    Ok(vec![format!("Phase: {}", phase.as_str())])
}

pub async fn check_criteria(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let mut state = call.project.state().await;
    let criteria = state
        .scope
        .as_ref()
        .map(|s| s.acceptance_criteria.clone())
        .unwrap_or_default();

    let Some(criterion) = arg_str(&call.args, "criterion") else {
        if criteria.is_empty() {
            return Ok(vec!["No acceptance criteria defined.".to_string()]);
        }
        let lines: Vec<String> = criteria
            .iter()
            .map(|c| {
                let mark = if state.criteria_status.get(c).copied().unwrap_or(false) {
                    "✓"
                } else {
                    "✗"
                };
                format!("{} {}", mark, c)
            })
            .collect();
        return Ok(vec![lines.join("\n")]);
    };

    if !criteria.iter().any(|c| c == criterion) {
        return Err(ChainguardError::InvalidInput(format!(
            "`{}` is not one of the scope's acceptance criteria",
            criterion
        )));
    }

    let fulfilled = call
        .args
        .get("fulfilled")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(true);
    state
        .criteria_status
        .insert(criterion.to_string(), fulfilled);
    state.touch();
    call.project.save(&state, false).await?;

    let done = criteria
        .iter()
        .filter(|c| state.criteria_status.get(*c).copied().unwrap_or(false))
        .count();
    Ok(vec![format!(
        "{} {} ({}/{} fulfilled)",
        if fulfilled { "✓" } else { "✗" },
        criterion,
        done,
        criteria.len()
    )])
}

pub async fn validate(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let status_arg = required_str(&call.args, "status")?;
    let mut state = call.project.state().await;

    let line = match status_arg.to_ascii_uppercase().as_str() {
        "PASS" => {
            state.validations_passed += 1;
            state.files_since_validation = 0;
            state.open_validation_failure = false;
            state.last_validation = format_timestamp(Utc::now());
            "Validation recorded: PASS (change counter reset)".to_string()
        }
        "FAIL" => {
            state.validations_failed += 1;
            state.open_validation_failure = true;
            format!(
                "Validation recorded: FAIL{}",
                arg_str(&call.args, "note")
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default()
            )
        }
        other => {
            return Err(ChainguardError::InvalidInput(format!(
                "status must be PASS or FAIL, got `{}`",
                other
            )))
        }
    };

    state.add_action(&format!("validate: {}", status_arg.to_ascii_uppercase()));
    state.touch();
    call.project.save(&state, false).await?;
    Ok(vec![line])
}

pub async fn alert(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let message = required_str(&call.args, "message")?;
    let severity = match arg_str(&call.args, "severity") {
        Some("info") => AlertSeverity::Info,
        Some("blocking") => AlertSeverity::Blocking,
        _ => AlertSeverity::Warn,
    };

    let mut state = call.project.state().await;
    state.alerts.push(Alert {
        message: message.to_string(),
        severity,
        created_at: format_timestamp(Utc::now()),
        acknowledged: false,
    });
    state.touch();
    call.project.save(&state, false).await?;

    Ok(vec![format!("Alert added ({:?}): {}", severity, message)])
}

pub async fn clear_alerts(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let mut state = call.project.state().await;
    let open = state.unacknowledged_alerts().count();
    for alert in &mut state.alerts {
        alert.acknowledged = true;
    }
    state.touch();
    call.project.save(&state, false).await?;
    Ok(vec![format!("{} alert(s) acknowledged.", open)])
}

pub async fn projects(state: Arc<AppState>, _call: ToolCall) -> Result<Vec<String>> {
    let threshold = state.manager.config().validation_reminder_threshold;
    let projects = state.manager.list_projects();
    if projects.is_empty() {
        return Ok(vec!["No tracked projects.".to_string()]);
    }
    let lines: Vec<String> = projects.iter().map(|p| p.status_line(threshold)).collect();
    Ok(vec![lines.join("\n")])
}

pub async fn config(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    if let Some(threshold) = arg_u64(&call.args, "validation_threshold") {
        if threshold == 0 || threshold > 1000 {
            return Err(ChainguardError::InvalidInput(
                "validation_threshold must be between 1 and 1000".to_string(),
            ));
        }
        state.manager.set_validation_threshold(threshold as u32);
    }

    let config = state.manager.config();
    Ok(vec![format!(
        "validation_reminder_threshold = {}",
        config.validation_reminder_threshold
    )])
}
