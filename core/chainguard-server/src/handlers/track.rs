//! File tracking: the auto-validation cascade and the pre-flight analyzer.
//!
//! The cascade order is fixed: path sanitation, schema-change detection,
//! syntax validation, scope membership, counters and history. A track call
//! with nothing to report answers with an empty chunk — silence is the happy
//! path.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use chainguard_core::analyzers::CodeAnalyzer;
use chainguard_core::error::{ChainguardError, Result};
use chainguard_core::history::{file_pattern, format_auto_suggest, ErrorEntry, HistoryEntry, HistoryManager};
use chainguard_core::mode::TaskMode;
use chainguard_core::paths::sanitize_path;
use chainguard_core::validators::{ValidationOutcome, ValidationStatus};
use chainguard_protocol::{format_timestamp, is_schema_file};

use crate::dispatch::ToolCall;
use crate::handlers::{arg_bool, arg_str, arg_str_vec, required_str, AppState};

/// Extensions whose whitespace-token count feeds the content-mode total.
const TEXT_EXTENSIONS: &[&str] = &["md", "txt", "rst", "adoc", "tex"];

fn language_label(checked: &str) -> &'static str {
    match checked {
        "php" => "PHP Syntax",
        "javascript" => "JavaScript Syntax",
        "python" => "Python Syntax",
        "typescript" => "TypeScript Syntax",
        "json" => "JSON",
        _ => "Syntax",
    }
}

pub async fn track(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let file = required_str(&call.args, "file")?.to_string();
    let action = arg_str(&call.args, "action").unwrap_or("edit").to_string();
    let skip_validation = arg_bool(&call.args, "skip_validation");

    let mut chunks = track_one(&state, &call, &file, &action, skip_validation).await?;

    let project_state = call.project.state().await;
    call.project.save(&project_state, false).await?;
    drop(project_state);

    if chunks.is_empty() {
        chunks.push(String::new());
    }
    Ok(chunks)
}

pub async fn track_batch(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let files = arg_str_vec(&call.args, "files");
    if files.is_empty() {
        return Err(ChainguardError::InvalidInput("`files` is required".to_string()));
    }
    let action = arg_str(&call.args, "action").unwrap_or("edit").to_string();
    let skip_validation = arg_bool(&call.args, "skip_validation");

    let mut issues = Vec::new();
    for file in &files {
        issues.extend(track_one(&state, &call, file, &action, skip_validation).await?);
    }

    {
        let mut project_state = call.project.state().await;
        project_state.add_action(&format!("BATCH({}): {}", files.len(), action));
        call.project.save(&project_state, false).await?;
    }

    let mut chunks = vec![if issues.is_empty() {
        format!("BATCH({}): all clean", files.len())
    } else {
        format!("BATCH({}): {} issue(s)", files.len(), issues.len())
    }];
    chunks.extend(issues);
    Ok(chunks)
}

/// Run the cascade for one file. Mutates project state but does not save;
/// callers save once.
async fn track_one(
    state: &AppState,
    call: &ToolCall,
    file: &str,
    action: &str,
    skip_validation: bool,
) -> Result<Vec<String>> {
    let (features, project_path, scope_desc, scope_id, project_id) = {
        let project_state = call.project.state().await;
        (
            project_state.features(),
            project_state.project_path.clone(),
            project_state
                .scope
                .as_ref()
                .map(|s| s.description.clone())
                .unwrap_or_default(),
            project_state
                .scope
                .as_ref()
                .map(|s| s.created_at.clone())
                .unwrap_or_default(),
            project_state.project_id.clone(),
        )
    };

    if !features.file_tracking {
        return Ok(vec![format!(
            "Note: file tracking is not active in this mode ({} not recorded).",
            file
        )]);
    }

    let mut chunks = Vec::new();

    // 1. Path sanitation.
    let sanitized = sanitize_path(Path::new(&project_path), file);
    if !sanitized.in_project && features.scope_enforcement {
        chunks.push(format!(
            "OOS: {} resolves outside the project root — recorded, but flagged out of scope.",
            file
        ));
    }
    let tracked_name = sanitized.relative.clone().unwrap_or_else(|| file.to_string());

    // 2. Schema-change detection.
    let is_schema = is_schema_file(&tracked_name) || is_schema_file(file);

    // 3. Syntax validation (subprocess; state lock not held).
    let outcome: Option<ValidationOutcome> = if features.syntax_validation
        && !skip_validation
        && action != "delete"
        && sanitized.absolute.exists()
    {
        Some(state.validator.validate(&sanitized.absolute).await)
    } else {
        None
    };

    let history = HistoryManager::new(&call.project.dir, state.manager.path_locks());
    let mut validation_note = if outcome.is_none() { "SKIP" } else { "PASS" }.to_string();

    if let Some(outcome) = &outcome {
        match &outcome.status {
            ValidationStatus::Invalid => {
                let label = language_label(outcome.checked);
                let first_error = outcome
                    .errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "unknown error".to_string());
                validation_note = format!("FAIL:{}", first_error);

                let entry = ErrorEntry {
                    ts: format_timestamp(Utc::now()),
                    file_pattern: file_pattern(&tracked_name),
                    error_type: format!("{}_syntax", outcome.checked),
                    error_msg: outcome.errors.join("; "),
                    scope_desc: scope_desc.clone(),
                    project_id: project_id.clone(),
                    resolution: None,
                };
                let query = format!("{} {}", outcome.checked, entry.error_msg);
                history.index_error(entry).await?;

                let mut diagnostic = format!(
                    "SYNTAX_FAIL: {} error in {}:\n  {}",
                    label,
                    tracked_name,
                    outcome.errors.join("\n  ")
                );
                let similar = history.find_similar_errors(&query).await?;
                let suggestions = format_auto_suggest(&similar);
                if !suggestions.is_empty() {
                    diagnostic.push('\n');
                    diagnostic.push_str(&suggestions);
                }
                chunks.push(diagnostic);
            }
            ValidationStatus::Skipped { reason } => {
                validation_note = "SKIP".to_string();
                tracing::debug!(file = %tracked_name, reason = %reason, "Validation skipped");
            }
            ValidationStatus::Valid => {}
        }
    }

    // 4–5. Scope membership, counters, schema invalidation — one lock.
    {
        let mut project_state = call.project.state().await;

        if is_schema {
            let was_checked = project_state.invalidate_schema_check();
            chunks.push(format!(
                "SCHEMA STALE: {} touches the database schema{} — run db_schema before further schema work.",
                tracked_name,
                if was_checked { " (freshness flag cleared)" } else { "" }
            ));
        }

        if let Some(outcome) = &outcome {
            match outcome.status {
                ValidationStatus::Valid => project_state.validations_passed += 1,
                ValidationStatus::Invalid => {
                    project_state.validations_failed += 1;
                    project_state.open_validation_failure = true;
                }
                ValidationStatus::Skipped { .. } => {}
            }
        }

        let in_scope = project_state.check_file_in_scope(&tracked_name);
        if !in_scope || !sanitized.in_project {
            project_state.add_out_of_scope_file(&tracked_name);
            project_state.add_action(&format!("OOS {}: {}", action, tracked_name));
            if !in_scope && sanitized.in_project {
                chunks.push(format!("OOS: {} is not covered by the scope modules.", tracked_name));
            }
        } else {
            project_state.add_action(&format!("{}: {}", action, tracked_name));
        }

        project_state.files_changed += 1;
        project_state.files_since_validation += 1;
        project_state.add_changed_file(&tracked_name);
        project_state.touch();

        if project_state.mode == TaskMode::Content {
            project_state.word_count_total =
                recount_words(Path::new(&project_path), &project_state.changed_files);
        }
    }

    history
        .log_change(&HistoryEntry {
            ts: format_timestamp(Utc::now()),
            file: tracked_name,
            action: action.to_string(),
            validation: validation_note,
            scope_id,
            scope_desc,
            fix_applied: None,
        })
        .await?;

    Ok(chunks)
}

/// Total whitespace-split tokens across tracked text files.
fn recount_words(project_root: &Path, changed_files: &[String]) -> u64 {
    changed_files
        .iter()
        .filter(|f| {
            Path::new(f)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .filter_map(|f| std::fs::read_to_string(project_root.join(f)).ok())
        .map(|content| content.split_whitespace().count() as u64)
        .sum()
}

pub async fn analyze(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let target = required_str(&call.args, "target")?;
    let project_path = call.project.state().await.project_path.clone();

    let sanitized = sanitize_path(Path::new(&project_path), target);
    let content = tokio::fs::read_to_string(&sanitized.absolute)
        .await
        .map_err(|e| ChainguardError::io(format!("read {}", target), e))?;

    let report = CodeAnalyzer::analyze(&sanitized.absolute, &content);
    let mut lines = vec![format!(
        "{}: {} lines, {} function(s), {} TODO(s)",
        target, report.lines, report.functions, report.todos
    )];
    if !sanitized.in_project {
        lines.push("OOS: target is outside the project root.".to_string());
    }
    for suggestion in &report.suggestions {
        lines.push(format!("- {}", suggestion));
    }
    Ok(vec![lines.join("\n")])
}
