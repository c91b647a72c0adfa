//! Error memory tools: recall, history, learn.

use std::sync::Arc;

use chainguard_core::error::Result;
use chainguard_core::history::HistoryManager;

use crate::dispatch::ToolCall;
use crate::handlers::{arg_bool, arg_str, arg_u64, required_str, AppState};

pub async fn recall(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let query = required_str(&call.args, "query")?;
    let limit = arg_u64(&call.args, "limit").unwrap_or(5) as usize;

    let history = HistoryManager::new(&call.project.dir, state.manager.path_locks());
    let matches = history.recall(query, limit).await?;

    if matches.is_empty() {
        return Ok(vec![format!("No past errors matching `{}`.", query)]);
    }

    let mut lines = vec![format!("{} match(es) for `{}`:", matches.len(), query)];
    for (score, entry) in &matches {
        lines.push(format!(
            "- [{:.0}%] {} ({}): {}",
            score * 100.0,
            entry.error_type,
            entry.file_pattern,
            entry.error_msg.chars().take(80).collect::<String>()
        ));
        match &entry.resolution {
            Some(resolution) => lines.push(format!("    fix: {}", resolution)),
            None => lines.push("    fix: (none recorded — use learn)".to_string()),
        }
    }
    Ok(vec![lines.join("\n")])
}

pub async fn history(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let limit = arg_u64(&call.args, "limit").unwrap_or(20) as usize;
    let scope_only = arg_bool(&call.args, "scope_only");

    let scope_id = if scope_only {
        call.project
            .state()
            .await
            .scope
            .as_ref()
            .map(|s| s.created_at.clone())
    } else {
        None
    };

    let history = HistoryManager::new(&call.project.dir, state.manager.path_locks());
    let entries = history.recent(limit, scope_id.as_deref()).await?;

    if entries.is_empty() {
        return Ok(vec!["No history yet.".to_string()]);
    }

    let lines: Vec<String> = entries
        .iter()
        .map(|e| {
            format!(
                "{} {} {} [{}]",
                e.ts.get(..16).unwrap_or(&e.ts),
                e.action,
                e.file,
                e.validation
            )
        })
        .collect();
    Ok(vec![lines.join("\n")])
}

pub async fn learn(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let resolution = required_str(&call.args, "resolution")?;
    let file_pattern = arg_str(&call.args, "file_pattern");
    let error_type = arg_str(&call.args, "error_type");

    let history = HistoryManager::new(&call.project.dir, state.manager.path_locks());
    match history.learn(resolution, file_pattern, error_type).await? {
        Some(entry) => Ok(vec![format!(
            "Learned: {} ({}) -> {}",
            entry.error_type, entry.file_pattern, resolution
        )]),
        None => Ok(vec![
            "No matching error to attach this resolution to.".to_string()
        ]),
    }
}
