//! Kanban tools. Always allowed — the board is planning surface, not a
//! file-writing action, so it works before a scope exists.

use std::path::PathBuf;
use std::sync::Arc;

use chainguard_core::error::Result;
use chainguard_core::kanban::KanbanManager;

use crate::dispatch::ToolCall;
use crate::handlers::{arg_str, arg_str_vec, arg_u64, required_str, AppState};

async fn project_tree(call: &ToolCall) -> PathBuf {
    PathBuf::from(call.project.state().await.project_path.clone())
}

pub async fn kanban_init(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let columns = {
        let columns = arg_str_vec(&call.args, "columns");
        if columns.is_empty() {
            None
        } else {
            Some(columns)
        }
    };
    let preset = arg_str(&call.args, "preset");

    let tree = project_tree(&call).await;
    let board = KanbanManager::init_board(&tree, columns, preset)?;

    let mut project_state = call.project.state().await;
    project_state.kanban_board = Some(".claude/kanban.yaml".to_string());
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![format!(
        "Kanban board ready with columns: {}",
        board.columns.join(" -> ")
    )])
}

pub async fn kanban(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let tree = project_tree(&call).await;
    Ok(vec![KanbanManager::board_view(&tree)])
}

pub async fn kanban_show(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let tree = project_tree(&call).await;
    Ok(vec![KanbanManager::full_board_view(&tree)])
}

pub async fn kanban_add(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let title = required_str(&call.args, "title")?;
    let tree = project_tree(&call).await;

    let card = KanbanManager::add_card(
        &tree,
        title,
        arg_str(&call.args, "column"),
        arg_str(&call.args, "priority").unwrap_or("medium"),
        arg_str_vec(&call.args, "depends_on"),
        arg_str_vec(&call.args, "tags"),
        arg_str(&call.args, "detail"),
    )?;

    Ok(vec![format!(
        "Card {} added to {}: {}",
        card.id, card.column, card.title
    )])
}

pub async fn kanban_move(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let card_id = required_str(&call.args, "card_id")?;
    let to_column = required_str(&call.args, "to_column")?;
    let tree = project_tree(&call).await;

    let card = KanbanManager::move_card(&tree, card_id, to_column)?;
    Ok(vec![format!("Card {} -> {}", card.id, card.column)])
}

pub async fn kanban_detail(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let card_id = required_str(&call.args, "card_id")?;
    let tree = project_tree(&call).await;

    let board = KanbanManager::load_board(&tree);
    let Some(card) = board.card(card_id) else {
        return Ok(vec![format!("No card with id {}.", card_id)]);
    };

    let mut lines = vec![
        format!("[{}] {} ({}, {})", card.id, card.title, card.column, card.priority),
    ];
    if !card.tags.is_empty() {
        lines.push(format!("tags: {}", card.tags.join(", ")));
    }
    if !card.depends_on.is_empty() {
        lines.push(format!("depends on: {}", card.depends_on.join(", ")));
    }
    match KanbanManager::card_detail(&tree, card_id) {
        Some(detail) => {
            lines.push(String::new());
            lines.push(detail);
        }
        None => lines.push("(no detail file)".to_string()),
    }
    Ok(vec![lines.join("\n")])
}

pub async fn kanban_update(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let card_id = required_str(&call.args, "card_id")?;
    let tree = project_tree(&call).await;

    let tags = call
        .args
        .get("tags")
        .and_then(serde_json::Value::as_array)
        .map(|_| arg_str_vec(&call.args, "tags"));
    let depends_on = call
        .args
        .get("depends_on")
        .and_then(serde_json::Value::as_array)
        .map(|_| arg_str_vec(&call.args, "depends_on"));

    let card = KanbanManager::update_card(
        &tree,
        card_id,
        arg_str(&call.args, "title"),
        arg_str(&call.args, "priority"),
        tags,
        depends_on,
        arg_str(&call.args, "detail"),
    )?;
    Ok(vec![format!("Card {} updated: {}", card.id, card.title)])
}

pub async fn kanban_delete(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let card_id = required_str(&call.args, "card_id")?;
    let tree = project_tree(&call).await;

    Ok(vec![if KanbanManager::delete_card(&tree, card_id)? {
        format!("Card {} deleted.", card_id)
    } else {
        format!("No card with id {}.", card_id)
    }])
}

pub async fn kanban_archive(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let card_id = required_str(&call.args, "card_id")?;
    let tree = project_tree(&call).await;

    Ok(vec![if KanbanManager::archive_card(&tree, card_id)? {
        format!("Card {} archived.", card_id)
    } else {
        format!("No card with id {}.", card_id)
    }])
}

pub async fn kanban_history(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let limit = arg_u64(&call.args, "limit").unwrap_or(10) as usize;
    let tree = project_tree(&call).await;
    Ok(vec![KanbanManager::archive_view(&tree, limit)])
}
