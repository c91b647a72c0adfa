//! Database inspector tools.
//!
//! A successful schema fetch stamps `db_schema_checked_at` on the project
//! and saves immediately — the hook reads that flag through the enforcement
//! snapshot, so it must hit disk before the response goes out.

use std::sync::Arc;

use chainguard_core::config::DB_SCHEMA_CACHE_TTL;
use chainguard_core::db::{format_schema, validate_identifier, DbConfig, DbEngine};
use chainguard_core::error::{ChainguardError, Result};

use crate::dispatch::ToolCall;
use crate::handlers::{arg_bool, arg_str, arg_u64, required_str, AppState};

pub async fn db_connect(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let features = call.project.state().await.features();
    if !features.db_enforcement {
        return Ok(vec![
            "Database inspection is not active in this mode.".to_string()
        ]);
    }

    let engine = match arg_str(&call.args, "db_type") {
        Some(raw) => DbEngine::parse(raw).ok_or_else(|| {
            ChainguardError::InvalidInput(format!(
                "unknown db_type `{}` (mysql, postgres, sqlite)",
                raw
            ))
        })?,
        None => DbEngine::Mysql,
    };

    let config = DbConfig {
        host: arg_str(&call.args, "host").unwrap_or("localhost").to_string(),
        port: arg_u64(&call.args, "port").unwrap_or(3306) as u16,
        user: arg_str(&call.args, "user").unwrap_or("").to_string(),
        password: call
            .args
            .get("password")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
            .to_string(),
        database: required_str(&call.args, "database")?.to_string(),
        engine,
    };

    let inspector = state.inspectors.inspector(&call.project.project_id).await;
    let message = inspector.lock().await.connect(config).await?;

    let mut project_state = call.project.state().await;
    project_state.add_action("db: connected");
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![format!(
        "{}\nNext: db_schema to load the live schema before writing SQL.",
        message
    )])
}

pub async fn db_schema(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let refresh = arg_bool(&call.args, "refresh");

    let inspector = state.inspectors.inspector(&call.project.project_id).await;
    let mut inspector = inspector.lock().await;
    let schema = inspector.get_schema(refresh).await?;
    let rendered = format_schema(&schema, DB_SCHEMA_CACHE_TTL);
    drop(inspector);

    // Side effect of a successful fetch: the freshness flag the hook enforces.
    let mut project_state = call.project.state().await;
    project_state.set_schema_checked();
    project_state.add_action("db: schema checked");
    project_state.touch();
    call.project.save(&project_state, true).await?;

    Ok(vec![rendered])
}

pub async fn db_table(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let table = required_str(&call.args, "table")?;
    if !validate_identifier(table) {
        return Err(ChainguardError::InvalidInput(format!(
            "invalid table name: {}",
            table
        )));
    }
    let sample = arg_bool(&call.args, "sample");

    let inspector = state.inspectors.inspector(&call.project.project_id).await;
    let details = inspector.lock().await.table_details(table, sample).await?;
    Ok(vec![details])
}

pub async fn db_disconnect(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let cleared = state.inspectors.clear(&call.project.project_id).await;

    let mut project_state = call.project.state().await;
    project_state.add_action("db: disconnected");
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![if cleared {
        "Disconnected; schema cache dropped.".to_string()
    } else {
        "No active database connection.".to_string()
    }])
}
