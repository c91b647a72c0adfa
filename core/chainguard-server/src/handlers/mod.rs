//! Per-tool handlers, grouped by concern, plus the explicit registry the
//! dispatcher is initialized from.

pub mod db_tools;
pub mod finish;
pub mod history_tools;
pub mod http;
pub mod kanban;
pub mod modes;
pub mod scope;
pub mod testing;
pub mod track;

use std::path::PathBuf;

use serde_json::Value;

use chainguard_core::db::InspectorRegistry;
use chainguard_core::error::{ChainguardError, Result};
use chainguard_core::http_session::HttpSessionManager;
use chainguard_core::project::ProjectManager;
use chainguard_core::validators::SyntaxValidator;

use crate::dispatch::HandlerFn;

/// Shared server state: the project manager plus the per-concern managers.
pub struct AppState {
    pub manager: ProjectManager,
    pub sessions: HttpSessionManager,
    pub inspectors: InspectorRegistry,
    pub validator: SyntaxValidator,
}

impl AppState {
    pub fn new(home: PathBuf) -> Self {
        Self {
            manager: ProjectManager::new(home),
            sessions: HttpSessionManager::new(),
            inspectors: InspectorRegistry::new(),
            validator: SyntaxValidator::default(),
        }
    }
}

/// The full tool surface. Initialized once at startup; the dispatcher owns
/// the resulting map.
pub fn registry() -> Vec<(&'static str, HandlerFn)> {
    let table: Vec<(&'static str, HandlerFn)> = vec![
        // Scope and status
        ("set_scope", |s, c| Box::pin(scope::set_scope(s, c))),
        ("status", |s, c| Box::pin(scope::status(s, c))),
        ("context", |s, c| Box::pin(scope::context(s, c))),
        ("set_phase", |s, c| Box::pin(scope::set_phase(s, c))),
        ("check_criteria", |s, c| Box::pin(scope::check_criteria(s, c))),
        ("validate", |s, c| Box::pin(scope::validate(s, c))),
        ("alert", |s, c| Box::pin(scope::alert(s, c))),
        ("clear_alerts", |s, c| Box::pin(scope::clear_alerts(s, c))),
        ("projects", |s, c| Box::pin(scope::projects(s, c))),
        ("config", |s, c| Box::pin(scope::config(s, c))),
        // Tracking and analysis
        ("track", |s, c| Box::pin(track::track(s, c))),
        ("track_batch", |s, c| Box::pin(track::track_batch(s, c))),
        ("analyze", |s, c| Box::pin(track::analyze(s, c))),
        // Completion
        ("run_checklist", |s, c| Box::pin(finish::run_checklist(s, c))),
        ("finish", |s, c| Box::pin(finish::finish(s, c))),
        // HTTP testing
        ("test_endpoint", |s, c| Box::pin(http::test_endpoint(s, c))),
        ("login", |s, c| Box::pin(http::login(s, c))),
        ("set_base_url", |s, c| Box::pin(http::set_base_url(s, c))),
        ("clear_session", |s, c| Box::pin(http::clear_session(s, c))),
        ("health_check", |s, c| Box::pin(http::health_check(s, c))),
        // Test runner
        ("test_config", |s, c| Box::pin(testing::test_config(s, c))),
        ("run_tests", |s, c| Box::pin(testing::run_tests(s, c))),
        ("test_status", |s, c| Box::pin(testing::test_status(s, c))),
        // History and error memory
        ("recall", |s, c| Box::pin(history_tools::recall(s, c))),
        ("history", |s, c| Box::pin(history_tools::history(s, c))),
        ("learn", |s, c| Box::pin(history_tools::learn(s, c))),
        // Database inspector
        ("db_connect", |s, c| Box::pin(db_tools::db_connect(s, c))),
        ("db_schema", |s, c| Box::pin(db_tools::db_schema(s, c))),
        ("db_table", |s, c| Box::pin(db_tools::db_table(s, c))),
        ("db_disconnect", |s, c| Box::pin(db_tools::db_disconnect(s, c))),
        // Mode-specific tools
        ("word_count", |s, c| Box::pin(modes::word_count(s, c))),
        ("track_chapter", |s, c| Box::pin(modes::track_chapter(s, c))),
        ("log_command", |s, c| Box::pin(modes::log_command(s, c))),
        ("checkpoint", |s, c| Box::pin(modes::checkpoint(s, c))),
        ("add_source", |s, c| Box::pin(modes::add_source(s, c))),
        ("index_fact", |s, c| Box::pin(modes::index_fact(s, c))),
        ("sources", |s, c| Box::pin(modes::sources(s, c))),
        ("facts", |s, c| Box::pin(modes::facts(s, c))),
        // Kanban
        ("kanban_init", |s, c| Box::pin(kanban::kanban_init(s, c))),
        ("kanban", |s, c| Box::pin(kanban::kanban(s, c))),
        ("kanban_show", |s, c| Box::pin(kanban::kanban_show(s, c))),
        ("kanban_add", |s, c| Box::pin(kanban::kanban_add(s, c))),
        ("kanban_move", |s, c| Box::pin(kanban::kanban_move(s, c))),
        ("kanban_detail", |s, c| Box::pin(kanban::kanban_detail(s, c))),
        ("kanban_update", |s, c| Box::pin(kanban::kanban_update(s, c))),
        ("kanban_delete", |s, c| Box::pin(kanban::kanban_delete(s, c))),
        ("kanban_archive", |s, c| Box::pin(kanban::kanban_archive(s, c))),
        ("kanban_history", |s, c| Box::pin(kanban::kanban_history(s, c))),
    ];
    table
}

// =============================================================================
// Argument helpers: tool arguments arrive as heterogeneous JSON objects and
// are validated here, at the handler boundary.
// =============================================================================

pub fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    arg_str(args, key)
        .ok_or_else(|| ChainguardError::InvalidInput(format!("`{}` is required", key)))
}

pub fn arg_bool(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn arg_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

pub fn arg_str_vec(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_covers_the_full_tool_surface() {
        let names: Vec<&str> = registry().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names.len(), 48);
        for expected in [
            "set_scope",
            "track",
            "finish",
            "db_schema",
            "recall",
            "kanban_archive",
            "health_check",
            "word_count",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn registry_has_no_duplicate_names() {
        let names: Vec<&str> = registry().into_iter().map(|(name, _)| name).collect();
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len());
    }

    #[test]
    fn arg_helpers_validate_shapes() {
        let args = json!({
            "name": "  padded  ",
            "empty": "",
            "flag": true,
            "n": 7,
            "list": ["a", "b", 3]
        });

        assert_eq!(arg_str(&args, "name"), Some("padded"));
        assert_eq!(arg_str(&args, "empty"), None);
        assert!(required_str(&args, "missing").is_err());
        assert!(arg_bool(&args, "flag"));
        assert!(!arg_bool(&args, "missing"));
        assert_eq!(arg_u64(&args, "n"), Some(7));
        assert_eq!(arg_str_vec(&args, "list"), vec!["a", "b"]);
    }
}
