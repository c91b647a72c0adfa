//! End-to-end scenarios through the dispatcher, exercising the scope gate,
//! the tracking cascade, the enforcement snapshot and the completion gate
//! the way the tool channel would.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use chainguard_core::config::SCOPE_BLOCKED_TEXT;
use chainguard_protocol::{
    project_fingerprint, resolve_identity_source, EnforcementSnapshot, ToolRequest,
    ENFORCEMENT_STATE_FILE,
};
use chainguard_server::{AppState, Dispatcher};

const CTX: &str = "\u{1F517}";

struct Harness {
    _temp: tempfile::TempDir,
    home: PathBuf,
    project_dir: PathBuf,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path().join("home");
        let project_dir = temp.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let state = Arc::new(AppState::new(home.clone()));
        let dispatcher = Dispatcher::new(state);
        Self {
            _temp: temp,
            home,
            project_dir,
            dispatcher,
        }
    }

    async fn call(&self, tool: &str, mut args: Value) -> Vec<String> {
        let map = args.as_object_mut().unwrap();
        map.insert(
            "working_dir".to_string(),
            json!(self.project_dir.to_string_lossy()),
        );
        map.entry("ctx".to_string()).or_insert(json!(CTX));

        let response = self
            .dispatcher
            .dispatch(ToolRequest {
                tool: tool.to_string(),
                id: None,
                arguments: args,
            })
            .await;
        response.chunks
    }

    fn project_id(&self) -> String {
        project_fingerprint(&resolve_identity_source(&self.project_dir))
    }

    fn snapshot(&self) -> EnforcementSnapshot {
        let path = self
            .home
            .join("projects")
            .join(self.project_id())
            .join(ENFORCEMENT_STATE_FILE);
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn write_project_file(&self, name: &str, content: &str) {
        let path = self.project_dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    async fn set_scope(&self, description: &str, mode: &str, criteria: Vec<&str>) {
        let chunks = self
            .call(
                "set_scope",
                json!({
                    "description": description,
                    "mode": mode,
                    "acceptance_criteria": criteria,
                }),
            )
            .await;
        assert!(
            chunks[0].starts_with(&format!("✓ Scope: {}", description)),
            "unexpected set_scope response: {:?}",
            chunks
        );
    }
}

#[tokio::test]
async fn tools_are_scope_blocked_until_set_scope() {
    let harness = Harness::new();

    let chunks = harness.call("track", json!({"file": "x.py"})).await;
    assert_eq!(chunks, vec![SCOPE_BLOCKED_TEXT.to_string()]);

    harness.set_scope("impl A", "programming", vec![]).await;
    let chunks = harness.call("status", json!({})).await;
    assert!(chunks[0].contains("impl A"));
}

#[tokio::test]
async fn syntax_failure_is_indexed_and_recallable() {
    let harness = Harness::new();
    harness.set_scope("fix config", "programming", vec![]).await;
    harness.write_project_file("config.json", "{broken json");

    let chunks = harness
        .call("track", json!({"file": "config.json", "action": "edit"}))
        .await;
    let diagnostic = chunks.join("\n");
    assert!(diagnostic.contains("SYNTAX_FAIL"), "{}", diagnostic);
    assert!(diagnostic.contains("JSON"), "{}", diagnostic);

    let chunks = harness
        .call("recall", json!({"query": "json parse error"}))
        .await;
    assert!(
        chunks[0].contains("match(es)"),
        "recall found nothing: {:?}",
        chunks
    );
}

#[tokio::test]
async fn clean_track_is_silent() {
    let harness = Harness::new();
    harness.set_scope("impl A", "programming", vec![]).await;
    harness.write_project_file("ok.json", r#"{"fine": true}"#);

    let chunks = harness.call("track", json!({"file": "ok.json"})).await;
    assert_eq!(chunks, vec![String::new()]);
}

#[tokio::test]
async fn content_mode_skips_validation_and_counts_words() {
    let harness = Harness::new();
    harness.set_scope("write book", "content", vec![]).await;
    harness.write_project_file("chapter1.md", "one two three four five");

    let chunks = harness.call("track", json!({"file": "chapter1.md"})).await;
    assert!(
        !chunks.join("\n").contains("SYNTAX_FAIL"),
        "content mode must not validate: {:?}",
        chunks
    );

    let chunks = harness.call("word_count", json!({})).await;
    assert!(chunks[0].contains("Total: 5 words"), "{:?}", chunks);
}

#[tokio::test]
async fn schema_track_invalidates_snapshot_and_db_schema_restores_it() {
    let harness = Harness::new();
    harness.set_scope("schema work", "programming", vec![]).await;

    // A fresh schema check, then a schema-file edit that must clear it.
    {
        let db_path = harness.project_dir.join("app.db");
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);")
            .unwrap();
    }
    let chunks = harness
        .call(
            "db_connect",
            json!({
                "db_type": "sqlite",
                "database": harness.project_dir.join("app.db").to_string_lossy(),
            }),
        )
        .await;
    assert!(chunks[0].contains("connected"), "{:?}", chunks);

    let chunks = harness.call("db_schema", json!({})).await;
    assert!(chunks[0].contains("users (2 cols"), "{:?}", chunks);
    assert!(!harness.snapshot().db_schema_checked_at.is_empty());

    harness.write_project_file("db/001_create.sql", "CREATE TABLE x (id int);");
    let chunks = harness
        .call("track", json!({"file": "db/001_create.sql"}))
        .await;
    assert!(chunks.join("\n").contains("SCHEMA STALE"), "{:?}", chunks);
    assert!(harness.snapshot().db_schema_checked_at.is_empty());

    // Re-inspecting restores the flag for the hook.
    harness.call("db_schema", json!({})).await;
    assert!(!harness.snapshot().db_schema_checked_at.is_empty());
}

#[tokio::test]
async fn counters_respect_validation_invariant() {
    let harness = Harness::new();
    harness.set_scope("impl A", "programming", vec![]).await;

    for i in 0..4 {
        harness.write_project_file(&format!("f{}.json", i), "{}");
        harness
            .call("track", json!({"file": format!("f{}.json", i)}))
            .await;
    }
    harness.call("validate", json!({"status": "PASS"})).await;
    harness.write_project_file("f9.json", "{}");
    harness.call("track", json!({"file": "f9.json"})).await;

    let chunks = harness.call("status", json!({})).await;
    // F5/V1: five files changed, one since the PASS reset.
    assert!(chunks[0].contains("F5/V1"), "{:?}", chunks);
}

#[tokio::test]
async fn finish_is_two_phase_and_gates_on_criteria() {
    let harness = Harness::new();
    harness
        .set_scope("impl A", "programming", vec!["login works"])
        .await;
    harness.write_project_file("notes.txt", "x");
    harness.call("track", json!({"file": "notes.txt"})).await;

    // Phase one: the impact report, never a completion.
    let chunks = harness.call("finish", json!({})).await;
    assert!(chunks[0].starts_with("IMPACT CHECK"), "{:?}", chunks);

    // Phase two refuses while a criterion is open.
    let chunks = harness.call("finish", json!({"confirmed": true})).await;
    assert!(chunks[0].contains("Not finished"), "{:?}", chunks);
    assert!(chunks[0].contains("criteria"), "{:?}", chunks);

    harness
        .call(
            "check_criteria",
            json!({"criterion": "login works", "fulfilled": true}),
        )
        .await;
    let chunks = harness.call("finish", json!({"confirmed": true})).await;
    assert!(chunks[0].starts_with("✓ Task complete"), "{:?}", chunks);

    let snapshot = harness.snapshot();
    assert!(!snapshot.has_scope);
    assert_eq!(snapshot.phase, "done");
}

#[tokio::test]
async fn blocking_alert_defeats_force() {
    let harness = Harness::new();
    harness.set_scope("impl A", "programming", vec![]).await;
    harness
        .call(
            "alert",
            json!({"message": "LOGIN_REQUIRED", "severity": "blocking"}),
        )
        .await;

    let chunks = harness
        .call("finish", json!({"confirmed": true, "force": true}))
        .await;
    assert!(chunks[0].starts_with("BLOCKED"), "{:?}", chunks);
    assert_eq!(harness.snapshot().blocking_alerts.len(), 1);

    harness.call("clear_alerts", json!({})).await;
    let chunks = harness
        .call("finish", json!({"confirmed": true, "force": true}))
        .await;
    assert!(chunks[0].starts_with("✓ Task complete"), "{:?}", chunks);
}

#[tokio::test]
async fn force_overrides_soft_gate_issues() {
    let harness = Harness::new();
    harness
        .set_scope("impl A", "programming", vec!["unreached criterion"])
        .await;

    let chunks = harness.call("finish", json!({"confirmed": true})).await;
    assert!(chunks[0].contains("Not finished"), "{:?}", chunks);

    let chunks = harness
        .call("finish", json!({"confirmed": true, "force": true}))
        .await;
    assert!(chunks[0].contains("forced past open issues"), "{:?}", chunks);
}

#[tokio::test]
async fn out_of_scope_files_are_flagged_not_rejected() {
    let harness = Harness::new();
    let chunks = harness
        .call(
            "set_scope",
            json!({
                "description": "narrow scope",
                "mode": "programming",
                "modules": ["src/**/*.json"],
            }),
        )
        .await;
    assert!(chunks[0].starts_with("✓ Scope"), "{:?}", chunks);

    harness.write_project_file("other/readme.txt", "hello");
    let chunks = harness
        .call("track", json!({"file": "other/readme.txt"}))
        .await;
    assert!(chunks.join("\n").contains("OOS"), "{:?}", chunks);

    let chunks = harness.call("status", json!({})).await;
    assert!(chunks[0].contains("OOS:1"), "{:?}", chunks);
}

#[tokio::test]
async fn track_batch_summarizes_issues() {
    let harness = Harness::new();
    harness.set_scope("impl A", "programming", vec![]).await;
    harness.write_project_file("good.json", "{}");
    harness.write_project_file("bad.json", "{nope");

    let chunks = harness
        .call("track_batch", json!({"files": ["good.json", "bad.json"]}))
        .await;
    assert!(chunks[0].starts_with("BATCH(2)"), "{:?}", chunks);
    assert!(chunks.join("\n").contains("SYNTAX_FAIL"), "{:?}", chunks);
}

#[tokio::test]
async fn checklist_results_feed_the_gate() {
    let harness = Harness::new();
    let chunks = harness
        .call(
            "set_scope",
            json!({
                "description": "with checks",
                "mode": "programming",
                "checklist": [
                    {"item": "marker exists", "check": "test -f marker.txt"},
                ],
            }),
        )
        .await;
    assert!(chunks[0].contains("Checklist items: 1"), "{:?}", chunks);

    let chunks = harness.call("run_checklist", json!({})).await;
    assert!(chunks[0].contains("0/1 passed"), "{:?}", chunks);

    let chunks = harness.call("finish", json!({"confirmed": true})).await;
    assert!(chunks[0].contains("checklist"), "{:?}", chunks);

    harness.write_project_file("marker.txt", "x");
    let chunks = harness.call("run_checklist", json!({})).await;
    assert!(chunks[0].contains("1/1 passed"), "{:?}", chunks);

    let chunks = harness.call("finish", json!({"confirmed": true})).await;
    assert!(chunks[0].starts_with("✓ Task complete"), "{:?}", chunks);
}

#[tokio::test]
async fn kanban_flow_works_without_scope() {
    let harness = Harness::new();

    harness
        .call("kanban_init", json!({"preset": "programming"}))
        .await;
    let chunks = harness
        .call(
            "kanban_add",
            json!({"title": "write spec", "priority": "high", "detail": "outline first"}),
        )
        .await;
    let card_id = chunks[0]
        .split_whitespace()
        .nth(1)
        .expect("card id in response")
        .to_string();

    let chunks = harness.call("kanban", json!({})).await;
    assert!(chunks[0].contains("write spec"), "{:?}", chunks);

    harness
        .call(
            "kanban_move",
            json!({"card_id": card_id, "to_column": "done"}),
        )
        .await;
    let chunks = harness.call("kanban_show", json!({})).await;
    assert!(chunks[0].contains("(1/1 done)"), "{:?}", chunks);

    harness
        .call("kanban_archive", json!({"card_id": card_id}))
        .await;
    let chunks = harness.call("kanban_history", json!({})).await;
    assert!(chunks[0].contains("write spec"), "{:?}", chunks);
}

#[tokio::test]
async fn state_survives_restart_via_disk() {
    let home;
    let project_dir;
    {
        let harness = Harness::new();
        harness.set_scope("persisted", "devops", vec![]).await;
        harness
            .call("log_command", json!({"command": "nginx -t"}))
            .await;
        home = harness.home.clone();
        project_dir = harness.project_dir.clone();
    }

    let state = Arc::new(AppState::new(home));
    let dispatcher = Dispatcher::new(state);
    let response = dispatcher
        .dispatch(ToolRequest {
            tool: "status".to_string(),
            id: None,
            arguments: json!({
                "working_dir": project_dir.to_string_lossy(),
                "ctx": CTX,
            }),
        })
        .await;
    assert!(response.chunks[0].contains("persisted"), "{:?}", response.chunks);
}
