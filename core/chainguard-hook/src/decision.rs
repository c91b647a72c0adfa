//! The blocking decision, re-derived from the enforcement snapshot.
//!
//! Mirrors the server's enforcement semantics without sharing its process:
//! same project-ID derivation, same snapshot schema, same schema-file
//! patterns, all via chainguard-protocol.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs_err as fs;

use chainguard_protocol::{
    find_project_dir, is_schema_file, project_fingerprint, resolve_identity_source,
    EnforcementSnapshot, HookActionInput, DB_SCHEMA_ENFORCE_TTL_SECS, ENFORCEMENT_STATE_FILE,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block(String),
}

/// Evaluate one pending file-writing action against the snapshot.
pub fn decide(action: &HookActionInput, storage_root: &Path, now: DateTime<Utc>) -> Decision {
    let Some(target) = action.target_path() else {
        return Decision::Allow;
    };

    let project_dir = match find_project_dir(target)
        .or_else(|| action.cwd.as_deref().and_then(find_project_dir))
    {
        Some(dir) => dir,
        None => return Decision::Allow,
    };

    let project_id = project_fingerprint(&resolve_identity_source(&project_dir));
    let Some(snapshot) = read_snapshot(storage_root, &project_id) else {
        return Decision::Allow;
    };

    // No declared task means the server never armed enforcement.
    if !snapshot.has_scope {
        return Decision::Allow;
    }

    if is_schema_file(target) && !snapshot.is_schema_fresh(now) {
        let age_note = match snapshot.schema_check_age(now) {
            Some(age) => format!("last checked {}s ago", age),
            None => "never checked".to_string(),
        };
        return Decision::Block(format!(
            "SCHEMA STALE: {} touches the database schema but the live schema was {} \
             (TTL {}s). Run db_schema first.",
            target, age_note, DB_SCHEMA_ENFORCE_TTL_SECS
        ));
    }

    if !snapshot.blocking_alerts.is_empty() {
        let messages: Vec<&str> = snapshot
            .blocking_alerts
            .iter()
            .map(|a| a.message.as_str())
            .collect();
        return Decision::Block(format!(
            "BLOCKED: {} blocking alert(s) open: {}",
            messages.len(),
            messages.join("; ")
        ));
    }

    Decision::Allow
}

fn read_snapshot(storage_root: &Path, project_id: &str) -> Option<EnforcementSnapshot> {
    let path = snapshot_path(storage_root, project_id);
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "Corrupt snapshot, allowing");
            None
        }
    }
}

fn snapshot_path(storage_root: &Path, project_id: &str) -> PathBuf {
    storage_root
        .join("projects")
        .join(project_id)
        .join(ENFORCEMENT_STATE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainguard_protocol::{format_timestamp, BlockingAlert};

    struct Fixture {
        _temp: tempfile::TempDir,
        storage: PathBuf,
        project: PathBuf,
        project_id: String,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let storage = temp.path().join("chainguard-home");
        let project = temp.path().join("site");
        std::fs::create_dir_all(project.join("db")).unwrap();
        std::fs::write(project.join("composer.json"), "{}").unwrap();
        std::fs::write(project.join("db/001_users.sql"), "CREATE TABLE users;").unwrap();
        std::fs::write(project.join("index.php"), "<?php\n").unwrap();

        let project_id = project_fingerprint(&resolve_identity_source(&project));
        Fixture {
            _temp: temp,
            storage,
            project,
            project_id,
        }
    }

    fn write_snapshot(fixture: &Fixture, snapshot: &EnforcementSnapshot) {
        let dir = fixture.storage.join("projects").join(&fixture.project_id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(ENFORCEMENT_STATE_FILE),
            serde_json::to_string_pretty(snapshot).unwrap(),
        )
        .unwrap();
    }

    fn snapshot(fixture: &Fixture) -> EnforcementSnapshot {
        EnforcementSnapshot {
            project_id: fixture.project_id.clone(),
            has_scope: true,
            mode: "programming".to_string(),
            db_schema_checked_at: String::new(),
            http_tests_performed: 0,
            blocking_alerts: Vec::new(),
            phase: "implementation".to_string(),
            updated_at: format_timestamp(Utc::now()),
        }
    }

    fn action(fixture: &Fixture, file: &str) -> HookActionInput {
        serde_json::from_str(&format!(
            r#"{{"tool_name": "Edit", "tool_input": {{"file_path": "{}"}}, "cwd": "{}"}}"#,
            fixture.project.join(file).to_string_lossy(),
            fixture.project.to_string_lossy()
        ))
        .unwrap()
    }

    #[test]
    fn schema_write_with_stale_check_blocks() {
        let fixture = fixture();
        write_snapshot(&fixture, &snapshot(&fixture));

        let decision = decide(&action(&fixture, "db/001_users.sql"), &fixture.storage, Utc::now());
        match decision {
            Decision::Block(message) => assert!(message.starts_with("SCHEMA STALE")),
            Decision::Allow => panic!("expected block"),
        }
    }

    #[test]
    fn schema_write_with_fresh_check_allows() {
        let fixture = fixture();
        let mut snap = snapshot(&fixture);
        snap.db_schema_checked_at = format_timestamp(Utc::now());
        write_snapshot(&fixture, &snap);

        assert_eq!(
            decide(&action(&fixture, "db/001_users.sql"), &fixture.storage, Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn schema_check_expires_after_ttl() {
        let fixture = fixture();
        let mut snap = snapshot(&fixture);
        snap.db_schema_checked_at = format_timestamp(
            Utc::now() - chrono::Duration::seconds(DB_SCHEMA_ENFORCE_TTL_SECS + 1),
        );
        write_snapshot(&fixture, &snap);

        assert!(matches!(
            decide(&action(&fixture, "db/001_users.sql"), &fixture.storage, Utc::now()),
            Decision::Block(_)
        ));
    }

    #[test]
    fn non_schema_write_allows_without_check() {
        let fixture = fixture();
        write_snapshot(&fixture, &snapshot(&fixture));

        assert_eq!(
            decide(&action(&fixture, "index.php"), &fixture.storage, Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn schema_enforcement_ignores_the_mode() {
        let fixture = fixture();
        let mut snap = snapshot(&fixture);
        snap.mode = "content".to_string();
        write_snapshot(&fixture, &snap);

        assert!(matches!(
            decide(&action(&fixture, "db/001_users.sql"), &fixture.storage, Utc::now()),
            Decision::Block(_)
        ));
    }

    #[test]
    fn blocking_alert_blocks_any_write() {
        let fixture = fixture();
        let mut snap = snapshot(&fixture);
        snap.db_schema_checked_at = format_timestamp(Utc::now());
        snap.blocking_alerts = vec![BlockingAlert {
            message: "LOGIN_REQUIRED: session expired".to_string(),
        }];
        write_snapshot(&fixture, &snap);

        match decide(&action(&fixture, "index.php"), &fixture.storage, Utc::now()) {
            Decision::Block(message) => assert!(message.starts_with("BLOCKED")),
            Decision::Allow => panic!("expected block"),
        }
    }

    #[test]
    fn no_scope_allows_everything() {
        let fixture = fixture();
        let mut snap = snapshot(&fixture);
        snap.has_scope = false;
        write_snapshot(&fixture, &snap);

        assert_eq!(
            decide(&action(&fixture, "db/001_users.sql"), &fixture.storage, Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn missing_snapshot_allows() {
        let fixture = fixture();
        assert_eq!(
            decide(&action(&fixture, "db/001_users.sql"), &fixture.storage, Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn corrupt_snapshot_allows() {
        let fixture = fixture();
        let dir = fixture.storage.join("projects").join(&fixture.project_id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(ENFORCEMENT_STATE_FILE), "{broken").unwrap();

        assert_eq!(
            decide(&action(&fixture, "db/001_users.sql"), &fixture.storage, Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn input_without_target_allows() {
        let fixture = fixture();
        write_snapshot(&fixture, &snapshot(&fixture));

        let input: HookActionInput =
            serde_json::from_str(r#"{"tool_name": "Bash", "cwd": "/tmp"}"#).unwrap();
        assert_eq!(decide(&input, &fixture.storage, Utc::now()), Decision::Allow);
    }
}
