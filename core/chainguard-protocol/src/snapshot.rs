//! Enforcement snapshot: the minimal document the hook consults.
//!
//! The server rewrites this file synchronously after every state save; the
//! hook reads it and nothing else. The schema here is pinned — the snapshot
//! may grow fields, but existing ones keep their meaning so the two binaries
//! can ship independently.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// File name inside `~/.chainguard/projects/<id>/`.
pub const ENFORCEMENT_STATE_FILE: &str = "enforcement-state.json";

/// How long a schema check stays valid from the hook's point of view.
pub const DB_SCHEMA_ENFORCE_TTL_SECS: i64 = 600;

/// Path fragments that mark a file as schema-affecting.
const SCHEMA_PATH_SUBSTRINGS: &[&str] = &["migration", "migrate", "schema", "database"];

/// True if a path looks like it touches the database schema: a `.sql` suffix
/// or a well-known fragment anywhere in the path.
pub fn is_schema_file(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".sql") || SCHEMA_PATH_SUBSTRINGS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingAlert {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementSnapshot {
    pub project_id: String,
    pub has_scope: bool,
    pub mode: String,
    /// ISO-8601 timestamp of the last successful schema fetch, empty when
    /// never checked or invalidated.
    #[serde(default)]
    pub db_schema_checked_at: String,
    #[serde(default)]
    pub http_tests_performed: u32,
    #[serde(default)]
    pub blocking_alerts: Vec<BlockingAlert>,
    pub phase: String,
    pub updated_at: String,
}

impl EnforcementSnapshot {
    /// Age of the schema check in seconds, or `None` when never checked or
    /// unparseable (treated as never).
    pub fn schema_check_age(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.db_schema_checked_at.is_empty() {
            return None;
        }
        let checked = DateTime::parse_from_rfc3339(&self.db_schema_checked_at).ok()?;
        Some(now.signed_duration_since(checked.with_timezone(&Utc)).num_seconds())
    }

    /// True if the schema was checked within the enforcement TTL.
    pub fn is_schema_fresh(&self, now: DateTime<Utc>) -> bool {
        matches!(self.schema_check_age(now), Some(age) if age < DB_SCHEMA_ENFORCE_TTL_SECS)
    }
}

/// Canonical timestamp format for snapshot and state fields.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
