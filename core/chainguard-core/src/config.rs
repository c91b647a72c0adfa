//! Constants, thresholds and runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Quiescence window for coalesced state writes.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Bounded LRU of in-memory projects.
pub const PROJECT_CACHE_CAP: usize = 20;

/// Ring size for the compact action log.
pub const MAX_RECENT_ACTIONS: usize = 5;

/// Bounded ordered set of files tracked outside the scope.
pub const MAX_OUT_OF_SCOPE_FILES: usize = 20;

/// Bounded ordered set of changed files kept for impact analysis.
pub const MAX_CHANGED_FILES: usize = 30;

/// Error index bound per project (FIFO on overflow).
pub const MAX_ERROR_ENTRIES: usize = 100;

/// Minimum similarity score for auto-suggested past resolutions.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Auto-suggest shows at most this many past resolutions.
pub const AUTO_SUGGEST_MAX_RESULTS: usize = 2;

/// Scope descriptions longer than this are truncated with a warning.
pub const SCOPE_DESCRIPTION_MAX: usize = 500;

/// In-memory schema cache TTL (distinct from the hook's enforcement TTL).
pub const DB_SCHEMA_CACHE_TTL: Duration = Duration::from_secs(300);

/// Tables fetched per schema inspection, at most.
pub const DB_MAX_TABLES: usize = 50;

/// Rows shown by the table sample block.
pub const DB_SAMPLE_ROWS: usize = 5;

/// HTTP session cache bound and lifetime.
pub const HTTP_SESSION_CAP: usize = 50;
pub const HTTP_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-invocation timeout for syntax checkers.
pub const SYNTAX_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-item timeout for checklist commands.
pub const CHECKLIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default test-run timeout in seconds (overridable per project).
pub const TEST_TIMEOUT_SECS: u64 = 300;

/// Captured test output is truncated to this many bytes.
pub const TEST_OUTPUT_CAP: usize = 20_000;

/// Default for `ChainguardConfig::validation_reminder_threshold`.
pub const VALIDATION_REMINDER_THRESHOLD: u32 = 5;

/// Storage root override variable.
pub const HOME_ENV_VAR: &str = "CHAINGUARD_HOME";

/// Text returned verbatim when the scope gate blocks a tool.
pub const SCOPE_BLOCKED_TEXT: &str = "BLOCKED: no active scope. \
Declare what you are working on first: call set_scope with a description, \
a mode, the modules you will touch, and the acceptance criteria. \
Until then only set_scope, projects, config and the kanban tools are available.";

/// Preamble prepended when a call arrives without the context marker.
pub const CONTEXT_REFRESH_TEXT: &str = "CONTEXT REFRESH — you appear to have \
lost the working rules, so here they are again:\n\
1. Track every file you change (track/track_batch); syntax is validated automatically.\n\
2. Inspect the live database (db_schema) before touching schema-affecting files.\n\
3. Finish through the completion gate (finish), never by just stopping.\n\
Pass ctx=\"\u{1F517}\" on every tool call to confirm you still hold these rules.\n";

/// Mutable runtime configuration, adjustable through the `config` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainguardConfig {
    pub validation_reminder_threshold: u32,
}

impl Default for ChainguardConfig {
    fn default() -> Self {
        Self {
            validation_reminder_threshold: VALIDATION_REMINDER_THRESHOLD,
        }
    }
}

/// Returns the storage root, honoring `CHAINGUARD_HOME`.
pub fn chainguard_home() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV_VAR) {
        if !home.trim().is_empty() {
            return PathBuf::from(home);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chainguard")
}
