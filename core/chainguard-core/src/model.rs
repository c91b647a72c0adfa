//! Project state and scope types.
//!
//! One `ProjectState` per project, keyed by the 16-hex fingerprint. The
//! on-disk shape is this struct serialized as JSON; every field defaults so
//! old state files keep loading as the schema grows.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use globset::Glob;
use serde::{Deserialize, Serialize};

use chainguard_protocol::{format_timestamp, DB_SCHEMA_ENFORCE_TTL_SECS};

use crate::config::{MAX_CHANGED_FILES, MAX_OUT_OF_SCOPE_FILES, MAX_RECENT_ACTIONS};
use crate::mode::{ModeFeatures, TaskMode};
use crate::test_runner::{TestConfig, TestResult};

/// File extensions that make a change web-relevant for the HTTP-test gate.
const WEB_EXTENSIONS: &[&str] = &[
    ".php", ".js", ".ts", ".jsx", ".tsx", ".vue", ".html", ".twig", ".blade.php",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Implementation,
    Testing,
    Review,
    Done,
    #[default]
    Unknown,
}

impl Phase {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "planning" => Some(Phase::Planning),
            "implementation" => Some(Phase::Implementation),
            "testing" => Some(Phase::Testing),
            "review" => Some(Phase::Review),
            "done" => Some(Phase::Done),
            "unknown" => Some(Phase::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Implementation => "implementation",
            Phase::Testing => "testing",
            Phase::Review => "review",
            Phase::Done => "done",
            Phase::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    #[default]
    Warn,
    Blocking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub message: String,
    #[serde(default)]
    pub severity: AlertSeverity,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChecklistItem {
    pub item: String,
    pub check: String,
}

/// An in-progress task declaration: mode, criteria, checklist, module globs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScopeDefinition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub ts: String,
    pub cmd: String,
    pub result: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub ts: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub relevance: String,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactEntry {
    pub fact: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub confidence: String,
    pub ts: String,
}

/// The complete tracked state of one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_id: String,
    pub project_name: String,
    pub project_path: String,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub current_task: String,

    // Counters
    #[serde(default)]
    pub files_changed: u32,
    #[serde(default)]
    pub files_since_validation: u32,
    #[serde(default)]
    pub validations_passed: u32,
    #[serde(default)]
    pub validations_failed: u32,
    #[serde(default)]
    pub tests_passed: u32,
    #[serde(default)]
    pub tests_failed: u32,
    #[serde(default)]
    pub http_tests_performed: u32,

    // Timestamps (ISO-8601, empty when unset)
    #[serde(default)]
    pub last_validation: String,
    #[serde(default)]
    pub last_activity: String,
    #[serde(default)]
    pub session_start: String,
    #[serde(default)]
    pub db_schema_checked_at: String,
    #[serde(default)]
    pub last_test_run: String,

    #[serde(default)]
    pub scope: Option<ScopeDefinition>,
    #[serde(default)]
    pub mode: TaskMode,
    #[serde(default)]
    pub criteria_status: BTreeMap<String, bool>,
    #[serde(default)]
    pub checklist_results: BTreeMap<String, bool>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
    #[serde(default)]
    pub out_of_scope_files: Vec<String>,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default)]
    pub recent_actions: Vec<String>,
    #[serde(default)]
    pub impact_check_pending: bool,
    /// Set when a validation fails, cleared by `validate(status=PASS)`.
    #[serde(default)]
    pub open_validation_failure: bool,

    // HTTP testing (scope-local)
    #[serde(default)]
    pub http_base_url: String,
    #[serde(default)]
    pub http_credentials: BTreeMap<String, String>,

    // Test runner
    #[serde(default)]
    pub test_config: Option<TestConfig>,
    #[serde(default)]
    pub test_results: Option<TestResult>,

    // Kanban board reference (path below the project, set on init)
    #[serde(default)]
    pub kanban_board: Option<String>,

    // Content mode
    #[serde(default)]
    pub word_count_total: u64,
    #[serde(default)]
    pub chapter_status: BTreeMap<String, String>,

    // DevOps mode
    #[serde(default)]
    pub command_history: Vec<CommandLogEntry>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,

    // Research mode
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub facts: Vec<FactEntry>,
}

impl ProjectState {
    pub fn new(project_id: &str, project_name: &str, project_path: &str) -> Self {
        let now = format_timestamp(Utc::now());
        Self {
            project_id: project_id.to_string(),
            project_name: project_name.to_string(),
            project_path: project_path.to_string(),
            phase: Phase::Unknown,
            current_task: String::new(),
            files_changed: 0,
            files_since_validation: 0,
            validations_passed: 0,
            validations_failed: 0,
            tests_passed: 0,
            tests_failed: 0,
            http_tests_performed: 0,
            last_validation: String::new(),
            last_activity: now.clone(),
            session_start: now,
            db_schema_checked_at: String::new(),
            last_test_run: String::new(),
            scope: None,
            mode: TaskMode::default(),
            criteria_status: BTreeMap::new(),
            checklist_results: BTreeMap::new(),
            alerts: Vec::new(),
            out_of_scope_files: Vec::new(),
            changed_files: Vec::new(),
            recent_actions: Vec::new(),
            impact_check_pending: false,
            open_validation_failure: false,
            http_base_url: String::new(),
            http_credentials: BTreeMap::new(),
            test_config: None,
            test_results: None,
            kanban_board: None,
            word_count_total: 0,
            chapter_status: BTreeMap::new(),
            command_history: Vec::new(),
            checkpoints: Vec::new(),
            sources: Vec::new(),
            facts: Vec::new(),
        }
    }

    pub fn features(&self) -> ModeFeatures {
        ModeFeatures::for_mode(self.mode)
    }

    pub fn touch(&mut self) {
        self.last_activity = format_timestamp(Utc::now());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Schema freshness
    // ─────────────────────────────────────────────────────────────────────

    /// True if the schema was inspected within the enforcement TTL.
    pub fn is_schema_checked(&self) -> bool {
        matches!(self.schema_check_age(), Some(age) if age < DB_SCHEMA_ENFORCE_TTL_SECS)
    }

    /// Seconds since the last schema inspection, `None` when never checked.
    pub fn schema_check_age(&self) -> Option<i64> {
        if self.db_schema_checked_at.is_empty() {
            return None;
        }
        let checked = DateTime::parse_from_rfc3339(&self.db_schema_checked_at).ok()?;
        Some(
            Utc::now()
                .signed_duration_since(checked.with_timezone(&Utc))
                .num_seconds(),
        )
    }

    /// Clear the freshness flag; returns whether it had been set.
    pub fn invalidate_schema_check(&mut self) -> bool {
        let was_checked = !self.db_schema_checked_at.is_empty();
        self.db_schema_checked_at = String::new();
        was_checked
    }

    pub fn set_schema_checked(&mut self) {
        self.db_schema_checked_at = format_timestamp(Utc::now());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scope membership and bounded collections
    // ─────────────────────────────────────────────────────────────────────

    /// Match a file against the scope's module patterns. Globs first, then
    /// suffix and substring so bare names like `UserController.php` work.
    pub fn check_file_in_scope(&self, file_path: &str) -> bool {
        let modules = match &self.scope {
            Some(scope) if !scope.modules.is_empty() => &scope.modules,
            _ => return true,
        };

        for pattern in modules {
            if let Ok(glob) = Glob::new(pattern) {
                if glob.compile_matcher().is_match(file_path) {
                    return true;
                }
            }
            if file_path.ends_with(pattern.as_str()) || file_path.contains(pattern.as_str()) {
                return true;
            }
        }
        false
    }

    /// Append to the compact action ring (`HH:MM action`, last 5 kept).
    pub fn add_action(&mut self, action: &str) {
        self.recent_actions
            .push(format!("{} {}", Local::now().format("%H:%M"), action));
        if self.recent_actions.len() > MAX_RECENT_ACTIONS {
            let excess = self.recent_actions.len() - MAX_RECENT_ACTIONS;
            self.recent_actions.drain(..excess);
        }
    }

    pub fn add_changed_file(&mut self, file_name: &str) {
        if self.changed_files.iter().any(|f| f == file_name) {
            return;
        }
        self.changed_files.push(file_name.to_string());
        if self.changed_files.len() > MAX_CHANGED_FILES {
            let excess = self.changed_files.len() - MAX_CHANGED_FILES;
            self.changed_files.drain(..excess);
        }
    }

    pub fn add_out_of_scope_file(&mut self, file_path: &str) {
        if self.out_of_scope_files.iter().any(|f| f == file_path) {
            return;
        }
        self.out_of_scope_files.push(file_path.to_string());
        if self.out_of_scope_files.len() > MAX_OUT_OF_SCOPE_FILES {
            let excess = self.out_of_scope_files.len() - MAX_OUT_OF_SCOPE_FILES;
            self.out_of_scope_files.drain(..excess);
        }
    }

    pub fn needs_validation(&self, threshold: u32) -> bool {
        self.files_since_validation >= threshold
    }

    pub fn unacknowledged_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| !a.acknowledged)
    }

    pub fn blocking_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.unacknowledged_alerts()
            .filter(|a| a.severity == AlertSeverity::Blocking)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scope lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Install a new scope, resetting everything scope-local. The mode is
    /// fixed for the lifetime of the scope.
    pub fn begin_scope(&mut self, scope: ScopeDefinition, mode: TaskMode) {
        self.scope = Some(scope);
        self.mode = mode;
        self.reset_scope_locals();
        self.phase = Phase::Planning;
        self.touch();
    }

    /// Close out the scope after a passed completion gate.
    pub fn finish_scope(&mut self) {
        self.scope = None;
        self.phase = Phase::Done;
        self.current_task = String::new();
        self.reset_scope_locals();
        self.touch();
    }

    fn reset_scope_locals(&mut self) {
        self.files_changed = 0;
        self.files_since_validation = 0;
        self.validations_passed = 0;
        self.validations_failed = 0;
        self.tests_passed = 0;
        self.tests_failed = 0;
        self.http_tests_performed = 0;
        self.criteria_status.clear();
        self.checklist_results.clear();
        self.out_of_scope_files.clear();
        self.changed_files.clear();
        self.impact_check_pending = false;
        self.open_validation_failure = false;
        self.http_credentials.clear();
        self.word_count_total = 0;
        self.chapter_status.clear();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Completion gate
    // ─────────────────────────────────────────────────────────────────────

    /// Evaluate the gate conditions in order. The first issue wins; `hard`
    /// issues refuse even with `force=true`.
    pub fn completion_issues(&self) -> Vec<GateIssue> {
        let mut issues = Vec::new();

        let blocking: Vec<String> = self.blocking_alerts().map(|a| a.message.clone()).collect();
        if !blocking.is_empty() {
            issues.push(GateIssue {
                kind: GateIssueKind::BlockingAlert,
                message: format!("{} blocking alert(s) unacknowledged", blocking.len()),
                details: blocking,
                hard: true,
                advisory: false,
            });
        }

        if let Some(issue) = self.http_test_issue() {
            issues.push(issue);
        }

        let failed_checks: Vec<String> = self
            .checklist_results
            .iter()
            .filter(|(_, passed)| !**passed)
            .map(|(item, _)| item.clone())
            .collect();
        if !failed_checks.is_empty() {
            issues.push(GateIssue {
                kind: GateIssueKind::Checklist,
                message: format!("{} checklist item(s) failed", failed_checks.len()),
                details: failed_checks,
                hard: false,
                advisory: false,
            });
        }

        if let Some(scope) = &self.scope {
            let unfulfilled: Vec<String> = scope
                .acceptance_criteria
                .iter()
                .filter(|c| !self.criteria_status.get(*c).copied().unwrap_or(false))
                .cloned()
                .collect();
            if !unfulfilled.is_empty() {
                issues.push(GateIssue {
                    kind: GateIssueKind::Criteria,
                    message: format!("{} acceptance criteria unfulfilled", unfulfilled.len()),
                    details: unfulfilled,
                    hard: false,
                    advisory: false,
                });
            }
        }

        if self.validations_failed > 0 && self.open_validation_failure {
            issues.push(GateIssue {
                kind: GateIssueKind::Validation,
                message: format!(
                    "{} validation failure(s) without a later PASS",
                    self.validations_failed
                ),
                details: Vec::new(),
                hard: false,
                advisory: false,
            });
        }

        issues
    }

    /// Web-relevant work must be probed over HTTP before finishing, in modes
    /// that enforce it.
    fn http_test_issue(&self) -> Option<GateIssue> {
        if !self.features().http_enforcement || self.http_tests_performed > 0 {
            return None;
        }

        if !self.http_base_url.is_empty() {
            return Some(GateIssue {
                kind: GateIssueKind::HttpTests,
                message: "HTTP tests required: base URL is set but no endpoints were probed"
                    .to_string(),
                details: vec![self.http_base_url.clone()],
                hard: false,
                advisory: false,
            });
        }

        let mut web_files: Vec<String> = self
            .changed_files
            .iter()
            .filter(|f| is_web_file(f))
            .cloned()
            .collect();

        // Fallback: the changed-file set is bounded, so scan the action ring
        // too before concluding no web file was touched.
        if web_files.is_empty() && self.files_changed > 0 {
            web_files = self
                .recent_actions
                .iter()
                .filter(|a| is_web_file(a))
                .cloned()
                .collect();
        }

        if !web_files.is_empty() {
            web_files.truncate(5);
            return Some(GateIssue {
                kind: GateIssueKind::HttpTests,
                message: format!(
                    "HTTP tests required: {} web file(s) changed without an endpoint probe",
                    web_files.len()
                ),
                details: web_files,
                hard: false,
                advisory: false,
            });
        }

        // Warning-only: the scope declares web modules but no tracked change
        // confirmed a web file, so this nudges without gating.
        let web_modules: Vec<String> = self
            .scope
            .as_ref()
            .map(|s| {
                s.modules
                    .iter()
                    .filter(|m| is_web_pattern(m))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if !web_modules.is_empty() && self.files_changed > 0 {
            let mut details = web_modules;
            details.truncate(3);
            return Some(GateIssue {
                kind: GateIssueKind::HttpTests,
                message: "HTTP tests recommended: the scope covers web modules".to_string(),
                details,
                hard: false,
                advisory: true,
            });
        }

        None
    }

    // ─────────────────────────────────────────────────────────────────────
    // Status rendering
    // ─────────────────────────────────────────────────────────────────────

    /// Ultra-compact one-line status.
    pub fn status_line(&self, validation_threshold: u32) -> String {
        let mut flags = Vec::new();
        if self.scope.is_none() {
            flags.push("!SCOPE".to_string());
        }
        if self.needs_validation(validation_threshold) {
            flags.push(format!("V!{}", self.files_since_validation));
        }
        if !self.out_of_scope_files.is_empty() {
            flags.push(format!("OOS:{}", self.out_of_scope_files.len()));
        }
        let open_alerts = self.unacknowledged_alerts().count();
        if open_alerts > 0 {
            flags.push(format!("A:{}", open_alerts));
        }

        let flag_str = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(","))
        };

        let scope_preview = match &self.scope {
            Some(scope) if scope.description.chars().count() > 35 => {
                let truncated: String = scope.description.chars().take(35).collect();
                format!("{}...", truncated)
            }
            Some(scope) => scope.description.clone(),
            None => "no scope".to_string(),
        };

        let phase_str = self.phase.as_str();
        let phase = &phase_str[..phase_str.len().min(4)];
        format!(
            "{}|{}|F{}/V{}{} {}",
            self.project_name,
            phase,
            self.files_changed,
            self.files_since_validation,
            flag_str,
            scope_preview
        )
    }

    /// Mode-specific status suffix; empty for programming.
    pub fn mode_status_line(&self) -> String {
        match self.mode {
            TaskMode::Content => {
                let done = self
                    .chapter_status
                    .values()
                    .filter(|s| s.as_str() == "done")
                    .count();
                format!(
                    "{} words | {}/{} chapters done",
                    self.word_count_total,
                    done,
                    self.chapter_status.len()
                )
            }
            TaskMode::Devops => format!(
                "{} cmds | {} checkpoints",
                self.command_history.len(),
                self.checkpoints.len()
            ),
            TaskMode::Research => {
                format!("{} sources | {} facts", self.sources.len(), self.facts.len())
            }
            TaskMode::Generic => format!("{} tracked", self.files_changed),
            TaskMode::Programming => String::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mode data (bounded)
    // ─────────────────────────────────────────────────────────────────────

    pub fn add_command(&mut self, cmd: &str, result: &str, output: &str) {
        self.command_history.push(CommandLogEntry {
            ts: format_timestamp(Utc::now()),
            cmd: cmd.to_string(),
            result: result.to_string(),
            output: output.chars().take(500).collect(),
        });
        if self.command_history.len() > 50 {
            let excess = self.command_history.len() - 50;
            self.command_history.drain(..excess);
        }
    }

    pub fn add_checkpoint(&mut self, name: &str, files: Vec<String>) {
        self.checkpoints.push(Checkpoint {
            name: name.to_string(),
            ts: format_timestamp(Utc::now()),
            files,
        });
        if self.checkpoints.len() > 10 {
            let excess = self.checkpoints.len() - 10;
            self.checkpoints.drain(..excess);
        }
    }

    pub fn add_source(&mut self, url: &str, title: &str, relevance: &str) {
        self.sources.push(SourceEntry {
            url: url.to_string(),
            title: title.to_string(),
            relevance: relevance.to_string(),
            ts: format_timestamp(Utc::now()),
        });
        if self.sources.len() > 100 {
            let excess = self.sources.len() - 100;
            self.sources.drain(..excess);
        }
    }

    pub fn add_fact(&mut self, fact: &str, source: &str, confidence: &str) {
        self.facts.push(FactEntry {
            fact: fact.to_string(),
            source: source.to_string(),
            confidence: confidence.to_string(),
            ts: format_timestamp(Utc::now()),
        });
        if self.facts.len() > 200 {
            let excess = self.facts.len() - 200;
            self.facts.drain(..excess);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateIssueKind {
    BlockingAlert,
    HttpTests,
    Checklist,
    Criteria,
    Validation,
}

#[derive(Debug, Clone)]
pub struct GateIssue {
    pub kind: GateIssueKind,
    pub message: String,
    pub details: Vec<String>,
    /// Refuses even with `force=true`.
    pub hard: bool,
    /// Shown as a warning; never refuses.
    pub advisory: bool,
}

fn is_web_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    WEB_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// A module glob that points at web files (`src/**/*.php`, `*.vue`, ...).
fn is_web_pattern(pattern: &str) -> bool {
    let lower = pattern.to_ascii_lowercase();
    WEB_EXTENSIONS
        .iter()
        .any(|ext| lower.contains(ext) || lower.ends_with(ext.trim_start_matches('.')))
}
