//! Task modes and the capabilities they switch on.
//!
//! The feature set is a pure function of the mode; nothing else may toggle
//! enforcement behavior. Unknown mode strings fall back to programming, the
//! strictest mode.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    #[default]
    Programming,
    Content,
    Devops,
    Research,
    Generic,
}

impl TaskMode {
    /// Parse a mode string; anything unrecognized falls back to programming.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "content" => TaskMode::Content,
            "devops" => TaskMode::Devops,
            "research" => TaskMode::Research,
            "generic" => TaskMode::Generic,
            _ => TaskMode::Programming,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Programming => "programming",
            TaskMode::Content => "content",
            TaskMode::Devops => "devops",
            TaskMode::Research => "research",
            TaskMode::Generic => "generic",
        }
    }
}

/// Boolean capabilities derived from the task mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFeatures {
    pub syntax_validation: bool,
    pub db_enforcement: bool,
    pub http_enforcement: bool,
    pub scope_enforcement: bool,
    pub file_tracking: bool,
    pub word_count: bool,
    pub chapter_tracking: bool,
    pub command_logging: bool,
    pub checkpoints: bool,
    pub health_checks: bool,
    pub source_tracking: bool,
    pub fact_indexing: bool,
}

impl ModeFeatures {
    const OFF: ModeFeatures = ModeFeatures {
        syntax_validation: false,
        db_enforcement: false,
        http_enforcement: false,
        scope_enforcement: false,
        file_tracking: false,
        word_count: false,
        chapter_tracking: false,
        command_logging: false,
        checkpoints: false,
        health_checks: false,
        source_tracking: false,
        fact_indexing: false,
    };

    /// The closed mode table. Every enforcement decision starts here.
    pub fn for_mode(mode: TaskMode) -> Self {
        match mode {
            TaskMode::Programming => ModeFeatures {
                syntax_validation: true,
                db_enforcement: true,
                http_enforcement: true,
                scope_enforcement: true,
                file_tracking: true,
                ..Self::OFF
            },
            TaskMode::Content => ModeFeatures {
                file_tracking: true,
                word_count: true,
                chapter_tracking: true,
                ..Self::OFF
            },
            TaskMode::Devops => ModeFeatures {
                http_enforcement: true,
                scope_enforcement: true,
                file_tracking: true,
                command_logging: true,
                checkpoints: true,
                health_checks: true,
                ..Self::OFF
            },
            TaskMode::Research => ModeFeatures {
                source_tracking: true,
                fact_indexing: true,
                ..Self::OFF
            },
            TaskMode::Generic => ModeFeatures {
                file_tracking: true,
                ..Self::OFF
            },
        }
    }
}

/// Instructions the agent must follow for the chosen mode, emitted once at
/// `set_scope`.
pub fn mode_preamble(mode: TaskMode) -> &'static str {
    match mode {
        TaskMode::Programming => {
            "PROGRAMMING mode. Track every changed file (syntax is auto-validated). \
             Inspect the live schema with db_schema before touching migrations or \
             models. Test changed endpoints over HTTP before finishing. finish runs \
             the full completion gate."
        }
        TaskMode::Content => {
            "CONTENT mode. No syntax validation. Track files to keep word counts \
             current; use track_chapter to move chapters through draft, review and \
             done; word_count shows totals."
        }
        TaskMode::Devops => {
            "DEVOPS mode. Log every executed command with log_command. Create a \
             checkpoint before risky changes. Use health_check on endpoints and \
             services after changes."
        }
        TaskMode::Research => {
            "RESEARCH mode. Register every consulted source with add_source and \
             every finding with index_fact, including a confidence level. sources \
             and facts list what you have gathered."
        }
        TaskMode::Generic => {
            "GENERIC mode. Minimal tracking: files are recorded without validation \
             or enforcement."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mode_falls_back_to_programming() {
        assert_eq!(TaskMode::parse("sculpting"), TaskMode::Programming);
        assert_eq!(TaskMode::parse(""), TaskMode::Programming);
    }

    #[test]
    fn parse_accepts_known_modes() {
        assert_eq!(TaskMode::parse("content"), TaskMode::Content);
        assert_eq!(TaskMode::parse("DEVOPS"), TaskMode::Devops);
        assert_eq!(TaskMode::parse(" research "), TaskMode::Research);
        assert_eq!(TaskMode::parse("generic"), TaskMode::Generic);
    }

    #[test]
    fn programming_enables_all_enforcement() {
        let features = ModeFeatures::for_mode(TaskMode::Programming);
        assert!(features.syntax_validation);
        assert!(features.db_enforcement);
        assert!(features.http_enforcement);
        assert!(features.scope_enforcement);
        assert!(features.file_tracking);
        assert!(!features.word_count);
    }

    #[test]
    fn content_disables_validation_but_tracks_files() {
        let features = ModeFeatures::for_mode(TaskMode::Content);
        assert!(!features.syntax_validation);
        assert!(!features.db_enforcement);
        assert!(features.file_tracking);
        assert!(features.word_count);
        assert!(features.chapter_tracking);
    }

    #[test]
    fn research_tracks_nothing_but_sources_and_facts() {
        let features = ModeFeatures::for_mode(TaskMode::Research);
        assert!(!features.file_tracking);
        assert!(!features.scope_enforcement);
        assert!(features.source_tracking);
        assert!(features.fact_indexing);
    }

    #[test]
    fn mode_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskMode::Devops).unwrap(),
            "\"devops\""
        );
    }
}
