//! Pattern-based hints: the impact report and the pre-flight code analysis.
//!
//! Nothing here parses source; hints come from file names and cheap line
//! scans. That keeps the report instant and the advice conservative.

use std::path::Path;

/// Impact hints derived from the set of files changed during a scope.
pub struct ImpactAnalyzer;

impl ImpactAnalyzer {
    /// One reminder per matched pattern, deduplicated, stable order.
    pub fn report(changed_files: &[String]) -> Vec<String> {
        let mut hints: Vec<String> = Vec::new();
        let mut push = |hint: &str| {
            if !hints.iter().any(|h| h == hint) {
                hints.push(hint.to_string());
            }
        };

        for file in changed_files {
            let lower = file.to_ascii_lowercase();

            if lower.contains("controller") {
                push("Controller changed: probe its endpoints over HTTP and re-run feature tests.");
            }
            if chainguard_protocol::is_schema_file(file) {
                push("Schema-affecting file changed: update models using the affected tables and re-inspect the live schema (db_schema).");
            }
            if lower.contains("model") {
                push("Model changed: check controllers and views reading its fields.");
            }
            if lower.ends_with(".js")
                || lower.ends_with(".ts")
                || lower.ends_with(".jsx")
                || lower.ends_with(".tsx")
                || lower.ends_with(".vue")
            {
                push("Frontend file changed: rebuild assets and check the browser console.");
            }
            if lower.contains("config") || lower.ends_with(".env") {
                push("Configuration changed: clear caches and restart affected services.");
            }
            if lower.contains("route") {
                push("Routes changed: verify URL generation and access rules still hold.");
            }
        }

        hints
    }
}

/// Cheap structural metrics for a single file.
#[derive(Debug, Clone)]
pub struct CodeReport {
    pub lines: usize,
    pub functions: usize,
    pub todos: usize,
    pub long_functions: usize,
    pub suggestions: Vec<String>,
}

pub struct CodeAnalyzer;

impl CodeAnalyzer {
    pub fn analyze(path: &Path, content: &str) -> CodeReport {
        let lines = content.lines().count();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let function_markers: &[&str] = match ext.as_str() {
            "php" => &["function "],
            "py" => &["def ", "async def "],
            "js" | "ts" | "jsx" | "tsx" => &["function ", "=> {"],
            "rs" => &["fn "],
            _ => &[],
        };

        let mut functions = 0;
        let mut todos = 0;
        let mut long_functions = 0;
        let mut current_len = 0usize;

        for line in content.lines() {
            if function_markers.iter().any(|m| line.contains(m)) {
                functions += 1;
                if current_len > 80 {
                    long_functions += 1;
                }
                current_len = 0;
            } else {
                current_len += 1;
            }
            if line.contains("TODO") || line.contains("FIXME") {
                todos += 1;
            }
        }
        if current_len > 80 && functions > 0 {
            long_functions += 1;
        }

        let mut suggestions = Vec::new();
        if lines > 500 {
            suggestions.push(format!(
                "{} lines in one file; consider splitting before editing further.",
                lines
            ));
        }
        if long_functions > 0 {
            suggestions.push(format!(
                "{} function(s) longer than 80 lines; change them with extra care.",
                long_functions
            ));
        }
        if todos > 0 {
            suggestions.push(format!("{} TODO/FIXME marker(s) already present.", todos));
        }
        if chainguard_protocol::is_schema_file(&path.to_string_lossy()) {
            suggestions
                .push("Schema-affecting file: inspect the live schema before editing.".to_string());
        }

        CodeReport {
            lines,
            functions,
            todos,
            long_functions,
            suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_change_suggests_http_tests() {
        let hints = ImpactAnalyzer::report(&["app/Http/UserController.php".to_string()]);
        assert!(hints.iter().any(|h| h.contains("endpoints over HTTP")));
    }

    #[test]
    fn migration_change_suggests_schema_reinspection() {
        let hints = ImpactAnalyzer::report(&["db/migrations/001_users.sql".to_string()]);
        assert!(hints.iter().any(|h| h.contains("db_schema")));
    }

    #[test]
    fn hints_are_deduplicated() {
        let hints = ImpactAnalyzer::report(&[
            "app/AController.php".to_string(),
            "app/BController.php".to_string(),
        ]);
        assert_eq!(
            hints
                .iter()
                .filter(|h| h.contains("Controller changed"))
                .count(),
            1
        );
    }

    #[test]
    fn unmatched_files_produce_no_hints() {
        let hints = ImpactAnalyzer::report(&["README.md".to_string()]);
        assert!(hints.is_empty());
    }

    #[test]
    fn analyze_counts_functions_and_todos() {
        let content = "def a():\n    pass\n# TODO tidy\ndef b():\n    pass\n";
        let report = CodeAnalyzer::analyze(Path::new("x.py"), content);
        assert_eq!(report.functions, 2);
        assert_eq!(report.todos, 1);
        assert_eq!(report.lines, 5);
    }
}
