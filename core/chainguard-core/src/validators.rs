//! Syntax validation multiplexer.
//!
//! Dispatches by extension to the language's own compiler or checker. A
//! missing tool yields `Skipped`, never a failure — validation is advisory
//! infrastructure, and a workstation without `php` on PATH is not an error
//! in the tracked file.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::config::SYNTAX_CHECK_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    Valid,
    Invalid,
    Skipped { reason: String },
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    /// Language tag the result was checked as (`php`, `javascript`, ...).
    pub checked: &'static str,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn valid(checked: &'static str) -> Self {
        Self {
            status: ValidationStatus::Valid,
            checked,
            errors: Vec::new(),
        }
    }

    fn invalid(checked: &'static str, errors: Vec<String>) -> Self {
        Self {
            status: ValidationStatus::Invalid,
            checked,
            errors,
        }
    }

    fn skipped(checked: &'static str, reason: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Skipped {
                reason: reason.into(),
            },
            checked,
            errors: Vec::new(),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.status == ValidationStatus::Invalid
    }
}

pub struct SyntaxValidator {
    timeout: Duration,
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self::new(SYNTAX_CHECK_TIMEOUT)
    }
}

impl SyntaxValidator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// True if the extension has a registered checker.
    pub fn supports(path: &Path) -> bool {
        matches!(
            extension(path).as_str(),
            "php" | "js" | "mjs" | "cjs" | "json" | "py" | "ts" | "tsx"
        )
    }

    pub async fn validate(&self, path: &Path) -> ValidationOutcome {
        match extension(path).as_str() {
            "php" => {
                self.run_checker("php", &["-l"], path, "php", &["Parse error", "Fatal error"])
                    .await
            }
            "js" | "mjs" | "cjs" => {
                self.run_checker("node", &["--check"], path, "javascript", &["SyntaxError"])
                    .await
            }
            "py" => {
                self.run_checker(
                    "python3",
                    &["-m", "py_compile"],
                    path,
                    "python",
                    &["SyntaxError", "IndentationError"],
                )
                .await
            }
            "ts" | "tsx" => {
                self.run_checker("npx", &["tsc", "--noEmit"], path, "typescript", &["error TS"])
                    .await
            }
            "json" => validate_json(path).await,
            _ => ValidationOutcome::skipped("none", "no checker for this extension"),
        }
    }

    async fn run_checker(
        &self,
        program: &str,
        args: &[&str],
        path: &Path,
        checked: &'static str,
        error_markers: &[&str],
    ) -> ValidationOutcome {
        let mut command = Command::new(program);
        command.args(args).arg(path).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                return ValidationOutcome::skipped(checked, format!("{} not installed", program));
            }
            Ok(Err(err)) => {
                return ValidationOutcome::skipped(checked, format!("{} failed to launch: {}", program, err));
            }
            Err(_) => {
                return ValidationOutcome::skipped(
                    checked,
                    format!("{} timed out after {}s", program, self.timeout.as_secs()),
                );
            }
        };

        if output.status.success() {
            return ValidationOutcome::valid(checked);
        }

        let mut combined = String::from_utf8_lossy(&output.stderr).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stdout));

        let errors = extract_errors(&combined, error_markers);
        ValidationOutcome::invalid(checked, errors)
    }
}

/// First lines carrying a language-specific error marker, falling back to the
/// first non-empty line so failures never come back silent.
fn extract_errors(output: &str, markers: &[&str]) -> Vec<String> {
    let marked: Vec<String> = output
        .lines()
        .filter(|line| markers.iter().any(|m| line.contains(m)))
        .take(3)
        .map(|l| l.trim().to_string())
        .collect();

    if !marked.is_empty() {
        return marked;
    }

    output
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| vec![l.trim().to_string()])
        .unwrap_or_else(|| vec!["check failed with no output".to_string()])
}

async fn validate_json(path: &Path) -> ValidationOutcome {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) => return ValidationOutcome::skipped("json", format!("unreadable: {}", err)),
    };
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(_) => ValidationOutcome::valid("json"),
        Err(err) => ValidationOutcome::invalid("json", vec![format!("JSON parse error: {}", err)]),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_json_passes() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("ok.json");
        std::fs::write(&file, r#"{"a": [1, 2, 3]}"#).unwrap();

        let outcome = SyntaxValidator::default().validate(&file).await;
        assert_eq!(outcome.status, ValidationStatus::Valid);
        assert_eq!(outcome.checked, "json");
    }

    #[tokio::test]
    async fn invalid_json_reports_parse_error() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("bad.json");
        std::fs::write(&file, "{broken").unwrap();

        let outcome = SyntaxValidator::default().validate(&file).await;
        assert!(outcome.is_invalid());
        assert!(outcome.errors[0].contains("JSON parse error"));
    }

    #[tokio::test]
    async fn unknown_extension_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("notes.md");
        std::fs::write(&file, "# notes").unwrap();

        let outcome = SyntaxValidator::default().validate(&file).await;
        assert!(matches!(outcome.status, ValidationStatus::Skipped { .. }));
    }

    #[test]
    fn supports_known_extensions() {
        assert!(SyntaxValidator::supports(Path::new("a.php")));
        assert!(SyntaxValidator::supports(Path::new("a.tsx")));
        assert!(!SyntaxValidator::supports(Path::new("a.md")));
        assert!(!SyntaxValidator::supports(Path::new("Makefile")));
    }

    #[test]
    fn error_extraction_prefers_marked_lines() {
        let output = "junk\nPHP Parse error: syntax error, unexpected ';' in a.php on line 1\n";
        let errors = extract_errors(output, &["Parse error"]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Parse error"));
    }

    #[test]
    fn error_extraction_falls_back_to_first_line() {
        let errors = extract_errors("something odd happened\n", &["Parse error"]);
        assert_eq!(errors[0], "something odd happened");
    }
}
