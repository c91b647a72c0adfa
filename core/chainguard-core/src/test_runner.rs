//! Subprocess test execution with framework auto-detection.
//!
//! The runner never interprets the test command through a shell; the stored
//! command plus whitespace-split args become the argv directly. Output is
//! scanned against fixed per-framework regexes; a zero exit with no parsed
//! numbers still counts as success with unknown counts.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use chainguard_protocol::format_timestamp;

use crate::config::{TEST_OUTPUT_CAP, TEST_TIMEOUT_SECS};
use crate::error::{ChainguardError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub command: String,
    #[serde(default)]
    pub args: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    TEST_TIMEOUT_SECS
}

impl TestConfig {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.command.clone()];
        argv.extend(self.args.split_whitespace().map(|s| s.to_string()));
        argv
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub success: bool,
    pub passed: Option<u32>,
    pub failed: Option<u32>,
    pub total: Option<u32>,
    pub duration_secs: f64,
    pub framework: String,
    pub output: String,
    #[serde(default)]
    pub error_lines: Vec<String>,
    pub exit_code: Option<i32>,
    pub timestamp: String,
}

static PHPUNIT_OK: Lazy<Regex> = Lazy::new(|| Regex::new(r"OK \((\d+) tests?").unwrap());
static PHPUNIT_FAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Tests: (\d+).*Failures: (\d+)").unwrap());
static JEST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Tests:\s+(?:(\d+) failed, )?(\d+) passed, (\d+) total").unwrap());
static PYTEST_PASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) passed").unwrap());
static PYTEST_FAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) failed").unwrap());
static MOCHA_PASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) passing").unwrap());
static MOCHA_FAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) failing").unwrap());
static VITEST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Tests\s+(?:(\d+) failed \| )?(\d+) passed").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCounts {
    pub framework: &'static str,
    pub passed: u32,
    pub failed: u32,
}

/// Scan combined output for a known framework summary line.
pub fn detect_framework(output: &str) -> Option<ParsedCounts> {
    if let Some(caps) = PHPUNIT_OK.captures(output) {
        let passed = caps[1].parse().ok()?;
        return Some(ParsedCounts {
            framework: "phpunit",
            passed,
            failed: 0,
        });
    }
    if let Some(caps) = PHPUNIT_FAIL.captures(output) {
        let total: u32 = caps[1].parse().ok()?;
        let failed: u32 = caps[2].parse().ok()?;
        return Some(ParsedCounts {
            framework: "phpunit",
            passed: total.saturating_sub(failed),
            failed,
        });
    }
    if let Some(caps) = JEST.captures(output) {
        let failed = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let passed = caps[2].parse().ok()?;
        return Some(ParsedCounts {
            framework: "jest",
            passed,
            failed,
        });
    }
    if let Some(caps) = VITEST.captures(output) {
        let failed = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let passed = caps[2].parse().ok()?;
        return Some(ParsedCounts {
            framework: "vitest",
            passed,
            failed,
        });
    }
    if let Some(caps) = MOCHA_PASS.captures(output) {
        let passed = caps[1].parse().ok()?;
        let failed = MOCHA_FAIL
            .captures(output)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);
        return Some(ParsedCounts {
            framework: "mocha",
            passed,
            failed,
        });
    }
    if PYTEST_PASS.is_match(output) || PYTEST_FAIL.is_match(output) {
        let passed = PYTEST_PASS
            .captures(output)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);
        let failed = PYTEST_FAIL
            .captures(output)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);
        return Some(ParsedCounts {
            framework: "pytest",
            passed,
            failed,
        });
    }
    None
}

/// Pull failure-looking lines out of test output for the compact summary.
fn extract_error_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| {
            let l = line.trim();
            l.starts_with("FAIL")
                || l.starts_with("FAILED")
                || l.contains("Error:")
                || l.contains("AssertionError")
                || l.starts_with("✗")
        })
        .take(10)
        .map(|l| l.trim().to_string())
        .collect()
}

pub struct TestRunner;

impl TestRunner {
    /// Execute the configured command with its timeout and parse the result.
    pub async fn run(config: &TestConfig, working_dir: &Path) -> Result<TestResult> {
        let argv = config.argv();
        if argv.is_empty() || argv[0].is_empty() {
            return Err(ChainguardError::InvalidInput(
                "no test command configured".to_string(),
            ));
        }

        let started = Instant::now();
        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .current_dir(working_dir)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(
            Duration::from_secs(config.timeout),
            command.output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(ChainguardError::Subprocess(format!(
                    "failed to launch `{}`: {}",
                    argv[0], err
                )))
            }
            Err(_) => return Err(ChainguardError::Timeout(config.timeout)),
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        combined.truncate(TEST_OUTPUT_CAP);

        let exit_code = output.status.code();
        let parsed = detect_framework(&combined);
        let success = match &parsed {
            Some(counts) => counts.failed == 0 && exit_code == Some(0),
            None => exit_code == Some(0),
        };

        Ok(TestResult {
            success,
            passed: parsed.as_ref().map(|p| p.passed),
            failed: parsed.as_ref().map(|p| p.failed),
            total: parsed.as_ref().map(|p| p.passed + p.failed),
            duration_secs: started.elapsed().as_secs_f64(),
            framework: parsed
                .map(|p| p.framework.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            output: combined.clone(),
            error_lines: extract_error_lines(&combined),
            exit_code,
            timestamp: format_timestamp(Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_phpunit_ok() {
        let parsed = detect_framework("....\n\nOK (12 tests, 34 assertions)\n").unwrap();
        assert_eq!(parsed.framework, "phpunit");
        assert_eq!(parsed.passed, 12);
        assert_eq!(parsed.failed, 0);
    }

    #[test]
    fn detects_phpunit_failures() {
        let parsed =
            detect_framework("FAILURES!\nTests: 10, Assertions: 20, Failures: 3.\n").unwrap();
        assert_eq!(parsed.framework, "phpunit");
        assert_eq!(parsed.passed, 7);
        assert_eq!(parsed.failed, 3);
    }

    #[test]
    fn detects_jest_summary() {
        let parsed = detect_framework("Tests:       2 failed, 8 passed, 10 total\n").unwrap();
        assert_eq!(parsed.framework, "jest");
        assert_eq!(parsed.passed, 8);
        assert_eq!(parsed.failed, 2);
    }

    #[test]
    fn detects_jest_all_green() {
        let parsed = detect_framework("Tests:       8 passed, 8 total\n").unwrap();
        assert_eq!(parsed.failed, 0);
        assert_eq!(parsed.passed, 8);
    }

    #[test]
    fn detects_pytest() {
        let parsed = detect_framework("========= 5 passed, 1 failed in 0.42s =========\n").unwrap();
        assert_eq!(parsed.framework, "pytest");
        assert_eq!(parsed.passed, 5);
        assert_eq!(parsed.failed, 1);
    }

    #[test]
    fn detects_mocha() {
        let parsed = detect_framework("  7 passing (120ms)\n  2 failing\n").unwrap();
        assert_eq!(parsed.framework, "mocha");
        assert_eq!(parsed.passed, 7);
        assert_eq!(parsed.failed, 2);
    }

    #[test]
    fn unknown_output_parses_nothing() {
        assert!(detect_framework("make: nothing to be done\n").is_none());
    }

    #[test]
    fn argv_splits_args_on_whitespace() {
        let config = TestConfig {
            command: "./vendor/bin/phpunit".to_string(),
            args: "tests/ --colors=never".to_string(),
            timeout: 60,
        };
        assert_eq!(
            config.argv(),
            vec!["./vendor/bin/phpunit", "tests/", "--colors=never"]
        );
    }

    #[test]
    fn error_lines_capture_failures() {
        let lines = extract_error_lines("ok\nFAIL tests/a.test.js\nAssertionError: boom\n");
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn zero_exit_without_counts_is_success() {
        let temp = tempfile::tempdir().unwrap();
        let config = TestConfig {
            command: "true".to_string(),
            args: String::new(),
            timeout: 10,
        };
        let result = TestRunner::run(&config, temp.path()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.framework, "unknown");
        assert!(result.passed.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let temp = tempfile::tempdir().unwrap();
        let config = TestConfig {
            command: "false".to_string(),
            args: String::new(),
            timeout: 10,
        };
        let result = TestRunner::run(&config, temp.path()).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn missing_command_is_a_subprocess_error() {
        let temp = tempfile::tempdir().unwrap();
        let config = TestConfig {
            command: "definitely-not-a-real-test-binary".to_string(),
            args: String::new(),
            timeout: 10,
        };
        let err = TestRunner::run(&config, temp.path()).await.unwrap_err();
        assert_eq!(err.code(), "SUBPROCESS_FAIL");
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let temp = tempfile::tempdir().unwrap();
        let config = TestConfig {
            command: "sleep".to_string(),
            args: "5".to_string(),
            timeout: 1,
        };
        let err = TestRunner::run(&config, temp.path()).await.unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");
    }
}
