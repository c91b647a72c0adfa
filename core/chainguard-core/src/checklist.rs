//! Whitelisted checklist execution.
//!
//! Check commands are tokenized on whitespace and run directly — no shell
//! ever interprets them. Anything whose head token is not whitelisted fails
//! the check rather than running.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::config::CHECKLIST_TIMEOUT;
use crate::model::ChecklistItem;

/// Commands a checklist check may start with.
pub const COMMAND_WHITELIST: &[&str] = &[
    "test", "grep", "ls", "cat", "head", "wc", "find", "stat", "[", "php", "node", "python",
    "python3", "npm", "composer",
];

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub item: String,
    pub passed: bool,
    pub detail: String,
}

pub struct ChecklistRunner {
    timeout: Duration,
}

impl Default for ChecklistRunner {
    fn default() -> Self {
        Self::new(CHECKLIST_TIMEOUT)
    }
}

impl ChecklistRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn run_one(&self, item: &ChecklistItem, working_dir: &Path) -> CheckOutcome {
        let tokens: Vec<&str> = item.check.split_whitespace().collect();

        let head = match tokens.first() {
            Some(head) => *head,
            None => {
                return CheckOutcome {
                    item: item.item.clone(),
                    passed: false,
                    detail: "empty check command".to_string(),
                }
            }
        };

        if !COMMAND_WHITELIST.contains(&head) {
            return CheckOutcome {
                item: item.item.clone(),
                passed: false,
                detail: format!("command `{}` is not whitelisted", head),
            };
        }

        let mut command = Command::new(head);
        command
            .args(&tokens[1..])
            .current_dir(working_dir)
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => {
                let passed = output.status.success();
                let detail = if passed {
                    String::new()
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    stderr.lines().next().unwrap_or("exit != 0").to_string()
                };
                CheckOutcome {
                    item: item.item.clone(),
                    passed,
                    detail,
                }
            }
            Ok(Err(err)) => CheckOutcome {
                item: item.item.clone(),
                passed: false,
                detail: format!("failed to launch: {}", err),
            },
            Err(_) => CheckOutcome {
                item: item.item.clone(),
                passed: false,
                detail: format!("timed out after {}s", self.timeout.as_secs()),
            },
        }
    }

    /// Run every item concurrently and return outcomes in item order.
    pub async fn run_all(&self, items: &[ChecklistItem], working_dir: &Path) -> Vec<CheckOutcome> {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let runner = ChecklistRunner::new(self.timeout);
            let item = item.clone();
            let dir = working_dir.to_path_buf();
            handles.push(tokio::spawn(async move { runner.run_one(&item, &dir).await }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, item) in handles.into_iter().zip(items) {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => outcomes.push(CheckOutcome {
                    item: item.item.clone(),
                    passed: false,
                    detail: format!("check task failed: {}", err),
                }),
            }
        }
        outcomes
    }
}
