//! Test runner tools: configuration, execution, last-run status.

use std::path::Path;
use std::sync::Arc;

use chainguard_core::error::{ChainguardError, Result};
use chainguard_core::test_runner::{TestConfig, TestRunner};

use crate::dispatch::ToolCall;
use crate::handlers::{arg_str, arg_u64, AppState};

pub async fn test_config(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let mut project_state = call.project.state().await;

    let Some(command) = arg_str(&call.args, "command") else {
        return Ok(vec![match &project_state.test_config {
            Some(config) => format!(
                "Test command: {} {} (timeout {}s)",
                config.command, config.args, config.timeout
            ),
            None => "No test command configured.".to_string(),
        }]);
    };

    let config = TestConfig {
        command: command.to_string(),
        args: arg_str(&call.args, "args").unwrap_or("").to_string(),
        timeout: arg_u64(&call.args, "timeout").unwrap_or(300),
    };
    let summary = format!(
        "Test command: {} {} (timeout {}s)",
        config.command, config.args, config.timeout
    );
    project_state.test_config = Some(config);
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![summary])
}

pub async fn run_tests(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let (config, project_path) = {
        let project_state = call.project.state().await;
        let config = project_state.test_config.clone().ok_or_else(|| {
            ChainguardError::InvalidInput(
                "no test command configured (use test_config first)".to_string(),
            )
        })?;
        (config, project_state.project_path.clone())
    };

    let result = TestRunner::run(&config, Path::new(&project_path)).await?;

    let mut project_state = call.project.state().await;
    if let (Some(passed), Some(failed)) = (result.passed, result.failed) {
        project_state.tests_passed += passed;
        project_state.tests_failed += failed;
    }
    project_state.last_test_run = result.timestamp.clone();
    project_state.add_action(&format!(
        "tests: {}",
        if result.success { "PASS" } else { "FAIL" }
    ));
    project_state.test_results = Some(result.clone());
    project_state.touch();
    call.project.save(&project_state, false).await?;
    drop(project_state);

    Ok(vec![render_result(&result)])
}

pub async fn test_status(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let project_state = call.project.state().await;
    match &project_state.test_results {
        Some(result) => Ok(vec![render_result(result)]),
        None => Ok(vec!["No test run recorded yet.".to_string()]),
    }
}

fn render_result(result: &chainguard_core::test_runner::TestResult) -> String {
    let counts = match (result.passed, result.failed, result.total) {
        (Some(passed), Some(failed), Some(total)) => {
            format!("{} passed, {} failed, {} total", passed, failed, total)
        }
        _ => "counts unknown".to_string(),
    };

    let mut lines = vec![format!(
        "{} [{}] {} in {:.1}s (exit {})",
        if result.success { "✓ Tests" } else { "✗ Tests" },
        result.framework,
        counts,
        result.duration_secs,
        result
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string())
    )];

    if !result.success {
        for line in result.error_lines.iter().take(5) {
            lines.push(format!("  {}", line));
        }
    }
    lines.join("\n")
}
