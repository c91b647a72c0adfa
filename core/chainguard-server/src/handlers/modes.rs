//! Mode-specific tools: content, devops and research extras.
//!
//! Each checks its mode feature and answers with a short note when called in
//! the wrong mode — wrong-mode use is a misunderstanding to correct, not an
//! error to escalate.

use std::path::Path;
use std::sync::Arc;

use chainguard_core::error::{ChainguardError, Result};

use crate::dispatch::ToolCall;
use crate::handlers::{arg_str, arg_str_vec, arg_u64, required_str, AppState};

pub async fn word_count(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let project_state = call.project.state().await;
    if !project_state.features().word_count {
        return Ok(vec!["word_count is only active in content mode.".to_string()]);
    }

    if let Some(file) = arg_str(&call.args, "file") {
        let path = Path::new(&project_state.project_path).join(file);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ChainguardError::io(format!("read {}", file), e))?;
        return Ok(vec![format!(
            "{}: {} words",
            file,
            content.split_whitespace().count()
        )]);
    }

    let mut lines = vec![format!("Total: {} words", project_state.word_count_total)];
    if !project_state.chapter_status.is_empty() {
        for (chapter, status) in &project_state.chapter_status {
            lines.push(format!("  {}: {}", chapter, status));
        }
    }
    Ok(vec![lines.join("\n")])
}

pub async fn track_chapter(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let chapter = required_str(&call.args, "chapter")?;
    let status = required_str(&call.args, "status")?;
    if !matches!(status, "draft" | "review" | "done") {
        return Err(ChainguardError::InvalidInput(format!(
            "status must be draft, review or done, got `{}`",
            status
        )));
    }

    let mut project_state = call.project.state().await;
    if !project_state.features().chapter_tracking {
        return Ok(vec![
            "track_chapter is only active in content mode.".to_string()
        ]);
    }

    project_state
        .chapter_status
        .insert(chapter.to_string(), status.to_string());
    if let Some(words) = arg_u64(&call.args, "word_count") {
        project_state.word_count_total = project_state.word_count_total.max(words);
    }
    project_state.add_action(&format!("chapter {}: {}", chapter, status));
    project_state.touch();
    call.project.save(&project_state, false).await?;

    let done = project_state
        .chapter_status
        .values()
        .filter(|s| s.as_str() == "done")
        .count();
    Ok(vec![format!(
        "Chapter {} -> {} ({}/{} done)",
        chapter,
        status,
        done,
        project_state.chapter_status.len()
    )])
}

pub async fn log_command(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let command = required_str(&call.args, "command")?;
    let result = arg_str(&call.args, "result").unwrap_or("success");
    let output = arg_str(&call.args, "output").unwrap_or("");

    let mut project_state = call.project.state().await;
    if !project_state.features().command_logging {
        return Ok(vec![
            "log_command is only active in devops mode.".to_string()
        ]);
    }

    project_state.add_command(command, result, output);
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![format!(
        "Logged: {} ({}) — {} command(s) this scope",
        command,
        result,
        project_state.command_history.len()
    )])
}

pub async fn checkpoint(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let name = required_str(&call.args, "name")?;
    let files = arg_str_vec(&call.args, "files");

    let mut project_state = call.project.state().await;
    if !project_state.features().checkpoints {
        return Ok(vec!["checkpoint is only active in devops mode.".to_string()]);
    }

    project_state.add_checkpoint(name, files.clone());
    project_state.add_action(&format!("checkpoint: {}", name));
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![format!(
        "Checkpoint `{}` recorded ({} file(s) noted).",
        name,
        files.len()
    )])
}

pub async fn add_source(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let url = required_str(&call.args, "url")?;
    let title = arg_str(&call.args, "title").unwrap_or("");
    let relevance = arg_str(&call.args, "relevance").unwrap_or("medium");
    if !matches!(relevance, "high" | "medium" | "low") {
        return Err(ChainguardError::InvalidInput(format!(
            "relevance must be high, medium or low, got `{}`",
            relevance
        )));
    }

    let mut project_state = call.project.state().await;
    if !project_state.features().source_tracking {
        return Ok(vec![
            "add_source is only active in research mode.".to_string()
        ]);
    }

    project_state.add_source(url, title, relevance);
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![format!(
        "Source recorded ({} total).",
        project_state.sources.len()
    )])
}

pub async fn index_fact(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let fact = required_str(&call.args, "fact")?;
    let source = arg_str(&call.args, "source").unwrap_or("");
    let confidence = arg_str(&call.args, "confidence").unwrap_or("likely");
    if !matches!(confidence, "verified" | "likely" | "uncertain") {
        return Err(ChainguardError::InvalidInput(format!(
            "confidence must be verified, likely or uncertain, got `{}`",
            confidence
        )));
    }

    let mut project_state = call.project.state().await;
    if !project_state.features().fact_indexing {
        return Ok(vec![
            "index_fact is only active in research mode.".to_string()
        ]);
    }

    project_state.add_fact(fact, source, confidence);
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![format!(
        "Fact indexed ({} total).",
        project_state.facts.len()
    )])
}

pub async fn sources(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let project_state = call.project.state().await;
    if !project_state.features().source_tracking {
        return Ok(vec!["sources is only active in research mode.".to_string()]);
    }
    if project_state.sources.is_empty() {
        return Ok(vec!["No sources recorded.".to_string()]);
    }

    let mut lines = vec![format!("{} source(s):", project_state.sources.len())];
    for relevance in ["high", "medium", "low"] {
        for source in project_state.sources.iter().filter(|s| s.relevance == relevance) {
            let title = if source.title.is_empty() {
                String::new()
            } else {
                format!(" — {}", source.title)
            };
            lines.push(format!("  [{}] {}{}", relevance, source.url, title));
        }
    }
    Ok(vec![lines.join("\n")])
}

pub async fn facts(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let project_state = call.project.state().await;
    if !project_state.features().fact_indexing {
        return Ok(vec!["facts is only active in research mode.".to_string()]);
    }
    if project_state.facts.is_empty() {
        return Ok(vec!["No facts indexed.".to_string()]);
    }

    let mut lines = vec![format!("{} fact(s):", project_state.facts.len())];
    for confidence in ["verified", "likely", "uncertain"] {
        for fact in project_state.facts.iter().filter(|f| f.confidence == confidence) {
            let source = if fact.source.is_empty() {
                String::new()
            } else {
                format!(" (source: {})", fact.source)
            };
            lines.push(format!("  [{}] {}{}", confidence, fact.fact, source));
        }
    }
    Ok(vec![lines.join("\n")])
}
