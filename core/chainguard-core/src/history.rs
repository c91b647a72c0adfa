//! Append-only change history and the error index.
//!
//! `history.jsonl` grows one line per tracked event and is never rewritten.
//! `error_index.json` is a bounded document keyed by (file pattern, error
//! type); entries that gain a `resolution` become auto-suggest material for
//! future similar failures.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use chainguard_protocol::format_timestamp;
use chrono::Utc;

use crate::cache::PathLocks;
use crate::config::{AUTO_SUGGEST_MAX_RESULTS, MAX_ERROR_ENTRIES, SIMILARITY_THRESHOLD};
use crate::error::{ChainguardError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: String,
    pub file: String,
    pub action: String,
    /// `PASS` or `FAIL:<first error line>`.
    pub validation: String,
    #[serde(default)]
    pub scope_id: String,
    #[serde(default)]
    pub scope_desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_applied: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub ts: String,
    pub file_pattern: String,
    pub error_type: String,
    pub error_msg: String,
    #[serde(default)]
    pub scope_desc: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ErrorIndexFile {
    #[serde(default)]
    entries: Vec<ErrorEntry>,
}

impl ErrorEntry {
    /// Similarity in [0,1]: weighted fraction of query tokens found in the
    /// message, the file pattern and the scope description.
    ///
    /// Tokenization is frozen by tests: lowercase, split on non-alphanumeric,
    /// tokens shorter than two characters dropped.
    pub fn matches(&self, query: &str) -> f64 {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return 0.0;
        }

        let msg_tokens = tokenize(&self.error_msg);
        let pattern_tokens = tokenize(&self.file_pattern);
        let scope_tokens = tokenize(&self.scope_desc);

        let fraction = |field: &[String]| -> f64 {
            if field.is_empty() {
                return 0.0;
            }
            let hits = query_tokens.iter().filter(|t| field.contains(t)).count();
            hits as f64 / query_tokens.len() as f64
        };

        0.5 * fraction(&msg_tokens) + 0.3 * fraction(&pattern_tokens) + 0.2 * fraction(&scope_tokens)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_string())
        .collect()
}

/// Generalize a file name into a recall pattern: the non-suffix stem becomes
/// `*`, keeping the final CamelCase word (`UserController.php` →
/// `*Controller.php`).
pub fn file_pattern(file_name: &str) -> String {
    let name = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (name, ""),
    };

    let last_camel_start = stem
        .char_indices()
        .filter(|(i, c)| *i > 0 && c.is_uppercase())
        .map(|(i, _)| i)
        .last();

    let pattern_stem = match last_camel_start {
        Some(idx) => format!("*{}", &stem[idx..]),
        None => "*".to_string(),
    };

    if ext.is_empty() {
        pattern_stem
    } else {
        format!("{}.{}", pattern_stem, ext)
    }
}

/// Per-project history and error-index files.
pub struct HistoryManager {
    history_path: PathBuf,
    index_path: PathBuf,
    locks: Arc<PathLocks>,
}

impl HistoryManager {
    pub fn new(project_dir: &Path, locks: Arc<PathLocks>) -> Self {
        Self {
            history_path: project_dir.join("history.jsonl"),
            index_path: project_dir.join("error_index.json"),
            locks,
        }
    }

    /// Append one event line. The file only ever grows.
    pub async fn log_change(&self, entry: &HistoryEntry) -> Result<()> {
        let lock = self.locks.lock_for(&self.history_path);
        let _guard = lock.lock().await;

        if let Some(parent) = self.history_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChainguardError::io("create project dir", e))?;
        }

        let mut line = serde_json::to_string(entry)
            .map_err(|e| ChainguardError::json("serialize history entry", e))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .await
            .map_err(|e| ChainguardError::io("open history.jsonl", e))?;
        tokio::io::AsyncWriteExt::write_all(&mut file, line.as_bytes())
            .await
            .map_err(|e| ChainguardError::io("append history.jsonl", e))?;
        Ok(())
    }

    /// Most recent entries, newest last; optionally filtered to one scope.
    pub async fn recent(&self, limit: usize, scope_id: Option<&str>) -> Result<Vec<HistoryEntry>> {
        let content = match tokio::fs::read_to_string(&self.history_path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ChainguardError::io("read history.jsonl", err)),
        };

        let mut entries: Vec<HistoryEntry> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .filter(|entry: &HistoryEntry| match scope_id {
                Some(id) => entry.scope_id == id,
                None => true,
            })
            .collect();

        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        Ok(entries)
    }

    /// Insert or refresh an entry keyed by (file_pattern, error_type);
    /// bounded FIFO on overflow.
    pub async fn index_error(&self, entry: ErrorEntry) -> Result<()> {
        let lock = self.locks.lock_for(&self.index_path);
        let _guard = lock.lock().await;

        let mut index = self.load_index().await?;
        if let Some(existing) = index.entries.iter_mut().find(|e| {
            e.file_pattern == entry.file_pattern && e.error_type == entry.error_type
        }) {
            existing.ts = entry.ts;
            existing.error_msg = entry.error_msg;
            existing.scope_desc = entry.scope_desc;
        } else {
            index.entries.push(entry);
            if index.entries.len() > MAX_ERROR_ENTRIES {
                let excess = index.entries.len() - MAX_ERROR_ENTRIES;
                index.entries.drain(..excess);
            }
        }

        self.write_index(&index).await
    }

    /// Record how the most recent matching error was fixed.
    pub async fn learn(
        &self,
        resolution: &str,
        file_pattern_hint: Option<&str>,
        error_type_hint: Option<&str>,
    ) -> Result<Option<ErrorEntry>> {
        let lock = self.locks.lock_for(&self.index_path);
        let _guard = lock.lock().await;

        let mut index = self.load_index().await?;
        let target = index
            .entries
            .iter_mut()
            .rev()
            .find(|e| {
                file_pattern_hint.map_or(true, |p| e.file_pattern == p)
                    && error_type_hint.map_or(true, |t| e.error_type == t)
            });

        match target {
            Some(entry) => {
                entry.resolution = Some(resolution.to_string());
                entry.ts = format_timestamp(Utc::now());
                let learned = entry.clone();
                self.write_index(&index).await?;
                Ok(Some(learned))
            }
            None => Ok(None),
        }
    }

    /// Auto-suggest: resolved entries scoring above the threshold, best first.
    pub async fn find_similar_errors(&self, query: &str) -> Result<Vec<(f64, ErrorEntry)>> {
        let mut scored = self.scored_matches(query).await?;
        scored.retain(|(score, entry)| *score > SIMILARITY_THRESHOLD && entry.resolution.is_some());
        scored.truncate(AUTO_SUGGEST_MAX_RESULTS);
        Ok(scored)
    }

    /// Best matches regardless of resolution, for the explicit `recall` tool.
    pub async fn recall(&self, query: &str, limit: usize) -> Result<Vec<(f64, ErrorEntry)>> {
        let mut scored = self.scored_matches(query).await?;
        scored.retain(|(score, _)| *score > 0.0);
        scored.truncate(limit);
        Ok(scored)
    }

    async fn scored_matches(&self, query: &str) -> Result<Vec<(f64, ErrorEntry)>> {
        let index = self.load_index().await?;
        let mut scored: Vec<(f64, ErrorEntry)> = index
            .entries
            .into_iter()
            .map(|entry| (entry.matches(query), entry))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }

    async fn load_index(&self) -> Result<ErrorIndexFile> {
        match tokio::fs::read_to_string(&self.index_path).await {
            Ok(content) => Ok(serde_json::from_str(&content).unwrap_or_default()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(ErrorIndexFile::default())
            }
            Err(err) => Err(ChainguardError::io("read error_index.json", err)),
        }
    }

    async fn write_index(&self, index: &ErrorIndexFile) -> Result<()> {
        let parent = self
            .index_path
            .parent()
            .ok_or_else(|| ChainguardError::Internal("error index path has no parent".into()))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ChainguardError::io("create project dir", e))?;

        let content = serde_json::to_string_pretty(index)
            .map_err(|e| ChainguardError::json("serialize error index", e))?;

        let parent = parent.to_path_buf();
        let target = self.index_path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut temp = NamedTempFile::new_in(&parent)
                .map_err(|e| ChainguardError::io("create temp index file", e))?;
            temp.write_all(content.as_bytes())
                .map_err(|e| ChainguardError::io("write temp index file", e))?;
            temp.flush()
                .map_err(|e| ChainguardError::io("flush temp index file", e))?;
            temp.persist(&target)
                .map_err(|e| ChainguardError::io("persist error index", e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| ChainguardError::Internal(format!("index write task failed: {}", e)))?
    }
}

/// Render auto-suggest matches for the agent.
pub fn format_auto_suggest(matches: &[(f64, ErrorEntry)]) -> String {
    if matches.is_empty() {
        return String::new();
    }
    let mut lines = vec!["Similar past errors with known fixes:".to_string()];
    for (score, entry) in matches {
        lines.push(format!(
            "- {} ({}, {:.0}% match): {}",
            entry.error_msg.chars().take(60).collect::<String>(),
            entry.file_pattern,
            score * 100.0,
            entry.resolution.as_deref().unwrap_or("no resolution recorded")
        ));
    }
    lines.join("\n")
}
