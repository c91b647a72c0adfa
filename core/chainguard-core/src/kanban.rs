//! Persistent Kanban board for multi-day tasks.
//!
//! The board lives inside the project at `.claude/kanban.yaml`, card details
//! as markdown under `.claude/cards/`, archived cards in
//! `.claude/archive.yaml`. State survives server restarts by construction —
//! everything is re-read from the project tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use chainguard_protocol::format_timestamp;

use crate::error::{ChainguardError, Result};

const KANBAN_DIR: &str = ".claude";
const KANBAN_FILE: &str = "kanban.yaml";
const CARDS_DIR: &str = "cards";
const ARCHIVE_FILE: &str = "archive.yaml";

pub const DEFAULT_COLUMNS: &[&str] = &["backlog", "in_progress", "review", "done"];

/// Column presets per project flavor.
pub const COLUMN_PRESETS: &[(&str, &[&str])] = &[
    ("default", DEFAULT_COLUMNS),
    (
        "programming",
        &["backlog", "in_progress", "testing", "review", "done"],
    ),
    ("content", &["ideas", "draft", "revision", "editing", "done"]),
    (
        "devops",
        &["planned", "preparation", "deployment", "testing", "live"],
    ),
    (
        "research",
        &["to_investigate", "researching", "analysis", "verified", "documented"],
    ),
    ("agile", &["backlog", "sprint", "in_progress", "review", "done"]),
    ("simple", &["todo", "doing", "done"]),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanbanCard {
    pub id: String,
    pub title: String,
    #[serde(default = "default_column")]
    pub column: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub detail_file: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_column() -> String {
    "backlog".to_string()
}

fn default_priority() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanbanBoard {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub cards: Vec<KanbanCard>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Default for KanbanBoard {
    fn default() -> Self {
        let now = format_timestamp(Utc::now());
        Self {
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            cards: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

impl KanbanBoard {
    pub fn card(&self, card_id: &str) -> Option<&KanbanCard> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    pub fn card_mut(&mut self, card_id: &str) -> Option<&mut KanbanCard> {
        self.cards.iter_mut().find(|c| c.id == card_id)
    }

    pub fn cards_in_column(&self, column: &str) -> Vec<&KanbanCard> {
        self.cards.iter().filter(|c| c.column == column).collect()
    }

    /// Cards whose dependencies are still on the board and not in the final
    /// column.
    pub fn blocked_cards(&self) -> Vec<&KanbanCard> {
        let final_column = self.columns.last().cloned().unwrap_or_default();
        let done_ids: Vec<&str> = self
            .cards
            .iter()
            .filter(|c| c.column == final_column)
            .map(|c| c.id.as_str())
            .collect();
        let all_ids: Vec<&str> = self.cards.iter().map(|c| c.id.as_str()).collect();

        self.cards
            .iter()
            .filter(|c| c.column != final_column)
            .filter(|c| {
                c.depends_on
                    .iter()
                    .any(|dep| all_ids.contains(&dep.as_str()) && !done_ids.contains(&dep.as_str()))
            })
            .collect()
    }
}

/// Board storage and card operations for one project tree.
pub struct KanbanManager;

impl KanbanManager {
    fn board_path(project_path: &Path) -> PathBuf {
        project_path.join(KANBAN_DIR).join(KANBAN_FILE)
    }

    fn archive_path(project_path: &Path) -> PathBuf {
        project_path.join(KANBAN_DIR).join(ARCHIVE_FILE)
    }

    fn cards_dir(project_path: &Path) -> PathBuf {
        project_path.join(KANBAN_DIR).join(CARDS_DIR)
    }

    pub fn board_exists(project_path: &Path) -> bool {
        Self::board_path(project_path).exists()
    }

    pub fn load_board(project_path: &Path) -> KanbanBoard {
        let path = Self::board_path(project_path);
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "Corrupt kanban board, starting empty");
                KanbanBoard::default()
            }),
            Err(_) => KanbanBoard::default(),
        }
    }

    pub fn save_board(project_path: &Path, board: &mut KanbanBoard) -> Result<()> {
        board.updated_at = format_timestamp(Utc::now());
        let dir = project_path.join(KANBAN_DIR);
        std::fs::create_dir_all(Self::cards_dir(project_path))
            .map_err(|e| ChainguardError::io("create kanban dirs", e))?;
        let content = serde_yaml::to_string(board)
            .map_err(|e| ChainguardError::Internal(format!("serialize kanban board: {}", e)))?;
        std::fs::write(dir.join(KANBAN_FILE), content)
            .map_err(|e| ChainguardError::io("write kanban.yaml", e))
    }

    /// Create or re-initialize the board. Cards sitting in columns that no
    /// longer exist migrate to the first column.
    pub fn init_board(
        project_path: &Path,
        columns: Option<Vec<String>>,
        preset: Option<&str>,
    ) -> Result<KanbanBoard> {
        let target_columns: Vec<String> = match (columns, preset) {
            (Some(columns), _) if !columns.is_empty() => columns,
            (_, Some(preset)) => COLUMN_PRESETS
                .iter()
                .find(|(name, _)| *name == preset)
                .map(|(_, cols)| cols.iter().map(|c| c.to_string()).collect())
                .ok_or_else(|| {
                    ChainguardError::InvalidInput(format!("unknown preset: {}", preset))
                })?,
            _ => DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        };

        let mut board = if Self::board_exists(project_path) {
            let mut board = Self::load_board(project_path);
            if board.columns != target_columns {
                let first = target_columns[0].clone();
                for card in &mut board.cards {
                    if !target_columns.contains(&card.column) {
                        card.column = first.clone();
                        card.updated_at = format_timestamp(Utc::now());
                    }
                }
                board.columns = target_columns;
            }
            board
        } else {
            KanbanBoard {
                columns: target_columns,
                ..Default::default()
            }
        };

        Self::save_board(project_path, &mut board)?;
        Ok(board)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_card(
        project_path: &Path,
        title: &str,
        column: Option<&str>,
        priority: &str,
        depends_on: Vec<String>,
        tags: Vec<String>,
        detail: Option<&str>,
    ) -> Result<KanbanCard> {
        let mut board = Self::load_board(project_path);
        let card_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

        let detail_file = match detail {
            Some(content) => {
                Self::write_detail_file(project_path, &card_id, title, content)?;
                Some(format!("{}/{}.md", CARDS_DIR, card_id))
            }
            None => None,
        };

        let column = match column {
            Some(column) if board.columns.iter().any(|c| c == column) => column.to_string(),
            _ => board.columns.first().cloned().unwrap_or_else(default_column),
        };

        let now = format_timestamp(Utc::now());
        let card = KanbanCard {
            id: card_id,
            title: title.to_string(),
            column,
            priority: priority.to_string(),
            detail_file,
            depends_on,
            created_at: now.clone(),
            updated_at: now,
            tags,
        };

        board.cards.push(card.clone());
        Self::save_board(project_path, &mut board)?;
        Ok(card)
    }

    pub fn move_card(project_path: &Path, card_id: &str, to_column: &str) -> Result<KanbanCard> {
        let mut board = Self::load_board(project_path);
        if !board.columns.iter().any(|c| c == to_column) {
            return Err(ChainguardError::InvalidInput(format!(
                "unknown column: {} (have: {})",
                to_column,
                board.columns.join(", ")
            )));
        }
        let card = board
            .card_mut(card_id)
            .ok_or_else(|| ChainguardError::InvalidInput(format!("unknown card: {}", card_id)))?;
        card.column = to_column.to_string();
        card.updated_at = format_timestamp(Utc::now());
        let updated = card.clone();
        Self::save_board(project_path, &mut board)?;
        Ok(updated)
    }

    pub fn update_card(
        project_path: &Path,
        card_id: &str,
        title: Option<&str>,
        priority: Option<&str>,
        tags: Option<Vec<String>>,
        depends_on: Option<Vec<String>>,
        detail: Option<&str>,
    ) -> Result<KanbanCard> {
        let mut board = Self::load_board(project_path);
        let card = board
            .card_mut(card_id)
            .ok_or_else(|| ChainguardError::InvalidInput(format!("unknown card: {}", card_id)))?;

        if let Some(title) = title {
            card.title = title.to_string();
        }
        if let Some(priority) = priority {
            card.priority = priority.to_string();
        }
        if let Some(tags) = tags {
            card.tags = tags;
        }
        if let Some(depends_on) = depends_on {
            card.depends_on = depends_on;
        }
        card.updated_at = format_timestamp(Utc::now());

        let title_snapshot = card.title.clone();
        if detail.is_some() && card.detail_file.is_none() {
            card.detail_file = Some(format!("{}/{}.md", CARDS_DIR, card_id));
        }
        let updated = card.clone();
        Self::save_board(project_path, &mut board)?;

        if let Some(content) = detail {
            Self::write_detail_file(project_path, card_id, &title_snapshot, content)?;
        }
        Ok(updated)
    }

    pub fn delete_card(project_path: &Path, card_id: &str) -> Result<bool> {
        let mut board = Self::load_board(project_path);
        let Some(index) = board.cards.iter().position(|c| c.id == card_id) else {
            return Ok(false);
        };

        let card = board.cards.remove(index);
        if let Some(detail_file) = &card.detail_file {
            let path = project_path.join(KANBAN_DIR).join(detail_file);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| ChainguardError::io("remove card detail", e))?;
            }
        }
        Self::save_board(project_path, &mut board)?;
        Ok(true)
    }

    /// Move a card off the board into `archive.yaml`.
    pub fn archive_card(project_path: &Path, card_id: &str) -> Result<bool> {
        let mut board = Self::load_board(project_path);
        let Some(card) = board.card(card_id).cloned() else {
            return Ok(false);
        };

        let archive_path = Self::archive_path(project_path);
        let mut archive: Vec<BTreeMap<String, serde_yaml::Value>> =
            match std::fs::read_to_string(&archive_path) {
                Ok(content) => serde_yaml::from_str(&content).unwrap_or_default(),
                Err(_) => Vec::new(),
            };

        let mut entry: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_value(
            serde_yaml::to_value(&card)
                .map_err(|e| ChainguardError::Internal(format!("serialize card: {}", e)))?,
        )
        .unwrap_or_default();
        entry.insert(
            "archived_at".to_string(),
            serde_yaml::Value::String(format_timestamp(Utc::now())),
        );
        archive.push(entry);

        std::fs::create_dir_all(Self::cards_dir(project_path))
            .map_err(|e| ChainguardError::io("create kanban dirs", e))?;
        let content = serde_yaml::to_string(&archive)
            .map_err(|e| ChainguardError::Internal(format!("serialize archive: {}", e)))?;
        std::fs::write(&archive_path, content)
            .map_err(|e| ChainguardError::io("write archive.yaml", e))?;

        board.cards.retain(|c| c.id != card_id);
        Self::save_board(project_path, &mut board)?;
        Ok(true)
    }

    pub fn card_detail(project_path: &Path, card_id: &str) -> Option<String> {
        let board = Self::load_board(project_path);
        let card = board.card(card_id)?;
        let detail_file = card.detail_file.as_ref()?;
        std::fs::read_to_string(project_path.join(KANBAN_DIR).join(detail_file)).ok()
    }

    fn write_detail_file(
        project_path: &Path,
        card_id: &str,
        title: &str,
        content: &str,
    ) -> Result<()> {
        std::fs::create_dir_all(Self::cards_dir(project_path))
            .map_err(|e| ChainguardError::io("create cards dir", e))?;
        let path = Self::cards_dir(project_path).join(format!("{}.md", card_id));
        std::fs::write(&path, format!("# {}\n\n{}", title, content))
            .map_err(|e| ChainguardError::io("write card detail", e))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────

    /// Compact per-column listing.
    pub fn board_view(project_path: &Path) -> String {
        let board = Self::load_board(project_path);
        if board.cards.is_empty() {
            return "Kanban: empty (use kanban_add to create cards)".to_string();
        }

        let blocked: Vec<String> = board.blocked_cards().iter().map(|c| c.id.clone()).collect();
        let mut lines = vec!["Kanban Board".to_string()];
        for column in &board.columns {
            let cards = board.cards_in_column(column);
            lines.push(format!("\n{} ({})", column.to_uppercase(), cards.len()));
            if cards.is_empty() {
                lines.push("  (empty)".to_string());
            }
            for card in cards {
                let mut markers = String::new();
                if card.detail_file.is_some() {
                    markers.push_str(" [detail]");
                }
                if !card.depends_on.is_empty() {
                    markers.push_str(&format!(" [deps:{}]", card.depends_on.len()));
                }
                if blocked.contains(&card.id) {
                    markers.push_str(" [BLOCKED]");
                }
                lines.push(format!(
                    "  [{}] {} {}{}",
                    priority_tag(&card.priority),
                    card.id,
                    card.title,
                    markers
                ));
            }
        }
        lines.join("\n")
    }

    /// Full board render with progress, stats and detail previews.
    pub fn full_board_view(project_path: &Path) -> String {
        let board = Self::load_board(project_path);
        if board.cards.is_empty() {
            return "Kanban Board\n\nThe board is empty.\nUse kanban_add(title=\"...\") to create cards."
                .to_string();
        }

        let total = board.cards.len();
        let final_column = board.columns.last().cloned().unwrap_or_default();
        let done = board.cards_in_column(&final_column).len();
        let blocked = board.blocked_cards().len();
        let progress = (done as f64 / total as f64 * 100.0).round() as u32;

        let bar_width = 40usize;
        let filled = bar_width * done / total;
        let bar = format!("{}{}", "#".repeat(filled), "-".repeat(bar_width - filled));

        let mut lines = vec![
            "Kanban Board".to_string(),
            format!("Progress: [{}] {}% ({}/{} done)", bar, progress, done, total),
        ];
        let stats: Vec<String> = board
            .columns
            .iter()
            .map(|c| format!("{}: {}", c, board.cards_in_column(c).len()))
            .collect();
        let mut stat_line = stats.join(" | ");
        if blocked > 0 {
            stat_line.push_str(&format!(" | blocked: {}", blocked));
        }
        lines.push(stat_line);

        let blocked_ids: Vec<String> =
            board.blocked_cards().iter().map(|c| c.id.clone()).collect();
        for column in &board.columns {
            lines.push(format!("\n== {} ==", column.to_uppercase()));
            let cards = board.cards_in_column(column);
            if cards.is_empty() {
                lines.push("  (no cards)".to_string());
            }
            for card in cards {
                let status = if blocked_ids.contains(&card.id) {
                    " BLOCKED"
                } else {
                    ""
                };
                lines.push(format!(
                    "  [{}] {} {}{}",
                    priority_tag(&card.priority),
                    card.id,
                    card.title,
                    status
                ));
                lines.push(format!(
                    "      priority: {} | created: {} | updated: {}",
                    card.priority,
                    &card.created_at.get(..10).unwrap_or("?"),
                    &card.updated_at.get(..10).unwrap_or("?")
                ));
                if !card.tags.is_empty() {
                    lines.push(format!("      tags: {}", card.tags.join(", ")));
                }
                if !card.depends_on.is_empty() {
                    lines.push(format!("      depends on: {}", card.depends_on.join(", ")));
                }
                if card.detail_file.is_some() {
                    if let Some(detail) = Self::card_detail(project_path, &card.id) {
                        for line in detail.lines().take(8) {
                            lines.push(format!("      | {}", line));
                        }
                        if detail.lines().count() > 8 {
                            lines.push(format!("      | ... ({} lines total)", detail.lines().count()));
                        }
                    }
                }
            }
        }
        lines.join("\n")
    }

    /// Recently archived cards, newest last.
    pub fn archive_view(project_path: &Path, limit: usize) -> String {
        let archive_path = Self::archive_path(project_path);
        let archive: Vec<BTreeMap<String, serde_yaml::Value>> =
            match std::fs::read_to_string(&archive_path) {
                Ok(content) => serde_yaml::from_str(&content).unwrap_or_default(),
                Err(_) => return "Archive: empty".to_string(),
            };
        if archive.is_empty() {
            return "Archive: empty".to_string();
        }

        let mut lines = vec![format!("Archive ({} cards)", archive.len())];
        let start = archive.len().saturating_sub(limit);
        for card in &archive[start..] {
            let get = |key: &str| {
                card.get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or("?")
                    .to_string()
            };
            lines.push(format!(
                "  {} {} (archived {})",
                get("id"),
                get("title"),
                get("archived_at").get(..10).unwrap_or("?")
            ));
        }
        if archive.len() > limit {
            lines.push(format!("  ... and {} more", archive.len() - limit));
        }
        lines.join("\n")
    }
}

fn priority_tag(priority: &str) -> &str {
    match priority {
        "critical" => "!!",
        "high" => "! ",
        "low" => ". ",
        _ => "- ",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_board_with_preset_columns() {
        let temp = tempfile::tempdir().unwrap();
        let board = KanbanManager::init_board(temp.path(), None, Some("simple")).unwrap();
        assert_eq!(board.columns, vec!["todo", "doing", "done"]);
        assert!(KanbanManager::board_exists(temp.path()));
    }

    #[test]
    fn init_with_unknown_preset_fails() {
        let temp = tempfile::tempdir().unwrap();
        assert!(KanbanManager::init_board(temp.path(), None, Some("waterfall")).is_err());
    }

    #[test]
    fn reinit_migrates_orphaned_cards_to_first_column() {
        let temp = tempfile::tempdir().unwrap();
        KanbanManager::init_board(temp.path(), None, None).unwrap();
        let card = KanbanManager::add_card(
            temp.path(),
            "migrate me",
            Some("review"),
            "medium",
            Vec::new(),
            Vec::new(),
            None,
        )
        .unwrap();

        let board = KanbanManager::init_board(temp.path(), None, Some("simple")).unwrap();
        let migrated = board.card(&card.id).unwrap();
        assert_eq!(migrated.column, "todo");
    }

    #[test]
    fn add_card_with_detail_writes_markdown() {
        let temp = tempfile::tempdir().unwrap();
        KanbanManager::init_board(temp.path(), None, None).unwrap();
        let card = KanbanManager::add_card(
            temp.path(),
            "build login",
            None,
            "high",
            Vec::new(),
            vec!["auth".to_string()],
            Some("- GET /login\n- POST /login"),
        )
        .unwrap();

        assert_eq!(card.id.len(), 8);
        let detail = KanbanManager::card_detail(temp.path(), &card.id).unwrap();
        assert!(detail.starts_with("# build login"));
        assert!(detail.contains("POST /login"));
    }

    #[test]
    fn move_card_rejects_unknown_column() {
        let temp = tempfile::tempdir().unwrap();
        KanbanManager::init_board(temp.path(), None, None).unwrap();
        let card = KanbanManager::add_card(
            temp.path(),
            "task",
            None,
            "medium",
            Vec::new(),
            Vec::new(),
            None,
        )
        .unwrap();

        assert!(KanbanManager::move_card(temp.path(), &card.id, "nowhere").is_err());
        let moved = KanbanManager::move_card(temp.path(), &card.id, "done").unwrap();
        assert_eq!(moved.column, "done");
    }

    #[test]
    fn blocked_cards_need_unfinished_dependencies() {
        let temp = tempfile::tempdir().unwrap();
        KanbanManager::init_board(temp.path(), None, None).unwrap();
        let dep = KanbanManager::add_card(
            temp.path(),
            "dep",
            None,
            "medium",
            Vec::new(),
            Vec::new(),
            None,
        )
        .unwrap();
        let blocked = KanbanManager::add_card(
            temp.path(),
            "blocked",
            None,
            "medium",
            vec![dep.id.clone()],
            Vec::new(),
            None,
        )
        .unwrap();

        let board = KanbanManager::load_board(temp.path());
        let blocked_ids: Vec<&str> = board.blocked_cards().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(blocked_ids, vec![blocked.id.as_str()]);

        KanbanManager::move_card(temp.path(), &dep.id, "done").unwrap();
        let board = KanbanManager::load_board(temp.path());
        assert!(board.blocked_cards().is_empty());

        // A dependency that left the board no longer blocks.
        KanbanManager::delete_card(temp.path(), &dep.id).unwrap();
        let board = KanbanManager::load_board(temp.path());
        assert!(board.blocked_cards().is_empty());
    }

    #[test]
    fn archive_moves_card_off_board() {
        let temp = tempfile::tempdir().unwrap();
        KanbanManager::init_board(temp.path(), None, None).unwrap();
        let card = KanbanManager::add_card(
            temp.path(),
            "ship it",
            None,
            "medium",
            Vec::new(),
            Vec::new(),
            None,
        )
        .unwrap();

        assert!(KanbanManager::archive_card(temp.path(), &card.id).unwrap());
        assert!(KanbanManager::load_board(temp.path()).card(&card.id).is_none());

        let view = KanbanManager::archive_view(temp.path(), 10);
        assert!(view.contains("ship it"));

        assert!(!KanbanManager::archive_card(temp.path(), "missing").unwrap());
    }

    #[test]
    fn delete_removes_card_and_detail_file() {
        let temp = tempfile::tempdir().unwrap();
        KanbanManager::init_board(temp.path(), None, None).unwrap();
        let card = KanbanManager::add_card(
            temp.path(),
            "temp",
            None,
            "low",
            Vec::new(),
            Vec::new(),
            Some("scratch"),
        )
        .unwrap();

        let detail_path = temp
            .path()
            .join(KANBAN_DIR)
            .join(card.detail_file.clone().unwrap());
        assert!(detail_path.exists());

        assert!(KanbanManager::delete_card(temp.path(), &card.id).unwrap());
        assert!(!detail_path.exists());
    }

    #[test]
    fn board_view_marks_blocked_cards() {
        let temp = tempfile::tempdir().unwrap();
        KanbanManager::init_board(temp.path(), None, None).unwrap();
        let dep = KanbanManager::add_card(
            temp.path(),
            "dep",
            None,
            "medium",
            Vec::new(),
            Vec::new(),
            None,
        )
        .unwrap();
        KanbanManager::add_card(
            temp.path(),
            "needs dep",
            None,
            "critical",
            vec![dep.id],
            Vec::new(),
            None,
        )
        .unwrap();

        let view = KanbanManager::board_view(temp.path());
        assert!(view.contains("[BLOCKED]"));
        assert!(view.contains("BACKLOG (2)"));
    }

    #[test]
    fn full_view_shows_progress_and_details() {
        let temp = tempfile::tempdir().unwrap();
        KanbanManager::init_board(temp.path(), None, None).unwrap();
        let card = KanbanManager::add_card(
            temp.path(),
            "a",
            None,
            "medium",
            Vec::new(),
            Vec::new(),
            Some("body line"),
        )
        .unwrap();
        KanbanManager::move_card(temp.path(), &card.id, "done").unwrap();

        let view = KanbanManager::full_board_view(temp.path());
        assert!(view.contains("100% (1/1 done)"));
        assert!(view.contains("| body line"));
    }

    #[test]
    fn corrupt_board_file_starts_empty() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join(KANBAN_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(KANBAN_FILE), ":{not yaml").unwrap();

        let board = KanbanManager::load_board(temp.path());
        assert!(board.cards.is_empty());
    }
}
