//! Project identity derivation.
//!
//! Both the server and the hook must map the same directory to the same
//! 16-hex-character project ID, or enforcement silently stops working. The
//! derivation order is fixed: git remote URL for `origin`, else the git
//! top-level path, else the absolute working directory; the fingerprint is
//! the first 16 hex characters of the SHA-256 of that source string.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Maximum depth to walk up when searching for a project directory.
/// Prevents runaway traversal in deeply nested or misconfigured paths.
const MAX_WALK_DEPTH: usize = 20;

/// Markers that identify a directory as a project root, checked in order.
const PROJECT_MARKERS: &[&str] = &[
    ".git",
    "composer.json",
    "package.json",
    ".chainguard",
    "CLAUDE.md",
];

/// Directories that never count as project roots on their own.
const IGNORED_DIRECTORIES: &[&str] = &["node_modules", "vendor", "__pycache__", "target", "dist"];

/// Fingerprint a project identity source into the canonical project ID.
pub fn project_fingerprint(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

/// Resolve the identity source for a directory: origin remote URL, git
/// top-level path, or the canonicalized directory itself.
pub fn resolve_identity_source(dir: &Path) -> String {
    if let Some(git_top) = find_git_top(dir) {
        if let Some(url) = git_origin_url(&git_top) {
            return url;
        }
        return canonicalize_lossy(&git_top);
    }
    canonicalize_lossy(dir)
}

/// Find the project directory for a file path by walking upward until a
/// project marker appears. A marker found inside an ignored directory
/// (vendored or generated code) is discarded once the walk passes that
/// directory, so `vendor/dep/composer.json` never wins over the real root.
/// Returns `None` when nothing within reach looks like a project.
pub fn find_project_dir(file_path: &str) -> Option<PathBuf> {
    let path = Path::new(file_path);
    let start = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };

    let mut current = Some(start);
    let mut depth = 0;
    let mut nearest: Option<PathBuf> = None;

    while let Some(dir) = current {
        if depth >= MAX_WALK_DEPTH {
            break;
        }

        let ignored = dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| IGNORED_DIRECTORIES.contains(&n))
            .unwrap_or(false);

        if ignored {
            // Anything found so far was inside this ignored subtree.
            nearest = None;
        } else if nearest.is_none() && PROJECT_MARKERS.iter().any(|m| dir.join(m).exists()) {
            nearest = Some(dir.clone());
        }

        current = dir.parent().map(|p| p.to_path_buf());
        depth += 1;
    }

    nearest
}

/// Walk upward from `dir` to the nearest directory containing `.git`.
fn find_git_top(dir: &Path) -> Option<PathBuf> {
    let mut current = Some(dir.to_path_buf());
    let mut depth = 0;

    while let Some(candidate) = current {
        if depth >= MAX_WALK_DEPTH {
            break;
        }
        if candidate.join(".git").exists() {
            return Some(candidate);
        }
        current = candidate.parent().map(|p| p.to_path_buf());
        depth += 1;
    }

    None
}

/// Read the `origin` remote URL from the repository config without invoking
/// git. Handles worktrees, where `.git` is a file pointing at the real git
/// directory and the config lives in the common dir.
fn git_origin_url(git_top: &Path) -> Option<String> {
    let git_entry = git_top.join(".git");
    let git_dir = if git_entry.is_dir() {
        git_entry
    } else {
        let contents = std::fs::read_to_string(&git_entry).ok()?;
        let line = contents
            .lines()
            .find(|line| line.to_ascii_lowercase().starts_with("gitdir:"))?;
        let raw = line.get("gitdir:".len()..)?.trim();
        if raw.is_empty() {
            return None;
        }
        let pointed = Path::new(raw);
        if pointed.is_absolute() {
            pointed.to_path_buf()
        } else {
            git_top.join(pointed)
        }
    };

    // Worktree git dirs carry a `commondir` file pointing at the shared dir.
    let config_dir = match std::fs::read_to_string(git_dir.join("commondir")) {
        Ok(common) => {
            let raw = common.trim();
            let pointed = Path::new(raw);
            if pointed.is_absolute() {
                pointed.to_path_buf()
            } else {
                git_dir.join(pointed)
            }
        }
        Err(_) => git_dir,
    };

    parse_origin_url(&std::fs::read_to_string(config_dir.join("config")).ok()?)
}

/// Extract `url` from the `[remote "origin"]` section of a git config.
fn parse_origin_url(config: &str) -> Option<String> {
    let mut in_origin = false;
    for line in config.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_origin = trimmed == r#"[remote "origin"]"#;
            continue;
        }
        if in_origin {
            if let Some(rest) = trimmed.strip_prefix("url") {
                let value = rest.trim_start().strip_prefix('=')?.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn canonicalize_lossy(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}
