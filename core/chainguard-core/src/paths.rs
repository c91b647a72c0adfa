//! Path sanitation for tracked files.
//!
//! Tracking records whatever the agent touched, but paths that resolve
//! outside the project root are flagged so enforcement and the scope ledger
//! can treat them as out-of-scope instead of silently accepting them.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SanitizedPath {
    /// Absolute resolved path.
    pub absolute: PathBuf,
    /// Path relative to the project root when inside it.
    pub relative: Option<String>,
    pub in_project: bool,
}

/// Resolve a tracked file against the project root. Relative inputs are
/// joined to the root; `..` components are folded lexically so escape
/// attempts are visible without requiring the file to exist.
pub fn sanitize_path(project_root: &Path, file: &str) -> SanitizedPath {
    let candidate = Path::new(file);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        project_root.join(candidate)
    };

    let absolute = normalize(&joined);
    let root = normalize(project_root);

    // Symlinks inside the project may still point out; resolve when possible.
    let resolved = std::fs::canonicalize(&absolute).unwrap_or_else(|_| absolute.clone());
    let resolved_root = std::fs::canonicalize(&root).unwrap_or_else(|_| root.clone());

    match resolved.strip_prefix(&resolved_root) {
        Ok(relative) => SanitizedPath {
            absolute: resolved.clone(),
            relative: Some(relative.to_string_lossy().to_string()),
            in_project: true,
        },
        Err(_) => SanitizedPath {
            absolute: resolved,
            relative: None,
            in_project: false,
        },
    }
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_resolves_into_project() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/a.php"), "<?php\n").unwrap();

        let sanitized = sanitize_path(root, "src/a.php");
        assert!(sanitized.in_project);
        assert_eq!(sanitized.relative.as_deref(), Some("src/a.php"));
    }

    #[test]
    fn dotdot_escape_is_flagged() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("project");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(temp.path().join("outside.txt"), "x").unwrap();

        let sanitized = sanitize_path(&root, "../outside.txt");
        assert!(!sanitized.in_project);
    }

    #[test]
    fn absolute_path_outside_project_is_flagged() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("project");
        std::fs::create_dir_all(&root).unwrap();

        let sanitized = sanitize_path(&root, "/etc/hosts");
        assert!(!sanitized.in_project);
    }

    #[test]
    fn nonexistent_file_still_resolves_lexically() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();

        let sanitized = sanitize_path(root, "src/new_file.php");
        assert!(sanitized.in_project);
        assert_eq!(sanitized.relative.as_deref(), Some("src/new_file.php"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_project_is_flagged() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("project");
        std::fs::create_dir_all(&root).unwrap();
        let outside = temp.path().join("secret.txt");
        std::fs::write(&outside, "x").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link.txt")).unwrap();

        let sanitized = sanitize_path(&root, "link.txt");
        assert!(!sanitized.in_project);
    }
}
