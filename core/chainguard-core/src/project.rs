//! Project state management: load, debounced save, enforcement snapshot.
//!
//! The manager exclusively owns the in-memory map of projects. Handlers hold
//! a project's state lock for their whole read-modify cycle; disk writes are
//! serialized per path and coalesced behind a quiescence window. The
//! enforcement snapshot is rewritten synchronously on every save — debounced
//! or not — so the out-of-process hook never reads stale flags after a
//! completed tool call.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::Utc;
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use chainguard_protocol::{
    format_timestamp, project_fingerprint, resolve_identity_source, BlockingAlert,
    EnforcementSnapshot, ENFORCEMENT_STATE_FILE,
};

use crate::cache::{LruCache, PathLocks};
use crate::config::{ChainguardConfig, PROJECT_CACHE_CAP, SAVE_DEBOUNCE};
use crate::error::{ChainguardError, Result};
use crate::model::ProjectState;

const STATE_FILE: &str = "state.json";

/// One cached project: its state, dirtiness, and pending debounced write.
pub struct ProjectHandle {
    pub project_id: String,
    /// Storage directory, `<home>/projects/<project_id>`.
    pub dir: PathBuf,
    state: Mutex<ProjectState>,
    /// Serializes handler invocations for this project.
    op_lock: Mutex<()>,
    dirty: AtomicBool,
    writes: AtomicU64,
    debounce: StdMutex<Option<JoinHandle<()>>>,
    load_error: StdMutex<Option<String>>,
    locks: Arc<PathLocks>,
}

impl ProjectHandle {
    /// Acquire the per-project lock for a read-modify cycle.
    pub async fn state(&self) -> MutexGuard<'_, ProjectState> {
        self.state.lock().await
    }

    /// Exclusive handler slot: within one project, invocations run one at a
    /// time; across projects they are fully concurrent.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    /// Error from the last failed state load, surfaced once.
    pub fn take_load_error(&self) -> Option<String> {
        self.load_error.lock().expect("load error poisoned").take()
    }

    /// Persist: snapshot now, `state.json` now or after the debounce window.
    ///
    /// The caller passes its state guard so the snapshot (and an immediate
    /// write) serialize exactly the state the handler just produced without
    /// re-locking; the deferred write re-locks on its own later.
    pub async fn save(self: &Arc<Self>, state: &ProjectState, immediate: bool) -> Result<()> {
        self.write_snapshot(state)?;
        self.dirty.store(true, Ordering::SeqCst);

        if immediate {
            self.cancel_debounce();
            let content = serde_json::to_string_pretty(state)
                .map_err(|e| ChainguardError::json("serialize project state", e))?;
            self.write_state_content(content).await
        } else {
            self.arm_debounce();
            Ok(())
        }
    }

    /// Cancel any pending debounced write and flush if dirty.
    pub async fn flush(self: &Arc<Self>) -> Result<()> {
        self.cancel_debounce();
        if self.dirty.load(Ordering::SeqCst) {
            self.write_state_file().await?;
        }
        Ok(())
    }

    fn cancel_debounce(&self) {
        if let Some(handle) = self.debounce.lock().expect("debounce poisoned").take() {
            handle.abort();
        }
    }

    /// Re-arm the coalescing timer; every mutation resets it.
    fn arm_debounce(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(SAVE_DEBOUNCE).await;
            if this.dirty.load(Ordering::SeqCst) {
                if let Err(err) = this.write_state_file().await {
                    // Stay dirty; the next mutation retries.
                    tracing::warn!(
                        project = %this.project_id,
                        error = %err,
                        "Debounced state write failed"
                    );
                }
            }
        });

        let mut slot = self.debounce.lock().expect("debounce poisoned");
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Serialize current state and write it out. Only for paths where no
    /// caller holds the state lock (debounce task, flush).
    async fn write_state_file(&self) -> Result<()> {
        let content = {
            let state = self.state.lock().await;
            serde_json::to_string_pretty(&*state)
                .map_err(|e| ChainguardError::json("serialize project state", e))?
        };
        self.write_state_content(content).await
    }

    /// Write `state.json` atomically under the path lock. Clears the dirty
    /// flag only on success.
    async fn write_state_content(&self, content: String) -> Result<()> {
        let path = self.dir.join(STATE_FILE);
        let lock = self.locks.lock_for(&path);
        let _guard = lock.lock().await;

        let dir = self.dir.clone();
        let result = tokio::task::spawn_blocking(move || write_atomic(&dir, STATE_FILE, &content))
            .await
            .map_err(|e| ChainguardError::Internal(format!("state write task failed: {}", e)))?;

        match result {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Write the enforcement snapshot. Never debounced: the hook depends on
    /// this being current the moment a tool call returns.
    fn write_snapshot(&self, state: &ProjectState) -> Result<()> {
        let snapshot = EnforcementSnapshot {
            project_id: state.project_id.clone(),
            has_scope: state.scope.is_some(),
            mode: state.mode.as_str().to_string(),
            db_schema_checked_at: state.db_schema_checked_at.clone(),
            http_tests_performed: state.http_tests_performed,
            blocking_alerts: state
                .blocking_alerts()
                .map(|a| BlockingAlert {
                    message: a.message.clone(),
                })
                .collect(),
            phase: state.phase.as_str().to_string(),
            updated_at: format_timestamp(Utc::now()),
        };

        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ChainguardError::json("serialize enforcement snapshot", e))?;
        write_atomic(&self.dir, ENFORCEMENT_STATE_FILE, &content)
    }

    /// Number of completed `state.json` writes.
    #[cfg(test)]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

/// Write-temp-then-rename inside the project directory.
fn write_atomic(dir: &Path, file_name: &str, content: &str) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| ChainguardError::io("create project dir", e))?;
    let mut temp =
        NamedTempFile::new_in(dir).map_err(|e| ChainguardError::io("create temp file", e))?;
    std::io::Write::write_all(&mut temp, content.as_bytes())
        .map_err(|e| ChainguardError::io("write temp file", e))?;
    temp.flush()
        .map_err(|e| ChainguardError::io("flush temp file", e))?;
    temp.persist(dir.join(file_name))
        .map_err(|e| ChainguardError::io("persist file", e.error))?;
    Ok(())
}

/// Bounded manager of live projects.
pub struct ProjectManager {
    home: PathBuf,
    cache: Mutex<LruCache<String, Arc<ProjectHandle>>>,
    locks: Arc<PathLocks>,
    config: StdMutex<ChainguardConfig>,
}

impl ProjectManager {
    pub fn new(home: PathBuf) -> Self {
        Self::with_capacity(home, PROJECT_CACHE_CAP)
    }

    pub fn with_capacity(home: PathBuf, capacity: usize) -> Self {
        Self {
            home,
            cache: Mutex::new(LruCache::new(capacity)),
            locks: Arc::new(PathLocks::new()),
            config: StdMutex::new(ChainguardConfig::default()),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn path_locks(&self) -> Arc<PathLocks> {
        Arc::clone(&self.locks)
    }

    pub fn config(&self) -> ChainguardConfig {
        self.config.lock().expect("config poisoned").clone()
    }

    pub fn set_validation_threshold(&self, threshold: u32) {
        self.config
            .lock()
            .expect("config poisoned")
            .validation_reminder_threshold = threshold;
    }

    fn projects_root(&self) -> PathBuf {
        self.home.join("projects")
    }

    /// Resolve a working directory to its cached project, loading or creating
    /// state as needed. Evicted projects are flushed before they drop and
    /// their path locks pruned.
    pub async fn project_for_dir(&self, working_dir: &Path) -> Result<Arc<ProjectHandle>> {
        let source = resolve_identity_source(working_dir);
        let project_id = project_fingerprint(&source);

        let (handle, evicted) = {
            let mut cache = self.cache.lock().await;
            if let Some(handle) = cache.get(&project_id) {
                return Ok(Arc::clone(handle));
            }

            let handle = self.load_project(&project_id, working_dir);
            let evicted = cache.insert(project_id.clone(), Arc::clone(&handle));
            (handle, evicted)
        };

        if let Some((_, old)) = evicted {
            if let Err(err) = old.flush().await {
                tracing::warn!(
                    project = %old.project_id,
                    error = %err,
                    "Flush of evicted project failed"
                );
            }
            self.locks.prune_prefix(&old.dir);
        }

        Ok(handle)
    }

    fn load_project(&self, project_id: &str, working_dir: &Path) -> Arc<ProjectHandle> {
        let dir = self.projects_root().join(project_id);
        let state_path = dir.join(STATE_FILE);

        let project_name = working_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());
        let project_path = working_dir.to_string_lossy().to_string();

        let mut load_error = None;
        let state = match std::fs::read_to_string(&state_path) {
            Ok(content) if content.trim().is_empty() => {
                ProjectState::new(project_id, &project_name, &project_path)
            }
            Ok(content) => match serde_json::from_str::<ProjectState>(&content) {
                Ok(state) => state,
                Err(err) => {
                    // Corrupt state is a cold start, not a crash; the agent
                    // hears about it once on the next tool response.
                    tracing::warn!(
                        project = %project_id,
                        error = %err,
                        "Failed to parse state.json, starting fresh"
                    );
                    load_error = Some(format!("state.json was unreadable ({}), starting fresh", err));
                    ProjectState::new(project_id, &project_name, &project_path)
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                ProjectState::new(project_id, &project_name, &project_path)
            }
            Err(err) => {
                tracing::warn!(project = %project_id, error = %err, "Failed to read state.json");
                load_error = Some(format!("state.json could not be read ({})", err));
                ProjectState::new(project_id, &project_name, &project_path)
            }
        };

        Arc::new(ProjectHandle {
            project_id: project_id.to_string(),
            dir,
            state: Mutex::new(state),
            op_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
            writes: AtomicU64::new(0),
            debounce: StdMutex::new(None),
            load_error: StdMutex::new(load_error),
            locks: Arc::clone(&self.locks),
        })
    }

    /// Flush every pending debounced write. Idempotent; called on shutdown
    /// and from tests.
    pub async fn flush(&self) -> Result<()> {
        let handles: Vec<Arc<ProjectHandle>> = {
            let cache = self.cache.lock().await;
            cache.values().cloned().collect()
        };
        for handle in handles {
            handle.flush().await?;
        }
        Ok(())
    }

    /// Summaries of every project on disk, cached or not.
    pub fn list_projects(&self) -> Vec<ProjectState> {
        let root = self.projects_root();
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut projects = Vec::new();
        for entry in entries.flatten() {
            let state_path = entry.path().join(STATE_FILE);
            if let Ok(content) = std::fs::read_to_string(&state_path) {
                if let Ok(state) = serde_json::from_str::<ProjectState>(&content) {
                    projects.push(state);
                }
            }
        }
        projects.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        projects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScopeDefinition;
    use crate::mode::TaskMode;

    fn temp_manager() -> (tempfile::TempDir, ProjectManager) {
        let temp = tempfile::tempdir().unwrap();
        let manager = ProjectManager::new(temp.path().join("home"));
        (temp, manager)
    }

    #[tokio::test]
    async fn same_dir_resolves_to_same_handle() {
        let (temp, manager) = temp_manager();
        let project_dir = temp.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let first = manager.project_for_dir(&project_dir).await.unwrap();
        let second = manager.project_for_dir(&project_dir).await.unwrap();
        assert_eq!(first.project_id, second.project_id);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn immediate_save_writes_state_and_snapshot() {
        let (temp, manager) = temp_manager();
        let project_dir = temp.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let handle = manager.project_for_dir(&project_dir).await.unwrap();
        {
            let mut state = handle.state().await;
            state.begin_scope(
                ScopeDefinition {
                    description: "impl A".to_string(),
                    ..Default::default()
                },
                TaskMode::Programming,
            );
            handle.save(&state, true).await.unwrap();
        }

        let state_json = std::fs::read_to_string(handle.dir.join(STATE_FILE)).unwrap();
        assert!(state_json.contains("impl A"));

        let snapshot: EnforcementSnapshot = serde_json::from_str(
            &std::fs::read_to_string(handle.dir.join(ENFORCEMENT_STATE_FILE)).unwrap(),
        )
        .unwrap();
        assert!(snapshot.has_scope);
        assert_eq!(snapshot.mode, "programming");
    }

    #[tokio::test]
    async fn snapshot_is_written_even_for_debounced_saves() {
        let (temp, manager) = temp_manager();
        let project_dir = temp.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let handle = manager.project_for_dir(&project_dir).await.unwrap();
        {
            let mut state = handle.state().await;
            state.files_changed = 1;
            handle.save(&state, false).await.unwrap();
        }

        // Snapshot exists immediately; state.json waits for the window.
        assert!(handle.dir.join(ENFORCEMENT_STATE_FILE).exists());
        assert!(!handle.dir.join(STATE_FILE).exists());

        manager.flush().await.unwrap();
        assert!(handle.dir.join(STATE_FILE).exists());
    }

    #[tokio::test]
    async fn debounced_saves_coalesce_into_one_write() {
        let (temp, manager) = temp_manager();
        let project_dir = temp.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let handle = manager.project_for_dir(&project_dir).await.unwrap();
        for i in 0..3 {
            let mut state = handle.state().await;
            state.files_changed = i + 1;
            handle.save(&state, false).await.unwrap();
            drop(state);
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        }

        tokio::time::sleep(SAVE_DEBOUNCE + std::time::Duration::from_millis(200)).await;
        assert_eq!(handle.write_count(), 1);

        let state_json = std::fs::read_to_string(handle.dir.join(STATE_FILE)).unwrap();
        let written: ProjectState = serde_json::from_str(&state_json).unwrap();
        assert_eq!(written.files_changed, 3);
    }

    #[tokio::test]
    async fn flush_is_idempotent() {
        let (temp, manager) = temp_manager();
        let project_dir = temp.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let handle = manager.project_for_dir(&project_dir).await.unwrap();
        {
            let mut state = handle.state().await;
            state.files_changed = 2;
            handle.save(&state, false).await.unwrap();
        }

        manager.flush().await.unwrap();
        let first_count = handle.write_count();
        manager.flush().await.unwrap();
        assert_eq!(handle.write_count(), first_count);
    }

    #[tokio::test]
    async fn corrupt_state_file_cold_starts_with_error_surfaced() {
        let (temp, manager) = temp_manager();
        let project_dir = temp.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();

        // Resolve once to learn the storage path, then corrupt it.
        let handle = manager.project_for_dir(&project_dir).await.unwrap();
        std::fs::create_dir_all(&handle.dir).unwrap();
        std::fs::write(handle.dir.join(STATE_FILE), "{not json").unwrap();

        let fresh_manager = ProjectManager::new(manager.home.clone());
        let reloaded = fresh_manager.project_for_dir(&project_dir).await.unwrap();
        let error = reloaded.take_load_error();
        assert!(error.is_some());
        assert!(reloaded.take_load_error().is_none(), "surfaced only once");

        let state = reloaded.state().await;
        assert_eq!(state.files_changed, 0);
    }

    #[tokio::test]
    async fn state_persists_across_manager_instances() {
        let (temp, manager) = temp_manager();
        let project_dir = temp.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();

        let handle = manager.project_for_dir(&project_dir).await.unwrap();
        {
            let mut state = handle.state().await;
            state.files_changed = 7;
            handle.save(&state, true).await.unwrap();
        }

        let second = ProjectManager::new(manager.home.clone());
        let reloaded = second.project_for_dir(&project_dir).await.unwrap();
        assert_eq!(reloaded.state().await.files_changed, 7);
    }

    #[tokio::test]
    async fn eviction_flushes_pending_writes() {
        let temp = tempfile::tempdir().unwrap();
        let manager = ProjectManager::with_capacity(temp.path().join("home"), 1);

        let dir_a = temp.path().join("a");
        let dir_b = temp.path().join("b");
        std::fs::create_dir_all(&dir_a).unwrap();
        std::fs::create_dir_all(&dir_b).unwrap();

        let handle_a = manager.project_for_dir(&dir_a).await.unwrap();
        {
            let mut state = handle_a.state().await;
            state.files_changed = 4;
            handle_a.save(&state, false).await.unwrap();
        }

        // Loading a second project evicts the first from the cap-1 cache.
        let _handle_b = manager.project_for_dir(&dir_b).await.unwrap();

        let written: ProjectState = serde_json::from_str(
            &std::fs::read_to_string(handle_a.dir.join(STATE_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(written.files_changed, 4);
    }

    #[tokio::test]
    async fn list_projects_reads_all_state_files() {
        let (temp, manager) = temp_manager();
        for name in ["p1", "p2"] {
            let dir = temp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            let handle = manager.project_for_dir(&dir).await.unwrap();
            let state = handle.state().await;
            handle.save(&state, true).await.unwrap();
        }

        assert_eq!(manager.list_projects().len(), 2);
    }
}
