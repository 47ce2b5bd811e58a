//! Durable storage for the agent's learned state.

use crate::error::{ModerationError, Result};
use crate::models::AgentState;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Persistence backend for [`AgentState`] snapshots
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, state: &AgentState) -> Result<()>;

    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<AgentState>>;
}

/// JSON file store with `.bak` rotation and atomic replacement
pub struct FileStateStore {
    path: PathBuf,
    backup_path: PathBuf,
    write_lock: Mutex<()>,
    /// Set when a load had to fall back to the backup. The unreadable
    /// primary is then discarded on the next save instead of rotated.
    primary_unreadable: AtomicBool,
}

impl FileStateStore {
    /// Rejects paths that are not `.json` files or that climb out of their
    /// directory through `..`. Absolute paths are accepted as-is, so `path`
    /// must come from trusted configuration; use [`FileStateStore::in_dir`]
    /// to confine it to a base directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let unsafe_path = |reason: &str| ModerationError::UnsafeStatePath {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(unsafe_path("parent directory components are not allowed"));
        }
        let Some(file_name) = path.file_name() else {
            return Err(unsafe_path("path has no file name"));
        };
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            return Err(unsafe_path("state file must have a .json extension"));
        }

        let mut backup_name = OsString::from(file_name);
        backup_name.push(".bak");
        let backup_path = path.with_file_name(backup_name);

        Ok(Self {
            path,
            backup_path,
            write_lock: Mutex::new(()),
            primary_unreadable: AtomicBool::new(false),
        })
    }

    /// Store at `relative` below `base_dir`. Absolute paths and `..`
    /// components are rejected so the file cannot leave the base directory.
    pub fn in_dir(base_dir: impl AsRef<Path>, relative: impl AsRef<Path>) -> Result<Self> {
        let relative = relative.as_ref();
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::RootDir | Component::Prefix(_) | Component::ParentDir
            )
        });
        if escapes {
            return Err(ModerationError::UnsafeStatePath {
                path: relative.display().to_string(),
                reason: format!("must stay inside {}", base_dir.as_ref().display()),
            });
        }
        Self::new(base_dir.as_ref().join(relative))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    async fn write_atomically(&self, data: &[u8]) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent).await?;

        let temp_path = parent.join(format!(
            ".{}.{}.tmp",
            self.path
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default(),
            uuid::Uuid::new_v4()
        ));

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if self.primary_unreadable.swap(false, Ordering::SeqCst) {
            tracing::warn!(
                path = %self.path.display(),
                "Discarding unreadable state file, keeping backup"
            );
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        } else if tokio::fs::try_exists(&self.path).await? {
            tokio::fs::rename(&self.path, &self.backup_path).await?;
        }

        if let Err(err) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(ModerationError::Persistence(format!(
                "Failed to move {} into place: {}",
                temp_path.display(),
                err
            )));
        }
        Ok(())
    }

    async fn read_state(path: &Path) -> Result<Option<AgentState>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save(&self, state: &AgentState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)?;
        let _guard = self.write_lock.lock().await;
        self.write_atomically(&data).await?;

        tracing::info!(
            path = %self.path.display(),
            q_table_size = state.q_table.len(),
            "Agent state saved"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<AgentState>> {
        let primary_error = match Self::read_state(&self.path).await {
            Ok(Some(state)) => return Ok(Some(state)),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "State file unreadable, trying backup"
                );
                Some(err)
            }
        };

        match Self::read_state(&self.backup_path).await {
            Ok(Some(state)) => {
                if primary_error.is_some() {
                    self.primary_unreadable.store(true, Ordering::SeqCst);
                }
                tracing::info!(path = %self.backup_path.display(), "Agent state restored from backup");
                Ok(Some(state))
            }
            Ok(None) => match primary_error {
                Some(err) => Err(err),
                None => Ok(None),
            },
            Err(backup_error) => Err(ModerationError::Persistence(format!(
                "Neither {} nor its backup could be read: {}",
                self.path.display(),
                backup_error
            ))),
        }
    }
}

/// In-process store, mainly for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<AgentState>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: AgentState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn current(&self) -> Option<AgentState> {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save(&self, state: &AgentState) -> Result<()> {
        *self.state.lock().await = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<AgentState>> {
        Ok(self.state.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PolicyEntry, StateKey};
    use tempfile::TempDir;

    fn sample_state(epsilon: f64) -> AgentState {
        let mut state = AgentState::empty(epsilon);
        state.q_table.insert(
            StateKey::new("type_0_len_0_tox_4_auth_2"),
            PolicyEntry::from_values([0.1, 0.6, -0.2]),
        );
        state.recent_rewards = vec![0.5, -1.0];
        state
    }

    #[test]
    fn test_rejects_unsafe_paths() {
        assert!(matches!(
            FileStateStore::new("../escape.json"),
            Err(ModerationError::UnsafeStatePath { .. })
        ));
        assert!(FileStateStore::new("data/state.txt").is_err());
        assert!(FileStateStore::new("data/").is_err());
        assert!(FileStateStore::new("data/state.json").is_ok());
    }

    #[test]
    fn test_in_dir_confines_to_base() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::in_dir(dir.path(), "nested/state.json").unwrap();
        assert_eq!(store.path(), dir.path().join("nested/state.json"));

        assert!(matches!(
            FileStateStore::in_dir(dir.path(), "/etc/state.json"),
            Err(ModerationError::UnsafeStatePath { .. })
        ));
        assert!(FileStateStore::in_dir(dir.path(), "../state.json").is_err());
        assert!(FileStateStore::in_dir(dir.path(), "state.txt").is_err());
    }

    #[test]
    fn test_backup_path_sits_next_to_state() {
        let store = FileStateStore::new("data/agent_state.json").unwrap();
        assert_eq!(store.backup_path(), Path::new("data/agent_state.json.bak"));
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json")).unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_rotates_backup() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("nested/state.json")).unwrap();

        store.save(&sample_state(0.1)).await.unwrap();
        assert!(!store.backup_path().exists());

        store.save(&sample_state(0.2)).await.unwrap();
        assert!(store.backup_path().exists());

        let current = store.load().await.unwrap().unwrap();
        assert_eq!(current.epsilon, 0.2);
        let backup: AgentState =
            serde_json::from_slice(&std::fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.epsilon, 0.1);
    }

    #[tokio::test]
    async fn test_corrupt_primary_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json")).unwrap();
        store.save(&sample_state(0.3)).await.unwrap();
        store.save(&sample_state(0.4)).await.unwrap();

        std::fs::write(store.path(), b"{ not json").unwrap();
        let restored = store.load().await.unwrap().unwrap();
        assert_eq!(restored.epsilon, 0.3);
    }

    #[tokio::test]
    async fn test_save_after_backup_recovery_keeps_good_backup() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json")).unwrap();
        store.save(&sample_state(0.3)).await.unwrap();
        store.save(&sample_state(0.4)).await.unwrap();

        std::fs::write(store.path(), b"{ not json").unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().epsilon, 0.3);
        store.save(&sample_state(0.5)).await.unwrap();

        let backup: AgentState =
            serde_json::from_slice(&std::fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.epsilon, 0.3);
        assert_eq!(store.load().await.unwrap().unwrap().epsilon, 0.5);

        // rotation resumes once the primary is healthy again
        store.save(&sample_state(0.6)).await.unwrap();
        let backup: AgentState =
            serde_json::from_slice(&std::fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.epsilon, 0.5);
    }

    #[tokio::test]
    async fn test_corrupt_without_backup_is_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json")).unwrap();
        std::fs::write(store.path(), b"[]").unwrap();
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_wire_format() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json")).unwrap();
        store.save(&sample_state(0.1)).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["q_table"]["type_0_len_0_tox_4_auth_2"]["1"], 0.6);
        assert_eq!(raw["epsilon"], 0.1);
        assert_eq!(raw["recent_rewards"][1], -1.0);
        assert!(raw["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_memory_store_counts_saves() {
        let store = MemoryStateStore::new();
        assert!(store.load().await.unwrap().is_none());
        store.save(&sample_state(0.1)).await.unwrap();
        store.save(&sample_state(0.1)).await.unwrap();
        assert_eq!(store.save_count(), 2);
        assert!(store.current().await.is_some());
    }
}
