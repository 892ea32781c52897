//! Local file backend
//!
//! State lives in a JSON file next to a `.lock` file holding the current
//! [`LockInfo`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::lock::{DEFAULT_LOCK_TIMEOUT_SECS, LockInfo};
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "hasura-infra.state.json";

    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        let path = config
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_STATE_FILE));
        Self::with_path(path)
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        if !fs::try_exists(&self.lock_path).await.unwrap_or(false) {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to read lock file: {}", e)))?;
        let lock = serde_json::from_str(&content)
            .map_err(|e| BackendError::InvalidState(format!("Failed to parse lock file: {}", e)))?;
        Ok(Some(lock))
    }

    /// Publish the lock file only if none exists; `false` when one does
    ///
    /// The content is written to a private file first and then linked into
    /// place, so a reader never sees a partially written lock.
    async fn create_lock(&self, lock: &LockInfo) -> BackendResult<bool> {
        let staged = self.lock_path.with_extension(format!("lock.{}", lock.id));
        fs::write(&staged, serialize_lock(lock)?)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write lock file: {}", e)))?;

        let linked = fs::hard_link(&staged, &self.lock_path).await;
        if let Err(e) = fs::remove_file(&staged).await {
            log::debug!("Failed to remove staged lock {}: {}", staged.display(), e);
        }
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(BackendError::Io(format!("Failed to create lock file: {}", e))),
        }
    }

    /// Move a stale lock aside, restoring it if another run replaced it meanwhile
    async fn discard_stale_lock(&self, stale: Option<&LockInfo>) -> BackendResult<()> {
        let aside = self
            .lock_path
            .with_extension(format!("lock.{}", uuid::Uuid::new_v4()));
        match fs::rename(&self.lock_path, &aside).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(BackendError::Io(format!("Failed to move stale lock: {}", e)));
            }
        }

        let moved: Option<LockInfo> = fs::read_to_string(&aside)
            .await
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok());
        let replaced = match (stale, &moved) {
            (Some(stale), Some(moved)) => moved.id != stale.id && !moved.is_expired(),
            (None, Some(moved)) => !moved.is_expired(),
            (_, None) => false,
        };
        if replaced {
            fs::rename(&aside, &self.lock_path)
                .await
                .map_err(|e| BackendError::Io(format!("Failed to restore lock: {}", e)))?;
            if let Some(moved) = moved {
                return Err(BackendError::locked(&moved));
            }
        }

        fs::remove_file(&aside)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to remove stale lock: {}", e)))
    }

    async fn remove_lock(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to remove lock file: {}", e)))
    }
}

fn serialize_lock(lock: &LockInfo) -> BackendResult<String> {
    serde_json::to_string_pretty(lock)
        .map_err(|e| BackendError::Serialization(format!("Failed to serialize lock: {}", e)))
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        if !fs::try_exists(&self.state_path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to read state file: {}", e)))?;
        let state = serde_json::from_str(&content)
            .map_err(|e| BackendError::InvalidState(format!("Failed to parse state file: {}", e)))?;
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(stored) = self.read_state().await?
            && stored.lineage != state.lineage
        {
            return Err(BackendError::LineageMismatch {
                expected: stored.lineage,
                actual: state.lineage.clone(),
            });
        }

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| BackendError::Serialization(format!("Failed to serialize state: {}", e)))?;

        // Written beside the target then renamed over it
        let tmp = self.state_path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        fs::rename(&tmp, &self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;

        log::debug!(
            "Wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        let lock = LockInfo::new(operation);
        if self.create_lock(&lock).await? {
            return Ok(lock);
        }

        match self.read_lock().await {
            Ok(Some(existing)) if !existing.is_expired() => {
                return Err(BackendError::locked(&existing));
            }
            Ok(Some(existing)) => {
                log::warn!("Taking over expired lock {} held by {}", existing.id, existing.who);
                self.discard_stale_lock(Some(&existing)).await?;
            }
            Ok(None) => {}
            Err(BackendError::InvalidState(_)) => self.discard_stale_lock(None).await?,
            Err(e) => return Err(e),
        }

        if self.create_lock(&lock).await? {
            return Ok(lock);
        }
        match self.read_lock().await? {
            Some(existing) => Err(BackendError::locked(&existing)),
            None => Err(BackendError::Io("Lock file changed while acquiring".to_string())),
        }
    }

    async fn renew_lock(&self, lock: &LockInfo) -> BackendResult<LockInfo> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;
        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }

        let renewed = lock.renewed(DEFAULT_LOCK_TIMEOUT_SECS);
        let tmp = self.lock_path.with_extension("lock.tmp");
        fs::write(&tmp, serialize_lock(&renewed)?)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write lock file: {}", e)))?;
        fs::rename(&tmp, &self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write lock file: {}", e)))?;

        log::debug!("Renewed lock {} until {}", renewed.id, renewed.expires);
        Ok(renewed)
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }

        self.remove_lock().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        match self.read_lock().await? {
            None => Err(BackendError::LockNotFound(lock_id.to_string())),
            Some(existing) if existing.id != lock_id => Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            }),
            Some(_) => self.remove_lock().await,
        }
    }
}
