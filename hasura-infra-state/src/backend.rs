//! State backend trait and error types

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::lock::LockInfo;
use crate::state::StateFile;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    #[error("Lock not found: {0}")]
    LockNotFound(String),

    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    #[error("Invalid state file: {0}")]
    InvalidState(String),

    /// The stored state belongs to another deployment
    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for the state file and its lock
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Returns `None` before the first write
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Persist the state; rejected if the stored state has another lineage
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Fails while an unexpired lock is held
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo>;

    /// Push the expiry of a lock this run still holds
    async fn renew_lock(&self, lock: &LockInfo) -> BackendResult<LockInfo>;

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;
}

/// Where state is kept
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Only "local" is supported
    pub backend_type: String,
    pub path: Option<PathBuf>,
}

impl BackendConfig {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            backend_type: "local".to_string(),
            path: Some(path.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_error_names_the_holder() {
        let lock = LockInfo::new("apply");
        let error = BackendError::locked(&lock);

        assert_eq!(
            error.to_string(),
            format!(
                "State is locked by {} (lock ID: {}, operation: apply)",
                lock.who, lock.id
            )
        );
    }

    #[test]
    fn local_config() {
        let config = BackendConfig::local("state.json");
        assert_eq!(config.backend_type, "local");
        assert_eq!(config.path, Some(PathBuf::from("state.json")));
    }
}
