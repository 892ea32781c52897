//! Lock held while a deployment changes state

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Locks left behind by a crashed run expire after 15 minutes
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 900;

/// A live run renews its lock well before it expires
pub const LOCK_RENEW_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    /// "apply", "destroy", ...
    pub operation: String,
    /// `user@host`
    pub who: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(operation: impl Into<String>) -> Self {
        Self::with_timeout(operation, DEFAULT_LOCK_TIMEOUT_SECS)
    }

    pub fn with_timeout(operation: impl Into<String>, timeout_secs: i64) -> Self {
        let created = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: lock_owner(),
            created,
            expires: created + Duration::seconds(timeout_secs),
        }
    }

    /// Same lock, expiring `timeout_secs` from now
    pub fn renewed(&self, timeout_secs: i64) -> Self {
        Self {
            expires: Utc::now() + Duration::seconds(timeout_secs),
            ..self.clone()
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }

    pub fn time_remaining(&self) -> Duration {
        self.expires - Utc::now()
    }
}

fn lock_owner() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}@{}", user, host)
}
