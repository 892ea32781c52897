//! Hasura Infra State Management
//!
//! Persists the identity, identifier and attributes of every deployed
//! resource, tagged with the deployment unit that owns it, so that re-running
//! a deployment is idempotent.
//!
//! - **StateFile**: all managed resources of one deployment
//! - **StateBackend**: storage with locking for safe concurrent runs
//! - **LockInfo**: who holds the lock and until when
//!
//! ```ignore
//! let backend = create_backend(&BackendConfig::local("hasura-infra.state.json"))?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
