//! Outbound Ports (Driven Ports)
//!
//! Persistence of the committed binding table.

use async_trait::async_trait;
use shared_types::{PrincipalId, RemoteId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Binding store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binding store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// The binding table: one remote account per principal, and no remote
/// account bound to two principals.
#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn get(&self, principal: &PrincipalId) -> Result<Option<RemoteId>, StoreError>;

    /// Bind `principal` to `remote`, replacing any earlier binding of either.
    async fn set(&self, principal: &PrincipalId, remote: RemoteId) -> Result<(), StoreError>;

    async fn remove(&self, principal: &PrincipalId) -> Result<Option<RemoteId>, StoreError>;

    /// Reverse lookup, used for uniqueness checks and chat relay names.
    async fn principal_for(&self, remote: RemoteId) -> Result<Option<PrincipalId>, StoreError>;
}
