//! In-memory port implementations.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{PrincipalId, RemoteId, SessionTag};

use crate::ports::{BindingStore, PrincipalDirectory, StoreError};

/// Principal to remote mapping with its reverse index. Binding a pair
/// evicts any earlier binding of either side.
#[derive(Debug, Default, Clone)]
pub struct BindingTable {
    by_principal: BTreeMap<PrincipalId, RemoteId>,
    by_remote: HashMap<RemoteId, PrincipalId>,
}

impl BindingTable {
    pub fn from_map(map: BTreeMap<PrincipalId, RemoteId>) -> Self {
        let mut table = Self::default();
        for (principal, remote) in map {
            table.bind(principal, remote);
        }
        table
    }

    pub fn get(&self, principal: &PrincipalId) -> Option<RemoteId> {
        self.by_principal.get(principal).copied()
    }

    pub fn principal_for(&self, remote: RemoteId) -> Option<PrincipalId> {
        self.by_remote.get(&remote).cloned()
    }

    pub fn bind(&mut self, principal: PrincipalId, remote: RemoteId) {
        if let Some(previous) = self.by_principal.remove(&principal) {
            self.by_remote.remove(&previous);
        }
        if let Some(holder) = self.by_remote.remove(&remote) {
            self.by_principal.remove(&holder);
        }
        self.by_remote.insert(remote, principal.clone());
        self.by_principal.insert(principal, remote);
    }

    pub fn unbind(&mut self, principal: &PrincipalId) -> Option<RemoteId> {
        let remote = self.by_principal.remove(principal)?;
        self.by_remote.remove(&remote);
        Some(remote)
    }

    pub fn as_map(&self) -> &BTreeMap<PrincipalId, RemoteId> {
        &self.by_principal
    }

    pub fn len(&self) -> usize {
        self.by_principal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_principal.is_empty()
    }
}

/// Volatile binding store. Bindings are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryBindingStore {
    table: RwLock<BindingTable>,
}

impl InMemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

#[async_trait]
impl BindingStore for InMemoryBindingStore {
    async fn get(&self, principal: &PrincipalId) -> Result<Option<RemoteId>, StoreError> {
        Ok(self.table.read().get(principal))
    }

    async fn set(&self, principal: &PrincipalId, remote: RemoteId) -> Result<(), StoreError> {
        self.table.write().bind(principal.clone(), remote);
        Ok(())
    }

    async fn remove(&self, principal: &PrincipalId) -> Result<Option<RemoteId>, StoreError> {
        Ok(self.table.write().unbind(principal))
    }

    async fn principal_for(&self, remote: RemoteId) -> Result<Option<PrincipalId>, StoreError> {
        Ok(self.table.read().principal_for(remote))
    }
}

/// Online principals, maintained by the host through `join` / `leave`.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    sessions: RwLock<HashMap<PrincipalId, SessionTag>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, principal: PrincipalId, session: SessionTag) {
        self.sessions.write().insert(principal, session);
    }

    pub fn leave(&self, principal: &PrincipalId) -> Option<SessionTag> {
        self.sessions.write().remove(principal)
    }

    pub fn online(&self) -> usize {
        self.sessions.read().len()
    }
}

impl PrincipalDirectory for InMemoryDirectory {
    fn session_tag(&self, principal: &PrincipalId) -> Option<SessionTag> {
        self.sessions.read().get(principal).cloned()
    }
}
