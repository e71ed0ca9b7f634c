//! JSON-file binding store.
//!
//! The whole table is kept in memory and rewritten on every change: write to
//! `<path>.tmp`, then rename over the original.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shared_types::{PrincipalId, RemoteId};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::memory::BindingTable;
use crate::ports::{BindingStore, StoreError};

pub struct JsonFileBindingStore {
    path: PathBuf,
    table: Mutex<BindingTable>,
}

impl JsonFileBindingStore {
    /// Load `path`, or start empty when it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BindingTable::default(),
            Ok(bytes) => {
                let map: BTreeMap<PrincipalId, RemoteId> = serde_json::from_slice(&bytes)?;
                BindingTable::from_map(map)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No binding file yet, starting empty");
                BindingTable::default()
            }
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), bindings = table.len(), "Binding store loaded");
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &BindingTable) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(table.as_map())?;
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        debug!(path = %self.path.display(), bindings = table.len(), "Binding store written");
        Ok(())
    }
}

#[async_trait]
impl BindingStore for JsonFileBindingStore {
    async fn get(&self, principal: &PrincipalId) -> Result<Option<RemoteId>, StoreError> {
        Ok(self.table.lock().await.get(principal))
    }

    async fn set(&self, principal: &PrincipalId, remote: RemoteId) -> Result<(), StoreError> {
        let mut table = self.table.lock().await;
        let mut updated = table.clone();
        updated.bind(principal.clone(), remote);
        self.persist(&updated).await?;
        *table = updated;
        Ok(())
    }

    async fn remove(&self, principal: &PrincipalId) -> Result<Option<RemoteId>, StoreError> {
        let mut table = self.table.lock().await;
        let mut updated = table.clone();
        let removed = updated.unbind(principal);
        if removed.is_some() {
            self.persist(&updated).await?;
            *table = updated;
        }
        Ok(removed)
    }

    async fn principal_for(&self, remote: RemoteId) -> Result<Option<PrincipalId>, StoreError> {
        Ok(self.table.lock().await.principal_for(remote))
    }
}
