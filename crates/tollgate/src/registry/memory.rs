//! In-memory client store.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{ClientRecord, ClientStore, CreateOutcome};
use crate::error::RegistryResult;

/// Process-lifetime client registry.
#[derive(Clone)]
pub struct MemoryClientStore {
    clients: Arc<RwLock<HashMap<String, ClientRecord>>>,
}

impl MemoryClientStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seed a store from existing records. Later duplicates are ignored.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = ClientRecord>) -> Self {
        let mut clients = HashMap::new();
        for record in records {
            clients.entry(record.client_id.clone()).or_insert(record);
        }
        Self {
            clients: Arc::new(RwLock::new(clients)),
        }
    }

    /// Snapshot of every record, sorted by id.
    pub async fn records(&self) -> Vec<ClientRecord> {
        let mut records: Vec<_> = self.clients.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        records
    }
}

#[async_trait::async_trait]
impl ClientStore for MemoryClientStore {
    async fn find_by_id(&self, client_id: &str) -> RegistryResult<Option<ClientRecord>> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn create_if_absent(&self, record: ClientRecord) -> RegistryResult<CreateOutcome> {
        let mut clients = self.clients.write().await;
        match clients.entry(record.client_id.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!(client_id = %record.client_id, "Client already registered");
                Ok(CreateOutcome::AlreadyExists)
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn update_display_name(
        &self,
        client_id: &str,
        display_name: &str,
    ) -> RegistryResult<bool> {
        let mut clients = self.clients.write().await;
        let Some(client) = clients.get_mut(client_id) else {
            return Ok(false);
        };
        client.set_display_name(display_name);
        Ok(true)
    }

    async fn len(&self) -> RegistryResult<usize> {
        Ok(self.clients.read().await.len())
    }
}

impl Default for MemoryClientStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryClientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClientStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> ClientRecord {
        ClientRecord::new("acme", "s3cr3t", "Acme", ["api"]).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let store = MemoryClientStore::new();
        assert_eq!(store.create_if_absent(acme()).await.unwrap(), CreateOutcome::Created);

        let found = store.find_by_id("acme").await.unwrap().unwrap();
        assert_eq!(found.display_name, "Acme");
        assert!(store.find_by_id("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_if_absent_is_idempotent() {
        let store = MemoryClientStore::new();
        store.create_if_absent(acme()).await.unwrap();

        let other = ClientRecord::new("acme", "different", "Imposter", ["admin"]).unwrap();
        assert_eq!(store.create_if_absent(other).await.unwrap(), CreateOutcome::AlreadyExists);

        // First record wins, untouched
        let found = store.find_by_id("acme").await.unwrap().unwrap();
        assert!(found.verify_secret("s3cr3t"));
        assert_eq!(found.display_name, "Acme");
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_converge() {
        let store = MemoryClientStore::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create_if_absent(acme()).await.unwrap() })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() == CreateOutcome::Created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_display_name() {
        let store = MemoryClientStore::from_records([acme()]);
        assert!(store.update_display_name("acme", "Acme Corp").await.unwrap());
        assert!(!store.update_display_name("nobody", "x").await.unwrap());

        let found = store.find_by_id("acme").await.unwrap().unwrap();
        assert_eq!(found.display_name, "Acme Corp");
    }
}
