//! In-memory credential store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::{ApiClient, ApiKey, StoreError};
use crate::ports::{ClientEdit, CredentialStore, KeyEdit};

/// `CredentialStore` backed by concurrent maps
///
/// Edits run while the record's shard is write-locked, so an edit closure
/// must not call back into the store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    clients: DashMap<Uuid, ApiClient>,
    keys: DashMap<Uuid, ApiKey>,
    /// lookup segment -> key ids
    lookup_index: DashMap<String, Vec<Uuid>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn insert_client(&self, client: ApiClient) -> Result<(), StoreError> {
        match self.clients.entry(client.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("client {}", client.id))),
            Entry::Vacant(slot) => {
                slot.insert(client);
                Ok(())
            }
        }
    }

    async fn modify_client(&self, id: Uuid, edit: ClientEdit) -> Result<ApiClient, StoreError> {
        let mut existing = self
            .clients
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("client {}", id)))?;

        let mut next = existing.clone();
        edit(&mut next).map_err(StoreError::Rejected)?;
        next.id = id;

        *existing = next.clone();
        Ok(next)
    }

    async fn get_client(&self, id: Uuid) -> Result<Option<ApiClient>, StoreError> {
        Ok(self.clients.get(&id).map(|c| c.clone()))
    }

    async fn insert_key(&self, key: ApiKey) -> Result<(), StoreError> {
        let lookup = key.lookup.clone();
        let id = key.id;

        match self.keys.entry(id) {
            Entry::Occupied(_) => return Err(StoreError::Duplicate(format!("key {}", id))),
            Entry::Vacant(slot) => {
                slot.insert(key);
            }
        }

        self.lookup_index.entry(lookup).or_default().push(id);
        Ok(())
    }

    async fn modify_key(&self, id: Uuid, edit: KeyEdit) -> Result<ApiKey, StoreError> {
        let mut existing = self
            .keys
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("key {}", id)))?;

        let mut next = existing.clone();
        edit(&mut next).map_err(StoreError::Rejected)?;
        next.id = id;

        // Lookup segment is derived from the secret and never changes
        if next.lookup != existing.lookup {
            return Err(StoreError::Backend(format!(
                "lookup segment of key {} cannot change",
                id
            )));
        }

        *existing = next.clone();
        Ok(next)
    }

    async fn get_key(&self, id: Uuid) -> Result<Option<ApiKey>, StoreError> {
        Ok(self.keys.get(&id).map(|k| k.clone()))
    }

    async fn find_keys_by_lookup(&self, lookup: &str) -> Result<Vec<ApiKey>, StoreError> {
        let ids = match self.lookup_index.get(lookup) {
            Some(ids) => ids.clone(),
            None => return Ok(Vec::new()),
        };

        Ok(ids
            .iter()
            .filter_map(|id| self.keys.get(id).map(|k| k.clone()))
            .collect())
    }

    async fn list_keys(&self, client_id: Uuid) -> Result<Vec<ApiKey>, StoreError> {
        let mut keys: Vec<ApiKey> = self
            .keys
            .iter()
            .filter(|k| k.client_id == client_id)
            .map(|k| k.clone())
            .collect();
        keys.sort_by_key(|k| k.created_at);
        Ok(keys)
    }
}
