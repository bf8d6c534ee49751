//! In-memory `LocalStore`, used when on-device storage can't be opened

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::LocalStore;
use crate::error::Result;
use crate::models::{EntityId, EntityKind};
use crate::sync::PendingOperation;

#[derive(Default)]
struct Tables {
    documents: HashMap<EntityKind, BTreeMap<EntityId, Value>>,
    pending: Vec<PendingOperation>,
}

/// Volatile store; contents are lost when the process exits
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn save(&self, kind: EntityKind, id: &EntityId, document: Value) -> Result<()> {
        self.tables()
            .documents
            .entry(kind)
            .or_default()
            .insert(id.clone(), document);
        Ok(())
    }

    async fn load(&self, kind: EntityKind) -> Vec<Value> {
        self.tables()
            .documents
            .get(&kind)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn get(&self, kind: EntityKind, id: &EntityId) -> Option<Value> {
        self.tables().documents.get(&kind)?.get(id).cloned()
    }

    async fn delete(&self, kind: EntityKind, id: &EntityId) -> Result<()> {
        if let Some(table) = self.tables().documents.get_mut(&kind) {
            table.remove(id);
        }
        Ok(())
    }

    async fn clear(&self, kind: EntityKind) -> Result<()> {
        self.tables().documents.remove(&kind);
        Ok(())
    }

    async fn replace_all(
        &self,
        kind: EntityKind,
        documents: Vec<(EntityId, Value)>,
    ) -> Result<()> {
        self.tables()
            .documents
            .insert(kind, documents.into_iter().collect());
        Ok(())
    }

    async fn load_pending(&self) -> Vec<PendingOperation> {
        self.tables().pending.clone()
    }

    async fn save_pending(&self, operations: &[PendingOperation]) -> Result<()> {
        self.tables().pending = operations.to_vec();
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let id = EntityId::from("a");
        store
            .save(EntityKind::Events, &id, serde_json::json!({ "id": "a" }))
            .await
            .unwrap();

        assert!(store.get(EntityKind::Events, &id).await.is_some());
        assert!(store.get(EntityKind::Contacts, &id).await.is_none());
        assert_eq!(store.load(EntityKind::Events).await.len(), 1);

        store.delete(EntityKind::Events, &id).await.unwrap();
        assert!(store.load(EntityKind::Events).await.is_empty());
        assert!(!store.is_available());
    }
}
