//! Local persistence for entities and the pending-operation queue
//!
//! The local store is the UI's source of truth: reads never fail (storage faults
//! surface as empty results), writes propagate errors so optimistic updates can
//! roll back.

mod memory;
mod migrations;
mod sqlite;

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::error::Result;
use crate::models::{Entity, EntityId, EntityKind};
use crate::sync::PendingOperation;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Document storage for the three entity collections plus the persisted queue.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert or replace a document
    async fn save(&self, kind: EntityKind, id: &EntityId, document: Value) -> Result<()>;

    /// All documents of a kind; empty on storage faults
    async fn load(&self, kind: EntityKind) -> Vec<Value>;

    /// A single document; `None` when absent or on storage faults
    async fn get(&self, kind: EntityKind, id: &EntityId) -> Option<Value>;

    /// Remove a document (absent ids are not an error)
    async fn delete(&self, kind: EntityKind, id: &EntityId) -> Result<()>;

    /// Remove every document of a kind
    async fn clear(&self, kind: EntityKind) -> Result<()>;

    /// Clear a kind and write `documents` in its place, atomically where supported
    async fn replace_all(&self, kind: EntityKind, documents: Vec<(EntityId, Value)>)
        -> Result<()>;

    /// Persisted pending operations, in insertion order
    async fn load_pending(&self) -> Vec<PendingOperation>;

    /// Overwrite the persisted pending operations
    async fn save_pending(&self, operations: &[PendingOperation]) -> Result<()>;

    /// False when running in memory-only mode
    fn is_available(&self) -> bool;
}

/// Open the on-disk store, degrading to memory-only mode when it can't be opened.
pub fn open_local_store(path: impl AsRef<Path>) -> Arc<dyn LocalStore> {
    let path = path.as_ref();
    match SqliteStore::open(path) {
        Ok(store) => {
            tracing::debug!("Opened local store at {}", path.display());
            Arc::new(store)
        }
        Err(error) => {
            tracing::warn!(
                "Local storage unavailable at {} ({}); running in memory-only mode",
                path.display(),
                error
            );
            Arc::new(MemoryStore::new())
        }
    }
}

/// Typed access to a [`LocalStore`].
///
/// Single-entity writes share a gate that a sync write-back holds exclusively,
/// and every committed write bumps a generation counter. A cycle that loaded
/// local state before a write can tell its snapshot is stale.
#[derive(Clone)]
pub struct EntityStore {
    inner: Arc<dyn LocalStore>,
    gate: Arc<RwLock<()>>,
    generation: Arc<AtomicU64>,
}

impl EntityStore {
    pub fn new(inner: Arc<dyn LocalStore>) -> Self {
        Self {
            inner,
            gate: Arc::new(RwLock::new(())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Underlying untyped store
    pub fn raw(&self) -> &Arc<dyn LocalStore> {
        &self.inner
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    /// Number of single-entity writes committed so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Block single-entity writes until the guard is dropped
    pub async fn exclusive(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.gate).write_owned().await
    }

    /// Persist a single entity
    pub async fn save<T: Entity>(&self, entity: &T) -> Result<()> {
        self.save_with(entity, async {}).await
    }

    /// Persist a single entity, then run `committed` before a sync write-back
    /// can observe the new state. `committed` is dropped unrun on failure.
    pub async fn save_with<T, F>(&self, entity: &T, committed: F) -> Result<()>
    where
        T: Entity,
        F: Future<Output = ()> + Send,
    {
        let document = serde_json::to_value(entity)?;
        let _shared = self.gate.read().await;
        self.inner.save(T::KIND, entity.id(), document).await?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        committed.await;
        Ok(())
    }

    /// Load every entity of type `T`, skipping documents that no longer decode
    pub async fn load<T: Entity>(&self) -> Vec<T> {
        self.inner
            .load(T::KIND)
            .await
            .into_iter()
            .filter_map(|document| decode::<T>(document))
            .collect()
    }

    pub async fn get<T: Entity>(&self, id: &EntityId) -> Option<T> {
        let document = self.inner.get(T::KIND, id).await?;
        decode(document)
    }

    pub async fn delete<T: Entity>(&self, id: &EntityId) -> Result<()> {
        self.delete_with::<T, _>(id, async {}).await
    }

    /// [`save_with`](Self::save_with) for deletes
    pub async fn delete_with<T, F>(&self, id: &EntityId, committed: F) -> Result<()>
    where
        T: Entity,
        F: Future<Output = ()> + Send,
    {
        let _shared = self.gate.read().await;
        self.inner.delete(T::KIND, id).await?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        committed.await;
        Ok(())
    }

    /// Clear-and-rewrite the whole collection for `T`.
    ///
    /// Does not take the gate; a sync write-back calls this while holding
    /// [`exclusive`](Self::exclusive).
    pub async fn replace_all<T: Entity>(&self, entities: &[T]) -> Result<()> {
        let documents = entities
            .iter()
            .map(|entity| Ok((entity.id().clone(), serde_json::to_value(entity)?)))
            .collect::<Result<Vec<_>>>()?;
        self.inner.replace_all(T::KIND, documents).await
    }
}

fn decode<T: Entity>(document: Value) -> Option<T> {
    match serde_json::from_value::<T>(document) {
        Ok(entity) => Some(entity),
        Err(error) => {
            tracing::warn!("Skipping undecodable {} document: {}", T::KIND, error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contact;

    #[tokio::test]
    async fn open_local_store_degrades_when_path_is_unusable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory can't be opened as a database file
        let store = open_local_store(dir.path());
        assert!(!store.is_available());

        let typed = EntityStore::new(store);
        let contact = Contact::new("Memory Only");
        typed.save(&contact).await.unwrap();
        assert_eq!(typed.load::<Contact>().await, vec![contact]);
    }

    #[tokio::test]
    async fn typed_load_skips_undecodable_documents() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        store
            .save(
                EntityKind::Contacts,
                &EntityId::from("broken"),
                serde_json::json!({ "unexpected": true }),
            )
            .await
            .unwrap();
        let typed = EntityStore::new(store);
        let contact = Contact::new("Valid");
        typed.save(&contact).await.unwrap();

        let loaded = typed.load::<Contact>().await;
        assert_eq!(loaded, vec![contact]);
    }

    #[tokio::test]
    async fn writes_advance_generation_and_wait_for_exclusive_holder() {
        let typed = EntityStore::new(Arc::new(MemoryStore::new()));
        let contact = Contact::new("Gated");
        typed.save(&contact).await.unwrap();
        assert_eq!(typed.generation(), 1);

        let guard = typed.exclusive().await;
        let writer = {
            let typed = typed.clone();
            let contact = contact.clone();
            tokio::spawn(async move { typed.delete::<Contact>(&contact.id).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(typed.generation(), 1);

        drop(guard);
        writer.await.unwrap().unwrap();
        assert_eq!(typed.generation(), 2);
        assert!(typed.load::<Contact>().await.is_empty());
    }
}
