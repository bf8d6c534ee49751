//! Durable queue of mutations not yet acknowledged by the remote backend

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{EntityId, EntityKind};
use crate::store::LocalStore;
use crate::util::timestamp_now;

/// What a pending operation will do when replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingAction {
    Upsert,
    Delete,
}

impl PendingAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PendingAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown pending action: {other}"))),
        }
    }
}

/// A queued mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,
    pub entity_kind: EntityKind,
    pub action: PendingAction,
    pub entity_id: EntityId,
    /// When the mutation was queued (ISO-8601)
    pub timestamp: String,
}

impl PendingOperation {
    pub fn new(entity_kind: EntityKind, action: PendingAction, entity_id: EntityId) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            entity_kind,
            action,
            entity_id,
            timestamp: timestamp_now(),
        }
    }

    fn targets(&self, kind: EntityKind, entity_id: &EntityId) -> bool {
        self.entity_kind == kind && &self.entity_id == entity_id
    }
}

/// Pending operations keyed by `(entity_kind, entity_id)`, persisted on every change.
///
/// At most one entry exists per key; enqueueing again replaces the earlier intent.
pub struct PendingQueue {
    operations: Mutex<Vec<PendingOperation>>,
    store: Arc<dyn LocalStore>,
}

impl PendingQueue {
    /// Restore the queue persisted in `store`
    pub async fn restore(store: Arc<dyn LocalStore>) -> Self {
        let operations = store.load_pending().await;
        if !operations.is_empty() {
            tracing::info!("Restored {} pending operations", operations.len());
        }
        Self {
            operations: Mutex::new(operations),
            store,
        }
    }

    /// Queue a mutation, replacing any earlier entry for the same entity.
    pub async fn enqueue(
        &self,
        kind: EntityKind,
        action: PendingAction,
        entity_id: EntityId,
    ) -> Result<PendingOperation> {
        let operation = PendingOperation::new(kind, action, entity_id);
        let mut operations = self.operations.lock().await;
        let mut next = operations.clone();
        next.retain(|existing| !existing.targets(kind, &operation.entity_id));
        next.push(operation.clone());

        self.store.save_pending(&next).await?;
        *operations = next;
        tracing::debug!(
            "Queued {} {} {}",
            operation.action,
            operation.entity_kind,
            operation.entity_id
        );
        Ok(operation)
    }

    /// Drop an entry after its replay succeeded.
    ///
    /// Matches on the operation id, so an entry replaced while its replay was in
    /// flight stays queued.
    pub async fn acknowledge(&self, operation_id: &str) -> Result<bool> {
        let mut operations = self.operations.lock().await;
        if !operations.iter().any(|operation| operation.id == operation_id) {
            return Ok(false);
        }
        let next: Vec<PendingOperation> = operations
            .iter()
            .filter(|operation| operation.id != operation_id)
            .cloned()
            .collect();

        self.store.save_pending(&next).await?;
        *operations = next;
        Ok(true)
    }

    /// Current entries in queue order
    pub async fn snapshot(&self) -> Vec<PendingOperation> {
        self.operations.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.operations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.operations.lock().await.is_empty()
    }

    /// Whether a delete for this entity is still waiting to reach the remote
    pub async fn has_pending_delete(&self, kind: EntityKind, entity_id: &EntityId) -> bool {
        self.operations.lock().await.iter().any(|operation| {
            operation.action == PendingAction::Delete && operation.targets(kind, entity_id)
        })
    }

    /// Ids of entities of `kind` with a queued delete
    pub async fn pending_deletes(&self, kind: EntityKind) -> Vec<EntityId> {
        self.operations
            .lock()
            .await
            .iter()
            .filter(|operation| {
                operation.entity_kind == kind && operation.action == PendingAction::Delete
            })
            .map(|operation| operation.entity_id.clone())
            .collect()
    }
}
