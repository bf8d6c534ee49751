//! Queue replay and full reconciliation cycles

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::merge::{merge_with_report, MergeReport};
use super::queue::{PendingAction, PendingOperation, PendingQueue};
use crate::error::{Error, Result};
use crate::models::{Contact, EntityId, EntityKind, Event, Occasion};
use crate::remote::{RemoteAdapter, RemoteError, RemoteMapping};
use crate::session::SessionContext;
use crate::store::EntityStore;

/// Outcome of draining the pending queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Entries the remote confirmed
    pub replayed: usize,
    /// Upserts whose entity no longer exists locally
    pub discarded: usize,
    /// Entries still queued afterwards
    pub remaining: usize,
}

/// Outcome of a full cycle over every entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub flushed: FlushReport,
    pub events: MergeReport,
    pub contacts: MergeReport,
    pub occasions: MergeReport,
}

enum Replay {
    Applied,
    Discarded,
    /// The backend refused this entry; later entries may still go through
    Rejected(RemoteError),
    /// Every later entry would fail the same way
    Interrupted(RemoteError),
}

impl From<std::result::Result<(), RemoteError>> for Replay {
    fn from(result: std::result::Result<(), RemoteError>) -> Self {
        match result {
            Ok(()) => Self::Applied,
            Err(error) if error.is_transient() => Self::Interrupted(error),
            Err(error) => Self::Rejected(error),
        }
    }
}

/// Moves data between the local store, the pending queue and the remote adapter.
///
/// Queue replays and full cycles never overlap, so a cycle's remote snapshot
/// can't predate a delete it no longer sees queued.
pub struct SyncEngine {
    store: EntityStore,
    remote: RemoteAdapter,
    queue: Arc<PendingQueue>,
    replay: Mutex<()>,
}

impl SyncEngine {
    pub fn new(store: EntityStore, remote: RemoteAdapter, queue: Arc<PendingQueue>) -> Self {
        Self {
            store,
            remote,
            queue,
            replay: Mutex::new(()),
        }
    }

    pub const fn store(&self) -> &EntityStore {
        &self.store
    }

    pub const fn remote(&self) -> &RemoteAdapter {
        &self.remote
    }

    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    pub const fn session(&self) -> &SessionContext {
        self.remote.session()
    }

    /// Put a committed local mutation in the outbox
    pub async fn record(
        &self,
        kind: EntityKind,
        action: PendingAction,
        entity_id: EntityId,
    ) -> Result<PendingOperation> {
        self.queue.enqueue(kind, action, entity_id).await
    }

    /// Replay every queued operation in order.
    ///
    /// An entry the backend refuses stays queued and the rest still replay.
    /// Connectivity failures and a forced sign-out end the pass early.
    /// Does nothing while the sync precondition is false.
    pub async fn flush_pending(&self) -> FlushReport {
        let _replay = self.replay.lock().await;
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> FlushReport {
        let mut report = FlushReport::default();
        if !self.session().can_sync() {
            report.remaining = self.queue.len().await;
            return report;
        }

        for operation in self.queue.snapshot().await {
            let outcome: Replay = match operation.action {
                PendingAction::Delete => self
                    .remote
                    .try_delete_one(operation.entity_kind, &operation.entity_id)
                    .await
                    .into(),
                PendingAction::Upsert => match operation.entity_kind {
                    EntityKind::Events => self.replay_upsert::<Event>(&operation.entity_id).await,
                    EntityKind::Contacts => {
                        self.replay_upsert::<Contact>(&operation.entity_id).await
                    }
                    EntityKind::Occasions => {
                        self.replay_upsert::<Occasion>(&operation.entity_id).await
                    }
                },
            };

            match outcome {
                Replay::Applied => report.replayed += 1,
                Replay::Discarded => report.discarded += 1,
                Replay::Rejected(error) => {
                    tracing::warn!(
                        "Remote rejected {} {} {}; keeping it queued: {}",
                        operation.action,
                        operation.entity_kind,
                        operation.entity_id,
                        error
                    );
                    if !self.session().can_sync() {
                        break;
                    }
                    continue;
                }
                Replay::Interrupted(error) => {
                    tracing::debug!(
                        "Replay of {} {} {} interrupted; keeping the rest queued: {}",
                        operation.action,
                        operation.entity_kind,
                        operation.entity_id,
                        error
                    );
                    break;
                }
            }
            if let Err(error) = self.queue.acknowledge(&operation.id).await {
                tracing::warn!("Failed to persist queue acknowledgement: {}", error);
                break;
            }
        }

        report.remaining = self.queue.len().await;
        if report.replayed + report.discarded > 0 {
            tracing::info!(
                "Flushed pending queue: {} replayed, {} discarded, {} remaining",
                report.replayed,
                report.discarded,
                report.remaining
            );
        }
        report
    }

    async fn replay_upsert<T: RemoteMapping>(&self, id: &EntityId) -> Replay {
        let Some(entity) = self.store.get::<T>(id).await else {
            // Deleted locally since it was queued; nothing left to push
            return Replay::Discarded;
        };
        self.remote
            .try_upsert_many(std::slice::from_ref(&entity))
            .await
            .into()
    }

    /// Full cycle for one kind
    pub async fn sync_kind<T: RemoteMapping>(&self) -> Result<MergeReport> {
        let _replay = self.replay.lock().await;
        self.reconcile::<T>().await
    }

    /// Flush the queue, then reconcile every kind concurrently.
    ///
    /// Kinds are independent; one failing does not stop the others, and the
    /// error names every kind that failed.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        if !self.session().can_sync() {
            return Err(Error::Sync("not signed in or offline".to_string()));
        }
        let _replay = self.replay.lock().await;
        let flushed = self.flush_locked().await;

        let (events, contacts, occasions) = tokio::join!(
            self.reconcile::<Event>(),
            self.reconcile::<Contact>(),
            self.reconcile::<Occasion>(),
        );

        let failures: Vec<String> = [
            (EntityKind::Events, events.as_ref().err()),
            (EntityKind::Contacts, contacts.as_ref().err()),
            (EntityKind::Occasions, occasions.as_ref().err()),
        ]
        .into_iter()
        .filter_map(|(kind, error)| {
            error.map(|error| match error {
                Error::Sync(message) => format!("{kind}: {message}"),
                other => format!("{kind}: {other}"),
            })
        })
        .collect();
        if !failures.is_empty() {
            return Err(Error::Sync(failures.join("; ")));
        }

        Ok(SyncReport {
            flushed,
            events: events?,
            contacts: contacts?,
            occasions: occasions?,
        })
    }

    async fn reconcile<T: RemoteMapping>(&self) -> Result<MergeReport> {
        let generation = self.store.generation();
        let (local, remote) = tokio::join!(self.store.load::<T>(), self.remote.try_fetch_all::<T>());
        let remote = remote.map_err(|error| Error::Sync(error.to_string()))?;

        let exclusive = self.store.exclusive().await;
        let local = if self.store.generation() == generation {
            local
        } else {
            tracing::debug!("Local {} changed during fetch; reloading", T::KIND);
            self.store.load::<T>().await
        };
        let deleted: HashSet<EntityId> = self
            .queue
            .pending_deletes(T::KIND)
            .await
            .into_iter()
            .collect();

        let (mut merged, report) = merge_with_report(local, remote);
        merged.retain(|entity| !deleted.contains(entity.id()));
        let (store, rows) = (&self.store, &merged);
        let local_write = async move {
            let written = store.replace_all(rows).await;
            drop(exclusive);
            written
        };
        let (written, pushed) = tokio::join!(local_write, self.remote.upsert_many(rows));
        written?;
        if !pushed {
            return Err(Error::Sync(format!(
                "remote rejected {} {}",
                merged.len(),
                T::KIND
            )));
        }

        tracing::debug!(
            "Reconciled {}: {} local wins, {} remote wins, {} remote-only, {} local-only",
            T::KIND,
            report.local_wins,
            report.remote_wins,
            report.remote_only,
            report.local_only
        );
        Ok(report)
    }
}
