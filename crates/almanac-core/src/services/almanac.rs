//! Application context wiring storage, sync and entity services together

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::entity::{EntityService, MutationResult};
use crate::config::SyncSettings;
use crate::models::{Contact, EntityId, Event, Occasion};
use crate::remote::{RemoteAdapter, RowClient};
use crate::session::SessionContext;
use crate::store::{open_local_store, EntityStore, LocalStore};
use crate::sync::{
    FlushReport, MutationListener, PendingOperation, PendingQueue, SyncEngine, SyncOutcome,
    SyncScheduler, SyncState, SyncStatus,
};

struct Services {
    events: EntityService<Event>,
    contacts: EntityService<Contact>,
    occasions: EntityService<Occasion>,
}

impl Services {
    async fn reload(&self) {
        let (events, contacts, occasions) = tokio::join!(
            self.events.reload(),
            self.contacts.reload(),
            self.occasions.reload()
        );
        tracing::debug!(
            "Loaded {} events, {} contacts, {} occasions",
            events,
            contacts,
            occasions
        );
    }
}

/// One signed-in (or signed-out) client session over a local store.
///
/// `init` loads the lists and starts scheduling; `teardown` stops it.
pub struct Almanac {
    session: SessionContext,
    store: EntityStore,
    scheduler: SyncScheduler,
    services: Arc<Services>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl Almanac {
    /// Build the context over the database at `path`, falling back to memory-only storage
    pub async fn open_path(
        path: impl AsRef<Path>,
        client: Arc<dyn RowClient>,
        session: SessionContext,
        settings: SyncSettings,
    ) -> Self {
        Self::open(open_local_store(path), client, session, settings).await
    }

    pub async fn open(
        raw: Arc<dyn LocalStore>,
        client: Arc<dyn RowClient>,
        session: SessionContext,
        settings: SyncSettings,
    ) -> Self {
        let store = EntityStore::new(Arc::clone(&raw));
        let queue = Arc::new(PendingQueue::restore(raw).await);
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            RemoteAdapter::new(client, session.clone()),
            queue,
        ));
        let scheduler = SyncScheduler::new(engine, settings);
        let listener: Arc<dyn MutationListener> = Arc::new(scheduler.clone());

        Self {
            session,
            services: Arc::new(Services {
                events: EntityService::new(store.clone(), Arc::clone(&listener)),
                contacts: EntityService::new(store.clone(), Arc::clone(&listener)),
                occasions: EntityService::new(store.clone(), listener),
            }),
            store,
            scheduler,
            refresher: Mutex::new(None),
        }
    }

    /// Load the lists, start the scheduler, and refresh the lists after every clean cycle
    pub async fn init(&self) {
        self.services.reload().await;
        self.scheduler.start().await;

        let mut status = self.scheduler.subscribe();
        let services = Arc::downgrade(&self.services);
        let refresher = tokio::spawn(async move {
            while status.changed().await.is_ok() {
                if status.borrow_and_update().state != SyncState::Success {
                    continue;
                }
                let Some(services) = services.upgrade() else {
                    break;
                };
                services.reload().await;
            }
        });
        if let Some(old) = self
            .refresher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(refresher)
        {
            old.abort();
        }
        tracing::info!(
            "Almanac ready ({})",
            if self.store.is_available() {
                "persistent storage"
            } else {
                "memory-only storage"
            }
        );
    }

    /// Load the lists without starting background scheduling
    pub async fn load(&self) {
        self.services.reload().await;
    }

    pub fn teardown(&self) {
        self.scheduler.teardown();
        if let Some(refresher) = self
            .refresher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            refresher.abort();
        }
    }

    pub const fn session(&self) -> &SessionContext {
        &self.session
    }

    pub const fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub fn events(&self) -> &EntityService<Event> {
        &self.services.events
    }

    pub fn contacts(&self) -> &EntityService<Contact> {
        &self.services.contacts
    }

    pub fn occasions(&self) -> &EntityService<Occasion> {
        &self.services.occasions
    }

    /// False when running on the in-memory fallback
    pub fn is_persistent(&self) -> bool {
        self.store.is_available()
    }

    pub fn status(&self) -> SyncStatus {
        self.scheduler.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.scheduler.subscribe()
    }

    /// Run a full cycle now, then refresh the lists from the store
    pub async fn sync_now(&self) -> SyncOutcome {
        let outcome = self.scheduler.sync_now().await;
        if matches!(outcome, SyncOutcome::Synced(_)) {
            self.services.reload().await;
        }
        outcome
    }

    /// Replay the pending queue without a full cycle
    pub async fn flush_pending(&self) -> FlushReport {
        self.scheduler.engine().flush_pending().await
    }

    pub async fn pending_operations(&self) -> Vec<PendingOperation> {
        self.scheduler.engine().queue().snapshot().await
    }

    /// Delete a contact and detach the occasions that referenced it.
    ///
    /// Occasions are kept; their `contact_id` is cleared.
    pub async fn delete_contact(&self, id: &EntityId) -> MutationResult<Contact> {
        let removed = self.services.contacts.remove(id).await?;

        let dependents: Vec<EntityId> = self
            .services
            .occasions
            .items()
            .into_iter()
            .filter(|occasion| occasion.contact_id.as_ref() == Some(id))
            .map(|occasion| occasion.id)
            .collect();
        for occasion_id in dependents {
            if let Err(failure) = self
                .services
                .occasions
                .update(&occasion_id, |occasion| occasion.contact_id = None)
                .await
            {
                tracing::warn!(
                    "Failed to detach occasion {} from deleted contact {}: {}",
                    occasion_id,
                    id,
                    failure
                );
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OccasionKind, Recurrence};
    use crate::remote::fake::FakeRowClient;
    use crate::session::Principal;
    use crate::store::{MemoryStore, SqliteStore};
    use crate::sync::PendingAction;
    use chrono::{NaiveDate, Utc};
    use pretty_assertions::assert_eq;

    async fn offline_almanac(raw: Arc<dyn LocalStore>) -> Almanac {
        let session = SessionContext::new(false);
        session.sign_in(Principal::new("user-1", "token"));
        Almanac::open(
            raw,
            Arc::new(FakeRowClient::new()),
            session,
            SyncSettings::default(),
        )
        .await
    }

    #[tokio::test]
    async fn deleting_a_contact_detaches_its_occasions() {
        let almanac = offline_almanac(Arc::new(MemoryStore::new())).await;
        almanac.load().await;

        let contact = almanac.contacts().add(Contact::new("Ada")).await.unwrap();
        let mut birthday = Occasion::new(
            OccasionKind::Birthday,
            "Ada's birthday",
            NaiveDate::from_ymd_opt(1815, 12, 10).unwrap(),
        );
        birthday.contact_id = Some(contact.id.clone());
        let birthday = almanac.occasions().add(birthday).await.unwrap();

        almanac.delete_contact(&contact.id).await.unwrap();

        assert!(almanac.contacts().is_empty());
        let detached = almanac.occasions().get(&birthday.id).unwrap();
        assert_eq!(detached.contact_id, None);
        assert_eq!(detached.recurrence, Recurrence::Yearly);
        assert!(detached.updated_at >= birthday.updated_at);

        let pending = almanac.pending_operations().await;
        assert_eq!(pending.len(), 2);
        assert!(pending
            .iter()
            .any(|op| op.entity_id == contact.id && op.action == PendingAction::Delete));
    }

    #[tokio::test]
    async fn offline_edits_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("almanac.db");

        {
            let raw: Arc<dyn LocalStore> = Arc::new(SqliteStore::open(&path).unwrap());
            let almanac = offline_almanac(raw).await;
            almanac.load().await;
            almanac
                .events()
                .add(Event::new("Dentist", Utc::now()))
                .await
                .unwrap();
            almanac.teardown();
        }

        let raw: Arc<dyn LocalStore> = Arc::new(SqliteStore::open(&path).unwrap());
        let almanac = offline_almanac(raw).await;
        almanac.load().await;
        assert_eq!(almanac.events().items()[0].title, "Dentist");
        assert_eq!(almanac.pending_operations().await.len(), 1);
        assert!(almanac.is_persistent());
    }

    #[tokio::test]
    async fn sync_now_refreshes_lists_with_remote_rows() {
        let session = SessionContext::new(true);
        session.sign_in(Principal::new("user-1", "token"));
        let fake = Arc::new(FakeRowClient::new());
        let remote = RemoteAdapter::new(fake.clone(), session.clone());
        let from_other_device = Contact::new("From another device");
        assert!(remote.upsert_many(&[from_other_device.clone()]).await);

        let almanac = Almanac::open(
            Arc::new(MemoryStore::new()),
            fake,
            session,
            SyncSettings::default(),
        )
        .await;
        almanac.load().await;
        assert!(almanac.contacts().is_empty());

        assert!(matches!(almanac.sync_now().await, SyncOutcome::Synced(_)));
        assert_eq!(almanac.contacts().items(), vec![from_other_device]);
        almanac.teardown();
    }
}
