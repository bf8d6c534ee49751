//! Decides when sync cycles run and publishes their status.
//!
//! Cycles start from four triggers: the debounce timer restarted on every
//! mutation, the periodic timer, the sync precondition turning true, and
//! [`SyncScheduler::sync_now`]. At most one cycle runs at a time; triggers that
//! arrive meanwhile collapse into a single follow-up cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::engine::{SyncEngine, SyncReport};
use super::queue::PendingAction;
use super::status::{SyncState, SyncStatus};
use super::timers::{TimerHandle, Timers};
use crate::config::SyncSettings;
use crate::models::{EntityId, EntityKind};
use crate::session::{Connectivity, SessionContext};
use crate::util::timestamp_now;

/// Receives the "data mutated" signal from entity services.
///
/// Called after the local write committed and before a sync write-back can
/// observe it.
#[async_trait]
pub trait MutationListener: Send + Sync {
    async fn on_mutation(&self, kind: EntityKind, action: PendingAction, entity_id: EntityId);
}

/// Result of asking for a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced(SyncReport),
    Failed(String),
    /// A cycle was already running; one more will run after it
    Coalesced,
    /// The precondition was false
    Skipped,
}

#[derive(Default)]
struct TimerSlots {
    debounce: Option<TimerHandle>,
    periodic: Option<TimerHandle>,
    revert: Option<TimerHandle>,
    watcher: Option<JoinHandle<()>>,
}

struct Inner {
    engine: Arc<SyncEngine>,
    settings: SyncSettings,
    timers: Timers,
    status: watch::Sender<SyncStatus>,
    slots: Mutex<TimerSlots>,
    in_flight: AtomicBool,
    rerun: AtomicBool,
    /// Whether this session already had its initial full sync
    initial_done: AtomicBool,
}

#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, settings: SyncSettings) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            inner: Arc::new(Inner {
                engine,
                settings,
                timers: Timers::new(),
                status,
                slots: Mutex::new(TimerSlots::default()),
                in_flight: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                initial_done: AtomicBool::new(false),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.inner.engine
    }

    /// Start following the session's connectivity.
    ///
    /// When the precondition already holds this flushes the queue and runs the
    /// session's initial sync in the background.
    pub async fn start(&self) {
        let session = self.inner.engine.session().clone();
        let mut changes = session.subscribe();
        let initial = *changes.borrow_and_update();

        self.inner.refresh_pending().await;
        if !initial.online {
            self.inner.set_state(SyncState::Offline);
        }
        self.inner.on_connectivity(Connectivity::default(), initial);

        let weak = Arc::downgrade(&self.inner);
        let watcher = tokio::spawn(async move {
            let mut previous = initial;
            while changes.changed().await.is_ok() {
                let current = *changes.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.on_connectivity(previous, current);
                previous = current;
            }
        });
        if let Some(old) = self.inner.slots().watcher.replace(watcher) {
            old.abort();
        }
        tracing::debug!("Sync scheduler started");
    }

    /// Stop timers and the connectivity watcher. A cycle in flight finishes on its own.
    pub fn teardown(&self) {
        {
            let mut slots = self.inner.slots();
            if let Some(watcher) = slots.watcher.take() {
                watcher.abort();
            }
            *slots = TimerSlots::default();
        }
        self.inner.timers.cancel_all();
        self.inner.initial_done.store(false, Ordering::SeqCst);
        tracing::debug!("Sync scheduler stopped");
    }

    /// Run a cycle now, or fold into the one already running
    pub async fn sync_now(&self) -> SyncOutcome {
        Inner::run(&self.inner).await
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Whether a cycle is running right now
    pub fn is_syncing(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MutationListener for SyncScheduler {
    async fn on_mutation(&self, kind: EntityKind, action: PendingAction, entity_id: EntityId) {
        if let Err(error) = self.inner.engine.record(kind, action, entity_id).await {
            tracing::warn!("Failed to queue {} {}: {}", action, kind, error);
        }
        self.inner.refresh_pending().await;

        if self.inner.engine.session().can_sync() {
            Inner::spawn_flush(&self.inner);
            Inner::restart_debounce(&self.inner);
        }
    }
}

impl Inner {
    fn slots(&self) -> MutexGuard<'_, TimerSlots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> &SessionContext {
        self.engine.session()
    }

    fn set_state(&self, state: SyncState) {
        self.status.send_if_modified(|status| {
            let changed = status.state != state;
            status.state = state;
            changed
        });
    }

    async fn refresh_pending(&self) {
        let pending = self.engine.queue().len().await;
        self.status.send_if_modified(|status| {
            let changed = status.pending_operations != pending;
            status.pending_operations = pending;
            changed
        });
    }

    fn on_connectivity(self: &Arc<Self>, previous: Connectivity, current: Connectivity) {
        if !current.online {
            self.pause();
            self.set_state(SyncState::Offline);
            return;
        }
        if !current.authenticated {
            self.pause();
            self.initial_done.store(false, Ordering::SeqCst);
            self.set_state(SyncState::Idle);
            return;
        }
        if previous.can_sync() {
            return;
        }

        if self.status.borrow().state == SyncState::Offline {
            self.set_state(SyncState::Idle);
        }
        self.start_periodic();
        if self.initial_done.swap(true, Ordering::SeqCst) {
            tracing::info!("Back online; replaying pending operations");
            Self::spawn_flush(self);
        } else {
            tracing::info!("Sync available; running initial sync");
            Self::spawn_cycle(self);
        }
    }

    fn pause(&self) {
        let mut slots = self.slots();
        for handle in [slots.periodic.take(), slots.debounce.take()]
            .into_iter()
            .flatten()
        {
            self.timers.cancel(handle);
        }
    }

    fn start_periodic(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = self.timers.schedule_every(self.settings.interval(), move || {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    Self::spawn_cycle(&inner);
                }
            }
        });
        if let Some(old) = self.slots().periodic.replace(handle) {
            self.timers.cancel(old);
        }
    }

    fn restart_debounce(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = self.timers.schedule_after(self.settings.debounce(), async move {
            if let Some(inner) = weak.upgrade() {
                Self::spawn_cycle(&inner);
            }
        });
        if let Some(old) = self.slots().debounce.replace(handle) {
            self.timers.cancel(old);
        }
    }

    fn schedule_revert(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = self
            .timers
            .schedule_after(self.settings.success_display(), async move {
                if let Some(inner) = weak.upgrade() {
                    inner.status.send_if_modified(|status| {
                        if status.state == SyncState::Success {
                            status.state = SyncState::Idle;
                            true
                        } else {
                            false
                        }
                    });
                }
            });
        if let Some(old) = self.slots().revert.replace(handle) {
            self.timers.cancel(old);
        }
    }

    /// Cycles run in their own task so cancelling a timer never aborts one midway
    fn spawn_cycle(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            Self::run(&inner).await;
        });
    }

    fn spawn_flush(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.engine.flush_pending().await;
            inner.refresh_pending().await;
        });
    }

    async fn run(self: &Arc<Self>) -> SyncOutcome {
        if !self.session().can_sync() {
            if !self.session().connectivity().online {
                self.set_state(SyncState::Offline);
            }
            return SyncOutcome::Skipped;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.rerun.store(true, Ordering::SeqCst);
            tracing::debug!("Sync already running; coalescing trigger");
            return SyncOutcome::Coalesced;
        }

        loop {
            let outcome = self.cycle().await;
            if self.rerun.swap(false, Ordering::SeqCst) && self.session().can_sync() {
                continue;
            }
            self.in_flight.store(false, Ordering::SeqCst);
            // A trigger may have landed between the check above and the release
            if self.rerun.swap(false, Ordering::SeqCst)
                && self.session().can_sync()
                && !self.in_flight.swap(true, Ordering::SeqCst)
            {
                continue;
            }
            return outcome;
        }
    }

    async fn cycle(self: &Arc<Self>) -> SyncOutcome {
        if let Some(handle) = self.slots().debounce.take() {
            self.timers.cancel(handle);
        }
        self.set_state(SyncState::Syncing);
        tracing::debug!("Sync cycle started");

        let result = self.engine.sync_all().await;
        let pending = self.engine.queue().len().await;
        let online = self.session().connectivity().online;

        match result {
            Ok(report) => {
                tracing::info!(
                    "Sync complete ({} pending operations remain)",
                    pending
                );
                self.status.send_modify(|status| {
                    status.state = if online {
                        SyncState::Success
                    } else {
                        SyncState::Offline
                    };
                    status.pending_operations = pending;
                    status.last_synced_at = Some(timestamp_now());
                    status.last_error = None;
                });
                if online {
                    self.schedule_revert();
                }
                SyncOutcome::Synced(report)
            }
            Err(error) => {
                let message = error.to_string();
                tracing::warn!("Sync cycle failed: {}", message);
                self.status.send_modify(|status| {
                    status.state = if online {
                        SyncState::Error
                    } else {
                        SyncState::Offline
                    };
                    status.pending_operations = pending;
                    status.last_error = Some(message.clone());
                });
                SyncOutcome::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, Entity};
    use crate::remote::fake::{FailureMode, FakeRowClient};
    use crate::remote::RemoteAdapter;
    use crate::session::Principal;
    use crate::store::{EntityStore, LocalStore, MemoryStore};
    use crate::sync::PendingQueue;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time;

    struct Harness {
        scheduler: SyncScheduler,
        fake: Arc<FakeRowClient>,
        session: SessionContext,
        store: EntityStore,
    }

    async fn harness(online: bool, signed_in: bool) -> Harness {
        let raw: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let session = SessionContext::new(online);
        if signed_in {
            session.sign_in(Principal::new("user-1", "token"));
        }
        let fake = Arc::new(FakeRowClient::new());
        let store = EntityStore::new(Arc::clone(&raw));
        let queue = Arc::new(PendingQueue::restore(raw).await);
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            RemoteAdapter::new(fake.clone(), session.clone()),
            queue,
        ));
        Harness {
            scheduler: SyncScheduler::new(engine, SyncSettings::default()),
            fake,
            session,
            store,
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn mutate(h: &Harness, name: &str) -> Contact {
        let contact = Contact::new(name);
        h.store.save(&contact).await.unwrap();
        h.scheduler
            .on_mutation(Contact::KIND, PendingAction::Upsert, contact.id.clone())
            .await;
        contact
    }

    /// Full cycles fetch every kind once; count the `events` fetches
    fn cycles(h: &Harness) -> usize {
        h.fake.calls().fetches / 3
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_triggers_run_one_cycle_at_a_time() {
        let h = harness(true, true).await;
        h.fake.set_fetch_delay(Duration::from_secs(1));

        let first = tokio::spawn({
            let scheduler = h.scheduler.clone();
            async move { scheduler.sync_now().await }
        });
        settle().await;
        assert!(h.scheduler.is_syncing());
        assert_eq!(h.scheduler.sync_now().await, SyncOutcome::Coalesced);
        assert_eq!(h.scheduler.sync_now().await, SyncOutcome::Coalesced);

        let outcome = first.await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Synced(_)));
        assert_eq!(h.fake.max_concurrent_event_fetches(), 1);
        // Both coalesced triggers fold into one follow-up cycle
        assert_eq!(cycles(&h), 2);
        assert!(!h.scheduler.is_syncing());
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_burst_is_debounced_into_one_cycle() {
        let h = harness(true, true).await;
        h.scheduler.start().await;
        settle().await;
        let initial_cycles = cycles(&h);
        assert_eq!(initial_cycles, 1);

        for name in ["a", "b", "c"] {
            mutate(&h, name).await;
            time::advance(Duration::from_millis(500)).await;
            settle().await;
        }
        assert_eq!(cycles(&h), initial_cycles);

        time::advance(Duration::from_millis(1_500)).await;
        settle().await;
        assert_eq!(cycles(&h), initial_cycles + 1);
        assert_eq!(h.fake.rows("contacts").len(), 3);
        h.scheduler.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn offline_mutations_queue_and_flush_on_reconnect() {
        let h = harness(false, true).await;
        h.scheduler.start().await;
        assert_eq!(h.scheduler.status().state, SyncState::Offline);

        for name in ["a", "b", "c"] {
            mutate(&h, name).await;
        }
        assert_eq!(h.scheduler.status().pending_operations, 3);
        assert_eq!(h.fake.calls().total(), 0);

        h.session.set_online(true);
        settle().await;

        assert_eq!(h.scheduler.engine().queue().len().await, 0);
        assert_eq!(h.fake.rows("contacts").len(), 3);
        assert_eq!(h.scheduler.status().state, SyncState::Success);
        h.scheduler.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn offline_pauses_periodic_sync() {
        let h = harness(true, true).await;
        h.scheduler.start().await;
        settle().await;
        let after_initial = cycles(&h);

        time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(cycles(&h), after_initial + 1);

        h.session.set_online(false);
        settle().await;
        assert_eq!(h.scheduler.status().state, SyncState::Offline);
        time::advance(Duration::from_secs(180)).await;
        settle().await;
        assert_eq!(cycles(&h), after_initial + 1);

        h.session.set_online(true);
        settle().await;
        time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(cycles(&h), after_initial + 2);
        h.scheduler.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn success_reverts_to_idle_after_display_delay() {
        let h = harness(true, true).await;
        assert!(matches!(h.scheduler.sync_now().await, SyncOutcome::Synced(_)));
        let status = h.scheduler.status();
        assert_eq!(status.state, SyncState::Success);
        assert!(status.last_synced_at.is_some());

        time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(h.scheduler.status().state, SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_keeps_error_for_display() {
        let h = harness(true, true).await;
        h.fake.set_failure(FailureMode::Network);

        let SyncOutcome::Failed(message) = h.scheduler.sync_now().await else {
            panic!("expected failure");
        };
        let status = h.scheduler.status();
        assert_eq!(status.state, SyncState::Error);
        assert_eq!(status.last_error.as_deref(), Some(message.as_str()));

        h.fake.set_failure(FailureMode::None);
        assert!(matches!(h.scheduler.sync_now().await, SyncOutcome::Synced(_)));
        assert_eq!(h.scheduler.status().last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_trigger_is_skipped() {
        let h = harness(true, false).await;
        assert_eq!(h.scheduler.sync_now().await, SyncOutcome::Skipped);
        assert_eq!(h.fake.calls().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_sign_out_stops_scheduling() {
        let h = harness(true, true).await;
        h.scheduler.start().await;
        settle().await;
        let after_initial = cycles(&h);

        h.fake.set_failure(FailureMode::IdentityInvalid);
        mutate(&h, "rejected").await;
        settle().await;
        assert!(!h.session.can_sync());
        assert_eq!(h.scheduler.status().state, SyncState::Idle);
        assert_eq!(h.scheduler.engine().queue().len().await, 1);

        time::advance(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(cycles(&h), after_initial);
    }
}
