//! UI-facing collections with optimistic updates

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::error::Error;
use crate::models::{Entity, EntityId};
use crate::store::EntityStore;
use crate::sync::{MutationListener, PendingAction};

/// A mutation that did not commit locally.
///
/// `previous` is the list as it was before the optimistic change; the service
/// has already restored it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct MutationFailure<T: fmt::Debug> {
    pub previous: Vec<T>,
    #[source]
    pub error: Error,
}

pub type MutationResult<T, R = T> = Result<R, MutationFailure<T>>;

struct Listing<T> {
    items: Vec<T>,
    /// Mutations between their optimistic change and their local commit
    in_flight: usize,
    /// A reload was skipped while mutations were in flight
    stale: bool,
}

/// In-memory list of one entity kind, kept in step with the local store.
///
/// Mutations apply to the list first, then persist. A failed local write puts
/// the list back and returns [`MutationFailure`]. Committed writes are handed
/// to the [`MutationListener`].
pub struct EntityService<T> {
    items: RwLock<Listing<T>>,
    store: EntityStore,
    listener: Arc<dyn MutationListener>,
}

impl<T: Entity + fmt::Debug> EntityService<T> {
    pub fn new(store: EntityStore, listener: Arc<dyn MutationListener>) -> Self {
        Self {
            items: RwLock::new(Listing {
                items: Vec::new(),
                in_flight: 0,
                stale: false,
            }),
            store,
            listener,
        }
    }

    /// Replace the in-memory list with what the local store holds.
    ///
    /// While a mutation is between its optimistic change and its commit the
    /// list is left alone; the last mutation to settle reloads instead.
    pub async fn reload(&self) -> usize {
        let loaded = self.store.load::<T>().await;
        let mut listing = self.items.write().unwrap_or_else(PoisonError::into_inner);
        if listing.in_flight > 0 {
            listing.stale = true;
            return listing.items.len();
        }
        listing.items = loaded;
        listing.items.len()
    }

    pub fn items(&self) -> Vec<T> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .clone()
    }

    pub fn get(&self, id: &EntityId) -> Option<T> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .iter()
            .find(|item| item.id() == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn add(&self, entity: T) -> MutationResult<T> {
        let previous = self.apply(|items| items.push(entity.clone()));
        let committed =
            self.listener
                .on_mutation(T::KIND, PendingAction::Upsert, entity.id().clone());
        let result = match self.store.save_with(&entity, committed).await {
            Ok(()) => {
                tracing::debug!("Added {} {}", T::KIND, entity.id());
                Ok(entity)
            }
            Err(error) => Err(self.roll_back(previous, error)),
        };
        self.settle().await;
        result
    }

    /// Apply `patch` to the entity with `id` and advance its `updated_at`
    pub async fn update(&self, id: &EntityId, patch: impl FnOnce(&mut T)) -> MutationResult<T> {
        let Some(mut entity) = self.get(id) else {
            return Err(MutationFailure {
                previous: self.items(),
                error: Error::NotFound {
                    kind: T::KIND,
                    id: id.to_string(),
                },
            });
        };
        patch(&mut entity);
        entity.touch();

        let previous = self.apply(|items| {
            if let Some(slot) = items.iter_mut().find(|item| item.id() == id) {
                *slot = entity.clone();
            }
        });
        let committed = self
            .listener
            .on_mutation(T::KIND, PendingAction::Upsert, id.clone());
        let result = match self.store.save_with(&entity, committed).await {
            Ok(()) => Ok(entity),
            Err(error) => Err(self.roll_back(previous, error)),
        };
        self.settle().await;
        result
    }

    pub async fn remove(&self, id: &EntityId) -> MutationResult<T> {
        let Some(entity) = self.get(id) else {
            return Err(MutationFailure {
                previous: self.items(),
                error: Error::NotFound {
                    kind: T::KIND,
                    id: id.to_string(),
                },
            });
        };

        let previous = self.apply(|items| items.retain(|item| item.id() != id));
        let committed = self
            .listener
            .on_mutation(T::KIND, PendingAction::Delete, id.clone());
        let result = match self.store.delete_with::<T, _>(id, committed).await {
            Ok(()) => {
                tracing::debug!("Removed {} {}", T::KIND, id);
                Ok(entity)
            }
            Err(error) => Err(self.roll_back(previous, error)),
        };
        self.settle().await;
        result
    }

    /// Apply an optimistic change, returning the list as it was.
    ///
    /// Every call must be paired with [`settle`](Self::settle).
    fn apply(&self, change: impl FnOnce(&mut Vec<T>)) -> Vec<T> {
        let mut listing = self.items.write().unwrap_or_else(PoisonError::into_inner);
        listing.in_flight += 1;
        let previous = listing.items.clone();
        change(&mut listing.items);
        previous
    }

    /// End a mutation; the last one out runs any reload that was skipped
    async fn settle(&self) {
        let reload = {
            let mut listing = self.items.write().unwrap_or_else(PoisonError::into_inner);
            listing.in_flight = listing.in_flight.saturating_sub(1);
            let reload = listing.in_flight == 0 && listing.stale;
            if reload {
                listing.stale = false;
            }
            reload
        };
        if reload {
            self.reload().await;
        }
    }

    fn roll_back(&self, previous: Vec<T>, error: Error) -> MutationFailure<T> {
        tracing::warn!("Local {} write failed, rolling back: {}", T::KIND, error);
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .items = previous.clone();
        MutationFailure { previous, error }
    }
}
