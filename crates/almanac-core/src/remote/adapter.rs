//! Typed, principal-scoped access to the remote tables

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use super::{RemoteError, RemoteMapping, RowClient};
use crate::models::{EntityId, EntityKind};
use crate::session::{Principal, SessionContext};

/// Remote Store Adapter.
///
/// Failures come back as `false` or an empty list. An expired access token is
/// refreshed and the request retried once. An identity-invalid response also
/// signs the session out.
#[derive(Clone)]
pub struct RemoteAdapter {
    client: Arc<dyn RowClient>,
    session: SessionContext,
}

impl RemoteAdapter {
    pub fn new(client: Arc<dyn RowClient>, session: SessionContext) -> Self {
        Self { client, session }
    }

    pub const fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Every remote entity of type `T` owned by the signed-in user.
    ///
    /// Empty when signed out or when the request fails.
    pub async fn fetch_all<T: RemoteMapping>(&self) -> Vec<T> {
        match self.try_fetch_all::<T>().await {
            Ok(entities) => entities,
            Err(RemoteError::Unauthenticated) => Vec::new(),
            Err(error) => {
                tracing::warn!("Fetching remote {} failed: {}", T::KIND, error);
                Vec::new()
            }
        }
    }

    /// Like [`fetch_all`](Self::fetch_all), but keeps the failure so a sync
    /// cycle can tell "nothing remote" from "remote unreachable".
    pub async fn try_fetch_all<T: RemoteMapping>(&self) -> Result<Vec<T>, RemoteError> {
        let client = &self.client;
        let rows = self
            .authorized(|principal| async move {
                client.fetch_rows(&principal, T::KIND.table()).await
            })
            .await?;

        let total = rows.len();
        let entities: Vec<T> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<T::Row>(row) {
                Ok(row) => Some(T::from_remote(row)),
                Err(error) => {
                    tracing::warn!("Skipping malformed remote {} row: {}", T::KIND, error);
                    None
                }
            })
            .collect();
        tracing::debug!(
            "Fetched {}/{} remote {} rows",
            entities.len(),
            total,
            T::KIND
        );
        Ok(entities)
    }

    /// Insert-or-replace every entity; `true` when the backend accepted them all
    pub async fn upsert_many<T: RemoteMapping>(&self, entities: &[T]) -> bool {
        match self.try_upsert_many(entities).await {
            Ok(()) => true,
            Err(RemoteError::Unauthenticated) => false,
            Err(error) => {
                tracing::warn!(
                    "Upserting {} remote {} failed: {}",
                    entities.len(),
                    T::KIND,
                    error
                );
                false
            }
        }
    }

    /// Like [`upsert_many`](Self::upsert_many), keeping the failure
    pub async fn try_upsert_many<T: RemoteMapping>(
        &self,
        entities: &[T],
    ) -> Result<(), RemoteError> {
        let client = &self.client;
        self.authorized(|principal| {
            let rows = entities
                .iter()
                .map(|entity| serde_json::to_value(entity.to_remote(&principal.user_id)))
                .collect::<Result<Vec<Value>, _>>();
            async move {
                match rows {
                    Ok(rows) => client.upsert_rows(&principal, T::KIND.table(), rows).await,
                    Err(error) => Err(RemoteError::from(error)),
                }
            }
        })
        .await
    }

    /// Delete one row; `true` when the backend confirmed
    pub async fn delete_one(&self, kind: EntityKind, id: &EntityId) -> bool {
        match self.try_delete_one(kind, id).await {
            Ok(()) => true,
            Err(RemoteError::Unauthenticated) => false,
            Err(error) => {
                tracing::warn!("Deleting remote {} {} failed: {}", kind, id, error);
                false
            }
        }
    }

    /// Like [`delete_one`](Self::delete_one), keeping the failure
    pub async fn try_delete_one(&self, kind: EntityKind, id: &EntityId) -> Result<(), RemoteError> {
        let client = &self.client;
        self.authorized(|principal| async move {
            client
                .delete_row(&principal, kind.table(), id.as_str())
                .await
        })
        .await
    }

    /// Run `call` as the signed-in principal, retrying once with a refreshed
    /// token when the first attempt reports it expired
    async fn authorized<R, F, Fut>(&self, call: F) -> Result<R, RemoteError>
    where
        F: Fn(Principal) -> Fut,
        Fut: Future<Output = Result<R, RemoteError>>,
    {
        let principal = self.principal()?;
        let result = match call(principal.clone()).await {
            Err(error)
                if error.is_token_expired()
                    && self.session.refresh_access_token(&principal).await =>
            {
                call(self.principal()?).await
            }
            result => result,
        };
        result.map_err(|error| self.observe(error))
    }

    fn principal(&self) -> Result<Principal, RemoteError> {
        self.session
            .principal()
            .ok_or(RemoteError::Unauthenticated)
    }

    fn observe(&self, error: RemoteError) -> RemoteError {
        if error.is_identity_invalid() {
            self.session.invalidate_identity(error.to_string());
        }
        error
    }
}
