//! In-memory [`RowClient`] for tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{RemoteError, RowClient};
use crate::session::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    None,
    Network,
    IdentityInvalid,
}

/// Successful calls, per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetches: usize,
    pub upserts: usize,
    pub deletes: usize,
}

impl CallCounts {
    pub const fn total(self) -> usize {
        self.fetches + self.upserts + self.deletes
    }
}

#[derive(Default)]
struct State {
    tables: HashMap<String, BTreeMap<String, Value>>,
    calls: CallCounts,
    failure: FailureMode,
    rejected_tables: HashSet<String>,
    expired_tokens: HashSet<String>,
    fetch_delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeRowClient {
    state: Mutex<State>,
    active_event_fetches: AtomicUsize,
    max_event_fetches: AtomicUsize,
}

impl FakeRowClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_failure(&self, failure: FailureMode) {
        self.state().failure = failure;
    }

    /// Refuse upserts into `table` the way a check constraint would
    pub fn reject_upserts(&self, table: &str) {
        self.state().rejected_tables.insert(table.to_string());
    }

    /// Answer requests made with `access_token` with a 401 "JWT expired"
    pub fn expire_token(&self, access_token: &str) {
        self.state().expired_tokens.insert(access_token.to_string());
    }

    /// Hold every fetch open for `delay` (virtual time under a paused clock)
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state().fetch_delay = Some(delay);
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Highest number of overlapping fetches of the `events` table seen so far
    pub fn max_concurrent_event_fetches(&self) -> usize {
        self.max_event_fetches.load(Ordering::SeqCst)
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Store a row as-is, bypassing the mapping layer
    pub fn insert_raw(&self, table: &str, row: Value) {
        let id = row["id"].as_str().unwrap_or_default().to_string();
        self.state()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
    }

    fn check_failure(&self, principal: &Principal) -> Result<(), RemoteError> {
        let state = self.state();
        if state.expired_tokens.contains(&principal.access_token) {
            return Err(RemoteError::Api {
                status: 401,
                code: Some("PGRST303".into()),
                message: "JWT expired".into(),
            });
        }
        match state.failure {
            FailureMode::None => Ok(()),
            FailureMode::Network => Err(RemoteError::Network("connection refused".into())),
            FailureMode::IdentityInvalid => Err(RemoteError::Api {
                status: 401,
                code: Some("user_not_found".into()),
                message: "User from sub claim in JWT does not exist".into(),
            }),
        }
    }
}

#[async_trait]
impl RowClient for FakeRowClient {
    async fn fetch_rows(&self, principal: &Principal, table: &str) -> Result<Vec<Value>, RemoteError> {
        let tracked = table == "events";
        if tracked {
            let active = self.active_event_fetches.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_event_fetches.fetch_max(active, Ordering::SeqCst);
        }
        let delay = self.state().fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if tracked {
            self.active_event_fetches.fetch_sub(1, Ordering::SeqCst);
        }

        self.check_failure(principal)?;
        let mut state = self.state();
        state.calls.fetches += 1;
        Ok(state
            .tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| row["user_id"] == principal.user_id.as_str())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_rows(
        &self,
        principal: &Principal,
        table: &str,
        rows: Vec<Value>,
    ) -> Result<(), RemoteError> {
        self.check_failure(principal)?;
        let mut state = self.state();
        if state.rejected_tables.contains(table) {
            return Err(RemoteError::Api {
                status: 400,
                code: Some("23514".into()),
                message: format!("new row for relation \"{table}\" violates check constraint"),
            });
        }
        state.calls.upserts += 1;
        let stored = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            let id = row["id"].as_str().unwrap_or_default().to_string();
            stored.insert(id, row);
        }
        Ok(())
    }

    async fn delete_row(&self, principal: &Principal, table: &str, id: &str) -> Result<(), RemoteError> {
        self.check_failure(principal)?;
        let mut state = self.state();
        state.calls.deletes += 1;
        if let Some(rows) = state.tables.get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }
}
