//! almanac-core - Core library for Almanac
//!
//! Offline-first storage and synchronization for events, contacts and
//! occasions: a local document store, a Supabase-backed remote adapter, a
//! last-write-wins merge, a durable pending-operation queue and the scheduler
//! that decides when everything syncs.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod session;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Contact, Entity, EntityId, EntityKind, Event, Occasion};
pub use services::{Almanac, EntityService, MutationFailure};
pub use session::{Principal, SessionContext, SessionEvent};
pub use sync::{SyncOutcome, SyncState, SyncStatus};
