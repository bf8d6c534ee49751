use std::fmt;

use almanac_core::auth::AuthError;
use almanac_core::remote::RemoteError;
use almanac_core::{EntityKind, MutationFailure};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] almanac_core::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No {kind} entry matches id/prefix: {query}")]
    NotFound { kind: EntityKind, query: String },
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Not signed in. Run `almanac auth login` first.")]
    NotSignedIn,
    #[error(
        "Supabase is not configured. Run `almanac config set --supabase-url <URL> --supabase-anon-key <KEY>` or set ALMANAC_SUPABASE_URL and ALMANAC_SUPABASE_ANON_KEY."
    )]
    SyncNotConfigured,
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}

impl<T: fmt::Debug> From<MutationFailure<T>> for CliError {
    fn from(failure: MutationFailure<T>) -> Self {
        Self::Core(failure.error)
    }
}
