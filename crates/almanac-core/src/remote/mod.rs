//! Remote store: row-level transport plus typed entity adapter

mod adapter;
#[cfg(test)]
pub(crate) mod fake;
mod mapping;
mod postgrest;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::session::Principal;
use crate::util::compact_text;

pub use adapter::RemoteAdapter;
pub use mapping::{ContactRow, EventRow, OccasionRow, RemoteMapping};
pub use postgrest::PostgrestClient;

/// Error codes meaning the caller's identity is gone or no longer accepted
const IDENTITY_INVALID_CODES: &[&str] = &["bad_jwt", "session_not_found", "user_not_found"];

/// PostgREST codes for a token that failed JWT validation
const JWT_REJECTED_CODES: &[&str] = &["PGRST301", "PGRST303"];

const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("network error: {0}")]
    Network(String),
    #[error("remote API error: {message} ({status})")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("failed to decode remote rows: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RemoteError {
    /// Build an API error from a non-success response body
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let payload = serde_json::from_str::<ApiErrorBody>(body).ok();
        let code = payload.as_ref().and_then(|payload| payload.code.clone());
        Self::Api {
            status: status.as_u16(),
            code,
            message: describe_api_error(status, body),
        }
    }

    /// An access token past its expiry; a refresh can recover from this
    pub fn is_token_expired(&self) -> bool {
        let Self::Api {
            status: 401,
            code,
            message,
        } = self
        else {
            return false;
        };
        let jwt_code = code
            .as_deref()
            .is_some_and(|code| JWT_REJECTED_CODES.contains(&code));
        (jwt_code || code.is_none()) && message.to_ascii_lowercase().contains("expired")
    }

    /// Failures that would hit every other request in the same batch too
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unauthenticated | Self::Network(_) => true,
            Self::Api { status, .. } => matches!(status, 401 | 408 | 429 | 502 | 503 | 504),
            Self::Decode(_) => false,
        }
    }

    /// Whether the backend rejected the principal itself rather than the request
    pub fn is_identity_invalid(&self) -> bool {
        let Self::Api {
            status,
            code: Some(code),
            message,
        } = self
        else {
            return false;
        };

        if matches!(status, 401 | 403) && IDENTITY_INVALID_CODES.contains(&code.as_str()) {
            return true;
        }
        // Owner row is gone: inserts referencing user_id violate the foreign key
        code == FOREIGN_KEY_VIOLATION && message.contains("user_id")
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::Network(format!("invalid response body: {error}"));
        }
        Self::Network(error.to_string())
    }
}

/// Row-level CRUD against one backend table at a time
#[async_trait]
pub trait RowClient: Send + Sync {
    /// Every row of `table` owned by `principal`
    async fn fetch_rows(&self, principal: &Principal, table: &str) -> Result<Vec<Value>, RemoteError>;

    /// Insert-or-replace keyed by `id`
    async fn upsert_rows(
        &self,
        principal: &Principal,
        table: &str,
        rows: Vec<Value>,
    ) -> Result<(), RemoteError>;

    async fn delete_row(&self, principal: &Principal, table: &str, id: &str)
        -> Result<(), RemoteError>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    error: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    details: Option<String>,
}

/// Human-readable message from a Supabase auth or PostgREST error body
pub fn describe_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        let code = payload.code.or(payload.error_code);
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            let mut rendered = message.trim().to_string();
            if let Some(details) = payload.details.filter(|details| !details.trim().is_empty()) {
                rendered = format!("{rendered}: {}", details.trim());
            }
            return match code {
                Some(code) => format!("{rendered} [{code}] ({})", status.as_u16()),
                None => format!("{rendered} ({})", status.as_u16()),
            };
        }
    }

    let compact = compact_text(body);
    if compact.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact, status.as_u16())
    }
}
