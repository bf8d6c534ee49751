//! Sync state shared with UI indicators

use std::fmt;

use serde::Serialize;

/// Scheduler state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    /// Shown briefly after a clean cycle, then reverts to `Idle`
    Success,
    Error,
    Offline,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published to status subscribers; display only, never used for control flow
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub pending_operations: usize,
    /// ISO-8601 instant of the last cycle that finished cleanly
    pub last_synced_at: Option<String>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase_state() {
        let status = SyncStatus {
            state: SyncState::Offline,
            pending_operations: 2,
            ..SyncStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "offline");
        assert_eq!(json["pending_operations"], 2);
        assert_eq!(SyncState::default().to_string(), "idle");
    }
}
