//! Shared entity identity, kind, and timestamp handling

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::util::format_timestamp;

/// Opaque entity identifier, generated client-side so local and remote copies agree.
///
/// New ids are UUID v7 (time-sortable); ids received from elsewhere are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new unique entity ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The three synchronized entity collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Calendar events
    Events,
    /// Address book contacts
    Contacts,
    /// Birthdays, anniversaries and other yearly dates
    Occasions,
}

impl EntityKind {
    /// Every kind, in sync order
    pub const ALL: [Self; 3] = [Self::Events, Self::Contacts, Self::Occasions];

    /// Table name used by both the local store and the remote backend
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Contacts => "contacts",
            Self::Occasions => "occasions",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "events" => Ok(Self::Events),
            "contacts" => Ok(Self::Contacts),
            "occasions" => Ok(Self::Occasions),
            other => Err(Error::InvalidInput(format!("unknown entity kind: {other}"))),
        }
    }
}

/// A record kept in both the local store and the remote backend.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Collection this entity type lives in
    const KIND: EntityKind;

    /// Stable identifier
    fn id(&self) -> &EntityId;

    /// Creation timestamp (ISO-8601), never overwritten
    fn created_at(&self) -> &str;

    /// Last write timestamp (ISO-8601), the only conflict-resolution signal
    fn updated_at(&self) -> &str;

    /// Overwrite the last write timestamp
    fn set_updated_at(&mut self, value: String);

    /// Advance `updated_at` to now without ever moving it backwards.
    fn touch(&mut self) {
        let previous = parse_timestamp(self.updated_at());
        let next = Utc::now().max(previous);
        self.set_updated_at(format_timestamp(next));
    }
}

/// Parse an entity timestamp; missing or unparseable values become the Unix epoch.
pub fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value.trim())
        .map_or(DateTime::<Utc>::UNIX_EPOCH, |parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_unique() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_entity_kind_round_trips_table_name() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.table().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("notes".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_parse_timestamp_accepts_offsets() {
        let parsed = parse_timestamp("2024-01-02T02:00:00+02:00");
        assert_eq!(format_timestamp(parsed), "2024-01-02T00:00:00.000Z");
    }

    #[test]
    fn test_parse_timestamp_falls_back_to_epoch() {
        assert_eq!(parse_timestamp(""), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(parse_timestamp("yesterday"), DateTime::<Utc>::UNIX_EPOCH);
    }
}
