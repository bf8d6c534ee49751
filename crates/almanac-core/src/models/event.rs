//! Calendar event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, EntityKind};
use crate::util::timestamp_now;

/// A calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: EntityId,
    /// Display title
    pub title: String,
    /// Optional free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Start instant
    pub starts_at: DateTime<Utc>,
    /// Optional end instant
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Whether the event spans whole days
    #[serde(default)]
    pub all_day: bool,
    /// Display color (e.g. `#3b82f6`)
    #[serde(default)]
    pub color: Option<String>,
    /// Creation timestamp (ISO-8601)
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp (ISO-8601)
    #[serde(default)]
    pub updated_at: String,
}

impl Event {
    /// Create a new event starting at `starts_at`
    #[must_use]
    pub fn new(title: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        let now = timestamp_now();
        Self {
            id: EntityId::new(),
            title: title.into(),
            description: None,
            starts_at,
            ends_at: None,
            all_day: false,
            color: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether the event is still running or upcoming at `now`
    #[must_use]
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.unwrap_or(self.starts_at) >= now
    }
}

impl Entity for Event {
    const KIND: EntityKind = EntityKind::Events;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn created_at(&self) -> &str {
        &self.created_at
    }

    fn updated_at(&self) -> &str {
        &self.updated_at
    }

    fn set_updated_at(&mut self, value: String) {
        self.updated_at = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_event_new() {
        let starts_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let event = Event::new("Standup", starts_at);
        assert_eq!(event.title, "Standup");
        assert!(!event.created_at.is_empty());
        assert_eq!(event.created_at, event.updated_at);
    }

    #[test]
    fn test_is_upcoming_uses_end_when_present() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut event = Event::new("Workshop", now - Duration::hours(2));
        assert!(!event.is_upcoming(now));

        event.ends_at = Some(now + Duration::hours(1));
        assert!(event.is_upcoming(now));
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut event = Event::new("Future edit", Utc::now());
        event.updated_at = "2999-01-01T00:00:00.000Z".to_string();
        event.touch();
        assert_eq!(event.updated_at, "2999-01-01T00:00:00.000Z");
    }
}
