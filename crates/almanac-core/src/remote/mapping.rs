//! Entity <-> backend row translation
//!
//! Each impl destructures both sides exhaustively, so adding a field to an
//! entity or a row without mapping it is a compile error. `id`, `created_at`
//! and `updated_at` always round-trip unchanged.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{
    Contact, Entity, EntityId, Event, Occasion, OccasionKind, Recurrence, ReminderConfig,
};

/// Typed mapping between an entity and its backend row
pub trait RemoteMapping: Entity {
    type Row: Serialize + DeserializeOwned + Send + 'static;

    fn to_remote(&self, user_id: &str) -> Self::Row;

    fn from_remote(row: Self::Row) -> Self;
}

/// Empty or null timestamps from the backend decode as `""`, which merges as epoch zero
fn timestamp_from_remote(value: Option<String>) -> String {
    value.unwrap_or_default()
}

fn timestamp_to_remote(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: bool,
    pub color: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl RemoteMapping for Event {
    type Row = EventRow;

    fn to_remote(&self, user_id: &str) -> EventRow {
        let Self {
            id,
            title,
            description,
            starts_at,
            ends_at,
            all_day,
            color,
            created_at,
            updated_at,
        } = self;
        EventRow {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: title.clone(),
            description: description.clone(),
            start_at: *starts_at,
            end_at: *ends_at,
            all_day: *all_day,
            color: color.clone(),
            created_at: timestamp_to_remote(created_at),
            updated_at: timestamp_to_remote(updated_at),
        }
    }

    fn from_remote(row: EventRow) -> Self {
        let EventRow {
            id,
            user_id: _,
            title,
            description,
            start_at,
            end_at,
            all_day,
            color,
            created_at,
            updated_at,
        } = row;
        Self {
            id: EntityId::from(id),
            title,
            description,
            starts_at: start_at,
            ends_at: end_at,
            all_day,
            color,
            created_at: timestamp_from_remote(created_at),
            updated_at: timestamp_from_remote(updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl RemoteMapping for Contact {
    type Row = ContactRow;

    fn to_remote(&self, user_id: &str) -> ContactRow {
        let Self {
            id,
            name,
            email,
            phone,
            notes,
            created_at,
            updated_at,
        } = self;
        ContactRow {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: name.clone(),
            email: email.clone(),
            phone: phone.clone(),
            notes: notes.clone(),
            created_at: timestamp_to_remote(created_at),
            updated_at: timestamp_to_remote(updated_at),
        }
    }

    fn from_remote(row: ContactRow) -> Self {
        let ContactRow {
            id,
            user_id: _,
            name,
            email,
            phone,
            notes,
            created_at,
            updated_at,
        } = row;
        Self {
            id: EntityId::from(id),
            name,
            email,
            phone,
            notes,
            created_at: timestamp_from_remote(created_at),
            updated_at: timestamp_from_remote(updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccasionRow {
    pub id: String,
    pub user_id: String,
    pub contact_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: OccasionKind,
    pub title: String,
    pub date: NaiveDate,
    pub recurrence: Recurrence,
    pub reminder_enabled: bool,
    pub reminder_days_before: u32,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl RemoteMapping for Occasion {
    type Row = OccasionRow;

    fn to_remote(&self, user_id: &str) -> OccasionRow {
        let Self {
            id,
            contact_id,
            kind,
            title,
            date,
            recurrence,
            reminder:
                ReminderConfig {
                    enabled,
                    days_before,
                },
            created_at,
            updated_at,
        } = self;
        OccasionRow {
            id: id.to_string(),
            user_id: user_id.to_string(),
            contact_id: contact_id.as_ref().map(ToString::to_string),
            kind: *kind,
            title: title.clone(),
            date: *date,
            recurrence: *recurrence,
            reminder_enabled: *enabled,
            reminder_days_before: *days_before,
            created_at: timestamp_to_remote(created_at),
            updated_at: timestamp_to_remote(updated_at),
        }
    }

    fn from_remote(row: OccasionRow) -> Self {
        let OccasionRow {
            id,
            user_id: _,
            contact_id,
            kind,
            title,
            date,
            recurrence,
            reminder_enabled,
            reminder_days_before,
            created_at,
            updated_at,
        } = row;
        Self {
            id: EntityId::from(id),
            contact_id: contact_id.map(EntityId::from),
            kind,
            title,
            date,
            recurrence,
            reminder: ReminderConfig {
                enabled: reminder_enabled,
                days_before: reminder_days_before,
            },
            created_at: timestamp_from_remote(created_at),
            updated_at: timestamp_from_remote(updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn occasion_row_uses_backend_column_names() {
        let mut occasion = Occasion::new(
            OccasionKind::Anniversary,
            "Wedding",
            NaiveDate::from_ymd_opt(2015, 6, 20).unwrap(),
        );
        occasion.contact_id = Some(EntityId::from("contact-1"));

        let row = serde_json::to_value(occasion.to_remote("user-1")).unwrap();
        assert_eq!(row["type"], "anniversary");
        assert_eq!(row["user_id"], "user-1");
        assert_eq!(row["contact_id"], "contact-1");
        assert_eq!(row["reminder_days_before"], 1);
        assert_eq!(row["date"], "2015-06-20");
    }

    #[test]
    fn sync_fields_survive_translation() {
        let mut event = Event::new("Standup", Utc::now());
        event.updated_at = "2024-03-01T09:30:00.123Z".to_string();

        let restored = Event::from_remote(event.to_remote("user-1"));
        assert_eq!(restored, event);

        let contact = Contact::new("Grace Hopper");
        assert_eq!(Contact::from_remote(contact.to_remote("user-1")), contact);
    }

    #[test]
    fn null_timestamps_decode_as_empty() {
        let row: ContactRow = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "user_id": "user-1",
            "name": "Imported",
            "email": null,
            "phone": null,
            "notes": null,
            "created_at": null,
            "updated_at": null
        }))
        .unwrap();

        let contact = Contact::from_remote(row);
        assert_eq!(contact.id.as_str(), "c1");
        assert_eq!(contact.updated_at, "");
    }
}
