//! Contact model

use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, EntityKind};
use crate::util::timestamp_now;

/// A person in the address book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Unique identifier
    pub id: EntityId,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Creation timestamp (ISO-8601)
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp (ISO-8601)
    #[serde(default)]
    pub updated_at: String,
}

impl Contact {
    /// Create a new contact with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = timestamp_now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            email: None,
            phone: None,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Get initials for avatar badges, at most two characters
    #[must_use]
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|part| part.chars().next())
            .take(2)
            .flat_map(char::to_uppercase)
            .collect()
    }
}

impl Entity for Contact {
    const KIND: EntityKind = EntityKind::Contacts;

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

    #[test]
    fn test_contact_new() {
        let contact = Contact::new("Ada Lovelace");
        assert_eq!(contact.name, "Ada Lovelace");
        assert!(contact.email.is_none());
        assert_eq!(contact.created_at, contact.updated_at);
    }

    #[test]
    fn test_initials() {
        assert_eq!(Contact::new("ada lovelace").initials(), "AL");
        assert_eq!(Contact::new("Grace Brewster Hopper").initials(), "GB");
        assert_eq!(Contact::new("   ").initials(), "");
    }
}
