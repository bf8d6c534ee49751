//! Data models for Almanac

mod contact;
mod entity;
mod event;
mod occasion;

pub use contact::Contact;
pub use entity::{parse_timestamp, Entity, EntityId, EntityKind};
pub use event::Event;
pub use occasion::{Occasion, OccasionKind, Recurrence, ReminderConfig};
