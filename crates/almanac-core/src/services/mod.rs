//! Entity services and the application context

mod almanac;
mod entity;

pub use almanac::Almanac;
pub use entity::{EntityService, MutationFailure, MutationResult};
