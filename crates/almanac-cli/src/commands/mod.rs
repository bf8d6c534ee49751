pub mod auth_cmd;
pub mod common;
pub mod config;
pub mod contact;
pub mod event;
pub mod occasion;
pub mod sync;
