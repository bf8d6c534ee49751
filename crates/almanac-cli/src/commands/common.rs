use std::fmt;

use almanac_core::util::normalize_text_option;
use almanac_core::{Almanac, Entity, EntityService};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};

use crate::error::CliError;

/// Find an entity by full id or unique id prefix
pub fn resolve_entity<T: Entity + fmt::Debug>(
    service: &EntityService<T>,
    query: &str,
) -> Result<T, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::InvalidInput("ID cannot be empty".to_string()));
    }

    let items = service.items();
    if let Some(exact) = items.iter().find(|item| item.id().as_str() == query) {
        return Ok(exact.clone());
    }

    let mut matches = items
        .into_iter()
        .filter(|item| item.id().as_str().starts_with(query));
    match (matches.next(), matches.next()) {
        (None, _) => Err(CliError::NotFound {
            kind: T::KIND,
            query: query.to_string(),
        }),
        (Some(found), None) => Ok(found),
        (Some(first), Some(second)) => Err(CliError::AmbiguousId(format!(
            "ID prefix '{query}' matches several {} entries ({}, {}, ...). Use more characters.",
            T::KIND,
            first.id(),
            second.id()
        ))),
    }
}

/// Parse an instant given as RFC 3339, `YYYY-MM-DD HH:MM` in local time, or a bare date
pub fn parse_when(value: &str) -> Result<DateTime<Utc>, CliError> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    let local = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| CliError::InvalidInput(format!("Unrecognized date/time: '{value}'")))?;

    local
        .and_local_timezone(Local)
        .earliest()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| CliError::InvalidInput(format!("'{value}' does not exist in local time")))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidInput(format!("Expected YYYY-MM-DD, got '{value}'")))
}

pub fn required_text(field: &str, value: &str) -> Result<String, CliError> {
    normalize_text_option(Some(value.to_string()))
        .ok_or_else(|| CliError::InvalidInput(format!("{field} cannot be empty")))
}

/// Empty strings clear an optional field
pub fn optional_text(value: Option<String>) -> Option<String> {
    normalize_text_option(value)
}

/// Push the queue right away when the session allows it, then stop scheduling
pub async fn finish_mutation(almanac: &Almanac) {
    if almanac.session().can_sync() {
        let report = almanac.flush_pending().await;
        if report.remaining > 0 {
            eprintln!(
                "Saved locally; {} change(s) will be sent on the next sync",
                report.remaining
            );
        }
    } else {
        let pending = almanac.pending_operations().await.len();
        tracing::info!("Saved locally; {} change(s) pending", pending);
    }
    almanac.teardown();
}

pub fn short_time(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
