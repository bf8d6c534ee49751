use almanac_core::Event;
use chrono::{DateTime, Utc};

use crate::cli::EventCommands;
use crate::commands::common::{
    finish_mutation, optional_text, parse_when, print_json, required_text, resolve_entity,
    short_time,
};
use crate::context::CliContext;
use crate::error::CliError;

pub async fn run_event(command: EventCommands, context: &CliContext) -> Result<(), CliError> {
    let almanac = context.open().await?;
    match command {
        EventCommands::Add {
            title,
            start,
            end,
            all_day,
            description,
            color,
        } => {
            let mut event = Event::new(required_text("Title", &title)?, parse_when(&start)?);
            event.ends_at = end.as_deref().map(parse_when).transpose()?;
            validate_range(&event)?;
            event.all_day = all_day;
            event.description = optional_text(description);
            event.color = optional_text(color);

            let event = almanac.events().add(event).await?;
            println!("{}", event.id);
            finish_mutation(&almanac).await;
        }
        EventCommands::List { all, json } => {
            let events = sorted_events(almanac.events().items(), all);
            if json {
                print_json(&events)?;
            } else if events.is_empty() {
                println!("No events.");
            } else {
                for line in format_event_lines(&events) {
                    println!("{line}");
                }
            }
            almanac.teardown();
        }
        EventCommands::Edit {
            id,
            title,
            start,
            end,
            description,
        } => {
            let existing = resolve_entity(almanac.events(), &id)?;
            let title = title.as_deref().map(|t| required_text("Title", t)).transpose()?;
            let starts_at = start.as_deref().map(parse_when).transpose()?;
            let ends_at = end.as_deref().map(parse_when).transpose()?;

            let mut preview = existing.clone();
            apply_event_edit(&mut preview, title.clone(), starts_at, ends_at, description.clone());
            validate_range(&preview)?;

            let updated = almanac
                .events()
                .update(&existing.id, |event| {
                    apply_event_edit(event, title, starts_at, ends_at, description);
                })
                .await?;
            println!("{}", updated.id);
            finish_mutation(&almanac).await;
        }
        EventCommands::Delete { id } => {
            let event = resolve_entity(almanac.events(), &id)?;
            almanac.events().remove(&event.id).await?;
            println!("{}", event.id);
            finish_mutation(&almanac).await;
        }
    }
    Ok(())
}

fn apply_event_edit(
    event: &mut Event,
    title: Option<String>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    description: Option<String>,
) {
    if let Some(title) = title {
        event.title = title;
    }
    if let Some(starts_at) = starts_at {
        event.starts_at = starts_at;
    }
    if ends_at.is_some() {
        event.ends_at = ends_at;
    }
    if let Some(description) = description {
        event.description = optional_text(Some(description));
    }
}

fn validate_range(event: &Event) -> Result<(), CliError> {
    match event.ends_at {
        Some(ends_at) if ends_at < event.starts_at => Err(CliError::InvalidInput(
            "Event cannot end before it starts".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Events by start time; past ones are dropped unless `include_past`
pub fn sorted_events(mut events: Vec<Event>, include_past: bool) -> Vec<Event> {
    let now = Utc::now();
    if !include_past {
        events.retain(|event| event.is_upcoming(now));
    }
    events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.title.cmp(&b.title)));
    events
}

pub fn format_event_lines(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            let when = if event.all_day {
                event.starts_at.format("%Y-%m-%d (all day)").to_string()
            } else {
                short_time(event.starts_at)
            };
            format!("{}  {}  {}", event.id, when, event.title)
        })
        .collect()
}
