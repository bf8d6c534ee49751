use almanac_core::models::{OccasionKind, Recurrence, ReminderConfig};
use almanac_core::Occasion;
use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::cli::{OccasionCommands, OccasionKindArg};
use crate::commands::common::{
    finish_mutation, parse_date, print_json, required_text, resolve_entity,
};
use crate::context::CliContext;
use crate::error::CliError;

impl From<OccasionKindArg> for OccasionKind {
    fn from(kind: OccasionKindArg) -> Self {
        match kind {
            OccasionKindArg::Birthday => Self::Birthday,
            OccasionKindArg::Anniversary => Self::Anniversary,
            OccasionKindArg::Other => Self::Other,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UpcomingItem {
    pub id: String,
    pub title: String,
    pub on: NaiveDate,
    pub in_days: i64,
    pub years: Option<i32>,
    pub remind_on: Option<NaiveDate>,
}

pub async fn run_occasion(
    command: OccasionCommands,
    context: &CliContext,
) -> Result<(), CliError> {
    let almanac = context.open().await?;
    match command {
        OccasionCommands::Add {
            title,
            date,
            kind,
            contact,
            once,
            remind_days,
            no_reminder,
        } => {
            let mut occasion = Occasion::new(
                kind.into(),
                required_text("Title", &title)?,
                parse_date(&date)?,
            );
            if let Some(query) = contact {
                occasion.contact_id = Some(resolve_entity(almanac.contacts(), &query)?.id);
            }
            if once {
                occasion.recurrence = Recurrence::None;
            }
            occasion.reminder = ReminderConfig {
                enabled: !no_reminder,
                days_before: remind_days,
            };

            let occasion = almanac.occasions().add(occasion).await?;
            println!("{}", occasion.id);
            finish_mutation(&almanac).await;
        }
        OccasionCommands::List { json } => {
            let mut occasions = almanac.occasions().items();
            occasions.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.title.cmp(&b.title)));
            if json {
                print_json(&occasions)?;
            } else if occasions.is_empty() {
                println!("No occasions.");
            } else {
                for occasion in &occasions {
                    println!(
                        "{}  {}  {:?}  {}",
                        occasion.id, occasion.date, occasion.kind, occasion.title
                    );
                }
            }
            almanac.teardown();
        }
        OccasionCommands::Upcoming { days, json } => {
            let today = Local::now().date_naive();
            let upcoming = upcoming_occasions(&almanac.occasions().items(), today, days);
            if json {
                print_json(&upcoming)?;
            } else if upcoming.is_empty() {
                println!("Nothing in the next {days} days.");
            } else {
                for item in &upcoming {
                    println!("{}", format_upcoming_line(item));
                }
            }
            almanac.teardown();
        }
        OccasionCommands::Delete { id } => {
            let occasion = resolve_entity(almanac.occasions(), &id)?;
            almanac.occasions().remove(&occasion.id).await?;
            println!("{}", occasion.id);
            finish_mutation(&almanac).await;
        }
    }
    Ok(())
}

/// Next occurrences within `days` of `today`, soonest first
pub fn upcoming_occasions(occasions: &[Occasion], today: NaiveDate, days: u32) -> Vec<UpcomingItem> {
    let mut upcoming = occasions
        .iter()
        .filter_map(|occasion| {
            let on = occasion.next_occurrence(today)?;
            let in_days = (on - today).num_days();
            (in_days <= i64::from(days)).then(|| UpcomingItem {
                id: occasion.id.to_string(),
                title: occasion.title.clone(),
                on,
                in_days,
                years: occasion.years_at_next(today).filter(|years| *years > 0),
                remind_on: occasion.reminder_date(today),
            })
        })
        .collect::<Vec<_>>();
    upcoming.sort_by(|a, b| a.on.cmp(&b.on).then_with(|| a.title.cmp(&b.title)));
    upcoming
}

fn format_upcoming_line(item: &UpcomingItem) -> String {
    let when = match item.in_days {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {n} days"),
    };
    match item.years {
        Some(years) => format!("{}  {} ({when})  {} - {years} years", item.on, item.id, item.title),
        None => format!("{}  {} ({when})  {}", item.on, item.id, item.title),
    }
}
