//! Occasion model (birthdays, anniversaries, and other recurring dates)

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, EntityKind};
use crate::util::timestamp_now;

/// What an occasion celebrates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OccasionKind {
    #[default]
    Birthday,
    Anniversary,
    Other,
}

/// How an occasion repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    /// Happens once on `date`
    None,
    /// Repeats every year on the month/day of `date`
    #[default]
    Yearly,
}

/// Reminder configuration for an occasion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// How many days before the occurrence to remind
    pub days_before: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            days_before: 1,
        }
    }
}

/// A dated occasion, optionally attached to a contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occasion {
    /// Unique identifier
    pub id: EntityId,
    /// Contact this occasion belongs to; detached (None) when the contact is deleted
    #[serde(default)]
    pub contact_id: Option<EntityId>,
    #[serde(default)]
    pub kind: OccasionKind,
    pub title: String,
    /// Original date (e.g. date of birth)
    pub date: NaiveDate,
    #[serde(default)]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub reminder: ReminderConfig,
    /// Creation timestamp (ISO-8601)
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp (ISO-8601)
    #[serde(default)]
    pub updated_at: String,
}

impl Occasion {
    /// Create a new yearly occasion
    #[must_use]
    pub fn new(kind: OccasionKind, title: impl Into<String>, date: NaiveDate) -> Self {
        let now = timestamp_now();
        Self {
            id: EntityId::new(),
            contact_id: None,
            kind,
            title: title.into(),
            date,
            recurrence: Recurrence::Yearly,
            reminder: ReminderConfig::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Next date on or after `today` this occasion falls on.
    ///
    /// Yearly Feb 29 occasions fall on Feb 28 in non-leap years.
    #[must_use]
    pub fn next_occurrence(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self.recurrence {
            Recurrence::None => (self.date >= today).then_some(self.date),
            Recurrence::Yearly => {
                if self.date >= today {
                    return Some(self.date);
                }
                let this_year = self.on_year(today.year())?;
                if this_year >= today {
                    Some(this_year)
                } else {
                    self.on_year(today.year() + 1)
                }
            }
        }
    }

    /// Date the reminder for the next occurrence should fire, if reminders are enabled
    #[must_use]
    pub fn reminder_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        if !self.reminder.enabled {
            return None;
        }
        let occurrence = self.next_occurrence(today)?;
        Some(occurrence - Duration::days(i64::from(self.reminder.days_before)))
    }

    /// Completed years at the next occurrence (age for birthdays)
    #[must_use]
    pub fn years_at_next(&self, today: NaiveDate) -> Option<i32> {
        let next = self.next_occurrence(today)?;
        Some(next.year() - self.date.year())
    }

    fn on_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.date.month(), self.date.day())
            .or_else(|| NaiveDate::from_ymd_opt(year, self.date.month(), self.date.day() - 1))
    }
}

impl Entity for Occasion {
    const KIND: EntityKind = EntityKind::Occasions;

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

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_next_occurrence_later_this_year() {
        let occasion = Occasion::new(OccasionKind::Birthday, "Ada", date(1990, 12, 10));
        assert_eq!(
            occasion.next_occurrence(date(2024, 6, 1)),
            Some(date(2024, 12, 10))
        );
        assert_eq!(occasion.years_at_next(date(2024, 6, 1)), Some(34));
    }

    #[test]
    fn test_next_occurrence_rolls_to_next_year() {
        let occasion = Occasion::new(OccasionKind::Anniversary, "Wedding", date(2010, 3, 1));
        assert_eq!(
            occasion.next_occurrence(date(2024, 3, 2)),
            Some(date(2025, 3, 1))
        );
    }

    #[test]
    fn test_next_occurrence_today_counts() {
        let occasion = Occasion::new(OccasionKind::Birthday, "Today", date(2000, 6, 1));
        assert_eq!(
            occasion.next_occurrence(date(2024, 6, 1)),
            Some(date(2024, 6, 1))
        );
    }

    #[test]
    fn test_leap_day_falls_back_to_feb_28() {
        let occasion = Occasion::new(OccasionKind::Birthday, "Leapling", date(2000, 2, 29));
        assert_eq!(
            occasion.next_occurrence(date(2023, 1, 1)),
            Some(date(2023, 2, 28))
        );
        assert_eq!(
            occasion.next_occurrence(date(2024, 1, 1)),
            Some(date(2024, 2, 29))
        );
    }

    #[test]
    fn test_one_off_occasion_in_past_has_no_occurrence() {
        let mut occasion = Occasion::new(OccasionKind::Other, "Launch", date(2020, 1, 1));
        occasion.recurrence = Recurrence::None;
        assert_eq!(occasion.next_occurrence(date(2024, 1, 1)), None);
    }

    #[test]
    fn test_reminder_date() {
        let mut occasion = Occasion::new(OccasionKind::Birthday, "Ada", date(1990, 12, 10));
        occasion.reminder.days_before = 3;
        assert_eq!(
            occasion.reminder_date(date(2024, 6, 1)),
            Some(date(2024, 12, 7))
        );

        occasion.reminder.enabled = false;
        assert_eq!(occasion.reminder_date(date(2024, 6, 1)), None);
    }
}
