// Task and settings records, as persisted and as handed to the scheduler.
use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

fn default_true() -> bool {
    true
}

fn default_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Parses a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|e| anyhow!("Invalid date '{}' (expected YYYY-MM-DD): {}", input, e))
}

/// Parses a local time of day. Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(input: &str) -> Result<NaiveTime> {
    let trimmed = input.trim();
    NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|e| anyhow!("Invalid time '{}' (expected HH:MM): {}", input, e))
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default = "default_uid")]
    pub id: String,
    pub title: String,
    #[serde(default, with = "opt_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, with = "opt_time")]
    pub due_time: Option<NaiveTime>,
    #[serde(default)]
    pub reminder: bool,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn new(
        title: &str,
        due_date: Option<NaiveDate>,
        due_time: Option<NaiveTime>,
        reminder: bool,
    ) -> Self {
        Self {
            id: default_uid(),
            title: title.trim().to_string(),
            due_date,
            due_time,
            reminder,
            completed: false,
        }
    }

    /// The absolute local instant described by due date + due time.
    ///
    /// Returns `None` when either half is missing, or when the wall-clock time
    /// does not exist locally (skipped by a DST transition). An ambiguous time
    /// resolves to its earliest occurrence.
    pub fn due_instant(&self) -> Option<DateTime<Local>> {
        let naive = self.due_date?.and_time(self.due_time?);
        naive.and_local_timezone(Local).earliest()
    }

    /// `reminder && !completed && due > now`. A due instant equal to `now`
    /// counts as past.
    pub fn is_reminder_eligible(&self, now: DateTime<Local>) -> bool {
        if !self.reminder || self.completed {
            return false;
        }
        self.due_instant().is_some_and(|due| due > now)
    }

    /// Open task whose due instant has passed.
    pub fn is_past_due(&self, now: DateTime<Local>) -> bool {
        !self.completed && self.due_instant().is_some_and(|due| due < now)
    }

    /// Whether listings should show the reminder marker.
    pub fn shows_reminder(&self) -> bool {
        self.reminder && !self.completed
    }

    pub fn checkbox_symbol(&self) -> &'static str {
        if self.completed { "[✔]" } else { "[ ]" }
    }

    pub fn format_due(&self) -> String {
        match (self.due_date, self.due_time) {
            (Some(d), Some(t)) => format!(
                "{} {}",
                d.format(DATE_FORMAT),
                t.format(TIME_FORMAT)
            ),
            (Some(d), None) => d.format(DATE_FORMAT).to_string(),
            (None, Some(t)) => t.format(TIME_FORMAT).to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
        }
    }
}

/// User input for creating a task (no `id`) or editing one (`id` set).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub id: Option<String>,
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub reminder: bool,
}

impl TaskDraft {
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            title: task.title.clone(),
            due_date: task.due_date,
            due_time: task.due_time,
            reminder: task.reminder,
        }
    }

    /// Overwrites the editable fields of `task`. Identity and completion stay.
    pub fn apply_to(&self, task: &mut Task) {
        task.title = self.title.trim().to_string();
        task.due_date = self.due_date;
        task.due_time = self.due_time;
        task.reminder = self.reminder;
    }

    pub fn into_task(self) -> Task {
        Task::new(&self.title, self.due_date, self.due_time, self.reminder)
    }
}

// Dates and times are stored as plain strings; "" means unset. Values that do
// not parse are treated as unset so one bad record cannot block loading.
mod opt_date {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&d.format(DATE_FORMAT).to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(match raw.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => match super::parse_date(s) {
                Ok(date) => Some(date),
                Err(e) => {
                    log::warn!("Ignoring stored due date: {}", e);
                    None
                }
            },
        })
    }
}

mod opt_time {
    use super::TIME_FORMAT;
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.format(TIME_FORMAT).to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(match raw.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => match super::parse_time(s) {
                Ok(time) => Some(time),
                Err(e) => {
                    log::warn!("Ignoring stored due time: {}", e);
                    None
                }
            },
        })
    }
}
