// File: ./src/cli.rs
//! Command-line parsing and help text.
use crate::model::{Task, TaskDraft, parse_date, parse_time};
use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Timelike};
use std::path::PathBuf;

/// Field changes requested by `edit`. `None` leaves a field as it is; an empty
/// `--date ""` / `--time ""` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub due_date: Option<Option<NaiveDate>>,
    pub due_time: Option<Option<NaiveTime>>,
    pub reminder: Option<bool>,
}

impl TaskEdit {
    pub fn apply(&self, draft: &mut TaskDraft) {
        if let Some(title) = &self.title {
            draft.title = title.clone();
        }
        if let Some(date) = self.due_date {
            draft.due_date = date;
        }
        if let Some(time) = self.due_time {
            draft.due_time = time;
        }
        if let Some(reminder) = self.reminder {
            draft.reminder = reminder;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Add(TaskDraft),
    Edit { id: String, edit: TaskEdit },
    List,
    Done(String),
    Delete(String),
    Notifications(bool),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub root: Option<PathBuf>,
    pub command: Command,
}

fn parse_switch(value: &str) -> Result<bool> {
    match value {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => bail!("Expected 'on' or 'off', got '{}'", other),
    }
}

fn optional_date(value: &str) -> Result<Option<NaiveDate>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        parse_date(value).map(Some)
    }
}

fn optional_time(value: &str) -> Result<Option<NaiveTime>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        parse_time(value).map(Some)
    }
}

/// Walks the arguments after the subcommand, handing each `--flag value` pair
/// to `on_flag` and collecting positionals.
fn split_flags<'a>(
    args: &'a [String],
    mut on_flag: impl FnMut(&str, Option<&'a str>) -> Result<bool>,
) -> Result<Vec<&'a str>> {
    let mut positionals = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg.starts_with("--") {
            let value = args.get(i + 1).map(String::as_str);
            if on_flag(arg, value)? {
                i += 1; // Also consumed the value
            }
        } else {
            positionals.push(arg);
        }
        i += 1;
    }
    Ok(positionals)
}

fn require<'a>(flag: &str, value: Option<&'a str>) -> Result<&'a str> {
    value.ok_or_else(|| anyhow!("{} needs a value", flag))
}

/// Due date and time a new task gets when `add` is not told otherwise: one
/// hour from `now`, to the minute.
pub fn default_due(now: DateTime<Local>) -> (NaiveDate, NaiveTime) {
    let later = now + Duration::hours(1);
    let time = later.time();
    let time = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);
    (later.date_naive(), time)
}

fn parse_add(args: &[String], now: DateTime<Local>) -> Result<Command> {
    let mut draft = TaskDraft {
        reminder: true,
        ..TaskDraft::default()
    };
    let mut date = None;
    let mut time = None;
    let positionals = split_flags(args, |flag, value| match flag {
        "--date" => {
            date = Some(optional_date(require(flag, value)?)?);
            Ok(true)
        }
        "--time" => {
            time = Some(optional_time(require(flag, value)?)?);
            Ok(true)
        }
        "--no-reminder" => {
            draft.reminder = false;
            Ok(false)
        }
        other => bail!("Unknown option for add: {}", other),
    })?;

    if positionals.is_empty() {
        bail!("add needs a title");
    }
    // An explicit empty value leaves the field unset.
    let (default_date, default_time) = default_due(now);
    draft.due_date = date.unwrap_or(Some(default_date));
    draft.due_time = time.unwrap_or(Some(default_time));
    draft.title = positionals.join(" ");
    Ok(Command::Add(draft))
}

fn parse_edit(args: &[String]) -> Result<Command> {
    let mut edit = TaskEdit::default();
    let positionals = split_flags(args, |flag, value| {
        match flag {
            "--title" => edit.title = Some(require(flag, value)?.to_string()),
            "--date" => edit.due_date = Some(optional_date(require(flag, value)?)?),
            "--time" => edit.due_time = Some(optional_time(require(flag, value)?)?),
            "--reminder" => edit.reminder = Some(parse_switch(require(flag, value)?)?),
            other => bail!("Unknown option for edit: {}", other),
        }
        Ok(true)
    })?;

    match positionals.as_slice() {
        [id] => Ok(Command::Edit {
            id: id.to_string(),
            edit,
        }),
        _ => bail!("edit needs exactly one task id"),
    }
}

fn single_id(name: &str, args: &[String]) -> Result<String> {
    match args {
        [id] => Ok(id.clone()),
        _ => bail!("{} needs exactly one task id", name),
    }
}

/// Parses `argv` (including the binary name at index 0).
pub fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut root = None;
    let mut rest: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--root" | "-r" if rest.is_empty() => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow!("--root needs a path"))?;
                root = Some(PathBuf::from(value));
                i += 1;
            }
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    let command = match rest.first().map(String::as_str) {
        None | Some("--help") | Some("-h") | Some("help") => Command::Help,
        Some("run") => Command::Run,
        Some("add") => parse_add(&rest[1..], Local::now())?,
        Some("edit") => parse_edit(&rest[1..])?,
        Some("list") | Some("ls") => Command::List,
        Some("done") => Command::Done(single_id("done", &rest[1..])?),
        Some("delete") | Some("rm") => Command::Delete(single_id("delete", &rest[1..])?),
        Some("notifications") => match &rest[1..] {
            [value] => Command::Notifications(parse_switch(value)?),
            _ => bail!("notifications needs 'on' or 'off'"),
        },
        Some(other) => bail!("Unknown command '{}'. Try --help.", other),
    };

    Ok(Invocation { root, command })
}

pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// One row of `list` output.
pub fn format_task_line(task: &Task, now: DateTime<Local>) -> String {
    let mut line = format!("  {} {}  {}", task.checkbox_symbol(), short_id(&task.id), task.title);
    let due = task.format_due();
    if !due.is_empty() {
        line.push_str(&format!("  [{}]", due));
    }
    if task.is_past_due(now) {
        line.push_str(" (overdue)");
    }
    if task.shows_reminder() && task.due_instant().is_some() {
        line.push_str(" (reminder)");
    }
    line
}

pub fn print_help(binary_name: &str) {
    println!(
        "DailyList v{} - A to-do list with timed reminders",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("USAGE:");
    println!("    {} [--root <path>] <command>", binary_name);
    println!();
    println!("COMMANDS:");
    println!("    run                                   Run the reminder daemon");
    println!("    add <title> [--date D] [--time T]     Add a task, due in an hour with a reminder");
    println!("        [--no-reminder]");
    println!("    edit <id> [--title T] [--date D]      Edit a task; an empty value clears it");
    println!("        [--time T] [--reminder on|off]");
    println!("    list                                  Show pending and completed tasks");
    println!("    done <id>                             Toggle completion");
    println!("    delete <id>                           Delete a task");
    println!("    notifications on|off                  Enable or disable all reminders");
    println!();
    println!("OPTIONS:");
    println!("    -r, --root <path>     Use a different directory for config and data.");
    println!("    -h, --help            Show this help message.");
    println!();
    println!("FORMATS:");
    println!("    Dates are YYYY-MM-DD, times are HH:MM (24h, local time).");
    println!("    Task ids may be shortened to any unique prefix.");
    println!();
    println!("EXAMPLES:");
    println!("    {} add Call the dentist --date 2025-03-14 --time 09:30", binary_name);
    println!("    {} edit 3f2a --time 10:00", binary_name);
    println!("    {} notifications off", binary_name);
}
