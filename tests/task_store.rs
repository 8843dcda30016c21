// File: tests/task_store.rs
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use dailylist::model::{Settings, Task};
use dailylist::store::TaskStore;

fn task(id: &str, title: &str) -> Task {
    let mut t = Task::new(
        title,
        NaiveDate::from_ymd_opt(2030, 3, 10),
        NaiveTime::from_hms_opt(8, 0, 0),
        true,
    );
    t.id = id.to_string();
    t
}

fn make_store() -> TaskStore {
    let mut store = TaskStore::new();
    store.add_task(task("1", "Alpha"));
    store.add_task(task("2", "Beta"));
    store.add_task(task("3", "Gamma"));
    store
}

#[test]
fn test_order_is_insertion_order() {
    let store = make_store();
    let titles: Vec<&str> = store.tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Alpha", "Beta", "Gamma"]);
}

#[test]
fn test_toggle_splits_views() {
    let mut store = make_store();
    let toggled = store.toggle_task("2").unwrap();
    assert!(toggled.completed);

    let pending: Vec<&str> = store.incomplete().into_iter().map(|t| t.id.as_str()).collect();
    let done: Vec<&str> = store.completed().into_iter().map(|t| t.id.as_str()).collect();
    assert_eq!(pending, vec!["1", "3"]);
    assert_eq!(done, vec!["2"]);

    assert!(!store.toggle_task("2").unwrap().completed);
    assert!(store.toggle_task("nope").is_none());
}

#[test]
fn test_update_or_add() {
    let mut store = make_store();
    let mut edited = task("2", "Beta v2");
    edited.reminder = false;
    store.update_or_add_task(edited);
    store.update_or_add_task(task("4", "Delta"));

    assert_eq!(store.tasks.len(), 4);
    assert_eq!(store.get_task("2").unwrap().title, "Beta v2");
    assert_eq!(store.tasks[1].id, "2");
    assert_eq!(store.tasks[3].id, "4");
}

#[test]
fn test_delete_returns_removed_task() {
    let mut store = make_store();
    assert_eq!(store.delete_task("1").unwrap().title, "Alpha");
    assert!(store.delete_task("1").is_none());
    assert!(store.get_task("1").is_none());
    assert_eq!(store.tasks.len(), 2);
}

#[test]
fn test_reminder_eligible_respects_switch_and_clock() {
    let mut store = make_store();
    store.get_task_mut("3").unwrap().completed = true;
    let before = Local.with_ymd_and_hms(2030, 3, 9, 12, 0, 0).unwrap();
    let after = Local.with_ymd_and_hms(2030, 3, 11, 12, 0, 0).unwrap();

    let ids: Vec<&str> = store
        .reminder_eligible(before)
        .into_iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert!(store.reminder_eligible(after).is_empty());

    store.settings = Settings {
        notifications_enabled: false,
    };
    assert!(store.reminder_eligible(before).is_empty());
}

#[test]
fn test_replace_swaps_snapshot() {
    let mut store = make_store();
    store.replace(
        vec![task("9", "Only")],
        Settings {
            notifications_enabled: false,
        },
    );
    assert_eq!(store.tasks.len(), 1);
    assert!(!store.settings.notifications_enabled);
}
