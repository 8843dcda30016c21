// File: tests/reminder_scenarios.rs
mod common;

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use common::{FakeBackend, Harness, RecordingDispatch, minutes, start, task_at};
use dailylist::agent::AgentMessage;
use dailylist::alert::AlertPlayer;
use dailylist::controller::reschedule_all;
use dailylist::model::{Settings, Task};
use dailylist::scheduler::{ReminderScheduler, ReminderStyle};
use dailylist::store::TaskStore;
use dailylist::timer::{ManualClock, TimerCallback, TimerHandle, TimerHost};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

fn snapshot(tasks: Vec<Task>, enabled: bool) -> TaskStore {
    TaskStore {
        tasks,
        settings: Settings {
            notifications_enabled: enabled,
        },
    }
}

#[test]
fn test_pay_bills_tomorrow_morning_is_pending() {
    let h = Harness::new();
    let tomorrow = start().date_naive().succ_opt().unwrap();
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let mut task = Task::new("Pay bills", Some(tomorrow), Some(nine), true);
    task.id = "t1".to_string();

    assert!(h.scheduler.schedule_notification(&task));

    let expected = Local
        .from_local_datetime(&tomorrow.and_time(nine))
        .earliest()
        .unwrap();
    assert_eq!(h.scheduler.pending_fire_time("t1"), Some(expected));
    assert_eq!(h.scheduler.pending_count(), 1);
    assert_eq!(h.clock.armed_count(), 1);
}

#[test]
fn test_disabling_notifications_clears_everything() {
    let h = Harness::new();
    let tasks = vec![
        task_at("a", "Soon", start() + minutes(1)),
        task_at("b", "Later", start() + minutes(60)),
    ];
    assert_eq!(reschedule_all(&h.scheduler, &snapshot(tasks.clone(), true)), 2);

    // "a" fires and starts sounding.
    h.clock.advance(Duration::from_secs(90));
    assert!(h.scheduler.is_alerting("a"));
    assert_eq!(h.scheduler.pending_count(), 1);

    // Same task data, notifications switched off.
    assert_eq!(reschedule_all(&h.scheduler, &snapshot(tasks, false)), 0);
    assert_eq!(h.scheduler.pending_count(), 0);
    assert_eq!(h.scheduler.active_alert_count(), 0);
    assert_eq!(h.clock.armed_count(), 0);
    assert_eq!(h.backend.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fire_then_complete_stops_alert() {
    let h = Harness::new();
    let due = start() + minutes(5);
    assert!(h.scheduler.schedule_notification(&task_at("t1", "Pay bills", due)));

    h.clock.advance_to(due);

    assert_eq!(
        h.dispatch.messages(),
        vec![AgentMessage::show(
            "DailyList Pro Reminder",
            "Pay bills",
            "logo.svg",
            "t1"
        )]
    );
    assert!(h.scheduler.is_alerting("t1"));
    assert!(!h.scheduler.has_pending("t1"));

    // User marks t1 completed.
    h.scheduler.cancel_notification("t1");
    assert!(!h.scheduler.is_alerting("t1"));
    assert_eq!(h.backend.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rapid_edits_leave_one_timer() {
    let h = Harness::new();
    let day = start().date_naive().succ_opt().unwrap();
    let mut task = Task::new("Standup", Some(day), None, true);
    task.id = "edit-me".to_string();

    for hour in [10, 11, 12] {
        task.due_time = NaiveTime::from_hms_opt(hour, 0, 0);
        assert!(h.scheduler.schedule_notification(&task));
    }

    assert_eq!(h.scheduler.pending_count(), 1);
    assert_eq!(h.clock.armed_count(), 1);
    let noon = Local
        .from_local_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
        .earliest()
        .unwrap();
    assert_eq!(h.scheduler.pending_fire_time("edit-me"), Some(noon));

    h.clock.advance_to(noon + minutes(1));
    assert_eq!(h.dispatch.tags(), vec!["edit-me".to_string()]);
}

#[test]
fn test_due_now_or_past_never_arms() {
    let h = Harness::new();
    assert!(!h.scheduler.schedule_notification(&task_at("now", "Now", start())));
    assert!(!h.scheduler.schedule_notification(&task_at("past", "Past", start() - minutes(1))));
    assert_eq!(h.scheduler.pending_count(), 0);
    assert_eq!(h.clock.armed_count(), 0);
}

#[test]
fn test_no_op_schedule_keeps_existing_timer() {
    let h = Harness::new();
    let due = start() + minutes(30);
    let mut task = task_at("keep", "Keep me", due);
    assert!(h.scheduler.schedule_notification(&task));

    task.reminder = false;
    assert!(!h.scheduler.schedule_notification(&task));
    task.reminder = true;
    task.due_time = None;
    assert!(!h.scheduler.schedule_notification(&task));

    assert_eq!(h.scheduler.pending_fire_time("keep"), Some(due));
}

#[test]
fn test_cancel_is_idempotent() {
    let h = Harness::new();
    assert!(h.scheduler.schedule_notification(&task_at("x", "X", start() + minutes(3))));

    h.scheduler.cancel_notification("x");
    let after_once = (h.scheduler.pending(), h.scheduler.active_alert_count());
    h.scheduler.cancel_notification("x");
    assert_eq!((h.scheduler.pending(), h.scheduler.active_alert_count()), after_once);
    assert!(!h.scheduler.has_pending("x"));

    // Never scheduled at all.
    h.scheduler.cancel_notification("ghost");
    assert_eq!(h.clock.armed_count(), 0);
}

#[test]
fn test_cancelled_timer_never_fires() {
    let h = Harness::new();
    assert!(h.scheduler.schedule_notification(&task_at("gone", "Gone", start() + minutes(2))));
    h.scheduler.cancel_notification("gone");

    h.clock.advance(Duration::from_secs(600));
    assert!(h.dispatch.messages().is_empty());
    assert_eq!(h.backend.plays.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reschedule_arms_exactly_the_eligible_tasks() {
    let h = Harness::new();
    // Left over from an older snapshot.
    assert!(h.scheduler.schedule_notification(&task_at("stale", "Stale", start() + minutes(9))));

    let mut done = task_at("done", "Done", start() + minutes(10));
    done.completed = true;
    let mut quiet = task_at("quiet", "Quiet", start() + minutes(10));
    quiet.reminder = false;
    let mut undated = task_at("undated", "Undated", start() + minutes(10));
    undated.due_date = None;
    let tasks = vec![
        task_at("first", "First", start() + minutes(20)),
        done,
        quiet,
        undated,
        task_at("past", "Past", start() - minutes(20)),
        task_at("second", "Second", start() + minutes(40)),
    ];

    assert_eq!(reschedule_all(&h.scheduler, &snapshot(tasks, true)), 2);
    let ids: Vec<String> = h.scheduler.pending().into_iter().map(|p| p.task_id).collect();
    assert_eq!(ids, vec!["first".to_string(), "second".to_string()]);
    assert_eq!(h.clock.armed_count(), 2);
}

#[test]
fn test_due_moved_into_past_drops_timer() {
    let h = Harness::new();
    let mut task = task_at("moved", "Moved", start() + minutes(10));
    reschedule_all(&h.scheduler, &snapshot(vec![task.clone()], true));
    assert!(h.scheduler.has_pending("moved"));

    let past = start() - minutes(5);
    task.due_date = Some(past.date_naive());
    task.due_time = Some(past.time());
    reschedule_all(&h.scheduler, &snapshot(vec![task], true));

    assert!(!h.scheduler.has_pending("moved"));
    h.clock.advance(Duration::from_secs(3600));
    assert!(h.dispatch.messages().is_empty());
}

#[test]
fn test_fire_vibrates_when_supported() {
    let h = Harness::with_backend(FakeBackend::with_vibration());
    assert!(h.scheduler.schedule_notification(&task_at("buzz", "Buzz", start() + minutes(1))));
    h.clock.advance(Duration::from_secs(60));

    assert_eq!(*h.backend.vibrations.lock().unwrap(), vec![vec![200, 100, 200]]);
    assert!(h.scheduler.is_alerting("buzz"));
}

#[test]
fn test_playback_failure_still_notifies() {
    let h = Harness::new();
    h.backend.fail.store(true, Ordering::SeqCst);
    assert!(h.scheduler.schedule_notification(&task_at("mute", "Mute", start() + minutes(1))));

    h.clock.advance(Duration::from_secs(60));

    assert_eq!(h.dispatch.tags(), vec!["mute".to_string()]);
    assert!(!h.scheduler.is_alerting("mute"));
    assert!(!h.scheduler.has_pending("mute"));
}

#[test]
fn test_natural_end_clears_alert() {
    let h = Harness::new();
    assert!(h.scheduler.schedule_notification(&task_at("song", "Song", start() + minutes(1))));
    h.clock.advance(Duration::from_secs(60));
    assert!(h.scheduler.is_alerting("song"));

    h.backend.finish_all();
    assert!(!h.scheduler.is_alerting("song"));

    h.scheduler.cancel_notification("song");
    assert_eq!(h.backend.stops.load(Ordering::SeqCst), 0);
}

#[test]
fn test_rescheduling_a_sounding_task_silences_it() {
    let h = Harness::new();
    let mut task = task_at("again", "Again", start() + minutes(1));
    assert!(h.scheduler.schedule_notification(&task));
    h.clock.advance(Duration::from_secs(60));
    assert!(h.scheduler.is_alerting("again"));

    let later = start() + minutes(30);
    task.due_date = Some(later.date_naive());
    task.due_time = Some(later.time());
    assert!(h.scheduler.schedule_notification(&task));

    assert!(!h.scheduler.is_alerting("again"));
    assert!(h.scheduler.has_pending("again"));
    assert!(h.player.active_ids().is_empty());
}

#[test]
fn test_independent_tasks_fire_in_due_order() {
    let h = Harness::new();
    let tasks = vec![
        task_at("late", "Late", start() + minutes(30)),
        task_at("early", "Early", start() + minutes(10)),
    ];
    reschedule_all(&h.scheduler, &snapshot(tasks, true));

    h.clock.advance(Duration::from_secs(45 * 60));
    assert_eq!(
        h.dispatch.tags(),
        vec!["early".to_string(), "late".to_string()]
    );
    assert_eq!(h.player.active_ids(), vec!["early".to_string(), "late".to_string()]);
    assert_eq!(h.scheduler.pending_count(), 0);
}

/// Runs every callback on its own thread as soon as it is armed, and only
/// returns from `arm` once that thread is under way.
struct EagerTimers {
    handles: ManualClock,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl EagerTimers {
    fn new() -> Self {
        Self {
            handles: ManualClock::new(start()),
            threads: Mutex::new(Vec::new()),
        }
    }

    fn join_all(&self) {
        let threads: Vec<JoinHandle<()>> = self.threads.lock().unwrap().drain(..).collect();
        for t in threads {
            t.join().unwrap();
        }
    }
}

impl TimerHost for EagerTimers {
    fn now(&self) -> DateTime<Local> {
        start()
    }

    fn arm(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let (started_tx, started_rx) = mpsc::channel();
        let thread = std::thread::spawn(move || {
            started_tx.send(()).unwrap();
            callback();
        });
        started_rx.recv().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        self.threads.lock().unwrap().push(thread);
        self.handles.arm(delay, Box::new(|| {}))
    }

    fn cancel(&self, handle: TimerHandle) {
        self.handles.cancel(handle);
    }
}

#[test]
fn test_callback_racing_arm_still_fires() {
    let timers = Arc::new(EagerTimers::new());
    let dispatch = Arc::new(RecordingDispatch::default());
    let player = AlertPlayer::new(Arc::new(FakeBackend::default()));
    let scheduler = ReminderScheduler::new(
        timers.clone(),
        dispatch.clone(),
        player.clone(),
        ReminderStyle::default(),
    );

    let task = task_at("quick", "Quick", start() + minutes(1));
    assert!(scheduler.schedule_notification(&task));
    timers.join_all();

    assert_eq!(dispatch.tags(), vec!["quick".to_string()]);
    assert!(scheduler.is_alerting("quick"));
    assert!(!scheduler.has_pending("quick"));
}
