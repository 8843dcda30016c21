/*! Reminder scheduling.

`ReminderScheduler` owns one pending timer and at most one alert per task id.
The whole public surface is four operations: `schedule_notification`,
`cancel_notification`, `clear_all_notifications`, plus read-only inspection.

Lock order is scheduler state, then alert player. Each armed timer carries a
token; its callback fires only while the pending entry still holds that token,
so a callback that lost a race with `cancel_notification` does nothing.
*/

use crate::agent::{AgentMessage, NotificationDispatch};
use crate::alert::AlertPlayer;
use crate::config::Config;
use crate::model::Task;
use crate::timer::{TimerHandle, TimerHost};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Presentation of a fired reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderStyle {
    pub title: String,
    pub icon: String,
    pub vibration_pattern: Vec<u64>,
}

impl Default for ReminderStyle {
    fn default() -> Self {
        Self {
            title: "DailyList Pro Reminder".to_string(),
            icon: "logo.svg".to_string(),
            vibration_pattern: vec![200, 100, 200],
        }
    }
}

impl From<&Config> for ReminderStyle {
    fn from(config: &Config) -> Self {
        Self {
            title: config.notification_title.clone(),
            icon: config.notification_icon.clone(),
            vibration_pattern: config.vibration_pattern.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReminder {
    pub task_id: String,
    pub fire_at: DateTime<Local>,
}

struct PendingTimer {
    handle: TimerHandle,
    token: u64,
    fire_at: DateTime<Local>,
}

struct Core {
    timers: Arc<dyn TimerHost>,
    dispatch: Arc<dyn NotificationDispatch>,
    player: AlertPlayer,
    style: ReminderStyle,
    pending: Mutex<HashMap<String, PendingTimer>>,
    next_token: AtomicU64,
}

impl Core {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingTimer>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_locked(&self, pending: &mut HashMap<String, PendingTimer>, task_id: &str) {
        if let Some(old) = pending.remove(task_id) {
            self.timers.cancel(old.handle);
            log::debug!("Cancelled pending reminder for task {}", task_id);
        }
        self.player.stop(task_id);
    }

    /// Timer callback. Dispatch, vibration and sound all happen before the
    /// pending entry is dropped.
    fn fire(&self, task_id: &str, title: &str, token: u64) {
        let mut pending = self.pending();
        if pending.get(task_id).map(|p| p.token) != Some(token) {
            log::debug!("Ignoring stale timer for task {}", task_id);
            return;
        }

        log::info!("Reminder due for task {} ({})", task_id, title);
        self.dispatch.dispatch(AgentMessage::show(
            &self.style.title,
            title,
            &self.style.icon,
            task_id,
        ));
        self.player.vibrate(&self.style.vibration_pattern);
        self.player.start(task_id);

        pending.remove(task_id);
    }
}

#[derive(Clone)]
pub struct ReminderScheduler {
    core: Arc<Core>,
}

impl ReminderScheduler {
    pub fn new(
        timers: Arc<dyn TimerHost>,
        dispatch: Arc<dyn NotificationDispatch>,
        player: AlertPlayer,
        style: ReminderStyle,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                timers,
                dispatch,
                player,
                style,
                pending: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Arms a reminder for `task` at its due instant.
    ///
    /// Does nothing (and leaves any existing timer alone) when the reminder
    /// is off, the due date or time is missing, or the due instant is not
    /// strictly in the future. Otherwise replaces any pending timer and
    /// active alert for the task. Returns whether a timer was armed.
    pub fn schedule_notification(&self, task: &Task) -> bool {
        if !task.reminder {
            return false;
        }
        let Some(due) = task.due_instant() else {
            log::debug!("Task {} has no usable due date/time; not scheduling", task.id);
            return false;
        };

        let core = &self.core;
        let mut pending = core.pending();

        let now = core.timers.now();
        let Ok(delay) = (due - now).to_std() else {
            return false;
        };
        if delay.is_zero() {
            return false;
        }

        core.cancel_locked(&mut pending, &task.id);

        // The token exists before the timer does, so a callback that runs
        // before `arm` returns still finds its entry once the lock is free.
        let token = core.next_token.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Core> = Arc::downgrade(&self.core);
        let task_id = task.id.clone();
        let title = task.title.clone();
        let handle = core.timers.arm(
            delay,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.fire(&task_id, &title, token);
                }
            }),
        );

        pending.insert(
            task.id.clone(),
            PendingTimer {
                handle,
                token,
                fire_at: due,
            },
        );
        log::debug!("Scheduled reminder for task {} at {}", task.id, due);
        true
    }

    /// Cancels the pending timer and stops the alert for `task_id`.
    /// Safe to call when neither exists.
    pub fn cancel_notification(&self, task_id: &str) {
        let mut pending = self.core.pending();
        self.core.cancel_locked(&mut pending, task_id);
    }

    /// Cancels every pending timer and stops every alert.
    pub fn clear_all_notifications(&self) {
        let mut pending = self.core.pending();
        for (_, timer) in pending.drain() {
            self.core.timers.cancel(timer.handle);
        }
        self.core.player.stop_all();
    }

    pub fn pending(&self) -> Vec<PendingReminder> {
        let mut list: Vec<PendingReminder> = self
            .core
            .pending()
            .iter()
            .map(|(id, p)| PendingReminder {
                task_id: id.clone(),
                fire_at: p.fire_at,
            })
            .collect();
        list.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.task_id.cmp(&b.task_id)));
        list
    }

    pub fn pending_fire_time(&self, task_id: &str) -> Option<DateTime<Local>> {
        self.core.pending().get(task_id).map(|p| p.fire_at)
    }

    pub fn has_pending(&self, task_id: &str) -> bool {
        self.core.pending().contains_key(task_id)
    }

    pub fn pending_count(&self) -> usize {
        self.core.pending().len()
    }

    pub fn is_alerting(&self, task_id: &str) -> bool {
        self.core.player.is_active(task_id)
    }

    pub fn active_alert_count(&self) -> usize {
        self.core.player.active_count()
    }

    pub fn now(&self) -> DateTime<Local> {
        self.core.timers.now()
    }
}
