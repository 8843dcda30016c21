//! Central logic controller for task and settings changes.
//! Every UI surface (the CLI, the daemon) goes through this controller so that
//! each mutation ends with the same two steps: a full reminder reschedule and
//! a write to local storage.
use crate::model::{Settings, Task, TaskDraft};
use crate::permission::{PermissionGate, PermissionHost, UserNotice};
use crate::scheduler::ReminderScheduler;
use crate::storage::LocalStore;
use crate::store::TaskStore;
use anyhow::{Result, anyhow, bail};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const PERMISSION_REQUIRED_MESSAGE: &str =
    "Notification permission is required for reminders. Please enable it in your system settings.";

/// Reschedule-all: drop every pending timer and alert, then arm one timer per
/// reminder-eligible task if notifications are enabled. Afterwards the
/// scheduler state depends only on `snapshot`. Returns the number armed.
pub fn reschedule_all(scheduler: &ReminderScheduler, snapshot: &TaskStore) -> usize {
    scheduler.clear_all_notifications();
    if !snapshot.settings.notifications_enabled {
        log::info!("Notifications disabled; no reminders armed");
        return 0;
    }

    let now = scheduler.now();
    let armed = snapshot
        .reminder_eligible(now)
        .into_iter()
        .filter(|task| scheduler.schedule_notification(task))
        .count();
    log::info!("Rescheduled {} reminder(s)", armed);
    armed
}

pub struct TaskController<H> {
    pub store: Arc<Mutex<TaskStore>>,
    pub storage: Arc<LocalStore>,
    pub scheduler: ReminderScheduler,
    gate: PermissionGate<H>,
    notice: Arc<dyn UserNotice>,
}

impl<H: PermissionHost> TaskController<H> {
    pub fn new(
        storage: Arc<LocalStore>,
        scheduler: ReminderScheduler,
        gate: PermissionGate<H>,
        notice: Arc<dyn UserNotice>,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(TaskStore::new())),
            storage,
            scheduler,
            gate,
            notice,
        }
    }

    /// Reads tasks and settings from storage and reschedules.
    ///
    /// Unreadable settings fall back to the defaults; unreadable tasks are an
    /// error and leave the current snapshot untouched.
    pub async fn load(&self) -> Result<()> {
        let tasks = self.storage.load_tasks()?;
        let settings = self.storage.load_settings().unwrap_or_else(|e| {
            log::warn!("{:#}; using default settings", e);
            Settings::default()
        });

        let mut store = self.store.lock().await;
        store.replace(tasks, settings);
        reschedule_all(&self.scheduler, &store);
        Ok(())
    }

    /// Picks up changes written by another process.
    pub async fn reload(&self) -> Result<()> {
        log::info!("Store changed on disk, reloading");
        self.load().await
    }

    pub async fn reschedule_all(&self) -> usize {
        let store = self.store.lock().await;
        reschedule_all(&self.scheduler, &store)
    }

    /// Creates a task, or edits one when `draft.id` is set. Returns the id.
    ///
    /// A reminder-bearing save asks for notification permission first. A
    /// refusal is reported to the user but does not stop the save: the
    /// reminder still sounds locally.
    pub async fn save_task(&self, draft: TaskDraft) -> Result<String> {
        if draft.title.trim().is_empty() {
            bail!("Task title cannot be empty");
        }

        let notifications_enabled = self.store.lock().await.settings.notifications_enabled;
        if draft.reminder && notifications_enabled {
            let permission = self.gate.request_permission().await;
            if !permission.is_granted() {
                self.notice.alert(PERMISSION_REQUIRED_MESSAGE);
            }
        }

        let mut store = self.store.lock().await;
        let id = match draft.id.clone() {
            Some(id) => {
                let task = store
                    .get_task_mut(&id)
                    .ok_or_else(|| anyhow!("Task {} not found", id))?;
                draft.apply_to(task);
                id
            }
            None => {
                let task = draft.into_task();
                let id = task.id.clone();
                store.add_task(task);
                id
            }
        };

        self.commit_tasks(&store)?;
        Ok(id)
    }

    pub async fn delete_task(&self, id: &str) -> Result<Task> {
        let mut store = self.store.lock().await;
        let task = store
            .delete_task(id)
            .ok_or_else(|| anyhow!("Task {} not found", id))?;
        self.scheduler.cancel_notification(id);

        self.commit_tasks(&store)?;
        Ok(task)
    }

    /// Flips completion. Completing a task silences its alert at once.
    pub async fn toggle_complete(&self, id: &str) -> Result<Task> {
        let mut store = self.store.lock().await;
        let task = store
            .toggle_task(id)
            .ok_or_else(|| anyhow!("Task {} not found", id))?;
        if task.completed {
            self.scheduler.cancel_notification(id);
        }

        self.commit_tasks(&store)?;
        Ok(task)
    }

    pub async fn set_settings(&self, settings: Settings) -> Result<()> {
        let mut store = self.store.lock().await;
        store.settings = settings;
        reschedule_all(&self.scheduler, &store);
        self.storage.save_settings(&settings)
    }

    fn commit_tasks(&self, store: &TaskStore) -> Result<()> {
        reschedule_all(&self.scheduler, store);
        self.storage.save_tasks(&store.tasks)
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.store.lock().await.tasks.clone()
    }

    pub async fn settings(&self) -> Settings {
        self.store.lock().await.settings
    }

    pub async fn find(&self, id: &str) -> Option<Task> {
        self.store.lock().await.get_task(id).cloned()
    }

    pub async fn incomplete_tasks(&self) -> Vec<Task> {
        self.store
            .lock()
            .await
            .incomplete()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn completed_tasks(&self) -> Vec<Task> {
        self.store
            .lock()
            .await
            .completed()
            .into_iter()
            .cloned()
            .collect()
    }
}
