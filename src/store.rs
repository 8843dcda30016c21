// In-memory snapshot of the task list and settings.
use crate::model::{Settings, Task};
use chrono::{DateTime, Local};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStore {
    /// Insertion order is display order.
    pub tasks: Vec<Task>,
    pub settings: Settings,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, tasks: Vec<Task>, settings: Settings) {
        self.tasks = tasks;
        self.settings = settings;
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Updates an existing task in place or appends it if missing.
    pub fn update_or_add_task(&mut self, task: Task) {
        if let Some(idx) = self.tasks.iter().position(|t| t.id == task.id) {
            self.tasks[idx] = task;
        } else {
            self.tasks.push(task);
        }
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Flips completion and returns the updated task.
    pub fn toggle_task(&mut self, id: &str) -> Option<Task> {
        let task = self.get_task_mut(id)?;
        task.completed = !task.completed;
        Some(task.clone())
    }

    pub fn delete_task(&mut self, id: &str) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(idx))
    }

    pub fn incomplete(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| !t.completed).collect()
    }

    pub fn completed(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.completed).collect()
    }

    /// Tasks that should have a pending reminder at `now`, honoring the
    /// global notification switch.
    pub fn reminder_eligible(&self, now: DateTime<Local>) -> Vec<&Task> {
        if !self.settings.notifications_enabled {
            return Vec::new();
        }
        self.tasks
            .iter()
            .filter(|t| t.is_reminder_eligible(now))
            .collect()
    }
}
