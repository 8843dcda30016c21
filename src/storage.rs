// Key/value persistence for the task list and the settings object.
//
// ⚠️ VERSION BUMP REQUIRED:
// Changes to the Task record layout require incrementing STORE_VERSION and a
// migration in `decode_tasks`.
use crate::context::{SETTINGS_KEY, SharedContext, TASKS_KEY};
use crate::model::{Settings, Task};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

// Version history:
// - v0: bare JSON array of tasks (written by the first browser-based release)
// - v1: versioned envelope
const STORE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct TasksFile {
    #[serde(default)]
    version: u32,
    tasks: Vec<Task>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTasks {
    Versioned(TasksFile),
    Legacy(Vec<Task>),
}

/// What the daemon compares to notice that another process rewrote a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

/// Durable storage for tasks and settings, one JSON file per key.
///
/// If the task file exists but cannot be read, saving tasks is refused until
/// a later load succeeds, so unreadable data is never overwritten by an empty
/// list. `force_save_tasks` bypasses the check.
#[derive(Debug)]
pub struct LocalStore {
    ctx: SharedContext,
    tasks_load_failed: AtomicBool,
}

impl LocalStore {
    pub fn new(ctx: SharedContext) -> Self {
        Self {
            ctx,
            tasks_load_failed: AtomicBool::new(false),
        }
    }

    fn tasks_path(&self) -> Result<PathBuf> {
        self.ctx.get_store_path(TASKS_KEY)
    }

    fn settings_path(&self) -> Result<PathBuf> {
        self.ctx.get_store_path(SETTINGS_KEY)
    }

    fn get_lock_path(file_path: &Path) -> PathBuf {
        let mut lock_path = file_path.to_path_buf();
        if let Some(ext) = lock_path.extension() {
            let mut ext = ext.to_os_string();
            ext.push(".lock");
            lock_path.set_extension(ext);
        } else {
            lock_path.set_extension("lock");
        }
        lock_path
    }

    /// Runs `f` while holding an exclusive lock on a sidecar `.lock` file.
    pub fn with_lock<F, T>(file_path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock_path = Self::get_lock_path(file_path);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {:?}", lock_path))?;

        file.lock_exclusive()?;
        let result = f();
        file.unlock()?;
        result
    }

    pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(tmp_path, path)?;
        Ok(())
    }

    fn decode_tasks(json: &str) -> Result<Vec<Task>> {
        match serde_json::from_str::<StoredTasks>(json)? {
            StoredTasks::Versioned(file) => {
                if file.version > STORE_VERSION {
                    log::warn!(
                        "Task file version {} is newer than supported version {}",
                        file.version,
                        STORE_VERSION
                    );
                }
                Ok(file.tasks)
            }
            StoredTasks::Legacy(tasks) => {
                log::info!("Migrating {} tasks from v0 to v{}", tasks.len(), STORE_VERSION);
                Ok(tasks)
            }
        }
    }

    pub fn load_tasks(&self) -> Result<Vec<Task>> {
        let path = self.tasks_path()?;
        if !path.exists() {
            self.tasks_load_failed.store(false, Ordering::SeqCst);
            return Ok(Vec::new());
        }

        let result = Self::with_lock(&path, || {
            let json = fs::read_to_string(&path)?;
            Self::decode_tasks(&json)
        })
        .with_context(|| format!("Failed to load tasks from {:?}", path));

        self.tasks_load_failed
            .store(result.is_err(), Ordering::SeqCst);
        result
    }

    pub fn can_save_tasks(&self) -> bool {
        !self.tasks_load_failed.load(Ordering::SeqCst)
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        if !self.can_save_tasks() {
            anyhow::bail!(
                "Refusing to save tasks: previous load failed. Fix or remove the task file, or use force save."
            );
        }
        self.force_save_tasks(tasks)
    }

    pub fn force_save_tasks(&self, tasks: &[Task]) -> Result<()> {
        let path = self.tasks_path()?;
        let file = TasksFile {
            version: STORE_VERSION,
            tasks: tasks.to_vec(),
        };
        Self::with_lock(&path, || {
            let json = serde_json::to_string_pretty(&file)?;
            Self::atomic_write(&path, json)
        })?;
        self.tasks_load_failed.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn load_settings(&self) -> Result<Settings> {
        let path = self.settings_path()?;
        if !path.exists() {
            return Ok(Settings::default());
        }
        Self::with_lock(&path, || {
            let json = fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&json)?)
        })
        .with_context(|| format!("Failed to load settings from {:?}", path))
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let path = self.settings_path()?;
        Self::with_lock(&path, || {
            let json = serde_json::to_string_pretty(settings)?;
            Self::atomic_write(&path, json)
        })
    }

    /// Mtime and length of a key's file, `None` if it does not exist.
    pub fn stamp(&self, key: &str) -> Option<FileStamp> {
        let path = self.ctx.get_store_path(key).ok()?;
        let meta = fs::metadata(path).ok()?;
        Some(FileStamp {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }

    pub fn tasks_stamp(&self) -> Option<FileStamp> {
        self.stamp(TASKS_KEY)
    }

    pub fn settings_stamp(&self) -> Option<FileStamp> {
        self.stamp(SETTINGS_KEY)
    }
}
