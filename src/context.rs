/*! Where dailylist keeps its files.

`AppContext` resolves the data and config directories and derives every file
path from them:

- `StandardContext`: platform directories from `directories::ProjectDirs`,
  or `data/` and `config/` under an override root (the `--root` flag).
- `TestContext`: a unique temporary root, removed on drop.

Anything that reads or writes files is handed a context; nothing looks paths
up globally.
*/

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Key under which the task list is persisted.
pub const TASKS_KEY: &str = "tasks";
/// Key under which the settings object is persisted.
pub const SETTINGS_KEY: &str = "settings";

pub trait AppContext: Send + Sync + std::fmt::Debug {
    fn get_data_dir(&self) -> Result<PathBuf>;
    fn get_config_dir(&self) -> Result<PathBuf>;

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(self.get_config_dir()?.join("config.toml"))
    }

    /// JSON file backing a persisted key.
    fn get_store_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join(format!("{}.json", key)))
    }

    fn get_log_path(&self) -> Option<PathBuf> {
        self.get_data_dir().ok().map(|p| p.join("dailylist.log"))
    }
}

pub type SharedContext = std::sync::Arc<dyn AppContext>;

fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory: {:?}", path))?;
    Ok(path)
}

#[derive(Clone, Copy)]
enum Dir {
    Data,
    Config,
}

impl Dir {
    fn subdir(self) -> &'static str {
        match self {
            Dir::Data => "data",
            Dir::Config => "config",
        }
    }

    fn in_project(self, proj: &ProjectDirs) -> PathBuf {
        match self {
            Dir::Data => proj.data_dir().to_path_buf(),
            Dir::Config => proj.config_dir().to_path_buf(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StandardContext {
    override_root: Option<PathBuf>,
}

impl StandardContext {
    pub fn new(override_root: Option<PathBuf>) -> Self {
        Self { override_root }
    }

    pub fn override_root(&self) -> Option<&Path> {
        self.override_root.as_deref()
    }

    fn resolve(&self, dir: Dir) -> Result<PathBuf> {
        let path = match &self.override_root {
            Some(root) => root.join(dir.subdir()),
            None => {
                let proj = ProjectDirs::from("com", "dailylist", "dailylist")
                    .ok_or_else(|| anyhow!("No home directory"))?;
                dir.in_project(&proj)
            }
        };
        ensure_dir(path)
    }
}

impl AppContext for StandardContext {
    fn get_data_dir(&self) -> Result<PathBuf> {
        self.resolve(Dir::Data)
    }

    fn get_config_dir(&self) -> Result<PathBuf> {
        self.resolve(Dir::Config)
    }
}

/// Throwaway root for tests. Clones share the directory; the first one
/// dropped removes it, so share a `TestContext` through an `Arc`.
#[derive(Clone, Debug)]
pub struct TestContext {
    pub root: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let root = std::env::temp_dir().join(format!("dailylist_test_{}", uuid::Uuid::new_v4()));
        // Tests are expected to panic if the temp dir is unusable.
        std::fs::create_dir_all(&root).expect("failed to create TestContext temp dir");
        Self { root }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext for TestContext {
    fn get_data_dir(&self) -> Result<PathBuf> {
        ensure_dir(self.root.join(Dir::Data.subdir()))
    }

    fn get_config_dir(&self) -> Result<PathBuf> {
        ensure_dir(self.root.join(Dir::Config.subdir()))
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
