// Handles configuration loading and defaults.
use crate::context::AppContext;
use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_title() -> String {
    "DailyList Pro Reminder".to_string()
}
fn default_icon() -> String {
    "logo.svg".to_string()
}
fn default_vibration() -> Vec<u64> {
    vec![200, 100, 200]
}
fn default_poll_interval() -> u64 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_title")]
    pub notification_title: String,
    #[serde(default = "default_icon")]
    pub notification_icon: String,
    /// WAV file played when a reminder fires (needs the `sound` feature).
    #[serde(default)]
    pub sound_file: Option<PathBuf>,
    #[serde(default = "default_vibration")]
    pub vibration_pattern: Vec<u64>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Launched when a notification is clicked, e.g. "alacritty -e dailylist list".
    #[serde(default)]
    pub open_command: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notification_title: default_title(),
            notification_icon: default_icon(),
            sound_file: None,
            vibration_pattern: default_vibration(),
            poll_interval_secs: default_poll_interval(),
            open_command: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load the configuration from disk using an explicit context.
    /// Returns a contextualized error if reading or parsing fails.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_config_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(cfg) => Ok(cfg),
            Err(e) if Self::is_missing_config_error(&e) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Detects whether an error means the config file was missing, either by
    /// our explicit message or by an IO NotFound anywhere in the chain.
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}
