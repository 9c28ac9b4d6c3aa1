//! Configuration file handling
//!
//! The configuration lives at `<config dir>/inwatch/config.toml` unless a
//! path is given with `--config`. Every field has a default, so a missing
//! file or a partial one is fine.

use anyhow::{bail, Context, Result};
use inwatch_core::EventMask;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub watch: WatchConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Lowercase event names, or the aliases `close`, `move` and `all`
    pub events: Vec<String>,
    /// Do not dereference a symlinked target
    pub dont_follow: bool,
    /// Only watch targets that are directories
    pub only_dir: bool,
    /// Remove each watch after its first event
    pub oneshot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
    /// Also append logs to this file
    pub file: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            events: ["modify", "create", "delete", "moved_from", "moved_to", "attrib"]
                .into_iter()
                .map(String::from)
                .collect(),
            dont_follow: false,
            only_dir: false,
            oneshot: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Default location of the configuration file
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("inwatch").join("config.toml"))
}

impl Config {
    /// Load and validate the configuration
    ///
    /// An explicit path must exist. The default path may be absent, in
    /// which case defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load_from(path)?,
            None => match config_file_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    pub fn validate(&self) -> Result<()> {
        if self.watch.events.is_empty() {
            bail!("watch.events must name at least one event");
        }
        self.watch.event_mask()?;

        let level = self.log.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            bail!(
                "log.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log.level
            );
        }
        Ok(())
    }
}

impl WatchConfig {
    /// Configured event kinds, without watch options
    pub fn event_mask(&self) -> Result<EventMask> {
        EventMask::parse_names(&self.events)
            .map_err(|name| anyhow::anyhow!("unknown event name '{}'", name))
    }

    /// Watch option bits to add to any requested mask
    pub fn options(&self) -> EventMask {
        let mut options = EventMask::empty();
        options.set(EventMask::DONT_FOLLOW, self.dont_follow);
        options.set(EventMask::ONLYDIR, self.only_dir);
        options.set(EventMask::ONESHOT, self.oneshot);
        options
    }
}
