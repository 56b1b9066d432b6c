//! User configuration. The file on disk only carries the fields the user has
//! set; loading merges it over built-in defaults with a pure function so the
//! rest of the crate always sees a fully populated [Config].

pub mod keywords;

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use keywords::ProjectKeywordMap;

pub const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_AFK_THRESHOLD_SECONDS: u32 = 180;
pub const DEFAULT_TRACKING_INTERVAL_SECONDS: u32 = 30;
pub const DEFAULT_DAILY_GOAL_MINUTES: u32 = 480;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub productive_apps: Vec<String>,
    pub productive_websites: Vec<String>,
    pub afk_threshold_seconds: u32,
    pub tracking_interval_seconds: u32,
    pub daily_goal_minutes: u32,
    pub project_keywords: ProjectKeywordMap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            productive_apps: vec![
                "Code".into(),
                "Visual Studio Code".into(),
                "IntelliJ".into(),
                "Terminal".into(),
                "iTerm".into(),
                "Xcode".into(),
            ],
            productive_websites: vec![
                "github.com".into(),
                "stackoverflow.com".into(),
                "docs.rs".into(),
            ],
            afk_threshold_seconds: DEFAULT_AFK_THRESHOLD_SECONDS,
            tracking_interval_seconds: DEFAULT_TRACKING_INTERVAL_SECONDS,
            daily_goal_minutes: DEFAULT_DAILY_GOAL_MINUTES,
            project_keywords: ProjectKeywordMap::default(),
        }
    }
}

impl Config {
    pub fn goal_seconds(&self) -> i64 {
        self.daily_goal_minutes as i64 * 60
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.afk_threshold_seconds > 0, "afk_threshold_seconds must be positive");
        ensure!(
            self.tracking_interval_seconds > 0,
            "tracking_interval_seconds must be positive"
        );
        ensure!(self.daily_goal_minutes > 0, "daily_goal_minutes must be positive");
        Ok(())
    }
}

/// On-disk shape of the config. Every field is optional so old or partial
/// files keep loading as the set of fields grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverlay {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub productive_apps: Option<Vec<String>>,
    #[serde(default)]
    pub productive_websites: Option<Vec<String>>,
    #[serde(default)]
    pub afk_threshold_seconds: Option<u32>,
    #[serde(default)]
    pub tracking_interval_seconds: Option<u32>,
    #[serde(default)]
    pub daily_goal_minutes: Option<u32>,
    #[serde(default)]
    pub project_keywords: Option<ProjectKeywordMap>,
}

/// Merge rule: scalar and array fields replace the default wholesale when
/// present; the keyword map deep-merges entry by entry.
pub fn merge(defaults: Config, overlay: ConfigOverlay) -> Config {
    Config {
        productive_apps: overlay.productive_apps.unwrap_or(defaults.productive_apps),
        productive_websites: overlay
            .productive_websites
            .unwrap_or(defaults.productive_websites),
        afk_threshold_seconds: overlay
            .afk_threshold_seconds
            .unwrap_or(defaults.afk_threshold_seconds),
        tracking_interval_seconds: overlay
            .tracking_interval_seconds
            .unwrap_or(defaults.tracking_interval_seconds),
        daily_goal_minutes: overlay
            .daily_goal_minutes
            .unwrap_or(defaults.daily_goal_minutes),
        project_keywords: match overlay.project_keywords {
            Some(map) => ProjectKeywordMap::merged_over(defaults.project_keywords, map),
            None => defaults.project_keywords,
        },
    }
}

pub fn config_path(app_dir: &Path) -> PathBuf {
    app_dir.join(CONFIG_FILE_NAME)
}

/// A missing file yields the defaults. A malformed file is an error; silently
/// dropping user settings would be worse than failing the command.
pub fn load_config(path: &Path) -> Result<Config> {
    let overlay = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<ConfigOverlay>(&raw)
            .with_context(|| format!("Malformed config file {path:?}"))?,
        Err(e) if e.kind() == ErrorKind::NotFound => ConfigOverlay::default(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read config {path:?}")),
    };
    let config = merge(Config::default(), overlay);
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    config.validate()?;
    let raw = serde_json::to_string_pretty(config)?;
    fs::write(path, raw).with_context(|| format!("Failed to write config {path:?}"))?;
    Ok(())
}
