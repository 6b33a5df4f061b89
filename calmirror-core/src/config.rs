//! Global calmirror configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::date_range::{DEFAULT_HORIZON_DAYS, DateRange};
use crate::error::{CalMirrorError, CalMirrorResult};

pub const DEFAULT_MAX_EVENTS: usize = 100;

fn default_horizon_days() -> i64 {
    DEFAULT_HORIZON_DAYS
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS
}

fn default_true() -> bool {
    true
}

/// `~/.config/calmirror`
pub fn base_dir() -> CalMirrorResult<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| CalMirrorError::Config("Could not determine config directory".into()))?
        .join("calmirror"))
}

/// `~/.config/calmirror/providers/<provider>`
pub fn provider_dir(provider: &str) -> CalMirrorResult<PathBuf> {
    Ok(base_dir()?.join("providers").join(provider))
}

/// Global configuration at ~/.config/calmirror/config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// How many days ahead each pass looks
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,

    /// Per-calendar fetch cap
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    #[serde(default = "default_true")]
    pub propagate_updates: bool,

    /// Calendars to mirror. Their order is the index order used in reports.
    #[serde(default)]
    pub calendars: Vec<CalendarConfig>,
}

/// One `[[calendars]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub name: String,
    pub provider: String,

    /// Provider-specific keys (`google_account`, `outlook_calendar_id`, ...)
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        MirrorConfig {
            horizon_days: DEFAULT_HORIZON_DAYS,
            max_events: DEFAULT_MAX_EVENTS,
            propagate_updates: true,
            calendars: Vec::new(),
        }
    }
}

impl MirrorConfig {
    pub fn config_path() -> CalMirrorResult<PathBuf> {
        Ok(base_dir()?.join("config.toml"))
    }

    /// Load the global config, writing a commented default on first run.
    pub fn load() -> CalMirrorResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> CalMirrorResult<Self> {
        let config: MirrorConfig = Config::builder()
            .add_source(File::from(path).required(false))
            .build()
            .map_err(|e| CalMirrorError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalMirrorError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CalMirrorResult<()> {
        if self.horizon_days <= 0 {
            return Err(CalMirrorError::Config("horizon_days must be positive".into()));
        }
        if self.max_events == 0 {
            return Err(CalMirrorError::Config("max_events must be positive".into()));
        }

        let mut seen = HashSet::new();
        for calendar in &self.calendars {
            if !seen.insert(calendar.name.as_str()) {
                return Err(CalMirrorError::Config(format!(
                    "Calendar '{}' is configured twice",
                    calendar.name
                )));
            }
        }

        Ok(())
    }

    pub fn calendar(&self, name: &str) -> Option<&CalendarConfig> {
        self.calendars.iter().find(|c| c.name == name)
    }

    /// The window a pass covers when no explicit range is given.
    pub fn date_range(&self) -> DateRange {
        DateRange::upcoming(self.horizon_days)
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CalMirrorResult<()> {
        let contents = format!(
            "\
# calmirror configuration

# How many days ahead to mirror:
# horizon_days = {DEFAULT_HORIZON_DAYS}

# Maximum events fetched per calendar and pass:
# max_events = {DEFAULT_MAX_EVENTS}

# Push time changes on an original to its existing copies:
# propagate_updates = true

# Calendars to mirror into each other (run `calmirror auth <provider>` first):
#
# [[calendars]]
# name = \"work\"
# provider = \"google\"
# google_account = \"me@example.com\"
# google_calendar_id = \"primary\"
#
# [[calendars]]
# name = \"personal\"
# provider = \"outlook\"
# outlook_account = \"me@outlook.com\"
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalMirrorError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalMirrorError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

impl CalendarConfig {
    /// A required string parameter.
    pub fn param(&self, key: &str) -> CalMirrorResult<&str> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CalMirrorError::Config(format!(
                    "Calendar '{}' is missing required field: {key}",
                    self.name
                ))
            })
    }
}
