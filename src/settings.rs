use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard},
    time::Duration,
};

use crate::persistence::DEFAULT_STORAGE_KEY;

pub const DATA_DIR_ENV_VAR: &str = "FRIENDLY_TIMER_DATA_DIR";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DATABASE_FILE_NAME: &str = "friendly-timer.sqlite3";

const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
const MIN_TICK_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSettings {
    pub tick_interval_ms: u64,
    pub storage_key: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            storage_key: DEFAULT_STORAGE_KEY.into(),
        }
    }
}

impl EngineSettings {
    /// Tick period, never shorter than 10ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(MIN_TICK_INTERVAL_MS))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    engine: EngineSettings,
}

pub struct SettingsStore {
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Reads `path`, or writes the defaults there on first run so the file
    /// exists for hand editing.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            let defaults = UserSettings::default();
            persist(&path, &defaults)?;
            log::info!("Wrote default settings to {}", path.display());
            defaults
        };

        Ok(Self {
            data: RwLock::new(data),
        })
    }

    pub fn engine(&self) -> EngineSettings {
        self.read().engine.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn persist(path: &Path, data: &UserSettings) -> Result<()> {
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}

/// Directory holding the database and settings file. `FRIENDLY_TIMER_DATA_DIR`
/// wins over the platform data directory.
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV_VAR).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::data_dir()
        .map(|dir| dir.join("friendly-timer"))
        .context("no platform data directory; set FRIENDLY_TIMER_DATA_DIR")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE_NAME)).unwrap();

        let engine = store.engine();
        assert_eq!(engine, EngineSettings::default());
        assert_eq!(engine.tick_interval(), Duration::from_millis(100));
        assert_eq!(engine.storage_key, "friendly-timers");
    }

    #[test]
    fn first_run_writes_an_editable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        SettingsStore::new(path.clone()).unwrap();

        let written: UserSettings = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.engine, EngineSettings::default());

        fs::write(&path, r#"{"engine": {"tick_interval_ms": 50, "storage_key": "work-timers"}}"#)
            .unwrap();
        let edited = SettingsStore::new(path).unwrap().engine();
        assert_eq!(edited.tick_interval_ms, 50);
        assert_eq!(edited.storage_key, "work-timers");
    }

    #[test]
    fn unreadable_json_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.engine(), EngineSettings::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{"engine": {"tick_interval_ms": 250}}"#).unwrap();

        let engine = SettingsStore::new(path).unwrap().engine();
        assert_eq!(engine.tick_interval_ms, 250);
        assert_eq!(engine.storage_key, DEFAULT_STORAGE_KEY);
    }

    #[test]
    fn tick_interval_has_a_floor() {
        let engine = EngineSettings {
            tick_interval_ms: 0,
            ..EngineSettings::default()
        };
        assert_eq!(engine.tick_interval(), Duration::from_millis(10));
    }
}
