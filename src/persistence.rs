use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use serde::Deserialize;

use crate::{
    db::Database,
    timer::{Timer, TimerColor, TimerStatus, DEFAULT_TIMER_NAME},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_error;

pub const DEFAULT_STORAGE_KEY: &str = "friendly-timers";

/// Stored shape of a timer as written by any past version of the app.
/// Only `id` and `timeElapsed` are mandatory; everything else is filled in by
/// [`StoredTimer::into_timer`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTimer {
    id: String,
    time_elapsed: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<TimerStatus>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    last_updated: Option<i64>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    jira_task_id: Option<String>,
    #[serde(default)]
    jira_task_url: Option<String>,
    #[serde(default)]
    archived: Option<bool>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl StoredTimer {
    fn into_timer(self, now: i64) -> Timer {
        let created_at = self.created_at.or(self.last_updated).unwrap_or(now);
        let name = non_empty(self.name)
            .map(|name| name.trim().to_string())
            .unwrap_or_else(|| DEFAULT_TIMER_NAME.to_string());
        let color = self
            .color
            .and_then(|raw| raw.parse::<TimerColor>().ok())
            .unwrap_or_default();

        Timer {
            id: self.id,
            name,
            time_elapsed: self.time_elapsed,
            status: self.status.unwrap_or_default(),
            created_at,
            last_updated: self.last_updated.map(|ts| ts.max(created_at)),
            color,
            jira_task_id: non_empty(self.jira_task_id),
            jira_task_url: non_empty(self.jira_task_url),
            archived: self.archived.unwrap_or(false),
        }
    }
}

/// Decodes a stored collection. Any entry with the wrong shape rejects the
/// whole record; duplicate ids keep their first occurrence.
pub fn decode_timers(raw: &str, now: i64) -> Result<Vec<Timer>> {
    let stored: Vec<StoredTimer> =
        serde_json::from_str(raw).context("stored timers are not a valid timer array")?;

    let mut seen = HashSet::with_capacity(stored.len());
    let mut timers = Vec::with_capacity(stored.len());
    for entry in stored {
        if !seen.insert(entry.id.clone()) {
            warn!("Dropping duplicate stored timer {}", entry.id);
            continue;
        }
        timers.push(entry.into_timer(now));
    }
    Ok(timers)
}

pub fn encode_timers(timers: &[Timer]) -> Result<String> {
    serde_json::to_string(timers).context("failed to serialize timers")
}

/// Reads and writes the whole timer collection as one record.
#[derive(Clone)]
pub struct TimerPersistence {
    db: Database,
    key: String,
}

impl TimerPersistence {
    pub fn new(db: Database, key: impl Into<String>) -> Self {
        Self {
            db,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    #[cfg(test)]
    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Overwrites the stored record. Returns `false` on failure; the error is
    /// logged and never propagated.
    pub async fn save(&self, timers: &[Timer]) -> bool {
        match self.try_save(timers).await {
            Ok(()) => true,
            Err(err) => {
                log_error!("Failed to save timers under '{}': {err:#}", self.key);
                false
            }
        }
    }

    async fn try_save(&self, timers: &[Timer]) -> Result<()> {
        let payload = encode_timers(timers)?;
        self.db.put_record(&self.key, payload, Utc::now()).await
    }

    /// Loads the stored collection, or an empty one if the record is missing
    /// or unreadable. `now` stands in for timestamps the record lacks.
    pub async fn load(&self, now: i64) -> Vec<Timer> {
        let raw = match self.db.get_record(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!("Failed to read timers under '{}': {err:#}", self.key);
                return Vec::new();
            }
        };

        match decode_timers(&raw, now) {
            Ok(timers) => timers,
            Err(err) => {
                warn!("Discarding stored timers under '{}': {err:#}", self.key);
                Vec::new()
            }
        }
    }
}
