use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TIMER_NAME: &str = "New Timer";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Stopped,
    Running,
    Paused,
}

impl Default for TimerStatus {
    fn default() -> Self {
        TimerStatus::Stopped
    }
}

impl TimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Stopped => "stopped",
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimerColor {
    Blue,
    Green,
    Purple,
    Pink,
    Amber,
    Teal,
}

impl Default for TimerColor {
    fn default() -> Self {
        TimerColor::Blue
    }
}

impl TimerColor {
    pub const ALL: [TimerColor; 6] = [
        TimerColor::Blue,
        TimerColor::Green,
        TimerColor::Purple,
        TimerColor::Pink,
        TimerColor::Amber,
        TimerColor::Teal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimerColor::Blue => "blue",
            TimerColor::Green => "green",
            TimerColor::Purple => "purple",
            TimerColor::Pink => "pink",
            TimerColor::Amber => "amber",
            TimerColor::Teal => "teal",
        }
    }
}

impl FromStr for TimerColor {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let wanted = value.trim();
        TimerColor::ALL
            .into_iter()
            .find(|color| color.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| anyhow!("unknown timer color '{value}'"))
    }
}

impl fmt::Display for TimerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: String,
    pub name: String,
    pub time_elapsed: u64,
    pub status: TimerStatus,
    pub created_at: i64,
    /// Reference point for the next accrual fold. `None` means `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub color: TimerColor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_task_url: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

impl Timer {
    pub fn new(name: &str, color: Option<TimerColor>, now: i64) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            bail!("timer name must not be empty");
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            time_elapsed: 0,
            status: TimerStatus::Stopped,
            created_at: now,
            last_updated: Some(now),
            color: color.unwrap_or_default(),
            jira_task_id: None,
            jira_task_url: None,
            archived: false,
        })
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn reference_ms(&self) -> i64 {
        self.last_updated.unwrap_or(self.created_at)
    }

    fn touch(&mut self, now: i64) {
        self.last_updated = Some(now.max(self.created_at));
    }

    pub fn start(&mut self, now: i64) -> bool {
        if self.is_running() {
            return false;
        }
        self.status = TimerStatus::Running;
        self.touch(now);
        true
    }

    pub fn pause(&mut self, now: i64) -> bool {
        if !self.is_running() {
            return false;
        }
        self.status = TimerStatus::Paused;
        self.touch(now);
        true
    }

    pub fn stop(&mut self, now: i64) -> bool {
        if self.status == TimerStatus::Stopped && self.time_elapsed == 0 {
            return false;
        }
        self.status = TimerStatus::Stopped;
        self.time_elapsed = 0;
        self.touch(now);
        true
    }

    /// Folds the wall-clock time since the last reference point into
    /// `time_elapsed`. Only running timers accrue; a clock that moved
    /// backwards contributes nothing.
    pub fn accrue(&mut self, now: i64) -> bool {
        if !self.is_running() {
            return false;
        }
        let delta = now.saturating_sub(self.reference_ms()).max(0) as u64;
        self.time_elapsed = self.time_elapsed.saturating_add(delta);
        self.touch(now);
        true
    }

    pub fn rename(&mut self, new_name: &str) -> bool {
        let new_name = new_name.trim();
        if new_name.is_empty() || new_name == self.name {
            return false;
        }
        self.name = new_name.to_string();
        true
    }

    pub fn set_color(&mut self, color: TimerColor) -> bool {
        if self.color == color {
            return false;
        }
        self.color = color;
        true
    }

    pub fn link_task(&mut self, task_id: &str, task_url: &str) -> bool {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return false;
        }
        let task_url = task_url.trim();
        let task_url = (!task_url.is_empty()).then(|| task_url.to_string());

        if self.jira_task_id.as_deref() == Some(task_id) && self.jira_task_url == task_url {
            return false;
        }
        self.jira_task_id = Some(task_id.to_string());
        self.jira_task_url = task_url;
        true
    }

    pub fn unlink_task(&mut self) -> bool {
        if self.jira_task_id.is_none() && self.jira_task_url.is_none() {
            return false;
        }
        self.jira_task_id = None;
        self.jira_task_url = None;
        true
    }

    pub fn set_archived(&mut self, archived: bool) -> bool {
        if self.archived == archived {
            return false;
        }
        self.archived = archived;
        true
    }

    /// Always changes the entity, so always reports `true`.
    pub fn toggle_archived(&mut self) -> bool {
        self.archived = !self.archived;
        true
    }
}

/// Renders milliseconds as `HH:MM:SS`; hours keep growing past 99.
pub fn format_elapsed(milliseconds: u64) -> String {
    let total_seconds = milliseconds / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn timer_at(now: i64) -> Timer {
        Timer::new("Workout", Some(TimerColor::Blue), now).unwrap()
    }

    #[test]
    fn new_timer_starts_stopped_with_defaults() {
        let timer = Timer::new("  Reading  ", None, 5_000).unwrap();
        assert_eq!(timer.name, "Reading");
        assert_eq!(timer.status, TimerStatus::Stopped);
        assert_eq!(timer.time_elapsed, 0);
        assert_eq!(timer.created_at, 5_000);
        assert_eq!(timer.last_updated, Some(5_000));
        assert_eq!(timer.color, TimerColor::Blue);
        assert!(!timer.archived);
        assert!(timer.jira_task_id.is_none());
    }

    #[test]
    fn new_timer_rejects_blank_name() {
        assert!(Timer::new("", None, 0).is_err());
        assert!(Timer::new("   \t", None, 0).is_err());
    }

    #[test]
    fn new_timers_get_distinct_ids() {
        let a = timer_at(0);
        let b = timer_at(0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let mut timer = timer_at(1_000);
        assert!(timer.start(2_000));
        let before = timer.clone();

        assert!(!timer.start(3_000));
        assert_eq!(timer, before);
    }

    #[test]
    fn pause_twice_changes_nothing_the_second_time() {
        let mut timer = timer_at(0);
        timer.start(0);
        timer.accrue(400);
        assert!(timer.pause(450));
        let after_first = timer.clone();

        assert!(!timer.pause(900));
        assert_eq!(timer, after_first);
        assert_eq!(timer.status, TimerStatus::Paused);
    }

    #[test]
    fn pause_is_ignored_unless_running() {
        let mut timer = timer_at(0);
        assert!(!timer.pause(10));
        assert_eq!(timer.status, TimerStatus::Stopped);
    }

    #[test]
    fn paused_time_is_not_accrued() {
        let mut timer = timer_at(0);
        timer.start(0);
        timer.accrue(1_000);
        timer.pause(1_000);

        for now in (1_100..=60_000).step_by(100) {
            assert!(!timer.accrue(now));
        }
        assert_eq!(timer.time_elapsed, 1_000);

        timer.start(60_000);
        timer.accrue(60_500);
        assert_eq!(timer.time_elapsed, 1_500);
    }

    #[test]
    fn stop_resets_elapsed() {
        let mut timer = timer_at(0);
        timer.start(0);
        timer.accrue(12_345);
        assert!(timer.stop(12_400));
        assert_eq!(timer.time_elapsed, 0);
        assert_eq!(timer.status, TimerStatus::Stopped);

        assert!(!timer.stop(13_000));
    }

    #[test]
    fn stop_from_paused_resets_elapsed() {
        let mut timer = timer_at(0);
        timer.start(0);
        timer.accrue(700);
        timer.pause(700);
        assert!(timer.stop(800));
        assert_eq!(timer.time_elapsed, 0);
    }

    #[test]
    fn backwards_clock_contributes_zero() {
        let mut timer = timer_at(10_000);
        timer.start(10_000);
        timer.accrue(10_500);
        assert_eq!(timer.time_elapsed, 500);

        // Clock set back by a minute.
        assert!(timer.accrue(9_000));
        assert_eq!(timer.time_elapsed, 500);
        assert_eq!(timer.last_updated, Some(10_000));

        timer.accrue(10_300);
        assert_eq!(timer.time_elapsed, 800);
    }

    #[test]
    fn accrual_uses_created_at_when_last_updated_missing() {
        let mut timer = timer_at(1_000);
        timer.status = TimerStatus::Running;
        timer.last_updated = None;

        timer.accrue(1_250);
        assert_eq!(timer.time_elapsed, 250);
        assert_eq!(timer.last_updated, Some(1_250));
    }

    #[test]
    fn rename_trims_and_rejects_blank() {
        let mut timer = timer_at(0);
        assert!(!timer.rename(""));
        assert!(!timer.rename("   "));
        assert_eq!(timer.name, "Workout");

        assert!(timer.rename("  Focus  "));
        assert_eq!(timer.name, "Focus");

        assert!(!timer.rename("Focus"));
    }

    #[test]
    fn task_link_fields_move_together() {
        let mut timer = timer_at(0);
        assert!(timer.link_task("PROJ-12", "https://jira.example.com/browse/PROJ-12"));
        assert_eq!(timer.jira_task_id.as_deref(), Some("PROJ-12"));
        assert_eq!(
            timer.jira_task_url.as_deref(),
            Some("https://jira.example.com/browse/PROJ-12")
        );

        assert!(!timer.link_task("  ", "https://elsewhere"));
        assert_eq!(timer.jira_task_id.as_deref(), Some("PROJ-12"));

        assert!(timer.unlink_task());
        assert!(timer.jira_task_id.is_none());
        assert!(timer.jira_task_url.is_none());
        assert!(!timer.unlink_task());
    }

    #[test]
    fn archiving_does_not_touch_lifecycle() {
        let mut timer = timer_at(0);
        timer.start(0);
        assert!(timer.toggle_archived());
        assert!(timer.archived);
        assert!(timer.accrue(300));
        assert_eq!(timer.time_elapsed, 300);

        assert!(!timer.set_archived(true));
        assert!(timer.set_archived(false));
        assert_eq!(timer.status, TimerStatus::Running);

        assert!(timer.toggle_archived());
        assert!(timer.toggle_archived());
        assert!(!timer.archived);
    }

    #[test]
    fn colors_parse_case_insensitively() {
        assert_eq!("Teal".parse::<TimerColor>().unwrap(), TimerColor::Teal);
        assert_eq!(" amber ".parse::<TimerColor>().unwrap(), TimerColor::Amber);
        assert!("magenta".parse::<TimerColor>().is_err());
    }

    #[test]
    fn format_elapsed_pads_components() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(2_500), "00:00:02");
        assert_eq!(format_elapsed(3_723_000), "01:02:03");
        assert_eq!(format_elapsed(360_000_000), "100:00:00");
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let mut timer = timer_at(7);
        timer.link_task("ABC-1", "https://x/ABC-1");
        let value = serde_json::to_value(&timer).unwrap();

        assert_eq!(value["timeElapsed"], 0);
        assert_eq!(value["status"], "stopped");
        assert_eq!(value["createdAt"], 7);
        assert_eq!(value["lastUpdated"], 7);
        assert_eq!(value["color"], "blue");
        assert_eq!(value["jiraTaskId"], "ABC-1");
        assert_eq!(value["archived"], false);
    }

    proptest! {
        #[test]
        fn prop_running_fold_sums_deltas(
            initial in 0u64..1_000_000,
            deltas in proptest::collection::vec(0i64..5_000, 0..50),
        ) {
            let mut timer = timer_at(0);
            timer.time_elapsed = initial;
            timer.start(0);

            let mut now = 0;
            for delta in &deltas {
                now += delta;
                timer.accrue(now);
            }

            let expected = initial + deltas.iter().sum::<i64>() as u64;
            prop_assert_eq!(timer.time_elapsed, expected);
        }

        #[test]
        fn prop_elapsed_never_decreases_under_arbitrary_clock(
            readings in proptest::collection::vec(-10_000i64..10_000, 1..60),
        ) {
            let mut timer = timer_at(0);
            timer.start(0);

            let mut previous = timer.time_elapsed;
            for now in readings {
                timer.accrue(now);
                prop_assert!(timer.time_elapsed >= previous);
                prop_assert!(timer.last_updated.unwrap() >= timer.created_at);
                previous = timer.time_elapsed;
            }
        }
    }
}
