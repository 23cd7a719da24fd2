//! Engine configuration.
//!
//! Everything here has a sensible default, so most callers use
//! [`EngineConfig::default`]. Deployments that keep settings in JSON load them
//! with [`EngineConfig::from_json`]; missing keys fall back to defaults.

use chrono::{Datelike, NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::error::{Result, ScheduleError};

// ── Configurable week start ─────────────────────────────────────────────────

/// Which day begins a week, for WEEKLY by-weekday expansion and week periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStartDay {
    /// ISO 8601 standard (Monday = day 0 of the week).
    #[default]
    Monday,
    /// US/Canada convention (Sunday = day 0 of the week).
    Sunday,
}

impl WeekStartDay {
    /// How many days `weekday` is from the week-start day.
    pub fn days_from_start(self, weekday: Weekday) -> i64 {
        match self {
            WeekStartDay::Monday => i64::from(weekday.num_days_from_monday()),
            WeekStartDay::Sunday => i64::from(weekday.num_days_from_sunday()),
        }
    }

    /// The first day of the week containing `date`.
    pub fn start_of_week(self, date: NaiveDate) -> NaiveDate {
        date - chrono::Duration::days(self.days_from_start(date.weekday()))
    }
}

// ── EngineConfig ────────────────────────────────────────────────────────────

/// Default number of consecutive candidate-free periods a cursor scans before
/// giving up on a rule (e.g. `FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=30`).
pub const DEFAULT_MAX_EMPTY_PERIODS: u32 = 1000;

/// Options shared by every cursor a manager creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Which day starts the week.
    pub week_start: WeekStartDay,
    /// What to do with wall-clock candidates inside a DST gap.
    pub dst_policy: DstPolicy,
    /// Consecutive empty periods tolerated before a rule counts as exhausted.
    /// Hourly and finer rules with by-rules skip rejected dates and count
    /// this limit in days instead.
    pub max_empty_periods: u32,
    /// Zone used to lay out calendar periods (days, weeks, months, years).
    pub display_timezone: Tz,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            week_start: WeekStartDay::default(),
            dst_policy: DstPolicy::default(),
            max_empty_periods: DEFAULT_MAX_EMPTY_PERIODS,
            display_timezone: Tz::UTC,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document into a config; absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Configuration`] if the JSON is malformed, names
    /// an unknown timezone, or sets `max_empty_periods` to zero.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| ScheduleError::Configuration(format!("engine config: {e}")))?;
        if config.max_empty_periods == 0 {
            return Err(ScheduleError::Configuration(
                "max_empty_periods must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Set the display timezone by IANA name.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InvalidTimezone`] for an unknown name.
    pub fn with_display_timezone(mut self, name: &str) -> Result<Self> {
        self.display_timezone = parse_timezone(name)?;
        Ok(self)
    }
}

/// Parse an IANA timezone name such as `"America/New_York"`.
///
/// # Errors
///
/// Returns [`ScheduleError::InvalidTimezone`] if the name is not in the tz database.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}
