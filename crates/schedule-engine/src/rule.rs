//! Recurrence rule parameters.
//!
//! A [`Rule`] is validated once, when it is built (through [`RuleBuilder`],
//! [`Rule::from_rrule`], or serde deserialization), and is immutable
//! afterwards. Malformed data therefore fails before any occurrence is
//! requested. Events share rules through `Arc<Rule>`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rrule::{NWeekday, RRule, Unvalidated};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

// ── Frequency ───────────────────────────────────────────────────────────────

/// The unit a rule advances by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Yearly => "YEARLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Daily => "DAILY",
            Frequency::Hourly => "HOURLY",
            Frequency::Minutely => "MINUTELY",
            Frequency::Secondly => "SECONDLY",
        }
    }

    /// Length of one unit in seconds for the sub-daily frequencies, which are
    /// stepped in absolute time rather than on the wall clock.
    pub fn fixed_step_seconds(self) -> Option<i64> {
        match self {
            Frequency::Hourly => Some(3600),
            Frequency::Minutely => Some(60),
            Frequency::Secondly => Some(1),
            Frequency::Yearly | Frequency::Monthly | Frequency::Weekly | Frequency::Daily => None,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YEARLY" => Ok(Frequency::Yearly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "WEEKLY" => Ok(Frequency::Weekly),
            "DAILY" => Ok(Frequency::Daily),
            "HOURLY" => Ok(Frequency::Hourly),
            "MINUTELY" => Ok(Frequency::Minutely),
            "SECONDLY" => Ok(Frequency::Secondly),
            _ => Err(ScheduleError::Configuration(format!(
                "unknown frequency '{}'",
                s.trim()
            ))),
        }
    }
}

// ── Rule ────────────────────────────────────────────────────────────────────

/// A validated recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RuleSpec", into = "RuleSpec")]
pub struct Rule {
    name: String,
    description: String,
    frequency: Frequency,
    interval: u32,
    count: Option<u32>,
    until: Option<DateTime<Utc>>,
    by_weekday: Vec<Weekday>,
    by_month_day: Vec<i8>,
    by_month: Vec<u32>,
}

/// Unvalidated rule fields, as they appear in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub by_weekday: Vec<Weekday>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub by_month_day: Vec<i8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub by_month: Vec<u32>,
}

fn default_interval() -> u32 {
    1
}

impl RuleSpec {
    fn new(frequency: Frequency) -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            frequency,
            interval: 1,
            count: None,
            until: None,
            by_weekday: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
        }
    }
}

impl TryFrom<RuleSpec> for Rule {
    type Error = ScheduleError;

    fn try_from(spec: RuleSpec) -> Result<Self> {
        if spec.interval == 0 {
            return Err(ScheduleError::Configuration(
                "interval must be at least 1".to_string(),
            ));
        }
        if spec.count == Some(0) {
            return Err(ScheduleError::Configuration(
                "count must be at least 1".to_string(),
            ));
        }
        if let Some(day) = spec
            .by_month_day
            .iter()
            .find(|d| **d == 0 || d.unsigned_abs() > 31)
        {
            return Err(ScheduleError::Configuration(format!(
                "month day {day} is outside ±1..=31"
            )));
        }
        if let Some(month) = spec.by_month.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(ScheduleError::Configuration(format!(
                "month {month} is outside 1..=12"
            )));
        }

        let mut by_weekday = spec.by_weekday;
        by_weekday.sort_by_key(|wd| wd.num_days_from_monday());
        by_weekday.dedup();
        let mut by_month_day = spec.by_month_day;
        by_month_day.sort_unstable();
        by_month_day.dedup();
        let mut by_month = spec.by_month;
        by_month.sort_unstable();
        by_month.dedup();

        Ok(Rule {
            name: spec.name,
            description: spec.description,
            frequency: spec.frequency,
            interval: spec.interval,
            count: spec.count,
            until: spec.until,
            by_weekday,
            by_month_day,
            by_month,
        })
    }
}

impl From<Rule> for RuleSpec {
    fn from(rule: Rule) -> Self {
        RuleSpec {
            name: rule.name,
            description: rule.description,
            frequency: rule.frequency,
            interval: rule.interval,
            count: rule.count,
            until: rule.until,
            by_weekday: rule.by_weekday,
            by_month_day: rule.by_month_day,
            by_month: rule.by_month,
        }
    }
}

impl Rule {
    /// An unbounded rule repeating every single `frequency` unit.
    pub fn new(frequency: Frequency) -> Self {
        Rule {
            name: String::new(),
            description: String::new(),
            frequency,
            interval: 1,
            count: None,
            until: None,
            by_weekday: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
        }
    }

    pub fn builder(frequency: Frequency) -> RuleBuilder {
        RuleBuilder {
            spec: RuleSpec::new(frequency),
        }
    }

    /// Parse an RFC 5545 RRULE value such as `FREQ=WEEKLY;INTERVAL=2;BYDAY=TU,TH`.
    ///
    /// A leading `RRULE:` is accepted. Parts the engine cannot expand
    /// (BYSETPOS, BYYEARDAY, BYWEEKNO, BYHOUR, BYMINUTE, BYSECOND and ordinal
    /// BYDAY values such as `3TU`) are rejected instead of being ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InvalidRule`] if the text is not a valid RRULE,
    /// or [`ScheduleError::Configuration`] if it uses an unsupported part or
    /// fails validation.
    ///
    /// # Examples
    ///
    /// ```
    /// use schedule_engine::rule::{Frequency, Rule};
    ///
    /// let rule = Rule::from_rrule("FREQ=WEEKLY;INTERVAL=2;COUNT=6;BYDAY=TU,TH").unwrap();
    /// assert_eq!(rule.frequency(), Frequency::Weekly);
    /// assert_eq!(rule.interval(), 2);
    /// assert_eq!(rule.count(), Some(6));
    /// ```
    pub fn from_rrule(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let body = trimmed.strip_prefix("RRULE:").unwrap_or(trimmed);
        let parsed: RRule<Unvalidated> = body
            .parse()
            .map_err(|e| ScheduleError::InvalidRule(format!("'{body}': {e}")))?;

        let unsupported = [
            ("BYSETPOS", parsed.get_by_set_pos().is_empty()),
            ("BYYEARDAY", parsed.get_by_year_day().is_empty()),
            ("BYWEEKNO", parsed.get_by_week_no().is_empty()),
            ("BYHOUR", parsed.get_by_hour().is_empty()),
            ("BYMINUTE", parsed.get_by_minute().is_empty()),
            ("BYSECOND", parsed.get_by_second().is_empty()),
        ];
        if let Some((part, _)) = unsupported.iter().find(|(_, empty)| !empty) {
            return Err(ScheduleError::Configuration(format!(
                "{part} is not supported in '{body}'"
            )));
        }

        let by_weekday = parsed
            .get_by_weekday()
            .iter()
            .map(|nwd| match nwd {
                NWeekday::Every(wd) => Ok(*wd),
                NWeekday::Nth(n, wd) => Err(ScheduleError::Configuration(format!(
                    "ordinal BYDAY {n}{} is not supported",
                    weekday_code(*wd)
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let frequency = match parsed.get_freq() {
            rrule::Frequency::Yearly => Frequency::Yearly,
            rrule::Frequency::Monthly => Frequency::Monthly,
            rrule::Frequency::Weekly => Frequency::Weekly,
            rrule::Frequency::Daily => Frequency::Daily,
            rrule::Frequency::Hourly => Frequency::Hourly,
            rrule::Frequency::Minutely => Frequency::Minutely,
            rrule::Frequency::Secondly => Frequency::Secondly,
        };

        Rule::try_from(RuleSpec {
            name: String::new(),
            description: String::new(),
            frequency,
            interval: u32::from(parsed.get_interval()),
            count: parsed.get_count(),
            until: parsed.get_until().map(|until| until.with_timezone(&Utc)),
            by_weekday,
            by_month_day: parsed.get_by_month_day().to_vec(),
            by_month: parsed
                .get_by_month()
                .iter()
                .map(|m| u32::from(*m))
                .collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn count(&self) -> Option<u32> {
        self.count
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.until
    }

    pub fn by_weekday(&self) -> &[Weekday] {
        &self.by_weekday
    }

    pub fn by_month_day(&self) -> &[i8] {
        &self.by_month_day
    }

    pub fn by_month(&self) -> &[u32] {
        &self.by_month
    }

    /// Whether any BYxxx constraint is set. Rules without one produce exactly
    /// one candidate per period, which lets cursors derive ordinals by arithmetic.
    pub fn has_by_rules(&self) -> bool {
        !(self.by_weekday.is_empty() && self.by_month_day.is_empty() && self.by_month.is_empty())
    }

    /// Whether `date` passes every BYxxx constraint (used as filters for DAILY
    /// and sub-daily frequencies).
    pub fn matches_date(&self, date: NaiveDate) -> bool {
        (self.by_month.is_empty() || self.by_month.contains(&date.month()))
            && (self.by_weekday.is_empty() || self.by_weekday.contains(&date.weekday()))
            && (self.by_month_day.is_empty()
                || self
                    .by_month_day
                    .iter()
                    .any(|md| month_day_matches(date, *md)))
    }
}

impl fmt::Display for Rule {
    /// Formats the rule as an RRULE value (without the `RRULE:` prefix).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.frequency)?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if let Some(count) = self.count {
            write!(f, ";COUNT={count}")?;
        }
        if let Some(until) = self.until {
            write!(f, ";UNTIL={}", until.format("%Y%m%dT%H%M%SZ"))?;
        }
        if !self.by_weekday.is_empty() {
            let days: Vec<&str> = self.by_weekday.iter().map(|wd| weekday_code(*wd)).collect();
            write!(f, ";BYDAY={}", days.join(","))?;
        }
        if !self.by_month_day.is_empty() {
            let days: Vec<String> = self.by_month_day.iter().map(i8::to_string).collect();
            write!(f, ";BYMONTHDAY={}", days.join(","))?;
        }
        if !self.by_month.is_empty() {
            let months: Vec<String> = self.by_month.iter().map(u32::to_string).collect();
            write!(f, ";BYMONTH={}", months.join(","))?;
        }
        Ok(())
    }
}

impl FromStr for Rule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        Rule::from_rrule(s)
    }
}

// ── RuleBuilder ─────────────────────────────────────────────────────────────

/// Incremental construction of a [`Rule`]; validation happens in [`RuleBuilder::build`].
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    spec: RuleSpec,
}

impl RuleBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.spec.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.spec.description = description.into();
        self
    }

    pub fn interval(mut self, interval: u32) -> Self {
        self.spec.interval = interval;
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.spec.count = Some(count);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.spec.until = Some(until);
        self
    }

    pub fn by_weekday(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.spec.by_weekday.extend(days);
        self
    }

    pub fn by_month_day(mut self, days: impl IntoIterator<Item = i8>) -> Self {
        self.spec.by_month_day.extend(days);
        self
    }

    pub fn by_month(mut self, months: impl IntoIterator<Item = u32>) -> Self {
        self.spec.by_month.extend(months);
        self
    }

    /// # Errors
    ///
    /// Returns [`ScheduleError::Configuration`] for a zero interval or count,
    /// or a by-rule value out of range.
    pub fn build(self) -> Result<Rule> {
        Rule::try_from(self.spec)
    }
}

// ── Calendar helpers ────────────────────────────────────────────────────────

/// Number of days in `month` of `year`.
pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// Resolve a BYMONTHDAY value (negative counts back from the month's end)
/// to a concrete day of `year`/`month`, if the month has it.
pub(crate) fn resolve_month_day(year: i32, month: u32, month_day: i8) -> Option<u32> {
    let dim = days_in_month(year, month);
    let day = if month_day > 0 {
        u32::from(month_day.unsigned_abs())
    } else {
        let back = u32::from(month_day.unsigned_abs());
        (dim + 1).checked_sub(back)?
    };
    (1..=dim).contains(&day).then_some(day)
}

fn month_day_matches(date: NaiveDate, month_day: i8) -> bool {
    resolve_month_day(date.year(), date.month(), month_day) == Some(date.day())
}

fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}
