//! Event records as loaded by the calling application.
//!
//! The engine only reads events. Persisted per-occurrence changes arrive
//! pre-loaded in [`Event::exceptions`], keyed by the occurrence's original
//! (rule-generated) start.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, ScheduleError};
use crate::recurrence::{Direction, RuleCursor};
use crate::rule::Rule;

/// A persisted change to one occurrence of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Exception {
    /// The occurrence is called off. It is still produced, flagged as cancelled.
    Cancelled,
    /// The occurrence was moved and/or resized.
    Rescheduled {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// A possibly-recurring calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Zone whose wall clock daily-and-longer recurrences follow.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Arc<Rule>>,
    /// Inclusive cap on the original start of generated occurrences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_recurring_period: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exceptions: BTreeMap<DateTime<Utc>, Exception>,
}

fn default_timezone() -> Tz {
    Tz::UTC
}

impl Event {
    /// A one-off event in UTC.
    pub fn new(title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            start,
            end,
            timezone: Tz::UTC,
            rule: None,
            end_recurring_period: None,
            exceptions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: Arc<Rule>) -> Self {
        self.rule = Some(rule);
        self
    }

    #[must_use]
    pub fn with_end_recurring_period(mut self, end: DateTime<Utc>) -> Self {
        self.end_recurring_period = Some(end);
        self
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    #[must_use]
    pub fn with_exception(mut self, original_start: DateTime<Utc>, exception: Exception) -> Self {
        self.exceptions.insert(original_start, exception);
        self
    }

    /// Parse an event from JSON. Embedded rules are validated while parsing.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Configuration`] for malformed JSON or an
    /// invalid rule, and [`ScheduleError::TemporalOrder`] if the event (or one
    /// of its rescheduled exceptions) does not end after it starts.
    pub fn from_json(json: &str) -> Result<Self> {
        let event: Event = serde_json::from_str(json)
            .map_err(|e| ScheduleError::Configuration(format!("event: {e}")))?;
        event.validate()?;
        Ok(event)
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn is_recurring(&self) -> bool {
        self.rule.is_some()
    }

    /// Check that the event and every rescheduled exception end after they start.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::TemporalOrder`] naming the offending interval.
    pub fn validate(&self) -> Result<()> {
        check_order(&self.title, self.start, self.end)?;
        for exception in self.exceptions.values() {
            if let Exception::Rescheduled { start, end } = exception {
                check_order(&self.title, *start, *end)?;
            }
        }
        Ok(())
    }

    /// The exception recorded for the occurrence originally starting at `original_start`.
    pub fn exception_at(&self, original_start: DateTime<Utc>) -> Option<&Exception> {
        self.exceptions.get(&original_start)
    }

    pub(crate) fn is_rescheduled_at(&self, original_start: DateTime<Utc>) -> bool {
        matches!(
            self.exception_at(original_start),
            Some(Exception::Rescheduled { .. })
        )
    }

    /// A candidate cursor over this event's rule, bounded by its end of recurring period.
    /// `None` for events without a rule.
    pub fn rule_cursor(
        &self,
        config: &EngineConfig,
        direction: Direction,
        from: DateTime<Utc>,
    ) -> Option<RuleCursor> {
        self.rule.as_ref().map(|rule| {
            RuleCursor::seek(
                Arc::clone(rule),
                self.start,
                self.timezone,
                config,
                direction,
                from,
                self.end_recurring_period,
            )
        })
    }

    /// Whether the event's rule (or, without a rule, the event itself)
    /// produces an occurrence originally starting at `original_start`.
    pub fn generates(&self, original_start: DateTime<Utc>, config: &EngineConfig) -> bool {
        match self.rule_cursor(config, Direction::Forward, original_start) {
            Some(cursor) => cursor.peek() == Some(original_start),
            None => original_start == self.start,
        }
    }
}

fn check_order(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(ScheduleError::TemporalOrder {
            title: title.to_string(),
            start,
            end,
        });
    }
    Ok(())
}
