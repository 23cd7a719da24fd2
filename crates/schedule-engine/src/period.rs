//! Calendar periods over a manager: days, weeks, months and years.
//!
//! A [`Period`] is a half-open window `[start, end)` laid out on the
//! configured display timezone. It pulls its occurrences from
//! [`EventListManager::within`] once and caches them.

use std::cell::OnceCell;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::dst::{resolve_local, DstPolicy};
use crate::error::{Result, ScheduleError};
use crate::manager::EventListManager;
use crate::occurrence::Occurrence;

/// Which calendar unit a period covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Day,
    Week,
    Month,
    Year,
    /// An arbitrary `[start, end)` range.
    Custom,
}

/// How an occurrence sits relative to a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceSpan {
    /// Starts and ends inside the period.
    Contained,
    /// Starts inside, ends after.
    StartsWithin,
    /// Started before, ends inside.
    EndsWithin,
    /// Started before and ends after.
    Spans,
}

#[derive(Debug)]
pub struct Period<'m, 'a> {
    manager: &'m EventListManager<'a>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    kind: PeriodKind,
    /// Local date the calendar period was built from; `None` for custom ranges.
    date: Option<NaiveDate>,
    occurrences: OnceCell<Vec<Occurrence<'a>>>,
}

impl<'m, 'a> Period<'m, 'a> {
    /// A custom period.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::TemporalOrder`] when `end` is not after `start`.
    pub fn new(
        manager: &'m EventListManager<'a>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        if end <= start {
            return Err(ScheduleError::TemporalOrder {
                title: "period".to_string(),
                start,
                end,
            });
        }
        Ok(Self::build(manager, start, end, PeriodKind::Custom, None))
    }

    /// The day containing `date` on the display timezone.
    pub fn day(manager: &'m EventListManager<'a>, date: NaiveDate) -> Result<Self> {
        Self::calendar(manager, PeriodKind::Day, date)
    }

    /// The week containing `date`, starting on the configured week start day.
    pub fn week(manager: &'m EventListManager<'a>, date: NaiveDate) -> Result<Self> {
        Self::calendar(manager, PeriodKind::Week, date)
    }

    pub fn month(manager: &'m EventListManager<'a>, date: NaiveDate) -> Result<Self> {
        Self::calendar(manager, PeriodKind::Month, date)
    }

    pub fn year(manager: &'m EventListManager<'a>, date: NaiveDate) -> Result<Self> {
        Self::calendar(manager, PeriodKind::Year, date)
    }

    fn calendar(
        manager: &'m EventListManager<'a>,
        kind: PeriodKind,
        date: NaiveDate,
    ) -> Result<Self> {
        let week_start = manager.config().week_start;
        let (first, next) = match kind {
            PeriodKind::Day => (Some(date), date.succ_opt()),
            PeriodKind::Week => {
                let first = week_start.start_of_week(date);
                (Some(first), first.checked_add_signed(TimeDelta::days(7)))
            }
            PeriodKind::Month => {
                let first = date.with_day(1);
                (first, first.and_then(|d| d.checked_add_months(Months::new(1))))
            }
            PeriodKind::Year => {
                let first = NaiveDate::from_ymd_opt(date.year(), 1, 1);
                (first, first.and_then(|d| d.checked_add_months(Months::new(12))))
            }
            PeriodKind::Custom => (None, None),
        };
        let (Some(first), Some(next)) = (first, next) else {
            return Err(ScheduleError::Configuration(format!(
                "no {kind:?} period around {date}"
            )));
        };
        let start = local_midnight(manager, first)?;
        let end = local_midnight(manager, next)?;
        Ok(Self::build(manager, start, end, kind, Some(first)))
    }

    fn build(
        manager: &'m EventListManager<'a>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: PeriodKind,
        date: Option<NaiveDate>,
    ) -> Self {
        Self {
            manager,
            start,
            end,
            kind,
            date,
            occurrences: OnceCell::new(),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn kind(&self) -> PeriodKind {
        self.kind
    }

    /// First local date of a calendar period.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// Occurrences overlapping the period, ascending by start.
    ///
    /// Computed on first use. Occurrences starting exactly at the period's end
    /// belong to the next period and are left out.
    pub fn occurrences(&self) -> &[Occurrence<'a>] {
        self.occurrences.get_or_init(|| {
            let mut occurrences = self.manager.within(self.start, self.end);
            occurrences.retain(|occurrence| occurrence.start < self.end);
            tracing::trace!(
                start = %self.start,
                end = %self.end,
                count = occurrences.len(),
                "period occurrences loaded"
            );
            occurrences
        })
    }

    pub fn has_occurrences(&self) -> bool {
        !self.occurrences().is_empty()
    }

    /// How `occurrence` overlaps the period, or `None` if it does not.
    pub fn classify(&self, occurrence: &Occurrence<'_>) -> Option<OccurrenceSpan> {
        if !occurrence.overlaps(self.start, self.end) {
            return None;
        }
        let starts_within = self.start <= occurrence.start && occurrence.start < self.end;
        let ends_within = self.start < occurrence.end && occurrence.end <= self.end;
        Some(match (starts_within, ends_within) {
            (true, true) => OccurrenceSpan::Contained,
            (true, false) => OccurrenceSpan::StartsWithin,
            (false, true) => OccurrenceSpan::EndsWithin,
            (false, false) => OccurrenceSpan::Spans,
        })
    }

    /// Every occurrence of the period paired with how it overlaps it.
    pub fn occurrence_partials(&self) -> Vec<(&Occurrence<'a>, OccurrenceSpan)> {
        self.occurrences()
            .iter()
            .filter_map(|occurrence| Some((occurrence, self.classify(occurrence)?)))
            .collect()
    }

    // ── Navigation ──────────────────────────────────────────────────────

    /// The period of the same kind right after this one.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Configuration`] when the date range runs out.
    pub fn next(&self) -> Result<Self> {
        match self.date {
            Some(_) => self.shifted_calendar(1),
            None => {
                let end = self
                    .end
                    .checked_add_signed(self.end - self.start)
                    .ok_or_else(|| self.out_of_range())?;
                Ok(Self::build(self.manager, self.end, end, PeriodKind::Custom, None))
            }
        }
    }

    /// The period of the same kind right before this one.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Configuration`] when the date range runs out.
    pub fn prev(&self) -> Result<Self> {
        match self.date {
            Some(_) => self.shifted_calendar(-1),
            None => {
                let start = self
                    .start
                    .checked_sub_signed(self.end - self.start)
                    .ok_or_else(|| self.out_of_range())?;
                Ok(Self::build(self.manager, start, self.start, PeriodKind::Custom, None))
            }
        }
    }

    fn out_of_range(&self) -> ScheduleError {
        ScheduleError::Configuration(format!(
            "no {:?} period next to {}..{}",
            self.kind, self.start, self.end
        ))
    }

    fn shifted_calendar(&self, step: i32) -> Result<Self> {
        let first = self.date.ok_or_else(|| {
            ScheduleError::Configuration("custom periods have no calendar date".to_string())
        })?;
        let shifted = match self.kind {
            PeriodKind::Day => first.checked_add_signed(TimeDelta::days(i64::from(step))),
            PeriodKind::Week => first.checked_add_signed(TimeDelta::days(7 * i64::from(step))),
            PeriodKind::Month => shift_months(first, step),
            PeriodKind::Year => shift_months(first, step * 12),
            PeriodKind::Custom => None,
        };
        let date = shifted.ok_or_else(|| {
            ScheduleError::Configuration(format!("no {:?} period next to {first}", self.kind))
        })?;
        Self::calendar(self.manager, self.kind, date)
    }

    // ── Decomposition ───────────────────────────────────────────────────

    /// The days of a week or month.
    pub fn days(&self) -> Result<Vec<Self>> {
        self.local_dates()
            .into_iter()
            .map(|date| Self::day(self.manager, date))
            .collect()
    }

    /// The weeks touching a month (the first and last may spill over).
    pub fn weeks(&self) -> Result<Vec<Self>> {
        let week_start = self.manager.config().week_start;
        let mut firsts: Vec<NaiveDate> = self
            .local_dates()
            .into_iter()
            .map(|date| week_start.start_of_week(date))
            .collect();
        firsts.dedup();
        firsts
            .into_iter()
            .map(|date| Self::week(self.manager, date))
            .collect()
    }

    /// The months of a year.
    pub fn months(&self) -> Result<Vec<Self>> {
        let Some(first) = self.date else {
            return Ok(Vec::new());
        };
        (0..12)
            .map_while(|offset| first.checked_add_months(Months::new(offset)))
            .filter(|date| *date < self.date_after())
            .map(|date| Self::month(self.manager, date))
            .collect()
    }

    /// Local dates covered by a calendar period.
    fn local_dates(&self) -> Vec<NaiveDate> {
        let Some(first) = self.date else {
            return Vec::new();
        };
        let after = self.date_after();
        first.iter_days().take_while(|date| *date < after).collect()
    }

    /// First local date after a calendar period.
    fn date_after(&self) -> NaiveDate {
        self.end
            .with_timezone(&self.manager.config().display_timezone)
            .date_naive()
    }
}

fn shift_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    let magnitude = Months::new(months.unsigned_abs());
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

/// UTC instant of `date`'s first wall-clock moment on the display timezone.
fn local_midnight(manager: &EventListManager<'_>, date: NaiveDate) -> Result<DateTime<Utc>> {
    let tz = manager.config().display_timezone;
    resolve_local(&tz, date.and_time(NaiveTime::MIN), DstPolicy::ShiftForward).ok_or_else(|| {
        ScheduleError::InvalidTimezone(format!("{tz} has no wall-clock time on {date}"))
    })
}
