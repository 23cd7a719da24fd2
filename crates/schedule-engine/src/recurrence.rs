//! Seekable candidate generation for a [`Rule`].
//!
//! A [`RuleCursor`] turns a rule and an anchor (the event's first start) into
//! a lazy sequence of candidate start times. It never replays the rule from the
//! anchor: the *period* (the day, week, month, year or sub-daily step) holding
//! the seek time is computed directly, and only that period's candidates are
//! materialized. Cursors run forward (candidates `>= from`, ascending) or
//! backward (candidates `< from`, descending).
//!
//! The cursor's position is a plain value ([`CursorState`]) that can be
//! captured and later restored with [`RuleCursor::resume`].

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, WeekStartDay};
use crate::dst::{resolve_local, DstPolicy};
use crate::rule::{days_in_month, resolve_month_day, Frequency, Rule};

/// Iteration order of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Candidates on or after the seek time, ascending.
    Forward,
    /// Candidates strictly before the seek time, descending.
    Backward,
}

/// Resumable position of a [`RuleCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    pub direction: Direction,
    /// Index of the current period (0 is the anchor's period).
    pub period: i64,
    /// Forward: index of the current slot. Backward: number of unvisited slots.
    pub position: usize,
    /// Ordinal of the period's first slot; only tracked for rules with a count.
    pub ordinal_base: Option<u64>,
    pub exhausted: bool,
}

/// Lazy, seekable sequence of candidate start times for one rule.
///
/// Slots are wall-clock candidates of the current period resolved to UTC;
/// a slot is `None` when [`DstPolicy::Skip`] drops it. Dropped slots still
/// consume their ordinal, so `COUNT` keeps counting the rule's positions.
#[derive(Debug, Clone)]
pub struct RuleCursor {
    rule: Arc<Rule>,
    anchor: DateTime<Utc>,
    local_anchor: NaiveDateTime,
    timezone: Tz,
    dst_policy: DstPolicy,
    week_start: WeekStartDay,
    max_empty_periods: u32,
    direction: Direction,
    from: DateTime<Utc>,
    limit: Option<DateTime<Utc>>,
    period: i64,
    slots: Vec<Option<DateTime<Utc>>>,
    position: usize,
    ordinal_base: Option<u64>,
    exhausted: bool,
}

/// Start a cursor for `rule` anchored at `anchor_start` in UTC with default options.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use chrono::{TimeZone, Utc};
/// use schedule_engine::recurrence::{generate, Direction};
/// use schedule_engine::rule::{Frequency, Rule};
///
/// let rule = Arc::new(Rule::new(Frequency::Daily));
/// let anchor = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
/// let from = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
/// let mut cursor = generate(&rule, anchor, Direction::Forward, from);
/// assert_eq!(cursor.next(), Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()));
/// ```
pub fn generate(
    rule: &Arc<Rule>,
    anchor_start: DateTime<Utc>,
    direction: Direction,
    from_time: DateTime<Utc>,
) -> RuleCursor {
    RuleCursor::seek(
        Arc::clone(rule),
        anchor_start,
        Tz::UTC,
        &EngineConfig::default(),
        direction,
        from_time,
        None,
    )
}

impl RuleCursor {
    /// Position a cursor at `from` without stepping from the anchor.
    ///
    /// `horizon` is an extra inclusive upper bound on candidates (an event's
    /// end of recurring period); the effective bound is the earlier of it and
    /// the rule's `UNTIL`. A forward cursor seeded after that bound is
    /// exhausted immediately.
    pub fn seek(
        rule: Arc<Rule>,
        anchor: DateTime<Utc>,
        timezone: Tz,
        config: &EngineConfig,
        direction: Direction,
        from: DateTime<Utc>,
        horizon: Option<DateTime<Utc>>,
    ) -> Self {
        let mut cursor = Self::unpositioned(rule, anchor, timezone, config, direction, from, horizon);
        match direction {
            Direction::Forward => cursor.start_forward(),
            Direction::Backward => cursor.start_backward(),
        }
        cursor
    }

    /// Rebuild a cursor from a previously captured [`CursorState`].
    ///
    /// The rule, anchor, timezone, config, `from` and `horizon` must match the
    /// ones the state was captured from.
    pub fn resume(
        rule: Arc<Rule>,
        anchor: DateTime<Utc>,
        timezone: Tz,
        config: &EngineConfig,
        from: DateTime<Utc>,
        horizon: Option<DateTime<Utc>>,
        state: CursorState,
    ) -> Self {
        let mut cursor =
            Self::unpositioned(rule, anchor, timezone, config, state.direction, from, horizon);
        cursor.exhausted = state.exhausted;
        if !cursor.exhausted {
            cursor.load(state.period, state.ordinal_base);
            cursor.position = state.position.min(cursor.slots.len());
            cursor.settle();
        }
        cursor
    }

    fn unpositioned(
        rule: Arc<Rule>,
        anchor: DateTime<Utc>,
        timezone: Tz,
        config: &EngineConfig,
        direction: Direction,
        from: DateTime<Utc>,
        horizon: Option<DateTime<Utc>>,
    ) -> Self {
        let limit = match (rule.until(), horizon) {
            (Some(until), Some(horizon)) => Some(until.min(horizon)),
            (until, horizon) => until.or(horizon),
        };
        Self {
            local_anchor: anchor.with_timezone(&timezone).naive_local(),
            rule,
            anchor,
            timezone,
            dst_policy: config.dst_policy,
            week_start: config.week_start,
            max_empty_periods: config.max_empty_periods.max(1),
            direction,
            from,
            limit,
            period: 0,
            slots: Vec::new(),
            position: 0,
            ordinal_base: None,
            exhausted: false,
        }
    }

    /// The current candidate, without consuming it.
    pub fn peek(&self) -> Option<DateTime<Utc>> {
        if self.exhausted {
            return None;
        }
        let index = match self.direction {
            Direction::Forward => self.position,
            Direction::Backward => self.position.checked_sub(1)?,
        };
        self.slots.get(index).copied().flatten()
    }

    /// Move past the current candidate.
    pub fn advance(&mut self) {
        if self.exhausted {
            return;
        }
        match self.direction {
            Direction::Forward => self.position += 1,
            Direction::Backward => self.position = self.position.saturating_sub(1),
        }
        self.settle();
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn state(&self) -> CursorState {
        CursorState {
            direction: self.direction,
            period: self.period,
            position: self.position,
            ordinal_base: self.ordinal_base,
            exhausted: self.exhausted,
        }
    }

    // ── Seeking ─────────────────────────────────────────────────────────

    fn start_forward(&mut self) {
        if self.limit.is_some_and(|limit| self.from > limit) {
            self.exhaust("seek time is past the recurrence limit");
            return;
        }
        // One period of slack: a DST shift can move a candidate across the boundary.
        let period = (self.period_of(self.from) - 1).max(0);
        let ordinal_base = match self.rule.count() {
            None => None,
            Some(count) => match self.ordinal_at(period, u64::from(count)) {
                Some(base) => Some(base),
                None => {
                    self.exhaust("count reached before the seek time");
                    return;
                }
            },
        };
        self.load(period, ordinal_base);
        self.position = 0;
        self.settle();
    }

    fn start_backward(&mut self) {
        let ceiling = match self.limit {
            Some(limit) if limit < self.from => limit,
            _ => self.from,
        };
        let mut period = self.period_of(ceiling) + 1;
        if period < 0 {
            self.exhaust("seek time is before the anchor");
            return;
        }
        let ordinal_base = match self.rule.count() {
            None => None,
            Some(count) => {
                let (last, base) = self.last_counted_period(period, u64::from(count));
                period = last;
                Some(base)
            }
        };
        self.load(period, ordinal_base);
        self.position = self.slots.len();
        self.settle();
    }

    /// Ordinal of the first slot of `period`, or `None` once `count` slots precede it.
    fn ordinal_at(&self, period: i64, count: u64) -> Option<u64> {
        if !self.rule.has_by_rules() {
            let base = u64::try_from(period).ok()?;
            return (base < count).then_some(base);
        }
        // With by-rules the number of slots per period varies, so count them.
        // The walk ends at `count` slots at the latest.
        let mut seen = 0u64;
        let mut empty_run = 0u32;
        let mut p = 0;
        while p < period {
            let n = self.slots_for(p).len() as u64;
            seen += n;
            if seen >= count {
                return None;
            }
            empty_run = if n == 0 { empty_run + 1 } else { 0 };
            if empty_run > self.max_empty_periods {
                return None;
            }
            p = self.following_period(p)?;
        }
        Some(seen)
    }

    /// Clamp `period` to the one holding the last counted slot.
    fn last_counted_period(&self, period: i64, count: u64) -> (i64, u64) {
        if !self.rule.has_by_rules() {
            let last = i64::try_from(count.saturating_sub(1)).unwrap_or(i64::MAX);
            let clamped = period.min(last);
            return (clamped, u64::try_from(clamped).unwrap_or(0));
        }
        let mut seen = 0u64;
        let mut empty_run = 0u32;
        let mut p = 0;
        while p < period {
            let n = self.slots_for(p).len() as u64;
            if seen + n >= count {
                return (p, seen);
            }
            seen += n;
            empty_run = if n == 0 { empty_run + 1 } else { 0 };
            if empty_run > self.max_empty_periods {
                return (p, seen);
            }
            match self.following_period(p) {
                Some(next) => p = next,
                None => return (p, seen),
            }
        }
        (period, seen)
    }

    // ── Stepping ────────────────────────────────────────────────────────

    fn load(&mut self, period: i64, ordinal_base: Option<u64>) {
        self.period = period;
        self.slots = self.slots_for(period);
        self.ordinal_base = ordinal_base;
    }

    /// Move to the nearest valid candidate in the cursor's direction,
    /// starting at the current position, or mark the cursor exhausted.
    fn settle(&mut self) {
        match self.direction {
            Direction::Forward => self.settle_forward(),
            Direction::Backward => self.settle_backward(),
        }
    }

    fn settle_forward(&mut self) {
        let mut empty_run = 0u32;
        while !self.exhausted {
            let Some(slot) = self.slots.get(self.position).copied() else {
                empty_run = if self.slots.is_empty() { empty_run + 1 } else { 0 };
                if empty_run > self.max_empty_periods {
                    self.give_up();
                    break;
                }
                if self
                    .limit
                    .is_some_and(|limit| self.period_of(limit) < self.period)
                {
                    self.exhaust("passed the recurrence limit");
                    break;
                }
                let Some(period) = self.following_period(self.period) else {
                    self.give_up();
                    break;
                };
                let next_base = self
                    .ordinal_base
                    .map(|base| base + self.slots.len() as u64);
                self.load(period, next_base);
                self.position = 0;
                continue;
            };
            if self.beyond_count(self.position) {
                self.exhaust("count reached");
                break;
            }
            if let Some(at) = slot {
                if self.limit.is_some_and(|limit| at > limit) {
                    self.exhaust("passed the recurrence limit");
                    break;
                }
                if at >= self.from {
                    break;
                }
            }
            self.position += 1;
        }
    }

    fn settle_backward(&mut self) {
        let mut empty_run = 0u32;
        while !self.exhausted {
            if self.position == 0 {
                if self.period <= 0 {
                    self.exhaust("reached the anchor");
                    break;
                }
                empty_run = if self.slots.is_empty() { empty_run + 1 } else { 0 };
                if empty_run > self.max_empty_periods {
                    self.give_up();
                    break;
                }
                let Some(period) = self.preceding_period(self.period) else {
                    self.give_up();
                    break;
                };
                let slots = self.slots_for(period);
                self.ordinal_base = self
                    .ordinal_base
                    .map(|base| base.saturating_sub(slots.len() as u64));
                self.period = period;
                self.position = slots.len();
                self.slots = slots;
                continue;
            }
            let index = self.position - 1;
            if !self.beyond_count(index) {
                if let Some(at) = self.slots.get(index).copied().flatten() {
                    let within_limit = self.limit.is_none_or(|limit| at <= limit);
                    if within_limit && at < self.from {
                        break;
                    }
                }
            }
            self.position -= 1;
        }
    }

    fn beyond_count(&self, index: usize) -> bool {
        match (self.ordinal_base, self.rule.count()) {
            (Some(base), Some(count)) => base + index as u64 >= u64::from(count),
            _ => false,
        }
    }

    fn give_up(&mut self) {
        tracing::warn!(
            rule = %self.rule,
            limit = self.max_empty_periods,
            "no candidates within the empty-period limit, treating rule as exhausted"
        );
        self.exhaust("too many empty periods");
    }

    fn exhaust(&mut self, reason: &'static str) {
        tracing::trace!(rule = %self.rule, anchor = %self.anchor, reason, "rule cursor exhausted");
        self.exhausted = true;
        self.slots.clear();
        self.position = 0;
    }

    // ── Period arithmetic ───────────────────────────────────────────────

    /// Index of the period containing `at` (negative before the anchor).
    fn period_of(&self, at: DateTime<Utc>) -> i64 {
        let interval = i64::from(self.rule.interval());
        if let Some(step) = self.rule.frequency().fixed_step_seconds() {
            return (at - self.anchor).num_seconds().div_euclid(step * interval);
        }
        let date = at.with_timezone(&self.timezone).date_naive();
        let anchor = self.local_anchor.date();
        let units = match self.rule.frequency() {
            Frequency::Daily => (date - anchor).num_days(),
            Frequency::Weekly => {
                let weeks = self.week_start.start_of_week(date)
                    - self.week_start.start_of_week(anchor);
                weeks.num_days() / 7
            }
            Frequency::Monthly => months_between(anchor, date),
            Frequency::Yearly => i64::from(date.year() - anchor.year()),
            Frequency::Hourly | Frequency::Minutely | Frequency::Secondly => 0,
        };
        units.div_euclid(interval)
    }

    /// Instant of a fixed-step period; `None` for calendar frequencies.
    fn step_instant(&self, period: i64) -> Option<DateTime<Utc>> {
        let step = self.rule.frequency().fixed_step_seconds()?;
        period
            .checked_mul(i64::from(self.rule.interval()))
            .and_then(|units| units.checked_mul(step))
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| self.anchor.checked_add_signed(delta))
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.timezone).date_naive()
    }

    /// Sub-daily rules filter whole dates, so periods on rejected dates can be
    /// jumped over instead of visited one step at a time.
    fn skips_dates(&self) -> bool {
        self.rule.frequency().fixed_step_seconds().is_some() && self.rule.has_by_rules()
    }

    /// The next period after `period` that can hold a candidate, or `None`
    /// when no accepted date lies within `max_empty_periods` days.
    fn following_period(&self, period: i64) -> Option<i64> {
        let next = period.checked_add(1)?;
        if !self.skips_dates() {
            return Some(next);
        }
        let at = self.step_instant(next)?;
        let today = self.local_date(at);
        let date = self.accepted_date(today, Direction::Forward)?;
        if date == today {
            return Some(next);
        }
        let midnight = resolve_local(
            &self.timezone,
            date.and_time(NaiveTime::MIN),
            DstPolicy::ShiftForward,
        )?;
        let mut first = self.period_of(midnight);
        if self.step_instant(first)? < midnight {
            first += 1;
        }
        Some(first.max(next))
    }

    /// Mirror of [`Self::following_period`] for backward stepping.
    fn preceding_period(&self, period: i64) -> Option<i64> {
        let prev = period.checked_sub(1)?;
        if !self.skips_dates() || prev < 0 {
            return Some(prev);
        }
        let at = self.step_instant(prev)?;
        let today = self.local_date(at);
        let date = self.accepted_date(today, Direction::Backward)?;
        if date == today {
            return Some(prev);
        }
        let next_midnight = resolve_local(
            &self.timezone,
            date.succ_opt()?.and_time(NaiveTime::MIN),
            DstPolicy::ShiftForward,
        )?;
        let mut last = self.period_of(next_midnight);
        if self.step_instant(last)? >= next_midnight {
            last -= 1;
        }
        Some(last.min(prev))
    }

    /// Nearest date from `date` on (or back) that the rule's by-rules accept.
    fn accepted_date(&self, date: NaiveDate, direction: Direction) -> Option<NaiveDate> {
        let mut date = date;
        for _ in 0..=self.max_empty_periods {
            if self.rule.matches_date(date) {
                return Some(date);
            }
            date = match direction {
                Direction::Forward => date.succ_opt()?,
                Direction::Backward => date.pred_opt()?,
            };
        }
        None
    }

    /// Candidates of `period`, ascending, resolved to UTC.
    fn slots_for(&self, period: i64) -> Vec<Option<DateTime<Utc>>> {
        if period < 0 {
            return Vec::new();
        }
        if self.rule.frequency().fixed_step_seconds().is_some() {
            return self
                .step_instant(period)
                .filter(|at| {
                    !self.rule.has_by_rules() || self.rule.matches_date(self.local_date(*at))
                })
                .map(|at| vec![Some(at)])
                .unwrap_or_default();
        }
        let Some(units) = period.checked_mul(i64::from(self.rule.interval())) else {
            return Vec::new();
        };

        let time = self.local_anchor.time();
        self.period_dates(units)
            .into_iter()
            .map(|date| date.and_time(time))
            .filter(|local| *local >= self.local_anchor)
            .map(|local| resolve_local(&self.timezone, local, self.dst_policy))
            .collect()
    }

    /// Wall-clock dates of the period `units` frequency units after the anchor's.
    fn period_dates(&self, units: i64) -> Vec<NaiveDate> {
        let rule = &self.rule;
        let anchor = self.local_anchor.date();
        match rule.frequency() {
            Frequency::Daily => TimeDelta::try_days(units)
                .and_then(|delta| anchor.checked_add_signed(delta))
                .filter(|date| rule.matches_date(*date))
                .into_iter()
                .collect(),
            Frequency::Weekly => {
                let Some(week) = units
                    .checked_mul(7)
                    .and_then(TimeDelta::try_days)
                    .and_then(|delta| {
                        self.week_start
                            .start_of_week(anchor)
                            .checked_add_signed(delta)
                    })
                else {
                    return Vec::new();
                };
                let weekdays = if rule.by_weekday().is_empty() {
                    vec![anchor.weekday()]
                } else {
                    rule.by_weekday().to_vec()
                };
                let mut dates: Vec<NaiveDate> = weekdays
                    .into_iter()
                    .filter_map(|wd| {
                        week.checked_add_signed(TimeDelta::days(self.week_start.days_from_start(wd)))
                    })
                    .filter(|date| rule.by_month().is_empty() || rule.by_month().contains(&date.month()))
                    .collect();
                dates.sort_unstable();
                dates
            }
            Frequency::Monthly => {
                let Some(first) = add_months(anchor, units) else {
                    return Vec::new();
                };
                if !rule.by_month().is_empty() && !rule.by_month().contains(&first.month()) {
                    return Vec::new();
                }
                self.month_dates(first.year(), first.month())
            }
            Frequency::Yearly => {
                let Some(year) = i32::try_from(units)
                    .ok()
                    .and_then(|units| anchor.year().checked_add(units))
                else {
                    return Vec::new();
                };
                let months: Vec<u32> = if !rule.by_month().is_empty() {
                    rule.by_month().to_vec()
                } else if !rule.by_weekday().is_empty() || !rule.by_month_day().is_empty() {
                    (1..=12).collect()
                } else {
                    vec![anchor.month()]
                };
                months
                    .into_iter()
                    .flat_map(|month| self.month_dates(year, month))
                    .collect()
            }
            Frequency::Hourly | Frequency::Minutely | Frequency::Secondly => Vec::new(),
        }
    }

    /// Dates of one month: the anchor's day (clamped to the month's length)
    /// unless BYMONTHDAY/BYDAY pick the days.
    fn month_dates(&self, year: i32, month: u32) -> Vec<NaiveDate> {
        let rule = &self.rule;
        let dim = days_in_month(year, month);
        if rule.by_month_day().is_empty() && rule.by_weekday().is_empty() {
            let day = self.local_anchor.day().min(dim);
            return NaiveDate::from_ymd_opt(year, month, day).into_iter().collect();
        }
        let days: Vec<u32> = if rule.by_month_day().is_empty() {
            (1..=dim).collect()
        } else {
            rule.by_month_day()
                .iter()
                .filter_map(|md| resolve_month_day(year, month, *md))
                .collect()
        };
        let mut dates: Vec<NaiveDate> = days
            .into_iter()
            .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
            .filter(|date| rule.by_weekday().is_empty() || rule.by_weekday().contains(&date.weekday()))
            .collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }
}

impl Iterator for RuleCursor {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let candidate = self.peek()?;
        self.advance();
        Some(candidate)
    }
}

/// Whole calendar months from `a`'s month to `b`'s month.
fn months_between(a: NaiveDate, b: NaiveDate) -> i64 {
    i64::from(b.year() - a.year()) * 12 + i64::from(b.month()) - i64::from(a.month())
}

/// First day of the month `months` after `date`'s month.
fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + months;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}
