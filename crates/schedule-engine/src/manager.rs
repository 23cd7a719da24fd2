//! Merging the occurrence streams of many events.
//!
//! [`EventListManager`] keeps one cursor per event and performs a k-way merge
//! over them with a binary heap: every yielded occurrence costs O(log k) and at
//! most one pending occurrence per event is held, regardless of how many
//! occurrences the rules could produce.
//!
//! Ordering is by start time (ascending for [`EventListManager::occurrences_after`],
//! descending for [`EventListManager::occurrences_before`]); ties go to the
//! event that came first in the input.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::iter::FusedIterator;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::event::{Event, Exception};
use crate::occurrence::{materialize_at, Occurrence};
use crate::recurrence::{Direction, RuleCursor};

/// Read-only view over an ordered list of events.
#[derive(Debug, Clone)]
pub struct EventListManager<'a> {
    events: Vec<&'a Event>,
    config: EngineConfig,
}

impl<'a> EventListManager<'a> {
    /// Build a manager with the default [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::ScheduleError::TemporalOrder`] for the first event
    /// (or rescheduled exception) that does not end after it starts.
    pub fn new<I>(events: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        Self::with_config(events, EngineConfig::default())
    }

    /// Build a manager with an explicit configuration.
    ///
    /// Every event is validated up front so that iteration itself never fails.
    ///
    /// # Errors
    ///
    /// Same as [`EventListManager::new`].
    pub fn with_config<I>(events: I, config: EngineConfig) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let events: Vec<&'a Event> = events.into_iter().collect();
        for event in &events {
            event.validate()?;
            for original_start in event.exceptions.keys() {
                if !event.generates(*original_start, &config) {
                    tracing::warn!(
                        title = %event.title,
                        %original_start,
                        "exception does not match any occurrence, ignoring it"
                    );
                }
            }
        }
        tracing::debug!(events = events.len(), "event list manager ready");
        Ok(Self { events, config })
    }

    pub fn events(&self) -> &[&'a Event] {
        &self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Occurrences that end after `from`, in ascending start order.
    ///
    /// Occurrences already under way at `from` are included. The sequence is
    /// lazy and unbounded for rules without `COUNT`, `UNTIL` or an end of
    /// recurring period; bound it with [`Iterator::take`] or use
    /// [`EventListManager::within`].
    pub fn occurrences_after(&self, from: DateTime<Utc>) -> Occurrences<'a> {
        Occurrences::new(&self.events, &self.config, Direction::Forward, from)
    }

    /// Occurrences that start before `from`, in descending start order.
    pub fn occurrences_before(&self, from: DateTime<Utc>) -> Occurrences<'a> {
        Occurrences::new(&self.events, &self.config, Direction::Backward, from)
    }

    /// Occurrences overlapping the closed window `[start, end]`, ascending.
    ///
    /// This is [`EventListManager::occurrences_after`] at `start`, cut off at
    /// the first occurrence starting after `end`. An `end` before `start`
    /// yields nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use chrono::{TimeZone, Utc};
    /// use schedule_engine::{Event, EventListManager, Frequency, Rule};
    ///
    /// let daily = Event::new(
    ///     "Standup",
    ///     Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
    ///     Utc.with_ymd_and_hms(2026, 3, 2, 9, 15, 0).unwrap(),
    /// )
    /// .with_rule(Arc::new(Rule::new(Frequency::Daily)));
    /// let events = [daily];
    /// let manager = EventListManager::new(&events).unwrap();
    /// let week = manager.within(
    ///     Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap(),
    ///     Utc.with_ymd_and_hms(2026, 3, 15, 23, 59, 59).unwrap(),
    /// );
    /// assert_eq!(week.len(), 7);
    /// ```
    pub fn within(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Occurrence<'a>> {
        if end < start {
            return Vec::new();
        }
        self.occurrences_after(start)
            .take_while(|occurrence| occurrence.start <= end)
            .collect()
    }
}

// ── Merged sequence ─────────────────────────────────────────────────────────

/// Lazy merged sequence returned by the manager's queries.
///
/// Nothing is computed until the first call to `next()`.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    cursors: Vec<EventCursor<'a>>,
    heap: BinaryHeap<HeapEntry>,
    config: EngineConfig,
    direction: Direction,
    primed: bool,
}

impl<'a> Occurrences<'a> {
    fn new(
        events: &[&'a Event],
        config: &EngineConfig,
        direction: Direction,
        from: DateTime<Utc>,
    ) -> Self {
        let cursors = events
            .iter()
            .enumerate()
            .map(|(index, event)| EventCursor::new(event, index, direction, from))
            .collect();
        Self {
            cursors,
            heap: BinaryHeap::with_capacity(events.len()),
            config: config.clone(),
            direction,
            primed: false,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn prime(&mut self) {
        for cursor in &mut self.cursors {
            cursor.prime(&self.config);
            if let Some(start) = cursor.pending_start() {
                self.heap.push(HeapEntry {
                    start,
                    index: cursor.index,
                    direction: self.direction,
                });
            }
        }
        self.primed = true;
    }
}

impl<'a> Iterator for Occurrences<'a> {
    type Item = Occurrence<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.primed {
            self.prime();
        }
        let entry = self.heap.pop()?;
        let cursor = &mut self.cursors[entry.index];
        let occurrence = cursor.take()?;
        if let Some(start) = cursor.pending_start() {
            self.heap.push(HeapEntry {
                start,
                index: entry.index,
                direction: self.direction,
            });
        }
        Some(occurrence)
    }
}

impl FusedIterator for Occurrences<'_> {}

/// Heap key: the pending start of one cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    start: DateTime<Utc>,
    index: usize,
    direction: Direction,
}

impl Ord for HeapEntry {
    // `BinaryHeap` pops the greatest entry: the earliest start going forward,
    // the latest going backward, and the lowest input index on ties.
    fn cmp(&self, other: &Self) -> Ordering {
        let by_start = match self.direction {
            Direction::Forward => other.start.cmp(&self.start),
            Direction::Backward => self.start.cmp(&other.start),
        };
        by_start.then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Per-event cursor ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum CursorPhase<'a> {
    /// Nothing looked at yet.
    Pending,
    /// Holds the next occurrence of this event.
    Active(Occurrence<'a>),
    Exhausted,
}

/// Source of generated (rule or single) start times.
#[derive(Debug, Clone)]
enum Candidates {
    Rule(RuleCursor),
    Single(Option<DateTime<Utc>>),
}

impl Candidates {
    fn peek(&self) -> Option<DateTime<Utc>> {
        match self {
            Candidates::Rule(cursor) => cursor.peek(),
            Candidates::Single(start) => *start,
        }
    }

    fn advance(&mut self) {
        match self {
            Candidates::Rule(cursor) => cursor.advance(),
            Candidates::Single(start) => *start = None,
        }
    }
}

#[derive(Debug, Clone)]
struct EventCursor<'a> {
    event: &'a Event,
    index: usize,
    direction: Direction,
    from: DateTime<Utc>,
    phase: CursorPhase<'a>,
    candidates: Candidates,
    /// Rescheduled occurrences in iteration order, merged with `candidates`.
    moved: VecDeque<Occurrence<'a>>,
}

impl<'a> EventCursor<'a> {
    fn new(event: &'a Event, index: usize, direction: Direction, from: DateTime<Utc>) -> Self {
        Self {
            event,
            index,
            direction,
            from,
            phase: CursorPhase::Pending,
            candidates: Candidates::Single(None),
            moved: VecDeque::new(),
        }
    }

    /// Seek the candidate source and collect the rescheduled occurrences in range.
    fn prime(&mut self, config: &EngineConfig) {
        if !matches!(self.phase, CursorPhase::Pending) {
            return;
        }
        let event = self.event;
        // Going forward, an occurrence still running at `from` counts, so seek
        // one duration earlier and drop the candidates that end by `from`.
        let seek = match self.direction {
            Direction::Forward => self
                .from
                .checked_sub_signed(event.duration())
                .unwrap_or(self.from),
            Direction::Backward => self.from,
        };
        self.candidates = match event.rule_cursor(config, self.direction, seek) {
            Some(cursor) => Candidates::Rule(cursor),
            None => Candidates::Single(Some(event.start)),
        };

        let mut moved: Vec<Occurrence<'a>> = event
            .exceptions
            .iter()
            .filter(|(_, exception)| matches!(exception, Exception::Rescheduled { .. }))
            .map(|(original_start, _)| *original_start)
            .filter(|original_start| event.generates(*original_start, config))
            .map(|original_start| materialize_at(event, self.index, original_start))
            .filter(|occurrence| self.in_range(occurrence))
            .collect();
        moved.sort_by_key(|occurrence| (occurrence.start, occurrence.original_start));
        if self.direction == Direction::Backward {
            moved.reverse();
        }
        self.moved = moved.into();

        self.fetch();
    }

    fn in_range(&self, occurrence: &Occurrence<'_>) -> bool {
        match self.direction {
            Direction::Forward => occurrence.end > self.from,
            Direction::Backward => occurrence.start < self.from,
        }
    }

    /// The next generated occurrence, without consuming its candidate.
    /// Candidates that were rescheduled are skipped; their moved copy lives in `moved`.
    fn next_generated(&mut self) -> Option<Occurrence<'a>> {
        while let Some(candidate) = self.candidates.peek() {
            if !self.event.is_rescheduled_at(candidate) {
                let occurrence = materialize_at(self.event, self.index, candidate);
                if self.in_range(&occurrence) {
                    return Some(occurrence);
                }
            }
            self.candidates.advance();
        }
        None
    }

    /// Load the next occurrence into the cursor, choosing between the
    /// generated stream and the rescheduled queue.
    fn fetch(&mut self) {
        let generated = self.next_generated();
        let take_moved = match (&generated, self.moved.front()) {
            (Some(generated), Some(moved)) => match self.direction {
                Direction::Forward => moved.start < generated.start,
                Direction::Backward => moved.start > generated.start,
            },
            (None, Some(_)) => true,
            (_, None) => false,
        };
        let next = if take_moved {
            self.moved.pop_front()
        } else {
            if generated.is_some() {
                self.candidates.advance();
            }
            generated
        };
        self.phase = match next {
            Some(occurrence) => CursorPhase::Active(occurrence),
            None => {
                tracing::trace!(title = %self.event.title, "event cursor exhausted");
                CursorPhase::Exhausted
            }
        };
    }

    fn pending_start(&self) -> Option<DateTime<Utc>> {
        match &self.phase {
            CursorPhase::Active(occurrence) => Some(occurrence.start),
            CursorPhase::Pending | CursorPhase::Exhausted => None,
        }
    }

    /// Hand out the pending occurrence and load the one after it.
    fn take(&mut self) -> Option<Occurrence<'a>> {
        match std::mem::replace(&mut self.phase, CursorPhase::Exhausted) {
            CursorPhase::Active(occurrence) => {
                self.fetch();
                Some(occurrence)
            }
            other => {
                self.phase = other;
                None
            }
        }
    }
}
