//! Concrete occurrences of an event.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::event::{Event, Exception};

/// One concrete, time-bounded instance of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence<'a> {
    pub event: &'a Event,
    /// Position of `event` in the input the occurrence was merged from.
    /// Only meaningful for occurrences produced by an
    /// [`EventListManager`](crate::EventListManager); [`materialize`] sets it to 0.
    pub event_index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Start generated by the rule; the key exceptions are stored under.
    pub original_start: DateTime<Utc>,
    pub original_end: DateTime<Utc>,
    pub is_cancelled: bool,
}

impl Occurrence<'_> {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Whether an exception moved or resized this occurrence.
    pub fn is_moved(&self) -> bool {
        self.start != self.original_start || self.end != self.original_end
    }

    /// Whether the half-open occurrence `[start, end)` overlaps `[from, to)`.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && self.end > from
    }
}

/// Build the occurrence of `event` generated at `candidate_start`.
///
/// The end is `candidate_start` plus the event's duration. An exception keyed
/// by `candidate_start` either flags the occurrence as cancelled or replaces
/// its start and end; `original_start` always keeps `candidate_start`.
///
/// The event is materialized on its own, outside any event list, so the
/// result's `event_index` is always 0.
///
/// # Errors
///
/// Returns [`crate::ScheduleError::TemporalOrder`] if the event does not end
/// after it starts, or the matching rescheduled exception does not.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use schedule_engine::{materialize, Event};
///
/// let event = Event::new(
///     "Standup",
///     Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
///     Utc.with_ymd_and_hms(2026, 3, 2, 9, 15, 0).unwrap(),
/// );
/// let occurrence = materialize(&event, Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap()).unwrap();
/// assert_eq!(occurrence.end, Utc.with_ymd_and_hms(2026, 3, 3, 9, 15, 0).unwrap());
/// assert!(!occurrence.is_cancelled);
/// ```
pub fn materialize(event: &Event, candidate_start: DateTime<Utc>) -> Result<Occurrence<'_>> {
    event.validate()?;
    Ok(materialize_at(event, 0, candidate_start))
}

/// [`materialize`] for an event that already passed [`Event::validate`].
pub(crate) fn materialize_at(
    event: &Event,
    event_index: usize,
    candidate_start: DateTime<Utc>,
) -> Occurrence<'_> {
    let original_end = candidate_start + event.duration();
    let mut occurrence = Occurrence {
        event,
        event_index,
        start: candidate_start,
        end: original_end,
        original_start: candidate_start,
        original_end,
        is_cancelled: false,
    };
    match event.exception_at(candidate_start) {
        Some(Exception::Cancelled) => occurrence.is_cancelled = true,
        Some(Exception::Rescheduled { start, end }) => {
            occurrence.start = *start;
            occurrence.end = *end;
        }
        None => {}
    }
    occurrence
}
