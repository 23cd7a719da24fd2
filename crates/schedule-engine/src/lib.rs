//! # schedule-engine
//!
//! Lazy occurrence computation for recurring calendar events.
//!
//! Given an ordered list of events, each optionally carrying a recurrence
//! rule, an end of recurring period and per-occurrence exceptions, the engine
//! produces the concrete occurrences of all events merged into one
//! chronologically ordered stream. Rules are never replayed from their first
//! occurrence: every cursor seeks straight to the requested time.
//!
//! ## Modules
//!
//! - [`rule`] — validated recurrence rules (RRULE subset), shared via `Arc`
//! - [`recurrence`] — seekable, resumable candidate cursors over a rule
//! - [`dst`] — DST gap and fold policies for wall-clock recurrences
//! - [`event`] — event records and their exceptions
//! - [`occurrence`] — materializing one occurrence from a candidate start
//! - [`manager`] — k-way merge of many events' occurrence streams
//! - [`period`] — day/week/month/year windows over a manager
//! - [`config`] — engine options (week start, DST policy, display timezone)
//! - [`error`] — Error types

pub mod config;
pub mod dst;
pub mod error;
pub mod event;
pub mod manager;
pub mod occurrence;
pub mod period;
pub mod recurrence;
pub mod rule;

pub use config::{parse_timezone, EngineConfig, WeekStartDay};
pub use dst::DstPolicy;
pub use error::{Result, ScheduleError};
pub use event::{Event, Exception};
pub use manager::{EventListManager, Occurrences};
pub use occurrence::{materialize, Occurrence};
pub use period::{OccurrenceSpan, Period, PeriodKind};
pub use recurrence::{generate, CursorState, Direction, RuleCursor};
pub use rule::{Frequency, Rule, RuleBuilder, RuleSpec};
