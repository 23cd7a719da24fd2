//! DST transition policies for recurring events.
//!
//! Calendar frequencies (daily and longer) are expanded on the event
//! timezone's wall clock. A wall-clock candidate can fall into a DST gap
//! (spring forward) or a fold (fall back); the policy decides what happens.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Policy for handling events that fall during DST transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Skip instances that fall in the DST gap (e.g., 2:30 AM during spring forward)
    Skip,
    /// Shift to the next valid time after the gap
    ShiftForward,
    /// Use wall clock time (maintain local time, adjust UTC offset)
    #[default]
    WallClock,
}

/// Resolve a wall-clock datetime in `tz` to a UTC instant.
///
/// Folds always resolve to the earlier instant. Gaps depend on the policy:
/// [`DstPolicy::Skip`] yields `None`, [`DstPolicy::ShiftForward`] moves the
/// instance to the first wall time after the gap, and [`DstPolicy::WallClock`]
/// reads the wall time with the offset in force before the gap (2:30 during a
/// one hour spring-forward becomes 3:30).
pub fn resolve_local(tz: &Tz, local: NaiveDateTime, policy: DstPolicy) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => match policy {
            DstPolicy::Skip => None,
            DstPolicy::ShiftForward => first_valid_after(tz, local),
            DstPolicy::WallClock => with_offset_before_gap(tz, local),
        },
    }
}

// Gaps are at most a few hours; probing in 15 minute steps over a day is enough.
const PROBE_STEP_MINUTES: i64 = 15;
const PROBE_STEPS: i64 = 24 * 4;

fn first_valid_after(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    (1..=PROBE_STEPS).find_map(|step| {
        let probe = local + Duration::minutes(PROBE_STEP_MINUTES * step);
        let probe = probe.with_minute(probe.minute() / 15 * 15)?;
        tz.from_local_datetime(&probe)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn with_offset_before_gap(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    let before = (1..=PROBE_STEPS).find_map(|step| {
        tz.from_local_datetime(&(local - Duration::minutes(PROBE_STEP_MINUTES * step)))
            .earliest()
    })?;
    let offset = i64::from(before.offset().fix().local_minus_utc());
    Some(DateTime::from_naive_utc_and_offset(
        local - Duration::seconds(offset),
        Utc,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_resolve_regular_time() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let utc = resolve_local(&tz, naive(2026, 1, 15, 9, 0), DstPolicy::WallClock).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 1, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_resolve_gap_skip() {
        // March 8, 2026: 2:00 AM does not exist in New York
        let tz: Tz = "America/New_York".parse().unwrap();
        assert!(resolve_local(&tz, naive(2026, 3, 8, 2, 30), DstPolicy::Skip).is_none());
    }

    #[test]
    fn test_resolve_gap_shift_forward() {
        // First wall time after the gap is 3:00 EDT = 07:00 UTC
        let tz: Tz = "America/New_York".parse().unwrap();
        let utc = resolve_local(&tz, naive(2026, 3, 8, 2, 30), DstPolicy::ShiftForward).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 8, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_resolve_gap_wall_clock() {
        // 2:30 read with the EST offset is 07:30 UTC (3:30 EDT)
        let tz: Tz = "America/New_York".parse().unwrap();
        let utc = resolve_local(&tz, naive(2026, 3, 8, 2, 30), DstPolicy::WallClock).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 8, 7, 30, 0).unwrap());
    }

    #[test]
    fn test_resolve_fold_takes_earlier_instant() {
        // November 1, 2026: 1:30 AM happens twice, first in EDT (UTC-4)
        let tz: Tz = "America/New_York".parse().unwrap();
        let utc = resolve_local(&tz, naive(2026, 11, 1, 1, 30), DstPolicy::WallClock).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 11, 1, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_default_policy_is_wall_clock() {
        assert_eq!(DstPolicy::default(), DstPolicy::WallClock);
    }
}
