use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use schedule_engine::{
    generate, CursorState, Direction, EngineConfig, Event, EventListManager, Frequency, Rule,
    RuleCursor,
};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Daily),
        Just(Frequency::Weekly),
        Just(Frequency::Hourly),
        Just(Frequency::Minutely),
    ]
}

fn step(frequency: Frequency) -> TimeDelta {
    match frequency {
        Frequency::Weekly => TimeDelta::weeks(1),
        Frequency::Daily => TimeDelta::days(1),
        Frequency::Hourly => TimeDelta::hours(1),
        _ => TimeDelta::minutes(1),
    }
}

/// A bounded recurring event: (minute offset from base, duration, frequency, interval, count).
fn bounded_event() -> impl Strategy<Value = Event> {
    (0i64..60 * 24 * 60, 1i64..240, frequency(), 1u32..5, 1u32..40).prop_map(
        |(offset, minutes, frequency, interval, count)| {
            let start = base() + TimeDelta::minutes(offset);
            let rule = Rule::builder(frequency)
                .interval(interval)
                .count(count)
                .build()
                .unwrap();
            Event::new(format!("{frequency}/{interval}"), start, start + TimeDelta::minutes(minutes))
                .with_rule(Arc::new(rule))
        },
    )
}

proptest! {
    /// An event without a rule yields at most its own single occurrence.
    #[test]
    fn single_event_at_most_once(offset in 0i64..100_000, minutes in 1i64..600, probe in -200_000i64..200_000) {
        let start = base() + TimeDelta::minutes(offset);
        let events = [Event::new("once", start, start + TimeDelta::minutes(minutes))];
        let manager = EventListManager::new(&events).unwrap();
        let from = base() + TimeDelta::minutes(probe);
        for out in [
            manager.occurrences_after(from).collect::<Vec<_>>(),
            manager.occurrences_before(from).collect::<Vec<_>>(),
        ] {
            prop_assert!(out.len() <= 1);
            if let Some(o) = out.first() {
                prop_assert_eq!(o.start, events[0].start);
                prop_assert_eq!(o.end, events[0].end);
            }
        }
    }

    /// Consecutive candidates of a fixed-length frequency are exactly `interval` units apart.
    #[test]
    fn candidates_are_evenly_spaced(frequency in frequency(), interval in 1u32..10, offset in 0i64..1_000_000, seek in 0i64..10_000_000) {
        let rule = Arc::new(Rule::builder(frequency).interval(interval).build().unwrap());
        let anchor = base() + TimeDelta::minutes(offset);
        let from = anchor + TimeDelta::minutes(seek);
        let out: Vec<_> = generate(&rule, anchor, Direction::Forward, from).take(20).collect();
        prop_assert_eq!(out.len(), 20);
        prop_assert!(out[0] >= from);
        for pair in out.windows(2) {
            prop_assert_eq!(pair[1] - pair[0], step(frequency) * interval as i32);
        }
    }

    /// The merged stream is sorted by start, ties by input order.
    #[test]
    fn merge_is_sorted(events in prop::collection::vec(bounded_event(), 1..8), probe in 0i64..90 * 24 * 60) {
        let manager = EventListManager::new(&events).unwrap();
        let from = base() + TimeDelta::minutes(probe);
        let out: Vec<_> = manager.occurrences_after(from).collect();
        for pair in out.windows(2) {
            prop_assert!((pair[0].start, pair[0].event_index) <= (pair[1].start, pair[1].event_index));
        }
        prop_assert!(out.iter().all(|o| o.end > from));
    }

    /// `within` is `occurrences_after` truncated at the window end.
    #[test]
    fn within_is_truncated_after(events in prop::collection::vec(bounded_event(), 1..6), start in 0i64..60 * 24 * 60, length in 0i64..30 * 24 * 60) {
        let manager = EventListManager::new(&events).unwrap();
        let from = base() + TimeDelta::minutes(start);
        let to = from + TimeDelta::minutes(length);
        let window = manager.within(from, to);
        let filtered: Vec<_> = manager.occurrences_after(from).filter(|o| o.start <= to).collect();
        prop_assert_eq!(window, filtered);
    }

    /// Backward iteration visits the same starts as forward iteration, reversed.
    #[test]
    fn backward_mirrors_forward(events in prop::collection::vec(bounded_event(), 1..6), probe in 0i64..120 * 24 * 60) {
        let manager = EventListManager::new(&events).unwrap();
        let split = base() + TimeDelta::minutes(probe);
        let mut forward: Vec<_> = manager
            .occurrences_after(base() - TimeDelta::days(1))
            .filter(|o| o.start < split)
            .map(|o| (o.start, o.event_index))
            .collect();
        let mut backward: Vec<_> = manager
            .occurrences_before(split)
            .map(|o| (o.start, o.event_index))
            .collect();
        forward.sort();
        backward.sort();
        prop_assert_eq!(forward, backward);
    }

    /// Querying twice gives the same sequence.
    #[test]
    fn queries_are_repeatable(events in prop::collection::vec(bounded_event(), 1..6), probe in 0i64..60 * 24 * 60) {
        let manager = EventListManager::new(&events).unwrap();
        let from = base() + TimeDelta::minutes(probe);
        let first: Vec<_> = manager.occurrences_after(from).collect();
        let second: Vec<_> = manager.occurrences_after(from).collect();
        prop_assert_eq!(first, second);
    }

    /// A cursor rebuilt from its captured state yields the same tail.
    #[test]
    fn resumed_cursor_yields_same_tail(frequency in frequency(), interval in 1u32..4, count in 1u32..50, taken in 0usize..60) {
        let rule = Arc::new(Rule::builder(frequency).interval(interval).count(count).build().unwrap());
        let anchor = base() + TimeDelta::hours(9);
        let config = EngineConfig::default();
        let mut cursor = RuleCursor::seek(Arc::clone(&rule), anchor, chrono_tz::Tz::UTC, &config, Direction::Forward, base(), None);
        for _ in cursor.by_ref().take(taken) {}
        let state: CursorState = serde_json::from_str(&serde_json::to_string(&cursor.state()).unwrap()).unwrap();
        let resumed = RuleCursor::resume(rule, anchor, chrono_tz::Tz::UTC, &config, base(), None, state);
        prop_assert_eq!(cursor.collect::<Vec<_>>(), resumed.collect::<Vec<_>>());
    }
}
