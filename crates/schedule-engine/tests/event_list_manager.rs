//! End-to-end merge scenarios through the public API.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeDelta, TimeZone, Timelike, Utc};
use schedule_engine::{
    EngineConfig, Event, EventListManager, Exception, Frequency, Occurrence, Rule,
};

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn starts(occurrences: &[Occurrence<'_>]) -> Vec<DateTime<Utc>> {
    occurrences.iter().map(|o| o.start).collect()
}

// ---------------------------------------------------------------------------
// Weekly event merged with a daily event whose recurrence ended a year earlier
// ---------------------------------------------------------------------------

fn weekly_and_stale_daily() -> [Event; 2] {
    let weekly = Event::new("Weekly Event", utc(2009, 4, 1, 8, 0), utc(2009, 4, 1, 9, 0))
        .with_rule(Arc::new(Rule::new(Frequency::Weekly)))
        .with_end_recurring_period(utc(2009, 10, 5, 0, 0));
    let daily = Event::new("Recent Event", utc(2008, 1, 5, 9, 0), utc(2008, 1, 5, 10, 0))
        .with_rule(Arc::new(Rule::new(Frequency::Daily)))
        .with_end_recurring_period(utc(2008, 5, 5, 0, 0));
    [weekly, daily]
}

#[test_log::test]
fn weekly_event_first_and_only() {
    let events = weekly_and_stale_daily();
    let manager = EventListManager::new(&events).unwrap();
    let out: Vec<_> = manager.occurrences_after(utc(2009, 4, 1, 0, 0)).collect();

    assert_eq!(out[0].event.title, "Weekly Event");
    assert_eq!(out[0].start, utc(2009, 4, 1, 8, 0));
    assert!(
        out.iter().all(|o| o.event.title == "Weekly Event"),
        "daily event ended in 2008 and must not contribute"
    );
    assert_eq!(out.len(), 27);
    assert_eq!(out.last().unwrap().start, utc(2009, 9, 30, 8, 0));
    for pair in out.windows(2) {
        assert_eq!(pair[1].start - pair[0].start, TimeDelta::days(7));
    }
}

#[test_log::test]
fn stale_daily_event_still_visible_looking_back() {
    let events = weekly_and_stale_daily();
    let manager = EventListManager::new(&events).unwrap();
    let out: Vec<_> = manager.occurrences_before(utc(2009, 4, 1, 0, 0)).take(2).collect();
    // Last generated daily candidate is May 4 (the end of period is midnight May 5)
    assert_eq!(out[0].event.title, "Recent Event");
    assert_eq!(out[0].start, utc(2008, 5, 4, 9, 0));
    assert_eq!(out[1].start, utc(2008, 5, 3, 9, 0));
}

// ---------------------------------------------------------------------------
// Multi-event ordering
// ---------------------------------------------------------------------------

#[test]
fn mixed_frequencies_are_globally_sorted() {
    let events = [
        Event::new("Monthly", utc(2026, 1, 15, 12, 0), utc(2026, 1, 15, 13, 0))
            .with_rule(Arc::new(Rule::from_rrule("FREQ=MONTHLY;COUNT=6").unwrap())),
        Event::new("Standup", utc(2026, 1, 5, 9, 0), utc(2026, 1, 5, 9, 15))
            .with_rule(Arc::new(Rule::from_rrule("FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR").unwrap())),
        Event::new("Launch", utc(2026, 3, 3, 9, 0), utc(2026, 3, 3, 18, 0)),
    ];
    let manager = EventListManager::new(&events).unwrap();
    let out: Vec<_> = manager.occurrences_after(utc(2026, 1, 1, 0, 0)).take(200).collect();

    for pair in out.windows(2) {
        assert!(pair[0].start <= pair[1].start, "{} > {}", pair[0].start, pair[1].start);
        if pair[0].start == pair[1].start {
            assert!(pair[0].event_index < pair[1].event_index);
        }
    }
    assert_eq!(out.iter().filter(|o| o.event.title == "Monthly").count(), 6);
    assert_eq!(out.iter().filter(|o| o.event.title == "Launch").count(), 1);
    assert!(out
        .iter()
        .filter(|o| o.event.title == "Standup")
        .all(|o| o.start.weekday().number_from_monday() <= 5));
}

#[test]
fn same_start_ties_follow_input_order() {
    let at = utc(2026, 2, 2, 10, 0);
    let events = [
        Event::new("second", at, at + TimeDelta::hours(1))
            .with_rule(Arc::new(Rule::new(Frequency::Daily))),
        Event::new("first", at, at + TimeDelta::hours(2))
            .with_rule(Arc::new(Rule::new(Frequency::Daily))),
    ];
    let manager = EventListManager::new(&events).unwrap();
    let out: Vec<_> = manager.occurrences_after(at).take(4).collect();
    let titles: Vec<_> = out.iter().map(|o| o.event.title.as_str()).collect();
    assert_eq!(titles, vec!["second", "first", "second", "first"]);
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

#[test]
fn exceptions_cancel_and_move() {
    let event = Event::new("Sync", utc(2026, 4, 6, 15, 0), utc(2026, 4, 6, 15, 30))
        .with_rule(Arc::new(Rule::from_rrule("FREQ=WEEKLY;COUNT=4").unwrap()))
        .with_exception(utc(2026, 4, 13, 15, 0), Exception::Cancelled)
        .with_exception(
            utc(2026, 4, 20, 15, 0),
            Exception::Rescheduled {
                start: utc(2026, 4, 6, 16, 0),
                end: utc(2026, 4, 6, 17, 0),
            },
        );
    let events = [event];
    let manager = EventListManager::new(&events).unwrap();
    let out: Vec<_> = manager.occurrences_after(utc(2026, 4, 1, 0, 0)).collect();

    assert_eq!(
        starts(&out),
        vec![
            utc(2026, 4, 6, 15, 0),
            utc(2026, 4, 6, 16, 0),
            utc(2026, 4, 13, 15, 0),
            utc(2026, 4, 27, 15, 0)
        ]
    );
    assert!(out[2].is_cancelled);
    assert_eq!(out[1].original_start, utc(2026, 4, 20, 15, 0));
    assert!(out[1].is_moved());
}

#[test]
fn rescheduled_past_count_is_not_resurrected() {
    // Exception keyed past the COUNT bound does not belong to any occurrence
    let event = Event::new("Sync", utc(2026, 4, 6, 15, 0), utc(2026, 4, 6, 15, 30))
        .with_rule(Arc::new(Rule::from_rrule("FREQ=WEEKLY;COUNT=2").unwrap()))
        .with_exception(
            utc(2026, 4, 20, 15, 0),
            Exception::Rescheduled {
                start: utc(2026, 4, 21, 15, 0),
                end: utc(2026, 4, 21, 16, 0),
            },
        );
    let events = [event];
    let manager = EventListManager::new(&events).unwrap();
    assert_eq!(manager.occurrences_after(utc(2026, 1, 1, 0, 0)).count(), 2);
}

// ---------------------------------------------------------------------------
// within
// ---------------------------------------------------------------------------

#[test]
fn within_matches_truncated_after() {
    let events = [
        Event::new("A", utc(2026, 1, 1, 9, 0), utc(2026, 1, 1, 11, 0))
            .with_rule(Arc::new(Rule::from_rrule("FREQ=DAILY;INTERVAL=3").unwrap())),
        Event::new("B", utc(2026, 1, 2, 10, 0), utc(2026, 1, 2, 10, 45))
            .with_rule(Arc::new(Rule::from_rrule("FREQ=HOURLY;INTERVAL=5").unwrap())),
    ];
    let manager = EventListManager::new(&events).unwrap();
    let (start, end) = (utc(2026, 1, 10, 10, 0), utc(2026, 1, 14, 0, 0));
    let window = manager.within(start, end);
    let expected: Vec<_> = manager
        .occurrences_after(start)
        .take_while(|o| o.start <= end)
        .collect();
    assert_eq!(window, expected);
    assert!(window.iter().all(|o| o.end > start && o.start <= end));
    // A's Jan 10 occurrence is under way at the window start
    assert_eq!(window[0].event.title, "A");
    assert_eq!(window[0].start, utc(2026, 1, 10, 9, 0));
}

// ---------------------------------------------------------------------------
// Timezones
// ---------------------------------------------------------------------------

#[test]
fn wall_clock_is_kept_in_event_timezone() {
    let tz = chrono_tz::Europe::London;
    // 09:00 GMT on March 27 2026; BST starts March 29
    let event = Event::new("Breakfast", utc(2026, 3, 27, 9, 0), utc(2026, 3, 27, 10, 0))
        .with_rule(Arc::new(Rule::new(Frequency::Daily)))
        .with_timezone(tz);
    let events = [event];
    let manager = EventListManager::new(&events).unwrap();
    let out = manager.within(utc(2026, 3, 27, 0, 0), utc(2026, 3, 31, 0, 0));
    assert_eq!(out.len(), 4);
    assert!(out
        .iter()
        .all(|o| o.start.with_timezone(&tz).hour() == 9));
    assert_eq!(out[3].start, utc(2026, 3, 30, 8, 0));
}

#[test]
fn config_loaded_from_json_drives_dst_policy() {
    let config = EngineConfig::from_json(r#"{"dst_policy": "skip"}"#).unwrap();
    // 02:30 EST; 02:30 does not exist in New York on March 8
    let event = Event::new("Early", utc(2026, 3, 7, 7, 30), utc(2026, 3, 7, 8, 0))
        .with_rule(Arc::new(Rule::new(Frequency::Daily)))
        .with_timezone(chrono_tz::America::New_York);
    let events = [event];
    let manager = EventListManager::with_config(&events, config).unwrap();
    let out = manager.within(utc(2026, 3, 7, 0, 0), utc(2026, 3, 9, 23, 0));
    let days: Vec<u32> = out.iter().map(|o| o.start.day()).collect();
    assert_eq!(days, vec![7, 9]);
}
