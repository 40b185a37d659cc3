use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::types::{AlertType, Subject};

/// Minimum spacing between two deliveries of the same (subject, alert type).
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 30;

/// Suppresses repeats of the same alert for the same subject inside a
/// cooldown window. One table per process, shared by sessions through an
/// `Arc`; entries live until restart.
///
/// Recording is optimistic: an emission is recorded once the dispatch is
/// attempted, so a failed delivery still consumes the window.
pub struct AlertDeduplicator {
    window: Duration,
    last_emitted: Mutex<HashMap<(Subject, AlertType), DateTime<Utc>>>,
}

impl AlertDeduplicator {
    pub fn new(window: Duration) -> Self {
        AlertDeduplicator {
            window,
            last_emitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_window_seconds(seconds: u64) -> Self {
        AlertDeduplicator::new(Duration::seconds(seconds as i64))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True when no alert of this type has gone out for the subject inside
    /// the cooldown window. Pure read; call `record_emission` once the
    /// dispatch is actually attempted.
    pub fn should_emit(&self, subject: &Subject, alert_type: AlertType, now: DateTime<Utc>) -> bool {
        let last_emitted = self.last_emitted.lock();
        match last_emitted.get(&(subject.clone(), alert_type)) {
            Some(last) => now.signed_duration_since(*last) >= self.window,
            None => true,
        }
    }

    /// Overwrites the last-emission timestamp for the pair, restarting its
    /// window unconditionally.
    pub fn record_emission(&self, subject: &Subject, alert_type: AlertType, now: DateTime<Utc>) {
        let mut last_emitted = self.last_emitted.lock();
        last_emitted.insert((subject.clone(), alert_type), now);
    }

    /// Last recorded emission for the pair, if any.
    pub fn last_emission(&self, subject: &Subject, alert_type: AlertType) -> Option<DateTime<Utc>> {
        self.last_emitted
            .lock()
            .get(&(subject.clone(), alert_type))
            .copied()
    }

    /// Number of (subject, alert type) pairs seen so far.
    pub fn tracked_pairs(&self) -> usize {
        self.last_emitted.lock().len()
    }
}

impl Default for AlertDeduplicator {
    fn default() -> Self {
        AlertDeduplicator::with_window_seconds(DEFAULT_COOLDOWN_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn first_emission_is_always_allowed() {
        let dedup = AlertDeduplicator::default();
        assert!(dedup.should_emit(&Subject::new("room-1"), AlertType::Distress, t0()));
        assert_eq!(dedup.tracked_pairs(), 0);
    }

    #[test]
    fn repeat_inside_window_is_suppressed_and_after_window_allowed() {
        let dedup = AlertDeduplicator::default();
        let subject = Subject::new("room-1");

        assert!(dedup.should_emit(&subject, AlertType::Distress, t0()));
        dedup.record_emission(&subject, AlertType::Distress, t0());

        let ten_later = t0() + Duration::seconds(10);
        assert!(!dedup.should_emit(&subject, AlertType::Distress, ten_later));

        let after_window = t0() + Duration::seconds(31);
        assert!(dedup.should_emit(&subject, AlertType::Distress, after_window));
    }

    #[test]
    fn elapsed_exactly_equal_to_window_is_allowed() {
        let dedup = AlertDeduplicator::default();
        let subject = Subject::new("room-1");
        dedup.record_emission(&subject, AlertType::Fall, t0());

        let boundary = t0() + Duration::seconds(30);
        assert!(dedup.should_emit(&subject, AlertType::Fall, boundary));

        let just_before = t0() + Duration::milliseconds(29_999);
        assert!(!dedup.should_emit(&subject, AlertType::Fall, just_before));
    }

    #[test]
    fn pairs_are_independent_across_subjects_and_types() {
        let dedup = AlertDeduplicator::default();
        let room_1 = Subject::new("room-1");
        let room_2 = Subject::new("room-2");
        dedup.record_emission(&room_1, AlertType::Fall, t0());

        let shortly_after = t0() + Duration::seconds(1);
        assert!(!dedup.should_emit(&room_1, AlertType::Fall, shortly_after));
        assert!(dedup.should_emit(&room_1, AlertType::Inactivity, shortly_after));
        assert!(dedup.should_emit(&room_2, AlertType::Fall, shortly_after));
    }

    #[test]
    fn recording_again_restarts_the_window() {
        let dedup = AlertDeduplicator::default();
        let subject = Subject::new("room-9");
        dedup.record_emission(&subject, AlertType::Distress, t0());

        let second_emission = t0() + Duration::seconds(40);
        assert!(dedup.should_emit(&subject, AlertType::Distress, second_emission));
        dedup.record_emission(&subject, AlertType::Distress, second_emission);

        // 50s past t0 but only 10s past the latest emission
        let fifty_later = t0() + Duration::seconds(50);
        assert!(!dedup.should_emit(&subject, AlertType::Distress, fifty_later));
        assert_eq!(dedup.tracked_pairs(), 1);
    }

    #[test]
    fn clock_going_backwards_keeps_suppressing() {
        let dedup = AlertDeduplicator::default();
        let subject = Subject::new("room-1");
        dedup.record_emission(&subject, AlertType::Distress, t0());
        let earlier = t0() - Duration::seconds(5);
        assert!(!dedup.should_emit(&subject, AlertType::Distress, earlier));
    }

    #[test]
    fn custom_windows_are_respected() {
        let dedup = AlertDeduplicator::with_window_seconds(5);
        let subject = Subject::new("room-1");
        dedup.record_emission(&subject, AlertType::Wandering, t0());
        assert!(!dedup.should_emit(&subject, AlertType::Wandering, t0() + Duration::seconds(4)));
        assert!(dedup.should_emit(&subject, AlertType::Wandering, t0() + Duration::seconds(5)));
    }
}
