//! Countdown arithmetic: pure deadline math, no side effects.
//!
//! The challenge window is applied exactly once at activation and stored as
//! an absolute deadline. Expiry is always `now >= deadline` against that
//! stored value; it is never recalculated from "now minus elapsed", so the
//! check evaluates identically before and after a restart.

use chrono::{DateTime, Duration, Utc};

use super::record::LifecycleRecord;

/// Default challenge window: 168 hours (7 days).
pub fn default_window() -> Duration {
    Duration::hours(168)
}

/// Absolute deadline for an activation at `activated_at`.
pub fn deadline_for(activated_at: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    activated_at + window
}

/// Has the countdown expired at `now`?
///
/// A record without a deadline (not yet activated) is never expired.
/// The boundary is inclusive: `now == deadline` is expired.
pub fn is_expired(record: &LifecycleRecord, now: DateTime<Utc>) -> bool {
    match record.countdown_deadline {
        Some(deadline) => now >= deadline,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::SubjectId;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn deadline_is_activation_plus_window() {
        let deadline = deadline_for(t0(), default_window());
        assert_eq!(deadline, t0() + Duration::hours(168));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let deadline = deadline_for(t0(), default_window());
        let record = LifecycleRecord::new(SubjectId::new("s"), 3)
            .into_awaiting_payment(t0(), deadline)
            .unwrap();

        assert!(!is_expired(&record, deadline - Duration::seconds(1)));
        assert!(is_expired(&record, deadline));
        assert!(is_expired(&record, deadline + Duration::seconds(1)));
    }

    #[test]
    fn record_without_deadline_never_expires() {
        let record = LifecycleRecord::new(SubjectId::new("s"), 3);
        assert!(!is_expired(&record, t0() + Duration::days(365)));
    }
}
