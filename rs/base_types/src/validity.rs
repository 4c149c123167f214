use std::fmt;

use time::OffsetDateTime;

/// A validity window with whole-second resolution.
///
/// TRC payloads and X.509 certificates both encode their validity as
/// generalized time with second precision, so all windows are truncated to
/// seconds on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Validity {
        Validity {
            not_before: truncate_to_second(not_before),
            not_after: truncate_to_second(not_after),
        }
    }

    /// A window starting now and lasting for `secs` seconds.
    pub fn for_seconds_from_now(secs: i64) -> Validity {
        let now = OffsetDateTime::now_utc();
        Validity::new(now, now + time::Duration::seconds(secs))
    }

    /// True if `other` lies fully inside this window.
    pub fn contains(&self, other: &Validity) -> bool {
        self.not_before <= other.not_before && self.not_after >= other.not_after
    }

    /// True if the instant falls inside the window, bounds inclusive.
    pub fn contains_instant(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.not_before, self.not_after)
    }
}

fn truncate_to_second(t: OffsetDateTime) -> OffsetDateTime {
    t.replace_nanosecond(0)
        .expect("zero is a valid nanosecond")
        .to_offset(time::UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_truncates_to_seconds() {
        let t = OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_123_456_789).unwrap();
        let v = Validity::new(t, t + time::Duration::hours(1));
        assert_eq!(v.not_before.nanosecond(), 0);
        assert_eq!(v.not_after.nanosecond(), 0);
        assert_eq!(v.not_before.unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn containment_is_inclusive() {
        let v = Validity::for_seconds_from_now(3600);
        assert!(v.contains(&v));
        let inner = Validity::new(
            v.not_before + time::Duration::seconds(1),
            v.not_after - time::Duration::seconds(1),
        );
        assert!(v.contains(&inner));
        assert!(!inner.contains(&v));
        assert!(v.contains_instant(v.not_before));
        assert!(v.contains_instant(v.not_after));
        assert!(!v.contains_instant(v.not_after + time::Duration::seconds(1)));
    }
}
