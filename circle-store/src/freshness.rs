//! Staleness rules for cached entries.
//!
//! An entry is fresh only while `now - updated_at < window`. A missing
//! timestamp (never fetched, or explicitly marked stale) is always stale.

use std::time::Duration;

use circle_core::{DurationMs, Timestamp};
use serde::{Deserialize, Serialize};

/// Observable lifecycle of a (store, scope) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// No value and nothing in flight.
    Empty,
    /// A load is outstanding.
    Fetching,
    /// Value present and within the staleness window.
    Fresh,
    /// Value present but expired or explicitly marked stale.
    Stale,
}

/// Age of an entry in milliseconds. Clock skew never yields a negative age.
pub fn age_ms(updated_at: Option<Timestamp>, now: Timestamp) -> Option<DurationMs> {
    updated_at.map(|at| (now - at).num_milliseconds().max(0))
}

/// Whether an entry updated at `updated_at` is stale at `now`.
pub fn is_stale(updated_at: Option<Timestamp>, now: Timestamp, window: Duration) -> bool {
    let window_ms = DurationMs::try_from(window.as_millis()).unwrap_or(DurationMs::MAX);
    match age_ms(updated_at, now) {
        None => true,
        Some(age) => age >= window_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(ms: i64) -> Timestamp {
        chrono::Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_missing_timestamp_is_stale() {
        assert!(is_stale(None, at(0), Duration::from_secs(60)));
        assert_eq!(age_ms(None, at(0)), None);
    }

    #[test]
    fn test_window_boundary() {
        let window = Duration::from_millis(1000);
        assert!(!is_stale(Some(at(0)), at(999), window));
        assert!(is_stale(Some(at(0)), at(1000), window));
    }

    #[test]
    fn test_future_timestamp_clamps_to_zero_age() {
        assert_eq!(age_ms(Some(at(500)), at(0)), Some(0));
        assert!(!is_stale(Some(at(500)), at(0), Duration::from_millis(1)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_stale_iff_age_reaches_window(
            updated in 0i64..1_000_000,
            elapsed in 0i64..1_000_000,
            window in 1u64..500_000,
        ) {
            let stale = is_stale(Some(at(updated)), at(updated + elapsed), Duration::from_millis(window));
            prop_assert_eq!(stale, elapsed >= window as i64);
        }

        #[test]
        fn prop_staleness_is_monotonic(
            updated in 0i64..1_000_000,
            first in 0i64..500_000,
            extra in 0i64..500_000,
            window in 1u64..500_000,
        ) {
            let window = Duration::from_millis(window);
            let earlier = is_stale(Some(at(updated)), at(updated + first), window);
            let later = is_stale(Some(at(updated)), at(updated + first + extra), window);
            prop_assert!(!earlier || later);
        }
    }
}
