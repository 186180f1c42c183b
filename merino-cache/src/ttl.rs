//! Reconciling configured TTL floors with upstream freshness hints.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::time::Duration;
use thiserror::Error;

/// The format of the upstream `Expires` header, as in
/// `Thu, 28 Jan 2027 19:01:50 GMT`.
pub const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// An upstream freshness hint that could not be understood.
#[derive(Debug, Error)]
#[error("Invalid freshness hint `{hint}`")]
pub struct InvalidFreshnessHint {
    /// The hint as received.
    pub hint: String,

    /// Why it could not be parsed.
    #[source]
    source: chrono::ParseError,
}

/// Parse an `Expires` header value into an absolute time.
///
/// # Errors
/// Fails if the value is not in [`EXPIRES_FORMAT`].
pub fn parse_expires(hint: &str) -> Result<DateTime<Utc>, InvalidFreshnessHint> {
    NaiveDateTime::parse_from_str(hint.trim(), EXPIRES_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|source| InvalidFreshnessHint {
            hint: hint.to_string(),
            source,
        })
}

/// The TTL to store a value with: the time remaining until `expires`, but
/// never less than `floor`.
///
/// An expiry in the past yields the floor.
pub fn effective_ttl(floor: Duration, expires: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let remaining = (expires - now).to_std().unwrap_or(Duration::ZERO);
    floor.max(remaining)
}

#[cfg(test)]
mod tests {
    use super::{effective_ttl, parse_expires};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn parses_http_dates() {
        let parsed = parse_expires("Thu, 28 Jan 2027 19:01:50 GMT").expect("should parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2027, 1, 28, 19, 1, 50).unwrap());
    }

    #[test]
    fn rejects_malformed_hints() {
        let error = parse_expires("next tuesday").unwrap_err();
        assert_eq!(error.hint, "next tuesday");
        assert!(error.to_string().contains("next tuesday"));
        assert!(parse_expires("2027-01-28T19:01:50Z").is_err());
        assert!(parse_expires("").is_err());
    }

    #[test]
    fn later_expiry_wins_over_floor() {
        let now = Utc.with_ymd_and_hms(2027, 1, 28, 12, 0, 0).unwrap();
        let expires = now + ChronoDuration::hours(2);
        assert_eq!(
            effective_ttl(Duration::from_secs(1800), expires, now),
            Duration::from_secs(7200)
        );
    }

    #[test]
    fn floor_wins_over_near_expiry() {
        let now = Utc.with_ymd_and_hms(2027, 1, 28, 12, 0, 0).unwrap();
        let expires = now + ChronoDuration::seconds(30);
        assert_eq!(
            effective_ttl(Duration::from_secs(1800), expires, now),
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn past_expiry_yields_floor() {
        let now = Utc.with_ymd_and_hms(2027, 1, 28, 12, 0, 0).unwrap();
        let expires = now - ChronoDuration::days(1);
        assert_eq!(
            effective_ttl(Duration::from_secs(60), expires, now),
            Duration::from_secs(60)
        );
    }

    proptest! {
        /// The effective TTL is never below the floor, and never below the
        /// time remaining until expiry.
        #[test]
        fn ttl_is_the_larger_of_floor_and_remaining(floor in 0_u64..100_000, offset in -100_000_i64..100_000) {
            let now = Utc.with_ymd_and_hms(2027, 1, 28, 12, 0, 0).unwrap();
            let expires = now + ChronoDuration::seconds(offset);
            let ttl = effective_ttl(Duration::from_secs(floor), expires, now);
            prop_assert!(ttl >= Duration::from_secs(floor));
            if offset >= 0 {
                prop_assert!(ttl >= Duration::from_secs(offset as u64));
            }
            prop_assert_eq!(ttl.as_secs(), floor.max(offset.max(0) as u64));
        }
    }
}
