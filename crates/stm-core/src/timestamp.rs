//! Conversions from the timestamp shapes found in bundles to epoch seconds.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Epoch seconds of a decoded STIX timestamp.
#[must_use]
pub fn epoch_seconds(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp()
}

/// Parse a loosely formatted timestamp string into epoch seconds.
///
/// Accepts plain epoch integers, RFC 3339, and the `%Y-%m-%d %H:%M:%S`
/// form (an offset suffix after `+` is ignored). Returns `None` otherwise.
#[must_use]
pub fn parse_epoch(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(epoch) = raw.parse::<i64>() {
        return Some(epoch);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.timestamp());
    }
    let naive = raw.split('+').next().unwrap_or(raw).trim();
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|ts| ts.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epoch_integer() {
        assert_eq!(parse_epoch("1514764800"), Some(1_514_764_800));
    }

    #[test]
    fn parses_rfc3339() {
        assert_eq!(parse_epoch("2018-01-01T00:00:00Z"), Some(1_514_764_800));
        assert_eq!(parse_epoch("2018-01-01T00:00:00.000Z"), Some(1_514_764_800));
    }

    #[test]
    fn parses_space_separated_with_offset() {
        assert_eq!(parse_epoch("2018-01-01 00:00:00+00:00"), Some(1_514_764_800));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_epoch(""), None);
        assert_eq!(parse_epoch("yesterday"), None);
    }
}
