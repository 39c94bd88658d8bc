//! Conversion of the message store's native timestamps.
//!
//! The store counts from 2001-01-01T00:00:00Z. Older stores record seconds,
//! newer ones nanoseconds; any magnitude above [`NANOSECOND_THRESHOLD`] is
//! treated as nanoseconds.

use chrono::DateTime;

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
pub const STORE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

/// Raw values above this are nanoseconds, otherwise seconds.
pub const NANOSECOND_THRESHOLD: i64 = 1_000_000_000_000;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Display format for message timestamps (UTC).
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Converts a raw store timestamp into Unix seconds plus sub-second nanos.
#[must_use]
pub fn store_time_to_unix(raw: i64) -> Option<(i64, u32)> {
    let (secs, nanos) = if raw > NANOSECOND_THRESHOLD {
        (raw.div_euclid(NANOS_PER_SEC), raw.rem_euclid(NANOS_PER_SEC))
    } else {
        (raw, 0)
    };
    let unix = secs.checked_add(STORE_EPOCH_OFFSET_SECS)?;
    Some((unix, u32::try_from(nanos).ok()?))
}

/// Formats a raw store timestamp for display.
///
/// Missing, zero and unrepresentable values yield an empty string.
#[must_use]
pub fn format_store_time(raw: Option<i64>) -> String {
    let Some(raw) = raw.filter(|v| *v != 0) else {
        return String::new();
    };
    store_time_to_unix(raw)
        .and_then(|(secs, nanos)| DateTime::from_timestamp(secs, nanos))
        .map(|dt| dt.format(DISPLAY_FORMAT).to_string())
        .unwrap_or_default()
}

/// Formats a floating point store timestamp (some stores keep REAL columns).
#[must_use]
pub fn format_store_time_f64(raw: f64) -> String {
    if !raw.is_finite() || raw.abs() >= 9.2e18 {
        return String::new();
    }
    #[allow(clippy::cast_possible_truncation)]
    format_store_time(Some(raw.trunc() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_since_store_epoch() {
        assert_eq!(format_store_time(Some(1)), "2001-01-01 00:00");
        assert_eq!(format_store_time(Some(86_400 + 3_600)), "2001-01-02 01:00");
    }

    #[test]
    fn test_nanoseconds_since_store_epoch() {
        // 700_000_000 seconds after 2001-01-01
        assert_eq!(
            format_store_time(Some(700_000_000_000_000_000)),
            "2023-03-08 20:26"
        );
    }

    #[test]
    fn test_threshold_boundary_is_seconds() {
        assert!(store_time_to_unix(NANOSECOND_THRESHOLD).is_some());
        assert_eq!(
            store_time_to_unix(NANOSECOND_THRESHOLD),
            Some((NANOSECOND_THRESHOLD + STORE_EPOCH_OFFSET_SECS, 0))
        );
        assert_eq!(
            store_time_to_unix(NANOSECOND_THRESHOLD + 1).map(|t| t.0),
            Some(1_000 + STORE_EPOCH_OFFSET_SECS)
        );
    }

    #[test]
    fn test_unrepresentable_values_are_empty() {
        assert_eq!(format_store_time(None), "");
        assert_eq!(format_store_time(Some(0)), "");
        assert_eq!(format_store_time(Some(i64::MIN)), "");
        assert_eq!(format_store_time_f64(f64::NAN), "");
        assert_eq!(format_store_time_f64(f64::INFINITY), "");
    }
}
