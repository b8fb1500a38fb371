use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds; clamps to 0 if the clock is before the epoch
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Saturates instead of overflowing on corrupt timestamps
pub fn elapsed_seconds(start: i64, end: i64) -> i64 {
    end.saturating_sub(start)
}

/// Fractional minutes between two unix timestamps.
/// Not truncated, so a 30 minute threshold is reached at exactly 1800 seconds.
pub fn elapsed_minutes(start: i64, end: i64) -> f64 {
    elapsed_seconds(start, end) as f64 / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp() {
        let ts = current_timestamp();
        // Should be a reasonable timestamp (after 2020-01-01)
        assert!(ts > 1577836800);
        // Should be before 2100-01-01
        assert!(ts < 4102444800);
    }

    #[test]
    fn test_elapsed_seconds() {
        assert_eq!(elapsed_seconds(100, 150), 50);
        assert_eq!(elapsed_seconds(1000, 1000), 0);
        assert_eq!(elapsed_seconds(200, 100), -100);
    }

    #[test]
    fn test_elapsed_seconds_saturates() {
        assert_eq!(elapsed_seconds(i64::MIN, 1_700_000_000), i64::MAX);
        assert_eq!(elapsed_seconds(i64::MAX, -1), i64::MIN);
    }

    #[test]
    fn test_elapsed_minutes_is_fractional() {
        assert_eq!(elapsed_minutes(0, 90), 1.5);
        assert_eq!(elapsed_minutes(0, 1800), 30.0);
        assert_eq!(elapsed_minutes(60, 0), -1.0);
    }

    #[test]
    fn test_elapsed_minutes_threshold_edge() {
        let start = 1_000;

        // Edge case: exactly at threshold
        assert!(elapsed_minutes(start, start + 1800) >= 30.0);

        // One second short
        assert!(elapsed_minutes(start, start + 1799) < 30.0);
    }
}
