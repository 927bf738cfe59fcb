//! Unix epoch clocks.

use chrono::Utc;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clocks_are_consistent() {
        let ms = now_ms();
        let us = now_us();
        assert!(ms > 1_600_000_000_000);
        assert!((us / 1000 - ms).abs() < 2_000);
    }
}
