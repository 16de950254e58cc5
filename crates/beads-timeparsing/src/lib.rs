//! Human-readable duration parsing for the beads system.
//!
//! Supports the compact unit suffixes used throughout beads config and CLI
//! flags: `30s`, `5m`, `2h`, `1d`, and sums of several (`1h30m`). A bare
//! number with no unit is treated as seconds.

use std::time::Duration;

use thiserror::Error;

/// Minimum time a tombstone must be kept before it is eligible for physical
/// deletion by a collector.
pub const MIN_TTL: &str = "7d";

/// Default tombstone retention when no explicit TTL is configured.
pub const DEFAULT_TTL: &str = "30d";

/// Extra grace period added on top of a TTL longer than one hour, to absorb
/// clock skew between replicas.
pub const CLOCK_SKEW_GRACE: &str = "1h";

/// Errors raised while parsing a duration string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("invalid duration '{0}': expected number before unit")]
    MissingNumber(String),
    #[error("invalid number in duration '{0}'")]
    InvalidNumber(String),
    #[error("invalid duration unit '{unit}' in '{input}' (valid: s, m, h, d)")]
    InvalidUnit { input: String, unit: char },
    #[error("invalid duration '{0}': parsed to zero")]
    Zero(String),
}

/// Parses a duration string like `30s`, `5m`, `2h`, `1d`, or `1h30m` into a
/// [`Duration`]. A bare number with no unit suffix is treated as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, TimeParseError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(TimeParseError::MissingNumber(s.to_string()));
    }

    let mut total_secs: u64 = 0;
    let mut current_num = String::new();

    for ch in trimmed.chars() {
        if ch.is_ascii_digit() {
            current_num.push(ch);
            continue;
        }
        if current_num.is_empty() {
            return Err(TimeParseError::MissingNumber(s.to_string()));
        }
        let num: u64 = current_num
            .parse()
            .map_err(|_| TimeParseError::InvalidNumber(s.to_string()))?;
        current_num.clear();

        let multiplier: u64 = match ch {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return Err(TimeParseError::InvalidUnit { input: s.to_string(), unit: ch }),
        };
        total_secs += num * multiplier;
    }

    if !current_num.is_empty() {
        let num: u64 = current_num
            .parse()
            .map_err(|_| TimeParseError::InvalidNumber(s.to_string()))?;
        total_secs += num;
    }

    if total_secs == 0 {
        return Err(TimeParseError::Zero(s.to_string()));
    }

    Ok(Duration::from_secs(total_secs))
}

/// The minimum tombstone TTL, parsed from [`MIN_TTL`].
pub fn min_ttl() -> Duration {
    parse_duration(MIN_TTL).expect("MIN_TTL is a valid duration literal")
}

/// The default tombstone TTL, parsed from [`DEFAULT_TTL`].
pub fn default_ttl() -> Duration {
    parse_duration(DEFAULT_TTL).expect("DEFAULT_TTL is a valid duration literal")
}

/// The clock-skew grace period, parsed from [`CLOCK_SKEW_GRACE`].
pub fn clock_skew_grace() -> Duration {
    parse_duration(CLOCK_SKEW_GRACE).expect("CLOCK_SKEW_GRACE is a valid duration literal")
}

/// Effective retention for a tombstone given a configured TTL: `ttl`,
/// floored at [`MIN_TTL`] and with [`CLOCK_SKEW_GRACE`] added whenever the
/// TTL exceeds one hour.
pub fn effective_retention(ttl: Duration) -> Duration {
    let floored = ttl.max(min_ttl());
    if floored > Duration::from_secs(60 * 60) {
        floored + clock_skew_grace()
    } else {
        floored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert_eq!(parse_duration("0s"), Err(TimeParseError::Zero("0s".to_string())));
        assert!(matches!(parse_duration("5x"), Err(TimeParseError::InvalidUnit { .. })));
        assert!(matches!(parse_duration(""), Err(TimeParseError::MissingNumber(_))));
    }

    #[test]
    fn constants_parse_to_expected_durations() {
        assert_eq!(min_ttl(), Duration::from_secs(7 * 86400));
        assert_eq!(default_ttl(), Duration::from_secs(30 * 86400));
        assert_eq!(clock_skew_grace(), Duration::from_secs(3600));
    }

    #[test]
    fn effective_retention_floors_and_adds_grace() {
        assert_eq!(effective_retention(Duration::from_secs(60)), min_ttl());
        assert_eq!(effective_retention(default_ttl()), default_ttl() + clock_skew_grace());
    }
}
