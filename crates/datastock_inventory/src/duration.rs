//! Human-readable time durations ("15 min", "1 hour", "2 days").
//!
//! Used for recheck intervals, age cutoffs and partition periods.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A parsed duration that remembers the text it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeDuration {
    text: String,
    duration: Duration,
}

impl TimeDuration {
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            text: format!("{} sec", duration.as_secs()),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Milliseconds, saturating at `i64::MAX`.
    pub fn as_millis(&self) -> i64 {
        i64::try_from(self.duration.as_millis()).unwrap_or(i64::MAX)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Parse a duration string into a [`Duration`].
///
/// Examples:
/// - "15 min" -> 900s
/// - "1 hour 30 min" -> 5400s
/// - "30sec" -> 30s
/// - "10" -> 10s
///
/// Values too large for a `Duration` are an error, never a panic.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let compact: String = text.split_whitespace().collect();
    if compact.is_empty() {
        return Err("Empty duration".to_string());
    }

    // a bare number means seconds
    let normalized = if compact.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}s", compact)
    } else {
        compact
    };

    humantime::parse_duration(&normalized)
        .map_err(|e| format!("Invalid duration '{}': {}", text.trim(), e))
}

impl FromStr for TimeDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let duration = parse_duration(s)?;
        Ok(Self {
            text: s.trim().to_string(),
            duration,
        })
    }
}

impl fmt::Display for TimeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for TimeDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for TimeDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_units() {
        assert_eq!(parse_duration("15 min").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("1 hour").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("30sec").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2 days").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("1 hour 30 min").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250 ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1 week").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("   ").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("5 fortnights").is_err());
        assert!(parse_duration("-3 min").is_err());
    }

    #[test]
    fn test_overflow_is_an_error() {
        let result = std::panic::catch_unwind(|| "99999999999999999999999 weeks".parse::<TimeDuration>());
        assert!(result.expect("parsing must not panic").is_err());
        assert!(parse_duration("18446744073709551615 weeks").is_err());
    }

    #[test]
    fn test_as_millis_saturates() {
        let td = TimeDuration::from_duration(Duration::from_secs(u64::MAX));
        assert_eq!(td.as_millis(), i64::MAX);
    }

    #[test]
    fn test_time_duration_keeps_text() {
        let td: TimeDuration = " 15 min ".parse().unwrap();
        assert_eq!(td.as_str(), "15 min");
        assert_eq!(td.as_millis(), 900_000);
        assert_eq!(td.to_string(), "15 min");
    }
}
