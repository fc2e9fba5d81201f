//! Duration parsing utilities.
//!
//! Durations in the orchestrator config and in environment overrides accept
//! human-readable strings like "5s", "30s", "1m", "500ms", or a bare integer
//! which is interpreted as milliseconds.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parse a duration string like "10s", "30s", "1m", "500ms" or "1500".
///
/// Supported formats:
/// - `"Nms"` - N milliseconds (e.g., "500ms")
/// - `"Ns"` - N seconds (e.g., "30s")
/// - `"Nm"` - N minutes (e.g., "5m")
/// - `"N"` - N milliseconds (no suffix)
///
/// Returns `None` if the string cannot be parsed.
///
/// # Examples
///
/// ```
/// use service_orchestrator::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("5s"), Some(Duration::from_secs(5)));
/// assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration_string("1m"), Some(Duration::from_secs(60)));
/// assert_eq!(parse_duration_string("30000"), Some(Duration::from_secs(30)));
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_millis)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Millis(u64),
    Text(String),
}

/// Serde adapter: `#[serde(with = "crate::config::duration")]`.
///
/// Serializes as integer milliseconds; deserializes from either form.
pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
        RawDuration::Text(text) => parse_duration_string(&text).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid duration '{}'. Use formats like '5s', '30s', '1m', '500ms'",
                text
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration_string("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration_string("5m"), Some(Duration::from_secs(300)));
        assert_eq!(
            parse_duration_string("250ms"),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            parse_duration_string(" 10000 "),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration_string(""), None);
        assert_eq!(parse_duration_string("abc"), None);
        assert_eq!(parse_duration_string("-5s"), None);
        assert_eq!(parse_duration_string("1.5s"), None);
    }

    #[test]
    fn test_serde_accepts_both_forms() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(with = "super")]
            a: Duration,
            #[serde(with = "super")]
            b: Duration,
        }

        let probe: Probe = serde_yaml::from_str("a: 1500\nb: \"2s\"\n").unwrap();
        assert_eq!(probe.a, Duration::from_millis(1500));
        assert_eq!(probe.b, Duration::from_secs(2));
    }
}
