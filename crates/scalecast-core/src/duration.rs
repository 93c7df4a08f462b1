//! Human-readable duration strings ("500ms", "30s", "5m", "1h").

use std::time::Duration;

/// Parse a duration string like "500ms", "30s", "5m" or "1h".
///
/// A bare number is read as seconds. Returns `None` for anything else,
/// including values too large to represent.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Render a duration in the largest unit that represents it exactly.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        format!("{ms}ms")
    } else {
        let secs = d.as_secs();
        if secs != 0 && secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs != 0 && secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{secs}s")
        }
    }
}

/// Serde adapter storing a `Duration` as a duration string.
pub mod serde_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid duration: {raw:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration(" 10 "), Some(Duration::from_secs(10)));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn parse_rejects_overflow() {
        assert_eq!(parse_duration("999999999999999999m"), None);
        assert_eq!(parse_duration("999999999999999999h"), None);
        assert_eq!(parse_duration("99999999999999999999s"), None);
    }

    #[test]
    fn format_picks_exact_unit() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn format_output_parses_back() {
        for d in [
            Duration::from_millis(1500),
            Duration::from_secs(90),
            Duration::from_secs(1800),
        ] {
            assert_eq!(parse_duration(&format_duration(d)), Some(d));
        }
    }
}
