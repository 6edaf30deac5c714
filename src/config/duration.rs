//! Serde helper for human-readable durations such as "500ms", "5s" or "1h".
//!
//! A missing or empty value deserializes to `Duration::ZERO`, which callers
//! treat as "use the default".

use serde::{self, Deserialize, Deserializer};
use std::time::Duration;

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_duration(&raw).map_err(serde::de::Error::custom),
        None => Ok(Duration::ZERO),
    }
}

/// Seconds per unit suffix. A bare number is seconds.
fn unit_seconds(unit: &str) -> Option<f64> {
    let secs = match unit {
        "ns" => 1e-9,
        "us" | "µs" => 1e-6,
        "ms" => 1e-3,
        "" | "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        "d" => 86_400.0,
        _ => return None,
    };
    Some(secs)
}

pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Duration::ZERO);
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(split);

    let value: f64 = value
        .parse()
        .map_err(|_| format!("invalid duration number: {}", value))?;
    let scale =
        unit_seconds(unit.trim()).ok_or_else(|| format!("unknown duration unit: {}", unit))?;

    Duration::try_from_secs_f64(value * scale).map_err(|_| format!("duration out of range: {}", s))
}
