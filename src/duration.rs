//! Human-readable durations for configuration values ("60s", "10s", "5m", "1h").

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

const UNITS: [(char, u64); 4] = [('d', 24 * 60 * 60), ('h', 60 * 60), ('m', 60), ('s', 1)];

/// Parse a duration string made of a whole number and a single unit suffix
/// (`d`, `h`, `m` or `s`). Case-insensitive, surrounding whitespace ignored.
///
/// ```
/// use walletbook::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let (unit_secs, digits) = UNITS
        .iter()
        .find_map(|(suffix, secs)| s.strip_suffix(*suffix).map(|rest| (*secs, rest)))
        .context("Duration must end with d, h, m, or s")?;

    let count: u64 = digits
        .parse()
        .with_context(|| format!("Invalid number in duration: {s:?}"))?;
    let secs = count
        .checked_mul(unit_secs)
        .context("Duration is too large")?;

    Ok(Duration::from_secs(secs))
}

/// Format a duration using the largest unit that divides it evenly.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    for (suffix, unit_secs) in UNITS {
        if secs >= unit_secs && secs % unit_secs == 0 {
            return format!("{}{suffix}", secs / unit_secs);
        }
    }
    format!("{secs}s")
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Serde serializer mirroring [`deserialize_duration`].
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}
