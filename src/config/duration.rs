//! Duration parsing utilities.

use anyhow::Context;
use std::time::Duration;

/// Parse a run length like "1h", "5m", "60s" or "60".
///
/// Plain numbers are seconds. Zero is allowed; negative values are not.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (num_str, unit_secs, unit) = if let Some(num_str) = s.strip_suffix('h') {
        (num_str, 3600, "hours")
    } else if let Some(num_str) = s.strip_suffix('m') {
        (num_str, 60, "minutes")
    } else if let Some(num_str) = s.strip_suffix('s') {
        (num_str, 1, "seconds")
    } else {
        (s, 1, "duration")
    };

    let value: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid {unit} value: {num_str}"))?;
    let secs = value
        .checked_mul(unit_secs)
        .with_context(|| format!("Duration too large: {s}"))?;
    Ok(Duration::from_secs(secs))
}
