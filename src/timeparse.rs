// =============================================================================
// Datetime parsing — absolute and relative strings to UTC instants
// =============================================================================

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Parse a datetime string into a UTC instant.
///
/// Accepted forms:
/// * `now`
/// * `<N> <minutes|hours|days|weeks|months> ago` (months count as 30 days)
/// * RFC 3339 (`2024-01-02T03:04:05Z`)
/// * `%Y-%m-%d %H:%M:%S`, `%Y-%m-%d %H:%M`
/// * `%Y-%m-%d` (midnight UTC)
pub fn parse_utc(input: &str) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();

    if trimmed.eq_ignore_ascii_case("now") {
        return Ok(Utc::now());
    }
    if let Some(instant) = parse_relative(trimmed)? {
        return Ok(instant);
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).context("invalid midnight")?;
        return Ok(midnight.and_utc());
    }

    bail!("unrecognized datetime {input:?}");
}

/// `<N> <unit> ago` forms; returns `Ok(None)` when the input is not one.
fn parse_relative(input: &str) -> Result<Option<DateTime<Utc>>> {
    let lower = input.to_ascii_lowercase();
    let Some(stripped) = lower.strip_suffix("ago") else {
        return Ok(None);
    };

    let mut parts = stripped.split_whitespace();
    let (Some(count), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        bail!("unrecognized relative datetime {input:?}");
    };

    let n: i64 = count
        .parse()
        .with_context(|| format!("bad count in relative datetime {input:?}"))?;
    if n < 0 {
        bail!("relative datetime count must be non-negative in {input:?}");
    }

    let delta = match unit.trim_end_matches('s') {
        "minute" | "min" => Duration::minutes(n),
        "hour" => Duration::hours(n),
        "day" => Duration::days(n),
        "week" => Duration::weeks(n),
        "month" => Duration::days(30 * n),
        other => bail!("unsupported unit {other:?} in relative datetime {input:?}"),
    };

    Ok(Some(Utc::now() - delta))
}
