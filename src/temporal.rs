//! Temporal coercion helpers (`spec.md` §4.5): epoch scale inference and
//! string parsing for `Date`/`DateTime`/`Timestamp`/`TimestampTZ`/`Duration`
//! fields.
//!
//! These are the string/integer input formats a [`crate::value::Input`]
//! coerces through on its way to a [`crate::row::SlotValue`]; they do not
//! touch the wire format itself, which stores every temporal kind except
//! `TimestampTZ` as plain signed nanoseconds (`spec.md` §3).

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::error::{Error, Result};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Infers the scale of a bare integer epoch value and converts it to
/// nanoseconds since the Unix epoch, per `spec.md` §4.5: seconds if
/// `|v| < 1e11`, milliseconds if `< 1e14`, microseconds if `< 1e17`,
/// otherwise nanoseconds already.
pub fn infer_epoch_nanos(field: &str, value: i64) -> Result<i64> {
    let magnitude = value.unsigned_abs();
    let scale: i64 = if magnitude < 100_000_000_000 {
        NANOS_PER_SECOND
    } else if magnitude < 100_000_000_000_000 {
        1_000_000
    } else if magnitude < 100_000_000_000_000_000 {
        1_000
    } else {
        1
    };
    value.checked_mul(scale).ok_or_else(|| Error::OverflowError {
        field: field.to_string(),
        reason: format!("epoch value {value} overflows i64 nanoseconds at inferred scale {scale}"),
    })
}

/// Parses a calendar date (`YYYY-MM-DD`) into nanoseconds since the Unix
/// epoch at UTC midnight.
pub fn parse_date(field: &str, text: &str) -> Result<i64> {
    const FMT: &[time::format_description::FormatItem<'_>] = format_description!("[year]-[month]-[day]");
    let date = Date::parse(text, FMT).map_err(|e| Error::KindMismatch {
        field: field.to_string(),
        expected: "date".to_string(),
        reason: format!("`{text}` is not a valid YYYY-MM-DD date: {e}"),
    })?;
    let midnight = PrimitiveDateTime::new(date, time::Time::MIDNIGHT).assume_utc();
    Ok((midnight.unix_timestamp_nanos()) as i64)
}

/// Parses a naive or offset date-time string into nanoseconds since the
/// Unix epoch, UTC. Accepts RFC3339 (with an offset or trailing `Z`) and a
/// bare `YYYY-MM-DDTHH:MM:SS[.fraction]` naive form, which is assumed UTC.
pub fn parse_datetime(field: &str, text: &str) -> Result<i64> {
    if let Ok(odt) = OffsetDateTime::parse(text, &Rfc3339) {
        return nanos_from_offset(field, odt);
    }
    const FMT: &[time::format_description::FormatItem<'_>] =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    const FMT_FRAC: &[time::format_description::FormatItem<'_>] =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    let naive = PrimitiveDateTime::parse(text, FMT_FRAC)
        .or_else(|_| PrimitiveDateTime::parse(text, FMT))
        .map_err(|e| Error::KindMismatch {
            field: field.to_string(),
            expected: "datetime".to_string(),
            reason: format!("`{text}` is not a recognized ISO-8601 date-time: {e}"),
        })?;
    nanos_from_offset(field, naive.assume_utc())
}

/// Validates that `text` is a valid RFC3339 string with an explicit offset
/// and returns it unchanged: `TimestampTZ` preserves the original offset on
/// the wire rather than normalizing to UTC (`spec.md` §3, §8 scenario 6).
pub fn validate_timestamptz(field: &str, text: &str) -> Result<String> {
    OffsetDateTime::parse(text, &Rfc3339).map_err(|e| Error::KindMismatch {
        field: field.to_string(),
        expected: "timestamptz".to_string(),
        reason: format!("`{text}` is not a valid RFC3339 timestamp: {e}"),
    })?;
    Ok(text.to_string())
}

/// Renders an [`OffsetDateTime`] as RFC3339 text for a `TimestampTZ` field,
/// preserving whatever offset it carries.
pub fn format_timestamptz(field: &str, odt: OffsetDateTime) -> Result<String> {
    odt.format(&Rfc3339).map_err(|e| Error::KindMismatch {
        field: field.to_string(),
        expected: "timestamptz".to_string(),
        reason: format!("failed to render RFC3339 timestamp: {e}"),
    })
}

fn nanos_from_offset(field: &str, odt: OffsetDateTime) -> Result<i64> {
    let nanos = odt.unix_timestamp_nanos();
    i64::try_from(nanos).map_err(|_| Error::OverflowError {
        field: field.to_string(),
        reason: format!("timestamp {odt} overflows i64 nanoseconds since epoch"),
    })
}

/// Parses a Go-style duration literal into signed nanoseconds (`spec.md`
/// §4.5): an optional leading sign, followed by one or more concatenated
/// `<number><unit>` groups, units among `ns`, `us`/`µs`, `ms`, `s`, `m`,
/// `h`, `d`.
pub fn parse_duration(field: &str, text: &str) -> Result<i64> {
    let mismatch = |reason: String| Error::KindMismatch {
        field: field.to_string(),
        expected: "duration".to_string(),
        reason,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(mismatch("empty duration literal".to_string()));
    }
    let mut chars = trimmed.chars().peekable();
    let negative = match chars.peek() {
        Some('-') => {
            chars.next();
            true
        }
        Some('+') => {
            chars.next();
            false
        }
        _ => false,
    };

    let mut total_ns: i128 = 0;
    let mut saw_group = false;
    while chars.peek().is_some() {
        let mut number = String::new();
        while matches!(chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
            number.push(chars.next().unwrap());
        }
        if number.is_empty() {
            return Err(mismatch(format!("expected a number in duration literal `{text}`")));
        }
        let mut unit = String::new();
        while matches!(chars.peek(), Some(c) if c.is_alphabetic()) {
            unit.push(chars.next().unwrap());
        }
        if unit.is_empty() {
            return Err(mismatch(format!("expected a unit suffix in duration literal `{text}`")));
        }
        let ns_per_unit: f64 = match unit.as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60.0 * 1_000_000_000.0,
            "h" => 3_600.0 * 1_000_000_000.0,
            "d" => 86_400.0 * 1_000_000_000.0,
            other => return Err(mismatch(format!("unknown duration unit `{other}` in `{text}`"))),
        };
        let value: f64 = number
            .parse()
            .map_err(|_| mismatch(format!("invalid numeric component `{number}` in `{text}`")))?;
        total_ns += (value * ns_per_unit).round() as i128;
        saw_group = true;
    }
    if !saw_group {
        return Err(mismatch(format!("`{text}` has no duration groups")));
    }
    let signed = if negative { -total_ns } else { total_ns };
    i64::try_from(signed).map_err(|_| Error::OverflowError {
        field: field.to_string(),
        reason: format!("duration `{text}` overflows i64 nanoseconds"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_inference_picks_seconds_millis_micros_nanos() {
        assert_eq!(infer_epoch_nanos("t", 1_700_000_000).unwrap(), 1_700_000_000 * NANOS_PER_SECOND);
        assert_eq!(infer_epoch_nanos("t", 1_700_000_000_000).unwrap(), 1_700_000_000_000 * 1_000_000);
        assert_eq!(infer_epoch_nanos("t", 1_700_000_000_000_000).unwrap(), 1_700_000_000_000_000 * 1_000);
        assert_eq!(infer_epoch_nanos("t", 1_700_000_000_000_000_000).unwrap(), 1_700_000_000_000_000_000);
    }

    #[test]
    fn parses_plain_date() {
        let nanos = parse_date("d", "2025-01-02").unwrap();
        assert_eq!(nanos, PrimitiveDateTime::new(
            Date::from_calendar_date(2025, time::Month::January, 2).unwrap(),
            time::Time::MIDNIGHT,
        ).assume_utc().unix_timestamp_nanos() as i64);
    }

    #[test]
    fn timestamptz_preserves_original_offset() {
        let text = "2025-01-02T10:30:00-05:00";
        assert_eq!(validate_timestamptz("ts", text).unwrap(), text);
    }

    #[test]
    fn duration_grammar_parses_concatenated_groups() {
        assert_eq!(parse_duration("d", "1h30m").unwrap(), 90 * 60 * NANOS_PER_SECOND);
        assert_eq!(parse_duration("d", "-1.5s").unwrap(), -1_500_000_000);
        assert_eq!(parse_duration("d", "500ms").unwrap(), 500_000_000);
        assert_eq!(parse_duration("d", "2d").unwrap(), 2 * 86_400 * NANOS_PER_SECOND);
    }

    #[test]
    fn duration_rejects_unknown_unit() {
        assert!(parse_duration("d", "5x").is_err());
    }
}
