//! [`Input`]: the neutral, dynamically-typed value an adapter hands to the
//! core when populating a [`crate::row::Row`] from an external record
//! (`spec.md` §4.5, §9 "Dynamic numeric coercion").
//!
//! This is the sum type the core's design notes call for in place of a
//! per-language reflective type-switch: an adapter (struct binding, map
//! binding, whatever a given language/ecosystem needs) converts its own
//! input into an `Input` once, and [`coerce`] applies every mapping rule in
//! `spec.md` §4.5 uniformly from there. The core never inspects a foreign
//! dynamic type directly; building the adapter side of that conversion
//! (reflection, codegen, proc-macros) is out of scope per `spec.md` §1.

use std::borrow::Cow;

use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::kind::FieldKind;
use crate::row::SlotValue;
use crate::temporal;

/// A dynamically-typed input value, covering every shape `spec.md` §4.5
/// requires an adapter to be able to hand the core.
#[derive(Debug, Clone)]
pub enum Input<'a> {
    /// Absent/null; always coerces to an unset slot regardless of kind.
    Null,
    Bool(bool),
    /// A signed integer input (accepted by `Int64` and, for non-negative
    /// values, `Uint64`, `Float64`, and the temporal kinds as an epoch).
    I64(i64),
    /// An unsigned integer input.
    U64(u64),
    /// A floating-point input (accepted by `Float64`, and by integer kinds
    /// when it holds an exact integral value).
    F64(f64),
    Str(Cow<'a, str>),
    Bytes(Cow<'a, [u8]>),
    /// A native date value, for `Date` fields.
    Date(time::Date),
    /// A native offset date-time value, for `DateTime`/`Timestamp`/
    /// `TimestampTZ` fields.
    DateTime(OffsetDateTime),
    /// A nested map input. Shaped like `{"value": X, "meta": ...}`, this
    /// unwraps to its `"value"` entry before kind-specific coercion
    /// (`spec.md` §4.5, "Nested envelope map inputs"); any other shape is
    /// rejected with [`Error::KindMismatch`].
    Map(Vec<(Cow<'a, str>, Input<'a>)>),
}

const SAFE_INTEGER_LIMIT: i128 = 1 << 53;

impl<'a> Input<'a> {
    /// Unwraps a `{"value": X, ...}` envelope map to `X`; any other input
    /// (including a `Map` without a `"value"` key) passes through
    /// unchanged.
    fn unwrap_envelope(self) -> Input<'a> {
        match self {
            Input::Map(mut entries) => match entries.iter().position(|(k, _)| k.as_ref() == "value") {
                Some(pos) => entries.remove(pos).1,
                None => Input::Map(entries),
            },
            other => other,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Input::Null => "null",
            Input::Bool(_) => "bool",
            Input::I64(_) => "i64",
            Input::U64(_) => "u64",
            Input::F64(_) => "f64",
            Input::Str(_) => "string",
            Input::Bytes(_) => "bytes",
            Input::Date(_) => "date",
            Input::DateTime(_) => "datetime",
            Input::Map(_) => "map",
        }
    }
}

fn mismatch(field: &str, expected: FieldKind, input: &Input) -> Error {
    Error::KindMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        reason: format!("cannot coerce a {} input into a {expected} field", input.describe()),
    }
}

fn overflow(field: &str, reason: impl Into<String>) -> Error {
    Error::OverflowError {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Coerces `input` into the [`SlotValue`] appropriate for a field of `kind`
/// named `field`, applying every numeric/temporal/text mapping rule in
/// `spec.md` §4.5. Returns `Ok(None)` for [`Input::Null`] (adapters map a
/// missing/null input to an absent slot, not an error).
pub fn coerce(field: &str, kind: FieldKind, input: Input) -> Result<Option<SlotValue<'static>>> {
    let input = input.unwrap_envelope();
    if matches!(input, Input::Null) {
        return Ok(None);
    }
    let value = match kind {
        FieldKind::Bool => match input {
            Input::Bool(b) => SlotValue::Bool(b),
            other => return Err(mismatch(field, kind, &other)),
        },
        FieldKind::Uint64 => SlotValue::U64(coerce_u64(field, input)?),
        FieldKind::Int64 => SlotValue::I64(coerce_i64(field, input)?),
        FieldKind::Float64 => SlotValue::F64(coerce_f64(field, input)?),
        FieldKind::String => match input {
            Input::Str(s) => SlotValue::Str(s.into_owned()),
            other => return Err(mismatch(field, kind, &other)),
        },
        FieldKind::Bytes => match input {
            Input::Bytes(b) => SlotValue::Bytes(Cow::Owned(b.into_owned())),
            other => return Err(mismatch(field, kind, &other)),
        },
        FieldKind::Date => SlotValue::I64(coerce_date(field, input)?),
        FieldKind::DateTime | FieldKind::Timestamp => SlotValue::I64(coerce_datetime(field, input)?),
        FieldKind::TimestampTZ => SlotValue::Str(coerce_timestamptz(field, input)?),
        FieldKind::Duration => SlotValue::I64(coerce_duration(field, input)?),
        FieldKind::Ref | FieldKind::Invalid => {
            return Err(Error::UnsupportedOperation {
                field: field.to_string(),
                reason: format!("field has unresolved kind {kind}; cannot coerce a value into it"),
            })
        }
    };
    Ok(Some(value))
}

fn coerce_u64(field: &str, input: Input) -> Result<u64> {
    match input {
        Input::U64(v) => Ok(v),
        Input::I64(v) => u64::try_from(v).map_err(|_| overflow(field, format!("negative value {v} for an unsigned field"))),
        Input::F64(v) => float_to_integer(field, v)?.try_into().map_err(|_| overflow(field, format!("negative value {v} for an unsigned field"))),
        other => Err(mismatch(field, FieldKind::Uint64, &other)),
    }
}

fn coerce_i64(field: &str, input: Input) -> Result<i64> {
    match input {
        Input::I64(v) => Ok(v),
        Input::U64(v) => i64::try_from(v).map_err(|_| overflow(field, format!("value {v} exceeds i64::MAX"))),
        Input::F64(v) => i64::try_from(float_to_integer(field, v)?).map_err(|_| overflow(field, format!("value {v} exceeds i64 range"))),
        other => Err(mismatch(field, FieldKind::Int64, &other)),
    }
}

fn coerce_f64(field: &str, input: Input) -> Result<f64> {
    match input {
        Input::F64(v) => Ok(v),
        Input::I64(v) => {
            check_safe_integer(field, v as i128)?;
            Ok(v as f64)
        }
        Input::U64(v) => {
            check_safe_integer(field, v as i128)?;
            Ok(v as f64)
        }
        other => Err(mismatch(field, FieldKind::Float64, &other)),
    }
}

/// Converts an exact-integral `f64` to an `i128`, rejecting fractional
/// values and magnitudes beyond 2^53 (`spec.md` §4.5, "exceeding 2^53 in
/// safe-number-mode paths must be surfaced rather than silently
/// truncated").
fn float_to_integer(field: &str, v: f64) -> Result<i128> {
    if v.fract() != 0.0 {
        return Err(Error::KindMismatch {
            field: field.to_string(),
            expected: "integer".to_string(),
            reason: format!("{v} is not an exact integer"),
        });
    }
    let as_i128 = v as i128;
    check_safe_integer(field, as_i128)?;
    Ok(as_i128)
}

fn check_safe_integer(field: &str, v: i128) -> Result<()> {
    if v.abs() > SAFE_INTEGER_LIMIT {
        return Err(overflow(field, format!("{v} exceeds the 2^53 safe-integer limit")));
    }
    Ok(())
}

fn coerce_date(field: &str, input: Input) -> Result<i64> {
    match input {
        Input::Date(d) => {
            let midnight =
                time::PrimitiveDateTime::new(d, time::Time::MIDNIGHT).assume_utc();
            i64::try_from(midnight.unix_timestamp_nanos())
                .map_err(|_| overflow(field, "date overflows i64 nanoseconds"))
        }
        Input::DateTime(odt) => i64::try_from(odt.unix_timestamp_nanos()).map_err(|_| overflow(field, "date overflows i64 nanoseconds")),
        Input::I64(v) => temporal::infer_epoch_nanos(field, v),
        Input::U64(v) => {
            let v = i64::try_from(v).map_err(|_| overflow(field, format!("epoch {v} exceeds i64 range")))?;
            temporal::infer_epoch_nanos(field, v)
        }
        Input::Str(s) => temporal::parse_date(field, &s),
        other => Err(mismatch(field, FieldKind::Date, &other)),
    }
}

fn coerce_datetime(field: &str, input: Input) -> Result<i64> {
    match input {
        Input::DateTime(odt) => i64::try_from(odt.unix_timestamp_nanos()).map_err(|_| overflow(field, "timestamp overflows i64 nanoseconds")),
        Input::Date(d) => {
            let midnight = time::PrimitiveDateTime::new(d, time::Time::MIDNIGHT).assume_utc();
            i64::try_from(midnight.unix_timestamp_nanos()).map_err(|_| overflow(field, "timestamp overflows i64 nanoseconds"))
        }
        Input::I64(v) => temporal::infer_epoch_nanos(field, v),
        Input::U64(v) => {
            let v = i64::try_from(v).map_err(|_| overflow(field, format!("epoch {v} exceeds i64 range")))?;
            temporal::infer_epoch_nanos(field, v)
        }
        Input::Str(s) => temporal::parse_datetime(field, &s),
        other => Err(mismatch(field, FieldKind::Timestamp, &other)),
    }
}

fn coerce_timestamptz(field: &str, input: Input) -> Result<String> {
    match input {
        Input::Str(s) => temporal::validate_timestamptz(field, &s),
        Input::DateTime(odt) => temporal::format_timestamptz(field, odt),
        other => Err(mismatch(field, FieldKind::TimestampTZ, &other)),
    }
}

fn coerce_duration(field: &str, input: Input) -> Result<i64> {
    match input {
        Input::I64(v) => Ok(v),
        Input::U64(v) => i64::try_from(v).map_err(|_| overflow(field, format!("duration {v} exceeds i64 range"))),
        Input::Str(s) => temporal::parse_duration(field, &s),
        other => Err(mismatch(field, FieldKind::Duration, &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_input_yields_no_slot() {
        assert!(coerce("f", FieldKind::Uint64, Input::Null).unwrap().is_none());
    }

    #[test]
    fn negative_integer_into_unsigned_field_overflows() {
        let err = coerce("f", FieldKind::Uint64, Input::I64(-1)).unwrap_err();
        assert!(matches!(err, Error::OverflowError { .. }));
    }

    #[test]
    fn integer_into_int64_accepts_either_sign() {
        assert_eq!(
            coerce("f", FieldKind::Int64, Input::I64(-7)).unwrap(),
            Some(SlotValue::I64(-7))
        );
        assert_eq!(
            coerce("f", FieldKind::Int64, Input::U64(7)).unwrap(),
            Some(SlotValue::I64(7))
        );
    }

    #[test]
    fn float_field_accepts_integer_input() {
        assert_eq!(
            coerce("f", FieldKind::Float64, Input::I64(5)).unwrap(),
            Some(SlotValue::F64(5.0))
        );
    }

    #[test]
    fn integer_exceeding_safe_range_is_surfaced() {
        let huge = (1i128 << 54) as i64;
        let err = coerce("f", FieldKind::Float64, Input::I64(huge)).unwrap_err();
        assert!(matches!(err, Error::OverflowError { .. }));
    }

    #[test]
    fn envelope_map_extracts_value() {
        let envelope = Input::Map(vec![
            ("value".into(), Input::Str("hello".into())),
            ("meta".into(), Input::Str("ignored".into())),
        ]);
        assert_eq!(
            coerce("f", FieldKind::String, envelope).unwrap(),
            Some(SlotValue::Str("hello".to_string()))
        );
    }

    #[test]
    fn epoch_scale_inference_applies_to_timestamp_fields() {
        let seconds = 1_700_000_000i64;
        let value = coerce("f", FieldKind::Timestamp, Input::I64(seconds)).unwrap();
        assert_eq!(value, Some(SlotValue::I64(seconds * 1_000_000_000)));
    }

    #[test]
    fn duration_string_uses_go_style_grammar() {
        let value = coerce("f", FieldKind::Duration, Input::Str("1h".into())).unwrap();
        assert_eq!(value, Some(SlotValue::I64(3_600_000_000_000)));
    }
}
