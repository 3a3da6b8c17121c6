//! [`Field`] and its typed default value (`spec.md` §3, §4.6).

use crate::error::{Error, Result, SchemaError};
use crate::kind::FieldKind;
use crate::row::SlotValue;

/// A parsed, typed default value for a field, stored in the kind's native
/// representation rather than as a raw literal string (`spec.md` §9,
/// "Default-value storage").
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Backs `Bool` fields.
    Bool(bool),
    /// Backs `Int64` and the signed-nanosecond temporal kinds.
    I64(i64),
    /// Backs `Uint64` and resolved `Ref` fields.
    U64(u64),
    /// Backs `Float64` fields.
    F64(f64),
    /// Backs `String` and `TimestampTZ` fields.
    Str(String),
    /// Backs `Bytes` fields.
    Bytes(Vec<u8>),
}

impl DefaultValue {
    /// Converts this default into the [`SlotValue`] used to rehydrate a
    /// `Row` slot when a column omits a value.
    pub fn to_slot_value(&self) -> SlotValue<'static> {
        match self {
            DefaultValue::Bool(v) => SlotValue::Bool(*v),
            DefaultValue::I64(v) => SlotValue::I64(*v),
            DefaultValue::U64(v) => SlotValue::U64(*v),
            DefaultValue::F64(v) => SlotValue::F64(*v),
            DefaultValue::Str(v) => SlotValue::Str(v.clone()),
            DefaultValue::Bytes(v) => SlotValue::Bytes(v.clone().into()),
        }
    }

    /// Returns the kind-qualified canonical fingerprint key for this
    /// default, per `spec.md` §6: `bool:0|1`, `int:<decimal>`,
    /// `uint:<decimal>`, `float:<value>`, `string:<raw>`,
    /// `bytes:<base64>`, or (for `TimestampTZ`) `timestamptz:<string>`.
    pub fn canonical_key(&self, kind: FieldKind) -> String {
        match self {
            DefaultValue::Bool(v) => format!("bool:{}", if *v { 1 } else { 0 }),
            DefaultValue::I64(v) => format!("int:{v}"),
            DefaultValue::U64(v) => format!("uint:{v}"),
            DefaultValue::F64(v) => format!("float:{v}"),
            DefaultValue::Str(v) => {
                if kind == FieldKind::TimestampTZ {
                    format!("timestamptz:{v}")
                } else {
                    format!("string:{v}")
                }
            }
            DefaultValue::Bytes(v) => format!("bytes:{}", base64_standard(v)),
        }
    }
}

/// Minimal standard (RFC 4648), padded base64 encoder; used only to render
/// a `Bytes` default into its canonical fingerprint key.
fn base64_standard(data: &[u8]) -> String {
    const ALPHABET: &[u8; 64] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
        if let Some(b1) = b1 {
            out.push(ALPHABET[(((b1 & 0x0f) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char);
        } else {
            out.push('=');
        }
        if let Some(b2) = b2 {
            out.push(ALPHABET[(b2 & 0x3f) as usize] as char);
        } else {
            out.push('=');
        }
    }
    out
}

/// A single field declaration within a [`crate::schema::Schema`].
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    /// The original DSL type token, preserved verbatim for the fingerprint
    /// (e.g. `"uint"` and `"uint64"` fingerprint differently even though
    /// both resolve to [`FieldKind::Uint64`]).
    raw_type: String,
    kind: FieldKind,
    target_schema: Option<String>,
    target_field: Option<String>,
    auto_increment: bool,
    /// Unknown/recognized attribute tokens, sorted ascending, lowercased,
    /// excluding `auto_increment`/`default` which have dedicated fields.
    attributes: Vec<String>,
    default: Option<DefaultValue>,
    /// Raw default literal, set instead of `default` only for `Ref` fields
    /// whose resolved kind is not yet known (`spec.md` §9, OQ3).
    default_literal: Option<String>,
    resolved_kind: FieldKind,
}

impl Field {
    /// Creates a plain, non-reference field of a concrete `kind`. The
    /// resolved kind is the kind itself.
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
            kind,
            target_schema: None,
            target_field: None,
            auto_increment: false,
            attributes: Vec::new(),
            default: None,
            default_literal: None,
            resolved_kind: kind,
        }
    }

    /// Creates a `Ref` field pointing at `target_schema.target_field`. Its
    /// resolved kind is [`FieldKind::Invalid`] until a
    /// [`crate::schema::Document`] resolves it.
    pub fn new_ref(
        name: impl Into<String>,
        raw_type: impl Into<String>,
        target_schema: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
            kind: FieldKind::Ref,
            target_schema: Some(target_schema.into()),
            target_field: Some(target_field.into()),
            auto_increment: false,
            attributes: Vec::new(),
            default: None,
            default_literal: None,
            resolved_kind: FieldKind::Invalid,
        }
    }

    /// Marks this field as auto-increment (builder style).
    pub fn with_auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Attaches a sorted, deduplicated set of lowercase attribute tokens
    /// (builder style). `auto_increment`/`default` tokens should not be
    /// passed here; use [`Field::with_auto_increment`] and
    /// [`Field::with_default`]/[`Field::with_default_literal`] instead.
    pub fn with_attributes(mut self, mut attrs: Vec<String>) -> Self {
        attrs.sort();
        attrs.dedup();
        self.attributes = attrs;
        self
    }

    /// Attaches an already-typed default value (builder style). Only valid
    /// for non-`Ref` fields, since the kind is known up front.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Attaches a raw default literal to be parsed once this field's
    /// resolved kind is known (used for `Ref` fields during DSL parsing).
    pub fn with_default_literal(mut self, literal: impl Into<String>) -> Self {
        self.default_literal = Some(literal.into());
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Original DSL type token.
    pub fn raw_type(&self) -> &str {
        &self.raw_type
    }

    /// Declared kind (`Ref` for reference fields, even after resolution).
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// The kind this field behaves as on the wire: equal to `kind()` for
    /// non-`Ref` fields, and the resolved target kind for `Ref` fields
    /// after [`crate::schema::Document::finalize`] has run.
    pub fn resolved_kind(&self) -> FieldKind {
        self.resolved_kind
    }

    /// `true` if this field is auto-increment.
    pub fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Sorted, lowercase attribute tokens (excluding `auto_increment`/`default`).
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// The target schema name, for `Ref` fields.
    pub fn target_schema(&self) -> Option<&str> {
        self.target_schema.as_deref()
    }

    /// The target field name, for `Ref` fields.
    pub fn target_field(&self) -> Option<&str> {
        self.target_field.as_deref()
    }

    /// The field's typed default value, if one was supplied and (for `Ref`
    /// fields) already resolved.
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// `true` if this is a reference field.
    pub fn is_ref(&self) -> bool {
        self.kind == FieldKind::Ref
    }

    pub(crate) fn set_resolved_kind(&mut self, kind: FieldKind) {
        self.resolved_kind = kind;
    }

    pub(crate) fn default_literal(&self) -> Option<&str> {
        self.default_literal.as_deref()
    }

    pub(crate) fn take_default_literal(&mut self) -> Option<String> {
        self.default_literal.take()
    }

    pub(crate) fn set_default(&mut self, default: DefaultValue) {
        self.default = Some(default);
    }

    /// Validates that a concrete (non-`Ref`) field's default, if any,
    /// matches its own kind, and parses any deferred literal now that the
    /// kind is settled. No-op if there is nothing to do.
    pub(crate) fn finalize_default(&mut self) -> Result<()> {
        if let Some(literal) = self.take_default_literal() {
            let parsed = parse_default_literal(self.resolved_kind, &literal).map_err(|reason| {
                Error::Schema(SchemaError::Parse {
                    line: 0,
                    reason: format!("field `{}`: {reason}", self.name),
                })
            })?;
            self.default = Some(parsed);
        }
        Ok(())
    }
}

/// Parses a DSL default literal (`spec.md` §4.6) into a typed
/// [`DefaultValue`] appropriate for `kind`.
///
/// Literal syntax: integers in decimal (optionally signed), floats with a
/// `.`, booleans `true`/`false`/`0`/`1`, strings quoted with `"`, `'`, or
/// `` ` ``, and bytes as `0x`-prefixed hex or a quoted string.
pub fn parse_default_literal(kind: FieldKind, literal: &str) -> std::result::Result<DefaultValue, String> {
    let literal = literal.trim();
    match kind {
        FieldKind::Bool => match literal {
            "true" | "1" => Ok(DefaultValue::Bool(true)),
            "false" | "0" => Ok(DefaultValue::Bool(false)),
            other => Err(format!("`{other}` is not a valid bool literal")),
        },
        FieldKind::Uint64 => literal
            .parse::<u64>()
            .map(DefaultValue::U64)
            .map_err(|_| format!("`{literal}` is not a valid uint64 literal")),
        FieldKind::Int64 | FieldKind::Date | FieldKind::DateTime | FieldKind::Timestamp | FieldKind::Duration => {
            literal
                .parse::<i64>()
                .map(DefaultValue::I64)
                .map_err(|_| format!("`{literal}` is not a valid int64 literal"))
        }
        FieldKind::Float64 => literal
            .parse::<f64>()
            .map(DefaultValue::F64)
            .map_err(|_| format!("`{literal}` is not a valid float64 literal")),
        FieldKind::String | FieldKind::TimestampTZ => unquote(literal)
            .map(|s| DefaultValue::Str(s.to_string()))
            .ok_or_else(|| format!("`{literal}` is not a quoted string literal")),
        FieldKind::Bytes => {
            if let Some(hex) = literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
                parse_hex(hex).map(DefaultValue::Bytes)
            } else if let Some(s) = unquote(literal) {
                Ok(DefaultValue::Bytes(s.as_bytes().to_vec()))
            } else {
                Err(format!("`{literal}` is not a valid bytes literal"))
            }
        }
        FieldKind::Ref | FieldKind::Invalid => {
            Err("cannot parse a default literal for an unresolved Ref/Invalid kind".to_string())
        }
    }
}

fn unquote(literal: &str) -> Option<&str> {
    let bytes = literal.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'' || first == b'`') && first == last {
            return Some(&literal[1..literal.len() - 1]);
        }
    }
    None
}

fn parse_hex(hex: &str) -> std::result::Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err(format!("hex literal `0x{hex}` has an odd number of digits"));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("invalid hex digit in `0x{hex}`")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FieldKind::Bool, "true", DefaultValue::Bool(true))]
    #[case(FieldKind::Bool, "0", DefaultValue::Bool(false))]
    #[case(FieldKind::Uint64, "42", DefaultValue::U64(42))]
    #[case(FieldKind::Int64, "-7", DefaultValue::I64(-7))]
    #[case(FieldKind::Float64, "3.5", DefaultValue::F64(3.5))]
    #[case(FieldKind::String, "\"en\"", DefaultValue::Str("en".to_string()))]
    #[case(FieldKind::String, "'en'", DefaultValue::Str("en".to_string()))]
    #[case(FieldKind::String, "`en`", DefaultValue::Str("en".to_string()))]
    #[case(FieldKind::Bytes, "0xDEAD", DefaultValue::Bytes(vec![0xde, 0xad]))]
    fn literal_parsing(#[case] kind: FieldKind, #[case] literal: &str, #[case] expected: DefaultValue) {
        assert_eq!(parse_default_literal(kind, literal).unwrap(), expected);
    }

    #[test]
    fn uint64_rejects_negative() {
        assert!(parse_default_literal(FieldKind::Uint64, "-1").is_err());
    }

    #[test]
    fn canonical_key_distinguishes_string_and_timestamptz() {
        let v = DefaultValue::Str("2025-01-02T10:30:00-05:00".to_string());
        assert_eq!(v.canonical_key(FieldKind::String), "string:2025-01-02T10:30:00-05:00");
        assert_eq!(
            v.canonical_key(FieldKind::TimestampTZ),
            "timestamptz:2025-01-02T10:30:00-05:00"
        );
    }

    #[test]
    fn base64_padding_matches_known_vectors() {
        assert_eq!(base64_standard(b"f"), "Zg==");
        assert_eq!(base64_standard(b"fo"), "Zm8=");
        assert_eq!(base64_standard(b"foo"), "Zm9v");
        assert_eq!(base64_standard(b""), "");
    }
}
