//! [`FieldKind`]: the closed set of field types SCRT can encode, and their
//! stable wire tags.

use std::fmt::{self, Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The kind of a schema field, with the stable numeric tag used on the wire
/// (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FieldKind {
    /// Sentinel for an unset/unparsed kind; never valid in a finalized schema.
    #[default]
    Invalid = 0,
    /// Unsigned 64-bit integer.
    Uint64 = 1,
    /// UTF-8 string, dictionary-encoded per page.
    String = 2,
    /// Symbolic reference to another schema's field; resolves to a
    /// concrete, non-`Ref` kind before encoding.
    Ref = 3,
    /// Boolean.
    Bool = 4,
    /// Signed 64-bit integer.
    Int64 = 5,
    /// IEEE-754 binary64 float.
    Float64 = 6,
    /// Arbitrary byte sequence.
    Bytes = 7,
    /// Calendar date, stored as nanoseconds since Unix epoch of UTC midnight.
    Date = 8,
    /// Naive date-time, stored as nanoseconds since epoch, UTC.
    DateTime = 9,
    /// Timestamp, stored as nanoseconds since epoch, UTC.
    Timestamp = 10,
    /// Timestamp with an explicit offset, stored as an RFC3339 string.
    TimestampTZ = 11,
    /// Signed duration, stored as nanoseconds.
    Duration = 12,
}

impl FieldKind {
    /// Returns the kind that actually appears on the wire for this kind:
    /// every kind is its own wire kind except [`FieldKind::Ref`], which
    /// only exists pre-resolution and is never itself written to a column
    /// frame.
    ///
    /// `Ref` fields must be resolved via [`crate::schema::Field::resolved_kind`]
    /// before encoding; calling this on `Ref` reflects that `Ref` has no
    /// independent wire representation.
    pub fn is_ref(self) -> bool {
        matches!(self, FieldKind::Ref)
    }

    /// True for kinds whose wire column encoding is the uint64 column
    /// codec (`spec.md` §4.2).
    pub fn uses_uint64_column(self) -> bool {
        matches!(self, FieldKind::Uint64)
    }

    /// True for kinds whose wire column encoding is the int64 column codec,
    /// i.e. all signed-nanosecond temporal kinds plus `Int64` itself.
    pub fn uses_int64_column(self) -> bool {
        matches!(
            self,
            FieldKind::Int64
                | FieldKind::Date
                | FieldKind::DateTime
                | FieldKind::Timestamp
                | FieldKind::Duration
        )
    }

    /// True for kinds whose wire column encoding is the float64 column codec.
    pub fn uses_float64_column(self) -> bool {
        matches!(self, FieldKind::Float64)
    }

    /// True for kinds whose wire column encoding is the bool column codec.
    pub fn uses_bool_column(self) -> bool {
        matches!(self, FieldKind::Bool)
    }

    /// True for kinds whose wire column encoding is the dictionary-encoded
    /// string column codec: `String` itself and `TimestampTZ`, which is
    /// stored as an RFC3339 string (`spec.md` §4.2).
    pub fn uses_string_column(self) -> bool {
        matches!(self, FieldKind::String | FieldKind::TimestampTZ)
    }

    /// True for kinds whose wire column encoding is the bytes column codec.
    pub fn uses_bytes_column(self) -> bool {
        matches!(self, FieldKind::Bytes)
    }

    /// Parses a DSL type token (case-insensitively, with aliases per
    /// `spec.md` §4.6) into a `FieldKind`. Does not accept `ref:...`
    /// tokens; callers handle those separately since they carry a target.
    pub fn parse_primitive(token: &str) -> Option<FieldKind> {
        let lower = token.to_ascii_lowercase();
        Some(match lower.as_str() {
            "uint64" | "uint" => FieldKind::Uint64,
            "string" | "str" | "text" => FieldKind::String,
            "bool" | "boolean" => FieldKind::Bool,
            "int64" | "int" => FieldKind::Int64,
            "float64" | "double" => FieldKind::Float64,
            "bytes" | "blob" => FieldKind::Bytes,
            "date" => FieldKind::Date,
            "datetime" => FieldKind::DateTime,
            "timestamp" => FieldKind::Timestamp,
            "timestamptz" => FieldKind::TimestampTZ,
            "duration" => FieldKind::Duration,
            _ => return None,
        })
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Invalid => "invalid",
            FieldKind::Uint64 => "uint64",
            FieldKind::String => "string",
            FieldKind::Ref => "ref",
            FieldKind::Bool => "bool",
            FieldKind::Int64 => "int64",
            FieldKind::Float64 => "float64",
            FieldKind::Bytes => "bytes",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
            FieldKind::Timestamp => "timestamp",
            FieldKind::TimestampTZ => "timestamptz",
            FieldKind::Duration => "duration",
        };
        f.write_str(name)
    }
}
