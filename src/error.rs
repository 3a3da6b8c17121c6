//! Crate-wide error taxonomy.
//!
//! Every codec entry point returns [`Result`]; nothing in this crate retries
//! or recovers internally, and partial state is discarded by dropping the
//! offending `Writer`/`Reader`/`Document`.

use thiserror::Error;

/// A specialized `Result` for SCRT operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The top-level error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// DSL parse failure, unknown kind, unresolved/cyclic reference, or a
    /// duplicate schema/field definition.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A stream's embedded fingerprint did not match the schema it was
    /// decoded against.
    #[error("fingerprint mismatch: stream carries {found:#018x}, schema `{schema}` is {expected:#018x}")]
    FingerprintMismatch {
        /// The schema the stream was decoded against.
        schema: String,
        /// The fingerprint embedded in the stream header.
        found: u64,
        /// The fingerprint of the schema used for decoding.
        expected: u64,
    },

    /// Bad magic bytes or an unsupported version byte in a stream or bundle
    /// header.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Structurally corrupt input: a truncated page, an overflowing
    /// varint, a page length that runs past the buffer, or a malformed
    /// column frame.
    #[error("malformed input at byte offset {offset}: {reason}")]
    Malformed {
        /// Reason the input could not be parsed.
        reason: String,
        /// Best-effort byte offset into the stream/buffer being decoded.
        offset: u64,
    },

    /// A column's declared value count did not equal the population count
    /// of its presence bitmap.
    #[error("column `{field}` declares {declared} values but presence bitmap has popcount {popcount}")]
    CountMismatch {
        /// Name of the offending field.
        field: String,
        /// Value count read from the column header.
        declared: u64,
        /// Popcount of the column's presence bitmap.
        popcount: u64,
    },

    /// A DSL data value, or an adapter input value, did not match the
    /// field's kind.
    #[error("field `{field}` expected kind {expected}, found value incompatible with it: {reason}")]
    KindMismatch {
        /// Name of the offending field.
        field: String,
        /// The field's declared/resolved kind, rendered for display.
        expected: String,
        /// Human-readable detail about the mismatch.
        reason: String,
    },

    /// An integer coercion overflowed, such as an unsigned field receiving
    /// a negative input or a value exceeding the target width.
    #[error("overflow converting value for field `{field}`: {reason}")]
    OverflowError {
        /// Name of the offending field.
        field: String,
        /// Human-readable detail about the overflow.
        reason: String,
    },

    /// An operation was requested against a field whose kind does not
    /// permit it (e.g. a delta-mode query against a string column).
    #[error("unsupported operation on field `{field}`: {reason}")]
    UnsupportedOperation {
        /// Name of the offending field.
        field: String,
        /// Human-readable detail about why the operation is unsupported.
        reason: String,
    },

    /// The underlying sink or source failed.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors specific to parsing and resolving a schema DSL document.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The DSL text could not be tokenized/parsed at all.
    #[error("parse error at line {line}: {reason}")]
    Parse {
        /// 1-based line number where parsing failed.
        line: usize,
        /// Human-readable detail.
        reason: String,
    },

    /// A type token did not match any known field kind or `ref:` form.
    #[error("unknown type token `{token}` for field `{field}`")]
    UnknownKind {
        /// Name of the field that declared the unknown type.
        field: String,
        /// The offending raw type token.
        token: String,
    },

    /// A `Ref` field's target schema or field could not be found.
    #[error("field `{field}` references unknown target `{target_schema}.{target_field}`")]
    UnknownReference {
        /// Name of the referencing field.
        field: String,
        /// Name of the target schema that could not be found.
        target_schema: String,
        /// Name of the target field that could not be found.
        target_field: String,
    },

    /// A chain of `Ref` fields forms a cycle.
    #[error("circular reference detected between `{from}` and `{to}`")]
    Cycle {
        /// The field where the cycle was detected.
        from: String,
        /// The field that closes the cycle.
        to: String,
    },

    /// A schema was finalized directly (outside a [`crate::schema::Document`])
    /// while still containing an unresolved `Ref` field.
    #[error("field `{0}` is a Ref and must be resolved via Document::finalize before the schema can be finalized")]
    UnresolvedReference(String),

    /// Two schemas in the same document share a name.
    #[error("duplicate schema name `{0}`")]
    DuplicateSchema(String),

    /// Two fields in the same schema share a name.
    #[error("duplicate field name `{0}` in schema `{1}`")]
    DuplicateField(String, String),

    /// A row in a data section referenced a field name the schema does
    /// not declare.
    #[error("unknown field `{field}` in data row for schema `{schema}`")]
    UnknownField {
        /// Schema the offending row belongs to.
        schema: String,
        /// The unknown field name.
        field: String,
    },

    /// A data row supplied more positional values than the schema has
    /// non-auto-increment fields remaining.
    #[error("too many positional values in data row for schema `{schema}`: expected at most {expected}, found {found}")]
    TooManyValues {
        /// Schema the offending row belongs to.
        schema: String,
        /// Maximum number of positional values the row could supply.
        expected: usize,
        /// Number of positional values actually supplied.
        found: usize,
    },
}
