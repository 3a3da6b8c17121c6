//! The `SCB1` bundle envelope (`spec.md` §6): a fixed transport frame
//! combining a schema's DSL text, a fingerprint pair, and an encoded
//! payload for delivery as a single blob (e.g. by the HTTP gateway the
//! core deliberately does not implement, `spec.md` §1).

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprinter;
use crate::schema::Schema;

const MAGIC: &[u8; 4] = b"SCB1";
const VERSION: u8 = 0x01;

/// A parsed bundle: the DSL text and payload bytes a consumer needs to
/// reconstruct a [`Schema`] and feed a [`crate::stream::Reader`]
/// (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    doc_fingerprint: u64,
    schema_fingerprint: u64,
    updated_at_nanos: i64,
    doc_name: String,
    schema_name: String,
    schema_text: String,
    payload: Vec<u8>,
}

impl Bundle {
    /// FNV-1a/64 fingerprint over the raw DSL text bytes, distinct from
    /// the named schema's own fingerprint (`spec.md` §6 step 3).
    pub fn doc_fingerprint(&self) -> u64 {
        self.doc_fingerprint
    }

    /// The target schema's fingerprint, as produced by
    /// [`Schema::fingerprint`] (`spec.md` §6 step 4).
    pub fn schema_fingerprint(&self) -> u64 {
        self.schema_fingerprint
    }

    pub fn updated_at_nanos(&self) -> i64 {
        self.updated_at_nanos
    }

    pub fn doc_name(&self) -> &str {
        &self.doc_name
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// The DSL text this bundle carries; parse with
    /// [`crate::schema::Document::parse_str`] to recover the full document.
    pub fn schema_text(&self) -> &str {
        &self.schema_text
    }

    /// The payload blob: a full SCRT stream (`spec.md` §4) ready for a
    /// [`crate::stream::Reader`].
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Checks `schema`'s fingerprint against the one this bundle declares,
    /// as consumers are expected to do before trusting the payload
    /// (`spec.md` §6, "Consumers verify both fingerprints").
    pub fn verify_schema(&self, schema: &Schema) -> Result<()> {
        if schema.fingerprint() != self.schema_fingerprint {
            return Err(Error::FingerprintMismatch {
                schema: schema.name().to_string(),
                found: schema.fingerprint(),
                expected: self.schema_fingerprint,
            });
        }
        Ok(())
    }
}

fn doc_fingerprint_of(schema_text: &str) -> u64 {
    let mut hasher = Fingerprinter::new();
    hasher.write_str(schema_text);
    hasher.finish()
}

fn u16_len(field: &str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::UnsupportedOperation {
        field: field.to_string(),
        reason: format!("{len} bytes exceeds the bundle's u16 length prefix"),
    })
}

fn u32_len(field: &str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::UnsupportedOperation {
        field: field.to_string(),
        reason: format!("{len} bytes exceeds the bundle's u32 length prefix"),
    })
}

/// Encodes a `SCB1` bundle frame (`spec.md` §6). `schema` provides the
/// schema fingerprint; `schema_text` is the DSL source that defines it
/// (and whatever else the document contains) and also determines the
/// document fingerprint.
pub fn encode(
    doc_name: &str,
    schema: &Schema,
    schema_text: &str,
    updated_at_nanos: i64,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let doc_len = u16_len("doc_name", doc_name.len())?;
    let schema_name_len = u16_len("schema_name", schema.name().len())?;
    let schema_text_len = u32_len("schema_text", schema_text.len())?;
    let payload_len = u32_len("payload", payload.len())?;

    let mut out = Vec::with_capacity(
        4 + 1 + 8 + 8 + 8 + 2 + doc_name.len() + 2 + schema.name().len() + 4 + schema_text.len() + 4 + payload.len(),
    );
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&doc_fingerprint_of(schema_text).to_le_bytes());
    out.extend_from_slice(&schema.fingerprint().to_le_bytes());
    out.extend_from_slice(&updated_at_nanos.to_le_bytes());
    out.extend_from_slice(&doc_len.to_le_bytes());
    out.extend_from_slice(doc_name.as_bytes());
    out.extend_from_slice(&schema_name_len.to_le_bytes());
    out.extend_from_slice(schema.name().as_bytes());
    out.extend_from_slice(&schema_text_len.to_le_bytes());
    out.extend_from_slice(schema_text.as_bytes());
    out.extend_from_slice(&payload_len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decodes a `SCB1` bundle frame, validating the magic and version but
/// not the fingerprints themselves; call [`Bundle::verify_schema`] once
/// the schema named by [`Bundle::schema_name`] has been resolved.
pub fn decode(buf: &[u8]) -> Result<Bundle> {
    let mut cursor = 0usize;
    let take = |cursor: &mut usize, n: usize, what: &str| -> Result<std::ops::Range<usize>> {
        if buf.len() < *cursor + n {
            return Err(Error::Malformed {
                reason: format!("bundle truncated while reading {what}"),
                offset: buf.len() as u64,
            });
        }
        let range = *cursor..*cursor + n;
        *cursor += n;
        Ok(range)
    };

    let magic = &buf[take(&mut cursor, 4, "magic")?];
    if magic != MAGIC {
        return Err(Error::InvalidHeader(format!("expected bundle magic {MAGIC:?}, found {magic:?}")));
    }
    let version = buf[take(&mut cursor, 1, "version")?.start];
    if version != VERSION {
        return Err(Error::InvalidHeader(format!("unsupported bundle version {version}, expected {VERSION}")));
    }
    let doc_fingerprint = u64::from_le_bytes(buf[take(&mut cursor, 8, "document fingerprint")?].try_into().unwrap());
    let schema_fingerprint = u64::from_le_bytes(buf[take(&mut cursor, 8, "schema fingerprint")?].try_into().unwrap());
    let updated_at_nanos = i64::from_le_bytes(buf[take(&mut cursor, 8, "updated_at")?].try_into().unwrap());

    let doc_name_len = u16::from_le_bytes(buf[take(&mut cursor, 2, "document name length")?].try_into().unwrap()) as usize;
    let doc_name = std::str::from_utf8(&buf[take(&mut cursor, doc_name_len, "document name")?])
        .map_err(|e| Error::Malformed { reason: format!("document name is not valid UTF-8: {e}"), offset: cursor as u64 })?
        .to_string();

    let schema_name_len = u16::from_le_bytes(buf[take(&mut cursor, 2, "schema name length")?].try_into().unwrap()) as usize;
    let schema_name = std::str::from_utf8(&buf[take(&mut cursor, schema_name_len, "schema name")?])
        .map_err(|e| Error::Malformed { reason: format!("schema name is not valid UTF-8: {e}"), offset: cursor as u64 })?
        .to_string();

    let schema_text_len = u32::from_le_bytes(buf[take(&mut cursor, 4, "schema text length")?].try_into().unwrap()) as usize;
    let schema_text = std::str::from_utf8(&buf[take(&mut cursor, schema_text_len, "schema text")?])
        .map_err(|e| Error::Malformed { reason: format!("schema text is not valid UTF-8: {e}"), offset: cursor as u64 })?
        .to_string();

    let payload_len = u32::from_le_bytes(buf[take(&mut cursor, 4, "payload length")?].try_into().unwrap()) as usize;
    let payload = buf[take(&mut cursor, payload_len, "payload")?].to_vec();

    Ok(Bundle {
        doc_fingerprint,
        schema_fingerprint,
        updated_at_nanos,
        doc_name,
        schema_name,
        schema_text,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::FieldKind;
    use crate::schema::Field;

    fn log_schema() -> Schema {
        Schema::builder("Log")
            .field(Field::new("ID", "uint64", FieldKind::Uint64))
            .finalize()
            .unwrap()
    }

    #[test]
    fn round_trips_a_bundle() {
        let schema = log_schema();
        let text = "schema Log\nfields:\nID uint64\n";
        let payload = vec![1, 2, 3, 4];
        let bytes = encode("demo.scrt", &schema, text, 123_456_789, &payload).unwrap();

        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(bytes[4], VERSION);

        let bundle = decode(&bytes).unwrap();
        assert_eq!(bundle.doc_name(), "demo.scrt");
        assert_eq!(bundle.schema_name(), "Log");
        assert_eq!(bundle.schema_text(), text);
        assert_eq!(bundle.payload(), payload.as_slice());
        assert_eq!(bundle.updated_at_nanos(), 123_456_789);
        assert_eq!(bundle.schema_fingerprint(), schema.fingerprint());
        bundle.verify_schema(&schema).unwrap();
    }

    #[test]
    fn verify_schema_rejects_fingerprint_drift() {
        let schema = log_schema();
        let bytes = encode("demo.scrt", &schema, "schema Log\nfields:\nID uint64\n", 0, &[]).unwrap();
        let bundle = decode(&bytes).unwrap();
        let drifted = Schema::builder("Log")
            .field(Field::new("ID", "int64", FieldKind::Int64))
            .finalize()
            .unwrap();
        let err = bundle.verify_schema(&drifted).unwrap_err();
        assert!(matches!(err, Error::FingerprintMismatch { .. }));
    }

    #[test]
    fn rejects_bad_magic() {
        let err = decode(b"NOPE").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn rejects_truncated_frame() {
        let schema = log_schema();
        let bytes = encode("d", &schema, "schema Log\nfields:\nID uint64\n", 0, &[9, 9]).unwrap();
        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }
}
