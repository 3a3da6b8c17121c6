//! Streaming row reader (`spec.md` §4.4).

use std::io::Read;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::page::{decode_page, extend_page_lifetime, DecodedPage};
use crate::row::Row;
use crate::schema::Schema;
use crate::varint::{read_uvarint, MAX_UVARINT_LEN};

/// Reads rows back out of a stream written by [`super::Writer`]
/// (`spec.md` §4.4).
///
/// `Reader` validates the header (magic, version, schema fingerprint) the
/// first time a row is requested, then decodes one page at a time into an
/// internal buffer. With `zero_copy_bytes` enabled, `Bytes` slots returned
/// from [`Reader::read_row`] alias that internal buffer and are only valid
/// until the next call to `read_row` that crosses into a new page —
/// accessing them past that point is undefined (`spec.md` §8, "Zero-copy
/// safety"). The borrow checker enforces the weaker, always-safe bound:
/// the returned [`Row`] cannot outlive the `&mut self` borrow of the call
/// that produced it.
pub struct Reader<R: Read> {
    inner: R,
    schema: Arc<Schema>,
    zero_copy_bytes: bool,
    header_validated: bool,
    page_buf: Vec<u8>,
    decoded: Option<DecodedPage<'static>>,
    row_cursor: usize,
    exhausted: bool,
}

impl<R: Read> Reader<R> {
    /// Creates a reader for `schema`, copying `Bytes` slots by default.
    pub fn new(inner: R, schema: Arc<Schema>) -> Self {
        Self {
            inner,
            schema,
            zero_copy_bytes: false,
            header_validated: false,
            page_buf: Vec::new(),
            decoded: None,
            row_cursor: 0,
            exhausted: false,
        }
    }

    /// When `enabled`, decoded `Bytes` slots alias this reader's internal
    /// page buffer instead of being copied (`spec.md` §4.4).
    pub fn with_zero_copy_bytes(mut self, enabled: bool) -> Self {
        self.zero_copy_bytes = enabled;
        self
    }

    /// Returns a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Returns a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consumes the reader, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.header_validated {
            return Ok(());
        }
        let mut magic = [0u8; 4];
        self.inner.read_exact(&mut magic)?;
        if &magic != super::MAGIC {
            return Err(Error::InvalidHeader(format!(
                "expected magic {:?}, found {magic:?}",
                super::MAGIC
            )));
        }
        let mut version = [0u8; 1];
        self.inner.read_exact(&mut version)?;
        if version[0] != super::VERSION {
            return Err(Error::InvalidHeader(format!(
                "unsupported stream version {}, expected {}",
                version[0],
                super::VERSION
            )));
        }
        let mut fp_bytes = [0u8; 8];
        self.inner.read_exact(&mut fp_bytes)?;
        let found = u64::from_le_bytes(fp_bytes);
        let expected = self.schema.fingerprint();
        if found != expected {
            return Err(Error::FingerprintMismatch {
                schema: self.schema.name().to_string(),
                found,
                expected,
            });
        }
        self.header_validated = true;
        Ok(())
    }

    /// Reads the page-length varint that precedes every page frame,
    /// distinguishing a clean end-of-stream (no bytes available before the
    /// first varint byte) from a truncated one.
    fn read_page_len(&mut self) -> Result<Option<u64>> {
        let mut len_bytes = Vec::with_capacity(1);
        let mut byte = [0u8; 1];
        loop {
            let n = self.inner.read(&mut byte)?;
            if n == 0 {
                return if len_bytes.is_empty() {
                    Ok(None)
                } else {
                    Err(Error::Malformed {
                        reason: "stream ended mid page-length varint".to_string(),
                        offset: len_bytes.len() as u64,
                    })
                };
            }
            len_bytes.push(byte[0]);
            if byte[0] & 0x80 == 0 {
                break;
            }
            if len_bytes.len() >= MAX_UVARINT_LEN {
                return Err(Error::Malformed {
                    reason: "page-length varint exceeds 10 bytes".to_string(),
                    offset: len_bytes.len() as u64,
                });
            }
        }
        let (len, _) = read_uvarint(&len_bytes)?;
        Ok(Some(len))
    }

    /// Loads the next page into `self.page_buf` and decodes it. Returns
    /// `false` once a zero-length page or clean end-of-input is reached.
    fn load_next_page(&mut self) -> Result<bool> {
        let page_len = match self.read_page_len()? {
            Some(0) | None => {
                self.exhausted = true;
                return Ok(false);
            }
            Some(len) => len as usize,
        };
        self.page_buf.clear();
        self.page_buf.resize(page_len, 0);
        self.inner.read_exact(&mut self.page_buf)?;
        let (decoded, consumed) = decode_page(&self.page_buf, &self.schema, self.zero_copy_bytes)?;
        if consumed != self.page_buf.len() {
            return Err(Error::Malformed {
                reason: format!(
                    "page frame declared {} bytes but only {consumed} were consumed",
                    self.page_buf.len()
                ),
                offset: consumed as u64,
            });
        }
        // SAFETY: see `extend_page_lifetime`. We only replace `page_buf`'s
        // contents the next time this function runs, at which point the
        // previous `decoded` value (and any zero-copy slices it exposed)
        // has already been dropped by the assignment below.
        self.decoded = Some(unsafe { extend_page_lifetime(decoded) });
        self.row_cursor = 0;
        Ok(true)
    }

    /// Decodes the next row (`spec.md` §4.4). Returns `Ok(None)` once the
    /// stream is cleanly exhausted. Fields whose presence bit was unset
    /// are filled from the schema's default, if one is configured;
    /// otherwise the returned row leaves that slot unset.
    pub fn read_row<'r>(&'r mut self) -> Result<Option<Row<'r>>> {
        self.ensure_header()?;
        loop {
            let has_row = self
                .decoded
                .as_ref()
                .is_some_and(|page| self.row_cursor < page.row_count());
            if has_row {
                let schema = Arc::clone(&self.schema);
                let mut row = Row::new(schema);
                {
                    let page = self.decoded.as_ref().expect("checked above");
                    for (i, field) in self.schema.fields().iter().enumerate() {
                        match page.get(self.row_cursor, i) {
                            Some(value) => {
                                row.set_by_index(i, value.clone())?;
                            }
                            None => {
                                if let Some(default) = field.default_value() {
                                    row.set_by_index(i, default.to_slot_value())?;
                                }
                            }
                        }
                    }
                }
                self.row_cursor += 1;
                return Ok(Some(row));
            }
            if self.exhausted {
                return Ok(None);
            }
            if !self.load_next_page()? {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::FieldKind;
    use crate::row::SlotValue;
    use crate::schema::{Field, Schema};
    use crate::stream::Writer;

    fn log_schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("Log")
                .field(Field::new("ID", "uint64", FieldKind::Uint64))
                .field(Field::new("Msg", "string", FieldKind::String))
                .finalize()
                .unwrap(),
        )
    }

    #[test]
    fn round_trips_rows_through_a_stream() {
        let schema = log_schema();
        let mut writer = Writer::new(Vec::new(), Arc::clone(&schema)).with_rows_per_page(1);
        for (id, msg) in [(1u64, "a"), (2, "b"), (3, "c")] {
            let mut row = Row::new(Arc::clone(&schema));
            row.set_by_index(0, SlotValue::U64(id)).unwrap();
            row.set_by_index(1, SlotValue::Str(msg.to_string())).unwrap();
            writer.write_row(&row).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let mut reader = Reader::new(bytes.as_slice(), Arc::clone(&schema));
        let mut seen = Vec::new();
        while let Some(row) = reader.read_row().unwrap() {
            seen.push((row.get(0).unwrap().as_u64().unwrap(), row.get(1).unwrap().as_str().unwrap().to_string()));
        }
        assert_eq!(seen, vec![(1, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())]);
    }

    #[test]
    fn rejects_mismatched_fingerprint() {
        let schema = log_schema();
        let other = Arc::new(
            Schema::builder("Log")
                .field(Field::new("ID", "uint64", FieldKind::Uint64))
                .finalize()
                .unwrap(),
        );
        let writer = Writer::new(Vec::new(), Arc::clone(&schema));
        let bytes = writer.finish().unwrap();
        let mut reader = Reader::new(bytes.as_slice(), other);
        let err = reader.read_row().unwrap_err();
        assert!(matches!(err, Error::FingerprintMismatch { .. }));
    }

    #[test]
    fn rejects_bad_magic() {
        let schema = log_schema();
        let mut reader = Reader::new(&b"NOPE"[..], schema);
        let err = reader.read_row().unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn empty_stream_yields_no_rows() {
        let schema = log_schema();
        let writer = Writer::new(Vec::new(), Arc::clone(&schema));
        let bytes = writer.finish().unwrap();
        let mut reader = Reader::new(bytes.as_slice(), schema);
        assert!(reader.read_row().unwrap().is_none());
    }

    #[test]
    fn missing_field_rehydrates_schema_default() {
        let schema = Arc::new(
            Schema::builder("Log")
                .field(Field::new("ID", "uint64", FieldKind::Uint64))
                .field(Field::new("Msg", "string", FieldKind::String).with_default(crate::schema::DefaultValue::Str("none".to_string())))
                .finalize()
                .unwrap(),
        );
        let mut writer = Writer::new(Vec::new(), Arc::clone(&schema));
        let mut row = Row::new(Arc::clone(&schema));
        row.set_by_index(0, SlotValue::U64(1)).unwrap();
        writer.write_row(&row).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = Reader::new(bytes.as_slice(), schema);
        let row = reader.read_row().unwrap().unwrap();
        assert_eq!(row.get(1).unwrap().as_str(), Some("none"));
    }
}
