//! Page builder and decoder: the columnar frame that groups up to
//! `rows_per_page` rows behind per-column presence bitmaps (`spec.md`
//! §4.3).
//!
//! [`PageBuilder`] accumulates rows column-by-column as they are pushed and
//! seals them into the wire frame on demand. [`decode_page`] is the
//! symmetric inverse: it parses one frame's worth of bytes back into a
//! [`DecodedPage`], a row-major buffer [`crate::stream::Reader`] walks one
//! row at a time.

use std::borrow::Cow;
use std::sync::Arc;

use crate::column;
use crate::error::{Error, Result};
use crate::kind::FieldKind;
use crate::row::{Row, SlotValue};
use crate::schema::Schema;
use crate::varint::{read_uvarint, write_uvarint};

/// Packs `presence` (one entry per row) into the LSB-first bitmap described
/// in `spec.md` §4.3: bit `row % 8` of byte `row / 8`.
fn pack_presence(presence: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; presence.len().div_ceil(8)];
    for (row, &present) in presence.iter().enumerate() {
        if present {
            bytes[row / 8] |= 1 << (row % 8);
        }
    }
    bytes
}

/// Inverse of [`pack_presence`]: expands `bytes` into exactly `row_count`
/// presence flags.
fn unpack_presence(bytes: &[u8], row_count: usize) -> Vec<bool> {
    (0..row_count)
        .map(|row| bytes[row / 8] & (1 << (row % 8)) != 0)
        .collect()
}

fn popcount(presence: &[bool]) -> u64 {
    presence.iter().filter(|&&p| p).count() as u64
}

/// Per-field value storage inside a [`PageBuilder`], one accumulator per
/// schema field, keyed by the field's resolved wire kind.
enum ColumnAccumulator {
    Uint64(Vec<u64>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
    Bytes(Vec<Vec<u8>>),
}

impl ColumnAccumulator {
    fn new_for(kind: FieldKind) -> Self {
        if kind.uses_uint64_column() {
            ColumnAccumulator::Uint64(Vec::new())
        } else if kind.uses_int64_column() {
            ColumnAccumulator::Int64(Vec::new())
        } else if kind.uses_float64_column() {
            ColumnAccumulator::Float64(Vec::new())
        } else if kind.uses_bool_column() {
            ColumnAccumulator::Bool(Vec::new())
        } else if kind.uses_string_column() {
            ColumnAccumulator::Str(Vec::new())
        } else {
            ColumnAccumulator::Bytes(Vec::new())
        }
    }

    fn push(&mut self, field: &str, value: &SlotValue) -> Result<()> {
        let mismatch = |expected: &str| Error::KindMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            reason: format!("row slot holds {value:?}, which does not match the column's storage kind"),
        };
        match (self, value) {
            (ColumnAccumulator::Uint64(v), SlotValue::U64(x)) => v.push(*x),
            (ColumnAccumulator::Int64(v), SlotValue::I64(x)) => v.push(*x),
            (ColumnAccumulator::Float64(v), SlotValue::F64(x)) => v.push(*x),
            (ColumnAccumulator::Bool(v), SlotValue::Bool(x)) => v.push(*x),
            (ColumnAccumulator::Str(v), SlotValue::Str(x)) => v.push(x.clone()),
            (ColumnAccumulator::Bytes(v), SlotValue::Bytes(x)) => v.push(x.to_vec()),
            (ColumnAccumulator::Uint64(_), _) => return Err(mismatch("uint64")),
            (ColumnAccumulator::Int64(_), _) => return Err(mismatch("int64")),
            (ColumnAccumulator::Float64(_), _) => return Err(mismatch("float64")),
            (ColumnAccumulator::Bool(_), _) => return Err(mismatch("bool")),
            (ColumnAccumulator::Str(_), _) => return Err(mismatch("string")),
            (ColumnAccumulator::Bytes(_), _) => return Err(mismatch("bytes")),
        }
        Ok(())
    }

    fn clear(&mut self) {
        match self {
            ColumnAccumulator::Uint64(v) => v.clear(),
            ColumnAccumulator::Int64(v) => v.clear(),
            ColumnAccumulator::Float64(v) => v.clear(),
            ColumnAccumulator::Bool(v) => v.clear(),
            ColumnAccumulator::Str(v) => v.clear(),
            ColumnAccumulator::Bytes(v) => v.clear(),
        }
    }

    fn write_column(&self, out: &mut Vec<u8>) {
        match self {
            ColumnAccumulator::Uint64(v) => column::write_uint64_column(v, out),
            ColumnAccumulator::Int64(v) => column::write_int64_column(v, out),
            ColumnAccumulator::Float64(v) => column::write_float64_column(v, out),
            ColumnAccumulator::Bool(v) => column::write_bool_column(v, out),
            ColumnAccumulator::Str(v) => column::write_string_column(v, out),
            ColumnAccumulator::Bytes(v) => column::write_bytes_column(v, out),
        }
    }
}

/// Accumulates rows for up to `rows_per_page` at a time and seals them into
/// a page frame on demand (`spec.md` §4.3, §5).
pub struct PageBuilder {
    schema: Arc<Schema>,
    rows_per_page: usize,
    row_count: usize,
    presence: Vec<Vec<bool>>,
    values: Vec<ColumnAccumulator>,
}

impl PageBuilder {
    /// Creates a builder for `schema` that seals at `rows_per_page` rows.
    pub fn new(schema: Arc<Schema>, rows_per_page: usize) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|f| ColumnAccumulator::new_for(f.resolved_kind()))
            .collect();
        let presence = schema.fields().iter().map(|_| Vec::new()).collect();
        Self {
            schema,
            rows_per_page,
            row_count: 0,
            presence,
            values,
        }
    }

    /// Current number of rows accumulated since the last seal.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// `true` once [`PageBuilder::row_count`] reaches the configured
    /// `rows_per_page`.
    pub fn is_full(&self) -> bool {
        self.row_count >= self.rows_per_page
    }

    /// `true` if no rows have been accumulated since the last seal.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Records one row: for every field, either its present value is
    /// appended to that field's column accumulator, or its presence bit is
    /// recorded as unset (`spec.md` §4.3, "Encoder invariants").
    pub fn push_row(&mut self, row: &Row) -> Result<()> {
        for (i, field) in self.schema.fields().iter().enumerate() {
            match row.get(i) {
                Some(value) => {
                    self.presence[i].push(true);
                    self.values[i].push(field.name(), value)?;
                }
                None => self.presence[i].push(false),
            }
        }
        self.row_count += 1;
        Ok(())
    }

    /// Serializes the accumulated rows into one page frame (`spec.md`
    /// §4.3) and resets the builder for the next page. Must not be called
    /// on an empty builder; callers check [`PageBuilder::is_empty`] first.
    pub fn seal(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        write_uvarint(self.row_count as u64, &mut out);
        write_uvarint(self.schema.fields().len() as u64, &mut out);
        for (i, field) in self.schema.fields().iter().enumerate() {
            let presence_bytes = pack_presence(&self.presence[i]);
            let mut column_frame = Vec::new();
            write_uvarint(presence_bytes.len() as u64, &mut column_frame);
            column_frame.extend_from_slice(&presence_bytes);
            self.values[i].write_column(&mut column_frame);

            write_uvarint(i as u64, &mut out);
            out.push(u8::from(field.resolved_kind()));
            write_uvarint(column_frame.len() as u64, &mut out);
            out.extend_from_slice(&column_frame);
        }
        self.reset();
        out
    }

    fn reset(&mut self) {
        self.row_count = 0;
        for presence in &mut self.presence {
            presence.clear();
        }
        for values in &mut self.values {
            values.clear();
        }
    }
}

/// Decoded column values for one field of a [`DecodedPage`], still in
/// columnar form before being transposed into per-row slots.
enum DecodedValues<'a> {
    Uint64(Vec<u64>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
    Bytes(Vec<Cow<'a, [u8]>>),
}

impl<'a> DecodedValues<'a> {
    fn len(&self) -> usize {
        match self {
            DecodedValues::Uint64(v) => v.len(),
            DecodedValues::Int64(v) => v.len(),
            DecodedValues::Float64(v) => v.len(),
            DecodedValues::Bool(v) => v.len(),
            DecodedValues::Str(v) => v.len(),
            DecodedValues::Bytes(v) => v.len(),
        }
    }

    fn slot_value(&self, index: usize) -> SlotValue<'a> {
        match self {
            DecodedValues::Uint64(v) => SlotValue::U64(v[index]),
            DecodedValues::Int64(v) => SlotValue::I64(v[index]),
            DecodedValues::Float64(v) => SlotValue::F64(v[index]),
            DecodedValues::Bool(v) => SlotValue::Bool(v[index]),
            DecodedValues::Str(v) => SlotValue::Str(v[index].clone()),
            DecodedValues::Bytes(v) => SlotValue::Bytes(v[index].clone()),
        }
    }
}

fn read_column_payload<'a>(
    kind: FieldKind,
    payload: &'a [u8],
    zero_copy: bool,
) -> Result<(DecodedValues<'a>, usize)> {
    if kind.uses_uint64_column() {
        let (v, n) = column::read_uint64_column(payload)?;
        Ok((DecodedValues::Uint64(v), n))
    } else if kind.uses_int64_column() {
        let (v, n) = column::read_int64_column(payload)?;
        Ok((DecodedValues::Int64(v), n))
    } else if kind.uses_float64_column() {
        let (v, n) = column::read_float64_column(payload)?;
        Ok((DecodedValues::Float64(v), n))
    } else if kind.uses_bool_column() {
        let (v, n) = column::read_bool_column(payload)?;
        Ok((DecodedValues::Bool(v), n))
    } else if kind.uses_string_column() {
        let (v, n) = column::read_string_column(payload)?;
        Ok((DecodedValues::Str(v), n))
    } else {
        let (v, n) = column::read_bytes_column(payload, zero_copy)?;
        Ok((DecodedValues::Bytes(v), n))
    }
}

/// One page's worth of decoded rows, row-major: `rows[r][i]` is field `i`'s
/// value for row `r`, or `None` if that row's presence bit was unset for
/// that column.
pub struct DecodedPage<'a> {
    rows: Vec<Vec<Option<SlotValue<'a>>>>,
}

impl<'a> DecodedPage<'a> {
    /// Number of rows in this page.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Field `index`'s value for row `row`, or `None` if unset.
    pub fn get(&self, row: usize, index: usize) -> Option<&SlotValue<'a>> {
        self.rows[row][index].as_ref()
    }
}

/// Parses one page frame from the front of `buf` (`spec.md` §4.3).
///
/// Returns the decoded page and the number of bytes consumed. `zero_copy`
/// controls whether `Bytes` slots alias `buf` (see
/// [`column::read_bytes_column`]) or are copied; the borrow, when present,
/// is tied to `buf`'s lifetime and is invalidated once the caller advances
/// past this page (`spec.md` §4.4, §8).
pub fn decode_page<'a>(buf: &'a [u8], schema: &Schema, zero_copy: bool) -> Result<(DecodedPage<'a>, usize)> {
    let (row_count, mut cursor) = read_uvarint(buf)?;
    let row_count = row_count as usize;
    let (column_count, used) = read_uvarint(&buf[cursor..])?;
    cursor += used;
    let field_count = schema.fields().len();
    if column_count as usize != field_count {
        return Err(Error::Malformed {
            reason: format!(
                "page declares {column_count} columns but schema `{}` has {field_count} fields",
                schema.name()
            ),
            offset: cursor as u64,
        });
    }

    let mut per_field: Vec<Option<Vec<Option<SlotValue<'a>>>>> = (0..field_count).map(|_| None).collect();

    for _ in 0..column_count {
        let (field_index, used) = read_uvarint(&buf[cursor..])?;
        cursor += used;
        let field_index = field_index as usize;
        if field_index >= field_count {
            return Err(Error::Malformed {
                reason: format!("page column references out-of-range field index {field_index}"),
                offset: cursor as u64,
            });
        }
        let field = &schema.fields()[field_index];

        if buf.len() <= cursor {
            return Err(Error::Malformed {
                reason: "truncated page: missing column kind byte".to_string(),
                offset: cursor as u64,
            });
        }
        let kind_tag = buf[cursor];
        cursor += 1;
        let wire_kind = FieldKind::try_from(kind_tag).map_err(|_| Error::Malformed {
            reason: format!("unknown field-kind tag {kind_tag} for field `{}`", field.name()),
            offset: cursor as u64,
        })?;
        if wire_kind != field.resolved_kind() {
            return Err(Error::KindMismatch {
                field: field.name().to_string(),
                expected: field.resolved_kind().to_string(),
                reason: format!("page column tagged as {wire_kind}"),
            });
        }

        let (payload_len, used) = read_uvarint(&buf[cursor..])?;
        cursor += used;
        let payload_len = payload_len as usize;
        if buf.len() < cursor + payload_len {
            return Err(Error::Malformed {
                reason: format!("truncated column payload for field `{}`", field.name()),
                offset: buf.len() as u64,
            });
        }
        let column_frame = &buf[cursor..cursor + payload_len];
        cursor += payload_len;

        if per_field[field_index].is_some() {
            return Err(Error::Malformed {
                reason: format!("field `{}` appears more than once in this page frame", field.name()),
                offset: cursor as u64,
            });
        }

        let (presence_len, frame_used) = read_uvarint(column_frame)?;
        let presence_len = presence_len as usize;
        let expected_presence_len = row_count.div_ceil(8);
        if presence_len != expected_presence_len {
            return Err(Error::Malformed {
                reason: format!(
                    "field `{}` presence bitmap has {presence_len} bytes, expected {expected_presence_len} for {row_count} rows",
                    field.name()
                ),
                offset: cursor as u64,
            });
        }
        if column_frame.len() < frame_used + presence_len {
            return Err(Error::Malformed {
                reason: format!("truncated presence bitmap for field `{}`", field.name()),
                offset: cursor as u64,
            });
        }
        let presence_bytes = &column_frame[frame_used..frame_used + presence_len];
        let presence = unpack_presence(presence_bytes, row_count);
        let value_payload = &column_frame[frame_used + presence_len..];

        let (values, consumed) = read_column_payload(wire_kind, value_payload, zero_copy)?;
        if consumed != value_payload.len() {
            return Err(Error::Malformed {
                reason: format!(
                    "field `{}` column payload has {} trailing bytes after decoding",
                    field.name(),
                    value_payload.len() - consumed
                ),
                offset: cursor as u64,
            });
        }
        let declared = values.len() as u64;
        let expected = popcount(&presence);
        if declared != expected {
            return Err(Error::CountMismatch {
                field: field.name().to_string(),
                declared,
                popcount: expected,
            });
        }

        let mut per_row = Vec::with_capacity(row_count);
        let mut next = 0usize;
        for &present in &presence {
            if present {
                per_row.push(Some(values.slot_value(next)));
                next += 1;
            } else {
                per_row.push(None);
            }
        }
        per_field[field_index] = Some(per_row);
    }

    let mut columns = Vec::with_capacity(field_count);
    for (index, column) in per_field.into_iter().enumerate() {
        columns.push(column.ok_or_else(|| Error::Malformed {
            reason: format!(
                "page frame is missing column for field `{}`",
                schema.fields()[index].name()
            ),
            offset: cursor as u64,
        })?);
    }

    let mut rows: Vec<Vec<Option<SlotValue<'a>>>> = (0..row_count).map(|_| Vec::with_capacity(field_count)).collect();
    for column in columns {
        for (row, value) in column.into_iter().enumerate() {
            rows[row].push(value);
        }
    }

    Ok((DecodedPage { rows }, cursor))
}

/// Erases `page`'s borrow so [`crate::stream::Reader`] can hold a decoded
/// page across calls to `read_row` alongside the buffer it owns.
///
/// # Safety
///
/// The only borrowed content a `DecodedPage` can hold is `Cow::Borrowed`
/// slices into the buffer it was decoded from (`spec.md` §4.4's
/// `zero_copy_bytes`). The caller must not touch the returned value's
/// borrowed slots after the buffer they point into is mutated or dropped;
/// `Reader` upholds this by only ever loading a new page into the same
/// buffer it decoded the previous one from, which is exactly the
/// invalidation boundary `spec.md` §8 documents ("after advancing past the
/// owning page, accessing prior slots is undefined").
pub(crate) unsafe fn extend_page_lifetime(page: DecodedPage<'_>) -> DecodedPage<'static> {
    std::mem::transmute::<DecodedPage<'_>, DecodedPage<'static>>(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::FieldKind;
    use crate::row::Row;
    use crate::schema::{Field, Schema};

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
    fn round_trips_a_page() {
        let schema = log_schema();
        let mut builder = PageBuilder::new(Arc::clone(&schema), 1024);
        for (id, msg) in [(10u64, "hello"), (11, "world")] {
            let mut row = Row::new(Arc::clone(&schema));
            row.set_by_index(0, SlotValue::U64(id)).unwrap();
            row.set_by_index(1, SlotValue::Str(msg.to_string())).unwrap();
            builder.push_row(&row).unwrap();
        }
        assert_eq!(builder.row_count(), 2);
        let frame = builder.seal();
        assert!(builder.is_empty());

        let (page, consumed) = decode_page(&frame, &schema, false).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(page.row_count(), 2);
        assert_eq!(page.get(0, 0).unwrap().as_u64(), Some(10));
        assert_eq!(page.get(0, 1).unwrap().as_str(), Some("hello"));
        assert_eq!(page.get(1, 1).unwrap().as_str(), Some("world"));
    }

    #[test]
    fn omitted_field_decodes_as_unset() {
        let schema = log_schema();
        let mut builder = PageBuilder::new(Arc::clone(&schema), 1024);
        let mut row = Row::new(Arc::clone(&schema));
        row.set_by_index(0, SlotValue::U64(1)).unwrap();
        builder.push_row(&row).unwrap();
        let frame = builder.seal();

        let (page, _) = decode_page(&frame, &schema, false).unwrap();
        assert!(page.get(0, 1).is_none());
    }

    #[test]
    fn presence_bitmap_packs_lsb_first() {
        let presence = vec![true, false, true, true, false, false, false, false, true];
        let bytes = pack_presence(&presence);
        assert_eq!(bytes.len(), 2);
        assert_eq!(bytes[0], 0b0000_1101);
        assert_eq!(bytes[1], 0b0000_0001);
        assert_eq!(unpack_presence(&bytes, presence.len()), presence);
    }

    #[test]
    fn column_count_mismatch_is_malformed() {
        let schema = log_schema();
        let mut out = Vec::new();
        write_uvarint(0, &mut out);
        write_uvarint(1, &mut out); // only 1 column, schema has 2 fields
        let err = decode_page(&out, &schema, false).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }
}
