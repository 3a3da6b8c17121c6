//! [`Row`]: the neutral, schema-bound in-memory record that sits at the
//! boundary between structured external records and the columnar codec
//! (`spec.md` §3, §4.5).
//!
//! A `Row` is a fixed-length vector of slots, one per schema field. Each
//! slot carries a presence flag; when clear, the payload is ignored. A
//! `Writer` reads slots in schema order, a `Reader` writes them in schema
//! order, and higher layers (struct/map adapters, the DSL, the bundle
//! reader) are the only code that ever needs to know what a slot *means*.

use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::Schema;

/// The typed payload a slot can hold. A slot's presence flag governs
/// whether the payload is meaningful; an unset slot's payload is ignored.
///
/// `Bytes` is the only variant that can alias external storage: see
/// [`Reader::with_zero_copy_bytes`](crate::stream::Reader::with_zero_copy_bytes).
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue<'a> {
    /// Backs `Bool` fields.
    Bool(bool),
    /// Backs `Int64`, `Date`, `DateTime`, `Timestamp`, and `Duration` fields
    /// (all of which are stored as signed nanosecond counts on the wire).
    I64(i64),
    /// Backs `Uint64` and resolved `Ref` fields.
    U64(u64),
    /// Backs `Float64` fields.
    F64(f64),
    /// Backs `String` and `TimestampTZ` fields (the latter as an RFC3339
    /// string preserving the original offset).
    Str(String),
    /// Backs `Bytes` fields. Owned by default; may alias a decoder's
    /// internal page buffer when zero-copy decoding is enabled, in which
    /// case the borrow is only valid until the next page is decoded.
    Bytes(Cow<'a, [u8]>),
}

impl<'a> SlotValue<'a> {
    /// Returns the `bool` payload, or `None` if this slot does not hold one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SlotValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `i64` payload, or `None` if this slot does not hold one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SlotValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `u64` payload, or `None` if this slot does not hold one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SlotValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `f64` payload, or `None` if this slot does not hold one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SlotValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, or `None` if this slot does not hold one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SlotValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the byte-sequence payload, or `None` if this slot does not
    /// hold one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SlotValue::Bytes(v) => Some(v.as_ref()),
            _ => None,
        }
    }

    /// Converts a borrowed slot into one with no outstanding borrows,
    /// copying the payload if it was aliasing external storage.
    pub fn into_owned(self) -> SlotValue<'static> {
        match self {
            SlotValue::Bool(v) => SlotValue::Bool(v),
            SlotValue::I64(v) => SlotValue::I64(v),
            SlotValue::U64(v) => SlotValue::U64(v),
            SlotValue::F64(v) => SlotValue::F64(v),
            SlotValue::Str(v) => SlotValue::Str(v),
            SlotValue::Bytes(v) => SlotValue::Bytes(Cow::Owned(v.into_owned())),
        }
    }
}

/// One field's worth of storage inside a [`Row`]: a presence flag plus a
/// payload that is only meaningful when the flag is set.
#[derive(Debug, Clone, Default)]
struct Slot<'a> {
    present: bool,
    value: Option<SlotValue<'a>>,
}

/// A fixed-length, schema-bound, reusable record.
///
/// Rows are created against a specific [`Schema`] and are intended to be
/// reused across repeated `write_row`/`read_row` calls to avoid per-row
/// allocation: [`Row::reset`] clears presence flags but may retain
/// previously allocated buffers (e.g. a `String`'s capacity).
#[derive(Debug, Clone)]
pub struct Row<'a> {
    schema: Arc<Schema>,
    slots: Vec<Slot<'a>>,
}

impl<'a> Row<'a> {
    /// Creates a new row with every slot unset, bound to `schema`.
    pub fn new(schema: Arc<Schema>) -> Self {
        let len = schema.fields().len();
        Self {
            schema,
            slots: (0..len).map(|_| Slot::default()).collect(),
        }
    }

    /// Returns the schema this row is bound to.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Clears every slot's presence flag. Allocated payload buffers (e.g.
    /// `String` capacity) are not deallocated, only marked stale.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.present = false;
        }
    }

    /// Looks up a field's slot index by name.
    pub fn field_index_of(&self, name: &str) -> Option<usize> {
        self.schema.field_index_of(name)
    }

    /// Returns `true` if the slot at `index` is present.
    pub fn is_present(&self, index: usize) -> bool {
        self.slots.get(index).map(|s| s.present).unwrap_or(false)
    }

    /// Returns the slot's value, or `None` if unset or out of range.
    pub fn get(&self, index: usize) -> Option<&SlotValue<'a>> {
        self.slots
            .get(index)
            .filter(|s| s.present)
            .and_then(|s| s.value.as_ref())
    }

    /// Sets the slot at `index` and marks it present.
    ///
    /// Fails with [`Error::UnsupportedOperation`] if `index` is out of
    /// range for this row's schema.
    pub fn set_by_index(&mut self, index: usize, value: SlotValue<'a>) -> Result<()> {
        let slot = self.slots.get_mut(index).ok_or_else(|| Error::UnsupportedOperation {
            field: format!("#{index}"),
            reason: format!(
                "row has {} slots, index {index} out of range",
                self.slots.len()
            ),
        })?;
        slot.value = Some(value);
        slot.present = true;
        Ok(())
    }

    /// Clears the slot at `index` without removing its allocated buffer.
    pub fn clear(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.present = false;
        }
    }

    /// Iterates over `(field_index, value)` for every present slot, in
    /// schema order.
    pub fn values(&self) -> impl Iterator<Item = (usize, &SlotValue<'a>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.value.as_ref().filter(|_| s.present).map(|v| (i, v)))
    }

    /// Number of slots (equal to the bound schema's field count).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if this row has zero fields (an empty schema).
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::FieldKind;
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
    fn fresh_row_has_no_present_slots() {
        let row = Row::new(log_schema());
        assert_eq!(row.len(), 2);
        assert!(!row.is_present(0));
        assert!(row.get(0).is_none());
    }

    #[test]
    fn set_and_reset_round_trip_presence() {
        let mut row = Row::new(log_schema());
        row.set_by_index(0, SlotValue::U64(10)).unwrap();
        row.set_by_index(1, SlotValue::Str("hello".into())).unwrap();
        assert!(row.is_present(0));
        assert_eq!(row.get(0).unwrap().as_u64(), Some(10));
        assert_eq!(row.get(1).unwrap().as_str(), Some("hello"));

        row.reset();
        assert!(!row.is_present(0));
        assert!(!row.is_present(1));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut row = Row::new(log_schema());
        assert!(row.set_by_index(5, SlotValue::Bool(true)).is_err());
    }

    #[test]
    fn field_index_of_matches_schema() {
        let row = Row::new(log_schema());
        assert_eq!(row.field_index_of("Msg"), Some(1));
        assert_eq!(row.field_index_of("Nope"), None);
    }
}
