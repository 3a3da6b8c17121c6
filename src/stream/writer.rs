//! Streaming row writer (`spec.md` §4.4).

use std::io::Write;
use std::sync::Arc;

use crate::error::Result;
use crate::page::PageBuilder;
use crate::row::Row;
use crate::schema::Schema;
use crate::varint::write_uvarint;

const DEFAULT_ROWS_PER_PAGE: usize = 1024;

/// Writes one [`Schema`]'s rows to `W` as a header followed by a sequence
/// of sealed pages (`spec.md` §4.4). A `Writer` owns its destination for
/// its lifetime; there is no concurrent or interleaved use (`spec.md` §5).
pub struct Writer<W: Write> {
    inner: W,
    schema: Arc<Schema>,
    rows_per_page: usize,
    builder: PageBuilder,
    header_written: bool,
    closed: bool,
}

impl<W: Write> Writer<W> {
    /// Creates a writer for `schema` with the default page size of 1024
    /// rows (`spec.md` §5 resource model).
    pub fn new(inner: W, schema: Arc<Schema>) -> Self {
        let rows_per_page = DEFAULT_ROWS_PER_PAGE;
        let builder = PageBuilder::new(Arc::clone(&schema), rows_per_page);
        Self {
            inner,
            schema,
            rows_per_page,
            builder,
            header_written: false,
            closed: false,
        }
    }

    /// Overrides the number of rows batched per page. Must be called
    /// before the first [`Writer::write_row`]; a later call silently
    /// discards any rows already accumulated in the current page.
    pub fn with_rows_per_page(mut self, rows_per_page: usize) -> Self {
        self.rows_per_page = rows_per_page;
        self.builder = PageBuilder::new(Arc::clone(&self.schema), rows_per_page);
        self
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Returns a mutable reference to the underlying writer.
    ///
    /// Writing directly through this reference can desynchronize the
    /// stream; it exists for inspecting wrapper state (e.g. flush
    /// counters), not for interleaving writes.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consumes the writer, returning the underlying destination. Does
    /// *not* flush a pending partial page or write the terminator; call
    /// [`Writer::close`] first if the stream must be well-formed.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.inner.write_all(super::MAGIC)?;
        self.inner.write_all(&[super::VERSION])?;
        self.inner.write_all(&self.schema.fingerprint().to_le_bytes())?;
        self.header_written = true;
        Ok(())
    }

    /// Appends `row` to the current page, flushing it to `inner` once it
    /// reaches `rows_per_page` (`spec.md` §4.3, §4.4).
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        self.write_header()?;
        self.builder.push_row(row)?;
        if self.builder.is_full() {
            self.flush_page()?;
        }
        Ok(())
    }

    fn flush_page(&mut self) -> Result<()> {
        if self.builder.is_empty() {
            return Ok(());
        }
        let frame = self.builder.seal();
        let mut len_prefix = Vec::new();
        write_uvarint(frame.len() as u64, &mut len_prefix);
        self.inner.write_all(&len_prefix)?;
        self.inner.write_all(&frame)?;
        Ok(())
    }

    /// Flushes any pending partial page and writes the zero-length page
    /// terminator (`spec.md` §4.4). Idempotent: a second call is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.write_header()?;
        self.flush_page()?;
        self.inner.write_all(&[0u8])?;
        self.inner.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Closes the stream and returns the underlying destination.
    pub fn finish(mut self) -> Result<W> {
        self.close()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::FieldKind;
    use crate::row::SlotValue;
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
    fn writes_header_then_terminator_when_empty() {
        let schema = log_schema();
        let mut writer = Writer::new(Vec::new(), Arc::clone(&schema));
        writer.close().unwrap();
        let out = writer.into_inner();
        assert_eq!(&out[..4], super::super::MAGIC);
        assert_eq!(out[4], super::super::VERSION);
        assert_eq!(u64::from_le_bytes(out[5..13].try_into().unwrap()), schema.fingerprint());
        assert_eq!(&out[13..], &[0u8]);
    }

    #[test]
    fn flushes_a_full_page_eagerly() {
        let schema = log_schema();
        let mut writer = Writer::new(Vec::new(), Arc::clone(&schema)).with_rows_per_page(1);
        let mut row = crate::row::Row::new(Arc::clone(&schema));
        row.set_by_index(0, SlotValue::U64(1)).unwrap();
        row.set_by_index(1, SlotValue::Str("hi".to_string())).unwrap();
        writer.write_row(&row).unwrap();
        // One full page has already been flushed; the header plus that
        // page's bytes are present before `close` is ever called.
        assert!(writer.get_ref().len() > 13);
        writer.close().unwrap();
        let out = writer.into_inner();
        assert_eq!(out.last(), Some(&0u8));
    }
}
