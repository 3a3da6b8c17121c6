//! Per-kind column writers and readers (`spec.md` §4.2).
//!
//! Every column payload is self-delimited: a writer in this module returns
//! exactly the bytes described in `spec.md` §4.2 for its kind (not
//! including the presence bitmap, which [`crate::page`] frames around the
//! payload), and the matching reader consumes exactly that many bytes from
//! the front of a buffer and reports how many it used.
//!
//! The number of values a column carries must always equal the popcount of
//! its presence bitmap; [`crate::page`] is responsible for checking that
//! invariant; the per-kind readers here only check internal consistency
//! (e.g. `index_len == dict indices count`).

mod boolean;
mod bytes;
mod float;
mod int;
mod string;
mod uint;

pub use boolean::{read_bool_column, write_bool_column};
pub use bytes::{read_bytes_column, write_bytes_column};
pub use float::{read_float64_column, write_float64_column};
pub use int::{read_int64_column, write_int64_column};
pub use string::{read_string_column, write_string_column};
pub use uint::{read_uint64_column, write_uint64_column};
