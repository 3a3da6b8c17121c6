//! Bool column codec: one byte per value (`spec.md` §4.2).
//!
//! The spec names a packed bitmap as a permissible future optimization as
//! long as it does not disturb the fingerprint; this crate implements the
//! documented baseline.

use crate::error::{Error, Result};
use crate::varint::{read_uvarint, write_uvarint};

/// Appends a bool column payload for `values` to `out`.
pub fn write_bool_column(values: &[bool], out: &mut Vec<u8>) {
    write_uvarint(values.len() as u64, out);
    out.extend(values.iter().map(|&v| if v { 1u8 } else { 0u8 }));
}

/// Reads a bool column payload from the front of `buf`.
///
/// Returns the decoded values and the number of bytes consumed.
pub fn read_bool_column(buf: &[u8]) -> Result<(Vec<bool>, usize)> {
    let (count, mut consumed) = read_uvarint(buf)?;
    let count = count as usize;
    if buf.len() < consumed + count {
        return Err(Error::Malformed {
            reason: "truncated bool column: fewer bytes than declared count".to_string(),
            offset: buf.len() as u64,
        });
    }
    let mut values = Vec::with_capacity(count);
    for &byte in &buf[consumed..consumed + count] {
        match byte {
            0 => values.push(false),
            1 => values.push(true),
            other => {
                return Err(Error::Malformed {
                    reason: format!("bool column byte must be 0 or 1, found {other}"),
                    offset: (consumed + values.len()) as u64,
                })
            }
        }
    }
    consumed += count;
    Ok((values, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let values = vec![true, false, false, true];
        let mut out = Vec::new();
        write_bool_column(&values, &mut out);
        assert_eq!(out, vec![4, 1, 0, 0, 1]);
        let (decoded, consumed) = read_bool_column(&out).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn invalid_byte_is_malformed() {
        let err = read_bool_column(&[1, 2]).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    proptest::proptest! {
        #[test]
        fn round_trips_prop(values: Vec<bool>) {
            let mut out = Vec::new();
            write_bool_column(&values, &mut out);
            let (decoded, consumed) = read_bool_column(&out).unwrap();
            proptest::prop_assert_eq!(decoded, values);
            proptest::prop_assert_eq!(consumed, out.len());
        }
    }
}
