//! Float64 column codec: raw little-endian `f64`s, no compression
//! (`spec.md` §4.2).

use crate::error::Result;
use crate::varint::{read_f64, read_uvarint, write_f64, write_uvarint};

/// Appends a float64 column payload for `values` to `out`.
pub fn write_float64_column(values: &[f64], out: &mut Vec<u8>) {
    write_uvarint(values.len() as u64, out);
    for &v in values {
        write_f64(v, out);
    }
}

/// Reads a float64 column payload from the front of `buf`.
///
/// Returns the decoded values and the number of bytes consumed.
pub fn read_float64_column(buf: &[u8]) -> Result<(Vec<f64>, usize)> {
    let (count, mut consumed) = read_uvarint(buf)?;
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (v, len) = read_f64(&buf[consumed..])?;
        consumed += len;
        values.push(v);
    }
    Ok((values, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_values() {
        let values = vec![0.0, -1.5, f64::INFINITY, f64::NEG_INFINITY];
        let mut out = Vec::new();
        write_float64_column(&values, &mut out);
        assert_eq!(out.len(), 1 + values.len() * 8);
        let (decoded, consumed) = read_float64_column(&out).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn empty_column_is_minimal() {
        let mut out = Vec::new();
        write_float64_column(&[], &mut out);
        assert_eq!(out, vec![0]);
    }

    proptest::proptest! {
        #[test]
        fn round_trips(values: Vec<f64>) {
            let mut out = Vec::new();
            write_float64_column(&values, &mut out);
            let (decoded, consumed) = read_float64_column(&out).unwrap();
            proptest::prop_assert_eq!(consumed, out.len());
            proptest::prop_assert_eq!(decoded.len(), values.len());
            for (a, b) in decoded.iter().zip(values.iter()) {
                proptest::prop_assert!(a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()));
            }
        }
    }
}
