//! Int64 column codec: zig-zag varints, always delta-mode for multiple
//! values (`spec.md` §4.2).

use crate::error::Result;
use crate::varint::{read_uvarint, read_zigzag, write_uvarint, write_zigzag};

/// Appends an int64 column payload for `values` to `out`.
///
/// Delta mode (`mode=1`) is used whenever there is more than one value;
/// a single value or zero values use direct mode (`mode=0`).
pub fn write_int64_column(values: &[i64], out: &mut Vec<u8>) {
    let count = values.len() as u64;
    let mode: u64 = if values.len() > 1 { 1 } else { 0 };
    write_uvarint((count << 1) | mode, out);
    if mode == 1 {
        write_zigzag(values[0], out);
        for w in values.windows(2) {
            write_zigzag(w[1].wrapping_sub(w[0]), out);
        }
    } else {
        for &v in values {
            write_zigzag(v, out);
        }
    }
}

/// Reads an int64 column payload from the front of `buf`.
///
/// Returns the decoded values and the number of bytes consumed.
pub fn read_int64_column(buf: &[u8]) -> Result<(Vec<i64>, usize)> {
    let (header, mut consumed) = read_uvarint(buf)?;
    let count = header >> 1;
    let mode = header & 1;
    let mut values = Vec::with_capacity(count as usize);
    if mode == 1 {
        let (base, len) = read_zigzag(&buf[consumed..])?;
        consumed += len;
        values.push(base);
        let mut prev = base;
        for _ in 1..count {
            let (delta, len) = read_zigzag(&buf[consumed..])?;
            consumed += len;
            let next = prev.wrapping_add(delta);
            values.push(next);
            prev = next;
        }
    } else {
        for _ in 0..count {
            let (v, len) = read_zigzag(&buf[consumed..])?;
            consumed += len;
            values.push(v);
        }
    }
    Ok((values, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_value_always_uses_delta_mode() {
        let values = vec![-5i64, -3, 100, 99];
        let mut out = Vec::new();
        write_int64_column(&values, &mut out);
        let (header, _) = read_uvarint(&out).unwrap();
        assert_eq!(header & 1, 1);
        let (decoded, consumed) = read_int64_column(&out).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn single_value_uses_direct_mode() {
        let mut out = Vec::new();
        write_int64_column(&[-7], &mut out);
        let (header, _) = read_uvarint(&out).unwrap();
        assert_eq!(header & 1, 0);
        let (decoded, _) = read_int64_column(&out).unwrap();
        assert_eq!(decoded, vec![-7]);
    }

    #[test]
    fn empty_column_is_minimal() {
        let mut out = Vec::new();
        write_int64_column(&[], &mut out);
        assert_eq!(out, vec![0]);
    }

    proptest::proptest! {
        #[test]
        fn round_trips(values: Vec<i64>) {
            let mut out = Vec::new();
            write_int64_column(&values, &mut out);
            let (decoded, consumed) = read_int64_column(&out).unwrap();
            proptest::prop_assert_eq!(decoded, values);
            proptest::prop_assert_eq!(consumed, out.len());
        }
    }
}
