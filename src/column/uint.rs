//! Uint64 column codec: optional monotonic-delta mode (`spec.md` §4.2).

use crate::error::{Error, Result};
use crate::varint::{read_uvarint, write_uvarint};

/// Appends a uint64 column payload for `values` to `out`.
///
/// Chooses delta mode (`mode=1`) iff there are at least two values and they
/// are non-decreasing; otherwise emits each value directly (`mode=0`).
pub fn write_uint64_column(values: &[u64], out: &mut Vec<u8>) {
    let count = values.len() as u64;
    let delta_eligible = values.len() >= 2 && values.windows(2).all(|w| w[1] >= w[0]);
    let mode: u64 = if delta_eligible { 1 } else { 0 };
    write_uvarint((count << 1) | mode, out);
    if delta_eligible {
        write_uvarint(values[0], out);
        for w in values.windows(2) {
            write_uvarint(w[1] - w[0], out);
        }
    } else {
        for &v in values {
            write_uvarint(v, out);
        }
    }
}

/// Reads a uint64 column payload from the front of `buf`.
///
/// Returns the decoded values and the number of bytes consumed.
pub fn read_uint64_column(buf: &[u8]) -> Result<(Vec<u64>, usize)> {
    let (header, mut consumed) = read_uvarint(buf)?;
    let count = header >> 1;
    let mode = header & 1;
    let mut values = Vec::with_capacity(count as usize);
    if mode == 1 {
        if count == 0 {
            return Ok((values, consumed));
        }
        let (base, len) = read_uvarint(&buf[consumed..])?;
        consumed += len;
        values.push(base);
        let mut prev = base;
        for _ in 1..count {
            let (delta, len) = read_uvarint(&buf[consumed..])?;
            consumed += len;
            let next = prev.checked_add(delta).ok_or_else(|| Error::Malformed {
                reason: "uint64 delta column overflowed u64".to_string(),
                offset: consumed as u64,
            })?;
            values.push(next);
            prev = next;
        }
    } else {
        for _ in 0..count {
            let (v, len) = read_uvarint(&buf[consumed..])?;
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
    fn monotonic_sequence_uses_delta_mode() {
        let values = vec![100u64, 101, 103, 110];
        let mut out = Vec::new();
        write_uint64_column(&values, &mut out);
        // header = (4 << 1) | 1 = 9
        assert_eq!(out[0], 9);
        let (decoded, consumed) = read_uint64_column(&out).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn non_monotonic_sequence_uses_direct_mode() {
        let values = vec![5u64, 3, 7];
        let mut out = Vec::new();
        write_uint64_column(&values, &mut out);
        // header = (3 << 1) | 0 = 6
        assert_eq!(out[0], 6);
        let (decoded, _) = read_uint64_column(&out).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn single_value_never_uses_delta_mode() {
        let mut out = Vec::new();
        write_uint64_column(&[42], &mut out);
        assert_eq!(out[0], (1 << 1));
    }

    #[test]
    fn empty_column_is_minimal() {
        let mut out = Vec::new();
        write_uint64_column(&[], &mut out);
        assert_eq!(out, vec![0]);
        let (decoded, consumed) = read_uint64_column(&out).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(consumed, 1);
    }

    proptest::proptest! {
        #[test]
        fn round_trips(values: Vec<u64>) {
            let mut out = Vec::new();
            write_uint64_column(&values, &mut out);
            let (decoded, consumed) = read_uint64_column(&out).unwrap();
            proptest::prop_assert_eq!(decoded, values);
            proptest::prop_assert_eq!(consumed, out.len());
        }
    }
}
