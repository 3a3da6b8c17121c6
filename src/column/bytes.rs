//! Bytes column codec: length-prefixed raw byte entries (`spec.md` §4.2).

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::varint::{read_uvarint, write_uvarint};

/// Appends a bytes column payload for `values` to `out`.
pub fn write_bytes_column<T: AsRef<[u8]>>(values: &[T], out: &mut Vec<u8>) {
    write_uvarint(values.len() as u64, out);
    for v in values {
        let v = v.as_ref();
        write_uvarint(v.len() as u64, out);
        out.extend_from_slice(v);
    }
}

/// Reads a bytes column payload from the front of `buf`.
///
/// When `zero_copy` is `true`, each returned entry borrows directly from
/// `buf` instead of being copied; the caller must not outlive `buf` (in
/// practice, the page buffer that owns the decoded frame) while holding
/// onto these slices (`spec.md` §4.4, §8 "Zero-copy safety").
pub fn read_bytes_column<'a>(buf: &'a [u8], zero_copy: bool) -> Result<(Vec<Cow<'a, [u8]>>, usize)> {
    let (count, mut consumed) = read_uvarint(buf)?;
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (len, used) = read_uvarint(&buf[consumed..])?;
        consumed += used;
        let len = len as usize;
        if buf.len() < consumed + len {
            return Err(Error::Malformed {
                reason: "truncated bytes column entry".to_string(),
                offset: buf.len() as u64,
            });
        }
        let slice = &buf[consumed..consumed + len];
        values.push(if zero_copy {
            Cow::Borrowed(slice)
        } else {
            Cow::Owned(slice.to_vec())
        });
        consumed += len;
    }
    Ok((values, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_owned() {
        let values: Vec<Vec<u8>> = vec![vec![1, 2, 3], vec![], vec![0xff]];
        let mut out = Vec::new();
        write_bytes_column(&values, &mut out);
        let (decoded, consumed) = read_bytes_column(&out, false).unwrap();
        let decoded: Vec<Vec<u8>> = decoded.into_iter().map(|c| c.into_owned()).collect();
        assert_eq!(decoded, values);
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn zero_copy_aliases_source_buffer() {
        let values: Vec<Vec<u8>> = vec![vec![9, 9, 9]];
        let mut out = Vec::new();
        write_bytes_column(&values, &mut out);
        let (decoded, _) = read_bytes_column(&out, true).unwrap();
        assert!(matches!(decoded[0], std::borrow::Cow::Borrowed(_)));
        assert_eq!(decoded[0].as_ref(), &[9, 9, 9]);
    }

    #[test]
    fn empty_column_is_minimal() {
        let mut out = Vec::new();
        write_bytes_column::<Vec<u8>>(&[], &mut out);
        assert_eq!(out, vec![0]);
    }

    proptest::proptest! {
        #[test]
        fn round_trips(values: Vec<Vec<u8>>) {
            let mut out = Vec::new();
            write_bytes_column(&values, &mut out);
            let (decoded, consumed) = read_bytes_column(&out, false).unwrap();
            let decoded: Vec<Vec<u8>> = decoded.into_iter().map(|c| c.into_owned()).collect();
            proptest::prop_assert_eq!(decoded, values);
            proptest::prop_assert_eq!(consumed, out.len());
        }
    }
}
