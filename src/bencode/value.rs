//! The bencode value tree and its canonical encoder.

use std::collections::BTreeMap;

/// A decoded bencode value.
///
/// Dictionary keys are raw bytes, not text; `BTreeMap` keeps them in
/// byte-lexicographic order, which is exactly the canonical emission order,
/// so encoding a decoded dictionary is always canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    /// `i<decimal>e` - 64-bit signed integer
    Integer(i64),
    /// `<len>:<bytes>` - opaque byte string
    Bytes(Vec<u8>),
    /// `l...e` - ordered sequence of values
    List(Vec<BencodeValue>),
    /// `d...e` - map from byte-string key to value, keys unique
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    /// Returns the integer payload, or `None` for other variants.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the byte-string payload, or `None` for other variants.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the byte-string payload as UTF-8 text when it is valid.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Returns the list payload, or `None` for other variants.
    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the dictionary payload, or `None` for other variants.
    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a dictionary entry by key; `None` for non-dictionaries too.
    pub fn dict_get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict().and_then(|entries| entries.get(key))
    }

    /// Encodes the value in deterministic canonical form.
    ///
    /// Integers carry no leading zeros, strings are `<len>:<bytes>`, and
    /// dictionary keys are emitted in byte-lexicographic ascending order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            BencodeValue::Integer(value) => {
                out.push(b'i');
                out.extend_from_slice(value.to_string().as_bytes());
                out.push(b'e');
            }
            BencodeValue::Bytes(bytes) => {
                encode_bytes(bytes, out);
            }
            BencodeValue::List(items) => {
                out.push(b'l');
                for item in items {
                    item.encode_into(out);
                }
                out.push(b'e');
            }
            BencodeValue::Dict(entries) => {
                out.push(b'd');
                // BTreeMap iterates keys in byte-lexicographic order
                for (key, value) in entries {
                    encode_bytes(key, out);
                    value.encode_into(out);
                }
                out.push(b'e');
            }
        }
    }
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

impl From<i64> for BencodeValue {
    fn from(value: i64) -> Self {
        BencodeValue::Integer(value)
    }
}

impl From<&[u8]> for BencodeValue {
    fn from(bytes: &[u8]) -> Self {
        BencodeValue::Bytes(bytes.to_vec())
    }
}

impl From<&str> for BencodeValue {
    fn from(text: &str) -> Self {
        BencodeValue::Bytes(text.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: Vec<(&str, BencodeValue)>) -> BencodeValue {
        BencodeValue::Dict(
            entries
                .into_iter()
                .map(|(key, value)| (key.as_bytes().to_vec(), value))
                .collect(),
        )
    }

    #[test]
    fn test_encode_integer() {
        assert_eq!(BencodeValue::Integer(42).encode(), b"i42e");
        assert_eq!(BencodeValue::Integer(0).encode(), b"i0e");
        assert_eq!(BencodeValue::Integer(-7).encode(), b"i-7e");
        assert_eq!(
            BencodeValue::Integer(i64::MIN).encode(),
            b"i-9223372036854775808e"
        );
    }

    #[test]
    fn test_encode_bytes() {
        assert_eq!(BencodeValue::from("spam").encode(), b"4:spam");
        assert_eq!(BencodeValue::from("").encode(), b"0:");
    }

    #[test]
    fn test_encode_list() {
        let list = BencodeValue::List(vec![BencodeValue::from("a"), BencodeValue::Integer(1)]);
        assert_eq!(list.encode(), b"l1:ai1ee");
    }

    #[test]
    fn test_encode_dict_orders_keys_bytewise() {
        // Inserted out of order; emission must be byte-lexicographic.
        let value = dict(vec![
            ("zz", BencodeValue::Integer(1)),
            ("a", BencodeValue::Integer(2)),
            ("ab", BencodeValue::Integer(3)),
        ]);
        assert_eq!(value.encode(), b"d1:ai2e2:abi3e2:zzi1ee");
    }

    #[test]
    fn test_accessors() {
        let value = dict(vec![("n", BencodeValue::Integer(9))]);
        assert!(value.as_dict().is_some());
        assert!(value.as_list().is_none());
        assert_eq!(value.dict_get(b"n").and_then(BencodeValue::as_integer), Some(9));
        assert_eq!(BencodeValue::from("hi").as_str(), Some("hi"));
        assert_eq!(BencodeValue::Bytes(vec![0xFF]).as_str(), None);
    }
}
