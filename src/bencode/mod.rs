//! Bencode decoding and canonical encoding.
//!
//! Implements the BitTorrent serialization format (BEP 3): integers, byte
//! strings, lists, and dictionaries with raw-byte keys. The decoder is
//! strict - duplicate dictionary keys, leading zeros, and trailing input are
//! rejected - and can record the exact byte span of the root-level `info`
//! value so callers hash the source bytes rather than a re-encoded form.

mod parser;
mod value;

pub use parser::{decode, decode_prefix, decode_with_info_span, ParseCapture};
pub use value::BencodeValue;

/// Errors produced while decoding bencode input.
///
/// Every variant carries the byte offset at which parsing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BencodeError {
    /// Input ended in the middle of a value.
    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof {
        /// Offset where more input was expected
        offset: usize,
    },

    /// A value began with a byte that opens no bencode form.
    #[error("invalid value prefix at byte {offset}")]
    InvalidPrefix {
        /// Offset of the offending byte
        offset: usize,
    },

    /// An integer was empty, negative zero, or carried leading zeros.
    #[error("malformed integer at byte {offset}")]
    InvalidInteger {
        /// Offset of the offending digits
        offset: usize,
    },

    /// An integer did not fit in 64 signed bits.
    #[error("integer overflow at byte {offset}")]
    IntegerOverflow {
        /// Offset within the digit run where overflow occurred
        offset: usize,
    },

    /// A string length was empty or carried leading zeros.
    #[error("malformed string length at byte {offset}")]
    InvalidStringLength {
        /// Offset of the offending length digits
        offset: usize,
    },

    /// A dictionary key was not a byte string.
    #[error("dictionary key is not a byte string at byte {offset}")]
    DictKeyNotString {
        /// Offset of the offending key
        offset: usize,
    },

    /// A dictionary repeated a key.
    #[error("duplicate dictionary key at byte {offset}")]
    DuplicateDictKey {
        /// Offset of the repeated key
        offset: usize,
    },

    /// Bytes remained after the top-level value in strict mode.
    #[error("trailing data after top-level value at byte {offset}")]
    TrailingData {
        /// Offset of the first unconsumed byte
        offset: usize,
    },
}
