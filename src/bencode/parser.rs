//! Recursive-descent bencode decoder with optional `info` span capture.

use std::collections::BTreeMap;
use std::ops::Range;

use super::{BencodeError, BencodeValue};

/// Result of a slice-capturing parse.
///
/// `info_span` is the `[begin, end)` byte range of the value associated with
/// the first root-level `info` key, referring into the caller's buffer. It is
/// `None` when the root is not a dictionary or carries no such key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCapture {
    /// The decoded top-level value
    pub root: BencodeValue,
    /// Byte range of the root-level `info` value in the source buffer
    pub info_span: Option<Range<usize>>,
}

/// Decodes a complete bencode document.
///
/// Strict mode: input bytes remaining after the top-level value fail with
/// [`BencodeError::TrailingData`].
///
/// # Errors
///
/// - `BencodeError` - Structural failure, with the byte offset where parsing stopped
pub fn decode(input: &[u8]) -> Result<BencodeValue, BencodeError> {
    let (value, consumed) = decode_prefix(input)?;
    if consumed != input.len() {
        return Err(BencodeError::TrailingData { offset: consumed });
    }
    Ok(value)
}

/// Decodes one value from the front of `input`, returning the post-parse cursor.
///
/// # Errors
///
/// - `BencodeError` - Structural failure, with the byte offset where parsing stopped
pub fn decode_prefix(input: &[u8]) -> Result<(BencodeValue, usize), BencodeError> {
    let mut parser = Parser::new(input, false);
    let value = parser.parse_value(true)?;
    Ok((value, parser.pos))
}

/// Decodes a complete document while recording the root-level `info` span.
///
/// # Errors
///
/// - `BencodeError` - Structural failure, with the byte offset where parsing stopped
pub fn decode_with_info_span(input: &[u8]) -> Result<ParseCapture, BencodeError> {
    let mut parser = Parser::new(input, true);
    let root = parser.parse_value(true)?;
    if parser.pos != input.len() {
        return Err(BencodeError::TrailingData { offset: parser.pos });
    }
    Ok(ParseCapture {
        root,
        info_span: parser.info_span,
    })
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    capture_info: bool,
    info_span: Option<Range<usize>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8], capture_info: bool) -> Self {
        Self {
            input,
            pos: 0,
            capture_info,
            info_span: None,
        }
    }

    fn peek(&self) -> Result<u8, BencodeError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEof { offset: self.pos })
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn expect(&mut self, byte: u8) -> Result<(), BencodeError> {
        if self.peek()? != byte {
            return Err(BencodeError::InvalidPrefix { offset: self.pos });
        }
        self.bump();
        Ok(())
    }

    fn parse_value(&mut self, root: bool) -> Result<BencodeValue, BencodeError> {
        match self.peek()? {
            b'i' => self.parse_integer(),
            b'l' => self.parse_list(),
            b'd' => self.parse_dict(root),
            b'0'..=b'9' => self.parse_bytes().map(BencodeValue::Bytes),
            _ => Err(BencodeError::InvalidPrefix { offset: self.pos }),
        }
    }

    fn parse_integer(&mut self) -> Result<BencodeValue, BencodeError> {
        self.bump(); // 'i'
        let negative = self.peek()? == b'-';
        if negative {
            self.bump();
        }

        let digits_start = self.pos;
        // Accumulate in the negative domain so i64::MIN parses.
        let mut value: i64 = 0;
        while let digit @ b'0'..=b'9' = self.peek()? {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_sub(i64::from(digit - b'0')))
                .ok_or(BencodeError::IntegerOverflow { offset: self.pos })?;
            self.bump();
        }

        let digit_count = self.pos - digits_start;
        if digit_count == 0 {
            return Err(BencodeError::InvalidInteger { offset: self.pos });
        }
        if self.input[digits_start] == b'0' && digit_count > 1 {
            return Err(BencodeError::InvalidInteger {
                offset: digits_start,
            });
        }
        if negative && value == 0 {
            // i-0e
            return Err(BencodeError::InvalidInteger {
                offset: digits_start,
            });
        }
        self.expect(b'e')?;

        let value = if negative {
            value
        } else {
            value
                .checked_neg()
                .ok_or(BencodeError::IntegerOverflow {
                    offset: digits_start,
                })?
        };
        Ok(BencodeValue::Integer(value))
    }

    fn parse_bytes(&mut self) -> Result<Vec<u8>, BencodeError> {
        let length_start = self.pos;
        let mut length: usize = 0;
        while let digit @ b'0'..=b'9' = self.peek()? {
            length = length
                .checked_mul(10)
                .and_then(|l| l.checked_add(usize::from(digit - b'0')))
                .ok_or(BencodeError::InvalidStringLength { offset: self.pos })?;
            self.bump();
        }

        let digit_count = self.pos - length_start;
        if digit_count == 0 {
            return Err(BencodeError::InvalidStringLength {
                offset: length_start,
            });
        }
        if self.input[length_start] == b'0' && digit_count > 1 {
            return Err(BencodeError::InvalidStringLength {
                offset: length_start,
            });
        }
        self.expect(b':')?;

        if self.input.len() - self.pos < length {
            return Err(BencodeError::UnexpectedEof {
                offset: self.input.len(),
            });
        }
        let bytes = self.input[self.pos..self.pos + length].to_vec();
        self.pos += length;
        Ok(bytes)
    }

    fn parse_list(&mut self) -> Result<BencodeValue, BencodeError> {
        self.bump(); // 'l'
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.parse_value(false)?);
        }
        self.bump(); // 'e'
        Ok(BencodeValue::List(items))
    }

    fn parse_dict(&mut self, root: bool) -> Result<BencodeValue, BencodeError> {
        self.bump(); // 'd'
        let mut entries = BTreeMap::new();
        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(BencodeError::DictKeyNotString { offset: self.pos });
            }
            let key_offset = self.pos;
            let key = self.parse_bytes()?;
            if entries.contains_key(&key) {
                return Err(BencodeError::DuplicateDictKey { offset: key_offset });
            }

            // Capture the first root-level "info" value span only.
            let capture = root && self.capture_info && self.info_span.is_none() && key == b"info";
            let value_start = self.pos;
            let value = self.parse_value(false)?;
            if capture {
                self.info_span = Some(value_start..self.pos);
            }

            entries.insert(key, value);
        }
        self.bump(); // 'e'
        Ok(BencodeValue::Dict(entries))
    }
}
