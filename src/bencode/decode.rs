use super::error::BencodeError;
use super::value::Value;
use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::BTreeMap;

const MAX_DEPTH: usize = 64;

/// Decodes a complete bencode value from `data`.
///
/// The whole input must be consumed; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut decoder = Decoder::new(data);
    let value = decoder.decode_value()?;
    decoder.expect_eof()?;
    Ok(value)
}

/// Streaming cursor over a bencoded byte stream.
///
/// The schema readers (torrent metainfo, tracker responses) drive this
/// directly so they can walk a dictionary key by key, capture the raw
/// byte span of a value, and skip values for keys they do not recognize.
/// There is never more than one byte of lookahead.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current byte offset into the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Result<u8, BencodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEof)
    }

    fn bump(&mut self) -> Result<u8, BencodeError> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    /// Fails unless the entire input has been consumed.
    pub fn expect_eof(&self) -> Result<(), BencodeError> {
        if self.pos != self.data.len() {
            return Err(BencodeError::TrailingData { pos: self.pos });
        }
        Ok(())
    }

    /// Decodes any single value. Also the generic "skip one value" used
    /// for unrecognized dictionary keys.
    pub fn decode_value(&mut self) -> Result<Value, BencodeError> {
        self.decode_value_at(0)
    }

    fn decode_value_at(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::NestingTooDeep);
        }

        match self.peek()? {
            b'i' => self.read_integer().map(Value::Integer),
            b'l' => self.decode_list(depth),
            b'd' => self.decode_dict(depth),
            b'0'..=b'9' => self.read_byte_string().map(Value::Bytes),
            byte => Err(BencodeError::UnexpectedByte {
                byte,
                pos: self.pos,
            }),
        }
    }

    /// Reads an `i<digits>e` integer.
    ///
    /// Digits are ASCII only; leading zeros and `-0` are rejected.
    pub fn read_integer(&mut self) -> Result<i64, BencodeError> {
        let open = self.pos;
        let byte = self.bump()?;
        if byte != b'i' {
            return Err(BencodeError::UnexpectedByte { byte, pos: open });
        }

        let start = self.pos;
        while self.peek()? != b'e' {
            self.pos += 1;
        }

        let text = &self.data[start..self.pos];
        let (negative, digits) = match text.split_first() {
            Some((b'-', rest)) => (true, rest),
            _ => (false, text),
        };

        if digits.is_empty() || digits.iter().any(|b| !b.is_ascii_digit()) {
            return Err(BencodeError::InvalidInteger { pos: start });
        }
        if digits[0] == b'0' && (digits.len() > 1 || negative) {
            return Err(BencodeError::InvalidInteger { pos: start });
        }

        let value: i64 = std::str::from_utf8(text)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidInteger { pos: start })?;

        self.pos += 1;
        Ok(value)
    }

    /// Reads a `<length>:<raw bytes>` byte string.
    pub fn read_byte_string(&mut self) -> Result<Bytes, BencodeError> {
        let byte = self.peek()?;
        if !byte.is_ascii_digit() {
            return Err(BencodeError::UnexpectedByte {
                byte,
                pos: self.pos,
            });
        }

        let start = self.pos;
        while self.peek()? != b':' {
            let b = self.bump()?;
            if !b.is_ascii_digit() {
                return Err(BencodeError::InvalidStringLength { pos: self.pos - 1 });
            }
        }

        let digits = &self.data[start..self.pos];
        if digits[0] == b'0' && digits.len() > 1 {
            return Err(BencodeError::InvalidStringLength { pos: start });
        }

        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidStringLength { pos: start })?;

        self.pos += 1;
        if self.pos + len > self.data.len() {
            return Err(BencodeError::UnexpectedEof);
        }

        let bytes = Bytes::copy_from_slice(&self.data[self.pos..self.pos + len]);
        self.pos += len;
        Ok(bytes)
    }

    /// Consumes the opening `d` of a dictionary.
    pub fn begin_dict(&mut self) -> Result<(), BencodeError> {
        let pos = self.pos;
        let byte = self.bump()?;
        if byte != b'd' {
            return Err(BencodeError::UnexpectedByte { byte, pos });
        }
        Ok(())
    }

    /// Reads the next dictionary key, or consumes the closing `e` and
    /// returns `None`.
    ///
    /// Keys must be byte strings in strictly increasing lexicographic
    /// order; `last` threads the ordering state between calls. Any other
    /// value type where a key is expected is a grammar violation.
    pub fn dict_key(&mut self, last: &mut Option<Bytes>) -> Result<Option<Bytes>, BencodeError> {
        match self.peek()? {
            b'e' => {
                self.pos += 1;
                Ok(None)
            }
            b'0'..=b'9' => {
                let pos = self.pos;
                let key = self.read_byte_string()?;
                if let Some(prev) = last {
                    match prev.as_ref().cmp(key.as_ref()) {
                        Ordering::Less => {}
                        Ordering::Equal => return Err(BencodeError::DuplicateKey { pos }),
                        Ordering::Greater => return Err(BencodeError::UnsortedKey { pos }),
                    }
                }
                *last = Some(key.clone());
                Ok(Some(key))
            }
            byte => Err(BencodeError::UnexpectedByte {
                byte,
                pos: self.pos,
            }),
        }
    }

    fn decode_list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.pos += 1;
        let mut items = Vec::new();

        while self.peek()? != b'e' {
            items.push(self.decode_value_at(depth + 1)?);
        }

        self.pos += 1;
        Ok(Value::List(items))
    }

    fn decode_dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.begin_dict()?;
        let mut entries = BTreeMap::new();
        let mut last_key = None;

        while let Some(key) = self.dict_key(&mut last_key)? {
            let value = self.decode_value_at(depth + 1)?;
            entries.insert(key, value);
        }

        Ok(Value::Dict(entries))
    }
}
