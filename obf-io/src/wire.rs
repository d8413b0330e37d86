//! Protobuf-style wire decoding over an immutable byte slice
//!
//! OBF bodies use standard protobuf framing (varint tags, zig-zag signed
//! integers, length-delimited sub-messages) plus one OBF-specific twist:
//! container sections and routing boxes carry a *big-endian* u32 length
//! instead of a varint.
//!
//! Every nested region is bounded with [`Cursor::push_limit`]; reading past
//! the active limit is an error, never a silent truncation.

use obf_common::{DecodeError, DecodeResult};

/// Varints never span more than ten bytes.
const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// A decoded field header. `field == 0` marks the end of the current region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub field: u32,
    pub wire_type: u8,
}

impl Tag {
    pub const END: Tag = Tag {
        field: 0,
        wire_type: 0,
    };

    pub fn is_end(&self) -> bool {
        self.field == 0
    }

    pub fn encode(field: u32, wire_type: WireType) -> u32 {
        (field << 3) | wire_type as u32
    }
}

/// Restores the enclosing limit when handed back to [`Cursor::pop_limit`].
#[derive(Debug)]
#[must_use = "a pushed limit must be popped"]
pub struct LimitToken {
    previous: usize,
}

pub fn decode_zigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

pub fn decode_zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

pub fn encode_zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

pub fn encode_zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Forward-only reader with nested region limits.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            limit: data.len(),
        }
    }

    /// Cursor positioned at `offset`, bounded by the end of data.
    pub fn at(data: &'a [u8], offset: usize) -> DecodeResult<Self> {
        let mut cursor = Self::new(data);
        cursor.seek(offset)?;
        Ok(cursor)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn bytes_until_limit(&self) -> usize {
        self.limit.saturating_sub(self.pos)
    }

    pub fn at_limit(&self) -> bool {
        self.pos >= self.limit
    }

    fn overrun(&self, position: usize) -> DecodeError {
        if self.limit >= self.data.len() {
            DecodeError::UnexpectedEof { position }
        } else {
            DecodeError::UnexpectedEndOfRegion {
                position,
                limit: self.limit,
            }
        }
    }

    /// Move to an absolute position inside the active limit.
    pub fn seek(&mut self, position: usize) -> DecodeResult<()> {
        if position > self.limit {
            return Err(self.overrun(position));
        }
        self.pos = position;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> DecodeResult<()> {
        self.take(n).map(|_| ())
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::UnexpectedEof {
            position: self.pos,
        })?;
        if end > self.limit {
            return Err(self.overrun(self.pos));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Bound subsequent reads to the next `len` bytes.
    ///
    /// A limit reaching past the enclosing one fails immediately, which is how
    /// a sub-region claiming more bytes than its parent holds is detected.
    pub fn push_limit(&mut self, len: usize) -> DecodeResult<LimitToken> {
        let new_limit = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.limit)
            .ok_or(DecodeError::UnexpectedEndOfRegion {
                position: self.pos,
                limit: self.limit,
            })?;
        let token = LimitToken {
            previous: self.limit,
        };
        self.limit = new_limit;
        Ok(token)
    }

    pub fn pop_limit(&mut self, token: LimitToken) {
        self.limit = token.previous;
    }

    /// Read the next field header, or [`Tag::END`] at the active limit.
    pub fn read_tag(&mut self) -> DecodeResult<Tag> {
        if self.at_limit() {
            return Ok(Tag::END);
        }
        let raw = self.read_varint32()?;
        Ok(Tag {
            field: raw >> 3,
            wire_type: (raw & 0x7) as u8,
        })
    }

    pub fn read_varint64(&mut self) -> DecodeResult<u64> {
        let start = self.pos;
        let mut result = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.take(1)?[0];
            result |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(DecodeError::MalformedVarint { position: start })
    }

    /// Varints wider than 32 bits are truncated, as protobuf does.
    pub fn read_varint32(&mut self) -> DecodeResult<u32> {
        Ok(self.read_varint64()? as u32)
    }

    pub fn read_sint32(&mut self) -> DecodeResult<i32> {
        Ok(decode_zigzag32(self.read_varint32()?))
    }

    pub fn read_sint64(&mut self) -> DecodeResult<i64> {
        Ok(decode_zigzag64(self.read_varint64()?))
    }

    pub fn read_bool(&mut self) -> DecodeResult<bool> {
        Ok(self.read_varint64()? != 0)
    }

    pub fn read_fixed_be_u32(&mut self) -> DecodeResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// A varint length followed by that many bytes.
    pub fn read_bytes(&mut self) -> DecodeResult<&'a [u8]> {
        let len = self.read_varint32()? as usize;
        self.take(len)
    }

    pub fn read_string(&mut self) -> DecodeResult<String> {
        let start = self.pos;
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { position: start })
    }

    /// Read a varint length and bound the cursor to it.
    pub fn push_varint_limit(&mut self) -> DecodeResult<LimitToken> {
        let len = self.read_varint32()? as usize;
        self.push_limit(len)
    }

    /// Read a big-endian u32 length and bound the cursor to it.
    pub fn push_be_limit(&mut self) -> DecodeResult<LimitToken> {
        let len = self.read_fixed_be_u32()? as usize;
        self.push_limit(len)
    }

    /// Packed varints filling a length-delimited field.
    pub fn read_packed_u32s(&mut self) -> DecodeResult<Vec<u32>> {
        let token = self.push_varint_limit()?;
        let mut values = Vec::new();
        while !self.at_limit() {
            values.push(self.read_varint32()?);
        }
        self.pop_limit(token);
        Ok(values)
    }

    pub fn skip_unknown_field(&mut self, tag: Tag) -> DecodeResult<()> {
        match WireType::from_raw(tag.wire_type) {
            Some(WireType::Varint) => self.read_varint64().map(|_| ()),
            Some(WireType::Fixed64) => self.skip(8),
            Some(WireType::Fixed32) => self.skip(4),
            Some(WireType::LengthDelimited) => {
                let len = self.read_varint32()? as usize;
                self.skip(len)
            }
            None => Err(DecodeError::UnknownWireType {
                field: tag.field,
                wire_type: tag.wire_type,
                position: self.pos,
            }),
        }
    }

    /// Skip an OBF block whose fixed32 tag is followed by a big-endian length.
    pub fn skip_be_length_delimited(&mut self) -> DecodeResult<()> {
        let len = self.read_fixed_be_u32()? as usize;
        self.skip(len)
    }

    /// Read a length-prefixed `StringTable` message into file order.
    pub fn read_string_table(&mut self) -> DecodeResult<Vec<String>> {
        let token = self.push_varint_limit()?;
        let strings = self.read_string_table_body()?;
        self.pop_limit(token);
        Ok(strings)
    }

    /// Strings of a `StringTable` whose bounds are already pushed.
    pub fn read_string_table_body(&mut self) -> DecodeResult<Vec<String>> {
        let mut strings = Vec::new();
        loop {
            let tag = self.read_tag()?;
            match tag.field {
                0 => return Ok(strings),
                1 => strings.push(self.read_string()?),
                _ => self.skip_unknown_field(tag)?,
            }
        }
    }
}
