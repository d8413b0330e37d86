//! Wire encoder, the write side of [`crate::wire::Cursor`]
//!
//! Used to produce containers for fixtures and tests. Fixed-width
//! big-endian fields can be reserved and patched later, which is how
//! forward offsets (shift-to-data, shift-to-points) are filled in once the
//! referenced block has been laid out.

use crate::catalog::SectionKind;
use crate::fields::structure;
use crate::wire::{encode_zigzag32, encode_zigzag64, Tag, WireType};

#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_raw_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    pub fn write_tag(&mut self, field: u32, wire_type: WireType) {
        self.write_raw_varint(u64::from(Tag::encode(field, wire_type)));
    }

    pub fn write_uint(&mut self, field: u32, value: u64) {
        self.write_tag(field, WireType::Varint);
        self.write_raw_varint(value);
    }

    pub fn write_bool(&mut self, field: u32, value: bool) {
        self.write_uint(field, u64::from(value));
    }

    pub fn write_sint32(&mut self, field: u32, value: i32) {
        self.write_tag(field, WireType::Varint);
        self.write_raw_varint(u64::from(encode_zigzag32(value)));
    }

    pub fn write_sint64(&mut self, field: u32, value: i64) {
        self.write_tag(field, WireType::Varint);
        self.write_raw_varint(encode_zigzag64(value));
    }

    pub fn write_fixed32_le(&mut self, field: u32, value: u32) {
        self.write_tag(field, WireType::Fixed32);
        self.write_raw(&value.to_le_bytes());
    }

    pub fn write_fixed64_le(&mut self, field: u32, value: u64) {
        self.write_tag(field, WireType::Fixed64);
        self.write_raw(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, field: u32, bytes: &[u8]) {
        self.write_tag(field, WireType::LengthDelimited);
        self.write_raw_varint(bytes.len() as u64);
        self.write_raw(bytes);
    }

    pub fn write_string(&mut self, field: u32, value: &str) {
        self.write_bytes(field, value.as_bytes());
    }

    pub fn write_packed_u32s(&mut self, field: u32, values: &[u32]) {
        let mut inner = WireWriter::new();
        for v in values {
            inner.write_raw_varint(u64::from(*v));
        }
        self.write_bytes(field, inner.as_slice());
    }

    /// Length-delimited sub-message built by `build`.
    pub fn write_message(&mut self, field: u32, build: impl FnOnce(&mut WireWriter)) {
        let mut inner = WireWriter::new();
        build(&mut inner);
        self.write_bytes(field, inner.as_slice());
    }

    /// OBF block: fixed32 tag, big-endian length, then the body.
    ///
    /// Returns the offset of the body's first byte.
    pub fn write_be_block(&mut self, field: u32, body: &[u8]) -> usize {
        self.write_tag(field, WireType::Fixed32);
        self.write_be_u32(body.len() as u32);
        let start = self.position();
        self.write_raw(body);
        start
    }

    pub fn write_be_u32(&mut self, value: u32) {
        self.write_raw(&value.to_be_bytes());
    }

    /// Reserve four bytes for a big-endian value patched later.
    pub fn reserve_be_u32(&mut self) -> usize {
        let at = self.position();
        self.write_be_u32(0);
        at
    }

    pub fn patch_be_u32(&mut self, at: usize, value: u32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Varint length prefix followed by `body`, without a tag.
    pub fn write_length_prefixed(&mut self, body: &[u8]) {
        self.write_raw_varint(body.len() as u64);
        self.write_raw(body);
    }

    /// Length-prefixed `StringTable` message.
    pub fn write_string_table<S: AsRef<str>>(&mut self, strings: &[S]) {
        let mut table = WireWriter::new();
        for s in strings {
            table.write_string(1, s.as_ref());
        }
        self.write_length_prefixed(table.as_slice());
    }
}

/// Assembles a whole container: header, sections, version confirmation.
#[derive(Debug, Clone)]
pub struct ContainerWriter {
    version: u32,
    date_created: u64,
    sections: Vec<(SectionKind, Vec<u8>)>,
    confirm_version: Option<u32>,
}

impl ContainerWriter {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            date_created: 0,
            sections: Vec::new(),
            confirm_version: Some(version),
        }
    }

    pub fn date_created(mut self, millis: u64) -> Self {
        self.date_created = millis;
        self
    }

    /// Override the trailing version confirmation; `None` omits it.
    pub fn confirm_version(mut self, version: Option<u32>) -> Self {
        self.confirm_version = version;
        self
    }

    pub fn add_section(&mut self, kind: SectionKind, body: Vec<u8>) -> &mut Self {
        self.sections.push((kind, body));
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.write_uint(structure::VERSION, u64::from(self.version));
        w.write_uint(structure::DATE_CREATED, self.date_created);
        for (kind, body) in &self.sections {
            w.write_be_block(kind.field_number(), body);
        }
        if let Some(confirm) = self.confirm_version {
            w.write_uint(structure::VERSION_CONFIRM, u64::from(confirm));
        }
        w.into_bytes()
    }
}
