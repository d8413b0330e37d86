//! Error types shared by the OBF reader and the rule evaluator
//!
//! Decoding failures are split in two layers: [`DecodeError`] describes what
//! went wrong at the wire level, [`ObfError`] says which part of the container
//! is unusable because of it. A corrupt section never poisons its siblings.

use std::io;
use thiserror::Error;

/// Wire-level decode failure raised by the binary cursor and record decoders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A read or a nested limit reached past the active region boundary.
    #[error("unexpected end of region at byte {position} (limit {limit})")]
    UnexpectedEndOfRegion { position: usize, limit: usize },

    /// The underlying data ended before the requested bytes.
    #[error("unexpected end of data at byte {position}")]
    UnexpectedEof { position: usize },

    /// A varint kept its continuation bit past the tenth byte.
    #[error("malformed varint at byte {position}")]
    MalformedVarint { position: usize },

    /// Wire types 3, 4, 6 and 7 cannot be skipped.
    #[error("unknown wire type {wire_type} for field {field} at byte {position}")]
    UnknownWireType {
        field: u32,
        wire_type: u8,
        position: usize,
    },

    #[error("invalid UTF-8 string at byte {position}")]
    InvalidUtf8 { position: usize },

    /// A record points at an entry that does not exist (string table, id table, offset).
    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

/// Container-level failure.
#[derive(Debug, Error)]
pub enum ObfError {
    /// The top-level index is unreadable; nothing in the file may be used.
    #[error("invalid OBF container: {0}")]
    InvalidContainer(String),

    /// One section's body failed to decode; other sections stay usable.
    #[error("corrupt section '{section}' at offset {offset}: {source}")]
    CorruptSection {
        section: String,
        offset: usize,
        #[source]
        source: DecodeError,
    },

    #[error("section '{0}' is not a routing section")]
    NotARoutingSection(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ObfError {
    pub fn corrupt_section(section: impl Into<String>, offset: usize, source: DecodeError) -> Self {
        ObfError::CorruptSection {
            section: section.into(),
            offset,
            source,
        }
    }

    /// True when only one section is affected.
    pub fn is_section_local(&self) -> bool {
        matches!(self, ObfError::CorruptSection { .. })
    }
}

/// A tag value could not be interpreted as the numeric type an expression expects.
///
/// Never fatal: the rule evaluator treats the expression as non-matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleParseError {
    #[error("cannot parse '{value}' as {expected}")]
    InvalidNumber { value: String, expected: &'static str },

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("tag '{0}' not present on road")]
    MissingTag(String),
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Result alias for container operations
pub type Result<T> = std::result::Result<T, ObfError>;
