//! Section catalog - the top-level index of an OBF container
//!
//! Only section kinds, names and byte ranges are decoded here; section
//! bodies are read lazily by the per-kind readers.

use std::fs::File;
use std::path::Path;

use bytes::Bytes;
use memmap2::Mmap;
use obf_common::{DecodeError, DecodeResult, ObfError, Result};

use crate::fields::{section_name, structure};
use crate::wire::{Cursor, WireType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionKind {
    Map,
    Address,
    Routing,
    Poi,
    Transport,
}

impl SectionKind {
    pub fn all() -> &'static [SectionKind] {
        &[
            SectionKind::Map,
            SectionKind::Address,
            SectionKind::Routing,
            SectionKind::Poi,
            SectionKind::Transport,
        ]
    }

    pub fn field_number(&self) -> u32 {
        match self {
            SectionKind::Map => structure::MAP_INDEX,
            SectionKind::Address => structure::ADDRESS_INDEX,
            SectionKind::Routing => structure::ROUTING_INDEX,
            SectionKind::Poi => structure::POI_INDEX,
            SectionKind::Transport => structure::TRANSPORT_INDEX,
        }
    }

    pub fn from_field_number(field: u32) -> Option<Self> {
        SectionKind::all()
            .iter()
            .copied()
            .find(|kind| kind.field_number() == field)
    }

    fn name_field(&self) -> u32 {
        match self {
            SectionKind::Map => section_name::MAP,
            _ => section_name::DEFAULT,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SectionKind::Map => "map",
            SectionKind::Address => "address",
            SectionKind::Routing => "routing",
            SectionKind::Poi => "poi",
            SectionKind::Transport => "transport",
        }
    }
}

/// Location of one section body inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObfSection {
    pub kind: SectionKind,
    pub name: String,
    /// First byte of the body.
    pub offset: usize,
    pub length: usize,
}

impl ObfSection {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Cursor bounded to this section's body.
    pub fn cursor<'a>(&self, data: &'a [u8]) -> DecodeResult<(Cursor<'a>, crate::wire::LimitToken)> {
        let mut cursor = Cursor::at(data, self.offset)?;
        let token = cursor.push_limit(self.length)?;
        Ok((cursor, token))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObfInfo {
    pub version: u32,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    sections: Vec<ObfSection>,
}

impl ObfInfo {
    pub fn all_sections(&self) -> &[ObfSection] {
        &self.sections
    }

    pub fn sections(&self, kind: SectionKind) -> impl Iterator<Item = &ObfSection> + '_ {
        self.sections.iter().filter(move |s| s.kind == kind)
    }

    pub fn section_by_name(&self, kind: SectionKind, name: &str) -> Option<&ObfSection> {
        self.sections(kind).find(|s| s.name == name)
    }
}

/// Decode the top-level index. Any failure rejects the whole container.
pub fn read_catalog(data: &[u8]) -> Result<ObfInfo> {
    read_catalog_inner(data).map_err(|e| match e {
        CatalogError::Decode(err) => ObfError::InvalidContainer(err.to_string()),
        CatalogError::Invalid(msg) => ObfError::InvalidContainer(msg),
    })
}

enum CatalogError {
    Decode(DecodeError),
    Invalid(String),
}

impl From<DecodeError> for CatalogError {
    fn from(err: DecodeError) -> Self {
        CatalogError::Decode(err)
    }
}

fn read_catalog_inner(data: &[u8]) -> std::result::Result<ObfInfo, CatalogError> {
    let mut cursor = Cursor::new(data);
    let mut info = ObfInfo::default();
    let mut version = None;
    let mut confirmed = false;

    loop {
        let tag = cursor.read_tag()?;
        match tag.field {
            0 => break,
            structure::VERSION => version = Some(cursor.read_varint32()?),
            structure::DATE_CREATED => info.created_at_ms = cursor.read_varint64()?,
            structure::VERSION_CONFIRM => {
                let confirm = cursor.read_varint32()?;
                confirmed = version == Some(confirm);
            }
            field => {
                if let Some(kind) = SectionKind::from_field_number(field) {
                    let length = cursor.read_fixed_be_u32()? as usize;
                    let offset = cursor.position();
                    if offset + length > data.len() {
                        return Err(CatalogError::Invalid(format!(
                            "{} section at {offset} claims {length} bytes, container has {}",
                            kind.label(),
                            data.len() - offset
                        )));
                    }
                    let name = read_section_name(data, kind, offset, length);
                    tracing::debug!(kind = kind.label(), %name, offset, length, "cataloged section");
                    info.sections.push(ObfSection {
                        kind,
                        name,
                        offset,
                        length,
                    });
                    cursor.seek(offset + length)?;
                } else if tag.wire_type == WireType::Fixed32 as u8 {
                    cursor.skip_be_length_delimited()?;
                } else {
                    cursor.skip_unknown_field(tag)?;
                }
            }
        }
    }

    let Some(version) = version else {
        return Err(CatalogError::Invalid("missing version".into()));
    };
    if !confirmed {
        return Err(CatalogError::Invalid(format!(
            "version {version} was not confirmed at the end of the index"
        )));
    }
    info.version = version;
    Ok(info)
}

/// Best-effort scan of a section body for its name field.
fn read_section_name(data: &[u8], kind: SectionKind, offset: usize, length: usize) -> String {
    let scan = || -> DecodeResult<Option<String>> {
        let mut cursor = Cursor::at(data, offset)?;
        let token = cursor.push_limit(length)?;
        let name_field = kind.name_field();
        let name = loop {
            let tag = cursor.read_tag()?;
            if tag.is_end() {
                break None;
            }
            if tag.field == name_field && tag.wire_type == WireType::LengthDelimited as u8 {
                break Some(cursor.read_string()?);
            }
            if tag.wire_type == WireType::Fixed32 as u8 {
                cursor.skip_be_length_delimited()?;
            } else {
                cursor.skip_unknown_field(tag)?;
            }
        };
        cursor.pop_limit(token);
        Ok(name)
    };

    match scan() {
        Ok(Some(name)) => name,
        Ok(None) => String::new(),
        Err(err) => {
            tracing::warn!(kind = kind.label(), offset, %err, "unreadable section name");
            String::new()
        }
    }
}

enum Source {
    Mapped(Mmap),
    Owned(Bytes),
}

/// An opened container: its bytes plus the decoded catalog.
pub struct ObfContainer {
    source: Source,
    info: ObfInfo,
}

impl ObfContainer {
    /// Memory-map a container file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the map is read-only and containers are not modified while open.
        let mmap = unsafe { Mmap::map(&file)? };
        let info = read_catalog(&mmap[..])?;
        tracing::debug!(
            path = %path.as_ref().display(),
            sections = info.sections.len(),
            "opened OBF container"
        );
        Ok(Self {
            source: Source::Mapped(mmap),
            info,
        })
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        let info = read_catalog(&bytes)?;
        Ok(Self {
            source: Source::Owned(bytes),
            info,
        })
    }

    pub fn data(&self) -> &[u8] {
        match &self.source {
            Source::Mapped(mmap) => &mmap[..],
            Source::Owned(bytes) => &bytes[..],
        }
    }

    pub fn info(&self) -> &ObfInfo {
        &self.info
    }

    pub fn sections(&self, kind: SectionKind) -> impl Iterator<Item = &ObfSection> + '_ {
        self.info.sections(kind)
    }

    pub fn routing_sections(&self) -> impl Iterator<Item = &ObfSection> + '_ {
        self.sections(SectionKind::Routing)
    }
}

impl std::fmt::Debug for ObfContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObfContainer")
            .field("len", &self.data().len())
            .field("info", &self.info)
            .finish()
    }
}
