//! Routing section decoding
//!
//! Every entry point maps wire errors to [`ObfError::CorruptSection`] for the
//! section being read, so a damaged section never affects its siblings.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use obf_common::{Area31, DecodeError, DecodeResult, ObfError, Point31, Result};
use rayon::prelude::*;

use super::road::{RestrictionKind, Road};
use super::rules::EncodingRuleTable;
use super::{Region, RoutingSection, RoutingSubsection, SectionId};
use crate::catalog::{ObfContainer, ObfSection, SectionKind};
use crate::fields::{self, block, data_box, id_table, restriction, routing, rule, SHIFT_COORDINATES};
use crate::wire::Cursor;

/// Decodes routing sections of one container.
#[derive(Debug, Clone, Copy)]
pub struct RoutingSectionReader<'a> {
    data: &'a [u8],
}

/// Decode every routing section of `container`, one result per section.
pub fn read_routing_sections(container: &ObfContainer) -> Vec<Result<RoutingSection>> {
    let reader = RoutingSectionReader::new(container.data());
    container
        .routing_sections()
        .map(|section| {
            let result = reader.read_section(section);
            if let Err(err) = &result {
                tracing::warn!(section = %section.name, %err, "skipping routing section");
            }
            result
        })
        .collect()
}

/// A road record before block-level references are resolved.
#[derive(Debug, Default)]
struct RawRoad {
    internal_id: u64,
    points: Vec<Point31>,
    types: Vec<u32>,
    extra_types: Vec<u32>,
    point_types: BTreeMap<u32, Vec<u32>>,
    /// (tag local id, string table index)
    names: Vec<(u32, u32)>,
    /// (point index, tag local id, string table index)
    point_names: Vec<(u32, u32, u32)>,
}

#[derive(Debug, Clone, Copy)]
struct RawRestriction {
    kind: u32,
    from: u32,
    to: u32,
}

/// Block-level tables roads refer into.
///
/// `ids` is `None` for records read outside any block, whose internal id is
/// the road id.
#[derive(Debug, Default)]
struct BlockTables {
    ids: Option<Vec<i64>>,
    strings: Vec<String>,
    restrictions: Vec<RawRestriction>,
}

impl BlockTables {
    fn road_id(&self, internal_id: u64) -> DecodeResult<i64> {
        match &self.ids {
            Some(ids) => usize::try_from(internal_id)
                .ok()
                .and_then(|i| ids.get(i))
                .copied()
                .ok_or_else(|| {
                    DecodeError::InvalidReference(format!(
                        "road {internal_id} not in block id table of {} entries",
                        ids.len()
                    ))
                }),
            None => i64::try_from(internal_id)
                .map_err(|_| DecodeError::InvalidReference(format!("road id {internal_id} out of range"))),
        }
    }

    fn string(&self, index: u32) -> DecodeResult<&String> {
        self.strings.get(index as usize).ok_or_else(|| {
            DecodeError::InvalidReference(format!("string {index} not in block string table"))
        })
    }
}

impl<'a> RoutingSectionReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn for_container(container: &'a ObfContainer) -> Self {
        Self::new(container.data())
    }

    pub(crate) fn data_slice(&self) -> &'a [u8] {
        self.data
    }

    fn check_kind(section: &ObfSection) -> Result<()> {
        if section.kind != SectionKind::Routing {
            return Err(ObfError::NotARoutingSection(section.name.clone()));
        }
        Ok(())
    }

    fn section_cursor(&self, offset: usize, length: usize) -> DecodeResult<Cursor<'a>> {
        let mut cursor = Cursor::at(self.data, offset)?;
        // the section limit stays pushed for the cursor's lifetime
        let _section_limit = cursor.push_limit(length)?;
        Ok(cursor)
    }

    /// The section's encoding rules in file order.
    pub fn read_encoding_rules(&self, section: &ObfSection) -> Result<EncodingRuleTable> {
        Self::check_kind(section)?;
        self.decode_rules(section)
            .map_err(|e| ObfError::corrupt_section(&section.name, section.offset, e))
    }

    fn decode_rules(&self, section: &ObfSection) -> DecodeResult<EncodingRuleTable> {
        let mut c = self.section_cursor(section.offset, section.length)?;
        let mut table = EncodingRuleTable::new();
        loop {
            let tag = c.read_tag()?;
            match tag.field {
                0 => break,
                routing::RULES => {
                    let (tag, value) = read_rule(&mut c)?;
                    table.push(tag, value);
                }
                routing::ROOT_BOXES
                | routing::BASEMAP_BOXES
                | routing::BORDER_BOX
                | routing::BASE_BORDER_BOX => c.skip_be_length_delimited()?,
                routing::BLOCKS => break,
                _ => c.skip_unknown_field(tag)?,
            }
        }
        Ok(table)
    }

    /// Rules, box tree and border box location of one section.
    pub fn read_section(&self, section: &ObfSection) -> Result<RoutingSection> {
        Self::check_kind(section)?;
        let decoded = self
            .decode_section(section)
            .map_err(|e| ObfError::corrupt_section(&section.name, section.offset, e))?;
        tracing::debug!(
            section = %decoded.name,
            rules = decoded.rules.len(),
            boxes = decoded.subsections.len(),
            "decoded routing section"
        );
        Ok(decoded)
    }

    fn decode_section(&self, section: &ObfSection) -> DecodeResult<RoutingSection> {
        let mut c = self.section_cursor(section.offset, section.length)?;
        let mut decoded = RoutingSection {
            id: SectionId::next(),
            name: section.name.clone(),
            offset: section.offset,
            length: section.length,
            rules: Arc::default(),
            subsections: Vec::new(),
            basemap_subsections: Vec::new(),
            border_box: None,
            base_border_box: None,
        };
        let mut rules = EncodingRuleTable::new();

        loop {
            let tag = c.read_tag()?;
            match tag.field {
                0 => break,
                routing::NAME => decoded.name = c.read_string()?,
                routing::RULES => {
                    let (tag, value) = read_rule(&mut c)?;
                    rules.push(tag, value);
                }
                routing::ROOT_BOXES | routing::BASEMAP_BOXES => {
                    let length = c.read_fixed_be_u32()? as usize;
                    let offset = c.position();
                    let token = c.push_limit(length)?;
                    let subsection = read_subsection(&mut c, offset, length, None)?;
                    c.pop_limit(token);
                    if tag.field == routing::ROOT_BOXES {
                        decoded.subsections.push(subsection);
                    } else {
                        decoded.basemap_subsections.push(subsection);
                    }
                }
                routing::BORDER_BOX | routing::BASE_BORDER_BOX => {
                    let length = c.read_fixed_be_u32()? as usize;
                    let region = Region {
                        offset: c.position(),
                        length,
                    };
                    c.skip(length)?;
                    if tag.field == routing::BORDER_BOX {
                        decoded.border_box = Some(region);
                    } else {
                        decoded.base_border_box = Some(region);
                    }
                }
                routing::BLOCKS => {
                    let rest = c.bytes_until_limit();
                    c.skip(rest)?;
                }
                _ => c.skip_unknown_field(tag)?,
            }
        }

        decoded.rules = Arc::new(rules);
        Ok(decoded)
    }

    fn corrupt(section: &RoutingSection, err: DecodeError) -> ObfError {
        ObfError::corrupt_section(&section.name, section.offset, err)
    }

    /// Decode one road record located at `offset`.
    ///
    /// When the record lies inside a box's data block, its coordinates are
    /// relative to that box and its id, names and restrictions are resolved
    /// through the block tables. Otherwise the record is read standalone:
    /// absolute coordinates, internal id as road id.
    pub fn read_road(&self, section: &RoutingSection, offset: usize) -> Result<Road> {
        self.decode_single_road(section, offset)
            .map_err(|e| Self::corrupt(section, e))
    }

    fn decode_single_road(&self, section: &RoutingSection, offset: usize) -> DecodeResult<Road> {
        let owner = self.containing_subsection(section, offset)?;
        let (tables, base) = match owner {
            Some(sub) => (self.read_block_tables(section, sub)?, sub.area.top_left()),
            None => (BlockTables::default(), Point31::default()),
        };

        let mut c = self.section_cursor(section.offset, section.length)?;
        c.seek(offset)?;
        let token = c.push_varint_limit()?;
        let raw = read_road_record(&mut c, base)?;
        c.pop_limit(token);
        resolve_road(raw, section, &tables)
    }

    fn containing_subsection<'s>(
        &self,
        section: &'s RoutingSection,
        offset: usize,
    ) -> DecodeResult<Option<&'s RoutingSubsection>> {
        for sub in section.data_subsections() {
            let Some(start) = sub.data_position() else {
                continue;
            };
            let mut c = self.section_cursor(section.offset, section.length)?;
            c.seek(start)?;
            let len = c.read_varint32()? as usize;
            let body_start = c.position();
            if offset >= body_start && offset < body_start + len {
                return Ok(Some(sub));
            }
        }
        Ok(None)
    }

    fn read_block_tables(
        &self,
        section: &RoutingSection,
        sub: &RoutingSubsection,
    ) -> DecodeResult<BlockTables> {
        let mut c = self.block_cursor(section, sub)?;
        let mut tables = BlockTables::default();
        loop {
            let tag = c.read_tag()?;
            match tag.field {
                0 => return Ok(tables),
                block::ID_TABLE => tables.ids = Some(read_id_table(&mut c)?),
                block::RESTRICTIONS => tables.restrictions.push(read_restriction(&mut c)?),
                block::STRING_TABLE => tables.strings = c.read_string_table()?,
                _ => c.skip_unknown_field(tag)?,
            }
        }
    }

    fn block_cursor(&self, section: &RoutingSection, sub: &RoutingSubsection) -> DecodeResult<Cursor<'a>> {
        let start = sub.data_position().ok_or_else(|| {
            DecodeError::InvalidReference(format!("box at {} has no data block", sub.offset))
        })?;
        let mut c = self.section_cursor(section.offset, section.length)?;
        c.seek(start)?;
        let _block_limit = c.push_varint_limit()?;
        Ok(c)
    }

    /// All roads of one box's data block, in record order.
    pub fn load_block(&self, section: &RoutingSection, sub: &RoutingSubsection) -> Result<Vec<Road>> {
        self.decode_block(section, sub)
            .map_err(|e| Self::corrupt(section, e))
    }

    fn decode_block(&self, section: &RoutingSection, sub: &RoutingSubsection) -> DecodeResult<Vec<Road>> {
        let mut c = self.block_cursor(section, sub)?;
        let base = sub.area.top_left();
        let mut tables = BlockTables::default();
        let mut raw_roads = Vec::new();

        loop {
            let tag = c.read_tag()?;
            match tag.field {
                0 => break,
                block::ID_TABLE => tables.ids = Some(read_id_table(&mut c)?),
                block::DATA_OBJECTS => {
                    let token = c.push_varint_limit()?;
                    raw_roads.push(read_road_record(&mut c, base)?);
                    c.pop_limit(token);
                }
                block::RESTRICTIONS => tables.restrictions.push(read_restriction(&mut c)?),
                block::STRING_TABLE => tables.strings = c.read_string_table()?,
                _ => c.skip_unknown_field(tag)?,
            }
        }

        let roads = raw_roads
            .into_iter()
            .map(|raw| resolve_road(raw, section, &tables))
            .collect::<DecodeResult<Vec<_>>>()?;
        tracing::trace!(section = %section.name, box_offset = sub.offset, roads = roads.len(), "loaded block");
        Ok(roads)
    }

    /// Roads of every box intersecting `area`, blocks decoded in parallel.
    ///
    /// Blocks not yet started when `abort` is raised are skipped.
    pub fn load_roads(
        &self,
        section: &RoutingSection,
        area: &Area31,
        abort: Option<&AtomicBool>,
    ) -> Result<Vec<Road>> {
        let mut boxes = Vec::new();
        for root in section.subsections.iter() {
            collect_intersecting(root, area, &mut boxes);
        }

        let blocks = boxes
            .par_iter()
            .map(|sub| {
                if abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return Ok(Vec::new());
                }
                self.load_block(section, sub)
            })
            .collect::<Result<Vec<_>>>()?;

        if abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            tracing::debug!(section = %section.name, "road loading aborted");
        }
        Ok(blocks.into_iter().flatten().collect())
    }
}

fn collect_intersecting<'s>(sub: &'s RoutingSubsection, area: &Area31, out: &mut Vec<&'s RoutingSubsection>) {
    if !sub.area.intersects(area) {
        return;
    }
    if sub.data_offset != 0 {
        out.push(sub);
    }
    for child in &sub.children {
        collect_intersecting(child, area, out);
    }
}

/// `RouteEncodingRule` body; the explicit id field is ignored.
fn read_rule(c: &mut Cursor<'_>) -> DecodeResult<(String, String)> {
    let token = c.push_varint_limit()?;
    let mut tag = String::new();
    let mut value = String::new();
    loop {
        let t = c.read_tag()?;
        match t.field {
            0 => break,
            rule::TAG => tag = c.read_string()?,
            rule::VALUE => value = c.read_string()?,
            rule::ID => {
                c.read_varint32()?;
            }
            _ => c.skip_unknown_field(t)?,
        }
    }
    c.pop_limit(token);
    Ok((tag, value))
}

fn apply_delta(base: u32, delta: i32) -> DecodeResult<u32> {
    u32::try_from(i64::from(base) + i64::from(delta))
        .map_err(|_| DecodeError::InvalidReference(format!("box edge {base}{delta:+} out of range")))
}

fn read_subsection(
    c: &mut Cursor<'_>,
    offset: usize,
    length: usize,
    parent: Option<&Area31>,
) -> DecodeResult<RoutingSubsection> {
    let base = parent.copied().unwrap_or_default();
    let mut sub = RoutingSubsection {
        area: base,
        offset,
        length,
        data_offset: 0,
        children: Vec::new(),
    };
    loop {
        let tag = c.read_tag()?;
        match tag.field {
            0 => return Ok(sub),
            data_box::LEFT => sub.area.left = apply_delta(base.left, c.read_sint32()?)?,
            data_box::RIGHT => sub.area.right = apply_delta(base.right, c.read_sint32()?)?,
            data_box::TOP => sub.area.top = apply_delta(base.top, c.read_sint32()?)?,
            data_box::BOTTOM => sub.area.bottom = apply_delta(base.bottom, c.read_sint32()?)?,
            data_box::SHIFT_TO_DATA => sub.data_offset = c.read_fixed_be_u32()?,
            data_box::BOXES => {
                let length = c.read_fixed_be_u32()? as usize;
                let child_offset = c.position();
                let token = c.push_limit(length)?;
                let child = read_subsection(c, child_offset, length, Some(&sub.area))?;
                c.pop_limit(token);
                sub.children.push(child);
            }
            _ => c.skip_unknown_field(tag)?,
        }
    }
}

fn read_id_table(c: &mut Cursor<'_>) -> DecodeResult<Vec<i64>> {
    let token = c.push_varint_limit()?;
    let mut ids = Vec::new();
    let mut id = 0i64;
    loop {
        let tag = c.read_tag()?;
        match tag.field {
            0 => break,
            id_table::ROUTE_ID => {
                id = id.wrapping_add(c.read_sint64()?);
                ids.push(id);
            }
            _ => c.skip_unknown_field(tag)?,
        }
    }
    c.pop_limit(token);
    Ok(ids)
}

fn read_restriction(c: &mut Cursor<'_>) -> DecodeResult<RawRestriction> {
    let token = c.push_varint_limit()?;
    let mut r = RawRestriction {
        kind: 0,
        from: 0,
        to: 0,
    };
    loop {
        let tag = c.read_tag()?;
        match tag.field {
            0 => break,
            restriction::TYPE => r.kind = c.read_varint32()?,
            restriction::FROM => r.from = c.read_varint32()?,
            restriction::TO => r.to = c.read_varint32()?,
            _ => c.skip_unknown_field(tag)?,
        }
    }
    c.pop_limit(token);
    Ok(r)
}

/// `RouteData` body. Points are running sums on the shifted grid, starting
/// from `base`.
fn read_road_record(c: &mut Cursor<'_>, base: Point31) -> DecodeResult<RawRoad> {
    let mut raw = RawRoad::default();
    loop {
        let tag = c.read_tag()?;
        match tag.field {
            0 => return Ok(raw),
            fields::road::POINTS => {
                let token = c.push_varint_limit()?;
                let mut x = i64::from(base.x >> SHIFT_COORDINATES);
                let mut y = i64::from(base.y >> SHIFT_COORDINATES);
                while !c.at_limit() {
                    x += i64::from(c.read_sint32()?);
                    y += i64::from(c.read_sint32()?);
                    raw.points.push(unshift_point(x, y)?);
                }
                c.pop_limit(token);
            }
            fields::road::POINT_TYPES => {
                let token = c.push_varint_limit()?;
                while !c.at_limit() {
                    let index = c.read_varint32()?;
                    let types = c.read_packed_u32s()?;
                    raw.point_types.entry(index).or_default().extend(types);
                }
                c.pop_limit(token);
            }
            fields::road::TYPES => raw.types = c.read_packed_u32s()?,
            fields::road::EXTRA_TYPES => raw.extra_types = c.read_packed_u32s()?,
            fields::road::ROUTE_ID => raw.internal_id = c.read_varint64()?,
            fields::road::POINT_NAMES => {
                let token = c.push_varint_limit()?;
                while !c.at_limit() {
                    let index = c.read_varint32()?;
                    let tag = c.read_varint32()?;
                    let string_id = c.read_varint32()?;
                    raw.point_names.push((index, tag, string_id));
                }
                c.pop_limit(token);
            }
            fields::road::STRING_NAMES => {
                let token = c.push_varint_limit()?;
                while !c.at_limit() {
                    let tag = c.read_varint32()?;
                    let string_id = c.read_varint32()?;
                    raw.names.push((tag, string_id));
                }
                c.pop_limit(token);
            }
            _ => c.skip_unknown_field(tag)?,
        }
    }
}

fn unshift_point(x: i64, y: i64) -> DecodeResult<Point31> {
    let shift = |v: i64| {
        u32::try_from(v << SHIFT_COORDINATES)
            .map_err(|_| DecodeError::InvalidReference(format!("point coordinate {v} out of range")))
    };
    Ok(Point31::new(shift(x)?, shift(y)?))
}

fn resolve_road(raw: RawRoad, section: &RoutingSection, tables: &BlockTables) -> DecodeResult<Road> {
    let mut names = BTreeMap::new();
    for (tag, string_id) in raw.names {
        names.insert(tag, tables.string(string_id)?.clone());
    }

    let mut point_names: BTreeMap<u32, Vec<(u32, String)>> = BTreeMap::new();
    for (index, tag, string_id) in raw.point_names {
        let name = tables.string(string_id)?.clone();
        point_names.entry(index).or_default().push((tag, name));
    }

    let mut restrictions = BTreeMap::new();
    for r in tables.restrictions.iter().filter(|r| u64::from(r.from) == raw.internal_id) {
        restrictions.insert(tables.road_id(u64::from(r.to))?, RestrictionKind::from_raw(r.kind));
    }

    let id = tables.road_id(raw.internal_id)?;
    Ok(Road::new(id, section.id, raw.points, raw.types)
        .with_extra_types(raw.extra_types)
        .with_point_types(raw.point_types)
        .with_restrictions(restrictions)
        .with_names(names)
        .with_point_names(point_names)
        .with_rules(Arc::clone(&section.rules)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WireWriter;

    fn standalone_section() -> RoutingSection {
        RoutingSection {
            id: SectionId::next(),
            name: "loose".into(),
            offset: 0,
            length: 0,
            rules: Arc::new(EncodingRuleTable::new()),
            subsections: Vec::new(),
            basemap_subsections: Vec::new(),
            border_box: None,
            base_border_box: None,
        }
    }

    #[test]
    fn test_route_id_wider_than_32_bits() {
        let mut w = WireWriter::new();
        w.write_packed_u32s(fields::road::TYPES, &[0]);
        w.write_uint(fields::road::ROUTE_ID, 5_000_000_000);
        let bytes = w.into_bytes();

        let mut c = Cursor::new(&bytes);
        let raw = read_road_record(&mut c, Point31::default()).unwrap();
        assert_eq!(raw.internal_id, 5_000_000_000);

        let road = resolve_road(raw, &standalone_section(), &BlockTables::default()).unwrap();
        assert_eq!(road.id(), 5_000_000_000);
    }

    #[test]
    fn test_block_id_table_must_cover_internal_ids() {
        let tables = BlockTables {
            ids: Some(vec![100, 200]),
            ..BlockTables::default()
        };
        assert_eq!(tables.road_id(1).unwrap(), 200);
        assert!(matches!(tables.road_id(2), Err(DecodeError::InvalidReference(_))));
        assert_eq!(BlockTables::default().road_id(2).unwrap(), 2);
    }

    #[test]
    fn test_point_names_resolve_through_string_table() {
        let tables = BlockTables {
            strings: vec!["Bridge Street".into(), "Old Mill".into()],
            ..BlockTables::default()
        };
        let raw = RawRoad {
            points: vec![Point31::new(0, 0), Point31::new(64, 0)],
            point_names: vec![(1, 3, 1), (1, 4, 0)],
            ..RawRoad::default()
        };
        let road = resolve_road(raw, &standalone_section(), &tables).unwrap();
        assert_eq!(
            road.point_names(1),
            &[(3, "Old Mill".to_string()), (4, "Bridge Street".to_string())]
        );
        assert!(road.point_names(0).is_empty());

        let dangling = RawRoad {
            point_names: vec![(0, 3, 9)],
            ..RawRoad::default()
        };
        assert!(resolve_road(dangling, &standalone_section(), &tables).is_err());
    }
}
