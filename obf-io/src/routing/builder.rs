//! Routing section encoder
//!
//! Produces section bodies in the layout [`super::RoutingSectionReader`]
//! decodes: header (name, rules, box tree, border box), then the data
//! blocks the boxes point at. Road coordinates are stored on the shifted
//! grid, so only multiples of 32 survive exactly.

use std::collections::BTreeMap;

use obf_common::{Area31, Point31};

use super::road::RestrictionKind;
use crate::fields::{block, border, data_box, id_table, restriction, road, routing, rule, SHIFT_COORDINATES};
use crate::wire::{encode_zigzag32, WireType};
use crate::writer::WireWriter;

#[derive(Debug, Clone, Default)]
pub struct RoadDef {
    pub id: i64,
    pub points: Vec<Point31>,
    pub types: Vec<u32>,
    pub extra_types: Vec<u32>,
    pub point_types: BTreeMap<u32, Vec<u32>>,
    /// (tag local id, name)
    pub names: Vec<(u32, String)>,
    /// Point index to (tag local id, name)
    pub point_names: BTreeMap<u32, Vec<(u32, String)>>,
    /// (connected road id, kind)
    pub restrictions: Vec<(i64, RestrictionKind)>,
}

impl RoadDef {
    pub fn new(id: i64, points: Vec<Point31>, types: Vec<u32>) -> Self {
        Self {
            id,
            points,
            types,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockDef {
    pub roads: Vec<RoadDef>,
    /// Written instead of the id table derived from `roads` when set.
    pub id_table: Option<Vec<i64>>,
}

#[derive(Debug, Clone)]
pub struct BoxDef {
    pub area: Area31,
    pub block: Option<BlockDef>,
    pub children: Vec<BoxDef>,
}

impl BoxDef {
    pub fn new(area: Area31) -> Self {
        Self {
            area,
            block: None,
            children: Vec::new(),
        }
    }

    pub fn with_roads(mut self, roads: Vec<RoadDef>) -> Self {
        self.block = Some(BlockDef {
            roads,
            id_table: None,
        });
        self
    }

    /// Replace the block's id table; roads past its end have no id.
    pub fn with_id_table(mut self, ids: Vec<i64>) -> Self {
        self.block.get_or_insert_with(BlockDef::default).id_table = Some(ids);
        self
    }

    pub fn with_child(mut self, child: BoxDef) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderPointDef {
    pub road_id: i64,
    pub location: Point31,
    pub direction: bool,
    pub types: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct BorderLineDef {
    pub x: u32,
    pub y: u32,
    pub to_x: Option<u32>,
    pub to_y: Option<u32>,
    pub points: Vec<BorderPointDef>,
}

/// An encoded section body plus where each road record landed.
#[derive(Debug, Clone)]
pub struct EncodedRoutingSection {
    pub body: Vec<u8>,
    /// (road id, record offset relative to the body start)
    pub road_offsets: Vec<(i64, usize)>,
}

impl EncodedRoutingSection {
    pub fn road_offset(&self, id: i64) -> Option<usize> {
        self.road_offsets
            .iter()
            .find(|(road_id, _)| *road_id == id)
            .map(|(_, offset)| *offset)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingSectionBuilder {
    name: String,
    rules: Vec<(String, String)>,
    boxes: Vec<BoxDef>,
    basemap_boxes: Vec<BoxDef>,
    border_lines: Vec<BorderLineDef>,
}

struct PendingBlock<'b> {
    shift_pos: usize,
    box_offset: usize,
    area: Area31,
    block: &'b BlockDef,
}

impl PendingBlock<'_> {
    fn shifted(mut self, by: usize) -> Self {
        self.shift_pos += by;
        self.box_offset += by;
        self
    }
}

impl RoutingSectionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append an encoding rule, returning its local id.
    pub fn rule(&mut self, tag: impl Into<String>, value: impl Into<String>) -> u32 {
        self.rules.push((tag.into(), value.into()));
        (self.rules.len() - 1) as u32
    }

    pub fn add_box(&mut self, b: BoxDef) -> &mut Self {
        self.boxes.push(b);
        self
    }

    pub fn add_basemap_box(&mut self, b: BoxDef) -> &mut Self {
        self.basemap_boxes.push(b);
        self
    }

    pub fn add_border_line(&mut self, line: BorderLineDef) -> &mut Self {
        self.border_lines.push(line);
        self
    }

    pub fn encode(&self) -> EncodedRoutingSection {
        let mut w = WireWriter::new();
        w.write_string(routing::NAME, &self.name);
        for (id, (tag, value)) in self.rules.iter().enumerate() {
            w.write_message(routing::RULES, |r| {
                r.write_string(rule::TAG, tag);
                r.write_string(rule::VALUE, value);
                r.write_uint(rule::ID, id as u64);
            });
        }

        let mut pending = Vec::new();
        for (field, boxes) in [
            (routing::ROOT_BOXES, &self.boxes),
            (routing::BASEMAP_BOXES, &self.basemap_boxes),
        ] {
            for b in boxes {
                let (body, blocks) = encode_box(b, None);
                let start = w.write_be_block(field, &body);
                pending.extend(blocks.into_iter().map(|p| p.shifted(start)));
            }
        }

        if !self.border_lines.is_empty() {
            let body = encode_border_box(&self.border_lines);
            w.write_be_block(routing::BORDER_BOX, &body);
        }

        let mut road_offsets = Vec::new();
        for p in pending {
            w.write_tag(routing::BLOCKS, WireType::LengthDelimited);
            let block_pos = w.position();
            let (body, offsets) = encode_block(p.block, &p.area);
            w.write_length_prefixed(&body);
            let body_start = w.position() - body.len();
            road_offsets.extend(offsets.into_iter().map(|(id, off)| (id, body_start + off)));
            w.patch_be_u32(p.shift_pos, (block_pos - p.box_offset) as u32);
        }

        EncodedRoutingSection {
            body: w.into_bytes(),
            road_offsets,
        }
    }
}

fn edge_delta(value: u32, base: u32) -> i32 {
    (i64::from(value) - i64::from(base)) as i32
}

fn encode_box<'b>(b: &'b BoxDef, parent: Option<&Area31>) -> (Vec<u8>, Vec<PendingBlock<'b>>) {
    let base = parent.copied().unwrap_or_default();
    let mut w = WireWriter::new();
    let mut pending = Vec::new();

    w.write_sint32(data_box::LEFT, edge_delta(b.area.left, base.left));
    w.write_sint32(data_box::RIGHT, edge_delta(b.area.right, base.right));
    w.write_sint32(data_box::TOP, edge_delta(b.area.top, base.top));
    w.write_sint32(data_box::BOTTOM, edge_delta(b.area.bottom, base.bottom));

    if let Some(block) = &b.block {
        w.write_tag(data_box::SHIFT_TO_DATA, WireType::Fixed32);
        let at = w.reserve_be_u32();
        pending.push(PendingBlock {
            shift_pos: at,
            box_offset: 0,
            area: b.area,
            block,
        });
    }

    for child in &b.children {
        let (body, blocks) = encode_box(child, Some(&b.area));
        let start = w.write_be_block(data_box::BOXES, &body);
        pending.extend(blocks.into_iter().map(|p| p.shifted(start)));
    }

    (w.into_bytes(), pending)
}

/// Block body and each record's offset inside it.
fn encode_block(block: &BlockDef, area: &Area31) -> (Vec<u8>, Vec<(i64, usize)>) {
    let ids = block.id_table.clone().unwrap_or_else(|| {
        let mut ids: Vec<i64> = block.roads.iter().map(|r| r.id).collect();
        for r in &block.roads {
            for (to, _) in &r.restrictions {
                if !ids.contains(to) {
                    ids.push(*to);
                }
            }
        }
        ids
    });

    let mut w = WireWriter::new();
    w.write_message(block::ID_TABLE, |t| {
        let mut prev = 0i64;
        for id in &ids {
            t.write_sint64(id_table::ROUTE_ID, id.wrapping_sub(prev));
            prev = *id;
        }
    });

    let mut strings: Vec<String> = Vec::new();
    let mut offsets = Vec::new();
    for (internal_id, r) in block.roads.iter().enumerate() {
        w.write_tag(block::DATA_OBJECTS, WireType::LengthDelimited);
        offsets.push((r.id, w.position()));
        let body = encode_road(r, internal_id as u32, area, &mut strings);
        w.write_length_prefixed(&body);
    }

    for (from, r) in block.roads.iter().enumerate() {
        for (to, kind) in &r.restrictions {
            let to_index = ids.iter().position(|id| id == to).unwrap_or_default();
            w.write_message(block::RESTRICTIONS, |m| {
                m.write_uint(restriction::TYPE, u64::from(kind.to_raw()));
                m.write_uint(restriction::FROM, from as u64);
                m.write_uint(restriction::TO, to_index as u64);
            });
        }
    }

    if !strings.is_empty() {
        w.write_tag(block::STRING_TABLE, WireType::LengthDelimited);
        w.write_string_table(&strings);
    }
    (w.into_bytes(), offsets)
}

fn encode_road(r: &RoadDef, internal_id: u32, area: &Area31, strings: &mut Vec<String>) -> Vec<u8> {
    let mut w = WireWriter::new();

    let mut points = WireWriter::new();
    let mut px = i64::from(area.left >> SHIFT_COORDINATES);
    let mut py = i64::from(area.top >> SHIFT_COORDINATES);
    for p in &r.points {
        let x = i64::from(p.x >> SHIFT_COORDINATES);
        let y = i64::from(p.y >> SHIFT_COORDINATES);
        points.write_raw_varint(u64::from(encode_zigzag32((x - px) as i32)));
        points.write_raw_varint(u64::from(encode_zigzag32((y - py) as i32)));
        px = x;
        py = y;
    }
    w.write_bytes(road::POINTS, points.as_slice());
    w.write_packed_u32s(road::TYPES, &r.types);
    if !r.extra_types.is_empty() {
        w.write_packed_u32s(road::EXTRA_TYPES, &r.extra_types);
    }

    if !r.point_types.is_empty() {
        let mut inner = WireWriter::new();
        for (index, types) in &r.point_types {
            inner.write_raw_varint(u64::from(*index));
            let mut packed = WireWriter::new();
            for t in types {
                packed.write_raw_varint(u64::from(*t));
            }
            inner.write_length_prefixed(packed.as_slice());
        }
        w.write_bytes(road::POINT_TYPES, inner.as_slice());
    }

    w.write_uint(road::ROUTE_ID, u64::from(internal_id));

    if !r.point_names.is_empty() {
        let mut inner = WireWriter::new();
        for (index, names) in &r.point_names {
            for (tag, name) in names {
                inner.write_raw_varint(u64::from(*index));
                inner.write_raw_varint(u64::from(*tag));
                inner.write_raw_varint(intern(strings, name) as u64);
            }
        }
        w.write_bytes(road::POINT_NAMES, inner.as_slice());
    }

    if !r.names.is_empty() {
        let mut inner = WireWriter::new();
        for (tag, name) in &r.names {
            inner.write_raw_varint(u64::from(*tag));
            inner.write_raw_varint(intern(strings, name) as u64);
        }
        w.write_bytes(road::STRING_NAMES, inner.as_slice());
    }
    w.into_bytes()
}

/// Index of `name` in the block string table, appending it when new.
fn intern(strings: &mut Vec<String>, name: &str) -> usize {
    match strings.iter().position(|s| s == name) {
        Some(i) => i,
        None => {
            strings.push(name.to_string());
            strings.len() - 1
        }
    }
}

fn encode_border_box(lines: &[BorderLineDef]) -> Vec<u8> {
    let mut w = WireWriter::new();
    let mut patches = Vec::with_capacity(lines.len());

    for line in lines {
        w.write_tag(border::LINES, WireType::LengthDelimited);
        let line_pos = w.position();
        let mut header = WireWriter::new();
        header.write_uint(border::LINE_X, u64::from(line.x));
        header.write_uint(border::LINE_Y, u64::from(line.y));
        if let Some(to_x) = line.to_x {
            header.write_uint(border::LINE_TO_X, u64::from(to_x));
        }
        if let Some(to_y) = line.to_y {
            header.write_uint(border::LINE_TO_Y, u64::from(to_y));
        }
        header.write_tag(border::LINE_SHIFT_TO_POINTS, WireType::Fixed32);
        let at = header.reserve_be_u32();
        w.write_length_prefixed(header.as_slice());
        let header_start = w.position() - header.position();
        patches.push((header_start + at, line_pos));
    }
    // end of line headers
    w.write_tag(border::BLOCKS, WireType::LengthDelimited);

    for (line, (patch_at, line_pos)) in lines.iter().zip(patches) {
        let block_pos = w.position();
        let mut points = WireWriter::new();
        let (mut x, mut y, mut id) = match line.points.first() {
            Some(first) => (first.location.x, first.location.y, first.road_id),
            None => (line.x, line.y, 0),
        };
        points.write_uint(border::BLOCK_X, u64::from(x));
        points.write_uint(border::BLOCK_Y, u64::from(y));
        points.write_uint(border::BLOCK_BASE_ID, id as u64);
        for p in &line.points {
            points.write_message(border::BLOCK_POINTS, |m| {
                m.write_sint32(border::POINT_DX, edge_delta(p.location.x, x));
                m.write_sint32(border::POINT_DY, edge_delta(p.location.y, y));
                m.write_uint(border::POINT_ROAD_ID, p.road_id.wrapping_sub(id) as u64);
                m.write_bool(border::POINT_DIRECTION, p.direction);
                m.write_packed_u32s(border::POINT_TYPES, &p.types);
            });
            x = p.location.x;
            y = p.location.y;
            id = p.road_id;
        }
        w.write_length_prefixed(points.as_slice());
        w.patch_be_u32(patch_at, (block_pos - line_pos) as u32);
    }
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_ids_are_positions() {
        let mut builder = RoutingSectionBuilder::new("test");
        assert_eq!(builder.rule("highway", "primary"), 0);
        assert_eq!(builder.rule("oneway", "yes"), 1);
    }

    #[test]
    fn test_road_offsets_point_into_body() {
        let mut builder = RoutingSectionBuilder::new("test");
        let primary = builder.rule("highway", "primary");
        builder.add_box(BoxDef::new(Area31::new(0, 0, 4096, 4096)).with_roads(vec![
            RoadDef::new(11, vec![Point31::new(32, 32), Point31::new(64, 64)], vec![primary]),
            RoadDef::new(12, vec![Point31::new(96, 32)], vec![primary]),
        ]));
        let encoded = builder.encode();
        let first = encoded.road_offset(11).unwrap();
        let second = encoded.road_offset(12).unwrap();
        assert!(first < second);
        assert!(second < encoded.body.len());
        assert!(encoded.road_offset(13).is_none());
    }
}
