//! Border lines: points where a routing section's tiles meet its neighbours

use obf_common::{Area31, DecodeError, DecodeResult, Point31, Result};

use super::reader::RoutingSectionReader;
use super::{Region, RoutingSection, SectionId};
use crate::fields::border;
use crate::wire::Cursor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderLineHeader {
    pub x: u32,
    pub y: u32,
    pub to_x: Option<u32>,
    pub to_y: Option<u32>,
    /// Absolute offset of the line's points block.
    pub points_offset: usize,
}

impl BorderLineHeader {
    /// Horizontal lines are the only ones matched against a query area.
    fn accepts(&self, area: &Area31) -> bool {
        match self.to_x {
            Some(to_x) => area.intersects(&Area31::new(
                self.x.min(to_x),
                self.y,
                self.x.max(to_x),
                self.y,
            )),
            None => false,
        }
    }
}

/// A border point with its own local types, queried without a full road.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderLinePoint {
    pub section: SectionId,
    pub road_id: i64,
    pub location: Point31,
    pub direction: bool,
    pub types: Vec<u32>,
}

impl<'a> RoutingSectionReader<'a> {
    /// Points of every border line of the detailed border box.
    pub fn read_border_points(
        &self,
        section: &RoutingSection,
        area: Option<&Area31>,
    ) -> Result<Vec<BorderLinePoint>> {
        let Some(region) = section.border_box else {
            return Ok(Vec::new());
        };
        self.decode_border_points(section, region, area)
            .map_err(|e| obf_common::ObfError::corrupt_section(&section.name, section.offset, e))
    }

    fn decode_border_points(
        &self,
        section: &RoutingSection,
        region: Region,
        area: Option<&Area31>,
    ) -> DecodeResult<Vec<BorderLinePoint>> {
        let mut c = Cursor::at(self.data_slice(), section.offset)?;
        let section_limit = c.push_limit(section.length)?;
        c.seek(region.offset)?;
        let box_limit = c.push_limit(region.length)?;
        let lines = read_line_headers(&mut c)?;
        c.pop_limit(box_limit);

        let mut offsets: Vec<usize> = lines
            .iter()
            .filter(|line| area.map_or(true, |a| line.accepts(a)))
            .map(|line| line.points_offset)
            .collect();
        offsets.sort_unstable();

        let mut points = Vec::new();
        for offset in offsets {
            c.seek(offset)?;
            let token = c.push_varint_limit()?;
            read_points_block(&mut c, section.id, area, &mut points)?;
            c.pop_limit(token);
        }
        c.pop_limit(section_limit);
        Ok(points)
    }
}

fn read_line_headers(c: &mut Cursor<'_>) -> DecodeResult<Vec<BorderLineHeader>> {
    let mut lines = Vec::new();
    loop {
        let tag = c.read_tag()?;
        match tag.field {
            0 | border::BLOCKS => return Ok(lines),
            border::LINES => {
                let line_offset = c.position();
                let token = c.push_varint_limit()?;
                lines.push(read_line_header(c, line_offset)?);
                c.pop_limit(token);
            }
            _ => c.skip_unknown_field(tag)?,
        }
    }
}

fn read_line_header(c: &mut Cursor<'_>, line_offset: usize) -> DecodeResult<BorderLineHeader> {
    let mut line = BorderLineHeader {
        x: 0,
        y: 0,
        to_x: None,
        to_y: None,
        points_offset: 0,
    };
    loop {
        let tag = c.read_tag()?;
        match tag.field {
            0 => return Ok(line),
            border::LINE_X => line.x = c.read_varint32()?,
            border::LINE_Y => line.y = c.read_varint32()?,
            border::LINE_TO_X => line.to_x = Some(c.read_varint32()?),
            border::LINE_TO_Y => line.to_y = Some(c.read_varint32()?),
            border::LINE_SHIFT_TO_POINTS => {
                line.points_offset = line_offset + c.read_fixed_be_u32()? as usize;
            }
            _ => c.skip_unknown_field(tag)?,
        }
    }
}

fn border_location(x: i64, y: i64) -> DecodeResult<Point31> {
    let coord = |v: i64| {
        u32::try_from(v)
            .map_err(|_| DecodeError::InvalidReference(format!("border point coordinate {v} out of range")))
    };
    Ok(Point31::new(coord(x)?, coord(y)?))
}

fn read_points_block(
    c: &mut Cursor<'_>,
    section: SectionId,
    area: Option<&Area31>,
    out: &mut Vec<BorderLinePoint>,
) -> DecodeResult<()> {
    let mut x = 0i64;
    let mut y = 0i64;
    let mut id = 0i64;
    loop {
        let tag = c.read_tag()?;
        match tag.field {
            0 => return Ok(()),
            border::BLOCK_X => x = i64::from(c.read_varint32()?),
            border::BLOCK_Y => y = i64::from(c.read_varint32()?),
            border::BLOCK_BASE_ID => id = c.read_varint64()? as i64,
            border::BLOCK_POINTS => {
                let token = c.push_varint_limit()?;
                let mut dx = 0i64;
                let mut dy = 0i64;
                let mut did = 0i64;
                let mut direction = false;
                let mut types = Vec::new();
                loop {
                    let tag = c.read_tag()?;
                    match tag.field {
                        0 => break,
                        border::POINT_DX => dx = i64::from(c.read_sint32()?),
                        border::POINT_DY => dy = i64::from(c.read_sint32()?),
                        border::POINT_ROAD_ID => did = c.read_varint64()? as i64,
                        border::POINT_DIRECTION => direction = c.read_bool()?,
                        border::POINT_TYPES => types = c.read_packed_u32s()?,
                        _ => c.skip_unknown_field(tag)?,
                    }
                }
                c.pop_limit(token);

                x += dx;
                y += dy;
                id = id.wrapping_add(did);
                let location = border_location(x, y)?;
                if area.map_or(true, |a| a.contains(&location)) {
                    out.push(BorderLinePoint {
                        section,
                        road_id: id,
                        location,
                        direction,
                        types,
                    });
                }
            }
            _ => c.skip_unknown_field(tag)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WireWriter;

    fn points_block(start: (u32, u32), deltas: &[(i32, i32)]) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.write_uint(border::BLOCK_X, u64::from(start.0));
        w.write_uint(border::BLOCK_Y, u64::from(start.1));
        w.write_uint(border::BLOCK_BASE_ID, 40);
        for (dx, dy) in deltas {
            w.write_message(border::BLOCK_POINTS, |m| {
                m.write_sint32(border::POINT_DX, *dx);
                m.write_sint32(border::POINT_DY, *dy);
                m.write_uint(border::POINT_ROAD_ID, 1);
            });
        }
        w.into_bytes()
    }

    #[test]
    fn test_points_accumulate_deltas() {
        let bytes = points_block((100, 200), &[(0, 0), (50, -20)]);
        let mut out = Vec::new();
        read_points_block(&mut Cursor::new(&bytes), SectionId(1), None, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].location, Point31::new(150, 180));
        assert_eq!(out[1].road_id, 42);
    }

    #[test]
    fn test_negative_coordinate_is_rejected() {
        let bytes = points_block((10, 10), &[(-20, 0)]);
        let mut out = Vec::new();
        let err = read_points_block(&mut Cursor::new(&bytes), SectionId(1), None, &mut out).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidReference(_)));
        assert!(out.is_empty());
    }
}
