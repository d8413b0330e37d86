//! Road records
//!
//! A [`Road`] is immutable once decoded and cheap to clone: every collection
//! sits behind an `Arc`. Inserting an intermediate point produces a new road
//! whose point sequence shares the untouched runs of the original.

use std::collections::BTreeMap;
use std::sync::Arc;

use obf_common::Point31;

use super::rules::{EncodingRuleTable, RuleKind};
use super::SectionId;

/// Distance covered when estimating a road's bearing at a point, in metres.
pub const DEFAULT_DIRECTION_SMOOTHING_M: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoadDirection {
    Forward,
    TwoWay,
    Reverse,
}

impl RoadDirection {
    /// Sign convention of `oneway`: positive forward, negative reverse.
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            RoadDirection::Forward
        } else if value < 0.0 {
            RoadDirection::Reverse
        } else {
            RoadDirection::TwoWay
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestrictionKind {
    NoRightTurn,
    NoLeftTurn,
    NoUTurn,
    NoStraightOn,
    OnlyRightTurn,
    OnlyLeftTurn,
    OnlyStraightOn,
    Other(u32),
}

impl RestrictionKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => RestrictionKind::NoRightTurn,
            2 => RestrictionKind::NoLeftTurn,
            3 => RestrictionKind::NoUTurn,
            4 => RestrictionKind::NoStraightOn,
            5 => RestrictionKind::OnlyRightTurn,
            6 => RestrictionKind::OnlyLeftTurn,
            7 => RestrictionKind::OnlyStraightOn,
            other => RestrictionKind::Other(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            RestrictionKind::NoRightTurn => 1,
            RestrictionKind::NoLeftTurn => 2,
            RestrictionKind::NoUTurn => 3,
            RestrictionKind::NoStraightOn => 4,
            RestrictionKind::OnlyRightTurn => 5,
            RestrictionKind::OnlyLeftTurn => 6,
            RestrictionKind::OnlyStraightOn => 7,
            RestrictionKind::Other(raw) => raw,
        }
    }

    pub fn is_only(self) -> bool {
        matches!(
            self,
            RestrictionKind::OnlyRightTurn
                | RestrictionKind::OnlyLeftTurn
                | RestrictionKind::OnlyStraightOn
        )
    }
}

#[derive(Debug, Clone)]
enum PointRun {
    Shared {
        points: Arc<[Point31]>,
        start: usize,
        end: usize,
    },
    Inserted(Point31),
}

impl PointRun {
    fn len(&self) -> usize {
        match self {
            PointRun::Shared { start, end, .. } => end - start,
            PointRun::Inserted(_) => 1,
        }
    }

    fn get(&self, i: usize) -> Option<Point31> {
        match self {
            PointRun::Shared { points, start, end } => {
                (start + i < *end).then(|| points[start + i])
            }
            PointRun::Inserted(p) => (i == 0).then_some(*p),
        }
    }
}

/// Point sequence made of shared slices and inserted points.
#[derive(Debug, Clone, Default)]
pub struct Points {
    runs: Vec<PointRun>,
    len: usize,
}

impl Points {
    pub fn from_vec(points: Vec<Point31>) -> Self {
        let len = points.len();
        if len == 0 {
            return Self::default();
        }
        Self {
            runs: vec![PointRun::Shared {
                points: points.into(),
                start: 0,
                end: len,
            }],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, mut index: usize) -> Option<Point31> {
        for run in &self.runs {
            let n = run.len();
            if index < n {
                return run.get(index);
            }
            index -= n;
        }
        None
    }

    pub fn first(&self) -> Option<Point31> {
        self.get(0)
    }

    pub fn last(&self) -> Option<Point31> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = Point31> + '_ {
        self.runs
            .iter()
            .flat_map(|run| (0..run.len()).filter_map(move |i| run.get(i)))
    }

    pub fn to_vec(&self) -> Vec<Point31> {
        self.iter().collect()
    }

    /// True when both sequences reference the same backing storage.
    pub fn shares_storage_with(&self, other: &Points) -> bool {
        self.runs.iter().any(|a| match a {
            PointRun::Shared { points: pa, .. } => other.runs.iter().any(|b| match b {
                PointRun::Shared { points: pb, .. } => Arc::ptr_eq(pa, pb),
                PointRun::Inserted(_) => false,
            }),
            PointRun::Inserted(_) => false,
        })
    }

    /// New sequence with `point` at `index`; `None` past the end.
    pub fn inserted(&self, index: usize, point: Point31) -> Option<Points> {
        if index > self.len {
            return None;
        }
        let mut runs = Vec::with_capacity(self.runs.len() + 2);
        let mut offset = 0;
        let mut placed = false;
        for run in &self.runs {
            let n = run.len();
            if !placed && index < offset + n {
                match run {
                    PointRun::Shared { points, start, end } => {
                        let split = start + (index - offset);
                        if split > *start {
                            runs.push(PointRun::Shared {
                                points: Arc::clone(points),
                                start: *start,
                                end: split,
                            });
                        }
                        runs.push(PointRun::Inserted(point));
                        runs.push(PointRun::Shared {
                            points: Arc::clone(points),
                            start: split,
                            end: *end,
                        });
                    }
                    PointRun::Inserted(_) => {
                        runs.push(PointRun::Inserted(point));
                        runs.push(run.clone());
                    }
                }
                placed = true;
            } else {
                runs.push(run.clone());
            }
            offset += n;
        }
        if !placed {
            runs.push(PointRun::Inserted(point));
        }
        Some(Points {
            runs,
            len: self.len + 1,
        })
    }
}

impl PartialEq for Points {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Road {
    id: i64,
    section: SectionId,
    points: Points,
    types: Arc<[u32]>,
    extra_types: Arc<[u32]>,
    point_types: Arc<BTreeMap<u32, Vec<u32>>>,
    restrictions: Arc<BTreeMap<i64, RestrictionKind>>,
    names: Arc<BTreeMap<u32, String>>,
    point_names: Arc<BTreeMap<u32, Vec<(u32, String)>>>,
    rules: Option<Arc<EncodingRuleTable>>,
}

impl Road {
    pub fn new(id: i64, section: SectionId, points: Vec<Point31>, types: Vec<u32>) -> Self {
        Self {
            id,
            section,
            points: Points::from_vec(points),
            types: types.into(),
            extra_types: Arc::from(Vec::new()),
            point_types: Arc::default(),
            restrictions: Arc::default(),
            names: Arc::default(),
            point_names: Arc::default(),
            rules: None,
        }
    }

    pub fn with_extra_types(mut self, extra_types: Vec<u32>) -> Self {
        self.extra_types = extra_types.into();
        self
    }

    pub fn with_point_types(mut self, point_types: BTreeMap<u32, Vec<u32>>) -> Self {
        self.point_types = Arc::new(point_types);
        self
    }

    pub fn with_restrictions(mut self, restrictions: BTreeMap<i64, RestrictionKind>) -> Self {
        self.restrictions = Arc::new(restrictions);
        self
    }

    pub fn with_names(mut self, names: BTreeMap<u32, String>) -> Self {
        self.names = Arc::new(names);
        self
    }

    /// Names attached to single points, as (tag local id, name) pairs.
    pub fn with_point_names(mut self, point_names: BTreeMap<u32, Vec<(u32, String)>>) -> Self {
        self.point_names = Arc::new(point_names);
        self
    }

    /// Rule table of the section this road was decoded from.
    pub fn with_rules(mut self, rules: Arc<EncodingRuleTable>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn section(&self) -> SectionId {
        self.section
    }

    pub fn points(&self) -> &Points {
        &self.points
    }

    /// Local rule ids of the whole road.
    pub fn types(&self) -> &[u32] {
        &self.types
    }

    pub fn extra_types(&self) -> &[u32] {
        &self.extra_types
    }

    /// Local rule ids attached to one point, empty when none.
    pub fn point_types(&self, index: u32) -> &[u32] {
        self.point_types
            .get(&index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_point_types(&self) -> &BTreeMap<u32, Vec<u32>> {
        &self.point_types
    }

    /// Turn restrictions keyed by the connected road id.
    pub fn restrictions(&self) -> &BTreeMap<i64, RestrictionKind> {
        &self.restrictions
    }

    /// Names keyed by the local rule id of their tag.
    pub fn names(&self) -> &BTreeMap<u32, String> {
        &self.names
    }

    /// Names of one point, empty when none.
    pub fn point_names(&self, index: u32) -> &[(u32, String)] {
        self.point_names
            .get(&index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The owning section's rule table, when the road was decoded from one.
    pub fn rules(&self) -> Option<&Arc<EncodingRuleTable>> {
        self.rules.as_ref()
    }

    pub fn is_loop(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => self.points.len() > 1 && first == last,
            _ => false,
        }
    }

    /// Direction encoded by the road's own `oneway` rule.
    pub fn oneway(&self, table: &EncodingRuleTable) -> RoadDirection {
        table
            .first_of_kind(&self.types, RuleKind::OneWay)
            .and_then(|rule| rule.int_value())
            .map(|v| RoadDirection::from_sign(f64::from(v)))
            .unwrap_or(RoadDirection::TwoWay)
    }

    /// A roundabout rule, or a closed one-way ring.
    pub fn is_roundabout(&self, table: &EncodingRuleTable) -> bool {
        if table.has_kind(&self.types, RuleKind::Roundabout) {
            return true;
        }
        self.oneway(table) != RoadDirection::TwoWay && self.is_loop()
    }

    pub fn lanes(&self, table: &EncodingRuleTable) -> Option<i32> {
        table
            .first_of_kind(&self.types, RuleKind::Lanes)
            .and_then(|rule| rule.int_value())
            .filter(|lanes| *lanes >= 0)
    }

    pub fn highway<'t>(&self, table: &'t EncodingRuleTable) -> Option<&'t str> {
        table
            .first_of_kind(&self.types, RuleKind::Highway)
            .map(|rule| rule.value.as_str())
    }

    /// Posted speed limit in m/s.
    pub fn max_speed(&self, table: &EncodingRuleTable) -> Option<f32> {
        table
            .first_of_kind(&self.types, RuleKind::MaxSpeed)
            .and_then(|rule| rule.float_value())
            .filter(|speed| *speed > 0.0)
    }

    pub fn direction_delta(&self, origin: usize, forward: bool) -> Option<f64> {
        self.direction_delta_within(origin, forward, DEFAULT_DIRECTION_SMOOTHING_M)
    }

    /// Bearing of the road at `origin`, in radians.
    ///
    /// Walks forward or backward until `distance` metres are covered or the
    /// road ends.
    pub fn direction_delta_within(&self, origin: usize, forward: bool, distance: f64) -> Option<f64> {
        let origin_point = self.points.get(origin)?;
        let mut index = origin;
        let mut scanned = 0.0;
        loop {
            if forward {
                if index + 1 >= self.points.len() {
                    break;
                }
                index += 1;
            } else {
                if index == 0 {
                    break;
                }
                index -= 1;
            }
            let point = self.points.get(index)?;
            scanned += origin_point.manhattan_meters(&point);
            if scanned >= distance {
                break;
            }
        }
        let point = self.points.get(index)?;
        let dx = origin_point.x as f64 - point.x as f64;
        let dy = origin_point.y as f64 - point.y as f64;
        Some(-dx.atan2(dy))
    }

    /// Copy of this road with `point` inserted before `index`.
    ///
    /// Point-type and point-name indices at or after `index` move up by one.
    pub fn with_inserted_point(&self, index: usize, point: Point31) -> Option<Road> {
        let points = self.points.inserted(index, point)?;
        let shift = |idx: u32| if idx as usize >= index { idx + 1 } else { idx };
        let point_types = self
            .point_types
            .iter()
            .map(|(idx, types)| (shift(*idx), types.clone()))
            .collect();
        let point_names = self
            .point_names
            .iter()
            .map(|(idx, names)| (shift(*idx), names.clone()))
            .collect();
        Some(Road {
            points,
            point_types: Arc::new(point_types),
            point_names: Arc::new(point_names),
            ..self.clone()
        })
    }
}
