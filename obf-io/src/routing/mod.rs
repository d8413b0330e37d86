//! Routing section model and reader

pub mod border;
pub mod builder;
pub mod reader;
pub mod road;
pub mod rules;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use obf_common::Area31;

pub use border::{BorderLineHeader, BorderLinePoint};
pub use builder::{
    BlockDef, BorderLineDef, BorderPointDef, BoxDef, EncodedRoutingSection, RoadDef,
    RoutingSectionBuilder,
};
pub use reader::{read_routing_sections, RoutingSectionReader};
pub use road::{
    Points, RestrictionKind, Road, RoadDirection, DEFAULT_DIRECTION_SMOOTHING_M,
};
pub use rules::{EncodingRule, EncodingRuleTable, RuleKind, RuleValue};

/// Identity of a decoded routing section; roads refer back to it by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(pub u64);

impl SectionId {
    /// A fresh process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SectionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Absolute byte range inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: usize,
    pub length: usize,
}

/// A node of the section's box tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingSubsection {
    pub area: Area31,
    /// First byte of the box body.
    pub offset: usize,
    pub length: usize,
    /// Offset of the data block relative to `offset`, 0 when the box has none.
    pub data_offset: u32,
    pub children: Vec<RoutingSubsection>,
}

impl RoutingSubsection {
    pub fn data_position(&self) -> Option<usize> {
        (self.data_offset != 0).then(|| self.offset + self.data_offset as usize)
    }

    /// Depth-first walk over this box and its descendants.
    pub fn walk<'s>(&'s self, visit: &mut impl FnMut(&'s RoutingSubsection)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutingSection {
    pub id: SectionId,
    pub name: String,
    pub offset: usize,
    pub length: usize,
    pub rules: Arc<EncodingRuleTable>,
    pub subsections: Vec<RoutingSubsection>,
    pub basemap_subsections: Vec<RoutingSubsection>,
    pub border_box: Option<Region>,
    pub base_border_box: Option<Region>,
}

impl RoutingSection {
    /// Boxes that carry a data block, detailed then basemap.
    pub fn data_subsections(&self) -> Vec<&RoutingSubsection> {
        let mut out = Vec::new();
        for root in self.subsections.iter().chain(&self.basemap_subsections) {
            root.walk(&mut |sub| {
                if sub.data_offset != 0 {
                    out.push(sub);
                }
            });
        }
        out
    }
}
