//! OBF container decoding: wire cursor, section catalog and routing sections

pub mod catalog;
pub mod fields;
pub mod routing;
pub mod wire;
pub mod writer;

pub use catalog::{read_catalog, ObfContainer, ObfInfo, ObfSection, SectionKind};
pub use routing::{
    read_routing_sections, BorderLinePoint, EncodingRule, EncodingRuleTable, RestrictionKind,
    Road, RoadDirection, RoutingSection, RoutingSectionBuilder, RoutingSectionReader,
    RoutingSubsection, RuleKind, RuleValue, SectionId,
};
pub use wire::{Cursor, Tag, WireType};
pub use writer::{ContainerWriter, WireWriter};
