//! Field numbers of the OBF messages this crate decodes

/// `OsmAndStructure`, the top-level index.
pub mod structure {
    pub const VERSION: u32 = 1;
    pub const TRANSPORT_INDEX: u32 = 4;
    pub const MAP_INDEX: u32 = 6;
    pub const ADDRESS_INDEX: u32 = 7;
    pub const POI_INDEX: u32 = 8;
    pub const ROUTING_INDEX: u32 = 9;
    pub const DATE_CREATED: u32 = 18;
    pub const VERSION_CONFIRM: u32 = 32;
}

/// Name field of each section kind.
pub mod section_name {
    pub const MAP: u32 = 2;
    pub const DEFAULT: u32 = 1;
}

/// `OsmAndRoutingIndex`
pub mod routing {
    pub const NAME: u32 = 1;
    pub const RULES: u32 = 2;
    pub const ROOT_BOXES: u32 = 3;
    pub const BASEMAP_BOXES: u32 = 4;
    pub const BLOCKS: u32 = 5;
    pub const BORDER_BOX: u32 = 7;
    pub const BASE_BORDER_BOX: u32 = 8;
}

/// `RouteEncodingRule`
pub mod rule {
    pub const TAG: u32 = 3;
    pub const VALUE: u32 = 5;
    pub const ID: u32 = 7;
}

/// `RouteDataBox`
pub mod data_box {
    pub const LEFT: u32 = 1;
    pub const RIGHT: u32 = 2;
    pub const TOP: u32 = 3;
    pub const BOTTOM: u32 = 4;
    pub const SHIFT_TO_DATA: u32 = 5;
    pub const BOXES: u32 = 7;
}

/// `RouteDataBlock`
pub mod block {
    pub const ID_TABLE: u32 = 5;
    pub const DATA_OBJECTS: u32 = 6;
    pub const RESTRICTIONS: u32 = 7;
    pub const STRING_TABLE: u32 = 8;
}

/// `IdTable`
pub mod id_table {
    pub const ROUTE_ID: u32 = 1;
}

/// `RestrictionData`
pub mod restriction {
    pub const TYPE: u32 = 1;
    pub const FROM: u32 = 2;
    pub const TO: u32 = 3;
}

/// `RouteData`
pub mod road {
    pub const POINTS: u32 = 1;
    pub const POINT_TYPES: u32 = 4;
    pub const POINT_NAMES: u32 = 5;
    pub const TYPES: u32 = 7;
    pub const EXTRA_TYPES: u32 = 9;
    pub const ROUTE_ID: u32 = 12;
    pub const STRING_NAMES: u32 = 14;
}

/// `RouteBorderBox`, `RouteBorderLine`, `RouteBorderPointsBlock`, `RouteBorderPoint`
pub mod border {
    pub const LINES: u32 = 1;
    pub const BLOCKS: u32 = 5;

    pub const LINE_X: u32 = 1;
    pub const LINE_Y: u32 = 2;
    pub const LINE_TO_X: u32 = 3;
    pub const LINE_TO_Y: u32 = 4;
    pub const LINE_SHIFT_TO_POINTS: u32 = 7;

    pub const BLOCK_X: u32 = 1;
    pub const BLOCK_Y: u32 = 2;
    pub const BLOCK_BASE_ID: u32 = 3;
    pub const BLOCK_POINTS: u32 = 5;

    pub const POINT_DX: u32 = 1;
    pub const POINT_DY: u32 = 2;
    pub const POINT_ROAD_ID: u32 = 3;
    pub const POINT_DIRECTION: u32 = 4;
    pub const POINT_TYPES: u32 = 7;
}

/// Road points are stored on a grid coarser than 31 bits by this shift.
pub const SHIFT_COORDINATES: u32 = 5;
