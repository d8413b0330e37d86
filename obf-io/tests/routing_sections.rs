use std::io::Write;
use std::sync::atomic::AtomicBool;

use obf_common::{Area31, DecodeError, ObfError, Point31};
use obf_io::fields::routing;
use obf_io::routing::{BorderLineDef, BorderPointDef, BoxDef, RoadDef};
use obf_io::{
    read_routing_sections, ContainerWriter, ObfContainer, RestrictionKind, RoutingSectionBuilder,
    RoutingSectionReader, RuleKind, SectionKind, WireType, WireWriter,
};
use proptest::prelude::*;

const VERSION: u32 = 2;

fn p(x: u32, y: u32) -> Point31 {
    Point31::new(x, y)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("obf_io=debug")
        .with_test_writer()
        .try_init();
}

/// Container with one routing section; returns it with the section body offset.
fn single_section(builder: &RoutingSectionBuilder) -> (ObfContainer, Vec<(i64, usize)>) {
    let encoded = builder.encode();
    let mut writer = ContainerWriter::new(VERSION);
    writer.add_section(SectionKind::Routing, encoded.body);
    let container = ObfContainer::from_bytes(writer.finish()).unwrap();
    let base = container.routing_sections().next().unwrap().offset;
    let offsets = encoded
        .road_offsets
        .iter()
        .map(|(id, off)| (*id, base + off))
        .collect();
    (container, offsets)
}

fn town_builder() -> RoutingSectionBuilder {
    let mut b = RoutingSectionBuilder::new("town");
    let primary = b.rule("highway", "primary");
    let oneway = b.rule("oneway", "yes");
    let name = b.rule("name", "");
    let signals = b.rule("highway", "traffic_signals");

    let mut main = RoadDef::new(
        1_000_123,
        vec![p(4096, 4096), p(4096 + 320, 4096), p(4096 + 640, 4096 + 64)],
        vec![primary],
    );
    main.names = vec![(name, "Main Street".into())];
    main.point_types.insert(1, vec![signals]);
    main.restrictions = vec![(1_000_050, RestrictionKind::NoLeftTurn)];

    let mut side = RoadDef::new(
        1_000_050,
        vec![p(4096 + 320, 4096), p(4096 + 320, 4096 + 320)],
        vec![primary, oneway],
    );
    side.names = vec![(name, "Main Street".into())];

    let far = RoadDef::new(77, vec![p(70_016, 70_016), p(70_048, 70_080)], vec![primary]);

    let mut bridge = RoadDef::new(
        5_000_000_017,
        vec![p(70_048, 70_080), p(70_080, 70_080), p(70_112, 70_080)],
        vec![primary],
    );
    bridge.point_names.insert(1, vec![(name, "Mill Bridge".into())]);

    b.add_box(
        BoxDef::new(Area31::new(0, 0, 100_000, 100_000))
            .with_child(BoxDef::new(Area31::new(0, 0, 50_000, 50_000)).with_roads(vec![main, side]))
            .with_child(BoxDef::new(Area31::new(60_000, 60_000, 100_000, 100_000)).with_roads(vec![far, bridge])),
    );
    b
}

#[test]
fn test_section_header_and_box_tree() {
    init_tracing();
    let (container, _) = single_section(&town_builder());
    let sections = read_routing_sections(&container);
    assert_eq!(sections.len(), 1);
    let section = sections[0].as_ref().unwrap();

    assert_eq!(section.name, "town");
    assert_eq!(section.rules.len(), 4);
    assert_eq!(section.rules.get(1).unwrap().kind, RuleKind::OneWay);
    assert_eq!(section.rules.get(3).unwrap().kind, RuleKind::TrafficSignals);

    let root = &section.subsections[0];
    assert_eq!(root.area, Area31::new(0, 0, 100_000, 100_000));
    assert_eq!(root.data_offset, 0);
    assert_eq!(root.children.len(), 2);
    assert_eq!(root.children[1].area, Area31::new(60_000, 60_000, 100_000, 100_000));
    assert_eq!(section.data_subsections().len(), 2);
    assert!(section.border_box.is_none());
}

#[test]
fn test_load_block_resolves_tables() {
    let (container, _) = single_section(&town_builder());
    let reader = RoutingSectionReader::for_container(&container);
    let section = reader
        .read_section(container.routing_sections().next().unwrap())
        .unwrap();
    let roads = reader
        .load_block(&section, &section.subsections[0].children[0])
        .unwrap();

    assert_eq!(roads.len(), 2);
    let main = &roads[0];
    assert_eq!(main.id(), 1_000_123);
    assert_eq!(main.section(), section.id);
    assert_eq!(
        main.points().to_vec(),
        vec![p(4096, 4096), p(4096 + 320, 4096), p(4096 + 640, 4096 + 64)]
    );
    assert_eq!(main.point_types(1), &[3]);
    assert!(main.point_types(0).is_empty());
    assert_eq!(main.names().get(&2).map(String::as_str), Some("Main Street"));
    assert_eq!(
        main.restrictions().get(&1_000_050),
        Some(&RestrictionKind::NoLeftTurn)
    );

    let side = &roads[1];
    assert_eq!(side.id(), 1_000_050);
    assert_eq!(side.names().get(&2).map(String::as_str), Some("Main Street"));
    assert_eq!(side.oneway(&section.rules), obf_io::RoadDirection::Forward);
    assert!(side.restrictions().is_empty());
}

#[test]
fn test_read_road_at_offset() {
    let (container, offsets) = single_section(&town_builder());
    let reader = RoutingSectionReader::for_container(&container);
    let section = reader
        .read_section(container.routing_sections().next().unwrap())
        .unwrap();

    let far_offset = offsets.iter().find(|(id, _)| *id == 77).unwrap().1;
    let far = reader.read_road(&section, far_offset).unwrap();
    assert_eq!(far.id(), 77);
    assert_eq!(far.points().to_vec(), vec![p(70_016, 70_016), p(70_048, 70_080)]);
}

#[test]
fn test_wide_road_ids_and_point_names() {
    let (container, offsets) = single_section(&town_builder());
    let reader = RoutingSectionReader::for_container(&container);
    let section = reader
        .read_section(container.routing_sections().next().unwrap())
        .unwrap();

    let roads = reader
        .load_block(&section, &section.subsections[0].children[1])
        .unwrap();
    let bridge = &roads[1];
    assert_eq!(bridge.id(), 5_000_000_017);
    assert_eq!(bridge.point_names(1), &[(2, "Mill Bridge".to_string())]);
    assert!(bridge.point_names(0).is_empty());
    assert!(bridge.names().is_empty());

    let offset = offsets.iter().find(|(id, _)| *id == 5_000_000_017).unwrap().1;
    assert_eq!(reader.read_road(&section, offset).unwrap(), *bridge);
}

#[test]
fn test_short_id_table_is_corrupt() {
    let mut b = RoutingSectionBuilder::new("short");
    let primary = b.rule("highway", "primary");
    b.add_box(
        BoxDef::new(Area31::new(0, 0, 100_000, 100_000))
            .with_roads(vec![
                RoadDef::new(10, vec![p(1024, 1024), p(2048, 1024)], vec![primary]),
                RoadDef::new(11, vec![p(2048, 1024), p(2048, 2048)], vec![primary]),
            ])
            .with_id_table(vec![10]),
    );
    let (container, _) = single_section(&b);
    let reader = RoutingSectionReader::for_container(&container);
    let section = reader
        .read_section(container.routing_sections().next().unwrap())
        .unwrap();

    match reader.load_block(&section, &section.subsections[0]) {
        Err(ObfError::CorruptSection { section, source, .. }) => {
            assert_eq!(section, "short");
            assert!(matches!(source, DecodeError::InvalidReference(_)));
        }
        other => panic!("expected a corrupt section, got {other:?}"),
    }
}

#[test]
fn test_load_roads_filters_by_area() {
    let (container, _) = single_section(&town_builder());
    let reader = RoutingSectionReader::for_container(&container);
    let section = reader
        .read_section(container.routing_sections().next().unwrap())
        .unwrap();

    let near = reader
        .load_roads(&section, &Area31::new(0, 0, 10_000, 10_000), None)
        .unwrap();
    let mut ids: Vec<i64> = near.iter().map(|r| r.id()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1_000_050, 1_000_123]);

    let all = reader.load_roads(&section, &Area31::WORLD, None).unwrap();
    assert_eq!(all.len(), 4);

    let abort = AtomicBool::new(true);
    let aborted = reader
        .load_roads(&section, &Area31::WORLD, Some(&abort))
        .unwrap();
    assert!(aborted.is_empty());
}

#[test]
fn test_border_points() {
    let mut b = RoutingSectionBuilder::new("edge");
    let primary = b.rule("highway", "primary");
    let barrier = b.rule("barrier", "gate");
    b.add_border_line(BorderLineDef {
        x: 1000,
        y: 5000,
        to_x: Some(9000),
        to_y: None,
        points: vec![
            BorderPointDef {
                road_id: 500,
                location: p(2000, 5000),
                direction: true,
                types: vec![primary],
            },
            BorderPointDef {
                road_id: 480,
                location: p(7000, 5000),
                direction: false,
                types: vec![primary, barrier],
            },
        ],
    });
    b.add_border_line(BorderLineDef {
        x: 20_000,
        y: 80_000,
        to_x: Some(30_000),
        to_y: None,
        points: vec![BorderPointDef {
            road_id: 9,
            location: p(25_000, 80_000),
            direction: true,
            types: vec![],
        }],
    });
    let (container, _) = single_section(&b);
    let reader = RoutingSectionReader::for_container(&container);
    let section = reader
        .read_section(container.routing_sections().next().unwrap())
        .unwrap();
    assert!(section.border_box.is_some());

    let all = reader.read_border_points(&section, None).unwrap();
    assert_eq!(all.len(), 3);

    let near = reader
        .read_border_points(&section, Some(&Area31::new(0, 0, 10_000, 10_000)))
        .unwrap();
    assert_eq!(near.len(), 2);
    assert_eq!(near[0].road_id, 500);
    assert_eq!(near[1].road_id, 480);
    assert_eq!(near[1].location, p(7000, 5000));
    assert!(!near[1].direction);
    assert_eq!(near[1].types, vec![primary, barrier]);
    assert_eq!(near[1].section, section.id);
}

/// First section's rules claim 50 bytes while only 30 remain in the body.
fn truncated_rules_section() -> Vec<u8> {
    let mut w = WireWriter::new();
    w.write_string(routing::NAME, "broken");
    w.write_tag(routing::RULES, WireType::LengthDelimited);
    w.write_raw_varint(50);
    w.write_raw(&[0u8; 30]);
    w.into_bytes()
}

#[test]
fn test_corrupt_section_does_not_affect_sibling() {
    init_tracing();
    let mut writer = ContainerWriter::new(VERSION);
    writer.add_section(SectionKind::Routing, truncated_rules_section());
    writer.add_section(SectionKind::Routing, town_builder().encode().body);
    let container = ObfContainer::from_bytes(writer.finish()).unwrap();

    let names: Vec<&str> = container.routing_sections().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["broken", "town"]);

    let results = read_routing_sections(&container);
    assert_eq!(results.len(), 2);
    match &results[0] {
        Err(ObfError::CorruptSection { section, .. }) => assert_eq!(section, "broken"),
        other => panic!("expected a corrupt section, got {other:?}"),
    }
    let town = results[1].as_ref().unwrap();
    assert_eq!(town.name, "town");
    assert_eq!(town.rules.len(), 4);
}

#[test]
fn test_reading_non_routing_section_is_rejected() {
    let mut w = WireWriter::new();
    w.write_string(1, "stops");
    let mut writer = ContainerWriter::new(VERSION);
    writer.add_section(SectionKind::Transport, w.into_bytes());
    let container = ObfContainer::from_bytes(writer.finish()).unwrap();
    let transport = container.sections(SectionKind::Transport).next().unwrap();

    let reader = RoutingSectionReader::for_container(&container);
    assert!(matches!(
        reader.read_section(transport),
        Err(ObfError::NotARoutingSection(name)) if name == "stops"
    ));
}

#[test]
fn test_memory_mapped_container() {
    let (container, _) = single_section(&town_builder());
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(container.data()).unwrap();
    file.flush().unwrap();

    let mapped = ObfContainer::open(file.path()).unwrap();
    let sections = read_routing_sections(&mapped);
    assert_eq!(sections[0].as_ref().unwrap().name, "town");
}

fn road_strategy() -> impl Strategy<Value = (Vec<(u32, u32)>, bool)> {
    (prop::collection::vec((0u32..2000, 0u32..2000), 1..20), any::<bool>())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn proptest_block_points_survive_encoding((grid, closed) in road_strategy()) {
        let mut points: Vec<Point31> = grid
            .iter()
            .map(|(x, y)| p(1024 + (x << 5), 1024 + (y << 5)))
            .collect();
        if closed {
            points.push(points[0]);
        }

        let mut b = RoutingSectionBuilder::new("prop");
        let t = b.rule("highway", "residential");
        b.add_box(
            BoxDef::new(Area31::new(1024, 1024, 1024 + (2000 << 5), 1024 + (2000 << 5)))
                .with_roads(vec![RoadDef::new(-42, points.clone(), vec![t])]),
        );
        let (container, offsets) = single_section(&b);
        let reader = RoutingSectionReader::for_container(&container);
        let section = reader.read_section(container.routing_sections().next().unwrap()).unwrap();
        let road = reader.read_road(&section, offsets[0].1).unwrap();

        prop_assert_eq!(road.id(), -42);
        prop_assert_eq!(road.points().to_vec(), points);
        if closed {
            prop_assert!(road.is_loop());
        }
    }
}
