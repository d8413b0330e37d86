//! Per-search binding of a profile to the sections it routes over
//!
//! Roads carry section-local rule ids. The context translates them to
//! universal ids on first sight, evaluates the profile's rulesets over the
//! resulting type set and caches results keyed by section and local types.
//! Caches live behind mutexes so one context can serve several workers.
//!
//! A road decoded from a section carries that section's rule table and
//! binds it on first sight. A road whose section is neither attached nor
//! known to the road is never accepted.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use obf_common::geo::align_angle_difference;
use obf_common::RuleParseError;
use obf_io::routing::{
    BorderLinePoint, EncodingRuleTable, Road, RoadDirection, RoutingSection, RuleKind, SectionId,
};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::expression::Bindings;
use crate::profile::RoutingProfile;
use crate::registry::{RuleRegistry, TypeSet, UniversalRuleId};
use crate::ruleset::RulesetKind;
use crate::value::ValueType;

#[derive(Debug)]
struct SectionBinding {
    rules: Arc<EncodingRuleTable>,
    translation: FxHashMap<u32, UniversalRuleId>,
}

/// Ruleset, section and sorted local types.
type EvalKey = (RulesetKind, SectionId, Vec<u32>);

#[derive(Debug, Default)]
struct Counters {
    translations: AtomicU64,
    cache_hits: AtomicU64,
    evaluations: AtomicU64,
    tag_parses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextStats {
    /// Local ids translated to universal ids.
    pub translations: u64,
    pub cache_hits: u64,
    pub evaluations: u64,
    /// Tag values parsed to numbers.
    pub tag_parses: u64,
}

/// The part of a road a route traverses, from `start` to `end` point index.
#[derive(Debug, Clone, Copy)]
pub struct RoadSegment<'r> {
    pub road: &'r Road,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug)]
pub struct RoutingProfileContext {
    profile: Arc<RoutingProfile>,
    params: FxHashMap<String, String>,
    impassable: FxHashSet<i64>,
    sections: Mutex<FxHashMap<SectionId, SectionBinding>>,
    eval_cache: Mutex<FxHashMap<EvalKey, Option<f64>>>,
    tag_values: Mutex<FxHashMap<(UniversalRuleId, ValueType), Result<f64, RuleParseError>>>,
    counters: Counters,
}

impl RoutingProfileContext {
    pub fn new(profile: Arc<RoutingProfile>) -> Self {
        Self {
            profile,
            params: FxHashMap::default(),
            impassable: FxHashSet::default(),
            sections: Mutex::default(),
            eval_cache: Mutex::default(),
            tag_values: Mutex::default(),
            counters: Counters::default(),
        }
    }

    pub fn profile(&self) -> &Arc<RoutingProfile> {
        &self.profile
    }

    /// Set a profile parameter for this session. Cached results are dropped.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
        self.eval_cache.get_mut().clear();
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(name, value);
        self
    }

    /// Session value of `name`, else the profile's default.
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.params.get(name).cloned().or_else(|| {
            self.profile
                .parameter(name)
                .and_then(|p| p.default.clone())
        })
    }

    /// Exclude a road from [`Self::accepts_road`] whatever its rules say.
    pub fn add_impassable_road(&mut self, road_id: i64) {
        self.impassable.insert(road_id);
    }

    pub fn is_impassable(&self, road_id: i64) -> bool {
        self.impassable.contains(&road_id)
    }

    /// Make `section`'s rule table available for translation. Idempotent.
    pub fn attach_section(&self, section: &RoutingSection) {
        let mut sections = self.sections.lock();
        sections.entry(section.id).or_insert_with(|| {
            tracing::debug!(section = %section.name, rules = section.rules.len(), "attached section");
            SectionBinding {
                rules: Arc::clone(&section.rules),
                translation: FxHashMap::default(),
            }
        });
    }

    pub fn is_attached(&self, section: SectionId) -> bool {
        self.sections.lock().contains_key(&section)
    }

    /// Make sure the road's section is bound, using the table the road
    /// carries when the section was never attached. False when neither is
    /// available.
    fn bind_road(&self, road: &Road) -> bool {
        let mut sections = self.sections.lock();
        if sections.contains_key(&road.section()) {
            return true;
        }
        let Some(rules) = road.rules() else {
            return false;
        };
        tracing::debug!(section = road.section().0, rules = rules.len(), "attached section from road");
        sections.insert(
            road.section(),
            SectionBinding {
                rules: Arc::clone(rules),
                translation: FxHashMap::default(),
            },
        );
        true
    }

    fn section_rules(&self, section: SectionId) -> Option<Arc<EncodingRuleTable>> {
        self.sections
            .lock()
            .get(&section)
            .map(|binding| Arc::clone(&binding.rules))
    }

    /// Universal type set of local ids, `None` when the section is not attached.
    ///
    /// Local ids missing from the section's table are skipped.
    pub fn universal_types(&self, section: SectionId, local_types: &[u32]) -> Option<TypeSet> {
        let registry = self.profile.registry();
        let mut sections = self.sections.lock();
        let binding = sections.get_mut(&section)?;
        let mut types = TypeSet::new();
        for &local in local_types {
            let id = match binding.translation.get(&local) {
                Some(id) => *id,
                None => {
                    let Some(rule) = binding.rules.get(local) else {
                        tracing::trace!(section = section.0, local, "local rule id not in table");
                        continue;
                    };
                    let id = registry.register_or_get(&rule.tag, &rule.value);
                    binding.translation.insert(local, id);
                    self.counters.translations.fetch_add(1, Ordering::Relaxed);
                    id
                }
            };
            types.insert(id);
        }
        Some(types)
    }

    fn evaluate_types(&self, kind: RulesetKind, section: SectionId, local_types: &[u32]) -> Option<f64> {
        let mut sorted = local_types.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let key = (kind, section, sorted);

        if let Some(hit) = self.eval_cache.lock().get(&key).copied() {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }

        let Some(types) = self.universal_types(section, &key.2) else {
            tracing::warn!(section = section.0, ruleset = kind.label(), "section not attached, no result");
            return None;
        };

        self.counters.evaluations.fetch_add(1, Ordering::Relaxed);
        let result = self.profile.ruleset(kind).evaluate(&types, self);
        tracing::trace!(ruleset = kind.label(), section = section.0, ?result, "evaluated ruleset");
        self.eval_cache.lock().insert(key, result);
        result
    }

    /// Raw ruleset result for a road's own types.
    ///
    /// `None` is no opinion, or a road whose section cannot be bound.
    pub fn evaluate(&self, kind: RulesetKind, road: &Road) -> Option<f64> {
        if !self.bind_road(road) {
            return None;
        }
        self.evaluate_types(kind, road.section(), road.types())
    }

    pub fn direction(&self, road: &Road) -> RoadDirection {
        self.bind_road(road);
        let roundabout = self
            .section_rules(road.section())
            .is_some_and(|rules| rules.has_kind(road.types(), RuleKind::Roundabout));
        if roundabout {
            return RoadDirection::Forward;
        }
        match self.evaluate(RulesetKind::OneWay, road) {
            Some(sign) => RoadDirection::from_sign(sign),
            None => RoadDirection::TwoWay,
        }
    }

    /// Access result of at least 0 (no opinion counts as 0), and not impassable.
    ///
    /// Roads from a section the context cannot bind are rejected.
    pub fn accepts_road(&self, road: &Road) -> bool {
        if self.is_impassable(road.id()) {
            return false;
        }
        if !self.bind_road(road) {
            tracing::warn!(road = road.id(), section = road.section().0, "road section unknown, rejecting");
            return false;
        }
        self.evaluate_types(RulesetKind::Access, road.section(), road.types())
            .unwrap_or(0.0)
            >= 0.0
    }

    /// Access check of a border point's own types.
    pub fn accepts_border_line_point(&self, section: &RoutingSection, point: &BorderLinePoint) -> bool {
        self.attach_section(section);
        self.evaluate_types(RulesetKind::Access, section.id, &point.types)
            .unwrap_or(0.0)
            >= 0.0
    }

    pub fn speed_priority(&self, road: &Road) -> f64 {
        self.evaluate(RulesetKind::RoadPriorities, road).unwrap_or(1.0)
    }

    /// Speed in m/s within the profile's default speed range, the minimum
    /// when unknown.
    pub fn speed(&self, road: &Road) -> f64 {
        let min = self.profile.min_default_speed();
        let speed = self.evaluate(RulesetKind::RoadSpeed, road).unwrap_or(min);
        speed.min(self.profile.max_default_speed()).max(min)
    }

    /// Seconds spent passing point `point` of `road`, whatever the travel
    /// direction.
    pub fn obstacles_extra_time(&self, road: &Road, point: u32) -> f64 {
        self.point_evaluation(RulesetKind::Obstacles, road, point, None)
    }

    /// Routing cost added at point `point` of `road`, whatever the travel
    /// direction.
    pub fn routing_obstacles_extra_time(&self, road: &Road, point: u32) -> f64 {
        self.point_evaluation(RulesetKind::RoutingObstacles, road, point, None)
    }

    /// [`Self::obstacles_extra_time`] when travelling along (`forward`) or
    /// against the road's point order.
    ///
    /// Stop and give-way signs tagged `direction=*`, and signals tagged
    /// `traffic_signals:direction=*`, only count in their direction.
    pub fn directed_obstacles_extra_time(&self, road: &Road, point: u32, forward: bool) -> f64 {
        self.point_evaluation(RulesetKind::Obstacles, road, point, Some(forward))
    }

    /// [`Self::routing_obstacles_extra_time`] for one travel direction.
    pub fn directed_routing_obstacles_extra_time(&self, road: &Road, point: u32, forward: bool) -> f64 {
        self.point_evaluation(RulesetKind::RoutingObstacles, road, point, Some(forward))
    }

    fn point_evaluation(&self, kind: RulesetKind, road: &Road, point: u32, forward: Option<bool>) -> f64 {
        let types = road.point_types(point);
        if types.is_empty() || !self.bind_road(road) {
            return 0.0;
        }
        let filtered = match (forward, self.section_rules(road.section())) {
            (Some(forward), Some(rules)) => filter_direction_types(&rules, types, forward),
            _ => None,
        };
        self.evaluate_types(kind, road.section(), filtered.as_deref().unwrap_or(types))
            .unwrap_or(0.0)
    }

    /// Penalty in seconds for moving from `prev` onto `next`.
    ///
    /// Entering a roundabout costs `roundaboutTurn`. Otherwise the angle
    /// between both bearings decides: sharp turns cost `leftTurn`, slight
    /// ones `rightTurn`.
    pub fn turn_time(&self, prev: RoadSegment<'_>, next: RoadSegment<'_>) -> f64 {
        let profile = &self.profile;
        self.bind_road(prev.road);
        self.bind_road(next.road);
        let prev_rules = self.section_rules(prev.road.section()).unwrap_or_default();
        let next_rules = self.section_rules(next.road.section()).unwrap_or_default();

        if next.road.is_roundabout(&next_rules) && !prev.road.is_roundabout(&prev_rules) {
            return profile.roundabout_turn().max(0.0);
        }
        if profile.left_turn() <= 0.0 && profile.right_turn() <= 0.0 {
            return 0.0;
        }

        let outgoing = next.road.direction_delta(next.start, next.start < next.end);
        let incoming = prev.road.direction_delta(prev.end, prev.end < prev.start);
        let (Some(a1), Some(a2)) = (outgoing, incoming) else {
            return 0.0;
        };
        let diff = align_angle_difference(a1 - a2 - PI).abs();
        if diff > 2.0 * PI / 3.0 {
            profile.left_turn()
        } else if diff > PI / 3.0 {
            profile.right_turn()
        } else {
            0.0
        }
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            translations: self.counters.translations.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            evaluations: self.counters.evaluations.load(Ordering::Relaxed),
            tag_parses: self.counters.tag_parses.load(Ordering::Relaxed),
        }
    }
}

/// Point types without the signs that face the other way, `None` when the
/// point carries no direction tag.
fn filter_direction_types(rules: &EncodingRuleTable, types: &[u32], forward: bool) -> Option<Vec<u32>> {
    let sign = |value: &str| match value {
        "forward" => 1,
        "backward" => -1,
        _ => 0,
    };
    let mut direction = 0;
    let mut signals_direction = 0;
    for rule in types.iter().filter_map(|local| rules.get(*local)) {
        match rule.tag.as_str() {
            "direction" => direction = sign(&rule.value),
            "traffic_signals:direction" => signals_direction = sign(&rule.value),
            _ => {}
        }
    }
    if direction == 0 && signals_direction == 0 {
        return None;
    }

    let opposite = if forward { -1 } else { 1 };
    let kept = types
        .iter()
        .copied()
        .filter(|local| {
            let Some(rule) = rules.get(*local) else {
                return true;
            };
            if rule.tag != "highway" {
                return true;
            }
            match rule.value.as_str() {
                "stop" | "give_way" => direction != opposite,
                "traffic_signals" => signals_direction != opposite,
                _ => true,
            }
        })
        .collect();
    Some(kept)
}

impl Bindings for RoutingProfileContext {
    fn registry(&self) -> &RuleRegistry {
        self.profile.registry()
    }

    fn param(&self, name: &str) -> Option<String> {
        self.parameter(name)
    }

    fn tag_value(&self, id: UniversalRuleId, value_type: ValueType) -> Result<f64, RuleParseError> {
        let mut cache = self.tag_values.lock();
        if let Some(cached) = cache.get(&(id, value_type)) {
            return cached.clone();
        }
        let parsed = match self.registry().rule(id) {
            Some((_, value)) => value_type.parse(&value),
            None => Err(RuleParseError::MissingTag(format!("#{id}"))),
        };
        self.counters.tag_parses.fetch_add(1, Ordering::Relaxed);
        cache.insert((id, value_type), parsed.clone());
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Operand, RuleExpression};
    use obf_common::Point31;

    fn section(rules: &[(&str, &str)]) -> RoutingSection {
        let mut table = EncodingRuleTable::new();
        for (tag, value) in rules {
            table.push(*tag, *value);
        }
        RoutingSection {
            id: SectionId::next(),
            name: "test".into(),
            offset: 0,
            length: 0,
            rules: Arc::new(table),
            subsections: Vec::new(),
            basemap_subsections: Vec::new(),
            border_box: None,
            base_border_box: None,
        }
    }

    fn road(section: &RoutingSection, id: i64, types: Vec<u32>) -> Road {
        Road::new(
            id,
            section.id,
            vec![Point31::new(0, 0), Point31::new(0, 10_000)],
            types,
        )
    }

    fn literal(value: f64) -> Operand {
        Operand::Literal(value)
    }

    #[test]
    fn test_translation_is_cached_per_section() {
        let registry = Arc::new(RuleRegistry::new());
        let profile = Arc::new(RoutingProfile::new("car", Arc::clone(&registry)));
        let ctx = RoutingProfileContext::new(profile);
        let a = section(&[("highway", "primary"), ("oneway", "yes")]);
        let b = section(&[("oneway", "yes")]);
        ctx.attach_section(&a);
        ctx.attach_section(&b);

        let ta = ctx.universal_types(a.id, &[0, 1, 1]).unwrap();
        let tb = ctx.universal_types(b.id, &[0]).unwrap();
        let oneway = registry.get("oneway", "yes").unwrap();
        assert!(ta.contains(oneway));
        assert_eq!(tb.iter().collect::<Vec<_>>(), vec![oneway]);
        assert_eq!(ctx.stats().translations, 3);

        ctx.universal_types(a.id, &[0, 1]).unwrap();
        assert_eq!(ctx.stats().translations, 3);
        // unknown local ids are skipped
        assert_eq!(ctx.universal_types(b.id, &[5]).unwrap().len(), 0);
    }

    #[test]
    fn test_unattached_road_binds_its_own_rules() {
        let registry = Arc::new(RuleRegistry::new());
        let mut profile = RoutingProfile::new("car", Arc::clone(&registry));
        profile.add_expression(
            RulesetKind::Access,
            RuleExpression::builder(&registry)
                .require("highway", "footway")
                .result(literal(-1.0), ValueType::Number)
                .build(),
        );
        let ctx = RoutingProfileContext::new(Arc::new(profile));
        let s = section(&[("highway", "primary"), ("highway", "footway")]);
        let footway = road(&s, 1, vec![1]).with_rules(Arc::clone(&s.rules));
        let primary = road(&s, 2, vec![0]);

        assert!(ctx.universal_types(s.id, &[1]).is_none());
        assert!(!ctx.accepts_road(&footway));
        assert!(ctx.is_attached(s.id));
        // bound through the footway, so a road without its own table works too
        assert!(ctx.accepts_road(&primary));
    }

    #[test]
    fn test_road_without_known_section_is_rejected() {
        let registry = Arc::new(RuleRegistry::new());
        let ctx = RoutingProfileContext::new(Arc::new(RoutingProfile::new("car", registry)));
        let s = section(&[("highway", "footway")]);
        let r = road(&s, 1, vec![0]);

        assert!(!ctx.accepts_road(&r));
        assert_eq!(ctx.evaluate(RulesetKind::Access, &r), None);
        assert!(!ctx.is_attached(s.id));
        assert_eq!(ctx.stats().evaluations, 0);

        ctx.attach_section(&s);
        assert!(ctx.accepts_road(&r));
    }

    #[test]
    fn test_roundabout_forces_forward() {
        let registry = Arc::new(RuleRegistry::new());
        let mut profile = RoutingProfile::new("car", Arc::clone(&registry));
        profile.add_expression(
            RulesetKind::OneWay,
            RuleExpression::builder(&registry)
                .require("oneway", "-1")
                .result(literal(-1.0), ValueType::Number)
                .build(),
        );
        let ctx = RoutingProfileContext::new(Arc::new(profile));
        let s = section(&[("junction", "roundabout"), ("oneway", "-1")]);
        ctx.attach_section(&s);

        assert_eq!(ctx.direction(&road(&s, 1, vec![0, 1])), RoadDirection::Forward);
        assert_eq!(ctx.direction(&road(&s, 2, vec![1])), RoadDirection::Reverse);
        assert_eq!(ctx.direction(&road(&s, 3, vec![])), RoadDirection::TwoWay);
    }

    #[test]
    fn test_parameters_and_impassable_roads() {
        let registry = Arc::new(RuleRegistry::new());
        let mut profile = RoutingProfile::new("car", Arc::clone(&registry));
        profile.add_parameter(crate::profile::Parameter::boolean("avoid_toll"));
        profile.add_expression(
            RulesetKind::Access,
            RuleExpression::builder(&registry)
                .require("toll", "yes")
                .param(crate::expression::ParamRef::parse("avoid_toll"))
                .result(literal(-1.0), ValueType::Number)
                .build(),
        );
        let mut ctx = RoutingProfileContext::new(Arc::new(profile));
        let s = section(&[("toll", "yes")]);
        ctx.attach_section(&s);
        let toll_road = road(&s, 7, vec![0]);

        assert!(ctx.accepts_road(&toll_road));
        ctx.set_parameter("avoid_toll", "true");
        assert!(!ctx.accepts_road(&toll_road));

        let free_road = road(&s, 8, vec![]);
        assert!(ctx.accepts_road(&free_road));
        ctx.add_impassable_road(8);
        assert!(!ctx.accepts_road(&free_road));
    }

    #[test]
    fn test_point_obstacles() {
        let registry = Arc::new(RuleRegistry::new());
        let mut profile = RoutingProfile::new("car", Arc::clone(&registry));
        profile.add_expression(
            RulesetKind::Obstacles,
            RuleExpression::builder(&registry)
                .require("highway", "traffic_signals")
                .result(literal(25.0), ValueType::Number)
                .build(),
        );
        let ctx = RoutingProfileContext::new(Arc::new(profile));
        let s = section(&[("highway", "primary"), ("highway", "traffic_signals")]);
        ctx.attach_section(&s);
        let mut point_types = std::collections::BTreeMap::new();
        point_types.insert(1, vec![1]);
        let r = road(&s, 1, vec![0]).with_point_types(point_types);

        assert_eq!(ctx.obstacles_extra_time(&r, 1), 25.0);
        assert_eq!(ctx.obstacles_extra_time(&r, 0), 0.0);
        assert_eq!(ctx.routing_obstacles_extra_time(&r, 1), 0.0);
    }

    #[test]
    fn test_directed_obstacles() {
        let registry = Arc::new(RuleRegistry::new());
        let mut profile = RoutingProfile::new("car", Arc::clone(&registry));
        for (value, cost) in [("traffic_signals", 25.0), ("stop", 10.0)] {
            profile.add_expression(
                RulesetKind::Obstacles,
                RuleExpression::builder(&registry)
                    .require("highway", value)
                    .result(literal(cost), ValueType::Number)
                    .build(),
            );
        }
        let ctx = RoutingProfileContext::new(Arc::new(profile));
        let s = section(&[
            ("highway", "traffic_signals"),
            ("traffic_signals:direction", "forward"),
            ("highway", "stop"),
            ("direction", "backward"),
        ]);
        ctx.attach_section(&s);
        let mut point_types = std::collections::BTreeMap::new();
        point_types.insert(1, vec![0, 1]);
        point_types.insert(2, vec![2, 3]);
        point_types.insert(3, vec![0]);
        let r = Road::new(
            1,
            s.id,
            (0..4).map(|i| Point31::new(i * 1000, 0)).collect(),
            vec![],
        )
        .with_point_types(point_types);

        assert_eq!(ctx.directed_obstacles_extra_time(&r, 1, true), 25.0);
        assert_eq!(ctx.directed_obstacles_extra_time(&r, 1, false), 0.0);
        assert_eq!(ctx.directed_obstacles_extra_time(&r, 2, true), 0.0);
        assert_eq!(ctx.directed_obstacles_extra_time(&r, 2, false), 10.0);
        // untagged signals count both ways
        assert_eq!(ctx.directed_obstacles_extra_time(&r, 3, false), 25.0);
        assert_eq!(ctx.obstacles_extra_time(&r, 1), 25.0);
        assert_eq!(ctx.obstacles_extra_time(&r, 2), 10.0);
    }

    #[test]
    fn test_turn_time() {
        let registry = Arc::new(RuleRegistry::new());
        let mut profile = RoutingProfile::new("car", Arc::clone(&registry));
        profile.add_attribute("leftTurn", "30");
        profile.add_attribute("rightTurn", "10");
        profile.add_attribute("roundaboutTurn", "5");
        let ctx = RoutingProfileContext::new(Arc::new(profile));
        let s = section(&[("highway", "primary"), ("junction", "roundabout")]);
        ctx.attach_section(&s);

        let p = Point31::new;
        // north-bound road ending at the junction
        let incoming = Road::new(1, s.id, vec![p(10_000, 20_000), p(10_000, 10_000)], vec![0]);
        let straight = Road::new(2, s.id, vec![p(10_000, 10_000), p(10_000, 0)], vec![0]);
        let side = Road::new(3, s.id, vec![p(10_000, 10_000), p(20_000, 10_000)], vec![0]);
        let back = Road::new(4, s.id, vec![p(10_000, 10_000), p(10_000, 20_000)], vec![0]);
        let ring = Road::new(5, s.id, vec![p(10_000, 10_000), p(12_000, 8_000)], vec![0, 1]);

        let prev = RoadSegment { road: &incoming, start: 0, end: 1 };
        let seg = |road| RoadSegment { road, start: 0, end: 1 };
        assert_eq!(ctx.turn_time(prev, seg(&straight)), 0.0);
        assert_eq!(ctx.turn_time(prev, seg(&side)), 10.0);
        assert_eq!(ctx.turn_time(prev, seg(&back)), 30.0);
        assert_eq!(ctx.turn_time(prev, seg(&ring)), 5.0);
    }
}
