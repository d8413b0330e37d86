//! Ordered expression lists, one per road attribute a profile decides

use std::str::FromStr;

use crate::expression::{Bindings, RuleExpression};
use crate::registry::TypeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RulesetKind {
    RoadPriorities,
    RoadSpeed,
    Access,
    Obstacles,
    RoutingObstacles,
    OneWay,
}

impl RulesetKind {
    pub const ALL: [RulesetKind; 6] = [
        RulesetKind::RoadPriorities,
        RulesetKind::RoadSpeed,
        RulesetKind::Access,
        RulesetKind::Obstacles,
        RulesetKind::RoutingObstacles,
        RulesetKind::OneWay,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Name used in profile configuration.
    pub fn label(self) -> &'static str {
        match self {
            RulesetKind::RoadPriorities => "road_priorities",
            RulesetKind::RoadSpeed => "road_speed",
            RulesetKind::Access => "access",
            RulesetKind::Obstacles => "obstacle_time",
            RulesetKind::RoutingObstacles => "obstacle",
            RulesetKind::OneWay => "oneway",
        }
    }
}

impl FromStr for RulesetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RulesetKind::ALL
            .into_iter()
            .find(|kind| kind.label() == s)
            .ok_or_else(|| format!("unknown ruleset '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ruleset {
    kind: RulesetKind,
    expressions: Vec<RuleExpression>,
}

impl Ruleset {
    pub fn new(kind: RulesetKind) -> Self {
        Self {
            kind,
            expressions: Vec::new(),
        }
    }

    pub fn kind(&self) -> RulesetKind {
        self.kind
    }

    pub fn push(&mut self, expression: RuleExpression) {
        self.expressions.push(expression);
    }

    pub fn expressions(&self) -> &[RuleExpression] {
        &self.expressions
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    /// First expression that matches and resolves; `None` means no opinion.
    pub fn evaluate(&self, types: &TypeSet, env: &impl Bindings) -> Option<f64> {
        self.expressions
            .iter()
            .find_map(|expression| expression.evaluate(types, env))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::tests::{types, TestEnv};
    use crate::expression::Operand;
    use crate::value::ValueType;

    #[test]
    fn test_first_match_wins() {
        let env = TestEnv::default();
        let motorway = env.registry.register_or_get("highway", "motorway");
        let mut ruleset = Ruleset::new(RulesetKind::RoadPriorities);
        ruleset.push(
            RuleExpression::builder(&env.registry)
                .require("highway", "motorway")
                .result(Operand::Literal(1.5), ValueType::Number)
                .build(),
        );
        ruleset.push(
            RuleExpression::builder(&env.registry)
                .require("highway", "")
                .result(Operand::Literal(0.5), ValueType::Number)
                .build(),
        );

        assert_eq!(ruleset.evaluate(&types(&[motorway]), &env), Some(1.5));
        let track = env.registry.register_or_get("highway", "track");
        assert_eq!(ruleset.evaluate(&types(&[track]), &env), Some(0.5));
        assert_eq!(ruleset.evaluate(&types(&[]), &env), None);
    }

    #[test]
    fn test_unresolvable_result_falls_through() {
        let env = TestEnv::default();
        let limit = env.registry.register_or_get("maxspeed", "signals");
        let mut ruleset = Ruleset::new(RulesetKind::RoadSpeed);
        ruleset.push(
            RuleExpression::builder(&env.registry)
                .require("maxspeed", "")
                .result(Operand::Tag("maxspeed".into()), ValueType::Speed)
                .build(),
        );
        ruleset.push(
            RuleExpression::builder(&env.registry)
                .result(Operand::Literal(8.0), ValueType::Number)
                .build(),
        );
        assert_eq!(ruleset.evaluate(&types(&[limit]), &env), Some(8.0));
    }

    #[test]
    fn test_empty_ruleset_has_no_opinion() {
        let env = TestEnv::default();
        let ruleset = Ruleset::new(RulesetKind::Access);
        assert!(ruleset.is_empty());
        assert_eq!(ruleset.evaluate(&types(&[0, 1]), &env), None);
    }

    #[test]
    fn test_kind_labels_round_trip() {
        for kind in RulesetKind::ALL {
            assert_eq!(kind.label().parse::<RulesetKind>(), Ok(kind));
            assert_eq!(RulesetKind::ALL[kind.index()], kind);
        }
        assert!("speed".parse::<RulesetKind>().is_err());
    }
}
