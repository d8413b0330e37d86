//! Routing profiles: six rulesets plus scalar attributes and parameters
//!
//! A profile is assembled once, then shared read-only (usually behind an
//! `Arc`) by every context that routes with it.

use std::collections::BTreeMap;
use std::sync::Arc;

use obf_common::units;

use crate::expression::RuleExpression;
use crate::registry::RuleRegistry;
use crate::ruleset::{Ruleset, RulesetKind};

const KMH_PER_MPS: f64 = 3.6;
pub const DEFAULT_MIN_SPEED_KMH: f64 = 10.0;
pub const DEFAULT_MAX_SPEED_KMH: f64 = 130.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    Boolean,
    /// Numeric knob with the values offered to users.
    Numeric {
        values: Vec<f64>,
        descriptions: Vec<String>,
    },
}

/// A caller-settable knob a profile's expressions can refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: ParameterKind,
    pub default: Option<String>,
}

impl Parameter {
    pub fn boolean(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            kind: ParameterKind::Boolean,
            default: None,
        }
    }

    pub fn numeric(id: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            kind: ParameterKind::Numeric {
                values,
                descriptions: Vec::new(),
            },
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct RoutingProfile {
    name: String,
    registry: Arc<RuleRegistry>,
    rulesets: Vec<Ruleset>,
    attributes: BTreeMap<String, String>,
    parameters: BTreeMap<String, Parameter>,
    restrictions_aware: bool,
    left_turn: f64,
    right_turn: f64,
    roundabout_turn: f64,
    /// m/s
    min_default_speed: f64,
    /// m/s
    max_default_speed: f64,
}

impl RoutingProfile {
    pub fn new(name: impl Into<String>, registry: Arc<RuleRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            rulesets: RulesetKind::ALL.into_iter().map(Ruleset::new).collect(),
            attributes: BTreeMap::new(),
            parameters: BTreeMap::new(),
            restrictions_aware: true,
            left_turn: 0.0,
            right_turn: 0.0,
            roundabout_turn: 0.0,
            min_default_speed: DEFAULT_MIN_SPEED_KMH / KMH_PER_MPS,
            max_default_speed: DEFAULT_MAX_SPEED_KMH / KMH_PER_MPS,
        }
    }

    /// Store `key` verbatim; recognised keys also update the typed fields.
    ///
    /// Values that fail to parse leave the typed field unchanged.
    pub fn add_attribute(&mut self, key: &str, value: &str) {
        self.attributes.insert(key.to_string(), value.to_string());
        let float = || units::parse_float(value);
        match key {
            "restrictionsAware" => {
                if let Some(aware) = units::parse_bool(value) {
                    self.restrictions_aware = aware;
                }
            }
            "leftTurn" => self.left_turn = float().unwrap_or(self.left_turn),
            "rightTurn" => self.right_turn = float().unwrap_or(self.right_turn),
            "roundaboutTurn" => self.roundabout_turn = float().unwrap_or(self.roundabout_turn),
            "minDefaultSpeed" => {
                if let Some(kmh) = float() {
                    self.min_default_speed = kmh / KMH_PER_MPS;
                }
            }
            "maxDefaultSpeed" => {
                if let Some(kmh) = float() {
                    self.max_default_speed = kmh / KMH_PER_MPS;
                }
            }
            _ => {}
        }
    }

    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameters.insert(parameter.id.clone(), parameter);
    }

    pub fn add_expression(&mut self, kind: RulesetKind, expression: RuleExpression) {
        self.rulesets[kind.index()].push(expression);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn ruleset(&self, kind: RulesetKind) -> &Ruleset {
        &self.rulesets[kind.index()]
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.get(id)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }

    pub fn restrictions_aware(&self) -> bool {
        self.restrictions_aware
    }

    /// Seconds added for a sharp turn.
    pub fn left_turn(&self) -> f64 {
        self.left_turn
    }

    /// Seconds added for a slight turn.
    pub fn right_turn(&self) -> f64 {
        self.right_turn
    }

    pub fn roundabout_turn(&self) -> f64 {
        self.roundabout_turn
    }

    pub fn min_default_speed(&self) -> f64 {
        self.min_default_speed
    }

    pub fn max_default_speed(&self) -> f64 {
        self.max_default_speed
    }
}
