//! Guarded rule expressions
//!
//! An expression matches a road's universal type set when every guard holds,
//! in this order: required types, excluded types, required free tags,
//! excluded free tags, parameter conditions, numeric comparisons. A matching
//! expression yields its result operand resolved to a number.

use std::fmt;
use std::str::FromStr;

use obf_common::RuleParseError;

use crate::registry::{RuleRegistry, TypeSet, UniversalRuleId};
use crate::value::ValueType;

/// What an expression needs from its evaluation context.
pub trait Bindings {
    fn registry(&self) -> &RuleRegistry;

    /// Current value of a profile parameter, if set.
    fn param(&self, name: &str) -> Option<String>;

    /// Value of universal rule `id` parsed as `value_type`; implementations cache.
    fn tag_value(&self, id: UniversalRuleId, value_type: ValueType) -> Result<f64, RuleParseError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(f64),
    /// `:name`
    Param(String),
    /// `$tag`, the value of whichever rule with that tag the road carries.
    Tag(String),
}

impl Operand {
    /// `:param`, `$tag` or a literal parsed as `value_type`.
    pub fn parse(raw: &str, value_type: ValueType) -> Result<Self, RuleParseError> {
        if let Some(name) = raw.strip_prefix(':') {
            return Ok(Operand::Param(name.to_string()));
        }
        if let Some(tag) = raw.strip_prefix('$') {
            return Ok(Operand::Tag(tag.to_string()));
        }
        value_type.parse(raw).map(Operand::Literal)
    }

    fn resolve(
        &self,
        value_type: ValueType,
        types: &TypeSet,
        env: &impl Bindings,
    ) -> Result<f64, RuleParseError> {
        match self {
            Operand::Literal(v) => Ok(*v),
            Operand::Param(name) => {
                let raw = env
                    .param(name)
                    .ok_or_else(|| RuleParseError::UnknownParameter(name.clone()))?;
                value_type.parse(&raw)
            }
            Operand::Tag(tag) => {
                let id = env
                    .registry()
                    .first_with_tag(tag, types)
                    .ok_or_else(|| RuleParseError::MissingTag(tag.clone()))?;
                env.tag_value(id, value_type)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    pub fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Less => left < right,
            Comparison::LessOrEqual => left <= right,
            Comparison::Greater => left > right,
            Comparison::GreaterOrEqual => left >= right,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
        }
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" | "lt" => Ok(Comparison::Less),
            "<=" | "le" => Ok(Comparison::LessOrEqual),
            ">" | "gt" => Ok(Comparison::Greater),
            ">=" | "ge" => Ok(Comparison::GreaterOrEqual),
            other => Err(format!("unknown comparison '{other}'")),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `left op right`, both sides read as `value_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub op: Comparison,
    pub left: Operand,
    pub right: Operand,
    pub value_type: ValueType,
}

impl Condition {
    fn holds(&self, types: &TypeSet, env: &impl Bindings) -> Result<bool, RuleParseError> {
        let left = self.left.resolve(self.value_type, types, env)?;
        let right = self.right.resolve(self.value_type, types, env)?;
        Ok(self.op.holds(left, right))
    }
}

/// Holds when the parameter is set to true, or when it is not if `negated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRef {
    pub name: String,
    pub negated: bool,
}

impl ParamRef {
    /// `name` or `-name`.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(name) => ParamRef {
                name: name.to_string(),
                negated: true,
            },
            None => ParamRef {
                name: raw.to_string(),
                negated: false,
            },
        }
    }

    fn holds(&self, env: &impl Bindings) -> bool {
        let set = env
            .param(&self.name)
            .and_then(|v| obf_common::units::parse_bool(&v))
            .unwrap_or(false);
        set != self.negated
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleExpression {
    pub required_types: TypeSet,
    pub excluded_types: TypeSet,
    pub required_tags: Vec<String>,
    pub excluded_tags: Vec<String>,
    pub params: Vec<ParamRef>,
    pub conditions: Vec<Condition>,
    pub result: Operand,
    pub result_type: ValueType,
}

impl RuleExpression {
    pub fn builder(registry: &RuleRegistry) -> ExpressionBuilder<'_> {
        ExpressionBuilder::new(registry)
    }

    pub fn matches(&self, types: &TypeSet, env: &impl Bindings) -> bool {
        if !self.required_types.is_subset(types) {
            return false;
        }
        if !self.excluded_types.is_disjoint(types) {
            return false;
        }
        let registry = env.registry();
        if !self.required_tags.iter().all(|tag| registry.has_tag(tag, types)) {
            return false;
        }
        if self.excluded_tags.iter().any(|tag| registry.has_tag(tag, types)) {
            return false;
        }
        if !self.params.iter().all(|p| p.holds(env)) {
            return false;
        }
        for condition in &self.conditions {
            match condition.holds(types, env) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(err) => {
                    tracing::trace!(%err, op = %condition.op, "condition unresolvable");
                    return false;
                }
            }
        }
        true
    }

    /// The result when the guards match and the result operand resolves.
    pub fn evaluate(&self, types: &TypeSet, env: &impl Bindings) -> Option<f64> {
        if !self.matches(types, env) {
            return None;
        }
        match self.result.resolve(self.result_type, types, env) {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::trace!(%err, "matching expression has no result");
                None
            }
        }
    }
}

/// Registers the `(tag, value)` pairs an expression mentions as it is built.
#[derive(Debug)]
pub struct ExpressionBuilder<'r> {
    registry: &'r RuleRegistry,
    expression: RuleExpression,
}

impl<'r> ExpressionBuilder<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self {
            registry,
            expression: RuleExpression {
                required_types: TypeSet::new(),
                excluded_types: TypeSet::new(),
                required_tags: Vec::new(),
                excluded_tags: Vec::new(),
                params: Vec::new(),
                conditions: Vec::new(),
                result: Operand::Literal(0.0),
                result_type: ValueType::Number,
            },
        }
    }

    /// Require `tag=value`; an empty value requires the tag with any value.
    pub fn require(mut self, tag: &str, value: &str) -> Self {
        if value.is_empty() {
            self.expression.required_tags.push(tag.to_string());
        } else {
            let id = self.registry.register_or_get(tag, value);
            self.expression.required_types.insert(id);
        }
        self
    }

    /// Exclude `tag=value`; an empty value excludes every value of the tag.
    pub fn exclude(mut self, tag: &str, value: &str) -> Self {
        if value.is_empty() {
            self.expression.excluded_tags.push(tag.to_string());
        } else {
            let id = self.registry.register_or_get(tag, value);
            self.expression.excluded_types.insert(id);
        }
        self
    }

    pub fn param(mut self, param: ParamRef) -> Self {
        self.expression.params.push(param);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.expression.conditions.push(condition);
        self
    }

    pub fn result(mut self, result: Operand, result_type: ValueType) -> Self {
        self.expression.result = result;
        self.expression.result_type = result_type;
        self
    }

    pub fn build(self) -> RuleExpression {
        self.expression
    }
}
