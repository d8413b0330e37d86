//! Routing rule evaluation over OBF road data
//!
//! A [`RoutingProfile`] holds six ordered [`Ruleset`]s written against a
//! process-wide [`RuleRegistry`]. A [`RoutingProfileContext`] binds a profile
//! to decoded sections and answers per-road questions: access, direction,
//! speed, priority, obstacle costs and turn penalties.

pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod profile;
pub mod registry;
pub mod ruleset;
pub mod value;

pub use config::RoutingConfig;
pub use context::{ContextStats, RoadSegment, RoutingProfileContext};
pub use error::{ConfigError, Result};
pub use expression::{
    Bindings, Comparison, Condition, ExpressionBuilder, Operand, ParamRef, RuleExpression,
};
pub use profile::{Parameter, ParameterKind, RoutingProfile};
pub use registry::{RuleRegistry, TypeSet, UniversalRuleId};
pub use ruleset::{Ruleset, RulesetKind};
pub use value::ValueType;
