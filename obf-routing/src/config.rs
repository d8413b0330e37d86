//! JSON profile configuration
//!
//! ```json
//! {
//!   "attributes": { "heuristicCoefficient": "1.2" },
//!   "defaultProfile": "car",
//!   "profiles": [{
//!     "name": "car",
//!     "attributes": { "minDefaultSpeed": "45", "leftTurn": "20" },
//!     "parameters": [{ "id": "avoid_toll", "type": "boolean" }],
//!     "rulesets": {
//!       "access": [{ "value": "-1", "params": ["avoid_toll"], "tags": [{ "tag": "toll", "value": "yes" }] }],
//!       "road_speed": [{ "value": "$maxspeed", "type": "speed", "tags": [{ "tag": "maxspeed" }] }]
//!     }
//!   }]
//! }
//! ```
//!
//! Ruleset names are the [`RulesetKind`] labels. Expressions keep their file
//! order, which is their evaluation order.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use obf_common::RuleParseError;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::expression::{Comparison, Condition, Operand, ParamRef, RuleExpression};
use crate::profile::{Parameter, ParameterKind, RoutingProfile};
use crate::registry::RuleRegistry;
use crate::ruleset::RulesetKind;
use crate::value::ValueType;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigDocument {
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    default_profile: Option<String>,
    #[serde(default)]
    profiles: Vec<ProfileDef>,
}

#[derive(Debug, Deserialize)]
struct ProfileDef {
    name: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    parameters: Vec<ParameterDef>,
    #[serde(default)]
    rulesets: BTreeMap<String, Vec<ExpressionDef>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ParameterKindDef {
    Boolean,
    Numeric,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParameterDef {
    id: String,
    #[serde(rename = "type")]
    kind: ParameterKindDef,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    values: Vec<f64>,
    #[serde(default)]
    value_descriptions: Vec<String>,
    #[serde(default)]
    default: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagConditionDef {
    tag: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    not: bool,
}

#[derive(Debug, Deserialize)]
struct ConditionDef {
    op: String,
    left: String,
    right: String,
    #[serde(rename = "type", default)]
    value_type: ValueType,
}

#[derive(Debug, Deserialize)]
struct ExpressionDef {
    #[serde(default)]
    tags: Vec<TagConditionDef>,
    /// Parameter ids, `-id` for negation.
    #[serde(default)]
    params: Vec<String>,
    #[serde(default)]
    conditions: Vec<ConditionDef>,
    value: String,
    #[serde(rename = "type", default)]
    value_type: ValueType,
}

/// Every profile of one configuration document.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    attributes: BTreeMap<String, String>,
    default_profile: Option<String>,
    profiles: Vec<Arc<RoutingProfile>>,
}

impl RoutingConfig {
    pub fn from_json_str(json: &str, registry: Arc<RuleRegistry>) -> Result<Self> {
        let document: ConfigDocument = serde_json::from_str(json)?;
        Self::from_document(document, registry)
    }

    pub fn from_path<P: AsRef<Path>>(path: P, registry: Arc<RuleRegistry>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let document: ConfigDocument = serde_json::from_reader(BufReader::new(file))?;
        Self::from_document(document, registry)
    }

    fn from_document(document: ConfigDocument, registry: Arc<RuleRegistry>) -> Result<Self> {
        let mut profiles: Vec<Arc<RoutingProfile>> = Vec::with_capacity(document.profiles.len());
        for def in document.profiles {
            if profiles.iter().any(|p| p.name() == def.name) {
                return Err(ConfigError::DuplicateProfile(def.name));
            }
            let profile = build_profile(def, Arc::clone(&registry))?;
            tracing::debug!(
                profile = profile.name(),
                parameters = profile.parameters().count(),
                "loaded routing profile"
            );
            profiles.push(Arc::new(profile));
        }

        if let Some(name) = &document.default_profile {
            if !profiles.iter().any(|p| p.name() == name.as_str()) {
                return Err(ConfigError::UnknownDefaultProfile(name.clone()));
            }
        }

        Ok(Self {
            attributes: document.attributes,
            default_profile: document.default_profile,
            profiles,
        })
    }

    pub fn profile(&self, name: &str) -> Option<Arc<RoutingProfile>> {
        self.profiles.iter().find(|p| p.name() == name).cloned()
    }

    /// The declared default, else the first profile of the document.
    pub fn default_profile(&self) -> Option<Arc<RoutingProfile>> {
        match &self.default_profile {
            Some(name) => self.profile(name),
            None => self.profiles.first().cloned(),
        }
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name())
    }

    /// Document-level attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Attribute of `profile`, falling back to the document-level one.
    pub fn resolve_attribute(&self, profile: &str, key: &str) -> Option<&str> {
        self.profiles
            .iter()
            .find(|p| p.name() == profile)
            .and_then(|p| p.attribute(key))
            .or_else(|| self.attribute(key))
    }
}

fn build_profile(def: ProfileDef, registry: Arc<RuleRegistry>) -> Result<RoutingProfile> {
    let mut profile = RoutingProfile::new(&def.name, registry);
    for (key, value) in &def.attributes {
        profile.add_attribute(key, value);
    }

    for p in def.parameters {
        let kind = match p.kind {
            ParameterKindDef::Boolean => ParameterKind::Boolean,
            ParameterKindDef::Numeric => ParameterKind::Numeric {
                values: p.values,
                descriptions: p.value_descriptions,
            },
        };
        profile.add_parameter(Parameter {
            id: p.id,
            name: p.name,
            description: p.description,
            kind,
            default: p.default,
        });
    }

    for (name, expressions) in def.rulesets {
        let kind: RulesetKind = name.parse().map_err(|_| ConfigError::UnknownRuleset {
            profile: def.name.clone(),
            name: name.clone(),
        })?;
        for e in expressions {
            let expression = build_expression(&def.name, e, profile.registry())?;
            profile.add_expression(kind, expression);
        }
    }
    Ok(profile)
}

fn build_expression(profile: &str, def: ExpressionDef, registry: &RuleRegistry) -> Result<RuleExpression> {
    let invalid = |source: RuleParseError| ConfigError::InvalidLiteral {
        profile: profile.to_string(),
        source,
    };

    let mut builder = RuleExpression::builder(registry);
    for t in &def.tags {
        builder = if t.not {
            builder.exclude(&t.tag, &t.value)
        } else {
            builder.require(&t.tag, &t.value)
        };
    }
    for param in &def.params {
        builder = builder.param(ParamRef::parse(param));
    }
    for c in def.conditions {
        let op: Comparison = c.op.parse().map_err(|_| ConfigError::UnknownComparison {
            profile: profile.to_string(),
            op: c.op.clone(),
        })?;
        builder = builder.condition(Condition {
            op,
            left: Operand::parse(&c.left, c.value_type).map_err(invalid)?,
            right: Operand::parse(&c.right, c.value_type).map_err(invalid)?,
            value_type: c.value_type,
        });
    }
    let result = Operand::parse(&def.value, def.value_type).map_err(invalid)?;
    Ok(builder.result(result, def.value_type).build())
}
