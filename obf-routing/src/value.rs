//! Numeric interpretation of tag and parameter values

use std::fmt;
use std::str::FromStr;

use obf_common::units;
use obf_common::RuleParseError;
use serde::Deserialize;

/// How a raw string becomes a number inside an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Signed number the string starts with.
    #[default]
    Number,
    /// km/h (or mph) to m/s.
    Speed,
    /// Metric tons.
    Weight,
    /// Metres.
    Length,
}

impl ValueType {
    pub fn label(self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::Speed => "speed",
            ValueType::Weight => "weight",
            ValueType::Length => "length",
        }
    }

    pub fn parse(self, raw: &str) -> Result<f64, RuleParseError> {
        let parsed = match self {
            ValueType::Number => units::parse_float(raw),
            ValueType::Speed => units::parse_speed(raw),
            ValueType::Weight => units::parse_weight(raw),
            ValueType::Length => units::parse_length(raw),
        };
        parsed.ok_or_else(|| RuleParseError::InvalidNumber {
            value: raw.to_string(),
            expected: self.label(),
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" | "" => Ok(ValueType::Number),
            "speed" => Ok(ValueType::Speed),
            "weight" => Ok(ValueType::Weight),
            "length" => Ok(ValueType::Length),
            other => Err(format!("unknown value type '{other}'")),
        }
    }
}
