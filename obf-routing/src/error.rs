//! Profile configuration errors

use std::io;
use thiserror::Error;

use obf_common::RuleParseError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid profile configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("profile '{profile}': unknown ruleset '{name}'")]
    UnknownRuleset { profile: String, name: String },

    #[error("profile '{profile}': unknown comparison '{op}'")]
    UnknownComparison { profile: String, op: String },

    #[error("profile '{profile}': invalid literal: {source}")]
    InvalidLiteral {
        profile: String,
        #[source]
        source: RuleParseError,
    },

    #[error("profile '{0}' is defined twice")]
    DuplicateProfile(String),

    #[error("default profile '{0}' is not defined")]
    UnknownDefaultProfile(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
