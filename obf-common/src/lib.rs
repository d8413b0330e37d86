//! Common types for the OBF routing toolkit

pub mod error;
pub mod geo;
pub mod units;

pub use error::{DecodeError, DecodeResult, ObfError, Result, RuleParseError};
pub use geo::{Area31, Point31};
