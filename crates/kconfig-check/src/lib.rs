pub mod check;
pub mod error;
pub mod expect;
pub mod manifest;
pub mod parse;

pub use check::{CheckConfig, CheckInputs, CheckReport, MergedDefconfig, Mismatch, Severity};
pub use error::{Error, Result};
pub use parse::{ConfigFormat, ConfigValue, ParsedConfig, parse_config};
