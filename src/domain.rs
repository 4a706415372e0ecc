//! Domain models for taint analysis.
//!
//! This module contains the rules that drive the analysis, the methods
//! they are applied to, and configuration.

mod config;
pub use config::{Config, ConfigError, DEFAULT_CONFIG_FILE};

/// Methods and what was found in them.
pub mod method;
pub use method::{Method, Origin, OriginKind, Taint};

mod path;
pub use path::ExecutionPath;

/// Source, sink and sanitizer rules.
pub mod rule;
pub use rule::{ParameterPattern, Rule, RuleMethod, Sanitizer, TAINT_MARKER};

/// Rule collections per module.
pub mod ruleset;
pub use ruleset::{RuleRef, Ruleset, RulesetError};
