//! Optimizer configuration.
//!
//! Defaults are what a release build runs with. Environment overrides:
//!
//! | Variable                  | Field                               |
//! |---------------------------|-------------------------------------|
//! | `EMBER_ARC_OPTS`          | `enable_arc_opts` (bool)            |
//! | `EMBER_LOOP_ARC`          | `enable_loop_arc` (bool)            |
//! | `EMBER_RC_IDENTITY_CACHE` | `rc_identity.cache_capacity`        |
//! | `EMBER_RC_IDENTITY_DEPTH` | `rc_identity.max_recursion_depth`   |
//!
//! Booleans accept `1`/`0`, `true`/`false`, `on`/`off` (case-insensitive).

use crate::rc_identity::RcIdentityConfig;

/// An environment override could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {var}: expected {expected}")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArcOptConfig {
    /// Master switch; when off the pass leaves every function untouched.
    pub enable_arc_opts: bool,
    /// Use the loop-region evaluator instead of the basic-block one.
    pub enable_loop_arc: bool,
    pub rc_identity: RcIdentityConfig,
}

impl Default for ArcOptConfig {
    fn default() -> Self {
        Self {
            enable_arc_opts: true,
            enable_loop_arc: true,
            rc_identity: RcIdentityConfig::default(),
        }
    }
}

impl ArcOptConfig {
    /// Defaults with the `EMBER_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults with overrides taken from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup("EMBER_ARC_OPTS") {
            config.enable_arc_opts = parse_bool("EMBER_ARC_OPTS", &value)?;
        }
        if let Some(value) = lookup("EMBER_LOOP_ARC") {
            config.enable_loop_arc = parse_bool("EMBER_LOOP_ARC", &value)?;
        }
        if let Some(value) = lookup("EMBER_RC_IDENTITY_CACHE") {
            config.rc_identity.cache_capacity = parse_count("EMBER_RC_IDENTITY_CACHE", &value)?;
        }
        if let Some(value) = lookup("EMBER_RC_IDENTITY_DEPTH") {
            config.rc_identity.max_recursion_depth =
                parse_count("EMBER_RC_IDENTITY_DEPTH", &value)?;
        }
        Ok(config)
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_owned(),
            expected: "a boolean",
        }),
    }
}

fn parse_count(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_owned(),
            expected: "a positive integer",
        }),
    }
}
