//! Contract context configuration.
//!
//! Reads configuration from environment variables:
//! - `CONTRACTLIB_ENFORCE_WRAPPED`: run wrapped contract blocks (default: off)
//! - `CONTRACTLIB_MAX_SCOPE_DEPTH`: maximum entered frames (default: 256)
//! - `CONTRACTLIB_LEAK_WARNING_THRESHOLD`: warn when this many scopes hold
//!   old values, `0` disables the warning (default: 1024)

use std::num::NonZeroUsize;

use thiserror::Error;

pub const ENFORCE_WRAPPED_VAR: &str = "CONTRACTLIB_ENFORCE_WRAPPED";
pub const MAX_SCOPE_DEPTH_VAR: &str = "CONTRACTLIB_MAX_SCOPE_DEPTH";
pub const LEAK_WARNING_THRESHOLD_VAR: &str = "CONTRACTLIB_LEAK_WARNING_THRESHOLD";

/// Configuration for a [`ContractContext`](crate::context::ContractContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractConfig {
    /// Whether wrapped contract blocks run from the start.
    pub enforce_wrapped: bool,
    /// Maximum number of entered frames. Default: 256.
    pub max_scope_depth: usize,
    /// Warn once the number of remembered scopes exceeds this. `None`
    /// disables the warning; `0` from the environment maps to `None`.
    pub leak_warning_threshold: Option<NonZeroUsize>,
}

impl Default for ContractConfig {
    fn default() -> Self {
        ContractConfig {
            enforce_wrapped: false,
            max_scope_depth: 256,
            leak_warning_threshold: NonZeroUsize::new(1024),
        }
    }
}

/// An environment variable held a value that could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value for {var}: '{value}' (expected {expected})")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ContractConfig {
    /// Loads configuration from the process environment, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ContractConfig::default();

        if let Some(raw) = lookup(ENFORCE_WRAPPED_VAR) {
            config.enforce_wrapped = parse_flag(ENFORCE_WRAPPED_VAR, &raw)?;
        }
        if let Some(raw) = lookup(MAX_SCOPE_DEPTH_VAR) {
            config.max_scope_depth = parse_count(MAX_SCOPE_DEPTH_VAR, &raw)?;
        }
        if let Some(raw) = lookup(LEAK_WARNING_THRESHOLD_VAR) {
            config.leak_warning_threshold =
                NonZeroUsize::new(parse_count(LEAK_WARNING_THRESHOLD_VAR, &raw)?);
        }

        Ok(config)
    }
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError {
            var,
            value: raw.to_string(),
            expected: "a boolean (1/0, true/false, yes/no, on/off)",
        }),
    }
}

fn parse_count(var: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError {
        var,
        value: raw.to_string(),
        expected: "a non-negative integer",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ContractConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ContractConfig::default());
        assert!(!config.enforce_wrapped);
    }

    #[test]
    fn reads_all_variables() {
        let config = ContractConfig::from_lookup(lookup(&[
            (ENFORCE_WRAPPED_VAR, "Yes"),
            (MAX_SCOPE_DEPTH_VAR, " 32 "),
            (LEAK_WARNING_THRESHOLD_VAR, "0"),
        ]))
        .unwrap();
        assert!(config.enforce_wrapped);
        assert_eq!(config.max_scope_depth, 32);
        assert_eq!(config.leak_warning_threshold, None);
    }

    #[test]
    fn leak_threshold_from_environment() {
        let config =
            ContractConfig::from_lookup(lookup(&[(LEAK_WARNING_THRESHOLD_VAR, "1")])).unwrap();
        assert_eq!(config.leak_warning_threshold, NonZeroUsize::new(1));
        assert_eq!(
            ContractConfig::default().leak_warning_threshold.map(NonZeroUsize::get),
            Some(1024)
        );
    }

    #[test]
    fn rejects_bad_flag() {
        let err = ContractConfig::from_lookup(lookup(&[(ENFORCE_WRAPPED_VAR, "maybe")]))
            .unwrap_err();
        assert_eq!(err.var, ENFORCE_WRAPPED_VAR);
        assert!(err.to_string().contains("'maybe'"));
    }

    #[test]
    fn rejects_bad_count() {
        let err = ContractConfig::from_lookup(lookup(&[(MAX_SCOPE_DEPTH_VAR, "-1")]))
            .unwrap_err();
        assert_eq!(err.var, MAX_SCOPE_DEPTH_VAR);
    }
}
