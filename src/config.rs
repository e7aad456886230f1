//! Command line configuration
//!
//! Settings come from the environment and can be overridden by flags:
//!
//! - `NUMSCRIPT_LOG`: log filter, `RUST_LOG` syntax (default `warn`)
//! - `NUMSCRIPT_OUTPUT`: `pretty` or `json`
//! - `NUMSCRIPT_TRACE`: log every executed instruction

use serde::{Deserialize, Serialize};
use std::env;

pub const LOG_ENV: &str = "NUMSCRIPT_LOG";
pub const OUTPUT_ENV: &str = "NUMSCRIPT_OUTPUT";
pub const TRACE_ENV: &str = "NUMSCRIPT_TRACE";

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub log_filter: String,
    pub output: OutputFormat,
    pub trace: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Colored text for terminals
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }

    pub fn is_json(&self) -> bool {
        *self == OutputFormat::Json
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            output: OutputFormat::Pretty,
            trace: false,
        }
    }
}

impl Config {
    /// Read the configuration from the process environment
    ///
    /// `RUST_LOG` is used when `NUMSCRIPT_LOG` is not set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        Config {
            log_filter: lookup(LOG_ENV)
                .or_else(|| lookup("RUST_LOG"))
                .filter(|filter| !filter.trim().is_empty())
                .unwrap_or(defaults.log_filter),
            output: lookup(OUTPUT_ENV)
                .map(|value| OutputFormat::from_str(&value))
                .unwrap_or(defaults.output),
            trace: lookup(TRACE_ENV).map_or(defaults.trace, |value| parse_flag(&value)),
        }
    }

    /// Apply command line flags on top of the environment
    pub fn with_flags(mut self, verbose: bool, json: bool, trace: bool) -> Self {
        if verbose {
            self.log_filter = "debug".to_string();
        }
        if json {
            self.output = OutputFormat::Json;
        }
        if trace {
            self.trace = true;
        }
        if self.trace {
            self.log_filter = format!("{},numscript::vm=trace", self.log_filter);
        }
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
    }

    #[test]
    fn test_config_from_env_vars() {
        let config = Config::from_lookup(lookup(&[
            ("RUST_LOG", "info"),
            ("NUMSCRIPT_OUTPUT", "JSON"),
            ("NUMSCRIPT_TRACE", "yes"),
        ]));
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.output, OutputFormat::Json);
        assert!(config.trace);

        let config = Config::from_lookup(lookup(&[("RUST_LOG", "info"), ("NUMSCRIPT_LOG", "error")]));
        assert_eq!(config.log_filter, "error");
    }

    #[test]
    fn test_config_flags_override() {
        let config = Config::default().with_flags(true, true, true);
        assert_eq!(config.log_filter, "debug,numscript::vm=trace");
        assert!(config.output.is_json());
    }
}
