//! Runtime configuration: HTTP client settings and the debug trace switch.
//!
//! Resolution order: explicit value (CLI flag) → `PURIFIER_*` environment
//! variable → default.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Desktop Chrome, so pages serve their regular markup.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/131.0.0.0 Safari/537.36";

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Whole-request timeout for `request_get`.
    pub timeout_ms: u64,
    pub user_agent: String,
    pub max_redirects: usize,
    /// Print a trace line before every evaluated node.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            debug: false,
        }
    }
}

impl Config {
    /// Defaults overridden by `PURIFIER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = parse_var(&lookup, "PURIFIER_TIMEOUT_MS") {
            config.timeout_ms = ms;
        }
        if let Some(ua) = lookup("PURIFIER_USER_AGENT").filter(|ua| !ua.trim().is_empty()) {
            config.user_agent = ua;
        }
        if let Some(n) = parse_var(&lookup, "PURIFIER_MAX_REDIRECTS") {
            config.max_redirects = n;
        }
        if let Some(flag) = lookup("PURIFIER_DEBUG") {
            config.debug = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.max_redirects, 5);
        assert!(!config.debug);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PURIFIER_TIMEOUT_MS", "1500"),
            ("PURIFIER_USER_AGENT", "purifier-test/1.0"),
            ("PURIFIER_MAX_REDIRECTS", "0"),
            ("PURIFIER_DEBUG", "true"),
        ]));
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.user_agent, "purifier-test/1.0");
        assert_eq!(config.max_redirects, 0);
        assert!(config.debug);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("PURIFIER_TIMEOUT_MS", "soon"),
            ("PURIFIER_USER_AGENT", "  "),
            ("PURIFIER_DEBUG", "0"),
        ]));
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(!config.debug);
    }
}
