//! Debugger configuration
//!
//! Loaded from a JSON file, then overridden by `SCRIPT_DEBUGGER_*`
//! environment variables.

use crate::debugger::BreakpointType;
use crate::error::{DebugError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "SCRIPT_DEBUGGER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Whether a freshly created debugger starts enabled
    pub enabled: bool,
    /// Breakpoint types a freshly created debugger starts with
    pub default_types: BreakpointType,
    /// Per-attempt wait for an interpreter hard lock
    pub lock_timeout_ms: u64,
    /// Attempts made for an interpreter hard lock
    pub lock_retries: u32,
    /// Per-attempt wait for the interactive loop token
    pub loop_timeout_ms: u64,
    /// Attempts made for the interactive loop token
    pub loop_retries: u32,
    /// Pause after a failed attempt to cancel a pending console read
    pub loop_retry_sleep_ms: u64,
    /// Complaints retained per interpreter
    pub max_complaints: usize,
    pub prompt: String,
    pub debug_prompt: String,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_types: BreakpointType::DEFAULT,
            lock_timeout_ms: 1000,
            lock_retries: 3,
            loop_timeout_ms: 250,
            loop_retries: 8,
            loop_retry_sleep_ms: 25,
            max_complaints: 100,
            prompt: "% ".to_string(),
            debug_prompt: "(debug) % ".to_string(),
        }
    }
}

impl DebuggerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Defaults, then the optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable source (the process environment in
    /// production, a map in tests).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("LOCK_TIMEOUT_MS") {
            self.lock_timeout_ms = parse_env("LOCK_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("LOCK_RETRIES") {
            self.lock_retries = parse_env("LOCK_RETRIES", &v)?;
        }
        if let Some(v) = get("LOOP_TIMEOUT_MS") {
            self.loop_timeout_ms = parse_env("LOOP_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("LOOP_RETRIES") {
            self.loop_retries = parse_env("LOOP_RETRIES", &v)?;
        }
        if let Some(v) = get("ENABLED") {
            self.enabled = crate::parser::parse_bool(&v)
                .ok_or_else(|| DebugError::Config(format!("ENABLED: expected boolean, got \"{}\"", v)))?;
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn loop_timeout(&self) -> Duration {
        Duration::from_millis(self.loop_timeout_ms)
    }

    pub fn loop_retry_sleep(&self) -> Duration {
        Duration::from_millis(self.loop_retry_sleep_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DebugError::Config(format!("{}{}: bad value \"{}\"", ENV_PREFIX, name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_file_values() {
        let mut config = DebuggerConfig::default();
        let env: HashMap<&str, &str> = [
            ("SCRIPT_DEBUGGER_LOCK_RETRIES", "7"),
            ("SCRIPT_DEBUGGER_ENABLED", "false"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.lock_retries, 7);
        assert!(!config.enabled);
        assert_eq!(config.loop_retries, DebuggerConfig::default().loop_retries);
    }

    #[test]
    fn bad_env_value_is_config_error() {
        let mut config = DebuggerConfig::default();
        let err = config
            .apply_env(|k| (k == "SCRIPT_DEBUGGER_LOOP_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, DebugError::Config(_)));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: DebuggerConfig =
            serde_json::from_str(r#"{ "lock_timeout_ms": 5, "default_types": ["Demand", "Error"] }"#)
                .unwrap();
        assert_eq!(config.lock_timeout_ms, 5);
        assert_eq!(
            config.default_types,
            BreakpointType::DEMAND | BreakpointType::ERROR
        );
        assert_eq!(config.prompt, "% ");
    }
}
