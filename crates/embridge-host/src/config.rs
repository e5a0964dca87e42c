//! Host configuration
//!
//! Engine limits and the initial location, read from `EMBRIDGE_*`
//! environment variables or a JSON document.

use serde::Deserialize;

use crate::HostError;

/// Default engine heap limit (32 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 32 * 1024 * 1024;

/// Default engine stack limit (1 MiB).
pub const DEFAULT_MAX_STACK_SIZE: usize = 1024 * 1024;

/// Location the environment starts at before any navigation.
pub const DEFAULT_INITIAL_URL: &str = "about:blank";

/// Settings for a [`HostEnvironment`](crate::HostEnvironment)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Engine heap limit in bytes
    pub memory_limit: usize,
    /// Engine stack limit in bytes
    pub max_stack_size: usize,
    /// Location before the first navigation
    pub initial_url: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            initial_url: DEFAULT_INITIAL_URL.to_string(),
        }
    }
}

impl HostConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, HostError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, falling back to defaults for
    /// missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HostError> {
        let mut config = Self::default();
        if let Some(raw) = lookup("EMBRIDGE_MEMORY_LIMIT") {
            config.memory_limit = parse_bytes("EMBRIDGE_MEMORY_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("EMBRIDGE_MAX_STACK_SIZE") {
            config.max_stack_size = parse_bytes("EMBRIDGE_MAX_STACK_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("EMBRIDGE_INITIAL_URL") {
            config.initial_url = raw;
        }
        Ok(config)
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, HostError> {
        serde_json::from_str(text).map_err(|e| HostError::Config(e.to_string()))
    }
}

fn parse_bytes(key: &str, raw: &str) -> Result<usize, HostError> {
    raw.trim()
        .parse()
        .map_err(|_| HostError::Config(format!("{key} must be a byte count, got {raw:?}")))
}
