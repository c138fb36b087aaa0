//! Configuration file loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use simtemp_session::{SessionConfig, StreamConfig};
use std::path::Path;

/// Top-level configuration file. Both sections are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub session: SessionConfig,
    pub stream: StreamConfig,
}

impl CliConfig {
    /// Load from `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}
