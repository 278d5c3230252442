//! Runner settings

use anyhow::{Context, Result};
use conduit_script::SessionOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runner settings, loaded from an optional JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub log_level: String,
    pub session: SessionOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            session: SessionOptions {
                console: true,
                ..SessionOptions::default()
            },
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn level(&self) -> Result<tracing::Level> {
        self.log_level
            .parse()
            .with_context(|| format!("unknown log level '{}'", self.log_level))
    }
}
