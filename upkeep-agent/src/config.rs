//! Configuration management for the agent.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use upkeep_common::LogFormat;
use upkeep_core::UpdateConfig;

use crate::cli::Args;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/upkeep/agent.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Update service and controller settings
    pub updates: UpdateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            updates: UpdateConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse config file")
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref level) = args.log_level {
            self.log_level = level.clone();
        }

        if args.json_logs {
            self.log_format = LogFormat::Json;
        }

        if let Some(ref server) = args.server {
            self.updates.server_url = server.clone();
        }

        if let Some(ref interval) = args.poll_interval {
            self.updates.poll_interval = interval.clone();
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.updates
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid update configuration")
    }
}
