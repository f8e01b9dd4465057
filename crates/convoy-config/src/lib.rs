//! # Convoy Config
//!
//! Configuration records for the convoy orchestrator: trigger hook rules,
//! external plugin declarations, and observability settings, loaded from a
//! single YAML file.

mod loader;

pub use loader::{load_config, validate_config, ConfigError};

use serde::{Deserialize, Serialize};

fn default_version() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Observability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Trigger hooks configured around one named pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRule {
    /// Stable name of the middleware stage the hooks wrap.
    pub stage: String,
    /// Messages announced before the stage runs.
    #[serde(default)]
    pub pre: Vec<String>,
    /// Messages announced after the stage returns.
    #[serde(default)]
    pub post: Vec<String>,
}

/// Declaration of an externally provided plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    /// Filesystem path the plugin is discovered at, when not builtin.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Free-form plugin options.
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Root configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub triggers: Vec<TriggerRule>,
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            observability: ObservabilityConfig::default(),
            triggers: Vec::new(),
            plugins: Vec::new(),
        }
    }
}

impl Config {
    /// Trigger rule for a stage name, if one is configured.
    pub fn trigger_rule(&self, stage: &str) -> Option<&TriggerRule> {
        self.triggers.iter().find(|r| r.stage == stage)
    }
}
