//! Engine tuning loaded from TOML.
//!
//! Cluster-wide options travel inside the configuration document; this file
//! only covers knobs that belong to the engine itself.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub placement: PlacementConfig,
    pub executor: ExecutorConfig,
}

/// One link in the node/color tie-break chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Higher resource priority wins.
    Priority,
    /// Node with fewer resources already allocated wins.
    FewestResources,
    /// Lexical id order.
    Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub tie_break: Vec<TieBreak>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            tie_break: vec![TieBreak::Priority, TieBreak::FewestResources, TieBreak::Id],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Force-confirm every in-flight action as soon as one action fails,
    /// instead of waiting for their outcomes.
    pub confirm_in_flight_on_failure: bool,
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
