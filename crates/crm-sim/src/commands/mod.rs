pub mod plan;
pub mod run;

use anyhow::Context;
use crm_core::EngineConfig;
use crm_policy::{ClusterConfig, ClusterStatus, WorkingSet, load_document};

use crate::Inputs;

/// Load every input document and unpack the working set.
pub fn load(inputs: &Inputs) -> anyhow::Result<(WorkingSet, EngineConfig)> {
    let config: ClusterConfig = load_document(&inputs.config)
        .with_context(|| format!("loading configuration {}", inputs.config.display()))?;
    let status: ClusterStatus =
        load_document(&inputs.status).with_context(|| format!("loading status {}", inputs.status.display()))?;
    let engine = match &inputs.engine {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let ws = WorkingSet::unpack(Some(&config), &status)?;
    Ok((ws, engine))
}
