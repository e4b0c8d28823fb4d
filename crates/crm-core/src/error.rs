//! Error types for the shared model.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ActionId, SynapseId};

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Structural problems in a transition graph.
///
/// These indicate a bug in whoever built the graph, not a runtime
/// condition; a graph that fails validation is never executed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("action {0} appears more than once")]
    DuplicateAction(ActionId),

    #[error("synapse id {0} appears more than once")]
    DuplicateSynapse(SynapseId),

    #[error("synapse {synapse} references unknown input action {input}")]
    DanglingInput { synapse: SynapseId, input: ActionId },

    #[error("synapse {synapse} lists its own action {input} as an input")]
    SelfInput { synapse: SynapseId, input: ActionId },

    #[error("dependency cycle through synapse {synapse}")]
    Cycle { synapse: SynapseId },

    #[error("graph counters disagree: {field} is {recorded}, counted {counted}")]
    CounterMismatch {
        field: &'static str,
        recorded: u32,
        counted: u32,
    },

    #[error("unknown action: {0}")]
    UnknownAction(ActionId),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

/// Errors raised while loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),
}
