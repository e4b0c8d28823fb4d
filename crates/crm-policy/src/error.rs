//! Policy engine error types.

use crm_core::GraphError;
use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Fatal problems while building the working set.
///
/// Anything that can be recovered by dropping a single node, resource or
/// constraint is logged instead and never surfaces here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnpackError {
    #[error("no configuration document supplied")]
    MissingConfiguration,

    #[error("status lists {listed} node(s) but none match the configuration")]
    StatusNotCorrelated { listed: usize },

    #[error("invalid resource {id}: {reason}")]
    InvalidResource { id: String, reason: String },

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// Errors that can occur while computing a transition.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unpack error: {0}")]
    Unpack(#[from] UnpackError),

    #[error("materialized graph rejected: {0}")]
    Materialize(#[from] GraphError),
}
