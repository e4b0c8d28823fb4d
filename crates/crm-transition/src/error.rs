//! Executor error types.

use crm_core::GraphError;
use thiserror::Error;

/// Result type alias for executor operations.
pub type TransitionResult<T> = Result<T, TransitionError>;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("graph rejected: {0}")]
    GraphRejected(#[from] GraphError),

    #[error("transition already finished")]
    Finished,

    #[error("driver event channel closed")]
    ChannelClosed,
}
