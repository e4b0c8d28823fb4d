//! crm-transition — executes transition graphs.
//!
//! # Components
//!
//! - **`executor`** — Pure state machine over one graph: dispatch, confirm, abort
//! - **`driver`** — Tokio loop feeding the executor from a channel and a timer

pub mod driver;
pub mod error;
pub mod executor;

pub use driver::{ActionDispatcher, CompletionSink, DriverHandle, LogSink, TransitionDriver};
pub use error::{TransitionError, TransitionResult};
pub use executor::{ActionRequest, Effect, Event, GraphCompletion, TransitionExecutor, TransitionState};
