//! crm-core — shared model for the placement engine and the transition executor.
//!
//! The placement engine (`crm-policy`) produces a [`TransitionGraph`] and the
//! executor (`crm-transition`) consumes it. Both sides agree on the types in
//! this crate and nothing else.
//!
//! # Components
//!
//! - **`score`** — Node scores with saturating ±INFINITY arithmetic
//! - **`types`** — Identifiers, action kinds, completion actions
//! - **`graph`** — Transition graph model (synapses, actions, abort protocol)
//! - **`config`** — Engine tuning loaded from TOML

pub mod config;
pub mod error;
pub mod graph;
pub mod score;
pub mod types;

pub use config::{EngineConfig, ExecutorConfig, PlacementConfig, TieBreak};
pub use error::{ConfigError, GraphError, GraphResult};
pub use graph::{ActionTarget, GraphAction, Synapse, TransitionGraph};
pub use score::Score;
pub use types::*;
