//! crm-policy — the placement engine.
//!
//! Turns a configuration document plus live cluster status into a
//! [`TransitionGraph`](crm_core::TransitionGraph): where each resource
//! should run, in which role, and the ordered actions that get it there.
//!
//! # Components
//!
//! - **`document`** — Configuration and status documents (serde)
//! - **`working_set`** — Per-cycle model of nodes, resources and constraints
//! - **`resource`** — Resource variants behind capability tables
//! - **`placement`** — Scores, colocation, colors, orderings
//! - **`actions`** — Action plan with cycle-free ordering edges
//! - **`materialize`** — Action plan to synapses
//! - **`engine`** — The whole cycle in one call

pub mod actions;
pub mod constraints;
pub mod document;
pub mod engine;
pub mod error;
pub mod materialize;
pub mod node;
pub mod placement;
pub mod resource;
pub mod role;
pub mod working_set;

pub use document::{ClusterConfig, ClusterOptions, ClusterStatus, NoQuorumPolicy, load_document};
pub use engine::{PolicyEngine, Transition, compute_transition};
pub use error::{PolicyError, PolicyResult, UnpackError};
pub use node::{Node, NodeIdx};
pub use resource::{Resource, RscIdx, Variant};
pub use role::Role;
pub use working_set::WorkingSet;
