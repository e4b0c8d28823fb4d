//! Placement pipeline.
//!
//! Each stage runs to completion over the whole working set before the
//! next one starts.
//!
//! # Components
//!
//! - **`scorer`** — Base scores, locations, quorum policy, stickiness
//! - **`colocation`** — Must/must-not propagation into colocation sets
//! - **`colors`** — Color building and node assignment
//! - **`cluster`** — Fencing and shutdown actions
//! - **`ordering`** — User orderings as plan edges

pub mod cluster;
pub mod colocation;
pub mod colors;
pub mod ordering;
pub mod scorer;

use tracing::debug;

use crm_core::PlacementConfig;

use crate::actions::ActionPlan;
use crate::working_set::WorkingSet;

pub use colocation::ColocationLinks;
pub use colors::Color;

/// Decide where every resource goes and which role it plays there.
pub fn allocate(ws: &mut WorkingSet, config: &PlacementConfig) -> Vec<Color> {
    scorer::init_scores(ws);
    scorer::apply_locations(ws);
    scorer::apply_resource_policy(ws);
    scorer::apply_quorum_policy(ws);
    let links = colocation::apply_colocations(ws);
    scorer::add_stickiness(ws);

    colors::pin_unmanaged(ws);
    let mut colors = colors::build_colors(ws, &links, &config.tie_break);
    colors::assign_colors(ws, &mut colors, &links, &config.tie_break);

    for top in ws.top_level.clone() {
        let alloc = ws.resource(top).alloc();
        alloc.assign_roles(ws, top);
    }
    debug!(colors = colors.len(), "allocation finished");
    colors
}

/// Build the action plan for an allocated working set.
pub fn plan_actions(ws: &WorkingSet) -> ActionPlan {
    let mut plan = ActionPlan::new();
    for &top in &ws.top_level {
        ws.resource(top).alloc().create_actions(ws, top, &mut plan);
    }
    for &top in &ws.top_level {
        ws.resource(top).alloc().internal_constraints(ws, top, &mut plan);
    }
    cluster::schedule_node_actions(ws, &mut plan);
    ordering::apply_orderings(ws, &mut plan);
    plan.update_runnable();
    debug!(actions = plan.actions.len(), edges = plan.edges.len(), "action plan built");
    plan
}
