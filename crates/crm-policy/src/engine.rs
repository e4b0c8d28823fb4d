//! The placement engine: one scheduling cycle from documents to graph.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crm_core::{EngineConfig, TransitionGraph};

use crate::document::{ClusterConfig, ClusterStatus};
use crate::error::PolicyResult;
use crate::materialize::materialize;
use crate::placement::{allocate, plan_actions};
use crate::role::Role;
use crate::working_set::WorkingSet;

/// Output of one scheduling cycle.
#[derive(Debug, Clone)]
pub struct Transition {
    pub graph: TransitionGraph,
    /// Chosen node per resource leaf; `None` when unplaced.
    pub placements: BTreeMap<String, Option<String>>,
    /// Role per resource leaf after the transition.
    pub roles: BTreeMap<String, Role>,
}

impl Transition {
    pub fn node_of(&self, resource: &str) -> Option<&str> {
        self.placements.get(resource).and_then(|n| n.as_deref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    config: EngineConfig,
}

impl PolicyEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every stage against `ws`. The working set is left allocated so
    /// the caller can inspect it before releasing it.
    pub fn compute(&self, ws: &mut WorkingSet) -> PolicyResult<Transition> {
        let colors = allocate(ws, &self.config.placement);
        debug!(colors = colors.len(), "placement decided");

        let plan = plan_actions(ws);
        let graph = materialize(ws, &plan)?;

        let mut placements = BTreeMap::new();
        let mut roles = BTreeMap::new();
        for leaf in ws.leaves() {
            let r = ws.resource(leaf);
            placements.insert(r.id.clone(), r.allocated_to.map(|n| ws.node(n).uname.clone()));
            roles.insert(r.id.clone(), r.next_role);
        }

        info!(
            graph = graph.id,
            actions = graph.num_actions,
            synapses = graph.num_synapses,
            placed = placements.values().filter(|n| n.is_some()).count(),
            "transition computed"
        );
        Ok(Transition {
            graph,
            placements,
            roles,
        })
    }
}

/// Unpack, compute and release in one call.
pub fn compute_transition(
    config: Option<&ClusterConfig>,
    status: &ClusterStatus,
    engine: &EngineConfig,
) -> PolicyResult<Transition> {
    let mut ws = WorkingSet::unpack(config, status)?;
    let transition = PolicyEngine::new(engine.clone()).compute(&mut ws);
    ws.release();
    transition
}
