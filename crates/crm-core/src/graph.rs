//! Transition graph model.
//!
//! A graph is a list of synapses. Each synapse owns a set of actions that
//! may run together and lists, by id, the input actions (owned by other
//! synapses) that must be confirmed before its actions may be dispatched.
//!
//! The graph is plain data: it serializes to JSON and back so it can be
//! handed to a remote executor or logged. Execution state (the per-action
//! status flags and the abort fields) lives on the same structure, so a
//! partially executed graph can be dumped and inspected too.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{GraphError, GraphResult};
use crate::score::Score;
use crate::types::{ActionId, ActionKind, CompletionAction, NodeName, ResourceId, SynapseId};

/// Node an action is directed at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionTarget {
    pub uname: NodeName,
    pub uuid: String,
}

/// One executable step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphAction {
    pub id: ActionId,
    /// Task name (`start`, `stop`, `monitor`, `do_shutdown`, ...).
    pub task: String,
    /// Operation key, `{resource}_{task}_{interval}` for resource actions.
    pub key: String,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ActionTarget>,
    pub timeout_ms: u64,
    /// Extra attributes handed to the executing party verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,

    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub failed: bool,
    /// A timed-out result was recorded in the cluster status on the
    /// action's behalf.
    #[serde(default)]
    pub sent_update: bool,
}

impl GraphAction {
    pub fn new(id: ActionId, task: &str, key: &str, kind: ActionKind, timeout_ms: u64) -> Self {
        Self {
            id,
            task: task.to_string(),
            key: key.to_string(),
            kind,
            resource: None,
            target: None,
            timeout_ms,
            meta: BTreeMap::new(),
            executed: false,
            confirmed: false,
            failed: false,
            sent_update: false,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.kind == ActionKind::Pseudo
    }

    /// Human-readable progress label, as used in graph dumps.
    pub fn state_label(&self) -> &'static str {
        if self.failed {
            "Failed"
        } else if self.confirmed {
            "Completed"
        } else if self.executed {
            "In-flight"
        } else if self.sent_update {
            "Update sent"
        } else {
            "Pending"
        }
    }

    fn reset_status(&mut self) {
        self.executed = false;
        self.confirmed = false;
        self.failed = false;
        self.sent_update = false;
    }
}

/// An atomic group of actions gated by a set of inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synapse {
    pub id: SynapseId,
    #[serde(default)]
    pub priority: Score,
    pub actions: Vec<GraphAction>,
    /// Actions that must be confirmed before this synapse may fire.
    #[serde(default)]
    pub inputs: Vec<ActionId>,
    /// Optional orderings, kept for diagnostics only. Never gate dispatch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisory: Vec<ActionId>,
}

impl Synapse {
    /// All actions dispatched.
    pub fn executed(&self) -> bool {
        self.actions.iter().all(|a| a.executed)
    }

    /// All actions confirmed.
    pub fn confirmed(&self) -> bool {
        self.actions.iter().all(|a| a.confirmed)
    }
}

/// The full set of synapses for one scheduling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionGraph {
    pub id: u64,
    pub synapses: Vec<Synapse>,

    #[serde(default)]
    pub abort_priority: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(default)]
    pub completion_action: CompletionAction,

    pub num_actions: u32,
    pub num_synapses: u32,
    /// Maximum in-flight actions, 0 means unlimited.
    pub batch_limit: u32,
    /// Minimum spacing between consecutive remote dispatches.
    pub network_delay_ms: u64,
    pub transition_timeout_ms: u64,
}

impl TransitionGraph {
    pub fn new(id: u64, batch_limit: u32, network_delay_ms: u64, transition_timeout_ms: u64) -> Self {
        Self {
            id,
            synapses: Vec::new(),
            abort_priority: Score::ZERO,
            abort_reason: None,
            completion_action: CompletionAction::Continue,
            num_actions: 0,
            num_synapses: 0,
            batch_limit,
            network_delay_ms,
            transition_timeout_ms,
        }
    }

    /// Append a synapse and keep the counters in step.
    pub fn push_synapse(&mut self, synapse: Synapse) {
        self.num_actions += synapse.actions.len() as u32;
        self.num_synapses += 1;
        self.synapses.push(synapse);
    }

    pub fn is_empty(&self) -> bool {
        self.num_actions == 0
    }

    /// Every action in graph order.
    pub fn actions(&self) -> impl Iterator<Item = &GraphAction> {
        self.synapses.iter().flat_map(|s| s.actions.iter())
    }

    pub fn find_action(&self, id: ActionId) -> Option<&GraphAction> {
        self.actions().find(|a| a.id == id)
    }

    /// Find the first action matching an operation key.
    pub fn find_by_key(&self, key: &str) -> Option<&GraphAction> {
        self.actions().find(|a| a.key == key)
    }

    /// Check the structural invariants the executor relies on.
    ///
    /// Action and synapse ids are unique, every input names an action that
    /// exists in a different synapse, the counters match, and following
    /// inputs never leads back to the same synapse.
    pub fn validate(&self) -> GraphResult<()> {
        let mut owner: HashMap<ActionId, SynapseId> = HashMap::new();
        let mut synapse_ids = HashSet::new();

        for synapse in &self.synapses {
            if !synapse_ids.insert(synapse.id) {
                return Err(GraphError::DuplicateSynapse(synapse.id));
            }
            for action in &synapse.actions {
                if owner.insert(action.id, synapse.id).is_some() {
                    return Err(GraphError::DuplicateAction(action.id));
                }
            }
        }

        let counted_actions = owner.len() as u32;
        if counted_actions != self.num_actions {
            return Err(GraphError::CounterMismatch {
                field: "num_actions",
                recorded: self.num_actions,
                counted: counted_actions,
            });
        }
        let counted_synapses = self.synapses.len() as u32;
        if counted_synapses != self.num_synapses {
            return Err(GraphError::CounterMismatch {
                field: "num_synapses",
                recorded: self.num_synapses,
                counted: counted_synapses,
            });
        }

        let mut deps: DiGraphMap<SynapseId, ()> = DiGraphMap::new();
        for synapse in &self.synapses {
            deps.add_node(synapse.id);
            for &input in synapse.inputs.iter().chain(synapse.advisory.iter()) {
                let producer = owner.get(&input).copied().ok_or(GraphError::DanglingInput {
                    synapse: synapse.id,
                    input,
                })?;
                if producer == synapse.id {
                    return Err(GraphError::SelfInput {
                        synapse: synapse.id,
                        input,
                    });
                }
                if synapse.inputs.contains(&input) {
                    deps.add_edge(producer, synapse.id, ());
                }
            }
        }

        toposort(&deps, None).map_err(|cycle| GraphError::Cycle {
            synapse: cycle.node_id(),
        })?;
        Ok(())
    }

    /// Apply an abort request.
    ///
    /// The request only takes effect when `priority` is strictly greater
    /// than the current abort priority; it then replaces the abort reason
    /// and raises the completion action to the more severe of the two.
    /// Stale or repeated requests are no-ops. Returns whether it applied.
    pub fn update_abort_priority(&mut self, priority: Score, action: CompletionAction, reason: &str) -> bool {
        if priority <= self.abort_priority {
            debug!(
                graph = self.id,
                current = %self.abort_priority,
                requested = %priority,
                reason,
                "abort request ignored"
            );
            return false;
        }

        info!(
            graph = self.id,
            from = %self.abort_priority,
            to = %priority,
            "abort priority upgraded"
        );
        self.abort_priority = priority;
        if let Some(previous) = &self.abort_reason {
            info!(graph = self.id, previous = %previous, "abort superseded");
        }
        self.abort_reason = Some(reason.to_string());

        let before = self.completion_action;
        if self.completion_action.escalate(action) {
            info!(graph = self.id, from = %before, to = %action, "completion action escalated");
        }
        true
    }

    /// Whether an abort has been recorded.
    pub fn is_aborted(&self) -> bool {
        self.abort_priority > Score::ZERO
    }

    /// SHA-256 over the structural content of the graph (status fields excluded).
    pub fn digest(&self) -> GraphResult<String> {
        let mut canonical = self.clone();
        canonical.abort_priority = Score::ZERO;
        canonical.abort_reason = None;
        canonical.completion_action = CompletionAction::Continue;
        for synapse in &mut canonical.synapses {
            for action in &mut synapse.actions {
                action.reset_status();
            }
        }
        let bytes = serde_json::to_vec(&canonical).map_err(|e| GraphError::Serialize(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    pub fn to_json(&self) -> GraphResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| GraphError::Serialize(e.to_string()))
    }

    /// Parse and validate a serialized graph.
    pub fn from_json(json: &str) -> GraphResult<Self> {
        let graph: TransitionGraph =
            serde_json::from_str(json).map_err(|e| GraphError::Deserialize(e.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Dump the graph to the debug log, one line per synapse and action.
    pub fn log_summary(&self) {
        if self.is_empty() {
            debug!(graph = self.id, "empty transition graph");
            return;
        }

        debug!(
            graph = self.id,
            actions = self.num_actions,
            synapses = self.num_synapses,
            batch_limit = self.batch_limit,
            network_delay_ms = self.network_delay_ms,
            "transition graph"
        );

        for synapse in &self.synapses {
            let status = if synapse.confirmed() {
                "was confirmed"
            } else if synapse.executed() {
                "was executed"
            } else {
                "is pending"
            };
            debug!(synapse = synapse.id, priority = %synapse.priority, "synapse {status}");

            if !synapse.confirmed() {
                for action in &synapse.actions {
                    debug!(
                        action = action.id,
                        key = %action.key,
                        kind = action.kind.as_str(),
                        target = action.target.as_ref().map(|t| t.uname.as_str()).unwrap_or("-"),
                        "    [Action] {}",
                        action.state_label()
                    );
                }
            }
            if !synapse.executed() {
                for input in &synapse.inputs {
                    let label = self.find_action(*input).map(|a| a.state_label()).unwrap_or("Unknown");
                    debug!(action = *input, "     * [Input] {label}");
                }
            }
        }
    }
}
