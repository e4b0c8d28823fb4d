//! Action plan: actions and ordering edges before graph materialization.
//!
//! Actions are appended in a deterministic order (resources in arena
//! order, nodes in index order) and addressed by their position. Ordering
//! edges are kept acyclic at insertion time: an edge that would close a
//! cycle is refused.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crm_core::{ActionKind, ActionTarget, Score, op_key, tasks};

use crate::document::{OpDef, OrderKind};
use crate::node::NodeIdx;
use crate::resource::RscIdx;
use crate::working_set::WorkingSet;

/// Position of an action in the plan.
pub type PlanIdx = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub task: String,
    pub key: String,
    pub kind: ActionKind,
    pub resource: Option<RscIdx>,
    pub node: Option<NodeIdx>,
    pub target: Option<ActionTarget>,
    /// Unrunnable actions are left out of the graph.
    pub runnable: bool,
    pub timeout_ms: u64,
    pub priority: Score,
    pub meta: BTreeMap<String, String>,
}

impl PlannedAction {
    fn base(task: &str, key: String, kind: ActionKind, timeout_ms: u64, priority: Score) -> Self {
        Self {
            task: task.to_string(),
            key,
            kind,
            resource: None,
            node: None,
            target: None,
            runnable: true,
            timeout_ms,
            priority,
            meta: BTreeMap::new(),
        }
    }

    /// A resource action executed on `node`.
    pub fn resource(ws: &WorkingSet, rsc: RscIdx, task: &str, node: NodeIdx) -> Self {
        let r = ws.resource(rsc);
        let timeout = r.op_timeout(task, ws.options.default_action_timeout_ms);
        let mut action = Self::base(
            task,
            op_key(&r.id, task, 0),
            ActionKind::Resource,
            timeout,
            ws.priority_of(rsc),
        );
        action.resource = Some(rsc);
        action.node = Some(node);
        action.target = Some(ws.node(node).target());
        if !r.agent.is_empty() {
            action.meta.insert("agent".to_string(), r.agent.clone());
        }
        action
    }

    /// A recurring operation started on `node`.
    pub fn recurring(ws: &WorkingSet, rsc: RscIdx, op: &OpDef, node: NodeIdx) -> Self {
        let mut action = Self::resource(ws, rsc, &op.name, node);
        action.key = op_key(&ws.resource(rsc).id, &op.name, op.interval_ms);
        action.timeout_ms = op.timeout_ms.unwrap_or(ws.options.default_action_timeout_ms);
        action.meta.insert("interval_ms".to_string(), op.interval_ms.to_string());
        if let Some(role) = op.role {
            action.meta.insert("role".to_string(), role.to_string());
        }
        action
    }

    /// Cancel a recurring operation active on `node`.
    pub fn cancel(ws: &WorkingSet, rsc: RscIdx, name: &str, interval_ms: u64, node: NodeIdx) -> Self {
        let mut action = Self::resource(ws, rsc, tasks::CANCEL, node);
        action.key = op_key(&ws.resource(rsc).id, name, interval_ms);
        action.timeout_ms = ws.options.default_action_timeout_ms;
        action.meta.insert("task".to_string(), name.to_string());
        action.meta.insert("interval_ms".to_string(), interval_ms.to_string());
        action
    }

    /// A synthetic marker action for a container resource.
    pub fn pseudo(ws: &WorkingSet, rsc: RscIdx, task: &str) -> Self {
        let r = ws.resource(rsc);
        let mut action = Self::base(
            task,
            op_key(&r.id, task, 0),
            ActionKind::Pseudo,
            ws.options.default_action_timeout_ms,
            ws.priority_of(rsc),
        );
        action.resource = Some(rsc);
        action
    }

    /// A node-level cluster action (`do_shutdown`, `stonith`).
    pub fn cluster(ws: &WorkingSet, task: &str, node: NodeIdx) -> Self {
        let n = ws.node(node);
        let mut action = Self::base(
            task,
            format!("{task}-{}", n.uname),
            ActionKind::Cluster,
            ws.options.default_action_timeout_ms,
            Score::INFINITY,
        );
        action.node = Some(node);
        action.target = Some(n.target());
        action
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderEdge {
    pub first: PlanIdx,
    pub then: PlanIdx,
    pub kind: OrderKind,
    /// `then` can only run if `first` can.
    pub runnable_left: bool,
}

#[derive(Debug, Default)]
pub struct ActionPlan {
    pub actions: Vec<PlannedAction>,
    pub edges: Vec<OrderEdge>,
    edge_index: HashMap<(PlanIdx, PlanIdx), usize>,
    deps: DiGraphMap<PlanIdx, ()>,
}

impl ActionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: PlannedAction) -> PlanIdx {
        let idx = self.actions.len();
        debug!(action = %action.key, kind = action.kind.as_str(), "planned action");
        self.deps.add_node(idx);
        self.actions.push(action);
        idx
    }

    pub fn get(&self, idx: PlanIdx) -> &PlannedAction {
        &self.actions[idx]
    }

    /// All `task` actions of `rsc`, on any node.
    pub fn find(&self, rsc: RscIdx, task: &str) -> Vec<PlanIdx> {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.resource == Some(rsc) && a.task == task)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn find_on(&self, rsc: RscIdx, task: &str, node: NodeIdx) -> Option<PlanIdx> {
        self.actions
            .iter()
            .position(|a| a.resource == Some(rsc) && a.task == task && a.node == Some(node))
    }

    pub fn has(&self, rsc: RscIdx, task: &str) -> bool {
        self.actions.iter().any(|a| a.resource == Some(rsc) && a.task == task)
    }

    /// Resource actions directed at `node`.
    pub fn resource_actions_on(&self, node: NodeIdx) -> Vec<PlanIdx> {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.kind != ActionKind::Cluster && a.resource.is_some() && a.node == Some(node))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn set_runnable(&mut self, idx: PlanIdx, runnable: bool) {
        self.actions[idx].runnable = runnable;
    }

    /// Order `first` before `then`.
    ///
    /// Returns false, leaving the plan untouched, when the edge would close
    /// a cycle. Repeating an edge upgrades it instead of duplicating it.
    pub fn order(&mut self, first: PlanIdx, then: PlanIdx, kind: OrderKind, runnable_left: bool) -> bool {
        if first == then {
            return false;
        }
        if let Some(&pos) = self.edge_index.get(&(first, then)) {
            let edge = &mut self.edges[pos];
            if kind == OrderKind::Mandatory {
                edge.kind = OrderKind::Mandatory;
            }
            edge.runnable_left |= runnable_left;
            return true;
        }
        if has_path_connecting(&self.deps, then, first, None) {
            return false;
        }
        self.deps.add_edge(first, then, ());
        self.edge_index.insert((first, then), self.edges.len());
        self.edges.push(OrderEdge {
            first,
            then,
            kind,
            runnable_left,
        });
        true
    }

    /// Order every `first_task` of `first` before every `then_task` of
    /// `then`. Missing actions on either side make this a no-op.
    pub fn order_tasks(
        &mut self,
        first: RscIdx,
        first_task: &str,
        then: RscIdx,
        then_task: &str,
        kind: OrderKind,
        runnable_left: bool,
    ) {
        let firsts = self.find(first, first_task);
        let thens = self.find(then, then_task);
        for &f in &firsts {
            for &t in &thens {
                if !self.order(f, t, kind, runnable_left) {
                    debug!(
                        first = %self.actions[f].key,
                        then = %self.actions[t].key,
                        "internal ordering would loop, skipped"
                    );
                }
            }
        }
    }

    /// Propagate unrunnable actions along `runnable_left` mandatory edges.
    pub fn update_runnable(&mut self) {
        loop {
            let mut changed = false;
            for edge in &self.edges {
                if edge.kind != OrderKind::Mandatory || !edge.runnable_left {
                    continue;
                }
                if !self.actions[edge.first].runnable && self.actions[edge.then].runnable {
                    self.actions[edge.then].runnable = false;
                    debug!(
                        action = %self.actions[edge.then].key,
                        because = %self.actions[edge.first].key,
                        "action not runnable"
                    );
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Mandatory predecessors of `idx`.
    pub fn mandatory_inputs(&self, idx: PlanIdx) -> Vec<PlanIdx> {
        let mut inputs: Vec<PlanIdx> = self
            .edges
            .iter()
            .filter(|e| e.then == idx && e.kind == OrderKind::Mandatory)
            .map(|e| e.first)
            .collect();
        inputs.sort_unstable();
        inputs
    }

    /// Optional predecessors of `idx`.
    pub fn optional_inputs(&self, idx: PlanIdx) -> Vec<PlanIdx> {
        let mut inputs: Vec<PlanIdx> = self
            .edges
            .iter()
            .filter(|e| e.then == idx && e.kind == OrderKind::Optional)
            .map(|e| e.first)
            .collect();
        inputs.sort_unstable();
        inputs
    }
}
