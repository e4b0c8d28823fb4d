//! Groups: primitives colocated together, started in order and stopped in
//! reverse order.

use tracing::debug;

use crm_core::{Score, tasks};

use crate::actions::{ActionPlan, PlannedAction};
use crate::document::OrderKind;
use crate::error::UnpackError;
use crate::node::NodeIdx;
use crate::resource::{AllocOps, RscIdx, VariantOps, describe_children};
use crate::role::Role;
use crate::working_set::WorkingSet;

pub struct GroupOps;

/// Completion marker for a container task.
pub(crate) fn container_completion(task: &str) -> &str {
    match task {
        tasks::START => tasks::RUNNING,
        tasks::STOP => tasks::STOPPED,
        tasks::PROMOTE => tasks::PROMOTED,
        tasks::DEMOTE => tasks::DEMOTED,
        other => other,
    }
}

/// Union of the children's locations, in node order.
pub(crate) fn merged_location(ws: &WorkingSet, children: &[RscIdx], current: bool) -> Vec<NodeIdx> {
    let mut nodes: Vec<NodeIdx> = children
        .iter()
        .flat_map(|&c| ws.resource(c).ops().location(ws, c, current))
        .collect();
    nodes.sort_unstable();
    nodes.dedup();
    nodes
}

/// Highest role among the children, Stopped when there are none.
pub(crate) fn merged_state(ws: &WorkingSet, children: &[RscIdx], current: bool) -> Role {
    children
        .iter()
        .map(|&c| ws.resource(c).ops().state(ws, c, current))
        .max()
        .unwrap_or(Role::Stopped)
}

/// Add `task` and its completion marker as pseudo actions of `rsc` when any
/// of `children` has a `task` action.
pub(crate) fn add_bracket(ws: &WorkingSet, rsc: RscIdx, children: &[RscIdx], task: &str, plan: &mut ActionPlan) {
    if !children.iter().any(|&c| plan.has(c, task)) {
        return;
    }
    plan.add(PlannedAction::pseudo(ws, rsc, task));
    plan.add(PlannedAction::pseudo(ws, rsc, container_completion(task)));
}

impl VariantOps for GroupOps {
    fn kind(&self) -> &'static str {
        "group"
    }

    fn unpack(&self, ws: &WorkingSet, rsc: RscIdx) -> Result<(), UnpackError> {
        let r = ws.resource(rsc);
        if r.children().is_empty() {
            return Err(UnpackError::InvalidResource {
                id: r.id.clone(),
                reason: "group has no children".to_string(),
            });
        }
        for &child in r.children() {
            let c = ws.resource(child);
            c.ops().unpack(ws, child).map_err(|e| UnpackError::InvalidResource {
                id: r.id.clone(),
                reason: format!("child {}: {e}", c.id),
            })?;
        }
        Ok(())
    }

    fn find_child(&self, ws: &WorkingSet, rsc: RscIdx, id: &str) -> Option<RscIdx> {
        let r = ws.resource(rsc);
        if r.id == id {
            return Some(rsc);
        }
        r.children()
            .iter()
            .find_map(|&c| ws.resource(c).ops().find_child(ws, c, id))
    }

    fn parameter(&self, ws: &WorkingSet, rsc: RscIdx, name: &str) -> Option<String> {
        let r = ws.resource(rsc);
        match name {
            "id" => Some(r.id.clone()),
            "priority" => Some(r.priority.to_string()),
            _ => r.params.get(name).cloned().or_else(|| {
                let first = *r.children().first()?;
                ws.resource(first).ops().parameter(ws, first, name)
            }),
        }
    }

    fn describe(&self, ws: &WorkingSet, rsc: RscIdx, indent: usize) -> String {
        let r = ws.resource(rsc);
        let header = format!("{}Resource Group: {}", "    ".repeat(indent), r.id);
        describe_children(ws, header, r.children(), indent)
    }

    fn is_active(&self, ws: &WorkingSet, rsc: RscIdx) -> bool {
        let children = ws.resource(rsc).children();
        !children.is_empty() && children.iter().all(|&c| ws.resource(c).ops().is_active(ws, c))
    }

    fn state(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Role {
        merged_state(ws, ws.resource(rsc).children(), current)
    }

    fn location(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Vec<NodeIdx> {
        merged_location(ws, ws.resource(rsc).children(), current)
    }

    fn release(&self, ws: &mut WorkingSet, rsc: RscIdx) {
        let children = ws.resource(rsc).children().to_vec();
        for child in children {
            ws.resource(child).ops().release(ws, child);
        }
        let r = ws.resource_mut(rsc);
        r.allowed.clear();
        r.allocated_to = None;
        r.next_role = Role::Unknown;
    }
}

impl AllocOps for GroupOps {
    fn leaves(&self, ws: &WorkingSet, rsc: RscIdx) -> Vec<RscIdx> {
        ws.resource(rsc)
            .children()
            .iter()
            .flat_map(|&c| ws.resource(c).alloc().leaves(ws, c))
            .collect()
    }

    fn apply_location(&self, ws: &mut WorkingSet, rsc: RscIdx, node: NodeIdx, score: Score, role: Option<Role>) {
        let children = ws.resource(rsc).children().to_vec();
        for child in children {
            ws.resource(child).alloc().apply_location(ws, child, node, score, role);
        }
    }

    fn internal_colocations(&self, ws: &WorkingSet, rsc: RscIdx, out: &mut Vec<(RscIdx, RscIdx)>) {
        let children = ws.resource(rsc).children();
        for pair in children.windows(2) {
            out.push((pair[1], pair[0]));
        }
        for &child in children {
            ws.resource(child).alloc().internal_colocations(ws, child, out);
        }
    }

    fn colocates_per_instance(&self) -> bool {
        false
    }

    fn instance_node_limit(&self, _ws: &WorkingSet, _rsc: RscIdx) -> Option<u32> {
        None
    }

    fn assign_roles(&self, ws: &mut WorkingSet, rsc: RscIdx) {
        let children = ws.resource(rsc).children().to_vec();
        for &child in &children {
            ws.resource(child).alloc().assign_roles(ws, child);
        }
        let next = merged_state(ws, &children, false);
        let allocated = children.first().and_then(|&c| ws.resource(c).allocated_to);
        let r = ws.resource_mut(rsc);
        r.next_role = next;
        r.allocated_to = allocated;
        debug!(group = %r.id, next = %next, "group role assigned");
    }

    fn create_actions(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan) {
        let children = ws.resource(rsc).children();
        for &child in children {
            ws.resource(child).alloc().create_actions(ws, child, plan);
        }
        add_bracket(ws, rsc, children, tasks::START, plan);
        add_bracket(ws, rsc, children, tasks::STOP, plan);
    }

    fn internal_constraints(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan) {
        use OrderKind::Mandatory;

        let children = ws.resource(rsc).children();
        for &child in children {
            ws.resource(child).alloc().internal_constraints(ws, child, plan);
        }

        plan.order_tasks(rsc, tasks::STOP, rsc, tasks::STOPPED, Mandatory, true);
        plan.order_tasks(rsc, tasks::START, rsc, tasks::RUNNING, Mandatory, true);
        plan.order_tasks(rsc, tasks::STOPPED, rsc, tasks::START, Mandatory, false);

        for (i, &child) in children.iter().enumerate() {
            plan.order_tasks(rsc, tasks::START, child, tasks::START, Mandatory, true);
            plan.order_tasks(child, tasks::START, rsc, tasks::RUNNING, Mandatory, true);
            plan.order_tasks(rsc, tasks::STOP, child, tasks::STOP, Mandatory, false);
            plan.order_tasks(child, tasks::STOP, rsc, tasks::STOPPED, Mandatory, false);

            if i > 0 {
                let prev = children[i - 1];
                plan.order_tasks(prev, tasks::START, child, tasks::START, Mandatory, true);
                plan.order_tasks(child, tasks::STOP, prev, tasks::STOP, Mandatory, false);
            }
        }
    }

    fn completion_task<'a>(&self, task: &'a str) -> &'a str {
        container_completion(task)
    }
}
