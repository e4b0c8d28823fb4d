//! Primitive resources: one agent instance, placed on at most one node.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crm_core::{ActionKind, Score, tasks};

use crate::actions::{ActionPlan, PlannedAction};
use crate::document::OrderKind;
use crate::error::UnpackError;
use crate::node::NodeIdx;
use crate::resource::{AllocOps, RscIdx, VariantOps};
use crate::role::Role;
use crate::working_set::WorkingSet;

pub struct PrimitiveOps;

impl VariantOps for PrimitiveOps {
    fn kind(&self) -> &'static str {
        "primitive"
    }

    fn unpack(&self, ws: &WorkingSet, rsc: RscIdx) -> Result<(), UnpackError> {
        let r = ws.resource(rsc);
        if r.id.is_empty() {
            return Err(UnpackError::InvalidResource {
                id: "<unnamed>".to_string(),
                reason: "empty resource id".to_string(),
            });
        }
        let mut seen = BTreeSet::new();
        for op in &r.op_defs {
            if op.name.is_empty() {
                return Err(UnpackError::InvalidResource {
                    id: r.id.clone(),
                    reason: "operation without a name".to_string(),
                });
            }
            if !seen.insert((op.name.as_str(), op.interval_ms)) {
                return Err(UnpackError::InvalidResource {
                    id: r.id.clone(),
                    reason: format!("operation {} every {}ms defined twice", op.name, op.interval_ms),
                });
            }
        }
        Ok(())
    }

    fn find_child(&self, ws: &WorkingSet, rsc: RscIdx, id: &str) -> Option<RscIdx> {
        (ws.resource(rsc).id == id).then_some(rsc)
    }

    fn parameter(&self, ws: &WorkingSet, rsc: RscIdx, name: &str) -> Option<String> {
        let r = ws.resource(rsc);
        match name {
            "id" => Some(r.id.clone()),
            "agent" => Some(r.agent.clone()),
            "priority" => Some(r.priority.to_string()),
            _ => r.params.get(name).cloned(),
        }
    }

    fn describe(&self, ws: &WorkingSet, rsc: RscIdx, indent: usize) -> String {
        let r = ws.resource(rsc);
        let pad = "    ".repeat(indent);
        let state = if r.running_on.is_empty() {
            Role::Stopped.to_string()
        } else {
            let nodes: Vec<&str> = r.running_on.iter().map(|&n| ws.node(n).uname.as_str()).collect();
            format!("{} {}", r.role, nodes.join(" "))
        };
        let mut line = format!("{pad}{}\t({}):\t{state}", r.id, r.agent);
        if !r.managed {
            line.push_str(" (unmanaged)");
        }
        if r.failed {
            line.push_str(" FAILED");
        }
        if r.orphan {
            line.push_str(" ORPHANED");
        }
        line
    }

    fn is_active(&self, ws: &WorkingSet, rsc: RscIdx) -> bool {
        !ws.resource(rsc).running_on.is_empty()
    }

    fn state(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Role {
        let r = ws.resource(rsc);
        if current { r.role } else { r.next_role }
    }

    fn location(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Vec<NodeIdx> {
        let r = ws.resource(rsc);
        if current {
            r.running_on.clone()
        } else {
            r.allocated_to.into_iter().collect()
        }
    }

    fn release(&self, ws: &mut WorkingSet, rsc: RscIdx) {
        let r = ws.resource_mut(rsc);
        r.allowed.clear();
        r.promotion.clear();
        r.allocated_to = None;
        r.next_role = Role::Unknown;
    }
}

impl AllocOps for PrimitiveOps {
    fn leaves(&self, _ws: &WorkingSet, rsc: RscIdx) -> Vec<RscIdx> {
        vec![rsc]
    }

    fn apply_location(&self, ws: &mut WorkingSet, rsc: RscIdx, node: NodeIdx, score: Score, role: Option<Role>) {
        let r = ws.resource_mut(rsc);
        if role == Some(Role::Master) {
            warn!(resource = %r.id, "master role location on a resource that cannot be promoted, ignored");
            return;
        }
        let entry = r.allowed.entry(node).or_insert(Score::ZERO);
        *entry += score;
    }

    fn internal_colocations(&self, _ws: &WorkingSet, _rsc: RscIdx, _out: &mut Vec<(RscIdx, RscIdx)>) {}

    fn colocates_per_instance(&self) -> bool {
        false
    }

    fn instance_node_limit(&self, _ws: &WorkingSet, _rsc: RscIdx) -> Option<u32> {
        None
    }

    fn assign_roles(&self, ws: &mut WorkingSet, rsc: RscIdx) {
        let r = ws.resource_mut(rsc);
        r.next_role = if !r.managed {
            r.role
        } else if r.allocated_to.is_some() {
            Role::Started
        } else {
            Role::Stopped
        };
        debug!(resource = %r.id, role = %r.role, next = %r.next_role, "role assigned");
    }

    fn create_actions(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan) {
        let r = ws.resource(rsc);
        if !r.managed {
            debug!(resource = %r.id, "unmanaged, no actions");
            return;
        }

        cancel_orphan_ops(ws, rsc, plan);

        let chosen = r.allocated_to;
        let next = r.next_role;
        let mut role = r.role;

        if r.running_on.len() > 1 {
            let nodes: Vec<&str> = r.running_on.iter().map(|&n| ws.node(n).uname.as_str()).collect();
            warn!(resource = %r.id, nodes = ?nodes, "resource active on multiple nodes, stopping everywhere");
            for &node in &r.running_on {
                add_path(ws, rsc, plan, role, Role::Stopped, node);
            }
            role = Role::Stopped;
        } else if let Some(&current) = r.running_on.first() {
            if r.failed {
                info!(resource = %r.id, node = %ws.node(current).uname, "recovering failed resource");
                add_path(ws, rsc, plan, role, Role::Stopped, current);
                role = Role::Stopped;
            } else if chosen != Some(current) {
                add_path(ws, rsc, plan, role, Role::Stopped, current);
                role = Role::Stopped;
            } else {
                add_path(ws, rsc, plan, role, next, current);
                role = next;
            }
        }

        if let Some(node) = chosen {
            if role != next && next.is_active() {
                add_path(ws, rsc, plan, role, next, node);
            }
            if next.is_active() {
                schedule_recurring(ws, rsc, node, plan);
            }
        }
    }

    fn internal_constraints(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan) {
        use OrderKind::Mandatory;

        if !ws.resource(rsc).managed {
            return;
        }

        plan.order_tasks(rsc, tasks::STOP, rsc, tasks::START, Mandatory, true);
        plan.order_tasks(rsc, tasks::DEMOTE, rsc, tasks::STOP, Mandatory, false);
        plan.order_tasks(rsc, tasks::START, rsc, tasks::PROMOTE, Mandatory, true);
        plan.order_tasks(rsc, tasks::DEMOTE, rsc, tasks::PROMOTE, Mandatory, false);

        let recurring: Vec<_> = plan
            .actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.resource == Some(rsc) && a.task != tasks::CANCEL && a.meta.contains_key("interval_ms"))
            .map(|(idx, a)| (idx, a.node))
            .collect();
        for (monitor, node) in recurring {
            let Some(node) = node else { continue };
            if let Some(start) = plan.find_on(rsc, tasks::START, node) {
                plan.order(start, monitor, Mandatory, true);
            }
            for task in [tasks::PROMOTE, tasks::DEMOTE] {
                if let Some(change) = plan.find_on(rsc, task, node) {
                    plan.order(change, monitor, Mandatory, false);
                }
            }
        }

        for cancel in plan.find(rsc, tasks::CANCEL) {
            let Some(node) = plan.get(cancel).node else { continue };
            for task in [tasks::DEMOTE, tasks::PROMOTE, tasks::STOP] {
                if let Some(next) = plan.find_on(rsc, task, node) {
                    plan.order(cancel, next, Mandatory, false);
                }
            }
        }
    }

    fn completion_task<'a>(&self, task: &'a str) -> &'a str {
        task
    }
}

/// Add the role-change actions taking `rsc` from `from` to `to` on `node`.
fn add_path(ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan, from: Role, to: Role, node: NodeIdx) {
    let r = ws.resource(rsc);
    let Some(steps) = from.path_to(to) else {
        warn!(resource = %r.id, from = %from, to = %to, "no role transition defined");
        return;
    };
    for task in steps {
        if plan.find_on(rsc, task, node).is_some() {
            continue;
        }
        let n = ws.node(node);
        let mut action = PlannedAction::resource(ws, rsc, task, node);
        if n.unclean {
            if ws.fencing_allowed() {
                // Fencing the node completes the stop.
                action.kind = ActionKind::Pseudo;
                action.meta.insert("implied_by".to_string(), tasks::FENCE.to_string());
            } else {
                warn!(resource = %r.id, node = %n.uname, task, "node is unclean and cannot be fenced, leaving resource alone");
                action.runnable = false;
            }
        }
        plan.add(action);
    }
}

/// Start the recurring operations that belong to the resource's next role.
fn schedule_recurring(ws: &WorkingSet, rsc: RscIdx, node: NodeIdx, plan: &mut ActionPlan) {
    let r = ws.resource(rsc);
    let next = r.next_role;
    let restarting = plan.find_on(rsc, tasks::START, node).is_some();

    for op in r.op_defs.iter().filter(|op| op.interval_ms > 0 && !op.disabled) {
        let matches_role = match op.role {
            None => next != Role::Master,
            Some(Role::Started) | Some(Role::Slave) => matches!(next, Role::Started | Role::Slave),
            Some(role) => role == next,
        };
        let active = r
            .active_ops
            .iter()
            .any(|a| a.node == node && a.name == op.name && a.interval_ms == op.interval_ms);

        if !matches_role {
            if active && !restarting {
                info!(resource = %r.id, op = %op.name, interval_ms = op.interval_ms, "cancelling operation for previous role");
                plan.add(PlannedAction::cancel(ws, rsc, &op.name, op.interval_ms, node));
            }
            continue;
        }
        if active && !restarting {
            debug!(resource = %r.id, op = %op.name, "recurring operation already active");
            continue;
        }
        plan.add(PlannedAction::recurring(ws, rsc, op, node));
    }
}

/// Cancel recurring operations active in status that nothing defines.
fn cancel_orphan_ops(ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan) {
    if !ws.options.stop_orphan_actions {
        return;
    }
    let r = ws.resource(rsc);
    for active in &r.active_ops {
        let defined = r
            .op_defs
            .iter()
            .any(|d| d.name == active.name && d.interval_ms == active.interval_ms);
        let node = ws.node(active.node);
        if defined || !node.online || node.unclean {
            continue;
        }
        info!(resource = %r.id, op = %active.name, node = %node.uname, "cancelling orphan operation");
        plan.add(PlannedAction::cancel(ws, rsc, &active.name, active.interval_ms, active.node));
    }
}
