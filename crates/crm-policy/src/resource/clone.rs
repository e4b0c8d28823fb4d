//! Clones and primary-elect sets.
//!
//! Instances are built at unpack time as independent children named
//! `{child}:{n}`. A primary-elect set is a clone whose placed instances
//! run as Slave; the best-scored ones are promoted to Master within the
//! `master_max` and `master_node_max` limits.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crm_core::{Score, tasks};

use crate::actions::ActionPlan;
use crate::document::OrderKind;
use crate::error::UnpackError;
use crate::node::NodeIdx;
use crate::resource::group::{add_bracket, container_completion, merged_location, merged_state};
use crate::resource::{AllocOps, RscIdx, Variant, VariantOps, describe_children};
use crate::role::Role;
use crate::working_set::WorkingSet;

pub struct CloneOps;

pub struct PrimaryOps;

impl VariantOps for CloneOps {
    fn kind(&self) -> &'static str {
        "clone"
    }

    fn unpack(&self, ws: &WorkingSet, rsc: RscIdx) -> Result<(), UnpackError> {
        let r = ws.resource(rsc);
        let settings = match &r.variant {
            Variant::Clone { settings, .. } | Variant::Primary { settings, .. } => settings,
            _ => {
                return Err(UnpackError::InvalidResource {
                    id: r.id.clone(),
                    reason: "not a clone".to_string(),
                });
            }
        };
        if settings.clone_node_max == 0 {
            return Err(UnpackError::InvalidResource {
                id: r.id.clone(),
                reason: "clone_node_max must be at least 1".to_string(),
            });
        }
        for &instance in r.children() {
            let i = ws.resource(instance);
            i.ops().unpack(ws, instance).map_err(|e| UnpackError::InvalidResource {
                id: r.id.clone(),
                reason: format!("instance {}: {e}", i.id),
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
        let settings = match &r.variant {
            Variant::Clone { settings, .. } | Variant::Primary { settings, .. } => Some(settings),
            _ => None,
        };
        match name {
            "id" => Some(r.id.clone()),
            "priority" => Some(r.priority.to_string()),
            "clone_max" => settings.map(|s| s.clone_max.to_string()),
            "clone_node_max" => settings.map(|s| s.clone_node_max.to_string()),
            _ => r.params.get(name).cloned().or_else(|| {
                let first = *r.children().first()?;
                ws.resource(first).ops().parameter(ws, first, name)
            }),
        }
    }

    fn describe(&self, ws: &WorkingSet, rsc: RscIdx, indent: usize) -> String {
        let r = ws.resource(rsc);
        let header = format!("{}Clone Set: {}", "    ".repeat(indent), r.id);
        describe_children(ws, header, r.children(), indent)
    }

    fn is_active(&self, ws: &WorkingSet, rsc: RscIdx) -> bool {
        ws.resource(rsc)
            .children()
            .iter()
            .any(|&c| ws.resource(c).ops().is_active(ws, c))
    }

    fn state(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Role {
        merged_state(ws, ws.resource(rsc).children(), current)
    }

    fn location(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Vec<NodeIdx> {
        merged_location(ws, ws.resource(rsc).children(), current)
    }

    fn release(&self, ws: &mut WorkingSet, rsc: RscIdx) {
        let instances = ws.resource(rsc).children().to_vec();
        for instance in instances {
            ws.resource(instance).ops().release(ws, instance);
        }
        let r = ws.resource_mut(rsc);
        r.allowed.clear();
        r.promotion.clear();
        r.next_role = Role::Unknown;
    }
}

impl AllocOps for CloneOps {
    fn leaves(&self, ws: &WorkingSet, rsc: RscIdx) -> Vec<RscIdx> {
        ws.resource(rsc)
            .children()
            .iter()
            .flat_map(|&c| ws.resource(c).alloc().leaves(ws, c))
            .collect()
    }

    fn apply_location(&self, ws: &mut WorkingSet, rsc: RscIdx, node: NodeIdx, score: Score, role: Option<Role>) {
        if role == Some(Role::Master) {
            warn!(resource = %ws.resource(rsc).id, "master role location on a clone that cannot be promoted, ignored");
            return;
        }
        let instances = ws.resource(rsc).children().to_vec();
        for instance in instances {
            ws.resource(instance).alloc().apply_location(ws, instance, node, score, role);
        }
    }

    fn internal_colocations(&self, ws: &WorkingSet, rsc: RscIdx, out: &mut Vec<(RscIdx, RscIdx)>) {
        for &instance in ws.resource(rsc).children() {
            ws.resource(instance).alloc().internal_colocations(ws, instance, out);
        }
    }

    fn colocates_per_instance(&self) -> bool {
        true
    }

    fn instance_node_limit(&self, ws: &WorkingSet, rsc: RscIdx) -> Option<u32> {
        match &ws.resource(rsc).variant {
            Variant::Clone { settings, .. } | Variant::Primary { settings, .. } => Some(settings.clone_node_max),
            _ => None,
        }
    }

    fn assign_roles(&self, ws: &mut WorkingSet, rsc: RscIdx) {
        let instances = ws.resource(rsc).children().to_vec();
        for &instance in &instances {
            ws.resource(instance).alloc().assign_roles(ws, instance);
        }
        let next = merged_state(ws, &instances, false);
        ws.resource_mut(rsc).next_role = next;
    }

    fn create_actions(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan) {
        let instances = ws.resource(rsc).children();
        for &instance in instances {
            ws.resource(instance).alloc().create_actions(ws, instance, plan);
        }
        add_bracket(ws, rsc, instances, tasks::START, plan);
        add_bracket(ws, rsc, instances, tasks::STOP, plan);
    }

    fn internal_constraints(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan) {
        use OrderKind::Mandatory;

        let instances = ws.resource(rsc).children();
        for &instance in instances {
            ws.resource(instance).alloc().internal_constraints(ws, instance, plan);
        }

        plan.order_tasks(rsc, tasks::STOP, rsc, tasks::STOPPED, Mandatory, true);
        plan.order_tasks(rsc, tasks::START, rsc, tasks::RUNNING, Mandatory, true);
        plan.order_tasks(rsc, tasks::STOPPED, rsc, tasks::START, Mandatory, false);

        for &instance in instances {
            let ops = ws.resource(instance).alloc();
            plan.order_tasks(rsc, tasks::START, instance, tasks::START, Mandatory, true);
            plan.order_tasks(instance, ops.completion_task(tasks::START), rsc, tasks::RUNNING, Mandatory, true);
            plan.order_tasks(rsc, tasks::STOP, instance, tasks::STOP, Mandatory, false);
            plan.order_tasks(instance, ops.completion_task(tasks::STOP), rsc, tasks::STOPPED, Mandatory, false);
        }
    }

    fn completion_task<'a>(&self, task: &'a str) -> &'a str {
        container_completion(task)
    }
}

impl VariantOps for PrimaryOps {
    fn kind(&self) -> &'static str {
        "master"
    }

    fn unpack(&self, ws: &WorkingSet, rsc: RscIdx) -> Result<(), UnpackError> {
        CloneOps.unpack(ws, rsc)?;
        let r = ws.resource(rsc);
        for &instance in r.children() {
            let leaves = ws.resource(instance).alloc().leaves(ws, instance);
            if leaves != [instance] {
                return Err(UnpackError::InvalidResource {
                    id: r.id.clone(),
                    reason: "primary-elect instances must be primitives".to_string(),
                });
            }
        }
        Ok(())
    }

    fn find_child(&self, ws: &WorkingSet, rsc: RscIdx, id: &str) -> Option<RscIdx> {
        CloneOps.find_child(ws, rsc, id)
    }

    fn parameter(&self, ws: &WorkingSet, rsc: RscIdx, name: &str) -> Option<String> {
        let promotion = match &ws.resource(rsc).variant {
            Variant::Primary { promotion, .. } => Some(promotion),
            _ => None,
        };
        match name {
            "master_max" => promotion.map(|p| p.master_max.to_string()),
            "master_node_max" => promotion.map(|p| p.master_node_max.to_string()),
            _ => CloneOps.parameter(ws, rsc, name),
        }
    }

    fn describe(&self, ws: &WorkingSet, rsc: RscIdx, indent: usize) -> String {
        let r = ws.resource(rsc);
        let header = format!("{}Master/Slave Set: {}", "    ".repeat(indent), r.id);
        describe_children(ws, header, r.children(), indent)
    }

    fn is_active(&self, ws: &WorkingSet, rsc: RscIdx) -> bool {
        CloneOps.is_active(ws, rsc)
    }

    fn state(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Role {
        CloneOps.state(ws, rsc, current)
    }

    fn location(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Vec<NodeIdx> {
        CloneOps.location(ws, rsc, current)
    }

    fn release(&self, ws: &mut WorkingSet, rsc: RscIdx) {
        CloneOps.release(ws, rsc);
    }
}

impl AllocOps for PrimaryOps {
    fn leaves(&self, ws: &WorkingSet, rsc: RscIdx) -> Vec<RscIdx> {
        CloneOps.leaves(ws, rsc)
    }

    fn apply_location(&self, ws: &mut WorkingSet, rsc: RscIdx, node: NodeIdx, score: Score, role: Option<Role>) {
        if role == Some(Role::Master) {
            let r = ws.resource_mut(rsc);
            *r.promotion.entry(node).or_insert(Score::ZERO) += score;
            return;
        }
        CloneOps.apply_location(ws, rsc, node, score, role);
    }

    fn internal_colocations(&self, ws: &WorkingSet, rsc: RscIdx, out: &mut Vec<(RscIdx, RscIdx)>) {
        CloneOps.internal_colocations(ws, rsc, out);
    }

    fn colocates_per_instance(&self) -> bool {
        true
    }

    fn instance_node_limit(&self, ws: &WorkingSet, rsc: RscIdx) -> Option<u32> {
        CloneOps.instance_node_limit(ws, rsc)
    }

    fn assign_roles(&self, ws: &mut WorkingSet, rsc: RscIdx) {
        let instances = ws.resource(rsc).children().to_vec();

        // Instances of a primary-elect set run as Slave, never plain Started.
        for &instance in &instances {
            let r = ws.resource_mut(instance);
            if r.role == Role::Started {
                r.role = Role::Slave;
            }
        }
        CloneOps.assign_roles(ws, rsc);
        for &instance in &instances {
            let r = ws.resource_mut(instance);
            if r.next_role == Role::Started {
                r.next_role = Role::Slave;
            }
        }

        promote_instances(ws, rsc, &instances);
        let next = merged_state(ws, &instances, false);
        ws.resource_mut(rsc).next_role = next;
    }

    fn create_actions(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan) {
        CloneOps.create_actions(ws, rsc, plan);
        let instances = ws.resource(rsc).children();
        add_bracket(ws, rsc, instances, tasks::PROMOTE, plan);
        add_bracket(ws, rsc, instances, tasks::DEMOTE, plan);
    }

    fn internal_constraints(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan) {
        use OrderKind::Mandatory;

        CloneOps.internal_constraints(ws, rsc, plan);

        plan.order_tasks(rsc, tasks::PROMOTE, rsc, tasks::PROMOTED, Mandatory, true);
        plan.order_tasks(rsc, tasks::DEMOTE, rsc, tasks::DEMOTED, Mandatory, true);
        // All demotes before any stop, all starts before any promote.
        plan.order_tasks(rsc, tasks::DEMOTED, rsc, tasks::STOP, Mandatory, false);
        plan.order_tasks(rsc, tasks::RUNNING, rsc, tasks::PROMOTE, Mandatory, false);
        plan.order_tasks(rsc, tasks::DEMOTED, rsc, tasks::PROMOTE, Mandatory, false);

        for &instance in ws.resource(rsc).children() {
            plan.order_tasks(rsc, tasks::PROMOTE, instance, tasks::PROMOTE, Mandatory, true);
            plan.order_tasks(instance, tasks::PROMOTE, rsc, tasks::PROMOTED, Mandatory, true);
            plan.order_tasks(rsc, tasks::DEMOTE, instance, tasks::DEMOTE, Mandatory, false);
            plan.order_tasks(instance, tasks::DEMOTE, rsc, tasks::DEMOTED, Mandatory, false);
        }
    }

    fn completion_task<'a>(&self, task: &'a str) -> &'a str {
        container_completion(task)
    }
}

/// Promote the best placed instances of primary-elect set `rsc`.
fn promote_instances(ws: &mut WorkingSet, rsc: RscIdx, instances: &[RscIdx]) {
    let (master_max, master_node_max) = match &ws.resource(rsc).variant {
        Variant::Primary { promotion, .. } => (promotion.master_max, promotion.master_node_max),
        _ => return,
    };
    let primary = ws.resource(rsc);
    if matches!(primary.target_role, Some(Role::Slave) | Some(Role::Started)) {
        debug!(resource = %primary.id, "target role prevents promotion");
        return;
    }

    let mut promoted = 0u32;
    let mut per_node: BTreeMap<NodeIdx, u32> = BTreeMap::new();

    // Unmanaged masters keep their role and use up the limits first.
    for &instance in instances {
        let r = ws.resource(instance);
        if !r.managed && r.role == Role::Master {
            promoted += 1;
            for &node in &r.running_on {
                *per_node.entry(node).or_default() += 1;
            }
        }
    }

    let mut candidates: Vec<(Score, String, RscIdx, NodeIdx)> = instances
        .iter()
        .filter_map(|&instance| {
            let r = ws.resource(instance);
            let node = r.allocated_to?;
            if !r.managed {
                return None;
            }
            let mut score = primary.promotion.get(&node).copied().unwrap_or(Score::ZERO);
            if r.role == Role::Master && r.running_on.contains(&node) && !r.failed {
                score += r.stickiness;
            }
            (!score.is_excluded()).then(|| (score, r.id.clone(), instance, node))
        })
        .collect();
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    for (score, id, instance, node) in candidates {
        if promoted >= master_max {
            break;
        }
        let on_node = per_node.entry(node).or_default();
        if *on_node >= master_node_max {
            continue;
        }
        *on_node += 1;
        promoted += 1;
        info!(resource = %id, node = %ws.node(node).uname, score = %score, "promoting instance");
        ws.resource_mut(instance).next_role = Role::Master;
    }
}
