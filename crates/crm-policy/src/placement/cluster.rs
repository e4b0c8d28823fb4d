//! Node-level actions: fencing of unclean nodes and shutdown of nodes that
//! asked to leave.

use tracing::{error, info, warn};

use crm_core::tasks;

use crate::actions::{ActionPlan, PlannedAction};
use crate::document::OrderKind;
use crate::working_set::WorkingSet;

pub fn schedule_node_actions(ws: &WorkingSet, plan: &mut ActionPlan) {
    let mut last_fence = None;

    for node in ws.node_indices() {
        let n = ws.node(node);
        if n.unclean {
            if !ws.fencing_allowed() {
                error!(node = %n.uname, "node is unclean and cannot be fenced, cluster integrity cannot be guaranteed");
                continue;
            }
            warn!(node = %n.uname, "scheduling node for fencing");
            let fence = plan.add(PlannedAction::cluster(ws, tasks::FENCE, node));
            for action in plan.resource_actions_on(node) {
                plan.order(fence, action, OrderKind::Mandatory, false);
            }
            // One fencing operation at a time.
            if let Some(previous) = last_fence {
                plan.order(previous, fence, OrderKind::Mandatory, false);
            }
            last_fence = Some(fence);
        } else if n.online && n.shutdown {
            info!(node = %n.uname, "scheduling node shutdown");
            let shutdown = plan.add(PlannedAction::cluster(ws, tasks::SHUTDOWN, node));
            for action in plan.resource_actions_on(node) {
                if plan.get(action).task == tasks::STOP {
                    plan.order(action, shutdown, OrderKind::Mandatory, false);
                }
            }
        }
    }
}
