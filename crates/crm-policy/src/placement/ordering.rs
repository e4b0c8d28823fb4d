//! User ordering constraints turned into plan edges.

use tracing::{debug, info, warn};

use crm_core::tasks;

use crate::actions::ActionPlan;
use crate::constraints::{Ordering, invert_task};
use crate::document::OrderKind;
use crate::resource::RscIdx;
use crate::role::Role;
use crate::working_set::WorkingSet;

pub fn apply_orderings(ws: &WorkingSet, plan: &mut ActionPlan) {
    for ordering in &ws.orderings {
        apply_one(ws, plan, ordering, ordering.first, &ordering.first_task, ordering.then, &ordering.then_task, true);

        if !ordering.symmetrical {
            continue;
        }
        match (invert_task(&ordering.then_task), invert_task(&ordering.first_task)) {
            (Some(first_task), Some(then_task)) => {
                apply_one(ws, plan, ordering, ordering.then, first_task, ordering.first, then_task, false);
            }
            _ => warn!(constraint = %ordering.id, "ordering cannot be inverted, symmetrical part skipped"),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_one(
    ws: &WorkingSet,
    plan: &mut ActionPlan,
    ordering: &Ordering,
    first: RscIdx,
    first_task: &str,
    then: RscIdx,
    then_task: &str,
    forward: bool,
) {
    let completion = ws.resource(first).alloc().completion_task(first_task);
    let firsts = plan.find(first, completion);
    let thens = plan.find(then, then_task);
    if thens.is_empty() {
        debug!(constraint = %ordering.id, then = %ws.resource(then).id, task = then_task, "nothing to order");
        return;
    }

    if firsts.is_empty() {
        let gates_start = matches!(first_task, tasks::START | tasks::PROMOTE) && matches!(then_task, tasks::START | tasks::PROMOTE);
        if forward && ordering.kind == OrderKind::Mandatory && gates_start && !will_be_active(ws, first, first_task) {
            for t in thens {
                info!(
                    constraint = %ordering.id,
                    action = %plan.get(t).key,
                    first = %ws.resource(first).id,
                    "action cannot run: the resource it depends on will not be active"
                );
                plan.set_runnable(t, false);
            }
        }
        return;
    }

    let runnable_left = forward && ordering.kind == OrderKind::Mandatory && matches!(first_task, tasks::START | tasks::PROMOTE);
    for &f in &firsts {
        for &t in &thens {
            if !plan.order(f, t, ordering.kind, runnable_left) {
                warn!(
                    constraint = %ordering.id,
                    first = %plan.get(f).key,
                    then = %plan.get(t).key,
                    "ordering would create a loop, dropped"
                );
            }
        }
    }
}

fn will_be_active(ws: &WorkingSet, rsc: RscIdx, task: &str) -> bool {
    let next = ws.resource(rsc).ops().state(ws, rsc, false);
    if task == tasks::PROMOTE {
        next == Role::Master
    } else {
        next.is_active()
    }
}
