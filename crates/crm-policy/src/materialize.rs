//! Graph materialization: action plan to transition graph.
//!
//! Runnable actions sharing the same set of mandatory inputs and the same
//! priority form one synapse, so an abort skips exactly the actions below
//! its priority. Synapses are numbered in the order their first action appears
//! in the plan and action ids are dense in synapse order, so the same plan
//! always yields the same graph.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crm_core::{ActionId, GraphAction, GraphError, Score, Synapse, TransitionGraph};

use crate::actions::{ActionPlan, PlanIdx};
use crate::working_set::WorkingSet;

pub fn materialize(ws: &WorkingSet, plan: &ActionPlan) -> Result<TransitionGraph, GraphError> {
    let kept: Vec<PlanIdx> = (0..plan.actions.len()).filter(|&idx| plan.get(idx).runnable).collect();
    let kept_set: HashSet<PlanIdx> = kept.iter().copied().collect();

    let mut slots: BTreeMap<(Vec<PlanIdx>, Score), usize> = BTreeMap::new();
    let mut groups: Vec<(Vec<PlanIdx>, Vec<PlanIdx>)> = Vec::new();
    for &idx in &kept {
        let inputs: Vec<PlanIdx> = plan
            .mandatory_inputs(idx)
            .into_iter()
            .filter(|input| kept_set.contains(input))
            .collect();
        let key = (inputs.clone(), plan.get(idx).priority);
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push((inputs, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(idx);
    }

    let mut ids: BTreeMap<PlanIdx, ActionId> = BTreeMap::new();
    let mut next_id: ActionId = 0;
    for (_, members) in &groups {
        for &idx in members {
            ids.insert(idx, next_id);
            next_id += 1;
        }
    }

    let mut graph = TransitionGraph::new(
        ws.epoch,
        ws.options.batch_limit,
        ws.options.network_delay_ms,
        ws.options.transition_timeout_ms,
    );

    for (synapse_id, (inputs, members)) in groups.iter().enumerate() {
        let mut priority = Score::NEG_INFINITY;
        let mut actions = Vec::with_capacity(members.len());
        let mut advisory = Vec::new();

        for &idx in members {
            let planned = plan.get(idx);
            priority = priority.max(planned.priority);

            let mut action = GraphAction::new(ids[&idx], &planned.task, &planned.key, planned.kind, planned.timeout_ms);
            action.resource = planned.resource.map(|rsc| ws.resource(rsc).id.clone());
            action.target = planned.target.clone();
            action.meta = planned.meta.clone();
            actions.push(action);

            for optional in plan.optional_inputs(idx) {
                if kept_set.contains(&optional) && !members.contains(&optional) {
                    advisory.push(ids[&optional]);
                }
            }
        }
        advisory.sort_unstable();
        advisory.dedup();

        graph.push_synapse(Synapse {
            id: synapse_id as u32,
            priority,
            actions,
            inputs: inputs.iter().map(|input| ids[input]).collect(),
            advisory,
        });
    }

    graph.validate()?;
    debug!(
        graph = graph.id,
        synapses = graph.num_synapses,
        actions = graph.num_actions,
        dropped = plan.actions.len() - kept.len(),
        "transition graph materialized"
    );
    Ok(graph)
}
