//! Executor behavior over hand-built and policy-built graphs.

use std::collections::HashSet;

use crm_core::{ActionId, ActionKind, CompletionAction, EngineConfig, ExecutorConfig, GraphAction, Score, Synapse, TransitionGraph};
use crm_policy::document::{ClusterConfig, ClusterStatus, NodeDef, NodeStatus, OrderingDef, PrimitiveDef, ResourceDef, ResourceStatus};
use crm_policy::{Role, compute_transition};
use crm_transition::{Effect, Event, GraphCompletion, TransitionExecutor, TransitionState};
use proptest::prelude::*;

fn dispatched(effects: &[Effect]) -> Vec<ActionId> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Dispatch(request) => Some(request.action_id),
            _ => None,
        })
        .collect()
}

fn completion(effects: &[Effect]) -> Option<&GraphCompletion> {
    effects.iter().find_map(|e| match e {
        Effect::Complete(done) => Some(done),
        _ => None,
    })
}

fn key_of(exec: &TransitionExecutor, id: ActionId) -> String {
    exec.graph().find_action(id).unwrap().key.clone()
}

fn single_node(resources: Vec<ResourceDef>, running: &[&str]) -> (ClusterConfig, ClusterStatus) {
    let config = ClusterConfig {
        epoch: 11,
        nodes: vec![NodeDef {
            id: "uuid-n1".to_string(),
            uname: "n1".to_string(),
        }],
        resources,
        ..Default::default()
    };
    let status = ClusterStatus {
        have_quorum: Some(true),
        nodes: vec![NodeStatus {
            uname: "n1".to_string(),
            online: true,
            resources: running
                .iter()
                .map(|id| ResourceStatus {
                    id: id.to_string(),
                    role: Role::Started,
                    failed: false,
                    operations: Vec::new(),
                })
                .collect(),
            ..Default::default()
        }],
    };
    (config, status)
}

fn ordering(first: &str, first_action: &str, then: &str, then_action: &str) -> OrderingDef {
    OrderingDef {
        id: format!("{first}-before-{then}"),
        first: first.to_string(),
        first_action: first_action.to_string(),
        then: then.to_string(),
        then_action: then_action.to_string(),
        kind: Default::default(),
        symmetrical: false,
    }
}

#[test]
fn stop_is_confirmed_before_dependent_start_is_dispatched() {
    let mut a = PrimitiveDef::new("a");
    a.target_role = Some(Role::Stopped);
    let (mut config, status) = single_node(vec![ResourceDef::Primitive(a), ResourceDef::Primitive(PrimitiveDef::new("b"))], &["a"]);
    config.constraints.orderings.push(ordering("a", "stop", "b", "start"));

    let transition = compute_transition(Some(&config), &status, &EngineConfig::default()).unwrap();
    let mut exec = TransitionExecutor::new(transition.graph, ExecutorConfig::default()).unwrap();

    let first = dispatched(&exec.handle(Event::Start, 0));
    assert_eq!(first.len(), 1);
    assert_eq!(key_of(&exec, first[0]), "a_stop_0");

    let next = dispatched(&exec.handle(Event::Confirmed(first[0]), 10));
    assert_eq!(next.len(), 1);
    assert_eq!(key_of(&exec, next[0]), "b_start_0");

    let effects = exec.handle(Event::Confirmed(next[0]), 20);
    assert_eq!(completion(&effects).unwrap().state, TransitionState::Complete);
}

#[test]
fn failed_start_blocks_dependents() {
    let (mut config, status) = single_node(
        vec![
            ResourceDef::Primitive(PrimitiveDef::new("a")),
            ResourceDef::Primitive(PrimitiveDef::new("b")),
        ],
        &[],
    );
    config.constraints.orderings.push(ordering("a", "start", "b", "start"));

    let transition = compute_transition(Some(&config), &status, &EngineConfig::default()).unwrap();
    let mut exec = TransitionExecutor::new(transition.graph, ExecutorConfig::default()).unwrap();

    let first = dispatched(&exec.handle(Event::Start, 0));
    assert_eq!(first.len(), 1);
    assert_eq!(key_of(&exec, first[0]), "a_start_0");

    let effects = exec.handle(Event::Failed(first[0]), 5);
    assert!(dispatched(&effects).is_empty());
    let done = completion(&effects).unwrap();
    assert_eq!(done.state, TransitionState::ActionFailed);
    assert_eq!(done.completion_action, CompletionAction::Stop);
    assert!(!exec.graph().find_by_key("b_start_0").unwrap().executed);

    // Late results change nothing.
    assert!(exec.handle(Event::Confirmed(first[0]), 6).is_empty());
    assert_eq!(exec.state(), TransitionState::ActionFailed);
}

#[test]
fn abort_skips_only_lower_priority_resources() {
    let mut high = PrimitiveDef::new("high");
    high.priority = 10;
    let (config, status) = single_node(
        vec![ResourceDef::Primitive(PrimitiveDef::new("low")), ResourceDef::Primitive(high)],
        &[],
    );
    let transition = compute_transition(Some(&config), &status, &EngineConfig::default()).unwrap();
    let mut exec = TransitionExecutor::new(transition.graph, ExecutorConfig::default()).unwrap();
    exec.request_abort(Score::from(5), CompletionAction::Restart, "configuration changed", 0);

    let first = dispatched(&exec.handle(Event::Start, 0));
    let keys: Vec<String> = first.iter().map(|&id| key_of(&exec, id)).collect();
    assert_eq!(keys, vec!["high_start_0"]);

    let effects = exec.handle(Event::Confirmed(first[0]), 10);
    assert_eq!(completion(&effects).unwrap().state, TransitionState::Stopped);
    assert!(!exec.graph().find_by_key("low_start_0").unwrap().executed);
}

#[test]
fn pseudo_synapses_resolve_in_one_pass() {
    let mut graph = TransitionGraph::new(2, 0, 0, 0);
    let pseudo = |id: ActionId| GraphAction::new(id, "running", &format!("grp_running_{id}"), ActionKind::Pseudo, 0);
    let real = |id: ActionId| GraphAction::new(id, "start", &format!("r{id}_start_0"), ActionKind::Resource, 1_000);
    let synapse = |id, actions, inputs| Synapse {
        id,
        priority: Score::ZERO,
        actions,
        inputs,
        advisory: Vec::new(),
    };
    graph.push_synapse(synapse(0, vec![real(0)], vec![]));
    graph.push_synapse(synapse(1, vec![pseudo(1), pseudo(2)], vec![0]));
    graph.push_synapse(synapse(2, vec![pseudo(3)], vec![1, 2]));
    graph.push_synapse(synapse(3, vec![real(4)], vec![3]));

    let mut exec = TransitionExecutor::new(graph, ExecutorConfig::default()).unwrap();
    exec.handle(Event::Start, 0);
    let effects = exec.handle(Event::Confirmed(0), 1);

    assert_eq!(dispatched(&effects), vec![4]);
    assert!(exec.graph().synapses[1].confirmed());
    assert!(exec.graph().synapses[2].confirmed());
    assert_eq!(exec.in_flight().collect::<Vec<_>>(), vec![4]);
}

/// Raw material for a random acyclic graph: per synapse, the pseudo flag of
/// each action and seeds picking inputs among earlier synapses.
type Shape = Vec<(Vec<bool>, Vec<(usize, usize)>)>;

fn shape_strategy() -> impl Strategy<Value = Shape> {
    prop::collection::vec(
        (
            prop::collection::vec(any::<bool>(), 1..4),
            prop::collection::vec((any::<usize>(), any::<usize>()), 0..3),
        ),
        1..10,
    )
}

fn build(shape: &Shape, batch_limit: u32) -> TransitionGraph {
    let mut graph = TransitionGraph::new(1, batch_limit, 0, 0);
    let mut owned: Vec<Vec<ActionId>> = Vec::new();
    let mut next: ActionId = 0;

    for (i, (kinds, seeds)) in shape.iter().enumerate() {
        let mut inputs: Vec<ActionId> = Vec::new();
        if i > 0 {
            for &(s, a) in seeds {
                let producer = &owned[s % i];
                let input = producer[a % producer.len()];
                if !inputs.contains(&input) {
                    inputs.push(input);
                }
            }
        }

        let mut actions = Vec::new();
        let mut ids = Vec::new();
        for &is_pseudo in kinds {
            let kind = if is_pseudo { ActionKind::Pseudo } else { ActionKind::Resource };
            actions.push(GraphAction::new(next, "start", &format!("r{next}_start_0"), kind, 60_000));
            ids.push(next);
            next += 1;
        }
        owned.push(ids);
        graph.push_synapse(Synapse {
            id: i as u32,
            priority: Score::ZERO,
            actions,
            inputs,
            advisory: Vec::new(),
        });
    }
    graph
}

fn assert_inputs_confirmed(exec: &TransitionExecutor, effects: &[Effect]) -> Result<(), TestCaseError> {
    for effect in effects {
        if let Effect::Dispatch(request) = effect {
            let synapse = exec
                .graph()
                .synapses
                .iter()
                .find(|s| s.id == request.synapse)
                .unwrap();
            for input in &synapse.inputs {
                prop_assert!(
                    exec.graph().find_action(*input).unwrap().confirmed,
                    "action {} dispatched before input {} was confirmed",
                    request.action_id,
                    input
                );
            }
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn dispatch_waits_for_inputs(
        shape in shape_strategy(),
        batch_limit in 0u32..4,
        picks in prop::collection::vec(any::<usize>(), 64),
    ) {
        let graph = build(&shape, batch_limit);
        let total = graph.num_actions as usize;
        let mut exec = TransitionExecutor::new(graph, ExecutorConfig::default()).unwrap();

        let mut now = 0;
        let mut effects = exec.handle(Event::Start, now);
        let mut seen: HashSet<ActionId> = HashSet::new();
        let mut step = 0;
        loop {
            assert_inputs_confirmed(&exec, &effects)?;
            for id in dispatched(&effects) {
                prop_assert!(seen.insert(id), "action {} dispatched twice", id);
            }
            if let Some(done) = completion(&effects) {
                prop_assert_eq!(done.state, TransitionState::Complete);
                break;
            }

            let in_flight: Vec<ActionId> = exec.in_flight().collect();
            prop_assert!(!in_flight.is_empty(), "stalled with nothing in flight");
            let id = in_flight[picks[step % picks.len()] % in_flight.len()];
            step += 1;
            now += 1;
            effects = exec.handle(Event::Confirmed(id), now);
        }

        prop_assert!(exec.graph().actions().all(|a| a.confirmed));
        let pseudo = exec.graph().actions().filter(|a| a.is_pseudo()).count();
        prop_assert_eq!(seen.len(), total - pseudo);
    }

    #[test]
    fn abort_is_monotonic(
        requests in prop::collection::vec((prop_oneof![Just(i32::MAX), -50i32..200], 0usize..4), 1..20),
    ) {
        let mut graph = TransitionGraph::new(1, 0, 0, 0);
        graph.push_synapse(Synapse {
            id: 0,
            priority: Score::INFINITY,
            actions: vec![GraphAction::new(0, "start", "r_start_0", ActionKind::Resource, 60_000)],
            inputs: Vec::new(),
            advisory: Vec::new(),
        });
        let mut exec = TransitionExecutor::new(graph, ExecutorConfig::default()).unwrap();
        exec.handle(Event::Start, 0);

        let actions = [
            CompletionAction::Continue,
            CompletionAction::Stop,
            CompletionAction::Restart,
            CompletionAction::Shutdown,
        ];
        let mut priority = exec.graph().abort_priority;
        let mut completion_action = exec.graph().completion_action;
        for (i, (raw, action)) in requests.into_iter().enumerate() {
            let requested = Score::new(raw as i64);
            exec.request_abort(requested, actions[action], &format!("request {i}"), i as u64);

            let graph = exec.graph();
            prop_assert!(graph.abort_priority >= priority);
            prop_assert!(graph.completion_action >= completion_action);
            if requested > priority {
                prop_assert_eq!(graph.abort_priority, requested);
                let expected = format!("request {i}");
                prop_assert_eq!(graph.abort_reason.as_deref(), Some(expected.as_str()));
            } else {
                prop_assert_eq!(graph.abort_priority, priority);
            }
            priority = graph.abort_priority;
            completion_action = graph.completion_action;
        }
    }
}
