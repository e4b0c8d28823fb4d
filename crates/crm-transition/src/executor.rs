//! The transition graph executor.
//!
//! A pure state machine: every call to [`TransitionExecutor::handle`] takes
//! one inbound event plus the current monotonic time and returns the effects
//! the caller must carry out (dispatch an action, arm a timer, report the
//! outcome). Nothing in here blocks, sleeps or spawns.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crm_core::{
    ActionId, ActionKind, ActionTarget, CompletionAction, ExecutorConfig, GraphAction, Score, SynapseId,
    TransitionGraph, tasks,
};

use crate::error::TransitionResult;

/// Lifecycle of one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionState {
    Pending,
    Active,
    /// Every synapse confirmed with no abort recorded.
    Complete,
    /// Aborted; the controller should re-plan.
    Stopped,
    /// Aborted with a shutdown completion.
    Terminated,
    /// At least one action failed.
    ActionFailed,
    /// Stuck: nothing in flight, nothing eligible, not everything confirmed.
    Failed,
}

impl TransitionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransitionState::Pending | TransitionState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionState::Pending => "pending",
            TransitionState::Active => "active",
            TransitionState::Complete => "complete",
            TransitionState::Stopped => "stopped",
            TransitionState::Terminated => "terminated",
            TransitionState::ActionFailed => "action-failed",
            TransitionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Confirmed(ActionId),
    Failed(ActionId),
    Abort {
        priority: Score,
        action: CompletionAction,
        reason: String,
    },
    /// Timer wake-up. Checks deadlines and resumes throttled dispatch.
    Tick,
}

/// What the executor asks the outside world to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Dispatch(ActionRequest),
    /// Deliver a [`Event::Tick`] no later than this time.
    WakeAt(u64),
    Complete(GraphCompletion),
    /// Record a lost resource action as timed out in the cluster status.
    RecordLost(ActionRequest),
}

/// One action handed to an external executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub graph_id: u64,
    pub action_id: ActionId,
    pub synapse: SynapseId,
    pub task: String,
    pub key: String,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ActionTarget>,
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl ActionRequest {
    fn new(graph_id: u64, synapse: SynapseId, action: &GraphAction) -> Self {
        Self {
            graph_id,
            action_id: action.id,
            synapse,
            task: action.task.clone(),
            key: action.key.clone(),
            kind: action.kind,
            resource: action.resource.clone(),
            target: action.target.clone(),
            timeout_ms: action.timeout_ms,
            meta: action.meta.clone(),
        }
    }
}

/// Final report for the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCompletion {
    pub graph_id: u64,
    pub state: TransitionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub completion_action: CompletionAction,
}

pub struct TransitionExecutor {
    graph: TransitionGraph,
    config: ExecutorConfig,
    state: TransitionState,
    /// Dispatched, unconfirmed actions and their deadlines.
    in_flight: BTreeMap<ActionId, u64>,
    locate: HashMap<ActionId, (usize, usize)>,
    started_ms: u64,
    last_remote_dispatch_ms: Option<u64>,
    /// Set after a failure: nothing new is dispatched.
    halted: bool,
    timed_out: bool,
    last_wake: Option<u64>,
}

impl TransitionExecutor {
    /// Take ownership of a graph. The graph is validated first; a graph that
    /// breaks the structural invariants never starts.
    pub fn new(graph: TransitionGraph, config: ExecutorConfig) -> TransitionResult<Self> {
        graph.validate()?;

        let mut locate = HashMap::new();
        for (s, synapse) in graph.synapses.iter().enumerate() {
            for (a, action) in synapse.actions.iter().enumerate() {
                locate.insert(action.id, (s, a));
            }
        }

        Ok(Self {
            graph,
            config,
            state: TransitionState::Pending,
            in_flight: BTreeMap::new(),
            locate,
            started_ms: 0,
            last_remote_dispatch_ms: None,
            halted: false,
            timed_out: false,
            last_wake: None,
        })
    }

    pub fn graph(&self) -> &TransitionGraph {
        &self.graph
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// Ids of dispatched actions still waiting for an outcome.
    pub fn in_flight(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.in_flight.keys().copied()
    }

    /// Controller-side abort. Applies only when `priority` is strictly
    /// greater than the graph's current abort priority.
    pub fn request_abort(
        &mut self,
        priority: Score,
        action: CompletionAction,
        reason: &str,
        now_ms: u64,
    ) -> Vec<Effect> {
        self.handle(
            Event::Abort {
                priority,
                action,
                reason: reason.to_string(),
            },
            now_ms,
        )
    }

    /// Advance the state machine by one event.
    pub fn handle(&mut self, event: Event, now_ms: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state.is_terminal() {
            warn!(graph = self.graph.id, state = %self.state, ?event, "event after transition finished ignored");
            return effects;
        }

        match event {
            Event::Start => {
                if self.state != TransitionState::Pending {
                    warn!(graph = self.graph.id, "transition already started");
                    return effects;
                }
                self.state = TransitionState::Active;
                self.started_ms = now_ms;
                info!(
                    graph = self.graph.id,
                    actions = self.graph.num_actions,
                    synapses = self.graph.num_synapses,
                    "transition started"
                );
            }
            Event::Confirmed(id) => self.on_confirmed(id),
            Event::Failed(id) => self.on_failed(id),
            Event::Abort {
                priority,
                action,
                reason,
            } => {
                self.graph.update_abort_priority(priority, action, &reason);
            }
            Event::Tick => self.on_tick(now_ms, &mut effects),
        }

        if self.state == TransitionState::Active {
            self.pump(now_ms, &mut effects);
            self.check_complete(&mut effects);
            if self.state == TransitionState::Active {
                self.schedule_wake(now_ms, &mut effects);
            }
        }
        effects
    }

    fn take_in_flight(&mut self, id: ActionId, outcome: &str) -> Option<(usize, usize)> {
        let Some(&slot) = self.locate.get(&id) else {
            warn!(graph = self.graph.id, action = id, outcome, "result for unknown action ignored");
            return None;
        };
        if self.in_flight.remove(&id).is_none() {
            warn!(graph = self.graph.id, action = id, outcome, "result for action not in flight ignored");
            return None;
        }
        Some(slot)
    }

    fn on_confirmed(&mut self, id: ActionId) {
        let Some((s, a)) = self.take_in_flight(id, "confirmed") else {
            return;
        };
        let action = &mut self.graph.synapses[s].actions[a];
        action.confirmed = true;
        debug!(graph = self.graph.id, action = id, key = %action.key, "action confirmed");
    }

    fn on_failed(&mut self, id: ActionId) {
        let Some((s, a)) = self.take_in_flight(id, "failed") else {
            return;
        };
        let action = &mut self.graph.synapses[s].actions[a];
        action.failed = true;
        warn!(graph = self.graph.id, action = id, key = %action.key, "action failed");
        let reason = format!("action {} failed", action.key);
        self.fail_graph(CompletionAction::Stop, &reason);
    }

    fn on_tick(&mut self, now_ms: u64, effects: &mut Vec<Effect>) {
        // The timer that delivered this tick is spent.
        self.last_wake = None;
        let expired: Vec<ActionId> = self
            .in_flight
            .iter()
            .filter(|&(_, &deadline)| deadline <= now_ms)
            .map(|(&id, _)| id)
            .collect();
        for id in expired {
            self.in_flight.remove(&id);
            if let Some(&(s, a)) = self.locate.get(&id) {
                let (graph_id, synapse_id) = (self.graph.id, self.graph.synapses[s].id);
                let action = &mut self.graph.synapses[s].actions[a];
                action.failed = true;
                warn!(
                    graph = self.graph.id,
                    action = id,
                    key = %action.key,
                    timeout_ms = action.timeout_ms,
                    "action timed out, treating as lost"
                );
                let reason = format!("action {} timed out", action.key);
                // Cancellations and cluster-layer actions leave no status entry.
                if action.kind == ActionKind::Resource && action.task != tasks::CANCEL {
                    action.sent_update = true;
                    let request = ActionRequest::new(graph_id, synapse_id, action);
                    effects.push(Effect::RecordLost(request));
                }
                self.fail_graph(CompletionAction::Restart, &reason);
            }
        }

        let limit = self.graph.transition_timeout_ms;
        if !self.timed_out && limit > 0 && now_ms.saturating_sub(self.started_ms) >= limit {
            self.timed_out = true;
            warn!(graph = self.graph.id, timeout_ms = limit, "transition timed out");
            self.graph
                .update_abort_priority(Score::INFINITY, CompletionAction::Restart, "transition timed out");
        }
    }

    /// Abort at INFINITY, raise the completion action to at least `at_least`
    /// and stop admitting new work.
    fn fail_graph(&mut self, at_least: CompletionAction, reason: &str) {
        self.graph.update_abort_priority(Score::INFINITY, at_least, reason);
        self.graph.completion_action.escalate(at_least);
        self.halted = true;

        if self.config.confirm_in_flight_on_failure && !self.in_flight.is_empty() {
            let pending: Vec<ActionId> = std::mem::take(&mut self.in_flight).into_keys().collect();
            info!(graph = self.graph.id, count = pending.len(), "force-confirming in-flight actions");
            for id in pending {
                if let Some(&(s, a)) = self.locate.get(&id) {
                    self.graph.synapses[s].actions[a].confirmed = true;
                }
            }
        }
    }

    /// No new work once halted or once an abort escalated to shutdown.
    fn admits_work(&self) -> bool {
        !self.halted
            && !(self.graph.is_aborted() && self.graph.completion_action == CompletionAction::Shutdown)
    }

    fn is_confirmed(&self, id: ActionId) -> bool {
        self.locate
            .get(&id)
            .is_some_and(|&(s, a)| self.graph.synapses[s].actions[a].confirmed)
    }

    /// Whether synapse `s` still has undispatched actions and may fire now.
    fn ready(&self, s: usize) -> bool {
        let synapse = &self.graph.synapses[s];
        if synapse.executed() {
            return false;
        }
        if self.graph.is_aborted() && synapse.priority < self.graph.abort_priority {
            return false;
        }
        synapse.inputs.iter().all(|&input| self.is_confirmed(input))
    }

    fn has_ready(&self) -> bool {
        self.admits_work() && (0..self.graph.synapses.len()).any(|s| self.ready(s))
    }

    fn throttle_until(&self) -> Option<u64> {
        let delay = self.graph.network_delay_ms;
        match self.last_remote_dispatch_ms {
            Some(last) if delay > 0 => Some(last + delay),
            _ => None,
        }
    }

    /// Fire everything that may fire. Pseudo actions confirm on the spot,
    /// so keep scanning until a pass makes no progress.
    fn pump(&mut self, now_ms: u64, effects: &mut Vec<Effect>) {
        if !self.admits_work() {
            return;
        }

        loop {
            let mut progress = false;
            for s in 0..self.graph.synapses.len() {
                if !self.ready(s) {
                    continue;
                }
                progress |= self.fire(s, now_ms, effects);
            }
            if !progress {
                break;
            }
        }
    }

    fn fire(&mut self, s: usize, now_ms: u64, effects: &mut Vec<Effect>) -> bool {
        let mut progress = false;
        for a in 0..self.graph.synapses[s].actions.len() {
            let action = &self.graph.synapses[s].actions[a];
            if action.executed {
                continue;
            }

            if action.is_pseudo() {
                let action = &mut self.graph.synapses[s].actions[a];
                action.executed = true;
                action.confirmed = true;
                debug!(graph = self.graph.id, action = action.id, key = %action.key, "pseudo action confirmed");
                progress = true;
                continue;
            }

            let limit = self.graph.batch_limit as usize;
            if limit > 0 && self.in_flight.len() >= limit {
                debug!(graph = self.graph.id, limit, "batch limit reached");
                break;
            }
            if self.throttle_until().is_some_and(|resume| now_ms < resume) {
                break;
            }

            let synapse_id = self.graph.synapses[s].id;
            let graph_id = self.graph.id;
            let action = &mut self.graph.synapses[s].actions[a];
            action.executed = true;
            let request = ActionRequest::new(graph_id, synapse_id, action);
            info!(
                graph = graph_id,
                action = action.id,
                key = %action.key,
                target = action.target.as_ref().map(|t| t.uname.as_str()).unwrap_or("-"),
                "dispatching action"
            );
            self.in_flight.insert(action.id, now_ms + action.timeout_ms);
            self.last_remote_dispatch_ms = Some(now_ms);
            effects.push(Effect::Dispatch(request));
            progress = true;
        }
        progress
    }

    fn schedule_wake(&mut self, now_ms: u64, effects: &mut Vec<Effect>) {
        let mut wake = self.in_flight.values().copied().min();

        let throttled = self.throttle_until().filter(|&resume| resume > now_ms);
        if let Some(resume) = throttled.filter(|_| self.has_ready()) {
            wake = Some(wake.map_or(resume, |w| w.min(resume)));
        }

        let limit = self.graph.transition_timeout_ms;
        if !self.timed_out && limit > 0 {
            let deadline = self.started_ms + limit;
            wake = Some(wake.map_or(deadline, |w| w.min(deadline)));
        }

        if wake.is_some() && wake != self.last_wake {
            self.last_wake = wake;
            if let Some(at) = wake {
                effects.push(Effect::WakeAt(at));
            }
        }
    }

    fn check_complete(&mut self, effects: &mut Vec<Effect>) {
        if !self.in_flight.is_empty() || self.has_ready() {
            return;
        }

        let any_failed = self.graph.actions().any(|a| a.failed);
        let all_confirmed = self.graph.synapses.iter().all(|s| s.confirmed());
        let aborted = self.graph.is_aborted();

        self.state = if any_failed {
            TransitionState::ActionFailed
        } else if all_confirmed && !aborted {
            TransitionState::Complete
        } else if aborted && self.graph.completion_action == CompletionAction::Shutdown {
            TransitionState::Terminated
        } else if aborted {
            TransitionState::Stopped
        } else {
            error!(graph = self.graph.id, "transition stalled with unconfirmed synapses");
            TransitionState::Failed
        };

        self.graph.log_summary();
        info!(
            graph = self.graph.id,
            state = %self.state,
            completion = %self.graph.completion_action,
            reason = self.graph.abort_reason.as_deref().unwrap_or("-"),
            "transition finished"
        );
        effects.push(Effect::Complete(GraphCompletion {
            graph_id: self.graph.id,
            state: self.state,
            abort_reason: self.graph.abort_reason.clone(),
            completion_action: self.graph.completion_action,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::Synapse;

    fn action(id: ActionId, kind: ActionKind) -> GraphAction {
        GraphAction::new(id, "start", &format!("rsc{id}_start_0"), kind, 1_000)
    }

    fn synapse(id: SynapseId, actions: Vec<GraphAction>, inputs: Vec<ActionId>) -> Synapse {
        Synapse {
            id,
            priority: Score::ZERO,
            actions,
            inputs,
            advisory: Vec::new(),
        }
    }

    /// 0 -> pseudo 1 -> {2, 3}
    fn chain(batch_limit: u32, network_delay_ms: u64) -> TransitionGraph {
        let mut graph = TransitionGraph::new(3, batch_limit, network_delay_ms, 0);
        graph.push_synapse(synapse(0, vec![action(0, ActionKind::Resource)], vec![]));
        graph.push_synapse(synapse(1, vec![action(1, ActionKind::Pseudo)], vec![0]));
        graph.push_synapse(synapse(
            2,
            vec![action(2, ActionKind::Resource), action(3, ActionKind::Resource)],
            vec![1],
        ));
        graph
    }

    fn executor(graph: TransitionGraph) -> TransitionExecutor {
        TransitionExecutor::new(graph, ExecutorConfig::default()).unwrap()
    }

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

    #[test]
    fn rejects_invalid_graph() {
        let mut graph = chain(0, 0);
        graph.synapses[1].inputs.push(42);
        assert!(TransitionExecutor::new(graph, ExecutorConfig::default()).is_err());
    }

    #[test]
    fn runs_chain_to_completion() {
        let mut exec = executor(chain(0, 0));
        assert_eq!(exec.state(), TransitionState::Pending);

        let effects = exec.handle(Event::Start, 0);
        assert_eq!(dispatched(&effects), vec![0]);
        assert_eq!(exec.state(), TransitionState::Active);

        let effects = exec.handle(Event::Confirmed(0), 10);
        assert_eq!(dispatched(&effects), vec![2, 3]);
        assert!(exec.graph().synapses[1].confirmed());

        exec.handle(Event::Confirmed(2), 20);
        let effects = exec.handle(Event::Confirmed(3), 30);
        let done = completion(&effects).unwrap();
        assert_eq!(done.state, TransitionState::Complete);
        assert_eq!(done.completion_action, CompletionAction::Continue);
        assert_eq!(done.abort_reason, None);
        assert!(exec.state().is_terminal());
    }

    #[test]
    fn empty_graph_completes_on_start() {
        let mut exec = executor(TransitionGraph::new(1, 0, 0, 0));
        let effects = exec.handle(Event::Start, 0);
        assert_eq!(completion(&effects).unwrap().state, TransitionState::Complete);
    }

    #[test]
    fn unknown_and_duplicate_confirmations_are_ignored() {
        let mut exec = executor(chain(0, 0));
        exec.handle(Event::Start, 0);

        assert!(exec.handle(Event::Confirmed(99), 1).is_empty());
        // Not dispatched yet.
        assert!(dispatched(&exec.handle(Event::Confirmed(2), 1)).is_empty());
        assert!(!exec.graph().find_action(2).unwrap().confirmed);

        exec.handle(Event::Confirmed(0), 2);
        let again = exec.handle(Event::Confirmed(0), 3);
        assert!(dispatched(&again).is_empty());
        assert_eq!(exec.in_flight().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn failure_halts_dispatch_and_reports_action_failed() {
        let mut exec = executor(chain(0, 0));
        exec.handle(Event::Start, 0);

        let effects = exec.handle(Event::Failed(0), 5);
        assert!(dispatched(&effects).is_empty());
        let done = completion(&effects).unwrap();
        assert_eq!(done.state, TransitionState::ActionFailed);
        assert_eq!(done.completion_action, CompletionAction::Stop);
        assert_eq!(exec.graph().abort_priority, Score::INFINITY);
        assert!(!exec.graph().find_action(2).unwrap().executed);
    }

    #[test]
    fn failure_waits_for_in_flight_actions() {
        let mut exec = executor(chain(0, 0));
        exec.handle(Event::Start, 0);
        exec.handle(Event::Confirmed(0), 1);

        let effects = exec.handle(Event::Failed(2), 2);
        assert!(completion(&effects).is_none());
        assert_eq!(exec.in_flight().collect::<Vec<_>>(), vec![3]);

        let effects = exec.handle(Event::Confirmed(3), 3);
        assert_eq!(completion(&effects).unwrap().state, TransitionState::ActionFailed);
    }

    #[test]
    fn failure_can_force_confirm_in_flight() {
        let config = ExecutorConfig {
            confirm_in_flight_on_failure: true,
        };
        let mut exec = TransitionExecutor::new(chain(0, 0), config).unwrap();
        exec.handle(Event::Start, 0);
        exec.handle(Event::Confirmed(0), 1);

        let effects = exec.handle(Event::Failed(2), 2);
        assert_eq!(completion(&effects).unwrap().state, TransitionState::ActionFailed);
        assert!(exec.graph().find_action(3).unwrap().confirmed);
    }

    #[test]
    fn batch_limit_caps_in_flight() {
        let mut graph = TransitionGraph::new(5, 2, 0, 0);
        graph.push_synapse(synapse(
            0,
            (0..4).map(|id| action(id, ActionKind::Resource)).collect(),
            vec![],
        ));
        let mut exec = executor(graph);

        assert_eq!(dispatched(&exec.handle(Event::Start, 0)), vec![0, 1]);
        assert_eq!(dispatched(&exec.handle(Event::Confirmed(1), 1)), vec![2]);
        assert_eq!(dispatched(&exec.handle(Event::Confirmed(0), 2)), vec![3]);
    }

    #[test]
    fn network_delay_spaces_remote_dispatches() {
        let mut graph = TransitionGraph::new(6, 0, 100, 0);
        graph.push_synapse(synapse(
            0,
            vec![action(0, ActionKind::Resource), action(1, ActionKind::Cluster)],
            vec![],
        ));
        let mut exec = executor(graph);

        let effects = exec.handle(Event::Start, 0);
        assert_eq!(dispatched(&effects), vec![0]);
        assert!(effects.contains(&Effect::WakeAt(100)));

        assert!(dispatched(&exec.handle(Event::Tick, 50)).is_empty());
        assert_eq!(dispatched(&exec.handle(Event::Tick, 100)), vec![1]);
    }

    #[test]
    fn lost_action_fails_with_restart() {
        let mut exec = executor(chain(0, 0));
        let effects = exec.handle(Event::Start, 0);
        assert!(effects.contains(&Effect::WakeAt(1_000)));

        assert!(completion(&exec.handle(Event::Tick, 999)).is_none());
        let effects = exec.handle(Event::Tick, 1_000);
        let done = completion(&effects).unwrap();
        assert_eq!(done.state, TransitionState::ActionFailed);
        assert_eq!(done.completion_action, CompletionAction::Restart);
        let lost = exec.graph().find_action(0).unwrap();
        assert!(lost.failed);
        assert!(lost.sent_update);

        let recorded: Vec<&ActionRequest> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::RecordLost(request) => Some(request),
                _ => None,
            })
            .collect();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].key, "rsc0_start_0");
        assert_eq!(recorded[0].synapse, 0);
    }

    #[test]
    fn lost_cluster_action_is_not_recorded() {
        let mut graph = TransitionGraph::new(4, 0, 0, 0);
        graph.push_synapse(synapse(0, vec![action(0, ActionKind::Cluster)], vec![]));
        let mut exec = executor(graph);
        exec.handle(Event::Start, 0);

        let effects = exec.handle(Event::Tick, 1_000);
        assert!(!effects.iter().any(|e| matches!(e, Effect::RecordLost(_))));
        assert!(!exec.graph().find_action(0).unwrap().sent_update);
        assert_eq!(completion(&effects).unwrap().state, TransitionState::ActionFailed);
    }

    #[test]
    fn transition_timeout_aborts() {
        let mut graph = chain(0, 0);
        graph.transition_timeout_ms = 500;
        graph.synapses[0].actions[0].timeout_ms = 10_000;
        let mut exec = executor(graph);
        let effects = exec.handle(Event::Start, 0);
        assert!(effects.contains(&Effect::WakeAt(500)));

        exec.handle(Event::Tick, 500);
        assert_eq!(exec.graph().abort_priority, Score::INFINITY);
        assert_eq!(exec.graph().abort_reason.as_deref(), Some("transition timed out"));

        let effects = exec.handle(Event::Confirmed(0), 600);
        assert!(dispatched(&effects).is_empty());
        let done = completion(&effects).unwrap();
        assert_eq!(done.state, TransitionState::Stopped);
        assert_eq!(done.completion_action, CompletionAction::Restart);
    }

    #[test]
    fn abort_filters_low_priority_synapses() {
        let mut graph = chain(0, 0);
        graph.synapses[1].priority = Score::from(50);
        graph.synapses[2].priority = Score::from(5);
        graph.push_synapse(Synapse {
            priority: Score::from(50),
            ..synapse(3, vec![action(4, ActionKind::Resource)], vec![1])
        });
        let mut exec = executor(graph);
        exec.handle(Event::Start, 0);
        exec.request_abort(Score::from(10), CompletionAction::Restart, "new configuration", 1);

        let effects = exec.handle(Event::Confirmed(0), 2);
        assert_eq!(dispatched(&effects), vec![4]);
        let effects = exec.handle(Event::Confirmed(4), 3);
        let done = completion(&effects).unwrap();
        assert_eq!(done.state, TransitionState::Stopped);
        assert_eq!(done.abort_reason.as_deref(), Some("new configuration"));
    }

    #[test]
    fn shutdown_abort_dispatches_nothing() {
        let mut exec = executor(chain(0, 0));
        exec.handle(Event::Start, 0);
        exec.request_abort(Score::INFINITY, CompletionAction::Shutdown, "shutdown", 1);

        let effects = exec.handle(Event::Confirmed(0), 2);
        assert!(dispatched(&effects).is_empty());
        assert!(!exec.graph().find_action(1).unwrap().executed);
        assert_eq!(completion(&effects).unwrap().state, TransitionState::Terminated);
    }

    #[test]
    fn events_after_completion_are_ignored() {
        let mut exec = executor(TransitionGraph::new(1, 0, 0, 0));
        exec.handle(Event::Start, 0);
        assert!(exec.handle(Event::Start, 1).is_empty());
        assert!(exec.request_abort(Score::INFINITY, CompletionAction::Stop, "late", 2).is_empty());
        assert_eq!(exec.graph().abort_reason, None);
    }

    #[test]
    fn state_names() {
        assert_eq!(TransitionState::ActionFailed.as_str(), "action-failed");
        assert_eq!(
            serde_json::to_string(&TransitionState::ActionFailed).unwrap(),
            "\"action-failed\""
        );
        assert!(!TransitionState::Active.is_terminal());
        assert!(TransitionState::Terminated.is_terminal());
    }
}
