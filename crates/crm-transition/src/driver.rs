//! Tokio driver for the executor.
//!
//! Owns a [`TransitionExecutor`], feeds it events from a channel and from
//! its own timer, and hands the resulting effects to the caller's
//! dispatcher and completion sink.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crm_core::{ActionId, CompletionAction, Score};

use crate::error::{TransitionError, TransitionResult};
use crate::executor::{ActionRequest, Effect, Event, GraphCompletion, TransitionExecutor};

/// Sends actions to whoever executes them. Outcomes come back through a
/// [`DriverHandle`].
pub trait ActionDispatcher {
    fn dispatch(&mut self, request: ActionRequest);

    /// Write a timed-out result for a lost action into the cluster status.
    fn record_lost(&mut self, request: ActionRequest) {
        warn!(graph = request.graph_id, action = request.action_id, key = %request.key, "lost action not recorded");
    }
}

/// Receives the final state of a transition.
pub trait CompletionSink {
    fn on_graph_complete(&mut self, completion: &GraphCompletion);
}

/// Sink that only logs.
#[derive(Debug, Default)]
pub struct LogSink;

impl CompletionSink for LogSink {
    fn on_graph_complete(&mut self, completion: &GraphCompletion) {
        info!(
            graph = completion.graph_id,
            state = %completion.state,
            completion = %completion.completion_action,
            "graph complete"
        );
    }
}

/// Cloneable handle for reporting outcomes and requesting aborts.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl DriverHandle {
    pub fn confirm(&self, id: ActionId) -> TransitionResult<()> {
        self.send(Event::Confirmed(id))
    }

    pub fn fail(&self, id: ActionId) -> TransitionResult<()> {
        self.send(Event::Failed(id))
    }

    pub fn request_abort(&self, priority: Score, action: CompletionAction, reason: &str) -> TransitionResult<()> {
        self.send(Event::Abort {
            priority,
            action,
            reason: reason.to_string(),
        })
    }

    fn send(&self, event: Event) -> TransitionResult<()> {
        self.tx.send(event).map_err(|_| TransitionError::ChannelClosed)
    }
}

pub struct TransitionDriver {
    executor: TransitionExecutor,
    rx: mpsc::UnboundedReceiver<Event>,
    origin: Instant,
}

impl TransitionDriver {
    pub fn new(executor: TransitionExecutor) -> (Self, DriverHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Self {
            executor,
            rx,
            origin: Instant::now(),
        };
        (driver, DriverHandle { tx })
    }

    pub fn executor(&self) -> &TransitionExecutor {
        &self.executor
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Carry out effects. Returns the completion once the graph finishes.
    fn apply<D, S>(
        &self,
        effects: Vec<Effect>,
        dispatcher: &mut D,
        sink: &mut S,
        wake: &mut Option<Instant>,
    ) -> Option<GraphCompletion>
    where
        D: ActionDispatcher,
        S: CompletionSink,
    {
        let mut finished = None;
        for effect in effects {
            match effect {
                Effect::Dispatch(request) => dispatcher.dispatch(request),
                Effect::RecordLost(request) => dispatcher.record_lost(request),
                Effect::WakeAt(at_ms) => {
                    debug!(at_ms, "timer armed");
                    *wake = Some(self.origin + Duration::from_millis(at_ms));
                }
                Effect::Complete(completion) => {
                    sink.on_graph_complete(&completion);
                    finished = Some(completion);
                }
            }
        }
        finished
    }

    /// Run the transition to completion.
    ///
    /// Setting `shutdown` to true requests an INFINITY shutdown abort:
    /// nothing new is dispatched and the graph ends as `terminated` once
    /// the in-flight actions report back.
    pub async fn run<D, S>(
        mut self,
        dispatcher: &mut D,
        sink: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) -> TransitionResult<GraphCompletion>
    where
        D: ActionDispatcher,
        S: CompletionSink,
    {
        if self.executor.state().is_terminal() {
            return Err(TransitionError::Finished);
        }

        let mut wake: Option<Instant> = None;
        let now = self.now_ms();
        let effects = self.executor.handle(Event::Start, now);
        if let Some(done) = self.apply(effects, dispatcher, sink, &mut wake) {
            return Ok(done);
        }

        let mut rx_open = true;
        let mut shutdown_open = true;
        loop {
            if !rx_open && wake.is_none() {
                return Err(TransitionError::ChannelClosed);
            }

            let event = tokio::select! {
                received = self.rx.recv(), if rx_open => match received {
                    Some(event) => event,
                    None => {
                        warn!(graph = self.executor.graph().id, "all driver handles dropped");
                        rx_open = false;
                        continue;
                    }
                },
                _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                    wake = None;
                    Event::Tick
                }
                changed = shutdown.changed(), if shutdown_open => match changed {
                    Ok(()) if *shutdown.borrow() => {
                        info!(graph = self.executor.graph().id, "shutdown requested, aborting transition");
                        Event::Abort {
                            priority: Score::INFINITY,
                            action: CompletionAction::Shutdown,
                            reason: "shutdown requested".to_string(),
                        }
                    }
                    Ok(()) => continue,
                    Err(_) => {
                        shutdown_open = false;
                        continue;
                    }
                },
                else => return Err(TransitionError::ChannelClosed),
            };

            let now = self.now_ms();
            let effects = self.executor.handle(event, now);
            if let Some(done) = self.apply(effects, dispatcher, sink, &mut wake) {
                return Ok(done);
            }
        }
    }
}
