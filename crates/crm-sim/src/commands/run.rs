use std::collections::HashSet;

use tokio::sync::watch;
use tracing::{info, warn};

use crm_core::ActionId;
use crm_policy::PolicyEngine;
use crm_transition::{ActionDispatcher, ActionRequest, DriverHandle, LogSink, TransitionDriver, TransitionExecutor};

use crate::Inputs;

/// Confirms every action on dispatch, except the ones it was told to fail.
struct SimDispatcher {
    handle: DriverHandle,
    fail: HashSet<ActionId>,
}

impl ActionDispatcher for SimDispatcher {
    fn dispatch(&mut self, request: ActionRequest) {
        let target = request.target.as_ref().map(|t| t.uname.as_str()).unwrap_or("-");
        let fail = self.fail.contains(&request.action_id);
        println!(
            "  #{:<3} {:<32} on {target:<12} {}",
            request.action_id,
            request.key,
            if fail { "FAILED" } else { "ok" }
        );
        let sent = if fail {
            self.handle.fail(request.action_id)
        } else {
            self.handle.confirm(request.action_id)
        };
        if sent.is_err() {
            warn!(action = request.action_id, "driver gone, result dropped");
        }
    }
}

pub async fn run(inputs: &Inputs, fail: &[u32], format: &str) -> anyhow::Result<()> {
    let (mut ws, engine) = super::load(inputs)?;
    let transition = PolicyEngine::new(engine.clone()).compute(&mut ws)?;
    ws.release();

    let executor = TransitionExecutor::new(transition.graph, engine.executor)?;
    let (driver, handle) = TransitionDriver::new(executor);
    let mut dispatcher = SimDispatcher {
        handle,
        fail: fail.iter().copied().collect(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let completion = driver.run(&mut dispatcher, &mut LogSink, shutdown_rx).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&completion)?),
        _ => {
            println!("Transition {}: {}", completion.graph_id, completion.state);
            println!("  completion action: {}", completion.completion_action);
            if let Some(reason) = &completion.abort_reason {
                println!("  abort reason: {reason}");
            }
        }
    }
    Ok(())
}
