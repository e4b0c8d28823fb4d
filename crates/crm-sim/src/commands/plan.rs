use crm_core::TransitionGraph;
use crm_policy::{PolicyEngine, Transition};

use crate::Inputs;

pub fn plan(inputs: &Inputs, format: &str, describe: bool) -> anyhow::Result<()> {
    let (mut ws, engine) = super::load(inputs)?;
    let transition = PolicyEngine::new(engine).compute(&mut ws)?;
    if describe {
        println!("{}\n", ws.describe());
    }
    ws.release();

    match format {
        "json" => println!("{}", transition.graph.to_json()?),
        _ => println!("{}", format_transition(&transition)),
    }
    Ok(())
}

/// Plain-text rendering: placements, then one block per synapse.
pub fn format_transition(transition: &Transition) -> String {
    let mut out = String::new();
    out.push_str("Placement:\n");
    for (resource, node) in &transition.placements {
        let role = transition.roles.get(resource).map(|r| r.as_str()).unwrap_or("Unknown");
        out.push_str(&format!(
            "  {resource:<20} {:<12} {role}\n",
            node.as_deref().unwrap_or("(stopped)")
        ));
    }
    out.push('\n');
    out.push_str(&format_graph(&transition.graph));
    out
}

pub fn format_graph(graph: &TransitionGraph) -> String {
    let mut out = format!(
        "Transition {} ({} actions, {} synapses, batch-limit {})\n",
        graph.id, graph.num_actions, graph.num_synapses, graph.batch_limit
    );
    if graph.is_empty() {
        out.push_str("  nothing to do\n");
        return out;
    }
    for synapse in &graph.synapses {
        out.push_str(&format!("  Synapse {} [priority {}]\n", synapse.id, synapse.priority));
        for action in &synapse.actions {
            let target = action.target.as_ref().map(|t| t.uname.as_str()).unwrap_or("-");
            out.push_str(&format!(
                "    #{:<3} {:<32} {:<6} on {target}\n",
                action.id,
                action.key,
                action.kind.as_str()
            ));
        }
        for input in &synapse.inputs {
            let key = graph.find_action(*input).map(|a| a.key.as_str()).unwrap_or("?");
            out.push_str(&format!("      after #{input} {key}\n"));
        }
    }
    out
}
