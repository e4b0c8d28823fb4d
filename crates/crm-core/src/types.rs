//! Shared identifiers and small enums used across the crm crates.

use serde::{Deserialize, Serialize};

/// Identifier of an action inside one transition graph.
pub type ActionId = u32;

/// Identifier of a synapse inside one transition graph.
pub type SynapseId = u32;

/// Identifier of a resource in the configuration document.
pub type ResourceId = String;

/// Cluster-unique node name.
pub type NodeName = String;

/// Well-known task names.
pub mod tasks {
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const PROMOTE: &str = "promote";
    pub const DEMOTE: &str = "demote";
    pub const MONITOR: &str = "monitor";
    pub const CANCEL: &str = "cancel";

    // Completion markers for composite resources (always pseudo).
    pub const RUNNING: &str = "running";
    pub const STOPPED: &str = "stopped";
    pub const PROMOTED: &str = "promoted";
    pub const DEMOTED: &str = "demoted";

    // Node-level cluster actions.
    pub const SHUTDOWN: &str = "do_shutdown";
    pub const FENCE: &str = "stonith";
}

/// Build the operation key `{resource}_{task}_{interval}`.
pub fn op_key(resource: &str, task: &str, interval_ms: u64) -> String {
    format!("{resource}_{task}_{interval_ms}")
}

/// How an action is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Synthetic: no external execution, confirms itself on dispatch.
    Pseudo,
    /// Executed by the local resource executor on the target node.
    Resource,
    /// Executed by the cluster layer (shutdown, fencing).
    Cluster,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Pseudo => "pseudo",
            ActionKind::Resource => "rsc",
            ActionKind::Cluster => "crm",
        }
    }
}

/// What the controller should do once the transition ends.
///
/// Ordered by severity: `Continue < Stop < Restart < Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionAction {
    #[default]
    Continue,
    Stop,
    Restart,
    Shutdown,
}

impl CompletionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionAction::Continue => "continue",
            CompletionAction::Stop => "stop",
            CompletionAction::Restart => "restart",
            CompletionAction::Shutdown => "shutdown",
        }
    }

    /// Raise `self` to `other` if `other` is more severe. Returns true on change.
    pub fn escalate(&mut self, other: CompletionAction) -> bool {
        if other > *self {
            *self = other;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Display for CompletionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_severity_order() {
        assert!(CompletionAction::Continue < CompletionAction::Stop);
        assert!(CompletionAction::Stop < CompletionAction::Restart);
        assert!(CompletionAction::Restart < CompletionAction::Shutdown);
    }

    #[test]
    fn escalate_never_lowers() {
        let mut action = CompletionAction::Restart;
        assert!(!action.escalate(CompletionAction::Stop));
        assert_eq!(action, CompletionAction::Restart);
        assert!(action.escalate(CompletionAction::Shutdown));
        assert_eq!(action, CompletionAction::Shutdown);
    }

    #[test]
    fn op_key_format() {
        assert_eq!(op_key("db", "monitor", 10000), "db_monitor_10000");
        assert_eq!(op_key("web:0", tasks::START, 0), "web:0_start_0");
    }
}
