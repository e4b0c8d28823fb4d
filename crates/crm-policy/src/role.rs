//! Resource roles and the role transition table.

use serde::{Deserialize, Serialize};

use crm_core::tasks;

/// Role a resource instance plays on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Unknown,
    Stopped,
    Started,
    Slave,
    Master,
}

/// Outcome of a single role step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleStep {
    /// Nothing to execute, the role changes implicitly.
    Null,
    /// Execute this task on the node.
    Task(&'static str),
    /// The transition is not defined.
    Invalid,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unknown => "Unknown",
            Role::Stopped => "Stopped",
            Role::Started => "Started",
            Role::Slave => "Slave",
            Role::Master => "Master",
        }
    }

    /// Started, Slave and Master all count as running.
    pub fn is_active(&self) -> bool {
        matches!(self, Role::Started | Role::Slave | Role::Master)
    }

    /// The intermediate role on the way from `self` to `target`.
    pub fn next_towards(self, target: Role) -> Role {
        use Role::*;
        match (self, target) {
            (Unknown, Unknown) => Unknown,
            (Unknown, _) => Stopped,
            (_, Unknown) | (_, Stopped) if self != Master => Stopped,
            (Master, Stopped) | (Master, Slave) => Slave,
            (Master, Unknown) => Stopped,
            (Stopped, Started) => Started,
            (Stopped, Slave) | (Stopped, Master) => Slave,
            (Started, Started) => Started,
            (Started, Slave) => Slave,
            (Started, Master) => Master,
            (Slave, Started) => Unknown,
            (Slave, Slave) => Slave,
            (Slave, Master) => Master,
            (Master, Started) => Unknown,
            (Master, Master) => Master,
            _ => Unknown,
        }
    }

    /// What has to run to move one step from `self` to `next`.
    pub fn step(self, next: Role) -> RoleStep {
        use Role::*;
        match (self, next) {
            (Unknown, Stopped) => RoleStep::Task(tasks::STOP),
            (Stopped, Stopped) => RoleStep::Null,
            (Stopped, Started) | (Stopped, Slave) => RoleStep::Task(tasks::START),
            (Started, Stopped) | (Slave, Stopped) => RoleStep::Task(tasks::STOP),
            (Started, Started) | (Started, Slave) | (Slave, Slave) | (Master, Master) => RoleStep::Null,
            (Started, Master) | (Slave, Master) => RoleStep::Task(tasks::PROMOTE),
            (Master, Slave) => RoleStep::Task(tasks::DEMOTE),
            _ => RoleStep::Invalid,
        }
    }

    /// Every task needed to go from `self` to `target`, in order.
    ///
    /// Returns `None` when the table has no path.
    pub fn path_to(self, target: Role) -> Option<Vec<&'static str>> {
        let mut role = self;
        let mut out = Vec::new();
        // The longest path in the table is three steps.
        for _ in 0..4 {
            if role == target {
                return Some(out);
            }
            let next = role.next_towards(target);
            match role.step(next) {
                RoleStep::Null => {}
                RoleStep::Task(task) => out.push(task),
                RoleStep::Invalid => return None,
            }
            role = next;
        }
        None
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
