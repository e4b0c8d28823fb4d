//! Constraints resolved against the working set.
//!
//! These are the document constraints with resource and node ids replaced
//! by arena indices. Constraints naming unknown resources or nodes are
//! dropped during unpack.

use crm_core::Score;

use crate::document::{ColocationStrength, OrderKind};
use crate::node::NodeIdx;
use crate::resource::RscIdx;
use crate::role::Role;

#[derive(Debug, Clone)]
pub struct LocationConstraint {
    pub id: String,
    pub rsc: RscIdx,
    pub node: NodeIdx,
    pub score: Score,
    pub role: Option<Role>,
}

#[derive(Debug, Clone)]
pub struct Colocation {
    pub id: String,
    pub rsc: RscIdx,
    pub with: RscIdx,
    pub strength: ColocationStrength,
}

#[derive(Debug, Clone)]
pub struct Ordering {
    pub id: String,
    pub first: RscIdx,
    pub first_task: String,
    pub then: RscIdx,
    pub then_task: String,
    pub kind: OrderKind,
    pub symmetrical: bool,
}

/// The task undoing `task`, used for symmetrical orderings.
pub fn invert_task(task: &str) -> Option<&'static str> {
    use crm_core::tasks::*;
    match task {
        START => Some(STOP),
        STOP => Some(START),
        PROMOTE => Some(DEMOTE),
        DEMOTE => Some(PROMOTE),
        RUNNING => Some(STOPPED),
        STOPPED => Some(RUNNING),
        PROMOTED => Some(DEMOTED),
        DEMOTED => Some(PROMOTED),
        _ => None,
    }
}
