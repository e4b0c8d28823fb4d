//! Resources and variant dispatch.
//!
//! Every resource lives in the working set arena and is addressed by
//! [`RscIdx`]. Its [`Variant`] is a closed enum; the behaviour for each
//! variant is reached only through the two capability tables,
//! [`VariantOps`] (inspection) and [`AllocOps`] (placement hooks).
//! Containers hold the indices of their children and answer by
//! delegating to the children's tables.
//!
//! # Components
//!
//! - **`primitive`** — A single agent-backed resource
//! - **`group`** — Ordered, colocated list of primitives
//! - **`clone`** — Clone and primary-elect (master/slave) sets

pub mod clone;
pub mod group;
pub mod primitive;

use std::collections::BTreeMap;

use crm_core::{ResourceId, Score};

use crate::actions::ActionPlan;
use crate::document::OpDef;
use crate::error::UnpackError;
use crate::node::NodeIdx;
use crate::role::Role;
use crate::working_set::WorkingSet;

pub use clone::{CloneOps, PrimaryOps};
pub use group::GroupOps;
pub use primitive::PrimitiveOps;

/// Index of a resource in the working set arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RscIdx(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneSettings {
    pub clone_max: u32,
    pub clone_node_max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionSettings {
    pub master_max: u32,
    pub master_node_max: u32,
}

/// Composition policy of a resource.
#[derive(Debug, Clone)]
pub enum Variant {
    Primitive,
    Group {
        children: Vec<RscIdx>,
    },
    Clone {
        instances: Vec<RscIdx>,
        settings: CloneSettings,
    },
    /// Clone whose instances run as Slave, some promoted to Master.
    Primary {
        instances: Vec<RscIdx>,
        settings: CloneSettings,
        promotion: PromotionSettings,
    },
}

impl Variant {
    pub fn ops(&self) -> &'static dyn VariantOps {
        match self {
            Variant::Primitive => &PrimitiveOps,
            Variant::Group { .. } => &GroupOps,
            Variant::Clone { .. } => &CloneOps,
            Variant::Primary { .. } => &PrimaryOps,
        }
    }

    pub fn alloc(&self) -> &'static dyn AllocOps {
        match self {
            Variant::Primitive => &PrimitiveOps,
            Variant::Group { .. } => &GroupOps,
            Variant::Clone { .. } => &CloneOps,
            Variant::Primary { .. } => &PrimaryOps,
        }
    }

    pub fn children(&self) -> &[RscIdx] {
        match self {
            Variant::Primitive => &[],
            Variant::Group { children } => children,
            Variant::Clone { instances, .. } | Variant::Primary { instances, .. } => instances,
        }
    }
}

/// A recurring operation found active in status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOp {
    pub node: NodeIdx,
    pub name: String,
    pub interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub variant: Variant,
    pub parent: Option<RscIdx>,
    pub agent: String,
    pub priority: i32,
    pub stickiness: Score,
    pub managed: bool,
    /// Present in status but not in the configuration.
    pub orphan: bool,
    /// Failed to unpack; never placed this cycle.
    pub unplaceable: bool,
    pub failed: bool,
    pub target_role: Option<Role>,
    pub role: Role,
    pub next_role: Role,
    pub running_on: Vec<NodeIdx>,
    /// Per-node placement score. A missing node is not allowed.
    pub allowed: BTreeMap<NodeIdx, Score>,
    /// `role = master` location scores (primary-elect only).
    pub promotion: BTreeMap<NodeIdx, Score>,
    pub allocated_to: Option<NodeIdx>,
    pub op_defs: Vec<OpDef>,
    pub active_ops: Vec<ActiveOp>,
    pub params: BTreeMap<String, String>,
}

impl Resource {
    pub fn new(id: &str, variant: Variant) -> Self {
        Self {
            id: id.to_string(),
            variant,
            parent: None,
            agent: String::new(),
            priority: 0,
            stickiness: Score::ZERO,
            managed: true,
            orphan: false,
            unplaceable: false,
            failed: false,
            target_role: None,
            role: Role::Stopped,
            next_role: Role::Unknown,
            running_on: Vec::new(),
            allowed: BTreeMap::new(),
            promotion: BTreeMap::new(),
            allocated_to: None,
            op_defs: Vec::new(),
            active_ops: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn ops(&self) -> &'static dyn VariantOps {
        self.variant.ops()
    }

    pub fn alloc(&self) -> &'static dyn AllocOps {
        self.variant.alloc()
    }

    pub fn children(&self) -> &[RscIdx] {
        self.variant.children()
    }

    /// Score on `node`; nodes absent from the map are excluded.
    pub fn score_on(&self, node: NodeIdx) -> Score {
        self.allowed.get(&node).copied().unwrap_or(Score::NEG_INFINITY)
    }

    /// Timeout for a non-recurring operation, falling back to `default_ms`.
    pub fn op_timeout(&self, task: &str, default_ms: u64) -> u64 {
        self.op_defs
            .iter()
            .find(|op| op.name == task && op.interval_ms == 0)
            .and_then(|op| op.timeout_ms)
            .unwrap_or(default_ms)
    }
}

/// Inspection capabilities every variant provides.
pub trait VariantOps: Sync {
    fn kind(&self) -> &'static str;

    /// Validate the resource (and its children) after construction.
    fn unpack(&self, ws: &WorkingSet, rsc: RscIdx) -> Result<(), UnpackError>;

    /// Find `rsc` itself or a descendant by id.
    fn find_child(&self, ws: &WorkingSet, rsc: RscIdx, id: &str) -> Option<RscIdx>;

    /// Look up an instance parameter.
    fn parameter(&self, ws: &WorkingSet, rsc: RscIdx, name: &str) -> Option<String>;

    /// Human-readable status lines.
    fn describe(&self, ws: &WorkingSet, rsc: RscIdx, indent: usize) -> String;

    fn is_active(&self, ws: &WorkingSet, rsc: RscIdx) -> bool;

    /// Current role, or the role after the transition when `current` is false.
    fn state(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Role;

    /// Nodes the resource runs on now (`current`) or is allocated to.
    fn location(&self, ws: &WorkingSet, rsc: RscIdx, current: bool) -> Vec<NodeIdx>;

    /// Drop per-cycle placement state.
    fn release(&self, ws: &mut WorkingSet, rsc: RscIdx);
}

/// Placement hooks every variant provides.
pub trait AllocOps: Sync {
    /// Primitives that get placed individually.
    fn leaves(&self, ws: &WorkingSet, rsc: RscIdx) -> Vec<RscIdx>;

    fn apply_location(&self, ws: &mut WorkingSet, rsc: RscIdx, node: NodeIdx, score: Score, role: Option<Role>);

    /// Implicit `must` colocations between leaves.
    fn internal_colocations(&self, ws: &WorkingSet, rsc: RscIdx, out: &mut Vec<(RscIdx, RscIdx)>);

    /// Whether `must` colocations naming this resource bind each instance
    /// to the partner's nodes instead of merging into one color.
    fn colocates_per_instance(&self) -> bool;

    /// Per-node cap on this container's instances.
    fn instance_node_limit(&self, ws: &WorkingSet, rsc: RscIdx) -> Option<u32>;

    /// Decide `next_role` once allocation is done.
    fn assign_roles(&self, ws: &mut WorkingSet, rsc: RscIdx);

    fn create_actions(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan);

    fn internal_constraints(&self, ws: &WorkingSet, rsc: RscIdx, plan: &mut ActionPlan);

    /// Task that marks `task` as finished for ordering purposes.
    fn completion_task<'a>(&self, task: &'a str) -> &'a str;
}

/// Append each child's description under `header`, one level deeper.
pub(crate) fn describe_children(ws: &WorkingSet, header: String, children: &[RscIdx], indent: usize) -> String {
    let mut out = header;
    for &child in children {
        out.push('\n');
        out.push_str(&ws.resource(child).ops().describe(ws, child, indent + 1));
    }
    out
}
