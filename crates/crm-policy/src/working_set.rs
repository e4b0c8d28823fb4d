//! The working set: everything one scheduling cycle knows about the cluster.
//!
//! Built fresh from the configuration and status documents, owned by the
//! caller of the placement engine and released explicitly at the end of
//! the cycle. Nodes and resources live in arenas addressed by [`NodeIdx`]
//! and [`RscIdx`]; children are always stored after their parent.

use tracing::{debug, info, warn};

use crm_core::Score;

use crate::constraints::{Colocation, LocationConstraint, Ordering};
use crate::document::{
    CloneChild, CloneDef, ClusterConfig, ClusterOptions, ClusterStatus, ConstraintSet, GroupDef, NoQuorumPolicy,
    NodeDef, PrimitiveDef, ResourceDef, ResourceStatus,
};
use crate::error::UnpackError;
use crate::node::{Node, NodeIdx};
use crate::resource::{ActiveOp, CloneSettings, PromotionSettings, Resource, RscIdx, Variant};
use crate::role::Role;

/// Settings a child takes from its enclosing definition.
#[derive(Debug, Clone)]
struct Inherited {
    priority: i32,
    stickiness: Score,
    managed: bool,
    target_role: Option<Role>,
}

impl Inherited {
    fn merge(&self, priority: i32, stickiness: Option<i32>, managed: bool, target_role: Option<Role>) -> Self {
        Self {
            priority: if priority != 0 { priority } else { self.priority },
            stickiness: stickiness.map(Score::from).unwrap_or(self.stickiness),
            managed: self.managed && managed,
            target_role: target_role.or(self.target_role),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkingSet {
    pub options: ClusterOptions,
    pub epoch: u64,
    pub have_quorum: bool,
    pub nodes: Vec<Node>,
    pub resources: Vec<Resource>,
    /// Resources with no parent, in configuration order (orphans last).
    pub top_level: Vec<RscIdx>,
    pub locations: Vec<LocationConstraint>,
    pub colocations: Vec<Colocation>,
    pub orderings: Vec<Ordering>,
}

impl WorkingSet {
    /// Build the working set from the configuration and status documents.
    pub fn unpack(config: Option<&ClusterConfig>, status: &ClusterStatus) -> Result<Self, UnpackError> {
        let config = config.ok_or(UnpackError::MissingConfiguration)?;

        let mut ws = Self {
            options: config.options.clone(),
            epoch: config.epoch,
            have_quorum: status.have_quorum.unwrap_or(false),
            nodes: Vec::new(),
            resources: Vec::new(),
            top_level: Vec::new(),
            locations: Vec::new(),
            colocations: Vec::new(),
            orderings: Vec::new(),
        };

        ws.unpack_nodes(&config.nodes);
        ws.unpack_resources(&config.resources);
        ws.unpack_status(status)?;
        ws.unpack_constraints(&config.constraints);

        info!(
            epoch = ws.epoch,
            nodes = ws.nodes.len(),
            resources = ws.resources.len(),
            have_quorum = ws.have_quorum,
            "working set unpacked"
        );
        Ok(ws)
    }

    pub fn resource(&self, idx: RscIdx) -> &Resource {
        &self.resources[idx.0]
    }

    pub fn resource_mut(&mut self, idx: RscIdx) -> &mut Resource {
        &mut self.resources[idx.0]
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0]
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        &mut self.nodes[idx.0]
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIdx> + use<> {
        (0..self.nodes.len()).map(NodeIdx)
    }

    pub fn find_node(&self, uname: &str) -> Option<NodeIdx> {
        self.nodes.iter().position(|n| n.uname == uname).map(NodeIdx)
    }

    /// Find any resource, top-level or nested, by id.
    pub fn find_resource(&self, id: &str) -> Option<RscIdx> {
        self.top_level
            .iter()
            .find_map(|&top| self.resource(top).ops().find_child(self, top, id))
    }

    pub fn top_parent(&self, mut idx: RscIdx) -> RscIdx {
        while let Some(parent) = self.resource(idx).parent {
            idx = parent;
        }
        idx
    }

    /// Priority of the top-level resource containing `idx`.
    pub fn priority_of(&self, idx: RscIdx) -> Score {
        Score::from(self.resource(self.top_parent(idx)).priority)
    }

    /// Every placeable primitive, in configuration order.
    pub fn leaves(&self) -> Vec<RscIdx> {
        self.top_level
            .iter()
            .flat_map(|&top| self.resource(top).alloc().leaves(self, top))
            .collect()
    }

    /// Fencing may be used when enabled and the partition may act.
    pub fn fencing_allowed(&self) -> bool {
        self.options.stonith_enabled && (self.have_quorum || self.options.no_quorum_policy == NoQuorumPolicy::Ignore)
    }

    /// Status lines for every top-level resource.
    pub fn describe(&self) -> String {
        self.top_level
            .iter()
            .map(|&top| self.resource(top).ops().describe(self, top, 0))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// End the cycle, dropping all per-cycle state.
    pub fn release(mut self) {
        for top in self.top_level.clone() {
            self.resource(top).ops().release(&mut self, top);
        }
        debug!(epoch = self.epoch, "working set released");
    }

    /// A repeated node name keeps the first definition.
    fn unpack_nodes(&mut self, defs: &[NodeDef]) {
        for def in defs {
            if def.uname.is_empty() {
                warn!(id = %def.id, "node without a name ignored");
                continue;
            }
            if self.find_node(&def.uname).is_some() {
                warn!(node = %def.uname, "duplicate node ignored");
                continue;
            }
            let uuid = if def.id.is_empty() { &def.uname } else { &def.id };
            self.nodes.push(Node::new(uuid, &def.uname));
        }
    }

    /// A repeated resource id keeps the first definition.
    fn unpack_resources(&mut self, defs: &[ResourceDef]) {
        let defaults = Inherited {
            priority: 0,
            stickiness: Score::from(self.options.default_resource_stickiness),
            managed: true,
            target_role: None,
        };

        for def in defs {
            if self.find_resource(def.id()).is_some() {
                warn!(resource = %def.id(), "duplicate resource definition ignored");
                continue;
            }
            let idx = match def {
                ResourceDef::Primitive(p) => self.build_primitive(p, &p.id, None, &defaults),
                ResourceDef::Group(g) => self.build_group(g, None, None, &defaults),
                ResourceDef::Clone(c) => self.build_clone(c, false, &defaults),
                ResourceDef::Master(c) => self.build_clone(c, true, &defaults),
            };
            self.top_level.push(idx);

            let r = self.resource(idx);
            if let Err(e) = r.ops().unpack(self, idx) {
                warn!(resource = %r.id, error = %e, "resource cannot be placed this cycle");
                self.mark_unplaceable(idx);
            }
        }
    }

    fn push_resource(&mut self, resource: Resource) -> RscIdx {
        let idx = RscIdx(self.resources.len());
        self.resources.push(resource);
        idx
    }

    fn build_primitive(&mut self, def: &PrimitiveDef, id: &str, parent: Option<RscIdx>, inherited: &Inherited) -> RscIdx {
        let settings = inherited.merge(def.priority, def.stickiness, def.managed, def.target_role);
        let mut r = Resource::new(id, Variant::Primitive);
        r.parent = parent;
        r.agent = def.agent.clone();
        r.priority = settings.priority;
        r.stickiness = settings.stickiness;
        r.managed = settings.managed;
        r.target_role = settings.target_role;
        r.op_defs = def.ops.clone();
        r.params = def.params.clone();
        self.push_resource(r)
    }

    fn build_group(
        &mut self,
        def: &GroupDef,
        instance: Option<u32>,
        parent: Option<RscIdx>,
        inherited: &Inherited,
    ) -> RscIdx {
        let settings = inherited.merge(def.priority, def.stickiness, def.managed, def.target_role);
        let id = instance_id(&def.id, instance);
        let mut r = Resource::new(&id, Variant::Group { children: Vec::new() });
        r.parent = parent;
        r.priority = settings.priority;
        r.stickiness = settings.stickiness;
        r.managed = settings.managed;
        r.target_role = settings.target_role;
        let idx = self.push_resource(r);

        let children: Vec<RscIdx> = def
            .children
            .iter()
            .map(|child| self.build_primitive(child, &instance_id(&child.id, instance), Some(idx), &settings))
            .collect();
        self.resource_mut(idx).variant = Variant::Group { children };
        idx
    }

    fn build_clone(&mut self, def: &CloneDef, primary: bool, inherited: &Inherited) -> RscIdx {
        let settings = inherited.merge(def.priority, def.stickiness, def.managed, def.target_role);
        let clone_settings = CloneSettings {
            clone_max: def.clone_max.unwrap_or(self.nodes.len() as u32),
            clone_node_max: def.clone_node_max.unwrap_or(1),
        };
        let placeholder = if primary {
            Variant::Primary {
                instances: Vec::new(),
                settings: clone_settings.clone(),
                promotion: PromotionSettings {
                    master_max: def.master_max.unwrap_or(1),
                    master_node_max: def.master_node_max.unwrap_or(1),
                },
            }
        } else {
            Variant::Clone {
                instances: Vec::new(),
                settings: clone_settings.clone(),
            }
        };
        let mut r = Resource::new(&def.id, placeholder);
        r.priority = settings.priority;
        r.stickiness = settings.stickiness;
        r.managed = settings.managed;
        r.target_role = settings.target_role;
        let idx = self.push_resource(r);

        let built: Vec<RscIdx> = (0..clone_settings.clone_max)
            .map(|n| match &def.child {
                CloneChild::Primitive(p) => self.build_primitive(p, &instance_id(&p.id, Some(n)), Some(idx), &settings),
                CloneChild::Group(g) => self.build_group(g, Some(n), Some(idx), &settings),
            })
            .collect();

        match &mut self.resource_mut(idx).variant {
            Variant::Clone { instances, .. } | Variant::Primary { instances, .. } => *instances = built,
            _ => {}
        }
        debug!(clone = %def.id, instances = clone_settings.clone_max, primary, "clone instances built");
        idx
    }

    fn mark_unplaceable(&mut self, idx: RscIdx) {
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let r = self.resource_mut(current);
            r.unplaceable = true;
            stack.extend(r.children().iter().copied());
        }
    }

    fn unpack_status(&mut self, status: &ClusterStatus) -> Result<(), UnpackError> {
        let mut matched = 0usize;
        for ns in &status.nodes {
            let Some(node) = self.find_node(&ns.uname) else {
                warn!(node = %ns.uname, "status for unknown node dropped");
                continue;
            };
            matched += 1;

            let n = self.node_mut(node);
            n.online = ns.online;
            n.unclean = ns.unclean;
            n.shutdown = ns.shutdown;
            n.standby = ns.standby;

            if !ns.online && !ns.unclean {
                if !ns.resources.is_empty() {
                    debug!(node = %ns.uname, "node is cleanly offline, ignoring its resources");
                }
                continue;
            }
            for rs in &ns.resources {
                self.record_running(node, rs);
            }
        }

        if !status.nodes.is_empty() && matched == 0 {
            return Err(UnpackError::StatusNotCorrelated {
                listed: status.nodes.len(),
            });
        }

        // Containers report the aggregate role of their children.
        for i in 0..self.resources.len() {
            let idx = RscIdx(i);
            if self.resource(idx).children().is_empty() {
                continue;
            }
            let role = self.resource(idx).ops().state(self, idx, true);
            self.resource_mut(idx).role = role;
        }
        Ok(())
    }

    fn record_running(&mut self, node: NodeIdx, rs: &ResourceStatus) {
        if rs.role == Role::Stopped && !rs.failed {
            return;
        }
        let rsc = match self.find_resource(&rs.id) {
            Some(rsc) if self.resource(rsc).children().is_empty() => rsc,
            Some(_) => {
                warn!(resource = %rs.id, "status names a container, not an instance; ignored");
                return;
            }
            None => self.add_orphan(&rs.id),
        };

        let r = self.resource_mut(rsc);
        if !r.running_on.contains(&node) {
            r.running_on.push(node);
        }
        let role = if rs.role == Role::Unknown { Role::Started } else { rs.role };
        r.role = if r.role == Role::Stopped { role } else { r.role.max(role) };
        r.failed |= rs.failed;
        for op in &rs.operations {
            r.active_ops.push(ActiveOp {
                node,
                name: op.name.clone(),
                interval_ms: op.interval_ms,
            });
        }
        self.node_mut(node).running.push(rsc);
    }

    fn add_orphan(&mut self, id: &str) -> RscIdx {
        warn!(resource = %id, "resource in status but not configured, treating as orphan");
        let mut r = Resource::new(id, Variant::Primitive);
        r.orphan = true;
        r.managed = self.options.stop_orphan_resources;
        let idx = self.push_resource(r);
        self.top_level.push(idx);
        idx
    }

    fn unpack_constraints(&mut self, set: &ConstraintSet) {
        for def in &set.locations {
            let (Some(rsc), Some(node)) = (self.find_resource(&def.resource), self.find_node(&def.node)) else {
                warn!(constraint = %def.id, resource = %def.resource, node = %def.node, "location names unknown resource or node, dropped");
                continue;
            };
            self.locations.push(LocationConstraint {
                id: def.id.clone(),
                rsc,
                node,
                score: def.score,
                role: def.role,
            });
        }

        for def in &set.colocations {
            let (Some(rsc), Some(with)) = (self.find_resource(&def.resource), self.find_resource(&def.with_resource))
            else {
                warn!(constraint = %def.id, "colocation names unknown resource, dropped");
                continue;
            };
            if rsc == with {
                warn!(constraint = %def.id, "resource colocated with itself, dropped");
                continue;
            }
            self.colocations.push(Colocation {
                id: def.id.clone(),
                rsc,
                with,
                strength: def.strength,
            });
        }

        for def in &set.orderings {
            let (Some(first), Some(then)) = (self.find_resource(&def.first), self.find_resource(&def.then)) else {
                warn!(constraint = %def.id, "ordering names unknown resource, dropped");
                continue;
            };
            self.orderings.push(Ordering {
                id: def.id.clone(),
                first,
                first_task: def.first_action.clone(),
                then,
                then_task: def.then_action.clone(),
                kind: def.kind,
                symmetrical: def.symmetrical,
            });
        }
    }
}

fn instance_id(base: &str, instance: Option<u32>) -> String {
    match instance {
        Some(n) => format!("{base}:{n}"),
        None => base.to_string(),
    }
}
