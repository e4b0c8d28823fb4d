//! Input documents: the declarative configuration and the live status.
//!
//! Both are plain serde types. They can be read from JSON or TOML; the
//! format is picked from the file extension by [`load_document`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crm_core::Score;

use crate::error::UnpackError;
use crate::role::Role;

/// The declarative configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Configuration generation; becomes the transition graph id.
    pub epoch: u64,
    pub options: ClusterOptions,
    pub nodes: Vec<NodeDef>,
    pub resources: Vec<ResourceDef>,
    pub constraints: ConstraintSet,
}

/// What to do when the partition has no quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoQuorumPolicy {
    /// Keep running resources where they are, start nothing new.
    Freeze,
    /// Stop every resource.
    #[default]
    Stop,
    /// Carry on as if quorum was held.
    Ignore,
}

/// Cluster-wide options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    /// When false, resources may only run on nodes a location constraint names.
    pub symmetric_cluster: bool,
    pub no_quorum_policy: NoQuorumPolicy,
    pub default_resource_stickiness: i32,
    pub stonith_enabled: bool,
    pub stop_orphan_resources: bool,
    pub stop_orphan_actions: bool,
    /// Maximum actions in flight at once. 0 means unlimited.
    pub batch_limit: u32,
    pub network_delay_ms: u64,
    pub default_action_timeout_ms: u64,
    pub transition_timeout_ms: u64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            symmetric_cluster: true,
            no_quorum_policy: NoQuorumPolicy::Stop,
            default_resource_stickiness: 0,
            stonith_enabled: false,
            stop_orphan_resources: true,
            stop_orphan_actions: true,
            batch_limit: 30,
            network_delay_ms: 0,
            default_action_timeout_ms: 20_000,
            transition_timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDef {
    /// Node uuid. Defaults to the uname when omitted.
    #[serde(default)]
    pub id: String,
    pub uname: String,
}

fn default_managed() -> bool {
    true
}

/// A resource definition, tagged by variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceDef {
    Primitive(PrimitiveDef),
    Group(GroupDef),
    Clone(CloneDef),
    #[serde(rename = "master", alias = "primary")]
    Master(CloneDef),
}

impl ResourceDef {
    pub fn id(&self) -> &str {
        match self {
            ResourceDef::Primitive(def) => &def.id,
            ResourceDef::Group(def) => &def.id,
            ResourceDef::Clone(def) | ResourceDef::Master(def) => &def.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimitiveDef {
    pub id: String,
    /// Agent spec, e.g. `ocf:heartbeat:IPaddr`. Passed through to actions.
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub stickiness: Option<i32>,
    #[serde(default = "default_managed")]
    pub managed: bool,
    #[serde(default)]
    pub target_role: Option<Role>,
    #[serde(default)]
    pub ops: Vec<OpDef>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl PrimitiveDef {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            agent: String::new(),
            priority: 0,
            stickiness: None,
            managed: true,
            target_role: None,
            ops: Vec::new(),
            params: BTreeMap::new(),
        }
    }
}

/// An operation definition. `interval_ms > 0` makes it recurring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpDef {
    pub name: String,
    #[serde(default)]
    pub interval_ms: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Only run while the resource is in this role.
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDef {
    pub id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub stickiness: Option<i32>,
    #[serde(default = "default_managed")]
    pub managed: bool,
    #[serde(default)]
    pub target_role: Option<Role>,
    pub children: Vec<PrimitiveDef>,
}

/// Clone and primary-elect definitions share this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneDef {
    pub id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub stickiness: Option<i32>,
    #[serde(default = "default_managed")]
    pub managed: bool,
    #[serde(default)]
    pub target_role: Option<Role>,
    /// Total instances. Defaults to the number of configured nodes.
    #[serde(default)]
    pub clone_max: Option<u32>,
    /// Instances per node. Defaults to 1.
    #[serde(default)]
    pub clone_node_max: Option<u32>,
    /// Promoted instances (primary-elect only). Defaults to 1.
    #[serde(default)]
    pub master_max: Option<u32>,
    /// Promoted instances per node (primary-elect only). Defaults to 1.
    #[serde(default)]
    pub master_node_max: Option<u32>,
    pub child: CloneChild,
}

/// What a clone replicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloneChild {
    Primitive(PrimitiveDef),
    Group(GroupDef),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSet {
    pub locations: Vec<LocationDef>,
    pub colocations: Vec<ColocationDef>,
    pub orderings: Vec<OrderingDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationDef {
    pub id: String,
    pub resource: String,
    pub node: String,
    pub score: Score,
    /// Restrict to a role. `master` locations only feed promotion.
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColocationStrength {
    Must,
    MustNot,
    Ignore,
}

impl ColocationStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColocationStrength::Must => "must",
            ColocationStrength::MustNot => "must-not",
            ColocationStrength::Ignore => "ignore",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColocationDef {
    pub id: String,
    pub resource: String,
    pub with_resource: String,
    pub strength: ColocationStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// `then` may not run before `first` is confirmed.
    #[default]
    Mandatory,
    /// Recorded in the graph but never gates dispatch.
    Optional,
}

fn default_order_action() -> String {
    crm_core::tasks::START.to_string()
}

/// `first`/`first_action` must complete before `then`/`then_action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderingDef {
    pub id: String,
    pub first: String,
    #[serde(default = "default_order_action")]
    pub first_action: String,
    pub then: String,
    #[serde(default = "default_order_action")]
    pub then_action: String,
    #[serde(default)]
    pub kind: OrderKind,
    /// Also add the inverse ordering (e.g. stop `then` before stopping `first`).
    #[serde(default)]
    pub symmetrical: bool,
}

/// The live status document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterStatus {
    /// Absent means no quorum.
    pub have_quorum: Option<bool>,
    pub nodes: Vec<NodeStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStatus {
    pub uname: String,
    pub online: bool,
    /// Node state is unknown and must be fenced before it can be trusted.
    pub unclean: bool,
    pub shutdown: bool,
    pub standby: bool,
    pub resources: Vec<ResourceStatus>,
}

fn default_running_role() -> Role {
    Role::Started
}

/// One resource instance as seen on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub id: String,
    #[serde(default = "default_running_role")]
    pub role: Role,
    #[serde(default)]
    pub failed: bool,
    /// Recurring operations currently active for this instance.
    #[serde(default)]
    pub operations: Vec<OpStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpStatus {
    pub name: String,
    pub interval_ms: u64,
}

/// Read a JSON (`.json`) or TOML (anything else) document from disk.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, UnpackError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| UnpackError::InvalidDocument(format!("{}: {e}", path.display())))?;
    let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
    if is_json {
        serde_json::from_str(&content).map_err(|e| UnpackError::InvalidDocument(format!("{}: {e}", path.display())))
    } else {
        toml::from_str(&content).map_err(|e| UnpackError::InvalidDocument(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default() {
        let options = ClusterOptions::default();
        assert!(options.symmetric_cluster);
        assert_eq!(options.no_quorum_policy, NoQuorumPolicy::Stop);
        assert_eq!(options.batch_limit, 30);
        assert_eq!(options.default_action_timeout_ms, 20_000);
    }

    #[test]
    fn parses_json_config() {
        let config: ClusterConfig = serde_json::from_str(
            r#"{
                "epoch": 4,
                "options": { "default_resource_stickiness": 100 },
                "nodes": [ { "uname": "node1" } ],
                "resources": [
                    { "type": "primitive", "id": "ip", "ops": [ { "name": "monitor", "interval_ms": 10000 } ] },
                    { "type": "group", "id": "g", "children": [ { "id": "a" }, { "id": "b" } ] },
                    { "type": "master", "id": "ms", "child": { "type": "primitive", "id": "db" } }
                ],
                "constraints": {
                    "locations": [ { "id": "l1", "resource": "ip", "node": "node1", "score": "-INFINITY" } ],
                    "colocations": [ { "id": "c1", "resource": "ip", "with_resource": "g", "strength": "must-not" } ],
                    "orderings": [ { "id": "o1", "first": "ip", "then": "g" } ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.epoch, 4);
        assert_eq!(config.options.default_resource_stickiness, 100);
        assert!(config.options.stop_orphan_resources);
        assert_eq!(config.resources.len(), 3);
        assert_eq!(config.resources[2].id(), "ms");
        assert!(matches!(config.resources[2], ResourceDef::Master(_)));
        assert_eq!(config.constraints.locations[0].score, Score::NEG_INFINITY);
        assert_eq!(config.constraints.colocations[0].strength, ColocationStrength::MustNot);
        let order = &config.constraints.orderings[0];
        assert_eq!(order.first_action, "start");
        assert_eq!(order.kind, OrderKind::Mandatory);
        match &config.resources[0] {
            ResourceDef::Primitive(def) => assert!(def.managed),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_toml_status() {
        let status: ClusterStatus = toml::from_str(
            r#"
have_quorum = true

[[nodes]]
uname = "node1"
online = true

[[nodes.resources]]
id = "ip"
operations = [ { name = "monitor", interval_ms = 10000 } ]
"#,
        )
        .unwrap();
        assert_eq!(status.have_quorum, Some(true));
        assert_eq!(status.nodes[0].resources[0].role, Role::Started);
        assert_eq!(status.nodes[0].resources[0].operations[0].interval_ms, 10_000);
    }

    #[test]
    fn missing_quorum_attribute_is_none() {
        let status: ClusterStatus = serde_json::from_str(r#"{ "nodes": [] }"#).unwrap();
        assert_eq!(status.have_quorum, None);
    }
}
