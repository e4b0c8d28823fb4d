//! Per-node resource scores.
//!
//! Scores are built in stages, each complete before the next:
//! - **Base**: 0 on every node that can run resources (symmetric clusters),
//!   −∞ on nodes that cannot
//! - **Locations**: location constraint weights added on top
//! - **Policy**: target role, orphans and the no-quorum policy
//! - **Stickiness**: bias toward the current node, added after colocation
//!   so exclusions always win

use tracing::{debug, info, warn};

use crm_core::Score;

use crate::document::NoQuorumPolicy;
use crate::role::Role;
use crate::working_set::WorkingSet;

/// Seed every leaf's score map.
pub fn init_scores(ws: &mut WorkingSet) {
    let symmetric = ws.options.symmetric_cluster;
    for leaf in ws.leaves() {
        let allowed = ws
            .node_indices()
            .filter_map(|node| {
                if !ws.node(node).can_run_resources() {
                    Some((node, Score::NEG_INFINITY))
                } else if symmetric {
                    Some((node, Score::ZERO))
                } else {
                    None
                }
            })
            .collect();
        ws.resource_mut(leaf).allowed = allowed;
    }
}

/// Add every location constraint to the resources it names.
pub fn apply_locations(ws: &mut WorkingSet) {
    for constraint in ws.locations.clone() {
        debug!(
            constraint = %constraint.id,
            resource = %ws.resource(constraint.rsc).id,
            node = %ws.node(constraint.node).uname,
            score = %constraint.score,
            "applying location"
        );
        let alloc = ws.resource(constraint.rsc).alloc();
        alloc.apply_location(ws, constraint.rsc, constraint.node, constraint.score, constraint.role);
    }
}

/// Exclude leaves that must not run this cycle: stopped by target role,
/// orphaned or failed to unpack.
pub fn apply_resource_policy(ws: &mut WorkingSet) {
    for leaf in ws.leaves() {
        let r = ws.resource(leaf);
        let reason = if r.orphan {
            "orphan"
        } else if r.unplaceable {
            "unplaceable"
        } else if r.target_role == Some(Role::Stopped) {
            "target role stopped"
        } else {
            continue;
        };
        debug!(resource = %r.id, reason, "excluded from every node");
        exclude_everywhere(ws, leaf);
    }
}

/// Apply the no-quorum policy when the partition lacks quorum.
pub fn apply_quorum_policy(ws: &mut WorkingSet) {
    if ws.have_quorum {
        return;
    }
    match ws.options.no_quorum_policy {
        NoQuorumPolicy::Ignore => {
            info!("no quorum, ignoring");
        }
        NoQuorumPolicy::Stop => {
            warn!("no quorum, stopping all resources");
            for leaf in ws.leaves() {
                exclude_everywhere(ws, leaf);
            }
        }
        NoQuorumPolicy::Freeze => {
            warn!("no quorum, freezing resources in place");
            for leaf in ws.leaves() {
                if ws.resource(leaf).running_on.is_empty() {
                    exclude_everywhere(ws, leaf);
                } else {
                    ws.resource_mut(leaf).managed = false;
                }
            }
        }
    }
}

/// Bias each running leaf toward the single node it runs on.
pub fn add_stickiness(ws: &mut WorkingSet) {
    for leaf in ws.leaves() {
        let r = ws.resource_mut(leaf);
        if !r.managed || r.failed || r.running_on.len() != 1 || r.stickiness == Score::ZERO {
            continue;
        }
        let current = r.running_on[0];
        if let Some(score) = r.allowed.get_mut(&current) {
            *score += r.stickiness;
            debug!(resource = %r.id, stickiness = %r.stickiness, score = %score, "stickiness applied");
        }
    }
}

fn exclude_everywhere(ws: &mut WorkingSet, leaf: crate::resource::RscIdx) {
    let allowed = ws.node_indices().map(|node| (node, Score::NEG_INFINITY)).collect();
    ws.resource_mut(leaf).allowed = allowed;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ClusterStatus, LocationDef, PrimitiveDef, ResourceDef};
    use crate::node::NodeIdx;
    use crate::working_set::tests::{online, quorate, running, sample_config};

    fn location(resource: &str, node: &str, score: Score) -> LocationDef {
        LocationDef {
            id: format!("loc-{resource}-{node}"),
            resource: resource.to_string(),
            node: node.to_string(),
            score,
            role: None,
        }
    }

    #[test]
    fn symmetric_cluster_allows_every_online_node() {
        let config = sample_config(&["n1", "n2", "n3"], vec![ResourceDef::Primitive(PrimitiveDef::new("a"))]);
        let mut n3 = online("n3");
        n3.standby = true;
        let mut ws = WorkingSet::unpack(Some(&config), &quorate(vec![online("n1"), online("n2"), n3])).unwrap();
        init_scores(&mut ws);
        let a = ws.resource(ws.find_resource("a").unwrap());
        assert_eq!(a.score_on(NodeIdx(0)), Score::ZERO);
        assert_eq!(a.score_on(NodeIdx(1)), Score::ZERO);
        assert!(a.score_on(NodeIdx(2)).is_excluded());
    }

    #[test]
    fn asymmetric_cluster_needs_a_location() {
        let mut config = sample_config(&["n1", "n2"], vec![ResourceDef::Primitive(PrimitiveDef::new("a"))]);
        config.options.symmetric_cluster = false;
        config.constraints.locations.push(location("a", "n2", Score::from(50)));
        let mut ws = WorkingSet::unpack(Some(&config), &quorate(vec![online("n1"), online("n2")])).unwrap();
        init_scores(&mut ws);
        apply_locations(&mut ws);
        let a = ws.resource(ws.find_resource("a").unwrap());
        assert!(a.score_on(NodeIdx(0)).is_excluded());
        assert_eq!(a.score_on(NodeIdx(1)), Score::from(50));
    }

    #[test]
    fn negative_infinity_location_wins_over_stickiness() {
        let mut config = sample_config(&["n1", "n2"], vec![ResourceDef::Primitive(PrimitiveDef::new("a"))]);
        config.options.default_resource_stickiness = 1000;
        config.constraints.locations.push(location("a", "n1", Score::NEG_INFINITY));
        let mut n1 = online("n1");
        n1.resources.push(running("a"));
        let mut ws = WorkingSet::unpack(Some(&config), &quorate(vec![n1, online("n2")])).unwrap();
        init_scores(&mut ws);
        apply_locations(&mut ws);
        add_stickiness(&mut ws);
        let a = ws.resource(ws.find_resource("a").unwrap());
        assert!(a.score_on(NodeIdx(0)).is_excluded());
    }

    #[test]
    fn stickiness_only_on_current_node() {
        let mut config = sample_config(&["n1", "n2"], vec![ResourceDef::Primitive(PrimitiveDef::new("a"))]);
        config.options.default_resource_stickiness = 100;
        let mut n2 = online("n2");
        n2.resources.push(running("a"));
        let mut ws = WorkingSet::unpack(Some(&config), &quorate(vec![online("n1"), n2])).unwrap();
        init_scores(&mut ws);
        add_stickiness(&mut ws);
        let a = ws.resource(ws.find_resource("a").unwrap());
        assert_eq!(a.score_on(NodeIdx(0)), Score::ZERO);
        assert_eq!(a.score_on(NodeIdx(1)), Score::from(100));
    }

    #[test]
    fn stop_policy_excludes_everything_without_quorum() {
        let config = sample_config(&["n1"], vec![ResourceDef::Primitive(PrimitiveDef::new("a"))]);
        let status = ClusterStatus {
            have_quorum: None,
            nodes: vec![online("n1")],
        };
        let mut ws = WorkingSet::unpack(Some(&config), &status).unwrap();
        init_scores(&mut ws);
        apply_quorum_policy(&mut ws);
        let a = ws.resource(ws.find_resource("a").unwrap());
        assert!(a.score_on(NodeIdx(0)).is_excluded());
    }

    #[test]
    fn freeze_policy_pins_running_resources() {
        let mut config = sample_config(
            &["n1"],
            vec![
                ResourceDef::Primitive(PrimitiveDef::new("a")),
                ResourceDef::Primitive(PrimitiveDef::new("b")),
            ],
        );
        config.options.no_quorum_policy = NoQuorumPolicy::Freeze;
        let mut n1 = online("n1");
        n1.resources.push(running("a"));
        let status = ClusterStatus {
            have_quorum: Some(false),
            nodes: vec![n1],
        };
        let mut ws = WorkingSet::unpack(Some(&config), &status).unwrap();
        init_scores(&mut ws);
        apply_quorum_policy(&mut ws);
        assert!(!ws.resource(ws.find_resource("a").unwrap()).managed);
        let b = ws.resource(ws.find_resource("b").unwrap());
        assert!(b.managed);
        assert!(b.score_on(NodeIdx(0)).is_excluded());
    }

    #[test]
    fn target_role_stopped_excludes_everywhere() {
        let mut a = PrimitiveDef::new("a");
        a.target_role = Some(Role::Stopped);
        let config = sample_config(&["n1"], vec![ResourceDef::Primitive(a)]);
        let mut ws = WorkingSet::unpack(Some(&config), &quorate(vec![online("n1")])).unwrap();
        init_scores(&mut ws);
        apply_resource_policy(&mut ws);
        let a = ws.resource(ws.find_resource("a").unwrap());
        assert!(a.score_on(NodeIdx(0)).is_excluded());
    }
}
