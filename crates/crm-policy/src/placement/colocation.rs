//! Colocation propagation.
//!
//! `must` links merge leaves into sets that will share one placement
//! decision (the colors). Exclusions spread across a set: a node excluded
//! for one member is excluded for all. A `must` link naming a clone binds
//! each dependent leaf to the nodes the other side ends up on instead.
//! `must-not` links are kept as a symmetric per-leaf map and enforced while
//! colors are assigned. Both kinds are directed: the `with` side is placed
//! before the resource that depends on it.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crm_core::Score;

use crate::document::ColocationStrength;
use crate::node::NodeIdx;
use crate::resource::RscIdx;
use crate::working_set::WorkingSet;

/// Result of colocation propagation.
#[derive(Debug, Clone, Default)]
pub struct ColocationLinks {
    /// Leaves that must share a node, in first-seen leaf order.
    pub sets: Vec<Vec<RscIdx>>,
    /// Leaves that must never share a node with the key.
    pub anti: BTreeMap<RscIdx, BTreeSet<RscIdx>>,
    /// Leaves that may only run where a leaf of each listed group is placed.
    pub follow: BTreeMap<RscIdx, Vec<Vec<RscIdx>>>,
    /// `(dependent, anchor)` leaf pairs: the anchor is placed first.
    pub after: BTreeSet<(RscIdx, RscIdx)>,
}

impl ColocationLinks {
    pub fn anti_partners(&self, leaf: RscIdx) -> impl Iterator<Item = RscIdx> + '_ {
        self.anti.get(&leaf).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Groups of leaves `leaf` must share a node with one member of.
    pub fn anchors(&self, leaf: RscIdx) -> impl Iterator<Item = &[RscIdx]> + '_ {
        self.follow.get(&leaf).into_iter().flat_map(|groups| groups.iter().map(Vec::as_slice))
    }
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index stays the root so results do not depend on call order.
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Resolve all colocations against the current scores.
pub fn apply_colocations(ws: &mut WorkingSet) -> ColocationLinks {
    let mut links = ColocationLinks::default();
    let mut sets = DisjointSet::new(ws.resources.len());

    let mut internal = Vec::new();
    for &top in &ws.top_level {
        ws.resource(top).alloc().internal_colocations(ws, top, &mut internal);
    }
    for (a, b) in internal {
        sets.union(a.0, b.0);
    }

    for colocation in &ws.colocations {
        let rsc = ws.resource(colocation.rsc);
        let with = ws.resource(colocation.with);
        match colocation.strength {
            ColocationStrength::Must => {
                let left = rsc.alloc().leaves(ws, colocation.rsc);
                let right = with.alloc().leaves(ws, colocation.with);
                if rsc.alloc().colocates_per_instance() || with.alloc().colocates_per_instance() {
                    debug!(
                        constraint = %colocation.id,
                        resource = %rsc.id,
                        with = %with.id,
                        "must colocation resolved per instance"
                    );
                    for &l in &left {
                        links.follow.entry(l).or_default().push(right.clone());
                        links.after.extend(right.iter().map(|&r| (l, r)));
                    }
                    continue;
                }
                for &l in &left {
                    for &r in &right {
                        sets.union(l.0, r.0);
                    }
                }
            }
            ColocationStrength::MustNot => {
                let left = rsc.alloc().leaves(ws, colocation.rsc);
                let right = with.alloc().leaves(ws, colocation.with);
                for &l in &left {
                    for &r in &right {
                        links.anti.entry(l).or_default().insert(r);
                        links.anti.entry(r).or_default().insert(l);
                        links.after.insert((l, r));
                    }
                }
            }
            ColocationStrength::Ignore => {
                info!(constraint = %colocation.id, resource = %rsc.id, with = %with.id, "colocation ignored");
            }
        }
    }

    let mut by_root: BTreeMap<usize, usize> = BTreeMap::new();
    for leaf in ws.leaves() {
        let root = sets.find(leaf.0);
        let slot = *by_root.entry(root).or_insert_with(|| {
            links.sets.push(Vec::new());
            links.sets.len() - 1
        });
        links.sets[slot].push(leaf);
    }

    for set in &links.sets {
        if set.len() > 1 {
            merge_exclusions(ws, set);
        }
        for &a in set {
            if links.anti_partners(a).any(|b| set.contains(&b)) {
                warn!(resource = %ws.resource(a).id, "resource must and must not share a node; must-not ignored");
            }
        }
    }
    links
}

/// Spread exclusions across a must-colocated set.
fn merge_exclusions(ws: &mut WorkingSet, set: &[RscIdx]) {
    let nodes: Vec<NodeIdx> = ws.node_indices().collect();
    let mut excluded: BTreeSet<NodeIdx> = BTreeSet::new();

    for &leaf in set {
        let r = ws.resource(leaf);
        if r.managed {
            excluded.extend(nodes.iter().copied().filter(|&n| r.score_on(n).is_excluded()));
            continue;
        }
        // Unmanaged members stay where they are, or stay stopped.
        match r.running_on.as_slice() {
            [pinned] => excluded.extend(nodes.iter().copied().filter(|n| n != pinned)),
            _ => excluded.extend(nodes.iter().copied()),
        }
    }

    if excluded.is_empty() {
        return;
    }
    for &leaf in set {
        let r = ws.resource_mut(leaf);
        for &node in &excluded {
            r.allowed.insert(node, Score::NEG_INFINITY);
        }
        debug!(resource = %r.id, excluded = excluded.len(), "colocation exclusions merged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ColocationDef, GroupDef, LocationDef, PrimitiveDef, ResourceDef};
    use crate::placement::scorer;
    use crate::working_set::tests::{online, quorate, running, sample_config};

    fn colocate(a: &str, b: &str, strength: ColocationStrength) -> ColocationDef {
        ColocationDef {
            id: format!("col-{a}-{b}"),
            resource: a.to_string(),
            with_resource: b.to_string(),
            strength,
        }
    }

    fn prepared(config: &crate::document::ClusterConfig, nodes: Vec<crate::document::NodeStatus>) -> WorkingSet {
        let mut ws = WorkingSet::unpack(Some(config), &quorate(nodes)).unwrap();
        scorer::init_scores(&mut ws);
        scorer::apply_locations(&mut ws);
        scorer::apply_resource_policy(&mut ws);
        ws
    }

    #[test]
    fn must_merges_sets_and_exclusions() {
        let mut config = sample_config(
            &["n1", "n2"],
            vec![
                ResourceDef::Primitive(PrimitiveDef::new("a")),
                ResourceDef::Primitive(PrimitiveDef::new("b")),
            ],
        );
        config.constraints.colocations.push(colocate("a", "b", ColocationStrength::Must));
        config.constraints.locations.push(LocationDef {
            id: "no-b-n1".to_string(),
            resource: "b".to_string(),
            node: "n1".to_string(),
            score: Score::NEG_INFINITY,
            role: None,
        });
        let mut ws = prepared(&config, vec![online("n1"), online("n2")]);
        let links = apply_colocations(&mut ws);
        assert_eq!(links.sets.len(), 1);
        let a = ws.resource(ws.find_resource("a").unwrap());
        assert!(a.score_on(NodeIdx(0)).is_excluded());
        assert_eq!(a.score_on(NodeIdx(1)), Score::ZERO);
    }

    #[test]
    fn group_children_share_a_set() {
        let group = GroupDef {
            id: "g".to_string(),
            priority: 0,
            stickiness: None,
            managed: true,
            target_role: None,
            children: vec![PrimitiveDef::new("a"), PrimitiveDef::new("b"), PrimitiveDef::new("c")],
        };
        let config = sample_config(
            &["n1"],
            vec![ResourceDef::Group(group), ResourceDef::Primitive(PrimitiveDef::new("d"))],
        );
        let mut ws = prepared(&config, vec![online("n1")]);
        let links = apply_colocations(&mut ws);
        assert_eq!(links.sets.len(), 2);
        assert_eq!(links.sets[0].len(), 3);
    }

    #[test]
    fn must_not_is_symmetric() {
        let mut config = sample_config(
            &["n1", "n2"],
            vec![
                ResourceDef::Primitive(PrimitiveDef::new("x")),
                ResourceDef::Primitive(PrimitiveDef::new("y")),
            ],
        );
        config.constraints.colocations.push(colocate("x", "y", ColocationStrength::MustNot));
        let mut ws = prepared(&config, vec![online("n1"), online("n2")]);
        let links = apply_colocations(&mut ws);
        let x = ws.find_resource("x").unwrap();
        let y = ws.find_resource("y").unwrap();
        assert!(links.anti_partners(x).any(|p| p == y));
        assert!(links.anti_partners(y).any(|p| p == x));
        assert_eq!(links.sets.len(), 2);
        assert!(links.after.contains(&(x, y)));
        assert!(!links.after.contains(&(y, x)));
    }

    #[test]
    fn must_with_clone_follows_each_instance() {
        let clone = crate::document::CloneDef {
            id: "db-clone".to_string(),
            priority: 0,
            stickiness: None,
            managed: true,
            target_role: None,
            clone_max: Some(2),
            clone_node_max: None,
            master_max: None,
            master_node_max: None,
            child: crate::document::CloneChild::Primitive(PrimitiveDef::new("db")),
        };
        let mut config = sample_config(
            &["n1", "n2"],
            vec![ResourceDef::Primitive(PrimitiveDef::new("ip")), ResourceDef::Clone(clone)],
        );
        config.constraints.colocations.push(colocate("ip", "db-clone", ColocationStrength::Must));
        let mut ws = prepared(&config, vec![online("n1"), online("n2")]);
        let links = apply_colocations(&mut ws);

        let ip = ws.find_resource("ip").unwrap();
        let db0 = ws.find_resource("db:0").unwrap();
        let db1 = ws.find_resource("db:1").unwrap();
        assert_eq!(links.sets.len(), 3);
        assert_eq!(links.anchors(ip).collect::<Vec<_>>(), vec![&[db0, db1][..]]);
        assert!(links.after.contains(&(ip, db0)));
        assert!(links.after.contains(&(ip, db1)));
    }

    #[test]
    fn unmanaged_partner_pins_the_set() {
        let mut pinned = PrimitiveDef::new("pinned");
        pinned.managed = false;
        let mut config = sample_config(
            &["n1", "n2"],
            vec![ResourceDef::Primitive(pinned), ResourceDef::Primitive(PrimitiveDef::new("a"))],
        );
        config.constraints.colocations.push(colocate("a", "pinned", ColocationStrength::Must));
        let mut n2 = online("n2");
        n2.resources.push(running("pinned"));
        let mut ws = prepared(&config, vec![online("n1"), n2]);
        apply_colocations(&mut ws);
        let a = ws.resource(ws.find_resource("a").unwrap());
        assert!(a.score_on(NodeIdx(0)).is_excluded());
        assert!(!a.score_on(NodeIdx(1)).is_excluded());
    }

    #[test]
    fn disjoint_set_roots_are_lowest_index() {
        let mut sets = DisjointSet::new(4);
        sets.union(3, 2);
        sets.union(2, 1);
        assert_eq!(sets.find(3), 1);
        assert_eq!(sets.find(0), 0);
    }
}
