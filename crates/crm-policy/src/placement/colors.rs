//! Colors: sets of leaves that share one placement decision.
//!
//! Colors are assigned one at a time, highest priority first, except that
//! a color always comes after the colors its members are colocated with.
//! Each takes the eligible node with the highest summed score; ties fall
//! through the configured tie-break chain and finally to node name.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crm_core::{Score, TieBreak};

use crate::node::NodeIdx;
use crate::placement::colocation::ColocationLinks;
use crate::resource::RscIdx;
use crate::working_set::WorkingSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Color {
    pub id: usize,
    pub members: Vec<RscIdx>,
    /// Highest top-level priority among the members.
    pub priority: Score,
    /// Lowest member id, for stable ordering.
    pub key: String,
    pub chosen: Option<NodeIdx>,
}

impl Color {
    /// Summed member score on `node`.
    pub fn score_on(&self, ws: &WorkingSet, node: NodeIdx) -> Score {
        self.members.iter().map(|&m| ws.resource(m).score_on(node)).sum()
    }
}

/// Build one color per colocation set, ordered for assignment.
///
/// Unmanaged leaves are not colored; they keep their current node.
pub fn build_colors(ws: &WorkingSet, links: &ColocationLinks, tie_break: &[TieBreak]) -> Vec<Color> {
    let mut colors: Vec<Color> = links
        .sets
        .iter()
        .filter_map(|set| {
            let members: Vec<RscIdx> = set.iter().copied().filter(|&m| ws.resource(m).managed).collect();
            let key = members.iter().map(|&m| ws.resource(m).id.clone()).min()?;
            let priority = members.iter().map(|&m| ws.priority_of(m)).max().unwrap_or(Score::ZERO);
            Some(Color {
                id: 0,
                members,
                priority,
                key,
                chosen: None,
            })
        })
        .collect();

    colors.sort_by(|a, b| compare_colors(a, b, tie_break));
    let mut colors = order_by_dependencies(ws, colors, links);
    for (id, color) in colors.iter_mut().enumerate() {
        color.id = id;
    }
    colors
}

/// Stable topological pass over the priority order: the next color is the
/// first one whose anchors are all placed. A dependency loop falls back to
/// plain priority order.
fn order_by_dependencies(ws: &WorkingSet, colors: Vec<Color>, links: &ColocationLinks) -> Vec<Color> {
    let color_of: BTreeMap<RscIdx, usize> = colors
        .iter()
        .enumerate()
        .flat_map(|(c, color)| color.members.iter().map(move |&m| (m, c)))
        .collect();

    let mut needs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); colors.len()];
    for (dependent, anchor) in &links.after {
        match (color_of.get(dependent), color_of.get(anchor)) {
            (Some(&d), Some(&a)) if d != a => {
                needs[d].insert(a);
            }
            _ => {}
        }
    }

    let mut done = vec![false; colors.len()];
    let mut order = Vec::with_capacity(colors.len());
    while order.len() < colors.len() {
        let ready = (0..colors.len()).find(|&c| !done[c] && needs[c].iter().all(|&a| done[a]));
        let next = match ready {
            Some(c) => c,
            None => {
                let Some(c) = (0..colors.len()).find(|&c| !done[c]) else {
                    break;
                };
                warn!(resources = %member_ids(ws, &colors[c]), "colocation dependency loop, placing by priority");
                c
            }
        };
        done[next] = true;
        order.push(next);
    }

    let mut slots: Vec<Option<Color>> = colors.into_iter().map(Some).collect();
    order.into_iter().filter_map(|c| slots[c].take()).collect()
}

fn compare_colors(a: &Color, b: &Color, tie_break: &[TieBreak]) -> Ordering {
    for link in tie_break {
        let ord = match link {
            TieBreak::Priority => b.priority.cmp(&a.priority),
            TieBreak::Id => a.key.cmp(&b.key),
            TieBreak::FewestResources => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.key.cmp(&b.key)
}

fn compare_nodes(ws: &WorkingSet, a: (NodeIdx, Score), b: (NodeIdx, Score), tie_break: &[TieBreak]) -> Ordering {
    let by_score = b.1.cmp(&a.1);
    if by_score != Ordering::Equal {
        return by_score;
    }
    let (na, nb) = (ws.node(a.0), ws.node(b.0));
    for link in tie_break {
        let ord = match link {
            TieBreak::FewestResources => na.allocated.len().cmp(&nb.allocated.len()),
            TieBreak::Id => na.uname.cmp(&nb.uname),
            TieBreak::Priority => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    na.uname.cmp(&nb.uname)
}

/// Pin every unmanaged leaf to the single node it runs on.
pub fn pin_unmanaged(ws: &mut WorkingSet) {
    for leaf in ws.leaves() {
        let r = ws.resource(leaf);
        if r.managed {
            continue;
        }
        let [node] = r.running_on.as_slice() else {
            continue;
        };
        let node = *node;
        debug!(resource = %r.id, node = %ws.node(node).uname, "unmanaged resource kept in place");
        ws.resource_mut(leaf).allocated_to = Some(node);
        ws.node_mut(node).allocated.push(leaf);
    }
}

/// Choose a node for every color, in order.
pub fn assign_colors(ws: &mut WorkingSet, colors: &mut [Color], links: &ColocationLinks, tie_break: &[TieBreak]) {
    for color in colors.iter_mut() {
        let mut candidates: Vec<(NodeIdx, Score)> = ws
            .node_indices()
            .filter_map(|node| {
                let total = color.score_on(ws, node);
                if total.is_excluded() || !eligible(ws, color, node, links) {
                    return None;
                }
                Some((node, total))
            })
            .collect();
        candidates.sort_by(|&a, &b| compare_nodes(ws, a, b, tie_break));

        let Some(&(node, total)) = candidates.first() else {
            info!(color = color.id, resources = %member_ids(ws, color), "no eligible node, resources stay unplaced");
            continue;
        };

        color.chosen = Some(node);
        for &member in &color.members {
            ws.resource_mut(member).allocated_to = Some(node);
        }
        let n = ws.node_mut(node);
        n.allocated.extend(color.members.iter().copied());
        n.score = total;
        info!(
            color = color.id,
            resources = %member_ids(ws, color),
            node = %ws.node(node).uname,
            score = %total,
            "color placed"
        );
    }
}

/// Dynamic exclusions that depend on earlier assignments.
fn eligible(ws: &WorkingSet, color: &Color, node: NodeIdx, links: &ColocationLinks) -> bool {
    color.members.iter().all(|&member| {
        let anti_ok = links
            .anti_partners(member)
            .filter(|partner| !color.members.contains(partner))
            .all(|partner| ws.resource(partner).allocated_to != Some(node));
        let anchors_ok = links
            .anchors(member)
            .all(|group| group.iter().any(|&anchor| ws.resource(anchor).allocated_to == Some(node)));
        anti_ok && anchors_ok && within_instance_limits(ws, member, node)
    })
}

/// Whether placing `leaf` on `node` keeps every enclosing clone within its
/// per-node instance cap.
fn within_instance_limits(ws: &WorkingSet, leaf: RscIdx, node: NodeIdx) -> bool {
    let mut instance = leaf;
    while let Some(parent) = ws.resource(instance).parent {
        let p = ws.resource(parent);
        if let Some(limit) = p.alloc().instance_node_limit(ws, parent) {
            let used = p
                .children()
                .iter()
                .filter(|&&sibling| sibling != instance)
                .filter(|&&sibling| {
                    ws.resource(sibling)
                        .alloc()
                        .leaves(ws, sibling)
                        .iter()
                        .any(|&l| ws.resource(l).allocated_to == Some(node))
                })
                .count();
            if used as u32 >= limit {
                return false;
            }
        }
        instance = parent;
    }
    true
}

fn member_ids(ws: &WorkingSet, color: &Color) -> String {
    color
        .members
        .iter()
        .map(|&m| ws.resource(m).id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(key: &str, priority: i32) -> Color {
        Color {
            id: 0,
            members: Vec::new(),
            priority: Score::from(priority),
            key: key.to_string(),
            chosen: None,
        }
    }

    #[test]
    fn colors_order_by_priority_then_id() {
        let chain = [TieBreak::Priority, TieBreak::FewestResources, TieBreak::Id];
        let mut colors = [color("b", 0), color("a", 0), color("z", 10)];
        colors.sort_by(|a, b| compare_colors(a, b, &chain));
        let keys: Vec<&str> = colors.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "b"]);
    }

    #[test]
    fn id_only_chain_ignores_priority() {
        let chain = [TieBreak::Id];
        let mut colors = [color("b", 100), color("a", 0)];
        colors.sort_by(|a, b| compare_colors(a, b, &chain));
        assert_eq!(colors[0].key, "a");
    }

    fn two_leaf_set() -> (WorkingSet, Vec<Color>) {
        use crate::document::{ClusterStatus, PrimitiveDef, ResourceDef};
        use crate::working_set::tests::sample_config;

        let config = sample_config(
            &["n1"],
            vec![
                ResourceDef::Primitive(PrimitiveDef::new("x")),
                ResourceDef::Primitive(PrimitiveDef::new("y")),
            ],
        );
        let ws = WorkingSet::unpack(Some(&config), &ClusterStatus::default()).unwrap();
        let mut x = color("x", 0);
        x.members = vec![ws.find_resource("x").unwrap()];
        let mut y = color("y", 0);
        y.members = vec![ws.find_resource("y").unwrap()];
        (ws, vec![x, y])
    }

    #[test]
    fn anchor_color_is_placed_before_its_dependent() {
        let (ws, colors) = two_leaf_set();
        let mut links = ColocationLinks::default();
        links.after.insert((colors[0].members[0], colors[1].members[0]));

        let ordered = order_by_dependencies(&ws, colors, &links);
        let keys: Vec<&str> = ordered.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["y", "x"]);
    }

    #[test]
    fn dependency_loop_keeps_priority_order() {
        let (ws, colors) = two_leaf_set();
        let (x, y) = (colors[0].members[0], colors[1].members[0]);
        let mut links = ColocationLinks::default();
        links.after.insert((x, y));
        links.after.insert((y, x));

        let ordered = order_by_dependencies(&ws, colors, &links);
        let keys: Vec<&str> = ordered.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["x", "y"]);
    }
}
