//! Cluster nodes as seen by one scheduling cycle.

use crm_core::{ActionTarget, Score};

use crate::resource::RscIdx;

/// Index of a node in the working set arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIdx(pub usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub uuid: String,
    pub uname: String,
    pub online: bool,
    pub unclean: bool,
    pub shutdown: bool,
    pub standby: bool,
    /// Score of the last color evaluated against this node.
    pub score: Score,
    /// Resources found running here at unpack time.
    pub running: Vec<RscIdx>,
    /// Resources allocated here during this cycle.
    pub allocated: Vec<RscIdx>,
}

impl Node {
    /// A configured node with no status yet: offline and clean.
    pub fn new(uuid: &str, uname: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            uname: uname.to_string(),
            online: false,
            unclean: false,
            shutdown: false,
            standby: false,
            score: Score::ZERO,
            running: Vec::new(),
            allocated: Vec::new(),
        }
    }

    /// Whether new resources may be placed here.
    pub fn can_run_resources(&self) -> bool {
        self.online && !self.unclean && !self.shutdown && !self.standby
    }

    pub fn target(&self) -> ActionTarget {
        ActionTarget {
            uname: self.uname.clone(),
            uuid: self.uuid.clone(),
        }
    }
}
