use serde::{Deserialize, Serialize};

/// How much the crawler knows about a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Only mentioned by neighbors, never scanned.
    Leaf,
    /// Scan failed after the device had reported its own name.
    Partial,
    Scanned,
}

/// Represents a device in the topology graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    /// Network address when known, advertised identity otherwise. Unique per graph.
    pub key: String,
    pub label: String,
    pub status: NodeStatus,
}

impl TopologyNode {
    pub fn leaf(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            status: NodeStatus::Leaf,
        }
    }

    /// Applies a name the device reported about itself. Neighbor-reported names never
    /// reach this; they only set the label of a fresh leaf.
    pub fn set_authoritative_label(&mut self, label: &str, status: NodeStatus) {
        self.label = label.to_string();
        // A full scan is never downgraded by a later partial one.
        if self.status != NodeStatus::Scanned {
            self.status = status;
        }
    }

    pub fn is_scanned(&self) -> bool {
        self.status == NodeStatus::Scanned
    }
}
