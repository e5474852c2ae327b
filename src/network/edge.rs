use serde::{Deserialize, Serialize};

/// A physical link between two devices.
///
/// Ports are stored from the perspective of `reported_by`, the device whose scan first
/// recorded the link: `local_port` sits on `reported_by`, `remote_port` on the other end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub reported_by: String,
    pub local_port: Option<String>,
    pub remote_port: Option<String>,
}

impl TopologyEdge {
    pub fn new(reported_by: &str, local_port: Option<String>, remote_port: Option<String>) -> Self {
        Self {
            reported_by: reported_by.to_string(),
            local_port,
            remote_port,
        }
    }

    /// Folds in a rediscovery of the same link, possibly made from the other end.
    /// Only fills ports that are still unknown.
    pub fn merge(&mut self, scanner: &str, local_port: Option<String>, remote_port: Option<String>) {
        let (ours, theirs) = if scanner == self.reported_by {
            (local_port, remote_port)
        } else {
            (remote_port, local_port)
        };
        if self.local_port.is_none() {
            self.local_port = ours;
        }
        if self.remote_port.is_none() {
            self.remote_port = theirs;
        }
    }

    /// Port on the given endpoint, if known.
    pub fn port_of(&self, endpoint: &str) -> Option<&str> {
        if endpoint == self.reported_by {
            self.local_port.as_deref()
        } else {
            self.remote_port.as_deref()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UndirectedEdgeKey {
    pub a: String,
    pub b: String,
}

impl UndirectedEdgeKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        UndirectedEdgeKey {
            a: a.to_string(),
            b: b.to_string(),
        }
    }
}
