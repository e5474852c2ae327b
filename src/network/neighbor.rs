use serde::{Deserialize, Serialize};

/// One adjacency reported by a scanned device, normalized across neighbor sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborRecord {
    /// Port on the scanned device.
    pub local_port: Option<String>,
    /// Hostname or device id as advertised by the neighbor. Never empty.
    pub remote_id: String,
    pub remote_address: Option<String>,
    /// Port on the neighbor.
    pub remote_port: Option<String>,
}

impl NeighborRecord {
    /// Returns `None` when the neighbor has no usable identity.
    pub fn new(remote_id: impl Into<String>) -> Option<Self> {
        let remote_id = remote_id.into().trim().to_string();
        if remote_id.is_empty() {
            return None;
        }
        Some(Self {
            local_port: None,
            remote_id,
            remote_address: None,
            remote_port: None,
        })
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = non_empty(address.into());
        self
    }

    pub fn with_ports(mut self, local_port: Option<String>, remote_port: Option<String>) -> Self {
        self.local_port = local_port.and_then(non_empty);
        self.remote_port = remote_port.and_then(non_empty);
        self
    }

    /// The graph key of the neighbor: its address when known, its identity otherwise.
    pub fn key(&self) -> &str {
        self.remote_address.as_deref().unwrap_or(&self.remote_id)
    }

    /// Whether the key is a network address rather than an opaque identity.
    pub fn has_address(&self) -> bool {
        self.remote_address.is_some()
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
