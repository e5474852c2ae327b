use thiserror::Error;

use crate::network::neighbor::NeighborRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CdpParseError {
    /// The device refused the command, e.g. `% CDP is not enabled`.
    #[error("command rejected by device: {0}")]
    CommandRejected(String),
}

/// Fields collected for the neighbor entry currently being read.
#[derive(Debug, Default)]
struct PendingNeighbor {
    device_id: String,
    address: Option<String>,
    local_port: Option<String>,
    remote_port: Option<String>,
}

impl PendingNeighbor {
    fn into_record(self) -> Option<NeighborRecord> {
        let record = NeighborRecord::new(self.device_id)?;
        let record = match self.address {
            Some(address) => record.with_address(address),
            None => record,
        };
        Some(record.with_ports(self.local_port, self.remote_port))
    }
}

/// Parse the output of `show cdp neighbors detail` into neighbor records.
///
/// Expected entry shape (IOS; NX-OS differs only in spacing and `IPv4 Address`):
/// ```text
/// Device ID: SW2
/// Entry address(es):
///   IP address: 10.0.0.2
/// Platform: cisco WS-C3560-24PS,  Capabilities: Switch IGMP
/// Interface: GigabitEthernet0/1,  Port ID (outgoing port): GigabitEthernet0/2
/// ```
///
/// A `Device ID` line starts a new entry and flushes the previous one. The other fields
/// may come in any order or not at all; the first address of an entry wins, since
/// `Management address(es)` repeats it. Lines matching nothing are skipped.
pub fn parse_cdp_neighbors_detail(output: &str) -> Result<Vec<NeighborRecord>, CdpParseError> {
    let mut neighbors = Vec::new();
    let mut pending: Option<PendingNeighbor> = None;

    for line in output.lines() {
        let line = line.trim();
        if line.starts_with('%') {
            return Err(CdpParseError::CommandRejected(line.to_string()));
        }

        if let Some(device_id) = value_after(line, "Device ID:") {
            if let Some(record) = pending.take().and_then(PendingNeighbor::into_record) {
                neighbors.push(record);
            }
            pending = Some(PendingNeighbor {
                device_id: first_token(device_id).unwrap_or_default(),
                ..Default::default()
            });
            continue;
        }

        let Some(current) = pending.as_mut() else {
            continue;
        };
        if let Some(address) = value_after(line, "IP address:").or_else(|| value_after(line, "IPv4 Address:")) {
            if current.address.is_none() {
                current.address = first_token(address);
            }
        }
        if let Some(interface) = value_after(line, "Interface:") {
            let interface = interface.split(',').next().unwrap_or_default();
            current.local_port = first_token(interface);
        }
        if let Some(port) = find_value(line, "Port ID (outgoing port):") {
            // Last field on the line; may contain spaces ("Port 1").
            let port = port.trim();
            current.remote_port = (!port.is_empty()).then(|| port.to_string());
        }
    }

    if let Some(record) = pending.and_then(PendingNeighbor::into_record) {
        neighbors.push(record);
    }
    Ok(neighbors)
}

/// Text after `label` when the line starts with it, ignoring ASCII case.
fn value_after<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| &line[label.len()..])
}

/// Text after `label` anywhere in the line.
fn find_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.find(label).map(|pos| &line[pos + label.len()..])
}

fn first_token(value: &str) -> Option<String> {
    value.split_whitespace().next().map(str::to_string)
}
