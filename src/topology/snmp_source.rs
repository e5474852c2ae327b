use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use snmp2::Oid;
use tracing::{debug, warn};

use crate::{
    data_aquisition::{
        core::{SnmpConnector, SnmpSession, SnmpValue},
        snmp::{SnmpClientError, SnmpTableRow, oid_from},
    },
    network::neighbor::NeighborRecord,
    topology::source::{DeviceReport, DiscoveryError, NeighborSource},
};

/// sysName.0
const SYS_NAME: &[u64] = &[1, 3, 6, 1, 2, 1, 1, 5, 0];
/// cdpCacheEntry; rows are indexed by `cdpCacheIfIndex.cdpCacheDeviceIndex`.
const CDP_CACHE_ENTRY: &[u64] = &[1, 3, 6, 1, 4, 1, 9, 9, 23, 1, 2, 1, 1];
const CDP_CACHE_ADDRESS: u64 = 4;
const CDP_CACHE_DEVICE_ID: u64 = 6;
const CDP_CACHE_DEVICE_PORT: u64 = 7;
/// ifDescr, indexed by ifIndex.
const IF_DESCR: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 2];

pub const DEFAULT_MAX_ROWS: usize = 512;

/// How a column walk ended.
#[derive(Debug)]
pub enum WalkEnd {
    /// Left the subtree or hit endOfMibView.
    Complete,
    /// Stopped at the row limit.
    Truncated,
    /// The agent answered with a non-zero error status.
    ErrorStatus(u32),
    Transport(SnmpClientError),
}

/// Rows collected by one GETNEXT walk. Rows gathered before a failure are kept.
#[derive(Debug)]
pub struct Walk {
    pub rows: Vec<(Oid<'static>, SnmpValue)>,
    pub end: WalkEnd,
}

impl Walk {
    /// The agent stopped answering during this walk.
    fn lost_agent(&self) -> bool {
        matches!(self.end, WalkEnd::Transport(_))
    }

    fn unreachable(&self) -> bool {
        self.rows.is_empty() && self.lost_agent()
    }
}

/// Walks the subtree under `root` with GETNEXT, at most `max_rows` rows.
pub async fn walk_subtree(session: &mut dyn SnmpSession, root: &Oid<'static>, max_rows: usize) -> Walk {
    let mut rows: Vec<(Oid<'static>, SnmpValue)> = Vec::new();
    let mut cursor = root.clone();
    loop {
        if rows.len() >= max_rows {
            return Walk { rows, end: WalkEnd::Truncated };
        }
        let response = match session.get_next(&cursor).await {
            Ok(response) => response,
            Err(e) => return Walk { rows, end: WalkEnd::Transport(e) },
        };
        if response.is_error() {
            return Walk {
                rows,
                end: WalkEnd::ErrorStatus(response.error_status),
            };
        }
        let Some((oid, value)) = response.varbinds.into_iter().next() else {
            return Walk { rows, end: WalkEnd::Complete };
        };
        // An agent that does not advance would keep us here forever.
        if !oid.starts_with(root) || value == SnmpValue::EndOfView || oid == cursor {
            return Walk { rows, end: WalkEnd::Complete };
        }
        cursor = oid.clone();
        rows.push((oid, value));
    }
}

/// Discovers neighbors by walking the CISCO-CDP-MIB cache table.
///
/// In the default mode only `cdpCacheDeviceId` is walked, so records carry an identity
/// and nothing else. Detailed mode also walks the address and port columns and `ifDescr`
/// to fill in addresses and both ports.
pub struct SnmpWalkSource {
    connector: Arc<dyn SnmpConnector>,
    max_rows: usize,
    detailed: bool,
}

impl SnmpWalkSource {
    pub fn new(connector: Arc<dyn SnmpConnector>) -> Self {
        Self {
            connector,
            max_rows: DEFAULT_MAX_ROWS,
            detailed: false,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    async fn fetch_sys_name(&self, session: &mut dyn SnmpSession, address: &str) -> Result<Option<String>, SnmpClientError> {
        let response = session.get(&oid_from(SYS_NAME)?).await?;
        if response.is_error() {
            debug!(address, error_status = response.error_status, "sysName query rejected");
            return Ok(None);
        }
        Ok(response
            .varbinds
            .first()
            .and_then(|(_, value)| value.as_text())
            .filter(|name| !name.is_empty()))
    }

    /// Walks one column and logs how it ended. Never fails; partial rows are returned.
    async fn walk_logged(&self, session: &mut dyn SnmpSession, root: &Oid<'static>, address: &str) -> Walk {
        let walk = walk_subtree(session, root, self.max_rows).await;
        match &walk.end {
            WalkEnd::Complete => {}
            WalkEnd::Truncated => warn!(address, %root, rows = walk.rows.len(), "SNMP walk hit the row limit"),
            WalkEnd::ErrorStatus(status) => {
                warn!(address, %root, error_status = *status, rows = walk.rows.len(), "SNMP walk aborted by error status")
            }
            WalkEnd::Transport(e) => {
                warn!(address, %root, error = %e, rows = walk.rows.len(), "SNMP walk interrupted, keeping collected rows")
            }
        }
        walk
    }

    async fn fetch_neighbors(&self, session: &mut dyn SnmpSession, address: &str) -> Result<(Walk, Vec<NeighborRecord>), DiscoveryError> {
        let device_id_column = column_oid(CDP_CACHE_DEVICE_ID)?;
        let device_ids = self.walk_logged(session, &device_id_column, address).await;
        // Every further request to a silent agent costs the full retry budget.
        if device_ids.lost_agent() || !self.detailed {
            let records = device_ids
                .rows
                .iter()
                .filter_map(|(_, value)| NeighborRecord::new(value.as_text()?))
                .collect();
            return Ok((device_ids, records));
        }

        let mut pairs = device_ids.rows.clone();
        let mut agent_lost = false;
        for column in [CDP_CACHE_ADDRESS, CDP_CACHE_DEVICE_PORT] {
            let walk = self.walk_logged(session, &column_oid(column)?, address).await;
            agent_lost = walk.lost_agent();
            pairs.extend(walk.rows);
            if agent_lost {
                break;
            }
        }
        let interfaces: HashMap<u64, String> = if agent_lost {
            HashMap::new()
        } else {
            self.walk_logged(session, &oid_from(IF_DESCR)?, address)
                .await
                .rows
                .into_iter()
                .filter_map(|(oid, value)| Some((oid.iter()?.last()?, value.as_text()?)))
                .collect()
        };

        let table = oid_from(CDP_CACHE_ENTRY)?;
        let rows = SnmpTableRow::group_into_rows(pairs, &table, 1)?;
        let address_column = column_oid(CDP_CACHE_ADDRESS)?;
        let port_column = column_oid(CDP_CACHE_DEVICE_PORT)?;
        let records = rows
            .iter()
            .filter_map(|row| {
                let record = NeighborRecord::new(row.columns.get(&device_id_column)?.as_text()?)?;
                let record = match row.columns.get(&address_column).and_then(SnmpValue::as_ipv4) {
                    Some(ip) => record.with_address(ip.to_string()),
                    None => record,
                };
                let local_port = row.row_index_suffix.first().and_then(|if_index| interfaces.get(if_index).cloned());
                let remote_port = row.columns.get(&port_column).and_then(SnmpValue::as_text);
                Some(record.with_ports(local_port, remote_port))
            })
            .collect();
        Ok((device_ids, records))
    }
}

fn column_oid(column: u64) -> Result<Oid<'static>, SnmpClientError> {
    let mut components = CDP_CACHE_ENTRY.to_vec();
    components.push(column);
    oid_from(&components)
}

#[async_trait]
impl NeighborSource for SnmpWalkSource {
    async fn discover(&self, address: &str) -> Result<DeviceReport, DiscoveryError> {
        let mut session = self.connector.connect(address).await?;

        let sys_name = self.fetch_sys_name(session.as_mut(), address).await;
        let (device_ids, neighbors) = self.fetch_neighbors(session.as_mut(), address).await?;

        let display_name = match sys_name {
            Ok(name) => name,
            Err(e) if device_ids.unreachable() => {
                return Err(DiscoveryError::transport(e, None));
            }
            Err(e) => {
                debug!(address, error = %e, "sysName query failed");
                None
            }
        }
        .unwrap_or_else(|| address.to_string());

        Ok(DeviceReport {
            display_name,
            neighbors,
        })
    }

    fn kind(&self) -> &'static str {
        "snmp"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::topology::testing::{FakeSnmpAgent, FakeSnmpConnector};

    fn cdp(column: u64, index: &[u64]) -> Vec<u64> {
        let mut components = CDP_CACHE_ENTRY.to_vec();
        components.push(column);
        components.extend_from_slice(index);
        components
    }

    fn text(s: &str) -> SnmpValue {
        SnmpValue::OctetString(s.as_bytes().to_vec())
    }

    fn agent() -> FakeSnmpAgent {
        FakeSnmpAgent::default()
            .with(SYS_NAME, text("SW1"))
            .with(&cdp(CDP_CACHE_DEVICE_ID, &[10101, 1]), text("SW2"))
            .with(&cdp(CDP_CACHE_DEVICE_ID, &[10102, 4]), text("SW3"))
            .with(&cdp(CDP_CACHE_ADDRESS, &[10101, 1]), SnmpValue::OctetString(vec![10, 0, 0, 2]))
            .with(&cdp(CDP_CACHE_DEVICE_PORT, &[10101, 1]), text("GigabitEthernet0/2"))
            .with(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 2, 10101], text("GigabitEthernet0/1"))
            .with(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 2, 10102], text("GigabitEthernet0/2"))
    }

    fn source(agent: FakeSnmpAgent) -> SnmpWalkSource {
        SnmpWalkSource::new(Arc::new(FakeSnmpConnector::default().with_agent("10.0.0.1", agent)))
    }

    #[tokio::test]
    async fn test_walk_yields_identities_only() {
        let report = source(agent()).discover("10.0.0.1").await.unwrap();

        assert_eq!(report.display_name, "SW1");
        let ids: Vec<&str> = report.neighbors.iter().map(|n| n.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["SW2", "SW3"]);
        assert!(report.neighbors.iter().all(|n| n.remote_address.is_none() && n.local_port.is_none()));
    }

    #[tokio::test]
    async fn test_detailed_walk_joins_columns() {
        let report = source(agent()).detailed(true).discover("10.0.0.1").await.unwrap();

        assert_eq!(report.neighbors.len(), 2);
        let sw2 = &report.neighbors[0];
        assert_eq!(sw2.key(), "10.0.0.2");
        assert_eq!(sw2.local_port.as_deref(), Some("GigabitEthernet0/1"));
        assert_eq!(sw2.remote_port.as_deref(), Some("GigabitEthernet0/2"));
        let sw3 = &report.neighbors[1];
        assert_eq!(sw3.key(), "SW3");
        assert_eq!(sw3.local_port.as_deref(), Some("GigabitEthernet0/2"));
        assert_eq!(sw3.remote_port, None);
    }

    #[tokio::test]
    async fn test_transport_error_mid_walk_keeps_rows() {
        let agent = agent()
            .with(&cdp(CDP_CACHE_DEVICE_ID, &[10103, 9]), text("SW4"))
            // sysName GET plus two successful GETNEXTs, then silence.
            .failing_after(3);
        let report = source(agent).discover("10.0.0.1").await.unwrap();

        let ids: Vec<&str> = report.neighbors.iter().map(|n| n.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["SW2", "SW3"]);
    }

    #[tokio::test]
    async fn test_detailed_walk_stops_when_agent_goes_silent() {
        // sysName, SW2, SW3, then nothing but slow failures.
        let agent = agent().failing_after(3).with_failure_delay(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let report = source(agent).detailed(true).discover("10.0.0.1").await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(400));
        let ids: Vec<&str> = report.neighbors.iter().map(|n| n.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["SW2", "SW3"]);
        assert!(report.neighbors.iter().all(|n| n.remote_address.is_none()));
    }

    #[tokio::test]
    async fn test_error_status_aborts_walk_only() {
        let agent = agent().with_error_status_at(&cdp(CDP_CACHE_DEVICE_ID, &[10101, 1]), 5);
        let report = source(agent).discover("10.0.0.1").await.unwrap();

        assert_eq!(report.display_name, "SW1");
        let ids: Vec<&str> = report.neighbors.iter().map(|n| n.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["SW2"]);
    }

    #[tokio::test]
    async fn test_missing_sys_name_falls_back_to_address() {
        let agent = FakeSnmpAgent::default().with(&cdp(CDP_CACHE_DEVICE_ID, &[1, 1]), text("SW2"));
        let report = source(agent).discover("10.0.0.1").await.unwrap();
        assert_eq!(report.display_name, "10.0.0.1");
        assert_eq!(report.neighbors.len(), 1);
    }

    #[tokio::test]
    async fn test_silent_agent_is_unreachable() {
        let report = source(agent().failing_after(0)).discover("10.0.0.1").await;
        assert!(matches!(report, Err(DiscoveryError::Transport { display_name: None, .. })));
    }

    #[tokio::test]
    async fn test_unknown_identity_is_unresolvable() {
        let report = source(agent()).discover("SW9").await;
        assert!(matches!(report, Err(DiscoveryError::Unresolvable(_))));
    }

    #[tokio::test]
    async fn test_walk_respects_row_limit() {
        let mut session = agent().into_session();
        let root = column_oid(CDP_CACHE_DEVICE_ID).unwrap();
        let walk = walk_subtree(&mut session, &root, 1).await;
        assert_eq!(walk.rows.len(), 1);
        assert!(matches!(walk.end, WalkEnd::Truncated));
    }
}
