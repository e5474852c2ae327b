/*!
Neighbor source interface.

This module defines:
- `DeviceReport`: what one scan of one device yields.
- `DiscoveryError`: why a scan produced nothing (or only the device's own name).
- `NeighborSource`: the async trait the crawler drives. Implementations hide the transport
  (SSH command scraping, SNMP table walks) and return typed neighbor records.
*/

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    data_aquisition::{snmp::SnmpClientError, ssh::SshError},
    network::neighbor::NeighborRecord,
};

/// Result of scanning a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    /// Name the device reports for itself, or its address when it reports none.
    pub display_name: String,
    pub neighbors: Vec<NeighborRecord>,
}

#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// Connection, authentication or timeout failure. `display_name` is set when the device
    /// had already identified itself before the failure.
    #[error("transport failure: {reason}")]
    Transport {
        reason: String,
        display_name: Option<String>,
    },
    /// The target is an identity that does not resolve to a network address.
    #[error("cannot resolve '{0}' to an address")]
    Unresolvable(String),
    /// The device answered with an error status for a request that had to succeed.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("scan did not finish within {0:?}")]
    Timeout(Duration),
}

impl DiscoveryError {
    pub fn transport(reason: impl ToString, display_name: Option<String>) -> Self {
        DiscoveryError::Transport {
            reason: reason.to_string(),
            display_name,
        }
    }
}

impl From<SshError> for DiscoveryError {
    fn from(e: SshError) -> Self {
        match e {
            SshError::Unresolvable(host) => DiscoveryError::Unresolvable(host),
            other => DiscoveryError::transport(other, None),
        }
    }
}

impl From<SnmpClientError> for DiscoveryError {
    fn from(e: SnmpClientError) -> Self {
        match e {
            SnmpClientError::Unresolvable(address) => DiscoveryError::Unresolvable(address),
            SnmpClientError::OidParseError | SnmpClientError::InvalidQuery => {
                DiscoveryError::Protocol(e.to_string())
            }
            other => DiscoveryError::transport(other, None),
        }
    }
}

/// A strategy for learning a device's name and its CDP neighbors.
/// One instance is selected per crawl and shared by all concurrent scans.
#[async_trait]
pub trait NeighborSource: Send + Sync {
    async fn discover(&self, address: &str) -> Result<DeviceReport, DiscoveryError>;

    /// Short name used in logs.
    fn kind(&self) -> &'static str;
}
