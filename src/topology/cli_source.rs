use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    data_aquisition::core::{CommandConnector, CommandSession},
    parsers::{cdp_detail::parse_cdp_neighbors_detail, hostname::parse_hostname},
    topology::source::{DeviceReport, DiscoveryError, NeighborSource},
};

pub const HOSTNAME_COMMAND: &str = "show running-config | include ^hostname";
pub const CDP_DETAIL_COMMAND: &str = "show cdp neighbors detail";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Scrapes `show cdp neighbors detail` over a command session.
pub struct CliScrapeSource {
    connector: Arc<dyn CommandConnector>,
    command_timeout: Duration,
}

impl CliScrapeSource {
    pub fn new(connector: Arc<dyn CommandConnector>) -> Self {
        Self {
            connector,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Bounds the neighbor command. Keep it below the crawl's per-device timeout so a
    /// device that named itself is still reported when the command hangs.
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    async fn scrape(&self, session: &dyn CommandSession, address: &str) -> Result<DeviceReport, DiscoveryError> {
        let hostname_output = session.execute_command(HOSTNAME_COMMAND).await?;
        let display_name = parse_hostname(&hostname_output).unwrap_or_else(|| {
            debug!(address, "device reported no hostname, using its address");
            address.to_string()
        });

        let cdp_output = match tokio::time::timeout(self.command_timeout, session.execute_command(CDP_DETAIL_COMMAND)).await {
            Ok(output) => output.map_err(|e| DiscoveryError::transport(e, Some(display_name.clone())))?,
            Err(_) => {
                return Err(DiscoveryError::transport(
                    format!("'{CDP_DETAIL_COMMAND}' gave no output within {:?}", self.command_timeout),
                    Some(display_name),
                ));
            }
        };
        debug!(address, bytes = cdp_output.len(), "fetched CDP neighbor detail");

        let neighbors = match parse_cdp_neighbors_detail(&cdp_output) {
            Ok(neighbors) => neighbors,
            Err(e) => {
                warn!(address, error = %e, "could not parse CDP neighbors");
                Vec::new()
            }
        };
        Ok(DeviceReport {
            display_name,
            neighbors,
        })
    }
}

#[async_trait]
impl NeighborSource for CliScrapeSource {
    async fn discover(&self, address: &str) -> Result<DeviceReport, DiscoveryError> {
        let session = self.connector.connect(address).await?;
        let report = self.scrape(session.as_ref(), address).await;
        if let Err(e) = session.close().await {
            debug!(address, error = %e, "failed to close session");
        }
        report
    }

    fn kind(&self) -> &'static str {
        "cli"
    }
}
