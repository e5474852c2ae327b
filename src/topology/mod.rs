/*!
Topology module

This module turns per-device neighbor reports into a topology graph.

Structure:
- `source`: The async `NeighborSource` trait, the `DeviceReport` it returns and
            `DiscoveryError`.
- `cli_source`: Neighbor source scraping `show cdp neighbors detail` over SSH.
- `snmp_source`: Neighbor source walking the CISCO-CDP-MIB cache table.
- `frontier`: Breadth-first work queue with the seen set.
- `crawler`: Drives a source over the frontier and merges results into the graph.

Re-exports:
- `Crawler`, `CrawlSettings`, `NeighborSource` and the two sources for easy consumption by
  callers.
*/

pub mod cli_source;
pub mod crawler;
pub mod frontier;
pub mod snmp_source;
pub mod source;

#[cfg(test)]
pub mod testing;

pub use cli_source::CliScrapeSource;
pub use crawler::{CrawlSettings, CrawlStats, Crawler};
pub use snmp_source::SnmpWalkSource;
pub use source::{DeviceReport, DiscoveryError, NeighborSource};
