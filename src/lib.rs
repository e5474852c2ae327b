pub mod config;
pub mod data_aquisition;
pub mod network;
pub mod parsers;
pub mod topology;

pub use config::{ConfigError, CrawlConfig};
pub use network::network_graph::{TopologyGraph, TopologySnapshot};
pub use topology::{Crawler, NeighborSource};
