//! Crawl configuration, loaded from JSON.
//!
//! ```json
//! {
//!   "seeds": ["10.0.0.1"],
//!   "subnet": "10.0.1.0/29",
//!   "max_depth": 3,
//!   "source": { "kind": "snmp", "version": "2c", "detailed": true },
//!   "credentials": { "kind": "community", "community": "public" },
//!   "concurrency": 4,
//!   "device_timeout": "10s",
//!   "deadline": "5m"
//! }
//! ```

use std::{collections::HashSet, fmt, net::IpAddr, path::Path, sync::Arc, time::Duration};

use ipnetwork::IpNetwork;
use serde::{Deserialize, Deserializer};
use snmp2::Version;
use thiserror::Error;

use crate::{
    data_aquisition::{
        snmp::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRIES, DEFAULT_SNMP_PORT, UdpSnmpConnector},
        ssh::{DEFAULT_SSH_PORT, SshConnector},
    },
    topology::{
        cli_source::CliScrapeSource,
        crawler::{CrawlSettings, DEFAULT_DEVICE_TIMEOUT, DEFAULT_MAX_DEPTH},
        snmp_source::{DEFAULT_MAX_ROWS, SnmpWalkSource},
        source::NeighborSource,
    },
};

/// Largest subnet that will be enumerated into seeds (a /16 for IPv4).
pub const MAX_SUBNET_HOSTS: u32 = 65_536;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no seed addresses and no subnet to crawl")]
    NoSeeds,
    #[error("seed addresses must not be empty")]
    EmptySeed,
    #[error("invalid subnet '{subnet}': {reason}")]
    InvalidSubnet { subnet: String, reason: String },
    #[error("subnet '{subnet}' has more than 65536 addresses")]
    SubnetTooLarge { subnet: String },
    #[error("max_depth must be at least 1")]
    ZeroDepth,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("max_rows must be at least 1")]
    ZeroRowLimit,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("the {kind} source needs {expected} credentials")]
    MissingCredentials { kind: &'static str, expected: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SnmpVersion {
    #[serde(rename = "1")]
    V1,
    #[serde(rename = "2c")]
    V2c,
}

impl From<SnmpVersion> for Version {
    fn from(version: SnmpVersion) -> Self {
        match version {
            SnmpVersion::V1 => Version::V1,
            SnmpVersion::V2c => Version::V2C,
        }
    }
}

/// Which neighbor source a crawl uses, with its transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// `show cdp neighbors detail` over SSH.
    Cli {
        #[serde(default = "default_ssh_port")]
        port: u16,
    },
    /// CISCO-CDP-MIB walk over SNMP.
    Snmp {
        #[serde(default = "default_snmp_port")]
        port: u16,
        #[serde(default = "default_snmp_version")]
        version: SnmpVersion,
        #[serde(default = "default_request_timeout", deserialize_with = "duration_str")]
        request_timeout: Duration,
        #[serde(default = "default_retries")]
        retries: u32,
        #[serde(default = "default_max_rows")]
        max_rows: usize,
        #[serde(default)]
        detailed: bool,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Cli {
            port: DEFAULT_SSH_PORT,
        }
    }
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Cli { .. } => "cli",
            SourceConfig::Snmp { .. } => "snmp",
        }
    }

    fn expected_credentials(&self) -> &'static str {
        match self {
            SourceConfig::Cli { .. } => "ssh",
            SourceConfig::Snmp { .. } => "community",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    Ssh { username: String, password: String },
    Community { community: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Ssh { username, .. } => f
                .debug_struct("Ssh")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Community { .. } => f.debug_struct("Community").field("community", &"<redacted>").finish(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    #[serde(default)]
    pub seeds: Vec<String>,
    /// CIDR block whose host addresses are crawled after the explicit seeds.
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default = "default_max_depth", alias = "maxDepth")]
    pub max_depth: usize,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_device_timeout", deserialize_with = "duration_str")]
    pub device_timeout: Duration,
    #[serde(default, deserialize_with = "optional_duration_str")]
    pub deadline: Option<Duration>,
    #[serde(default)]
    pub resolve_identities: bool,
}

impl CrawlConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks everything that can be checked before the first device is contacted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seeds.is_empty() && self.subnet.is_none() {
            return Err(ConfigError::NoSeeds);
        }
        if self.seeds.iter().any(|seed| seed.trim().is_empty()) {
            return Err(ConfigError::EmptySeed);
        }
        if let Some(subnet) = &self.subnet {
            subnet_hosts(subnet)?;
        }
        self.settings().validate()?;

        if let SourceConfig::Snmp {
            request_timeout,
            max_rows,
            ..
        } = &self.source
        {
            if request_timeout.is_zero() {
                return Err(ConfigError::ZeroDuration("request_timeout"));
            }
            if *max_rows == 0 {
                return Err(ConfigError::ZeroRowLimit);
            }
        }

        match (&self.source, &self.credentials) {
            (SourceConfig::Cli { .. }, Some(Credentials::Ssh { .. }))
            | (SourceConfig::Snmp { .. }, Some(Credentials::Community { .. })) => Ok(()),
            (source, _) => Err(ConfigError::MissingCredentials {
                kind: source.kind(),
                expected: source.expected_credentials(),
            }),
        }
    }

    pub fn settings(&self) -> CrawlSettings {
        CrawlSettings {
            max_depth: self.max_depth,
            concurrency: self.concurrency,
            device_timeout: self.device_timeout,
            deadline: self.deadline,
            resolve_identities: self.resolve_identities,
        }
    }

    /// Budget for each blocking SSH step (connect, handshake, one command). A quarter of the
    /// per-device timeout, so the neighbor command gives up while the device's name still counts.
    pub fn step_timeout(&self) -> Duration {
        self.device_timeout / 4
    }

    /// Explicit seeds followed by the subnet's hosts, first occurrence kept.
    pub fn seed_addresses(&self) -> Result<Vec<String>, ConfigError> {
        let subnet = match &self.subnet {
            Some(subnet) => subnet_hosts(subnet)?,
            None => Vec::new(),
        };
        let mut seen = HashSet::new();
        Ok(self
            .seeds
            .iter()
            .map(|seed| seed.trim().to_string())
            .chain(subnet.into_iter().map(|ip| ip.to_string()))
            .filter(|seed| seen.insert(seed.clone()))
            .collect())
    }

    /// Builds the neighbor source the configuration selects.
    pub fn build_source(&self) -> Result<Arc<dyn NeighborSource>, ConfigError> {
        match (&self.source, &self.credentials) {
            (SourceConfig::Cli { port }, Some(Credentials::Ssh { username, password })) => {
                let mut connector = SshConnector::new(username.clone(), password.clone());
                connector.port = *port;
                connector.timeout = self.step_timeout();
                let source = CliScrapeSource::new(Arc::new(connector)).with_command_timeout(self.step_timeout());
                Ok(Arc::new(source))
            }
            (
                SourceConfig::Snmp {
                    port,
                    version,
                    request_timeout,
                    retries,
                    max_rows,
                    detailed,
                },
                Some(Credentials::Community { community }),
            ) => {
                let mut connector = UdpSnmpConnector::new(community, (*version).into());
                connector.port = *port;
                connector.timeout = *request_timeout;
                connector.retries = *retries;
                let source = SnmpWalkSource::new(Arc::new(connector))
                    .with_max_rows(*max_rows)
                    .detailed(*detailed);
                Ok(Arc::new(source))
            }
            (source, _) => Err(ConfigError::MissingCredentials {
                kind: source.kind(),
                expected: source.expected_credentials(),
            }),
        }
    }
}

/// Host addresses of a CIDR block. IPv4 blocks wider than /31 lose their network and
/// broadcast addresses.
pub fn subnet_hosts(subnet: &str) -> Result<Vec<IpAddr>, ConfigError> {
    let network: IpNetwork = subnet.trim().parse().map_err(|e: ipnetwork::IpNetworkError| ConfigError::InvalidSubnet {
        subnet: subnet.to_string(),
        reason: e.to_string(),
    })?;
    let width: u8 = if network.is_ipv4() { 32 } else { 128 };
    if u32::from(width - network.prefix()) > MAX_SUBNET_HOSTS.trailing_zeros() {
        return Err(ConfigError::SubnetTooLarge {
            subnet: subnet.to_string(),
        });
    }

    let hosts = match network {
        IpNetwork::V4(net) if net.prefix() < 31 => net
            .iter()
            .filter(|ip| *ip != net.network() && *ip != net.broadcast())
            .map(IpAddr::V4)
            .collect(),
        IpNetwork::V4(net) => net.iter().map(IpAddr::V4).collect(),
        IpNetwork::V6(net) => net.iter().map(IpAddr::V6).collect(),
    };
    Ok(hosts)
}

fn duration_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

fn optional_duration_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(text) => humantime::parse_duration(&text).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_concurrency() -> usize {
    1
}

fn default_device_timeout() -> Duration {
    DEFAULT_DEVICE_TIMEOUT
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_snmp_port() -> u16 {
    DEFAULT_SNMP_PORT
}

fn default_snmp_version() -> SnmpVersion {
    SnmpVersion::V2c
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_max_rows() -> usize {
    DEFAULT_MAX_ROWS
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLI_CONFIG: &str = r#"{
        "seeds": ["10.0.0.1", " 10.0.0.2 "],
        "credentials": { "kind": "ssh", "username": "netops", "password": "hunter2" }
    }"#;

    #[test]
    fn test_defaults() {
        let config = CrawlConfig::from_json_str(CLI_CONFIG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.max_depth, 5);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.device_timeout, Duration::from_secs(10));
        assert_eq!(config.deadline, None);
        assert_eq!(config.source, SourceConfig::Cli { port: 22 });
        assert_eq!(config.seed_addresses().unwrap(), vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(config.build_source().unwrap().kind(), "cli");
    }

    #[test]
    fn test_ssh_steps_fit_in_device_timeout() {
        let config = CrawlConfig::from_json_str(
            r#"{
                "seeds": ["10.0.0.1"],
                "device_timeout": "8s",
                "credentials": { "kind": "ssh", "username": "u", "password": "p" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.step_timeout(), Duration::from_secs(2));
        assert!(config.step_timeout() < config.settings().device_timeout);
    }

    #[test]
    fn test_snmp_source_and_durations() {
        let config = CrawlConfig::from_json_str(
            r#"{
                "seeds": ["10.0.0.1"],
                "maxDepth": 2,
                "source": { "kind": "snmp", "version": "1", "request_timeout": "500ms", "detailed": true },
                "credentials": { "kind": "community", "community": "public" },
                "device_timeout": "30s",
                "deadline": "2m"
            }"#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.max_depth, 2);
        assert_eq!(config.deadline, Some(Duration::from_secs(120)));
        assert_eq!(config.settings().device_timeout, Duration::from_secs(30));
        assert_eq!(
            config.source,
            SourceConfig::Snmp {
                port: 161,
                version: SnmpVersion::V1,
                request_timeout: Duration::from_millis(500),
                retries: 2,
                max_rows: DEFAULT_MAX_ROWS,
                detailed: true,
            }
        );
        assert_eq!(config.build_source().unwrap().kind(), "snmp");
    }

    #[test]
    fn test_subnet_seeding() {
        let config = CrawlConfig::from_json_str(
            r#"{
                "seeds": ["10.0.0.2", "core-sw1"],
                "subnet": "10.0.0.0/30",
                "credentials": { "kind": "ssh", "username": "u", "password": "p" }
            }"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.seed_addresses().unwrap(), vec!["10.0.0.2", "core-sw1", "10.0.0.1"]);

        assert_eq!(subnet_hosts("10.0.0.8/31").unwrap().len(), 2);
        assert_eq!(subnet_hosts("10.0.0.8/32").unwrap().len(), 1);
        assert_eq!(subnet_hosts("10.0.0.0/16").unwrap().len(), 65_534);
        assert!(matches!(subnet_hosts("10.0.0.0/15"), Err(ConfigError::SubnetTooLarge { .. })));
        assert!(matches!(subnet_hosts("10.0.0.0/33"), Err(ConfigError::InvalidSubnet { .. })));
        assert!(matches!(subnet_hosts("not-a-net"), Err(ConfigError::InvalidSubnet { .. })));
    }

    #[test]
    fn test_validation_errors() {
        let parse = |json: &str| CrawlConfig::from_json_str(json).unwrap().validate();

        assert!(matches!(parse(r#"{}"#), Err(ConfigError::NoSeeds)));
        assert!(matches!(
            parse(r#"{"seeds": [""], "credentials": {"kind": "ssh", "username": "u", "password": "p"}}"#),
            Err(ConfigError::EmptySeed)
        ));
        assert!(matches!(
            parse(r#"{"seeds": ["a"], "max_depth": 0, "credentials": {"kind": "ssh", "username": "u", "password": "p"}}"#),
            Err(ConfigError::ZeroDepth)
        ));
        assert!(matches!(
            parse(r#"{"seeds": ["a"], "concurrency": 0, "credentials": {"kind": "ssh", "username": "u", "password": "p"}}"#),
            Err(ConfigError::ZeroConcurrency)
        ));
        assert!(matches!(
            parse(r#"{"seeds": ["a"], "device_timeout": "0s", "credentials": {"kind": "ssh", "username": "u", "password": "p"}}"#),
            Err(ConfigError::ZeroDuration("device_timeout"))
        ));
        assert!(matches!(
            parse(r#"{"seeds": ["a"], "source": {"kind": "snmp"}, "credentials": {"kind": "ssh", "username": "u", "password": "p"}}"#),
            Err(ConfigError::MissingCredentials { kind: "snmp", expected: "community" })
        ));
        assert!(matches!(parse(r#"{"seeds": ["a"]}"#), Err(ConfigError::MissingCredentials { kind: "cli", .. })));
    }

    #[test]
    fn test_malformed_json_and_durations() {
        assert!(matches!(CrawlConfig::from_json_str("{"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            CrawlConfig::from_json_str(r#"{"seeds": ["a"], "device_timeout": "soon"}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(CrawlConfig::from_file("/nonexistent/crawl.json"), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_credentials_are_redacted() {
        let config = CrawlConfig::from_json_str(CLI_CONFIG).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("netops"));
        assert!(!debug.contains("hunter2"));
    }
}
