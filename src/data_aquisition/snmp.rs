use super::core::{SnmpConnector, SnmpResponse, SnmpSession, SnmpValue};
use async_trait::async_trait;
use snmp2::{AsyncSession, MessageType, Oid, Version};
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_SNMP_PORT: u16 = 161;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRIES: u32 = 2;

/// SNMP client for retrieving data from a network device.
pub struct SnmpClient {
    address: SocketAddr,
    community: String,
    snmp_version: Version,
    session: Option<Arc<Mutex<AsyncSession>>>,
    timeout: Duration,
    retries: u32,
}

impl SnmpClient {
    /// Creates a new SNMP client for a single network device.
    pub fn new(address: SocketAddr, community: &str, snmp_version: Version) -> Self {
        Self {
            address,
            community: community.to_string(),
            snmp_version,
            session: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Sets the per-request timeout and how many times a timed out request is resent.
    pub fn with_budget(mut self, timeout: Duration, retries: u32) -> Self {
        self.timeout = timeout;
        self.retries = retries;
        self
    }

    /// Retrieves an SNMP session for the client.
    pub async fn get_session(&mut self) -> Result<Arc<Mutex<AsyncSession>>, SnmpClientError> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }
        // Built on the heap: the session's receive and PDU buffers are large enough to
        // overflow a worker thread's stack in unoptimized builds.
        let session = match self.snmp_version {
            Version::V1 => Box::pin(AsyncSession::new_v1(self.address, self.community.as_bytes(), 0)).await,
            Version::V2C => Box::pin(AsyncSession::new_v2c(self.address, self.community.as_bytes(), 0)).await,
            Version::V3 => return Err(SnmpClientError::UnsupportedVersion),
        }
        .map_err(SnmpClientError::IoError)?;
        let session = Arc::new(Mutex::new(session));
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Start building a new query.
    pub async fn query(&mut self) -> Result<QueryBuilder, SnmpClientError> {
        let session = self.get_session().await?;
        Ok(QueryBuilder {
            session,
            oids: Vec::new(),
            operation: None,
            timeout: self.timeout,
            retries: self.retries,
        })
    }
}

pub struct QueryBuilder {
    session: Arc<Mutex<AsyncSession>>,
    oids: Vec<Oid<'static>>,
    operation: Option<MessageType>,
    timeout: Duration,
    retries: u32,
}

impl QueryBuilder {
    pub fn get(mut self) -> Self {
        self.operation = Some(MessageType::GetRequest);
        self
    }

    pub fn get_next(mut self) -> Self {
        self.operation = Some(MessageType::GetNextRequest);
        self
    }

    pub fn oid(mut self, oid: Oid<'static>) -> Self {
        self.oids.push(oid);
        self
    }

    /// Sends the request, resending it up to `retries` times when the agent stays silent.
    pub async fn execute(self) -> Result<SnmpResponse, SnmpClientError> {
        let operation = self.operation.ok_or(SnmpClientError::InvalidQuery)?;
        let oid = match self.oids.as_slice() {
            [] => return Err(SnmpClientError::InvalidQuery),
            [oid] => oid.clone(),
            _ => return Err(SnmpClientError::MultipleOidsOnGet),
        };

        let mut session = self.session.lock().await;
        for attempt in 0..=self.retries {
            let request = async {
                let pdu = match operation {
                    MessageType::GetRequest => session.get(&oid).await,
                    MessageType::GetNextRequest => session.getnext(&oid).await,
                    _ => return Err(SnmpClientError::UnsupportedSnmpOperation),
                }
                .map_err(SnmpClientError::Snmp2Error)?;
                // The PDU borrows the session buffer; copy everything out before releasing it.
                let error_status = pdu.error_status;
                let varbinds = pdu
                    .varbinds
                    .map(|(oid, value)| (oid.to_owned(), SnmpValue::from(&value)))
                    .collect();
                Ok::<_, SnmpClientError>(SnmpResponse {
                    error_status,
                    varbinds,
                })
            };
            match tokio::time::timeout(self.timeout, request).await {
                Ok(result) => return result,
                Err(_) => debug!(%oid, attempt, "SNMP request timed out"),
            }
        }
        Err(SnmpClientError::Timeout(self.timeout, self.retries))
    }
}

#[derive(Debug, Error)]
pub enum SnmpClientError {
    #[error("could not parse OID")]
    OidParseError,
    #[error("SNMPv3 sessions are not supported")]
    UnsupportedVersion,
    #[error("could not resolve address '{0}'")]
    Unresolvable(String),
    #[error("I/O error: {0}")]
    IoError(std::io::Error),
    #[error("SNMP error: {0:?}")]
    Snmp2Error(snmp2::Error),
    #[error("no response within {0:?} after {1} retries")]
    Timeout(Duration, u32),
    #[error("query has no operation or no OID")]
    InvalidQuery,
    #[error("GET and GETNEXT take exactly one OID")]
    MultipleOidsOnGet,
    #[error("unsupported SNMP operation")]
    UnsupportedSnmpOperation,
}

#[async_trait]
impl SnmpSession for SnmpClient {
    async fn get(&mut self, oid: &Oid<'static>) -> Result<SnmpResponse, SnmpClientError> {
        self.query().await?.oid(oid.clone()).get().execute().await
    }

    async fn get_next(&mut self, oid: &Oid<'static>) -> Result<SnmpResponse, SnmpClientError> {
        self.query().await?.oid(oid.clone()).get_next().execute().await
    }
}

/// Builds one `SnmpClient` per device from shared crawl settings.
#[derive(Debug, Clone)]
pub struct UdpSnmpConnector {
    pub community: String,
    pub version: Version,
    pub port: u16,
    pub timeout: Duration,
    pub retries: u32,
}

impl UdpSnmpConnector {
    pub fn new(community: &str, version: Version) -> Self {
        Self {
            community: community.to_string(),
            version,
            port: DEFAULT_SNMP_PORT,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Resolves an IP literal or a DNS name to the agent's socket address.
    pub async fn resolve(&self, address: &str) -> Result<SocketAddr, SnmpClientError> {
        if let Ok(ip) = address.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        tokio::net::lookup_host((address, self.port))
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| SnmpClientError::Unresolvable(address.to_string()))
    }
}

#[async_trait]
impl SnmpConnector for UdpSnmpConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn SnmpSession>, SnmpClientError> {
        let socket_addr = self.resolve(address).await?;
        let mut client = SnmpClient::new(socket_addr, &self.community, self.version)
            .with_budget(self.timeout, self.retries);
        client.get_session().await?;
        Ok(Box::new(client))
    }
}

/// A utility struct representing a single row of an SNMP table.
#[derive(Debug, Clone)]
pub struct SnmpTableRow {
    pub table_oid_prefix: Oid<'static>,
    pub row_index_suffix: Vec<u64>,
    pub columns: HashMap<Oid<'static>, SnmpValue>,
}

impl SnmpTableRow {
    /// Groups `(oid, value)` pairs from one or more column walks into rows keyed by the
    /// index that follows the column id. Pairs outside the table are ignored.
    /// Rows come back ordered by index.
    pub fn group_into_rows(
        pairs: Vec<(Oid<'static>, SnmpValue)>,
        table_oid_prefix: &Oid<'static>,
        column_id_component_length: usize,
    ) -> Result<Vec<SnmpTableRow>, SnmpClientError> {
        let table_prefix_length = table_oid_prefix
            .iter()
            .ok_or(SnmpClientError::OidParseError)?
            .count();
        let column_length = table_prefix_length + column_id_component_length;

        // Row index: (column oid, value)
        let mut rows_map: HashMap<Vec<u64>, HashMap<Oid<'static>, SnmpValue>> = HashMap::new();
        for (oid, value) in pairs
            .into_iter()
            .filter(|(oid, _)| oid.starts_with(table_oid_prefix))
        {
            let components: Vec<u64> = oid.iter().ok_or(SnmpClientError::OidParseError)?.collect();
            if components.len() <= column_length {
                continue;
            }
            let column_oid = Oid::from(&components[..column_length])
                .map_err(|_| SnmpClientError::OidParseError)?
                .to_owned();
            rows_map
                .entry(components[column_length..].to_vec())
                .or_default()
                .insert(column_oid, value);
        }

        let mut rows: Vec<SnmpTableRow> = rows_map
            .into_iter()
            .map(|(row_index_suffix, columns)| SnmpTableRow {
                table_oid_prefix: table_oid_prefix.clone(),
                row_index_suffix,
                columns,
            })
            .collect();
        rows.sort_by(|a, b| a.row_index_suffix.cmp(&b.row_index_suffix));
        Ok(rows)
    }
}

/// Builds an owned OID from numeric components.
pub fn oid_from(components: &[u64]) -> Result<Oid<'static>, SnmpClientError> {
    Oid::from(components)
        .map(|oid| oid.to_owned())
        .map_err(|_| SnmpClientError::OidParseError)
}
