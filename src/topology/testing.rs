//! Device-free stand-ins for the transports and for whole neighbor sources.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use snmp2::Oid;

use crate::{
    data_aquisition::{
        core::{CommandConnector, CommandSession, SnmpConnector, SnmpResponse, SnmpSession, SnmpValue},
        snmp::{SnmpClientError, oid_from},
        ssh::SshError,
    },
    network::neighbor::NeighborRecord,
    topology::{
        cli_source::{CDP_DETAIL_COMMAND, HOSTNAME_COMMAND},
        source::{DeviceReport, DiscoveryError, NeighborSource},
    },
};

/// Canned command output for one device.
#[derive(Clone, Default)]
pub struct FakeDevice {
    outputs: HashMap<String, String>,
    failing: Vec<String>,
    hanging: HashMap<String, Duration>,
}

impl FakeDevice {
    pub fn new(hostname_output: &str, cdp_output: &str) -> Self {
        let mut outputs = HashMap::new();
        outputs.insert(HOSTNAME_COMMAND.to_string(), hostname_output.to_string());
        outputs.insert(CDP_DETAIL_COMMAND.to_string(), cdp_output.to_string());
        Self {
            outputs,
            ..Default::default()
        }
    }

    pub fn failing_command(mut self, command: &str) -> Self {
        self.failing.push(command.to_string());
        self
    }

    /// The command answers only after `delay`.
    pub fn hanging_command(mut self, command: &str, delay: Duration) -> Self {
        self.hanging.insert(command.to_string(), delay);
        self
    }
}

#[async_trait]
impl CommandSession for FakeDevice {
    async fn execute_command(&self, command: &str) -> Result<String, SshError> {
        if let Some(delay) = self.hanging.get(command) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.iter().any(|c| c == command) {
            return Err(SshError::CommandError(format!("channel closed during '{command}'")));
        }
        Ok(self.outputs.get(command).cloned().unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<(), SshError> {
        Ok(())
    }
}

/// Connects only to the devices it was given; everything else is unreachable.
#[derive(Default)]
pub struct FakeCommandConnector {
    devices: HashMap<String, FakeDevice>,
    unresolvable: Vec<String>,
}

impl FakeCommandConnector {
    pub fn with_device(mut self, address: &str, device: FakeDevice) -> Self {
        self.devices.insert(address.to_string(), device);
        self
    }

    /// Names that fail DNS resolution.
    pub fn with_unresolvable(mut self, name: &str) -> Self {
        self.unresolvable.push(name.to_string());
        self
    }
}

#[async_trait]
impl CommandConnector for FakeCommandConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn CommandSession>, SshError> {
        if self.unresolvable.iter().any(|name| name == address) {
            return Err(SshError::Unresolvable(address.to_string()));
        }
        match self.devices.get(address) {
            Some(device) => Ok(Box::new(device.clone())),
            None => Err(SshError::TcpError(format!("{address}: connection timed out"))),
        }
    }
}

/// An SNMP agent backed by an ordered MIB. GETNEXT follows numeric OID order.
#[derive(Clone, Default)]
pub struct FakeSnmpAgent {
    mib: BTreeMap<Vec<u64>, SnmpValue>,
    /// Requests served before the agent goes silent.
    budget: Option<usize>,
    /// Requests for these OIDs are answered with the given error status.
    error_status: HashMap<Vec<u64>, u32>,
    /// How long a request past the budget hangs before failing.
    failure_delay: Duration,
}

impl FakeSnmpAgent {
    pub fn with(mut self, oid: &[u64], value: SnmpValue) -> Self {
        self.mib.insert(oid.to_vec(), value);
        self
    }

    pub fn failing_after(mut self, requests: usize) -> Self {
        self.budget = Some(requests);
        self
    }

    pub fn with_failure_delay(mut self, delay: Duration) -> Self {
        self.failure_delay = delay;
        self
    }

    pub fn with_error_status_at(mut self, oid: &[u64], status: u32) -> Self {
        self.error_status.insert(oid.to_vec(), status);
        self
    }

    pub fn into_session(self) -> FakeSnmpSession {
        FakeSnmpSession { agent: self, served: 0 }
    }
}

pub struct FakeSnmpSession {
    agent: FakeSnmpAgent,
    served: usize,
}

impl FakeSnmpSession {
    fn silent(&self) -> bool {
        self.agent.budget.is_some_and(|budget| self.served >= budget)
    }

    async fn wait_if_silent(&self) {
        if self.silent() && !self.agent.failure_delay.is_zero() {
            tokio::time::sleep(self.agent.failure_delay).await;
        }
    }

    fn answer(
        &mut self,
        oid: &Oid<'static>,
        lookup: impl FnOnce(&BTreeMap<Vec<u64>, SnmpValue>, &[u64]) -> Option<(Vec<u64>, SnmpValue)>,
    ) -> Result<SnmpResponse, SnmpClientError> {
        if self.silent() {
            return Err(SnmpClientError::Timeout(Duration::from_secs(2), 2));
        }
        self.served += 1;

        let requested: Vec<u64> = oid.iter().ok_or(SnmpClientError::OidParseError)?.collect();
        if let Some(status) = self.agent.error_status.get(&requested) {
            return Ok(SnmpResponse::error(*status));
        }
        let (found, value) = lookup(&self.agent.mib, &requested).unwrap_or((requested, SnmpValue::EndOfView));
        Ok(SnmpResponse::ok(vec![(oid_from(&found)?, value)]))
    }
}

#[async_trait]
impl SnmpSession for FakeSnmpSession {
    async fn get(&mut self, oid: &Oid<'static>) -> Result<SnmpResponse, SnmpClientError> {
        self.wait_if_silent().await;
        self.answer(oid, |mib, requested| {
            mib.get(requested).map(|value| (requested.to_vec(), value.clone()))
        })
    }

    async fn get_next(&mut self, oid: &Oid<'static>) -> Result<SnmpResponse, SnmpClientError> {
        self.wait_if_silent().await;
        self.answer(oid, |mib, requested| {
            mib.range(requested.to_vec()..)
                .find(|(key, _)| key.as_slice() != requested)
                .map(|(key, value)| (key.clone(), value.clone()))
        })
    }
}

/// Resolves only the addresses it has agents for.
#[derive(Default)]
pub struct FakeSnmpConnector {
    agents: HashMap<String, FakeSnmpAgent>,
}

impl FakeSnmpConnector {
    pub fn with_agent(mut self, address: &str, agent: FakeSnmpAgent) -> Self {
        self.agents.insert(address.to_string(), agent);
        self
    }
}

#[async_trait]
impl SnmpConnector for FakeSnmpConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn SnmpSession>, SnmpClientError> {
        match self.agents.get(address) {
            Some(agent) => Ok(Box::new(agent.clone().into_session())),
            None => Err(SnmpClientError::Unresolvable(address.to_string())),
        }
    }
}

/// A neighbor source answering from a fixed table, recording the order of scans.
#[derive(Default)]
pub struct ScriptedSource {
    replies: HashMap<String, Result<DeviceReport, DiscoveryError>>,
    delays: HashMap<String, Duration>,
    scanned: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    /// `neighbors` are `(remote_id, remote_address)` pairs; an empty address makes an
    /// identity-only record.
    pub fn device(mut self, address: &str, name: &str, neighbors: &[(&str, &str)]) -> Self {
        let neighbors = neighbors
            .iter()
            .filter_map(|(id, addr)| Some(NeighborRecord::new(*id)?.with_address(*addr)))
            .collect();
        self.replies.insert(
            address.to_string(),
            Ok(DeviceReport {
                display_name: name.to_string(),
                neighbors,
            }),
        );
        self
    }

    pub fn device_with_records(mut self, address: &str, name: &str, neighbors: Vec<NeighborRecord>) -> Self {
        self.replies.insert(
            address.to_string(),
            Ok(DeviceReport {
                display_name: name.to_string(),
                neighbors,
            }),
        );
        self
    }

    pub fn failing(mut self, address: &str, error: DiscoveryError) -> Self {
        self.replies.insert(address.to_string(), Err(error));
        self
    }

    pub fn delayed(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    pub fn scanned(&self) -> Vec<String> {
        self.scanned.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NeighborSource for ScriptedSource {
    async fn discover(&self, address: &str) -> Result<DeviceReport, DiscoveryError> {
        if let Ok(mut scanned) = self.scanned.lock() {
            scanned.push(address.to_string());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(address) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.replies
            .get(address)
            .cloned()
            .unwrap_or_else(|| Err(DiscoveryError::transport("connection refused", None)))
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }
}

/// Shares a scripted source with a crawler while keeping a handle for assertions.
pub fn shared(source: ScriptedSource) -> (Arc<ScriptedSource>, Arc<dyn NeighborSource>) {
    let source = Arc::new(source);
    let dynamic: Arc<dyn NeighborSource> = source.clone();
    (source, dynamic)
}
