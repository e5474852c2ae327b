use std::net::Ipv4Addr;

use async_trait::async_trait;
use snmp2::{Oid, Value};

use super::{snmp::SnmpClientError, ssh::SshError};

/// An open command-line session towards one device (SSH in production).
#[async_trait]
pub trait CommandSession: Send + Sync {
    /// Runs a single command and returns everything it printed.
    async fn execute_command(&self, command: &str) -> Result<String, SshError>;

    async fn close(self: Box<Self>) -> Result<(), SshError>;
}

/// Opens command sessions to devices by address.
#[async_trait]
pub trait CommandConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn CommandSession>, SshError>;
}

/// An open SNMP session towards one device.
#[async_trait]
pub trait SnmpSession: Send {
    async fn get(&mut self, oid: &Oid<'static>) -> Result<SnmpResponse, SnmpClientError>;

    async fn get_next(&mut self, oid: &Oid<'static>) -> Result<SnmpResponse, SnmpClientError>;
}

/// Opens SNMP sessions to devices by address. Resolving the address is part of connecting.
#[async_trait]
pub trait SnmpConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn SnmpSession>, SnmpClientError>;
}

/// Owned copy of an SNMP response PDU, detached from the session's receive buffer.
#[derive(Debug, Clone, Default)]
pub struct SnmpResponse {
    /// Non-zero when the agent rejected the request (noSuchName, genErr, ...).
    pub error_status: u32,
    pub varbinds: Vec<(Oid<'static>, SnmpValue)>,
}

impl SnmpResponse {
    pub fn ok(varbinds: Vec<(Oid<'static>, SnmpValue)>) -> Self {
        Self {
            error_status: 0,
            varbinds,
        }
    }

    pub fn error(error_status: u32) -> Self {
        Self {
            error_status,
            varbinds: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_status != 0
    }
}

/// Replacement for the snmp2::Value type due to lifetime shenanigans
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    IpAddress(Ipv4Addr),
    /// Raw bytes; CDP device ids and ports are text, cdpCacheAddress is packed IPv4.
    OctetString(Vec<u8>),
    Counter32(u32),
    Timeticks(u32),
    Boolean(bool),
    Unsigned32(u32),
    /// endOfMibView, noSuchObject or noSuchInstance
    EndOfView,
    Unknown,
}

impl SnmpValue {
    /// Text rendering used for identities. Non-UTF-8 octet strings are rendered as hex.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SnmpValue::OctetString(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => Some(s.trim_matches(char::from(0)).trim().to_string()),
                Err(_) => Some(hex::encode(bytes)),
            },
            SnmpValue::IpAddress(ip) => Some(ip.to_string()),
            SnmpValue::Integer(i) => Some(i.to_string()),
            SnmpValue::Counter32(v) | SnmpValue::Timeticks(v) | SnmpValue::Unsigned32(v) => {
                Some(v.to_string())
            }
            SnmpValue::Boolean(b) => Some(b.to_string()),
            SnmpValue::EndOfView | SnmpValue::Unknown => None,
        }
    }

    /// Interprets the value as an IPv4 address, accepting the packed 4-byte form.
    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        match self {
            SnmpValue::IpAddress(ip) => Some(*ip),
            SnmpValue::OctetString(bytes) if bytes.len() == 4 => {
                Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
            }
            SnmpValue::OctetString(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&Value<'_>> for SnmpValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Integer(i) => SnmpValue::Integer(*i),
            Value::IpAddress(ip) => SnmpValue::IpAddress(Ipv4Addr::from(*ip)),
            Value::OctetString(s) => SnmpValue::OctetString(s.to_vec()),
            Value::Counter32(c) => SnmpValue::Counter32(*c),
            Value::Timeticks(t) => SnmpValue::Timeticks(*t),
            Value::Boolean(b) => SnmpValue::Boolean(*b),
            Value::Unsigned32(u) => SnmpValue::Unsigned32(*u),
            Value::EndOfMibView | Value::NoSuchObject | Value::NoSuchInstance => {
                SnmpValue::EndOfView
            }
            _ => SnmpValue::Unknown,
        }
    }
}
