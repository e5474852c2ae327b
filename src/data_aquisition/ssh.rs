use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ssh2::Session;
use thiserror::Error;
use tokio::sync::Mutex;

use super::core::{CommandConnector, CommandSession};

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and as whom to log in. Moved onto the blocking pool for the handshake.
#[derive(Clone)]
struct SshTarget {
    username: String,
    host: String,
    password: Option<String>,
    port: u16,
    timeout: Duration,
}

impl SshTarget {
    fn open(self) -> Result<Session, SshError> {
        let SshTarget {
            username,
            host,
            password,
            port,
            timeout,
        } = self;
        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| SshError::Unresolvable(host.clone()))?;
        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| SshError::TcpError(format!("{addr}: {e}")))?;

        let mut session = Session::new().map_err(protocol_error)?;
        // libssh2 takes milliseconds; 0 would mean no timeout at all.
        session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX).max(1));
        session.set_tcp_stream(tcp);
        session.handshake().map_err(protocol_error)?;
        if let Some(password) = password {
            session
                .userauth_password(&username, &password)
                .map_err(|e| SshError::SshAuthError(format!("{username}@{host}: {e}")))?;
        }
        if !session.authenticated() {
            return Err(SshError::SshAuthError(format!("{username}@{host}: not authenticated")));
        }
        Ok(session)
    }
}

fn protocol_error(e: ssh2::Error) -> SshError {
    SshError::SshError(e.to_string())
}

fn run_command(session: &Session, command: &str) -> Result<String, SshError> {
    let mut channel = session.channel_session().map_err(protocol_error)?;
    channel
        .exec(command)
        .map_err(|e| SshError::CommandError(format!("'{command}': {e}")))?;
    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .map_err(|e| SshError::CommandError(format!("'{command}': {e}")))?;
    channel.wait_close().map_err(protocol_error)?;
    Ok(output)
}

/// A password-authenticated SSH login to one device.
///
/// libssh2 is blocking, so the handshake and each command run on tokio's blocking pool.
pub struct SshClient {
    target: SshTarget,
    session: Option<Arc<Mutex<Session>>>,
}

#[derive(Debug, Error)]
pub enum SshError {
    #[error("could not resolve '{0}'")]
    Unresolvable(String),
    #[error("TCP error: {0}")]
    TcpError(String),
    #[error("SSH error: {0}")]
    SshError(String),
    #[error("SSH authentication error: {0}")]
    SshAuthError(String),
    #[error("Command execution error: {0}")]
    CommandError(String),
    #[error("Async error: {0}")]
    AsyncError(String),
}

impl SshClient {
    pub fn new_with_password(username: String, host: String, password: String, port: u16) -> Self {
        Self {
            target: SshTarget {
                username,
                host,
                password: Some(password),
                port,
                timeout: DEFAULT_SSH_TIMEOUT,
            },
            session: None,
        }
    }

    /// Bounds the TCP connect and every blocking libssh2 call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.target.timeout = timeout;
        self
    }

    pub async fn connect(&mut self) -> Result<(), SshError> {
        if self.session.is_some() {
            return Err(SshError::SshError(format!("{}: already connected", self.target.host)));
        }
        let target = self.target.clone();
        let session = tokio::task::spawn_blocking(move || target.open())
            .await
            .map_err(|e| SshError::AsyncError(e.to_string()))??;
        self.session = Some(Arc::new(Mutex::new(session)));
        Ok(())
    }

    pub async fn execute_command(&self, command: &str) -> Result<String, SshError> {
        let Some(session) = self.session.clone() else {
            return Err(SshError::SshError(format!("{}: session not initialized", self.target.host)));
        };
        let command = command.to_string();
        tokio::task::spawn_blocking(move || run_command(&session.blocking_lock(), &command))
            .await
            .map_err(|e| SshError::AsyncError(e.to_string()))?
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub async fn close(self) -> Result<(), SshError> {
        let Some(session) = self.session else {
            return Ok(());
        };
        // A command abandoned by its caller still owns the session on the blocking pool.
        // The socket closes when that command returns and drops the last handle.
        let Ok(session) = session.try_lock_owned() else {
            return Ok(());
        };
        // The disconnect message is a blocking write on the socket.
        tokio::task::spawn_blocking(move || {
            session
                .disconnect(Some(ssh2::DisconnectCode::ByApplication), "crawl finished", None)
                .map_err(protocol_error)
        })
        .await
        .map_err(|e| SshError::AsyncError(e.to_string()))?
    }
}

#[async_trait]
impl CommandSession for SshClient {
    async fn execute_command(&self, command: &str) -> Result<String, SshError> {
        SshClient::execute_command(self, command).await
    }

    async fn close(self: Box<Self>) -> Result<(), SshError> {
        SshClient::close(*self).await
    }
}

/// Opens one password-authenticated SSH session per device.
#[derive(Clone)]
pub struct SshConnector {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub timeout: Duration,
}

impl SshConnector {
    pub fn new(username: String, password: String) -> Self {
        Self {
            username,
            password,
            port: DEFAULT_SSH_PORT,
            timeout: DEFAULT_SSH_TIMEOUT,
        }
    }
}

#[async_trait]
impl CommandConnector for SshConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn CommandSession>, SshError> {
        let mut client = SshClient::new_with_password(
            self.username.clone(),
            address.to_string(),
            self.password.clone(),
            self.port,
        )
        .with_timeout(self.timeout);
        client.connect().await?;
        Ok(Box::new(client))
    }
}
