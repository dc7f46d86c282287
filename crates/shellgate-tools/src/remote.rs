//! Remote execution over a single long-lived SSH session.
//!
//! [`RemoteSession`] owns at most one authenticated connection and is generic
//! over the [`SshConnector`] that produces it, so the state machine can be
//! exercised without a server. [`RemoteExecutor`] wraps the session in an async
//! mutex and applies the policy before anything reaches the wire.
//!
//! A timed-out remote command is abandoned locally only: the channel is
//! dropped but the process on the remote host may keep running.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::audit::{AuditEntry, AuditLogger};
use crate::config::RemoteConfig;
use crate::executor::{CommandRequest, ConnectionStatus, ExecError, ExecutionResult};
use crate::local::resolve_timeout;
use crate::policy::{CommandPolicy, PolicyDecision};
use crate::secret::Secret;
use crate::ssh::RusshConnector;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Parameters of `connect` as delivered by the caller.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ConnectRequest {
    pub hostname: String,
    pub username: String,
    /// Password authentication, used when no key file is given or the key is refused.
    #[serde(default)]
    pub password: Option<String>,
    /// Path to a private key file, tried before the password.
    #[serde(default)]
    pub key_path: Option<String>,
    /// Defaults to 22.
    #[serde(default)]
    pub port: Option<u16>,
}

impl ConnectRequest {
    #[must_use]
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
            password: None,
            key_path: None,
            port: None,
        }
    }
}

/// Resolved connection target with credentials wrapped.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub hostname: String,
    pub username: String,
    pub password: Option<Secret>,
    pub key_path: Option<PathBuf>,
    pub port: u16,
}

impl SshTarget {
    #[must_use]
    pub fn from_request(request: ConnectRequest, default_port: u16) -> Self {
        Self {
            hostname: request.hostname,
            username: request.username,
            password: request.password.filter(|p| !p.is_empty()).map(Secret::new),
            key_path: request
                .key_path
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            port: request.port.unwrap_or(default_port),
        }
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.username, self.hostname, self.port)
    }
}

/// Raw output of one remote command, collected until the channel closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<u32>,
    pub exit_signal: Option<String>,
}

/// Produces authenticated connections.
pub trait SshConnector: Send + Sync {
    type Connection: SshConnection;

    fn connect(
        &self,
        target: &SshTarget,
    ) -> impl Future<Output = Result<Self::Connection, ExecError>> + Send;
}

/// One authenticated connection able to run commands sequentially.
pub trait SshConnection: Send {
    /// Run `command` on a fresh exec channel and drain it to close.
    fn exec(&mut self, command: &str)
    -> impl Future<Output = Result<RemoteOutput, ExecError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), ExecError>> + Send;
}

struct ActiveSession<T> {
    conn: T,
    address: String,
}

/// Disconnected / Connected state machine around one connection.
pub struct RemoteSession<C: SshConnector> {
    connector: C,
    active: Option<ActiveSession<C::Connection>>,
    connect_timeout: Duration,
}

impl<C: SshConnector> RemoteSession<C> {
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            active: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// `user@host:port` of the live connection.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.address.as_str())
    }

    /// Establish a new connection, replacing any existing one.
    ///
    /// The previous connection is closed first even if the new attempt fails,
    /// so a failed reopen always leaves the session disconnected.
    ///
    /// # Errors
    ///
    /// Returns an error if the connector fails or the connect timeout elapses.
    pub async fn open(&mut self, target: &SshTarget) -> Result<(), ExecError> {
        if let Some(mut previous) = self.active.take() {
            tracing::info!(address = %previous.address, "closing previous SSH session");
            if let Err(e) = previous.conn.close().await {
                tracing::warn!(address = %previous.address, "failed to close previous SSH session: {e}");
            }
        }

        let conn = tokio::time::timeout(self.connect_timeout, self.connector.connect(target))
            .await
            .map_err(|_| {
                ExecError::Transport(format!(
                    "connecting to {}:{} timed out after {}s",
                    target.hostname,
                    target.port,
                    self.connect_timeout.as_secs()
                ))
            })??;

        self.active = Some(ActiveSession {
            conn,
            address: target.address(),
        });
        Ok(())
    }

    /// Run one command on the live connection.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::NotConnected`] without a prior successful `open`,
    /// [`ExecError::Timeout`] when `timeout` elapses, or the transport error.
    pub async fn execute(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<RemoteOutput, ExecError> {
        let Some(active) = self.active.as_mut() else {
            return Err(ExecError::NotConnected);
        };

        if let Ok(result) = tokio::time::timeout(timeout, active.conn.exec(command)).await {
            result
        } else {
            tracing::warn!(
                address = %active.address,
                command,
                "remote command timed out, the remote process may still be running"
            );
            Err(ExecError::Timeout {
                timeout_secs: timeout.as_secs(),
            })
        }
    }

    /// Close the live connection. Returns `false` when there was none.
    ///
    /// # Errors
    ///
    /// Returns the transport error from closing. The session is disconnected
    /// either way.
    pub async fn close(&mut self) -> Result<bool, ExecError> {
        let Some(mut active) = self.active.take() else {
            return Ok(false);
        };
        active.conn.close().await?;
        Ok(true)
    }
}

/// Policy-gated execution on one remote host.
///
/// Session operations are serialized through an async mutex; callers sharing
/// one executor see a consistent connection state.
pub struct RemoteExecutor<C: SshConnector = RusshConnector> {
    policy: CommandPolicy,
    session: Mutex<RemoteSession<C>>,
    default_port: u16,
    default_timeout_secs: u64,
    max_output_chars: usize,
    audit_logger: Option<Arc<AuditLogger>>,
}

impl RemoteExecutor<RusshConnector> {
    #[must_use]
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::with_connector(RusshConnector::new(), config)
    }
}

impl<C: SshConnector> RemoteExecutor<C> {
    #[must_use]
    pub fn with_connector(connector: C, config: &RemoteConfig) -> Self {
        let policy = CommandPolicy::remote_default()
            .extend(&config.allowed_commands, &config.blocked_commands);
        let session = RemoteSession::new(connector)
            .with_connect_timeout(Duration::from_secs(config.connect_timeout));
        Self {
            policy,
            session: Mutex::new(session),
            default_port: config.port,
            default_timeout_secs: config.timeout,
            max_output_chars: config.max_output_chars,
            audit_logger: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    #[must_use]
    pub fn list_allowed_commands(&self) -> Vec<String> {
        self.policy.describe_allowed()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_connected()
    }

    pub async fn connect(&self, request: ConnectRequest) -> ConnectionStatus {
        if request.hostname.trim().is_empty() || request.username.trim().is_empty() {
            return ConnectionStatus::failed(
                "connection failed: hostname and username must not be empty",
            );
        }

        let target = SshTarget::from_request(request, self.default_port);
        let mut session = self.session.lock().await;
        match session.open(&target).await {
            Ok(()) => {
                tracing::info!(address = %target.address(), "SSH session established");
                ConnectionStatus::ok(format!("connected to {}", target.address()))
            }
            Err(e) => {
                tracing::warn!(address = %target.address(), "SSH connection failed: {e}");
                ConnectionStatus::failed(format!("connection failed: {e}"))
            }
        }
    }

    /// Close the session. Succeeds when nothing was connected.
    pub async fn disconnect(&self) -> ConnectionStatus {
        let mut session = self.session.lock().await;
        let address = session.address().map(ToOwned::to_owned);
        match session.close().await {
            Ok(true) => {
                tracing::info!(address = address.as_deref().unwrap_or_default(), "SSH session closed");
                ConnectionStatus::ok("disconnected")
            }
            Ok(false) => ConnectionStatus::ok("no active connection"),
            Err(e) => {
                tracing::warn!("SSH disconnect failed: {e}");
                ConnectionStatus::failed(format!("failed to close connection: {e}"))
            }
        }
    }

    /// Evaluate, run, and normalize. `working_directory` is ignored.
    pub async fn execute(&self, request: &CommandRequest) -> ExecutionResult {
        let start = Instant::now();
        let outcome = self.execute_inner(request).await;
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Some(ref logger) = self.audit_logger {
            let entry = AuditEntry::from_outcome("remote", &request.command, &outcome, duration_ms);
            logger.log(&entry).await;
        }

        let result = match outcome {
            Ok(result) => {
                tracing::info!(
                    command = %request.command,
                    return_code = result.return_code,
                    duration_ms,
                    "remote command finished"
                );
                result
            }
            Err(e) => {
                tracing::warn!(command = %request.command, category = %e.category(), "remote command not executed: {e}");
                ExecutionResult::from_error(&request.command, &e)
            }
        };
        result
            .with_duration_ms(duration_ms)
            .truncate_streams(self.max_output_chars)
    }

    async fn execute_inner(&self, request: &CommandRequest) -> Result<ExecutionResult, ExecError> {
        let timeout = resolve_timeout(request.timeout_seconds, self.default_timeout_secs)?;
        if let PolicyDecision::Rejected(rejection) = self.policy.evaluate(&request.command) {
            return Err(ExecError::Rejected(rejection));
        }

        let output = self
            .session
            .lock()
            .await
            .execute(&request.command, timeout)
            .await?;

        let return_code = remote_exit_code(&output)?;
        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            return_code,
            command: request.command.clone(),
            working_directory: None,
            duration_ms: 0,
            truncated: false,
        })
    }
}

impl<C: SshConnector> fmt::Debug for RemoteExecutor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("policy", &self.policy)
            .field("default_port", &self.default_port)
            .field("default_timeout_secs", &self.default_timeout_secs)
            .field("max_output_chars", &self.max_output_chars)
            .finish_non_exhaustive()
    }
}

/// A remote signal death carries no numeric code and is reported as an
/// execution error.
fn remote_exit_code(output: &RemoteOutput) -> Result<i32, ExecError> {
    match (output.exit_status, output.exit_signal.as_deref()) {
        (Some(status), _) => i32::try_from(status)
            .map_err(|_| ExecError::Transport(format!("exit status {status} out of range"))),
        (None, Some(signal)) => Err(ExecError::Transport(format!(
            "remote command terminated by signal {signal}"
        ))),
        (None, None) => Err(ExecError::Transport(
            "channel closed without an exit status".into(),
        )),
    }
}
