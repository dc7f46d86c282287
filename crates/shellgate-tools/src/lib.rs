//! Policy-gated command execution on the local host and over SSH.

pub mod audit;
pub mod config;
pub mod executor;
pub mod local;
pub mod policy;
pub mod registry;
pub mod remote;
pub mod secret;
pub mod ssh;
pub mod toolbox;

pub use audit::{AuditEntry, AuditLogger, AuditResult};
pub use config::{AuditConfig, LocalConfig, RemoteConfig};
pub use executor::{
    CommandRequest, ConnectionStatus, DEFAULT_TIMEOUT_SECS, ErrorCategory, ExecError,
    ExecutionResult, MAX_OUTPUT_CHARS, NOT_EXECUTED, truncate_output,
};
pub use local::{LocalExecutor, ProcessRunner};
pub use policy::{CommandPolicy, PolicyDecision, Rejection};
pub use registry::{ToolDef, ToolRegistry};
pub use remote::{ConnectRequest, RemoteExecutor, RemoteSession, SshConnection, SshConnector};
pub use secret::Secret;
pub use ssh::RusshConnector;
pub use toolbox::{ToolCall, Toolbox};
