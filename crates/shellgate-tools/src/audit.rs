use std::path::Path;

use crate::config::AuditConfig;
use crate::executor::{ExecError, ExecutionResult, NOT_EXECUTED};

/// Writes one JSON line per execution attempt.
#[derive(Debug)]
pub struct AuditLogger {
    destination: AuditDestination,
}

#[derive(Debug)]
enum AuditDestination {
    Stdout,
    File(tokio::sync::Mutex<tokio::fs::File>),
}

#[derive(Debug, serde::Serialize)]
pub struct AuditEntry {
    pub timestamp: String,
    /// `"local"` or `"remote"`.
    pub target: String,
    pub command: String,
    pub result: AuditResult,
    pub exit_code: i32,
    pub duration_ms: u64,
}

#[derive(Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type")]
pub enum AuditResult {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "blocked")]
    Blocked { reason: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "not_connected")]
    NotConnected,
}

impl From<&ExecError> for AuditResult {
    fn from(err: &ExecError) -> Self {
        match err {
            ExecError::Rejected(rejection) => Self::Blocked {
                reason: rejection.to_string(),
            },
            ExecError::Timeout { .. } => Self::Timeout,
            ExecError::NotConnected => Self::NotConnected,
            other => Self::Error {
                message: other.to_string(),
            },
        }
    }
}

impl AuditEntry {
    #[must_use]
    pub fn new(
        target: &str,
        command: &str,
        result: AuditResult,
        exit_code: i32,
        duration_ms: u64,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            target: target.to_owned(),
            command: command.to_owned(),
            result,
            exit_code,
            duration_ms,
        }
    }

    /// Build an entry from an execution outcome before it is normalized.
    ///
    /// A command that ran is a success regardless of its exit status; the
    /// status lands in `exit_code`.
    #[must_use]
    pub fn from_outcome(
        target: &str,
        command: &str,
        outcome: &Result<ExecutionResult, ExecError>,
        duration_ms: u64,
    ) -> Self {
        match outcome {
            Ok(result) => Self::new(
                target,
                command,
                AuditResult::Success,
                result.return_code,
                duration_ms,
            ),
            Err(e) => Self::new(target, command, e.into(), NOT_EXECUTED, duration_ms),
        }
    }
}

impl AuditLogger {
    /// Create a new `AuditLogger` from config.
    ///
    /// # Errors
    ///
    /// Returns an error if a file destination cannot be opened.
    pub async fn from_config(config: &AuditConfig) -> Result<Self, std::io::Error> {
        let destination = if config.destination == "stdout" {
            AuditDestination::Stdout
        } else {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(&config.destination))
                .await?;
            AuditDestination::File(tokio::sync::Mutex::new(file))
        };

        Ok(Self { destination })
    }

    pub async fn log(&self, entry: &AuditEntry) {
        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(command = %entry.command, "failed to encode audit entry: {e}");
                return;
            }
        };

        match &self.destination {
            AuditDestination::Stdout => {
                tracing::info!(target: "audit", "{json}");
            }
            AuditDestination::File(file) => {
                use tokio::io::AsyncWriteExt;
                let mut f = file.lock().await;
                let line = format!("{json}\n");
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    tracing::error!("failed to write audit log: {e}");
                } else if let Err(e) = f.flush().await {
                    tracing::error!("failed to flush audit log: {e}");
                }
            }
        }
    }
}
