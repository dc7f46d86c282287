use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::policy::Rejection;

/// Exit code reported whenever the target never ran.
pub const NOT_EXECUTED: i32 = -1;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const MAX_OUTPUT_CHARS: usize = 30_000;

/// One execution request as delivered by the caller.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CommandRequest {
    /// Command line; the first whitespace-delimited token is the command name.
    pub command: String,
    /// Wall-clock bound in seconds, must be greater than zero. When absent the
    /// executor's configured default applies.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Working directory for local execution. Ignored by the remote executor.
    #[serde(default)]
    pub working_directory: Option<String>,
}

impl CommandRequest {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout_seconds: None,
            working_directory: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    #[must_use]
    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// Uniform result record returned by every execution path.
///
/// `return_code == -1` means nothing ran and `stderr` carries a diagnostic
/// prefixed by its [`ErrorCategory`]. Any other value is the target's own exit
/// status, even when non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl ExecutionResult {
    /// Normalize a failure into the `return_code == -1` shape.
    #[must_use]
    pub fn from_error(command: &str, err: &ExecError) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("{}: {err}", err.category()),
            return_code: NOT_EXECUTED,
            command: command.to_owned(),
            working_directory: None,
            duration_ms: 0,
            truncated: false,
        }
    }

    #[must_use]
    pub fn executed(&self) -> bool {
        self.return_code != NOT_EXECUTED
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Cap both streams to `max_chars`, flagging the result when anything was cut.
    #[must_use]
    pub fn truncate_streams(mut self, max_chars: usize) -> Self {
        if self.stdout.len() > max_chars {
            self.stdout = truncate_output(&self.stdout, max_chars);
            self.truncated = true;
        }
        if self.stderr.len() > max_chars {
            self.stderr = truncate_output(&self.stderr, max_chars);
            self.truncated = true;
        }
        self
    }
}

/// Outcome of `connect` / `disconnect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

impl ConnectionStatus {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Diagnostic family, rendered as the stderr prefix of a failed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Security,
    NotConnected,
    Timeout,
    Execution,
    InvalidRequest,
}

impl ErrorCategory {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Security => "security error",
            Self::NotConnected => "not connected",
            Self::Timeout => "timeout",
            Self::Execution => "execution error",
            Self::InvalidRequest => "invalid request",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Errors raised below the façade. None of them cross it.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("{0}")]
    Rejected(Rejection),

    #[error("no active SSH session, call connect first")]
    NotConnected,

    #[error("command timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("failed to start command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("authentication failed for {user}@{host}: {reason}")]
    AuthFailed {
        user: String,
        host: String,
        reason: String,
    },

    #[error("SSH transport error: {0}")]
    Transport(String),

    #[error("{message}")]
    InvalidRequest { message: String },

    #[error("execution failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Rejected(_) => ErrorCategory::Security,
            Self::NotConnected => ErrorCategory::NotConnected,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::InvalidRequest { .. } => ErrorCategory::InvalidRequest,
            Self::Spawn(_) | Self::AuthFailed { .. } | Self::Transport(_) | Self::Io(_) => {
                ErrorCategory::Execution
            }
        }
    }
}

impl From<russh::Error> for ExecError {
    fn from(err: russh::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Truncate output longer than `max_chars` using a head+tail split.
#[must_use]
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    if output.len() <= max_chars {
        return output.to_string();
    }

    let half = max_chars / 2;
    let head_end = output.floor_char_boundary(half);
    let tail_start = output.ceil_char_boundary(output.len() - half);
    let head = &output[..head_end];
    let tail = &output[tail_start..];
    let truncated = tail_start - head_end;

    format!(
        "{head}\n\n... [truncated {truncated} chars, showing first and last ~{half} chars] ...\n\n{tail}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_categories() {
        let rejected = ExecError::Rejected(Rejection::BlockedToken { token: "rm".into() });
        assert_eq!(rejected.category(), ErrorCategory::Security);
        assert_eq!(ExecError::NotConnected.category(), ErrorCategory::NotConnected);
        assert_eq!(
            ExecError::Timeout { timeout_secs: 1 }.category(),
            ErrorCategory::Timeout
        );
        assert_eq!(
            ExecError::Transport("reset".into()).category(),
            ErrorCategory::Execution
        );
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "sh not found");
        assert_eq!(ExecError::Spawn(io_err).category(), ErrorCategory::Execution);
    }

    #[test]
    fn from_error_prefixes_stderr() {
        let err = ExecError::Rejected(Rejection::BlockedToken { token: "rm".into() });
        let result = ExecutionResult::from_error("rm -rf /", &err);
        assert_eq!(result.return_code, NOT_EXECUTED);
        assert_eq!(result.stderr, "security error: dangerous command blocked: rm");
        assert_eq!(result.command, "rm -rf /");
        assert!(result.stdout.is_empty());
        assert!(!result.executed());
    }

    #[test]
    fn timeout_display() {
        let err = ExecError::Timeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "command timed out after 30s");
        let result = ExecutionResult::from_error("sleep 99", &err);
        assert_eq!(result.stderr, "timeout: command timed out after 30s");
    }

    #[test]
    fn not_connected_display() {
        let result = ExecutionResult::from_error("ls", &ExecError::NotConnected);
        assert!(result.stderr.starts_with("not connected: "));
    }

    #[test]
    fn auth_failed_display() {
        let err = ExecError::AuthFailed {
            user: "x".into(),
            host: "bad-host".into(),
            reason: "rejected by server".into(),
        };
        assert_eq!(
            err.to_string(),
            "authentication failed for x@bad-host: rejected by server"
        );
    }

    #[test]
    fn spawn_display_keeps_source_text() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ExecError::Spawn(io_err);
        assert!(err.to_string().starts_with("failed to start command:"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn request_defaults() {
        let req: CommandRequest = serde_json::from_str(r#"{"command":"ls"}"#).unwrap();
        assert_eq!(req.timeout_seconds, None);
        assert!(req.working_directory.is_none());
        let req = CommandRequest::new("pwd")
            .with_timeout(5)
            .with_working_directory("/tmp");
        assert_eq!(req.timeout_seconds, Some(5));
        assert_eq!(req.working_directory.as_deref(), Some("/tmp"));
    }

    #[test]
    fn result_serialization_skips_empty_optionals() {
        let result = ExecutionResult {
            stdout: "hi\n".into(),
            stderr: String::new(),
            return_code: 0,
            command: "echo hi".into(),
            working_directory: None,
            duration_ms: 3,
            truncated: false,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"return_code\":0"));
        assert!(!json.contains("working_directory"));
        assert!(!json.contains("truncated"));
    }

    #[test]
    fn truncate_output_short_passthrough() {
        assert_eq!(truncate_output("hello world", 100), "hello world");
    }

    #[test]
    fn truncate_output_exact_limit() {
        let exact = "a".repeat(MAX_OUTPUT_CHARS);
        assert_eq!(truncate_output(&exact, MAX_OUTPUT_CHARS), exact);
    }

    #[test]
    fn truncate_output_long_split() {
        let long = "x".repeat(MAX_OUTPUT_CHARS + 1000);
        let result = truncate_output(&long, MAX_OUTPUT_CHARS);
        assert!(result.contains("truncated 1000 chars"));
        assert!(result.len() < long.len());
    }

    #[test]
    fn truncate_streams_flags_result() {
        let result = ExecutionResult {
            stdout: "y".repeat(50),
            stderr: "short".into(),
            return_code: 0,
            command: "echo".into(),
            working_directory: None,
            duration_ms: 0,
            truncated: false,
        }
        .truncate_streams(20);
        assert!(result.truncated);
        assert!(result.stdout.contains("truncated"));
        assert_eq!(result.stderr, "short");
    }

    #[test]
    fn connection_status_constructors() {
        assert!(ConnectionStatus::ok("connected").success);
        let failed = ConnectionStatus::failed("connection failed: refused");
        assert!(!failed.success);
        assert!(failed.message.starts_with("connection failed"));
    }
}
