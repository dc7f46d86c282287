use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::audit::{AuditEntry, AuditLogger};
use crate::config::LocalConfig;
use crate::executor::{
    CommandRequest, DEFAULT_TIMEOUT_SECS, ExecError, ExecutionResult, MAX_OUTPUT_CHARS,
    NOT_EXECUTED,
};
use crate::policy::{CommandPolicy, PolicyDecision};

/// Captured streams and exit code of a finished local process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Spawns shell-interpreted commands under a wall-clock bound.
///
/// Each child leads its own process group so that a timeout can take down
/// everything the shell started, not just the shell itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Run `command` through the platform shell in `working_dir`.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::Spawn` when the shell cannot be started,
    /// `ExecError::Timeout` when the bound elapses (the process group is killed
    /// and reaped first), or `ExecError::Io` if waiting on the child fails.
    pub async fn run(
        &self,
        command: &str,
        timeout: Duration,
        working_dir: &Path,
    ) -> Result<ProcessOutput, ExecError> {
        let mut cmd = shell_command(command);
        cmd.current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(ExecError::Spawn)?;
        // The group outlives the leader once it is reaped, so keep its id.
        let pgid = child.id();
        tracing::debug!(pid = ?pgid, command, "spawned local process");

        let mut stdout = tokio::spawn(read_stream(child.stdout.take()));
        let mut stderr = tokio::spawn(read_stream(child.stderr.take()));

        let collected = tokio::time::timeout(timeout, async {
            let status = child.wait().await?;
            let out = (&mut stdout).await.unwrap_or_default();
            let err = (&mut stderr).await.unwrap_or_default();
            Ok::<_, std::io::Error>((status, out, err))
        })
        .await;

        let failure = match collected {
            Ok(Ok((status, stdout, stderr))) => {
                return Ok(ProcessOutput {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    exit_code: exit_code(status),
                });
            }
            Ok(Err(e)) => ExecError::Io(e),
            Err(_) => ExecError::Timeout {
                timeout_secs: timeout.as_secs(),
            },
        };

        terminate(&mut child, pgid).await;
        stdout.abort();
        stderr.abort();
        Err(failure)
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream
        && let Err(e) = stream.read_to_end(&mut buf).await
    {
        tracing::debug!("stream read ended early: {e}");
    }
    buf
}

/// Kill the process group led by `pgid`, then the child itself, and reap it.
///
/// The group is signalled even when the leader has already exited: background
/// jobs it started may still hold the output pipes open.
async fn terminate(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = pgid {
            #[allow(clippy::cast_possible_wrap)]
            let group = Pid::from_raw(pid as i32);
            if let Err(e) = killpg(group, Signal::SIGKILL) {
                tracing::debug!(pid, "failed to signal process group: {e}");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;
    if let Err(e) = child.kill().await {
        tracing::debug!("kill after timeout: {e}");
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    NOT_EXECUTED
}

/// Policy-gated execution on this host.
#[derive(Debug)]
pub struct LocalExecutor {
    policy: CommandPolicy,
    runner: ProcessRunner,
    default_timeout_secs: u64,
    max_output_chars: usize,
    audit_logger: Option<Arc<AuditLogger>>,
}

impl LocalExecutor {
    #[must_use]
    pub fn new(policy: CommandPolicy) -> Self {
        Self {
            policy,
            runner: ProcessRunner,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_chars: MAX_OUTPUT_CHARS,
            audit_logger: None,
        }
    }

    #[must_use]
    pub fn from_config(config: &LocalConfig) -> Self {
        let policy = CommandPolicy::local_default()
            .extend(&config.allowed_commands, &config.blocked_commands);
        Self {
            default_timeout_secs: config.timeout,
            max_output_chars: config.max_output_chars,
            ..Self::new(policy)
        }
    }

    /// Timeout applied to requests that do not carry their own.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout_secs: u64) -> Self {
        self.default_timeout_secs = timeout_secs;
        self
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    #[must_use]
    pub fn with_max_output_chars(mut self, max_output_chars: usize) -> Self {
        self.max_output_chars = max_output_chars;
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

    /// Evaluate, run, and normalize. Never fails: every error becomes a
    /// result with `return_code == -1`.
    pub async fn execute(&self, request: &CommandRequest) -> ExecutionResult {
        let start = Instant::now();
        let outcome = self.execute_inner(request).await;
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Some(ref logger) = self.audit_logger {
            let entry = AuditEntry::from_outcome("local", &request.command, &outcome, duration_ms);
            logger.log(&entry).await;
        }

        let result = match outcome {
            Ok(result) => {
                tracing::info!(
                    command = %request.command,
                    return_code = result.return_code,
                    duration_ms,
                    "local command finished"
                );
                result
            }
            Err(e) => {
                tracing::warn!(command = %request.command, category = %e.category(), "local command not executed: {e}");
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

        let working_dir = match request.working_directory.as_deref() {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::current_dir()?,
        };

        let output = self
            .runner
            .run(&request.command, timeout, &working_dir)
            .await?;

        Ok(ExecutionResult {
            stdout: output.stdout,
            stderr: output.stderr,
            return_code: output.exit_code,
            command: request.command.clone(),
            working_directory: Some(working_dir.display().to_string()),
            duration_ms: 0,
            truncated: false,
        })
    }
}

/// The request's own timeout wins over the executor default. Zero is invalid
/// from either source.
pub(crate) fn resolve_timeout(
    requested: Option<u64>,
    default_secs: u64,
) -> Result<Duration, ExecError> {
    let timeout_seconds = requested.unwrap_or(default_secs);
    if timeout_seconds == 0 {
        return Err(ExecError::InvalidRequest {
            message: "timeout_seconds must be greater than zero".into(),
        });
    }
    Ok(Duration::from_secs(timeout_seconds))
}
