use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "shellgate", version, about = "Policy-gated local and SSH command execution")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one allow-listed command on this host
    Exec(ExecArgs),
    /// Connect to a host over SSH and run commands on one session
    Remote(RemoteArgs),
    /// List allowed command names
    Allowed {
        /// Show the remote registry instead of the local one
        #[arg(long)]
        remote: bool,
    },
    /// Print tool definitions as JSON
    Tools,
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Timeout in seconds (defaults to `local.timeout`)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Working directory for the command
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<String>,

    /// Command line; several words are joined with spaces
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl ExecArgs {
    #[must_use]
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Debug, Args)]
pub struct RemoteArgs {
    #[arg(long)]
    pub host: String,

    #[arg(long)]
    pub user: String,

    /// Defaults to `remote.port`
    #[arg(long)]
    pub port: Option<u16>,

    /// Private key file, tried before the password
    #[arg(long, value_name = "PATH")]
    pub key: Option<String>,

    /// Read the password from this environment variable
    #[arg(long, value_name = "VAR", conflicts_with = "ask_password")]
    pub password_env: Option<String>,

    /// Prompt for the password
    #[arg(long)]
    pub ask_password: bool,

    /// Per-command timeout in seconds (defaults to `remote.timeout`)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Commands to run in order; quote each one
    #[arg(required = true)]
    pub commands: Vec<String>,
}
