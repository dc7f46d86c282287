use std::collections::BTreeMap;

use serde::Deserialize;

use crate::executor::{DEFAULT_TIMEOUT_SECS, MAX_OUTPUT_CHARS};

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_port() -> u16 {
    22
}

fn default_max_output_chars() -> usize {
    MAX_OUTPUT_CHARS
}

fn default_audit_destination() -> String {
    "stdout".into()
}

/// Local execution: default timeout, output cap, and registry additions.
#[derive(Debug, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    /// Extra command names mapped to their descriptions.
    #[serde(default)]
    pub allowed_commands: BTreeMap<String, String>,
    /// Extra substrings that reject a command.
    #[serde(default)]
    pub blocked_commands: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_output_chars: default_max_output_chars(),
            allowed_commands: BTreeMap::new(),
            blocked_commands: Vec::new(),
        }
    }
}

/// Remote execution over SSH.
#[derive(Debug, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    /// Extra command names mapped to their descriptions.
    #[serde(default)]
    pub allowed_commands: BTreeMap<String, String>,
    /// Extra substrings that reject a command.
    #[serde(default)]
    pub blocked_commands: Vec<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            port: default_port(),
            max_output_chars: default_max_output_chars(),
            allowed_commands: BTreeMap::new(),
            blocked_commands: Vec::new(),
        }
    }
}

/// Audit log sink: `"stdout"` routes entries through tracing, anything else is
/// treated as a file path opened in append mode.
#[derive(Debug, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_destination")]
    pub destination: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            destination: default_audit_destination(),
        }
    }
}
