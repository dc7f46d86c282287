mod env;

#[cfg(test)]
mod tests;

use std::path::Path;

use anyhow::{Context, ensure};
use serde::Deserialize;
use shellgate_tools::{AuditConfig, LocalConfig, RemoteConfig};

/// Top-level configuration: one section per executor plus the audit sink.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject values that would make every call fail.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.local.timeout > 0, "local.timeout must be greater than zero");
        ensure!(self.remote.timeout > 0, "remote.timeout must be greater than zero");
        ensure!(
            self.remote.connect_timeout > 0,
            "remote.connect_timeout must be greater than zero"
        );
        ensure!(self.remote.port > 0, "remote.port must be greater than zero");
        ensure!(
            self.local.max_output_chars > 0,
            "local.max_output_chars must be greater than zero"
        );
        ensure!(
            self.remote.max_output_chars > 0,
            "remote.max_output_chars must be greater than zero"
        );
        ensure!(
            !self.audit.destination.trim().is_empty(),
            "audit.destination must not be empty"
        );
        Ok(())
    }
}
