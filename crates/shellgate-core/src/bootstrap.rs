//! Application bootstrap: config resolution and executor construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use shellgate_tools::{AuditConfig, AuditLogger, LocalExecutor, RemoteExecutor, Toolbox};

use crate::config::Config;

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Resolve, load, and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable, malformed, or invalid.
    pub fn new(cli_path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = resolve_config_path(cli_path);
        let config = Config::load(&config_path)?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
        tracing::debug!(path = %config_path.display(), "configuration loaded");
        Ok(Self {
            config,
            config_path,
        })
    }

    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            config_path: PathBuf::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Build both executors sharing one audit logger.
    ///
    /// # Errors
    ///
    /// Returns an error if the audit file cannot be opened.
    pub async fn build_toolbox(&self) -> anyhow::Result<Toolbox> {
        let audit = build_audit_logger(&self.config.audit).await?;

        let mut local = LocalExecutor::from_config(&self.config.local);
        let mut remote = RemoteExecutor::from_config(&self.config.remote);
        if let Some(logger) = audit {
            local = local.with_audit(Arc::clone(&logger));
            remote = remote.with_audit(logger);
        }

        tracing::info!(
            local_allowed = local.policy().allowed().len(),
            remote_allowed = remote.policy().allowed().len(),
            "executors ready"
        );
        Ok(Toolbox::new(local, remote))
    }
}

/// Priority: `--config` > `SHELLGATE_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SHELLGATE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// `None` when auditing is disabled.
///
/// # Errors
///
/// Returns an error if a file destination cannot be opened.
pub async fn build_audit_logger(config: &AuditConfig) -> anyhow::Result<Option<Arc<AuditLogger>>> {
    if !config.enabled {
        return Ok(None);
    }
    let logger = AuditLogger::from_config(config)
        .await
        .with_context(|| format!("failed to open audit log {}", config.destination))?;
    Ok(Some(Arc::new(logger)))
}
