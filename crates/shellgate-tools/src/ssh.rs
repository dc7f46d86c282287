use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;

use crate::executor::ExecError;
use crate::remote::{RemoteOutput, SshConnection, SshConnector, SshTarget};

const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(600);

/// SSH connector backed by russh.
#[derive(Clone)]
pub struct RusshConnector {
    config: Arc<client::Config>,
}

impl RusshConnector {
    #[must_use]
    pub fn new() -> Self {
        let config = client::Config {
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..client::Config::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

impl fmt::Debug for RusshConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusshConnector")
            .field("inactivity_timeout", &self.config.inactivity_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for RusshConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts any host key on first use and logs its fingerprint.
///
/// There is no known-hosts check, so a man-in-the-middle is not detected.
pub struct TofuHandler {
    host: String,
}

#[async_trait]
impl client::Handler for TofuHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::warn!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "accepting unverified SSH host key"
        );
        Ok(true)
    }
}

pub struct RusshConnection {
    handle: Handle<TofuHandler>,
}

impl SshConnector for RusshConnector {
    type Connection = RusshConnection;

    async fn connect(&self, target: &SshTarget) -> Result<RusshConnection, ExecError> {
        let handler = TofuHandler {
            host: target.hostname.clone(),
        };
        tracing::debug!(address = %target.address(), "opening SSH connection");
        let mut handle = client::connect(
            Arc::clone(&self.config),
            (target.hostname.as_str(), target.port),
            handler,
        )
        .await?;

        authenticate(&mut handle, target).await?;
        Ok(RusshConnection { handle })
    }
}

/// Key file first, then password. With neither, the `none` method is tried
/// and a refusal is reported as an authentication failure.
async fn authenticate(
    handle: &mut Handle<TofuHandler>,
    target: &SshTarget,
) -> Result<(), ExecError> {
    let user = target.username.as_str();

    if let Some(ref key_path) = target.key_path {
        match russh_keys::load_secret_key(key_path, None) {
            Ok(key) => {
                if handle.authenticate_publickey(user, Arc::new(key)).await? {
                    return Ok(());
                }
                tracing::debug!(user, key = %key_path.display(), "public key rejected");
            }
            Err(e) => {
                tracing::warn!(key = %key_path.display(), "failed to load private key: {e}");
            }
        }
    }

    if let Some(ref password) = target.password {
        if handle.authenticate_password(user, password.expose()).await? {
            return Ok(());
        }
    } else if target.key_path.is_none() && handle.authenticate_none(user).await? {
        return Ok(());
    }

    let reason = match (&target.key_path, &target.password) {
        (None, None) => "no password or key given and the server requires one",
        _ => "rejected by server",
    };
    Err(ExecError::AuthFailed {
        user: target.username.clone(),
        host: target.hostname.clone(),
        reason: reason.into(),
    })
}

impl SshConnection for RusshConnection {
    async fn exec(&mut self, command: &str) -> Result<RemoteOutput, ExecError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = RemoteOutput::default();
        // Exit status can arrive before the last data; keep draining until close.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    output.stderr.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    output.exit_signal = Some(format!("{signal_name:?}"));
                }
                _ => {}
            }
        }
        Ok(output)
    }

    async fn close(&mut self) -> Result<(), ExecError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}
