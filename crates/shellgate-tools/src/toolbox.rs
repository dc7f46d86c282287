use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::executor::{CommandRequest, ExecError};
use crate::local::LocalExecutor;
use crate::registry::{
    self, EmptyParams, ExecTarget, LIST_ALLOWED_COMMANDS, ListAllowedParams, LOCAL_EXECUTE,
    REMOTE_CONNECT, REMOTE_DISCONNECT, REMOTE_EXECUTE, ToolRegistry,
};
use crate::remote::{ConnectRequest, RemoteExecutor, SshConnector};
use crate::ssh::RusshConnector;

/// Structured tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool_id: String,
    pub params: HashMap<String, Value>,
}

impl ToolCall {
    #[must_use]
    pub fn new(tool_id: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            params: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Deserialize tool call params into a typed struct.
///
/// # Errors
///
/// Returns `ExecError::InvalidRequest` when deserialization fails.
pub fn deserialize_params<T: DeserializeOwned, S: std::hash::BuildHasher>(
    params: &HashMap<String, Value, S>,
) -> Result<T, ExecError> {
    let obj = Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    serde_json::from_value(obj).map_err(|e| ExecError::InvalidRequest {
        message: e.to_string(),
    })
}

/// Both façades behind one dispatch point keyed by tool id.
#[derive(Debug)]
pub struct Toolbox<C: SshConnector = RusshConnector> {
    local: LocalExecutor,
    remote: RemoteExecutor<C>,
    registry: ToolRegistry,
}

impl<C: SshConnector> Toolbox<C> {
    #[must_use]
    pub fn new(local: LocalExecutor, remote: RemoteExecutor<C>) -> Self {
        Self {
            local,
            remote,
            registry: ToolRegistry::builtin(),
        }
    }

    #[must_use]
    pub fn local(&self) -> &LocalExecutor {
        &self.local
    }

    #[must_use]
    pub fn remote(&self) -> &RemoteExecutor<C> {
        &self.remote
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Route a call to its façade and return the façade's record as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::InvalidRequest` for an unknown tool id or params that
    /// do not match the tool's schema. Execution failures are not errors here:
    /// they come back inside the result record.
    pub async fn call(&self, call: &ToolCall) -> Result<Value, ExecError> {
        tracing::debug!(tool = %call.tool_id, "dispatching tool call");
        let value = match call.tool_id.as_str() {
            LOCAL_EXECUTE => {
                let req: CommandRequest = deserialize_params(&call.params)?;
                to_value(&self.local.execute(&req).await)?
            }
            REMOTE_EXECUTE => {
                let req: CommandRequest = deserialize_params(&call.params)?;
                to_value(&self.remote.execute(&req).await)?
            }
            REMOTE_CONNECT => {
                let req: ConnectRequest = deserialize_params(&call.params)?;
                to_value(&self.remote.connect(req).await)?
            }
            REMOTE_DISCONNECT => {
                let _: EmptyParams = deserialize_params(&call.params)?;
                to_value(&self.remote.disconnect().await)?
            }
            LIST_ALLOWED_COMMANDS => {
                let params: ListAllowedParams = deserialize_params(&call.params)?;
                let listed = match params.target {
                    ExecTarget::Local => self.local.list_allowed_commands(),
                    ExecTarget::Remote => self.remote.list_allowed_commands(),
                };
                Value::from(listed)
            }
            other => {
                return Err(ExecError::InvalidRequest {
                    message: format!("unknown tool: {other}"),
                });
            }
        };
        Ok(value)
    }

    #[must_use]
    pub fn tool_definitions(&self) -> &[registry::ToolDef] {
        self.registry.tools()
    }
}

fn to_value<T: serde::Serialize>(record: &T) -> Result<Value, ExecError> {
    serde_json::to_value(record).map_err(|e| ExecError::InvalidRequest {
        message: format!("failed to encode result: {e}"),
    })
}
