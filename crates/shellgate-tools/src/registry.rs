use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::executor::CommandRequest;
use crate::remote::ConnectRequest;

pub const LOCAL_EXECUTE: &str = "local_execute";
pub const REMOTE_EXECUTE: &str = "remote_execute";
pub const REMOTE_CONNECT: &str = "remote_connect";
pub const REMOTE_DISCONNECT: &str = "remote_disconnect";
pub const LIST_ALLOWED_COMMANDS: &str = "list_allowed_commands";

/// Which executor a tool call addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecTarget {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListAllowedParams {
    /// `local` (default) or `remote`.
    #[serde(default)]
    pub target: ExecTarget,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct EmptyParams {}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub id: &'static str,
    pub description: &'static str,
    #[serde(rename = "input_schema")]
    pub schema: schemars::Schema,
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    #[must_use]
    pub fn from_definitions(tools: Vec<ToolDef>) -> Self {
        Self { tools }
    }

    /// The five tools exposed by the execution façades.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_definitions(vec![
            ToolDef {
                id: LOCAL_EXECUTE,
                description: "Run an allow-listed command on this host and return stdout, stderr and return_code",
                schema: schemars::schema_for!(CommandRequest),
            },
            ToolDef {
                id: REMOTE_EXECUTE,
                description: "Run an allow-listed command on the connected remote host (working_directory is ignored)",
                schema: schemars::schema_for!(CommandRequest),
            },
            ToolDef {
                id: REMOTE_CONNECT,
                description: "Open an SSH session to a remote host, replacing any existing session",
                schema: schemars::schema_for!(ConnectRequest),
            },
            ToolDef {
                id: REMOTE_DISCONNECT,
                description: "Close the SSH session; succeeds when nothing is connected",
                schema: schemars::schema_for!(EmptyParams),
            },
            ToolDef {
                id: LIST_ALLOWED_COMMANDS,
                description: "List allowed command names with descriptions for the local or remote executor",
                schema: schemars::schema_for!(ListAllowedParams),
            },
        ])
    }

    #[must_use]
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|t| t.id == id)
    }

    /// Parameter names the schema marks as required.
    #[must_use]
    pub fn required_params(&self, id: &str) -> Vec<&str> {
        self.find(id)
            .and_then(|t| t.schema.as_object())
            .and_then(|obj| obj.get("required"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}
