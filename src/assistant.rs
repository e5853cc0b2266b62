//! The code assistant's own MCP tool surface.
//!
//! - `generate_code_with_context`: run the agent over the toolbox
//! - `get_available_languages`: fixed language catalog
//! - `get_server_status`: state of the supervised tool servers

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::agent::{Agent, CodeRequest, INSTRUCTIONS};
use crate::facade::{Toolbox, CONTEXT7_SERVER, STANDARDS_SERVER};
use crate::registry::{Registry, ServerState};
use crate::server::{McpService, ToolCallResult, ToolDefinition};

/// Languages the assistant accepts.
pub const AVAILABLE_LANGUAGES: [&str; 9] = [
    "python",
    "javascript",
    "typescript",
    "java",
    "go",
    "rust",
    "sql",
    "html",
    "css",
];

/// Reply of `get_server_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub standards_server: ServerState,
    pub context7_server: ServerState,
    pub agent_ready: bool,
}

/// MCP service wrapping the agent and the supervised tool servers.
pub struct CodeAssistant {
    toolbox: Toolbox,
    agent: Box<dyn Agent>,
}

impl std::fmt::Debug for CodeAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeAssistant")
            .field("toolbox", &self.toolbox)
            .finish_non_exhaustive()
    }
}

impl CodeAssistant {
    /// Construction never touches the child servers.
    pub fn new(registry: Arc<Registry>, agent: Box<dyn Agent>) -> Self {
        Self {
            toolbox: Toolbox::new(registry),
            agent,
        }
    }

    pub const fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    /// Run the agent on `request`. Failures come back as text.
    pub fn generate_code(&self, request: &CodeRequest) -> String {
        info!(language = request.language, "generating code");
        match self.agent.run(INSTRUCTIONS, request, &self.toolbox) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "code generation failed");
                format!("Error generating code: {e:#}")
            }
        }
    }

    /// Servers that were never started, or were stopped, report `stopped`.
    pub fn server_status(&self) -> ServerStatus {
        let status = self.toolbox.registry().status();
        let state = |name: &str| status.get(name).copied().unwrap_or(ServerState::Stopped);
        ServerStatus {
            standards_server: state(STANDARDS_SERVER),
            context7_server: state(CONTEXT7_SERVER),
            agent_ready: true,
        }
    }
}

impl McpService for CodeAssistant {
    fn name(&self) -> &str {
        "Code Assistant Server"
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "generate_code_with_context".to_owned(),
                description: "Generate code following team standards with latest library documentation."
                    .to_owned(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "request": {
                            "type": "string",
                            "description": "Description of what code to generate"
                        },
                        "language": {
                            "type": "string",
                            "description": "Programming language (python, javascript, typescript, etc.)",
                            "default": "python"
                        },
                        "libraries": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "List of libraries to get documentation for"
                        },
                        "include_tests": {
                            "type": "boolean",
                            "description": "Whether to include unit tests",
                            "default": false
                        },
                        "include_docs": {
                            "type": "boolean",
                            "description": "Whether to include documentation",
                            "default": true
                        }
                    },
                    "required": ["request"]
                }),
            },
            ToolDefinition {
                name: "get_available_languages".to_owned(),
                description: "Get list of supported programming languages".to_owned(),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            ToolDefinition {
                name: "get_server_status".to_owned(),
                description: "Get status of internal MCP servers".to_owned(),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<ToolCallResult> {
        match name {
            "generate_code_with_context" => {
                let request: CodeRequest = serde_json::from_value(arguments)
                    .context("invalid generate_code_with_context parameters")?;
                Ok(ToolCallResult::text(self.generate_code(&request)))
            }
            "get_available_languages" => {
                let text = serde_json::to_string(&AVAILABLE_LANGUAGES)
                    .context("failed to serialize languages")?;
                Ok(ToolCallResult::text(text))
            }
            "get_server_status" => {
                let text = serde_json::to_string(&self.server_status())
                    .context("failed to serialize server status")?;
                Ok(ToolCallResult::text(text))
            }
            _ => Ok(ToolCallResult::error(format!("Unknown tool: {name}"))),
        }
    }
}
