//! MCP Server: stdio transport, JSON-RPC 2.0, newline-delimited.
//!
//! Shared by both binaries. Reads JSON-RPC requests one per line, dispatches
//! to an [`McpService`], and writes responses one per line. Capabilities are
//! advertised from what the service actually provides.
//!
//! Protocol flow:
//! 1. Client sends `initialize` → server responds with capabilities
//! 2. Client sends `notifications/initialized`
//! 3. Client lists and calls tools, or lists and reads resources
//! 4. Client closes stdin → server exits
//!
//! Clients that skip the handshake are served anyway.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::codec::{self, read_line_limited, MAX_LINE_BYTES};

const PROTOCOL_VERSION: &str = "2025-06-18";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const RESOURCE_NOT_FOUND: i64 = -32002;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// MCP protocol types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    name: String,
    version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListChanged {
    list_changed: bool,
}

#[derive(Debug, Serialize)]
struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<ListChanged>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resources: Option<ListChanged>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
}

/// MCP tool definition for tools/list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// MCP content item in tools/call response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// MCP tools/call result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// A successful single-text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem {
                content_type: "text".to_owned(),
                text: text.into(),
            }],
            is_error: false,
        }
    }

    /// A failed single-text result.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }
}

/// MCP resource definition for resources/list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// MCP resource template for resources/templates/list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// One entry of a resources/read result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct ResourceReadParams {
    uri: String,
}

// ---------------------------------------------------------------------------
// Service seam
// ---------------------------------------------------------------------------

/// What a stdio MCP server exposes. Unimplemented surfaces stay empty and are
/// left out of the advertised capabilities.
pub trait McpService {
    /// Name reported in `serverInfo`.
    fn name(&self) -> &str;

    fn list_tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Execute a tool. An `Err` is reported to the client as an error result.
    fn call_tool(&self, name: &str, _arguments: serde_json::Value) -> Result<ToolCallResult> {
        Ok(ToolCallResult::error(format!("Unknown tool: {name}")))
    }

    fn list_resources(&self) -> Vec<ResourceDefinition> {
        Vec::new()
    }

    fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        Vec::new()
    }

    /// Resolve a concrete resource URI; `None` means not found.
    fn read_resource(&self, _uri: &str) -> Option<ResourceContents> {
        None
    }
}

// ---------------------------------------------------------------------------
// Server main loop
// ---------------------------------------------------------------------------

/// Run `service` on stdin/stdout until stdin is closed.
///
/// # Errors
///
/// Returns an error if stdin/stdout I/O fails fatally.
pub fn run_stdio(service: &impl McpService) -> Result<()> {
    let stdin = std::io::stdin();
    let reader = std::io::BufReader::new(stdin.lock());
    let stdout = std::io::stdout().lock();
    serve(service, reader, stdout)
}

/// Serve JSON-RPC requests from `reader`, writing responses to `writer`.
///
/// Returns when `reader` reaches EOF.
pub fn serve(
    service: &impl McpService,
    mut reader: impl BufRead,
    mut writer: impl Write,
) -> Result<()> {
    info!(server = service.name(), "MCP server starting");
    let mut line_buf = String::new();

    loop {
        line_buf.clear();
        let bytes_read = match read_line_limited(&mut reader, &mut line_buf, MAX_LINE_BYTES) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(error = %e, "rejected request line");
                let resp = error_response(None, PARSE_ERROR, &format!("parse error: {e}"));
                write_response(&mut writer, &resp)?;
                continue;
            }
            Err(e) => return Err(e).context("failed to read from stdin"),
        };

        if bytes_read == 0 {
            info!("stdin closed, shutting down");
            break;
        }

        let trimmed = line_buf.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!(raw = trimmed, "received request");

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "invalid JSON-RPC request");
                let resp = error_response(None, PARSE_ERROR, &format!("parse error: {e}"));
                write_response(&mut writer, &resp)?;
                continue;
            }
        };

        if request.jsonrpc != "2.0" {
            warn!(version = request.jsonrpc, "invalid JSON-RPC version (expected \"2.0\")");
            let resp = error_response(
                request.id.clone(),
                INVALID_REQUEST,
                &format!(
                    "invalid request: jsonrpc version must be \"2.0\", got \"{}\"",
                    request.jsonrpc
                ),
            );
            write_response(&mut writer, &resp)?;
            continue;
        }

        let is_notification = request.id.is_none();
        let response = dispatch(service, &request);

        if is_notification {
            debug!(method = request.method, "notification handled (no response)");
            continue;
        }

        if let Some(resp) = response {
            write_response(&mut writer, &resp)?;
        }
    }

    info!(server = service.name(), "MCP server stopped");
    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate handler.
fn dispatch(service: &impl McpService, req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => Some(handle_initialize(service, req)),
        "notifications/initialized" => {
            info!("client initialized");
            None
        }
        "ping" => Some(success_response(req.id.clone(), &serde_json::json!({}))),
        "tools/list" => Some(success_response(
            req.id.clone(),
            &serde_json::json!({ "tools": service.list_tools() }),
        )),
        "tools/call" => Some(handle_tools_call(service, req)),
        "resources/list" => Some(success_response(
            req.id.clone(),
            &serde_json::json!({ "resources": service.list_resources() }),
        )),
        "resources/templates/list" => Some(success_response(
            req.id.clone(),
            &serde_json::json!({ "resourceTemplates": service.list_resource_templates() }),
        )),
        "resources/read" => Some(handle_resources_read(service, req)),
        _ => {
            warn!(method = req.method, "unknown method");
            Some(error_response(
                req.id.clone(),
                METHOD_NOT_FOUND,
                &format!("method not found: {}", req.method),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn handle_initialize(service: &impl McpService, req: &JsonRpcRequest) -> JsonRpcResponse {
    let has_tools = !service.list_tools().is_empty();
    let has_resources =
        !service.list_resources().is_empty() || !service.list_resource_templates().is_empty();

    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_owned(),
        capabilities: ServerCapabilities {
            tools: has_tools.then_some(ListChanged { list_changed: false }),
            resources: has_resources.then_some(ListChanged { list_changed: false }),
        },
        server_info: ServerInfo {
            name: service.name().to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        },
    };

    success_response(req.id.clone(), &result)
}

fn handle_tools_call(service: &impl McpService, req: &JsonRpcRequest) -> JsonRpcResponse {
    let params: ToolCallParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            return error_response(
                req.id.clone(),
                INVALID_PARAMS,
                &format!("invalid tools/call params: {e}"),
            );
        }
    };

    match service.call_tool(&params.name, params.arguments) {
        Ok(result) => success_response(req.id.clone(), &result),
        Err(e) => {
            error!(tool = params.name, error = %e, "tool call failed");
            success_response(req.id.clone(), &ToolCallResult::error(format!("Error: {e:#}")))
        }
    }
}

fn handle_resources_read(service: &impl McpService, req: &JsonRpcRequest) -> JsonRpcResponse {
    let params: ResourceReadParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            return error_response(
                req.id.clone(),
                INVALID_PARAMS,
                &format!("invalid resources/read params: {e}"),
            );
        }
    };

    match service.read_resource(&params.uri) {
        Some(contents) => success_response(
            req.id.clone(),
            &serde_json::json!({ "contents": [contents] }),
        ),
        None => {
            warn!(uri = params.uri, "resource not found");
            error_response(
                req.id.clone(),
                RESOURCE_NOT_FOUND,
                &format!("resource not found: {}", params.uri),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn success_response(id: Option<serde_json::Value>, result: &impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(v) => JsonRpcResponse {
            jsonrpc: "2.0".to_owned(),
            id,
            result: Some(v),
            error: None,
        },
        Err(e) => {
            error!(error = %e, "failed to serialize success response");
            error_response(
                id,
                INTERNAL_ERROR,
                &format!("internal error: failed to serialize result: {e}"),
            )
        }
    }
}

fn error_response(id: Option<serde_json::Value>, code: i64, message: &str) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_owned(),
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.to_owned(),
            data: None,
        }),
    }
}

/// Write a JSON-RPC response as a single line.
fn write_response(out: &mut impl Write, resp: &JsonRpcResponse) -> Result<()> {
    let line = codec::encode(resp).context("failed to serialize response")?;
    debug!(response = line.trim_end(), "sending response");
    out.write_all(line.as_bytes())
        .context("failed to write to stdout")?;
    out.flush().context("failed to flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    struct Echo;

    impl McpService for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn list_tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "echo".to_owned(),
                description: "Echo the input".to_owned(),
                input_schema: json!({"type": "object"}),
            }]
        }

        fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
            match name {
                "echo" => Ok(ToolCallResult::text(arguments.to_string())),
                "fail" => anyhow::bail!("boom"),
                _ => Ok(ToolCallResult::error(format!("Unknown tool: {name}"))),
            }
        }
    }

    fn exchange(input: &str) -> Vec<Value> {
        let mut out = Vec::new();
        serve(&Echo, input.as_bytes(), &mut out).expect("serve");
        String::from_utf8(out)
            .expect("utf8")
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect()
    }

    #[test]
    fn initialize_advertises_only_tools() {
        let replies =
            exchange("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n");
        assert_eq!(replies.len(), 1);
        let caps = &replies[0]["result"]["capabilities"];
        assert!(caps.get("tools").is_some());
        assert!(caps.get("resources").is_none());
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "echo");
    }

    #[test]
    fn notifications_get_no_reply() {
        let replies = exchange(concat!(
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n",
        ));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["id"], 2);
    }

    #[test]
    fn protocol_errors() {
        let replies = exchange(concat!(
            "not json\n",
            "{\"jsonrpc\":\"1.0\",\"id\":1,\"method\":\"ping\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"nope\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\",\"params\":{}}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"resources/read\",\"params\":{\"uri\":\"x://y\"}}\n",
        ));
        let codes: Vec<i64> = replies
            .iter()
            .map(|r| r["error"]["code"].as_i64().expect("code"))
            .collect();
        assert_eq!(
            codes,
            vec![
                PARSE_ERROR,
                INVALID_REQUEST,
                METHOD_NOT_FOUND,
                INVALID_PARAMS,
                RESOURCE_NOT_FOUND
            ]
        );
    }

    #[test]
    fn tool_errors_become_error_results() {
        let replies = exchange(concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"fail\"}}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"echo\",\"arguments\":{\"a\":1}}}\n",
        ));
        assert_eq!(replies[0]["result"]["isError"], true);
        assert_eq!(replies[0]["result"]["content"][0]["text"], "Error: boom");
        assert!(replies[1]["result"].get("isError").is_none());
        assert_eq!(replies[1]["result"]["content"][0]["text"], "{\"a\":1}");
    }
}
