//! MCP protocol integration tests.
//!
//! Drives both services through the shared JSON-RPC loop using in-memory
//! pipes, and checks the wire shape of the protocol types.

use std::sync::Arc;

use code_assistant::agent::WorkflowAgent;
use code_assistant::server::{serve, JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpService};
use code_assistant::standards::StandardsService;
use code_assistant::{CodeAssistant, Registry};
use serde_json::{json, Value};

fn exchange(service: &impl McpService, requests: &[Value]) -> Vec<Value> {
    let input: String = requests.iter().map(|r| format!("{r}\n")).collect();
    let mut output = Vec::new();
    serve(service, input.as_bytes(), &mut output).expect("serve");
    String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("response is JSON"))
        .collect()
}

fn assistant() -> CodeAssistant {
    CodeAssistant::new(Arc::new(Registry::default()), Box::new(WorkflowAgent))
}

#[test]
fn test_json_rpc_request_parsing() {
    let req_json = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "0.1.0"
            }
        }
    });

    let req: JsonRpcRequest =
        serde_json::from_value(req_json).expect("should parse initialize request");

    assert_eq!(req.method, "initialize");
    assert_eq!(req.id, Some(json!(1)));
}

#[test]
fn test_json_rpc_response_serialization() {
    let resp = JsonRpcResponse {
        jsonrpc: "2.0".to_owned(),
        id: Some(json!(1)),
        result: Some(json!({"protocolVersion": "2025-06-18"})),
        error: None,
    };

    let json_str = serde_json::to_string(&resp).expect("should serialize");
    assert!(json_str.contains("2025-06-18"));
    assert!(!json_str.contains("error"));
}

#[test]
fn test_json_rpc_error_response() {
    let resp = JsonRpcResponse {
        jsonrpc: "2.0".to_owned(),
        id: Some(json!(2)),
        result: None,
        error: Some(JsonRpcError {
            code: -32601,
            message: "method not found".to_owned(),
            data: None,
        }),
    };

    let json_str = serde_json::to_string(&resp).expect("should serialize");
    assert!(json_str.contains("-32601"));
    assert!(json_str.contains("method not found"));
    assert!(!json_str.contains("result"));
}

#[test]
fn test_assistant_tool_definitions_complete() {
    let tools = assistant().list_tools();
    assert_eq!(tools.len(), 3);

    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"generate_code_with_context"));
    assert!(names.contains(&"get_available_languages"));
    assert!(names.contains(&"get_server_status"));

    for tool in &tools {
        assert!(!tool.description.is_empty(), "tool {} missing description", tool.name);
        assert!(tool.input_schema.is_object(), "tool {} missing input_schema", tool.name);
    }
}

#[test]
fn test_assistant_initialize_and_status() {
    let replies = exchange(
        &assistant(),
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "get_server_status", "arguments": {}}}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                   "params": {"name": "get_available_languages"}}),
        ],
    );
    assert_eq!(replies.len(), 3);

    let caps = &replies[0]["result"]["capabilities"];
    assert!(caps.get("tools").is_some());
    assert!(caps.get("resources").is_none());
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], "Code Assistant Server");

    let status: Value = serde_json::from_str(
        replies[1]["result"]["content"][0]["text"].as_str().expect("text"),
    )
    .expect("status json");
    assert_eq!(
        status,
        json!({"standards_server": "stopped", "context7_server": "stopped", "agent_ready": true})
    );

    let languages: Vec<String> = serde_json::from_str(
        replies[2]["result"]["content"][0]["text"].as_str().expect("text"),
    )
    .expect("languages json");
    assert_eq!(
        languages,
        ["python", "javascript", "typescript", "java", "go", "rust", "sql", "html", "css"]
    );
}

#[test]
fn test_generate_without_servers_reports_errors_as_text() {
    let replies = exchange(
        &assistant(),
        &[json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                 "params": {"name": "generate_code_with_context",
                            "arguments": {"request": "Create a REST API with tests"}}})],
    );

    let result = &replies[0]["result"];
    assert!(result.get("isError").is_none());
    let text = result["content"][0]["text"].as_str().expect("text");
    assert!(text.contains("Error getting coding standards"));
    assert!(text.contains("\"testing\""));
}

#[test]
fn test_generate_with_bad_arguments_is_error_result() {
    let replies = exchange(
        &assistant(),
        &[json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                 "params": {"name": "generate_code_with_context",
                            "arguments": {"language": "go"}}})],
    );
    assert_eq!(replies[0]["result"]["isError"], true);
    assert!(replies[0]["result"]["content"][0]["text"]
        .as_str()
        .expect("text")
        .contains("invalid generate_code_with_context parameters"));
}

#[test]
fn test_standards_resources_over_protocol() {
    let replies = exchange(
        &StandardsService,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/templates/list"}),
            json!({"jsonrpc": "2.0", "id": 4, "method": "resources/read",
                   "params": {"uri": "standards://checklist/JavaScript"}}),
            json!({"jsonrpc": "2.0", "id": 5, "method": "resources/read",
                   "params": {"uri": "standards://nowhere"}}),
            json!({"jsonrpc": "2.0", "id": 6, "method": "tools/list"}),
        ],
    );
    assert_eq!(replies.len(), 6);

    let caps = &replies[0]["result"]["capabilities"];
    assert!(caps.get("resources").is_some());
    assert!(caps.get("tools").is_none());

    let uris: Vec<&str> = replies[1]["result"]["resources"]
        .as_array()
        .expect("resources")
        .iter()
        .map(|r| r["uri"].as_str().expect("uri"))
        .collect();
    assert_eq!(uris, vec!["resource://coding-standards", "standards://summary"]);

    assert_eq!(
        replies[2]["result"]["resourceTemplates"][0]["uriTemplate"],
        "standards://checklist/{language}"
    );

    let contents = &replies[3]["result"]["contents"][0];
    assert_eq!(contents["mimeType"], "text/markdown");
    assert!(contents["text"]
        .as_str()
        .expect("text")
        .starts_with("# JavaScript/TypeScript Code Review Checklist"));

    assert_eq!(replies[4]["error"]["code"], -32002);
    assert_eq!(replies[5]["result"]["tools"], json!([]));
}
