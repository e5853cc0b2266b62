//! Agent facade: the tools the language-model agent may call.
//!
//! Each tool is implemented as a `Result`-returning method so the error
//! taxonomy stays testable. [`Toolbox::invoke`] and the `get_*` wrappers are
//! the boundary where errors become plain text: the agent only ever sees
//! strings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::bridge;
use crate::codec::RequestFrame;
use crate::error::{AssistantError, AssistantResult};
use crate::registry::Registry;
use crate::server::ToolDefinition;
use crate::standards::CHECKLIST_PREFIX;

/// Registry name of the standards server.
pub const STANDARDS_SERVER: &str = "standards";
/// Registry name of the documentation server.
pub const CONTEXT7_SERVER: &str = "context7";

pub const GET_CODING_STANDARDS: &str = "get_coding_standards";
pub const GET_LIBRARY_DOCUMENTATION: &str = "get_library_documentation";
pub const ANALYZE_CODE_REQUIREMENTS: &str = "analyze_code_requirements";

/// Every request to a child uses the same id; replies are never correlated.
const REQUEST_ID: u64 = 1;

#[derive(Debug, Deserialize)]
struct StandardsArgs {
    #[serde(default = "default_language")]
    language: String,
}

#[derive(Debug, Deserialize)]
struct DocumentationArgs {
    library_name: String,
    #[serde(default)]
    topic: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    request: String,
    #[serde(default = "default_language")]
    language: String,
}

fn default_language() -> String {
    "python".to_owned()
}

/// Keyword analysis of a code request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementsAnalysis {
    pub language: String,
    pub complexity: String,
    pub suggested_libraries: Vec<String>,
    pub standards_needed: Vec<String>,
}

/// Classify `request` by keyword containment.
///
/// Matching is substring-based on the lowercased request, so "latest"
/// counts as mentioning a test.
pub fn analyze_requirements(request: &str, language: &str) -> RequirementsAnalysis {
    let text = request.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| text.contains(w));

    let mut analysis = RequirementsAnalysis {
        language: language.to_owned(),
        complexity: "medium".to_owned(),
        suggested_libraries: Vec::new(),
        standards_needed: ["general", "testing", "documentation"]
            .map(str::to_owned)
            .to_vec(),
    };

    if mentions(&["test", "unittest"]) {
        analysis.standards_needed.push("testing".to_owned());
    }

    let library_rules: [(&[&str], [&str; 2]); 3] = [
        (&["api", "rest"], ["requests", "fastapi"]),
        (&["data", "pandas"], ["pandas", "numpy"]),
        (&["web", "html"], ["flask", "django"]),
    ];
    for (keywords, libraries) in library_rules {
        if mentions(keywords) {
            analysis
                .suggested_libraries
                .extend(libraries.map(str::to_owned));
        }
    }

    analysis
}

/// The tools handed to the agent, backed by the shared registry.
#[derive(Debug, Clone)]
pub struct Toolbox {
    registry: Arc<Registry>,
}

impl Toolbox {
    pub const fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// JSON-Schema definitions for every tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: GET_CODING_STANDARDS.to_owned(),
                description: "Get coding standards for a specific programming language".to_owned(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "language": {
                            "type": "string",
                            "description": "Programming language (default: python)",
                            "default": "python"
                        }
                    }
                }),
            },
            ToolDefinition {
                name: GET_LIBRARY_DOCUMENTATION.to_owned(),
                description: "Get up-to-date documentation for a specific library".to_owned(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "library_name": {
                            "type": "string",
                            "description": "Library to look up"
                        },
                        "topic": {
                            "type": "string",
                            "description": "Optional topic to focus on",
                            "default": ""
                        }
                    },
                    "required": ["library_name"]
                }),
            },
            ToolDefinition {
                name: ANALYZE_CODE_REQUIREMENTS.to_owned(),
                description: "Analyze the code request to determine what standards and libraries are needed"
                    .to_owned(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "request": {
                            "type": "string",
                            "description": "The code request to analyze"
                        },
                        "language": {
                            "type": "string",
                            "description": "Target programming language"
                        }
                    },
                    "required": ["request", "language"]
                }),
            },
        ]
    }

    /// Call a tool by name. Always returns text.
    pub fn invoke(&self, name: &str, arguments: serde_json::Value) -> String {
        debug!(tool = name, "agent tool call");
        let arguments = if arguments.is_null() { json!({}) } else { arguments };

        match name {
            GET_CODING_STANDARDS => match serde_json::from_value::<StandardsArgs>(arguments) {
                Ok(args) => self.get_coding_standards(&args.language),
                Err(e) => invalid_arguments(name, &e),
            },
            GET_LIBRARY_DOCUMENTATION => {
                match serde_json::from_value::<DocumentationArgs>(arguments) {
                    Ok(args) => self.get_library_documentation(&args.library_name, &args.topic),
                    Err(e) => invalid_arguments(name, &e),
                }
            }
            ANALYZE_CODE_REQUIREMENTS => match serde_json::from_value::<AnalyzeArgs>(arguments) {
                Ok(args) => analyze_code_requirements(&args.request, &args.language),
                Err(e) => invalid_arguments(name, &e),
            },
            _ => format!("Unknown tool: {name}"),
        }
    }

    /// Coding standards for `language`, as text.
    pub fn get_coding_standards(&self, language: &str) -> String {
        self.coding_standards(language)
            .unwrap_or_else(|e| format!("Error getting coding standards: {e}"))
    }

    /// Library documentation lookup, as text.
    pub fn get_library_documentation(&self, library_name: &str, topic: &str) -> String {
        self.library_documentation(library_name, topic)
            .unwrap_or_else(|e| format!("Error getting library documentation: {e}"))
    }

    /// Read the language checklist from the standards server.
    ///
    /// Falls back to a generic success message when the reply is blank or
    /// does not carry `result.contents[0].text`.
    pub fn coding_standards(&self, language: &str) -> AssistantResult<String> {
        let frame = RequestFrame::new(
            REQUEST_ID,
            "resources/read",
            json!({ "uri": format!("{CHECKLIST_PREFIX}{language}") }),
        );
        let fallback = || format!("Coding standards for {language} retrieved successfully");

        let reply = match bridge::call(&self.registry, STANDARDS_SERVER, &frame) {
            Ok(reply) => reply,
            Err(AssistantError::NoResponse { .. }) => return Ok(fallback()),
            Err(e) => return Err(e),
        };

        let text = reply
            .result
            .as_ref()
            .and_then(|result| result.pointer("/contents/0/text"))
            .and_then(serde_json::Value::as_str);

        Ok(text.map_or_else(fallback, str::to_owned))
    }

    /// Resolve `library_name` on the documentation server.
    ///
    /// Only the id-resolution step is performed; the follow-up fetch of the
    /// documentation itself is not issued, so the result is a confirmation
    /// rather than the docs.
    pub fn library_documentation(
        &self,
        library_name: &str,
        topic: &str,
    ) -> AssistantResult<String> {
        let frame = RequestFrame::new(
            REQUEST_ID,
            "tools/call",
            json!({
                "name": "resolve-library-id",
                "arguments": { "libraryName": library_name }
            }),
        );
        debug!(library = library_name, topic, "resolving library id");

        match bridge::call(&self.registry, CONTEXT7_SERVER, &frame) {
            Ok(_) => Ok(format!("Documentation for {library_name} retrieved successfully")),
            Err(AssistantError::NoResponse { .. }) => {
                Ok(format!("Library documentation for {library_name} not found"))
            }
            Err(e) => Err(e),
        }
    }
}

/// Requirements analysis rendered as pretty JSON.
pub fn analyze_code_requirements(request: &str, language: &str) -> String {
    let analysis = analyze_requirements(request, language);
    serde_json::to_string_pretty(&analysis)
        .unwrap_or_else(|e| format!("Error analyzing code requirements: {e}"))
}

fn invalid_arguments(tool: &str, e: &serde_json::Error) -> String {
    format!("Invalid arguments for {tool}: {e}")
}
