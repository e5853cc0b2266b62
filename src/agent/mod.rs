//! Agents that turn a code request into a final text answer.
//!
//! An agent receives fixed instructions, the request, and a [`Toolbox`] it
//! may call any number of times. Two implementations ship:
//!
//! - [`WorkflowAgent`]: runs the documented workflow without a model and
//!   returns the gathered context
//! - `OpenAiAgent` (feature `http`): a chat-completions function-calling loop

#[cfg(feature = "http")]
pub mod openai;

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

use crate::facade::{
    analyze_requirements, Toolbox, ANALYZE_CODE_REQUIREMENTS, GET_CODING_STANDARDS,
    GET_LIBRARY_DOCUMENTATION,
};

#[cfg(feature = "http")]
pub use openai::OpenAiAgent;

/// System instructions given to every agent.
pub const INSTRUCTIONS: &str = "\
You are an expert code assistant that generates high-quality code following team standards.

Your workflow:
1. First, analyze the code request to understand what's needed
2. Get the relevant coding standards for the specified language
3. If libraries are mentioned or needed, get their latest documentation
4. Generate code that follows the standards and uses best practices
5. Include proper documentation, error handling, and tests if requested

Always prioritize:
- Code quality and readability
- Following team coding standards
- Using up-to-date library practices
- Including proper documentation
- Adding appropriate error handling
";

/// Arguments of `generate_code_with_context`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CodeRequest {
    /// Description of what code to generate.
    pub request: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Libraries to fetch documentation for. `null` is treated as empty.
    #[serde(default)]
    pub libraries: Option<Vec<String>>,
    #[serde(default)]
    pub include_tests: bool,
    #[serde(default = "default_true")]
    pub include_docs: bool,
}

fn default_language() -> String {
    "python".to_owned()
}

const fn default_true() -> bool {
    true
}

impl CodeRequest {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            language: default_language(),
            libraries: None,
            include_tests: false,
            include_docs: true,
        }
    }

    pub fn libraries(&self) -> &[String] {
        self.libraries.as_deref().unwrap_or_default()
    }

    /// The user prompt handed to the agent.
    pub fn prompt(&self) -> String {
        let mut prompt = format!(
            "\nGenerate {language} code for the following request:\n\n{request}\n\n\
             Requirements:\n\
             - Language: {language}\n\
             - Include tests: {tests}\n\
             - Include documentation: {docs}\n",
            language = self.language,
            request = self.request,
            tests = self.include_tests,
            docs = self.include_docs,
        );

        if !self.libraries().is_empty() {
            prompt.push_str(&format!("- Use these libraries: {}\n", self.libraries().join(", ")));
        }

        prompt.push_str(
            "\nPlease follow this workflow:\n\
             1. Analyze the requirements\n\
             2. Get the coding standards for the language\n\
             3. Get documentation for any libraries needed\n\
             4. Generate the code with proper standards compliance\n",
        );
        prompt
    }
}

/// Opaque code-generation capability.
pub trait Agent: Send + Sync {
    /// Produce the final answer for `request`, calling tools as needed.
    fn run(&self, instructions: &str, request: &CodeRequest, toolbox: &Toolbox) -> Result<String>;
}

/// Deterministic agent: analyse, fetch standards, resolve libraries, and
/// return everything gathered as a markdown brief.
///
/// Libraries are the ones requested, or the analysis suggestions when none
/// were requested.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowAgent;

impl Agent for WorkflowAgent {
    fn run(&self, _instructions: &str, request: &CodeRequest, toolbox: &Toolbox) -> Result<String> {
        let analysis_text = toolbox.invoke(
            ANALYZE_CODE_REQUIREMENTS,
            json!({ "request": request.request, "language": request.language }),
        );
        let standards =
            toolbox.invoke(GET_CODING_STANDARDS, json!({ "language": request.language }));

        let mut libraries: Vec<String> = request.libraries().to_vec();
        if libraries.is_empty() {
            libraries =
                analyze_requirements(&request.request, &request.language).suggested_libraries;
        }
        libraries.dedup();

        let mut brief = format!(
            "# Code generation brief\n\n## Request\n{}\n\
             ## Requirements analysis\n```json\n{analysis_text}\n```\n\n\
             ## Coding standards ({})\n{}\n",
            request.prompt(),
            request.language,
            standards.trim_end(),
        );

        if !libraries.is_empty() {
            brief.push_str("\n## Library documentation\n");
            for library in &libraries {
                let docs =
                    toolbox.invoke(GET_LIBRARY_DOCUMENTATION, json!({ "library_name": library }));
                brief.push_str(&format!("- {library}: {docs}\n"));
            }
        }

        Ok(brief)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::Registry;

    #[test]
    fn request_defaults() {
        let request: CodeRequest =
            serde_json::from_value(json!({"request": "factorial"})).expect("parse");
        assert_eq!(request, CodeRequest::new("factorial"));

        let request: CodeRequest =
            serde_json::from_value(json!({"request": "x", "libraries": null})).expect("parse");
        assert!(request.libraries().is_empty());
    }

    #[test]
    fn prompt_lists_requirements() {
        let mut request =
            CodeRequest::new("Create a simple function to calculate the factorial of a number");
        request.include_tests = true;
        request.libraries = Some(vec!["pytest".to_owned(), "hypothesis".to_owned()]);

        let prompt = request.prompt();
        assert!(prompt.contains("Generate python code for the following request:"));
        assert!(prompt.contains("- Include tests: true"));
        assert!(prompt.contains("- Include documentation: true"));
        assert!(prompt.contains("- Use these libraries: pytest, hypothesis\n"));
        assert!(prompt.contains("4. Generate the code with proper standards compliance"));
    }

    #[test]
    fn prompt_omits_empty_library_line() {
        assert!(!CodeRequest::new("x").prompt().contains("Use these libraries"));
    }

    #[test]
    fn workflow_agent_reports_unavailable_servers_as_text() {
        let toolbox = Toolbox::new(Arc::new(Registry::default()));
        let brief = WorkflowAgent
            .run(INSTRUCTIONS, &CodeRequest::new("Create a REST API"), &toolbox)
            .expect("workflow agent never fails");

        assert!(brief.contains("\"fastapi\""));
        assert!(
            brief.contains("Error getting coding standards: server 'standards' is not available")
        );
        assert!(brief.contains("- requests: Error getting library documentation"));
        assert!(brief.contains("- fastapi: Error getting library documentation"));
    }
}
