//! Team coding standards, served as read-only MCP resources.
//!
//! Three kinds of resource:
//!
//! - `resource://coding-standards`: the full standards document
//! - `standards://summary`: a one-page summary
//! - `standards://checklist/{language}`: a per-language review checklist

use crate::server::{McpService, ResourceContents, ResourceDefinition, ResourceTemplate};

pub const FULL_URI: &str = "resource://coding-standards";
pub const SUMMARY_URI: &str = "standards://summary";
pub const CHECKLIST_PREFIX: &str = "standards://checklist/";

const MARKDOWN: &str = "text/markdown";

const CODING_STANDARDS: &str = include_str!("content/coding-standards.md");
const SUMMARY: &str = include_str!("content/summary.md");

/// Checklists by lowercase language key, in the order they are listed.
const CHECKLISTS: &[(&str, &str)] = &[
    ("python", include_str!("content/checklist-python.md")),
    ("javascript", include_str!("content/checklist-javascript.md")),
    ("sql", include_str!("content/checklist-sql.md")),
];

/// The full coding standards document.
pub const fn coding_standards() -> &'static str {
    CODING_STANDARDS
}

pub const fn standards_summary() -> &'static str {
    SUMMARY
}

/// Languages that have a checklist.
pub fn checklist_languages() -> impl Iterator<Item = &'static str> {
    CHECKLISTS.iter().map(|(key, _)| *key)
}

/// The review checklist for `language`, matched case-insensitively.
///
/// Unknown languages get a "Language Not Found" document naming the request
/// and listing every available checklist.
pub fn language_checklist(language: &str) -> String {
    let key = language.to_lowercase();
    if let Some((_, checklist)) = CHECKLISTS.iter().find(|(name, _)| *name == key) {
        return (*checklist).to_owned();
    }

    let available = checklist_languages().collect::<Vec<_>>().join(", ");
    format!(
        "# Language Not Found\n\n\
         The language '{language}' is not available in our checklist system.\n\n\
         Available languages: {available}\n\n\
         Please use one of the available languages or request a new checklist to be added.\n"
    )
}

/// MCP service over the standards resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardsService;

impl McpService for StandardsService {
    fn name(&self) -> &str {
        "Team Coding Standards Server"
    }

    fn list_resources(&self) -> Vec<ResourceDefinition> {
        vec![
            ResourceDefinition {
                uri: FULL_URI.to_owned(),
                name: "Team Coding Standards".to_owned(),
                description: "Comprehensive coding standards and best practices for our development team"
                    .to_owned(),
                mime_type: MARKDOWN.to_owned(),
            },
            ResourceDefinition {
                uri: SUMMARY_URI.to_owned(),
                name: "Coding Standards Summary".to_owned(),
                description: "A brief summary of key coding standards".to_owned(),
                mime_type: MARKDOWN.to_owned(),
            },
        ]
    }

    fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        vec![ResourceTemplate {
            uri_template: format!("{CHECKLIST_PREFIX}{{language}}"),
            name: "Language-Specific Checklist".to_owned(),
            description: "Get a checklist for specific programming languages".to_owned(),
            mime_type: MARKDOWN.to_owned(),
        }]
    }

    fn read_resource(&self, uri: &str) -> Option<ResourceContents> {
        let text = match uri {
            FULL_URI => CODING_STANDARDS.to_owned(),
            SUMMARY_URI => SUMMARY.to_owned(),
            _ => {
                let language = uri.strip_prefix(CHECKLIST_PREFIX)?;
                if language.is_empty() || language.contains('/') {
                    return None;
                }
                language_checklist(language)
            }
        };

        Some(ResourceContents {
            uri: uri.to_owned(),
            mime_type: MARKDOWN.to_owned(),
            text,
        })
    }
}
