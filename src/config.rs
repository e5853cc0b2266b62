//! Runtime configuration for the code assistant.
//!
//! Everything comes from environment variables. Lookups go through a
//! closure so tests can supply a map instead of touching the process
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AssistantError, AssistantResult};
use crate::process::LaunchSpec;
use crate::registry::RestartPolicy;

/// Credential that must be present before any server is started.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

pub const MODEL_VAR: &str = "OPENAI_MODEL";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const STANDARDS_CMD_VAR: &str = "CODE_ASSISTANT_STANDARDS_CMD";
pub const CONTEXT7_CMD_VAR: &str = "CODE_ASSISTANT_CONTEXT7_CMD";
pub const SETTLE_MS_VAR: &str = "CODE_ASSISTANT_SETTLE_MS";
pub const GRACE_MS_VAR: &str = "CODE_ASSISTANT_GRACE_MS";
pub const RESTART_DEAD_VAR: &str = "CODE_ASSISTANT_RESTART_DEAD";

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CONTEXT7_CMD: &str = "docker run -i --rm mcp/context7";
const DEFAULT_SETTLE: Duration = Duration::from_secs(2);
const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Name of the bundled standards server binary.
pub const STANDARDS_BINARY: &str = "standards-server";

/// Configuration for the code assistant and its child servers.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Launch command for the `standards` server.
    pub standards: LaunchSpec,
    /// Launch command for the `context7` documentation server.
    pub context7: LaunchSpec,
    /// Pause between starting the servers and declaring readiness.
    pub settle_delay: Duration,
    /// How long each child gets to exit before it is killed.
    pub grace_timeout: Duration,
    pub restart_policy: RestartPolicy,
}

impl AssistantConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> AssistantResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    ///
    /// Fails only when the API key is missing or blank; malformed optional
    /// values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AssistantResult<Self> {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_blank(API_KEY_VAR).ok_or_else(|| AssistantError::MissingCredential {
            var: API_KEY_VAR.to_owned(),
        })?;

        let standards = non_blank(STANDARDS_CMD_VAR)
            .and_then(|cmd| LaunchSpec::parse(&cmd))
            .unwrap_or_else(default_standards_launch);
        let context7 = non_blank(CONTEXT7_CMD_VAR)
            .and_then(|cmd| LaunchSpec::parse(&cmd))
            .or_else(|| LaunchSpec::parse(DEFAULT_CONTEXT7_CMD))
            .unwrap_or_else(|| LaunchSpec::new("docker", Vec::<String>::new()));

        let millis = |key: &str, default: Duration| {
            non_blank(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(default, Duration::from_millis)
        };

        let restart_policy = if non_blank(RESTART_DEAD_VAR).is_some_and(|v| is_truthy(&v)) {
            RestartPolicy::RestartIfDead
        } else {
            RestartPolicy::Reuse
        };

        Ok(Self {
            api_key,
            model: non_blank(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            base_url: non_blank(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            standards,
            context7,
            settle_delay: millis(SETTLE_MS_VAR, DEFAULT_SETTLE),
            grace_timeout: millis(GRACE_MS_VAR, DEFAULT_GRACE),
            restart_policy,
        })
    }
}

/// The standards server binary installed next to the running executable,
/// falling back to a `PATH` lookup.
fn default_standards_launch() -> LaunchSpec {
    let file_name = format!("{STANDARDS_BINARY}{}", std::env::consts::EXE_SUFFIX);
    let program = std::env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name(&file_name))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(file_name));
    LaunchSpec::new(program, Vec::<String>::new())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
