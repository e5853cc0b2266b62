//! code-assistant -- MCP code generation server backed by supervised
//! standards and documentation tool servers.
//!
//! Usage: OPENAI_API_KEY=... code-assistant

use std::sync::Arc;

use code_assistant::agent::Agent;
use code_assistant::supervisor::install_signal_handlers;
use code_assistant::{AssistantConfig, CodeAssistant, Supervisor};

fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr so it does not interfere with MCP stdio.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Fails before any child is spawned when the credential is missing.
    let config = AssistantConfig::from_env()?;

    let supervisor = Arc::new(Supervisor::new(config.clone()));
    install_signal_handlers(Arc::clone(&supervisor))?;
    supervisor.start();

    let assistant = CodeAssistant::new(supervisor.registry(), build_agent(&config)?);
    let result = code_assistant::run_stdio(&assistant);

    supervisor.shutdown();
    result
}

#[cfg(feature = "http")]
fn build_agent(config: &AssistantConfig) -> anyhow::Result<Box<dyn Agent>> {
    let agent = code_assistant::agent::OpenAiAgent::new(
        config.api_key.clone(),
        config.model.clone(),
        config.base_url.clone(),
    )?;
    Ok(Box::new(agent))
}

#[cfg(not(feature = "http"))]
#[allow(clippy::unnecessary_wraps)]
fn build_agent(_config: &AssistantConfig) -> anyhow::Result<Box<dyn Agent>> {
    Ok(Box::new(code_assistant::agent::WorkflowAgent))
}
