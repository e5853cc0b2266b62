//! standards-server -- team coding standards as MCP resources over stdio.
//!
//! Usage: standards-server

fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr so it does not interfere with MCP stdio.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    code_assistant::run_stdio(&code_assistant::standards::StandardsService)
}
