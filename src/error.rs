//! Error types for the code-assistant crate.

/// Errors raised below the agent facade boundary.
///
/// Facade tools return these internally; they are only flattened to text
/// when a tool result crosses into the agent or the MCP client.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// A required credential is missing from the environment.
    #[error("{var} environment variable is required")]
    MissingCredential { var: String },

    /// A child tool server could not be launched.
    #[error("failed to spawn server '{name}': {reason}")]
    Spawn { name: String, reason: String },

    /// The registry has been shut down and accepts no new servers.
    #[error("registry is shut down, not starting server '{name}'")]
    RegistryClosed { name: String },

    /// The bridge target is not registered or its process has exited.
    #[error("server '{name}' is not available")]
    ServerUnavailable { name: String },

    /// The child closed its output (or sent a blank line) instead of a reply.
    #[error("no response from server '{name}'")]
    NoResponse { name: String },

    /// A request frame cannot be represented as a single line.
    #[error("cannot encode frame as a single line: {reason}")]
    Encode { reason: String },

    /// A response line is empty or not valid JSON.
    #[error("malformed frame: {reason}")]
    Decode { reason: String },

    /// Reading from or writing to a child's stdio failed.
    #[error("I/O error talking to server '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The agent could not produce a result.
    #[error("agent error: {0}")]
    Agent(String),
}

/// Convenience result type for code-assistant operations.
pub type AssistantResult<T> = Result<T, AssistantError>;
