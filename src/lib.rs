//! `code-assistant`: standards-aware code generation over MCP.
//!
//! Two stdio MCP servers ship in this crate:
//!
//! - `standards-server`: serves team coding standards as markdown resources
//! - `code-assistant`: supervises tool-server child processes and exposes
//!   code-generation tools to a language-model agent
//!
//! # Architecture
//!
//! ```text
//! stdin (JSON-RPC) → server → CodeAssistant → Agent → Toolbox
//!                                                        ↓
//!                                   bridge (one line out, one line in)
//!                                                        ↓
//!                              Registry → ChildHandle → child stdio
//! stdout (JSON-RPC) ←────────────────────────────────────┘
//! ```
//!
//! The [`Supervisor`] owns the [`Registry`]: it starts the children in a
//! fixed order and stops them exactly once on signal, EOF or drop.

pub mod agent;
pub mod assistant;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod process;
pub mod registry;
pub mod server;
pub mod standards;
pub mod supervisor;

pub use assistant::CodeAssistant;
pub use config::AssistantConfig;
pub use error::{AssistantError, AssistantResult};
pub use facade::Toolbox;
pub use registry::Registry;
pub use server::run_stdio;
pub use supervisor::Supervisor;
