//! MCP Supervisor — JSON-RPC over stdio transport for MCP server processes.
//!
//! This module handles:
//! - Spawning and supervising MCP server child processes
//! - JSON-RPC 2.0 communication over process stdio
//! - Line framing across arbitrary pipe chunk boundaries
//! - Request/response correlation by id, independent of arrival order
//! - Process lifecycle (start, graceful close, force-kill after grace)
//!
//! The supervisor reports everything that is not a correlated response
//! (stderr output, notifications, exits) through a [`ProcessEvent`] stream.

pub mod errors;
pub mod events;
pub mod framing;
pub mod pending;
pub mod process;

// Re-exports for convenience
pub use errors::McpError;
pub use events::{ProcessEvent, ServerMessage};
pub use framing::LineBuffer;
pub use pending::PendingRequests;
pub use process::{McpProcess, ProcessState};
