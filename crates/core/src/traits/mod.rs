//! Core traits for Sandbox MCP.
//!
//! - `skills`: tool-facing traits (Tool, ToolRegistry)
//! - `events`: audit event emission (EventEmitter)

pub mod events;
pub mod skills;

pub use events::*;
pub use skills::*;
