//! Core type definitions for Sandbox MCP.

pub mod tool;

pub use tool::*;
