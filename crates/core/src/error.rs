//! Error types for Sandbox MCP.
//!
//! Only infrastructure faults travel through [`Error`]. Failures that belong to
//! a single invocation (bad arguments, timeouts, non-zero exits) are reported
//! as values inside the execution result instead.

use thiserror::Error;

/// Result type alias using Sandbox MCP's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Sandbox MCP.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Definition / Tool Errors
    // =========================================================================
    #[error("Invalid sandbox definition '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Execution Infrastructure Errors
    // =========================================================================
    #[error("Workspace staging failed: {0}")]
    Staging(String),

    #[error("Isolation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid definition error.
    pub fn invalid_definition(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a duplicate tool error.
    pub fn duplicate_tool(name: impl Into<String>) -> Self {
        Self::DuplicateTool(name.into())
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a staging error.
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    /// Create a backend unavailable error.
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the isolation backend can no longer be used.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}
