#![deny(unused)]
//! Declarative code-execution sandboxes for Sandbox MCP.
//!
//! A [`SandboxDefinition`] describes one kind of sandbox: the entrypoint
//! file, the command, limits, network and filesystem policy. The compiler
//! turns each definition into a callable tool; the executor runs tool calls
//! in a fresh workspace through an isolation backend.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  SandboxToolRegistry                   │
//! │    ↓ tool call by name                 │
//! ├────────────────────────────────────────┤
//! │  SandboxTool (compiled descriptor)     │
//! │    ↓ decoded ExecutionRequest          │
//! ├────────────────────────────────────────┤
//! │  SandboxExecutor                       │
//! │    validate → workspace → stage → run  │
//! ├────────────────────────────────────────┤
//! │  IsolationBackend                      │
//! │    strict: bubblewrap + rlimits        │
//! │    fallback: host process + timeout    │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sandbox_mcp_sandbox::{build_tools, select_backend, SandboxExecutor, SandboxToolRegistry};
//!
//! let backend = select_backend(&config.executor).await?;
//! let executor = Arc::new(SandboxExecutor::initialize(backend, &config.executor).await?);
//!
//! let registry = SandboxToolRegistry::new();
//! for tool in build_tools(executor, &definitions)? {
//!     registry.register(Box::new(tool)).await?;
//! }
//! ```

pub mod backend;
pub mod compiler;
pub mod definition;
pub mod engine;
pub mod registry;
pub mod request;
pub mod result;
pub mod tools;
pub mod workspace;

pub use backend::{
    select_backend, BackendKind, BubblewrapBackend, ExecutionLimits, HostBackend,
    IsolationBackend, MockBackend, ProcessOutcome, StagedExecution,
};
pub use compiler::{ParameterKind, ParameterSpec, ToolCompiler, ToolDescriptor, ToolSet};
pub use definition::{
    DeclaredFile, Hints, MountPolicy, NetworkPolicy, Parameters, Resources, SandboxDefinition,
    SecurityPolicy,
};
pub use engine::SandboxExecutor;
pub use registry::SandboxToolRegistry;
pub use request::ExecutionRequest;
pub use result::{ExecutionResult, FailureKind, FailureReason};
pub use tools::{build_tools, render, SandboxTool};
pub use workspace::Workspace;
