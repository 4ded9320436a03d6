#![deny(unused)]
//! Core types, traits, and error definitions for Sandbox MCP.
//!
//! This crate provides the building blocks shared by the sandbox engine and
//! the server binary: the error type, application configuration, the
//! workspace path policy, and the tool/event contracts.

pub mod config;
pub mod error;
pub mod events;
pub mod fs_policy;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use events::*;
pub use traits::*;
pub use types::*;
