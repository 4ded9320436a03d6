#![deny(unused)]
//! sandbox-mcp - declarative code-execution sandboxes exposed as tools.
//!
//! Loads sandbox definitions, binds them to the best isolation backend the
//! host offers, and lists or invokes the resulting tools.

mod definitions;
mod tracing_layer;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use sandbox_mcp_core::config::AppConfig;
use sandbox_mcp_core::traits::ToolRegistry;
use sandbox_mcp_sandbox::{build_tools, select_backend, SandboxExecutor, SandboxToolRegistry};

#[derive(Parser)]
#[command(name = "sandbox-mcp", version, about = "Run code in declaratively defined sandboxes")]
struct Cli {
    /// Definition files or directories; replaces `definitions.paths` from the config.
    #[arg(short, long = "definitions", value_delimiter = ',')]
    definitions: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the compiled tool descriptors as JSON.
    Tools,
    /// Invoke a tool with JSON arguments.
    Call {
        /// Tool name (the definition id).
        tool: String,
        /// File holding the JSON arguments; stdin when omitted.
        #[arg(long)]
        args: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = AppConfig::load().context("failed to load configuration")?;
    tracing_layer::configure_tracing(&config.logging)?;

    tracing::info!("Starting sandbox-mcp v{}", env!("CARGO_PKG_VERSION"));

    if !cli.definitions.is_empty() {
        config.definitions.paths = cli.definitions.clone();
    }

    // =========================================================================
    // Definitions
    // =========================================================================
    let definitions = definitions::load_definitions(&config.definitions.paths).await?;

    // =========================================================================
    // Executor
    // =========================================================================
    let backend = select_backend(&config.executor).await?;
    let executor = SandboxExecutor::initialize(backend, &config.executor)
        .await?
        .with_event_emitter(Arc::new(tracing_layer::TracingEventEmitter));
    let executor = Arc::new(executor);

    // =========================================================================
    // Tools
    // =========================================================================
    let registry = SandboxToolRegistry::new();
    for tool in build_tools(executor.clone(), &definitions)? {
        registry.register(Box::new(tool)).await?;
    }
    tracing::info!(
        tools_count = registry.len(),
        backend = %executor.backend_kind(),
        "Tool registry initialized"
    );

    match cli.command {
        Command::Tools => {
            let tools = registry.list().await?;
            println!("{}", serde_json::to_string_pretty(&tools)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Call { tool, args } => {
            let args = read_arguments(args).await?;
            let output = registry.execute(&tool, args).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(if output.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn read_arguments(path: Option<PathBuf>) -> anyhow::Result<Value> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("cannot read arguments from {}", path.display()))?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("cannot read arguments from stdin")?;
            raw
        }
    };

    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&raw).context("tool arguments must be a JSON object")
}
