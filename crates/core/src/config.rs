use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub executor: ExecutorConfig,
    pub definitions: DefinitionsConfig,
    pub logging: LoggingConfig,
}

/// Which isolation backend the executor should run with.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Strict when available, otherwise fallback if allowed.
    #[default]
    Auto,
    /// Strict only; startup fails if it is unavailable.
    Strict,
    /// Best-effort host execution, chosen explicitly.
    Fallback,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutorConfig {
    pub backend: BackendPreference,
    /// Host execution gives no resource guarantees, so it is opt-in.
    pub allow_fallback: bool,
    /// Parent directory for per-invocation workspaces (system temp dir when unset).
    pub workspace_root: Option<PathBuf>,
    pub bwrap_path: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            allow_fallback: false,
            workspace_root: None,
            bwrap_path: PathBuf::from("bwrap"),
        }
    }
}

impl ExecutorConfig {
    /// Directory new workspaces are created under.
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DefinitionsConfig {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map SANDBOX_MCP__EXECUTOR__ALLOW_FALLBACK=true to executor.allow_fallback
            .add_source(Environment::with_prefix("SANDBOX_MCP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
