//! Sandbox definitions.
//!
//! A [`SandboxDefinition`] describes one kind of sandbox: what file the
//! submitted code is stored in, how it is run, and which limits and policies
//! apply. Definitions are parsed once at startup, validated, and shared
//! read-only between invocations.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use sandbox_mcp_core::{fs_policy, Error, Result};

/// Network posture of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPolicy {
    /// No network access (default).
    #[default]
    None,
    /// Limited network access.
    Restricted,
    /// Unrestricted network access.
    Full,
}

impl NetworkPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkPolicy::None => "none",
            NetworkPolicy::Restricted => "restricted",
            NetworkPolicy::Full => "full",
        }
    }
}

impl std::fmt::Display for NetworkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource budget for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    /// CPU cores.
    pub cpu: u32,
    /// Memory ceiling in MB.
    #[serde(rename = "memory")]
    pub memory_mb: u64,
    /// Maximum number of processes.
    #[serde(rename = "processes")]
    pub max_processes: u32,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            cpu: 1,
            memory_mb: 512,
            max_processes: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MountPolicy {
    pub read_only: bool,
    /// Prefix of the per-invocation workspace directory name.
    pub tmp_dir_prefix: String,
    /// Octal file mode applied to staged files, e.g. "0755".
    pub script_perms: String,
}

impl Default for MountPolicy {
    fn default() -> Self {
        Self {
            read_only: false,
            tmp_dir_prefix: "sandbox-".into(),
            script_perms: "0755".into(),
        }
    }
}

impl MountPolicy {
    /// Parsed `script_perms`.
    pub fn script_mode(&self) -> Result<u32> {
        let digits = self.script_perms.trim();
        let digits = digits.strip_prefix("0o").unwrap_or(digits);
        u32::from_str_radix(digits, 8)
            .ok()
            .filter(|mode| *mode <= 0o7777)
            .ok_or_else(|| {
                Error::invalid_request(format!(
                    "script permissions '{}' are not an octal file mode",
                    self.script_perms
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityPolicy {
    pub network: NetworkPolicy,
    pub read_only: bool,
}

/// A file the caller must supply with every invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl DeclaredFile {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Name of the tool parameter carrying this file's content.
    pub fn param_name(&self) -> String {
        param_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Parameters {
    pub files: Vec<DeclaredFile>,
    /// Whether callers may upload extra files via the `files` argument.
    pub additional_files: bool,
}

/// Optional overrides for the derived capability hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hints {
    pub read_only: Option<bool>,
    pub destructive: Option<bool>,
    pub idempotent: Option<bool>,
    pub external_interaction: Option<bool>,
}

/// Declarative description of one sandbox kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxDefinition {
    /// Unique key; also the tool name.
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// File the submitted code is stored in.
    pub entrypoint: String,
    /// argv run inside the workspace. Empty means dispatch by file extension.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(rename = "timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub mount: MountPolicy,
    #[serde(default)]
    pub security: SecurityPolicy,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub hints: Hints,
}

impl SandboxDefinition {
    /// Create a definition with default limits (1 core, 512 MB, 64 processes, 30s).
    pub fn new(
        id: impl Into<String>,
        entrypoint: impl Into<String>,
        command: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: String::new(),
            entrypoint: entrypoint.into(),
            command: command.into_iter().map(Into::into).collect(),
            timeout_seconds: 30,
            resources: Resources::default(),
            mount: MountPolicy::default(),
            security: SecurityPolicy::default(),
            parameters: Parameters::default(),
            hints: Hints::default(),
        }
    }

    /// Parse and validate a definition from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_resources(mut self, cpu: u32, memory_mb: u64, max_processes: u32) -> Self {
        self.resources = Resources {
            cpu,
            memory_mb,
            max_processes,
        };
        self
    }

    pub fn with_network(mut self, network: NetworkPolicy) -> Self {
        self.security.network = network;
        self
    }

    pub fn with_read_only_mount(mut self, read_only: bool) -> Self {
        self.mount.read_only = read_only;
        self
    }

    pub fn with_file(mut self, file: DeclaredFile) -> Self {
        self.parameters.files.push(file);
        self
    }

    pub fn with_additional_files(mut self, allowed: bool) -> Self {
        self.parameters.additional_files = allowed;
        self
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Read-only if either the mount or the security policy says so.
    pub fn is_read_only(&self) -> bool {
        self.mount.read_only || self.security.read_only
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Name of the tool parameter carrying the entrypoint content.
    pub fn entrypoint_param(&self) -> String {
        param_name(&self.entrypoint)
    }

    /// Check the invariants every loaded definition must hold.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(Error::invalid_definition(&self.id, reason));

        if self.id.trim().is_empty() {
            return fail("id must not be empty".into());
        }
        if self.entrypoint.trim().is_empty() {
            return fail("entrypoint must not be empty".into());
        }
        if let Err(e) = fs_policy::normalize_relative(&self.entrypoint) {
            return fail(format!("entrypoint: {}", e));
        }
        if self.timeout_seconds == 0 {
            return fail("timeout must be greater than zero".into());
        }
        if self.resources.cpu == 0
            || self.resources.memory_mb == 0
            || self.resources.max_processes == 0
        {
            return fail("cpu, memory and processes must all be greater than zero".into());
        }
        if let Err(e) = self.mount.script_mode() {
            return fail(e.to_string());
        }
        if self.mount.tmp_dir_prefix.contains(['/', '\\']) {
            return fail("tmpDirPrefix must not contain path separators".into());
        }

        let mut seen = HashSet::new();
        seen.insert(self.entrypoint_param());
        for file in &self.parameters.files {
            if let Err(e) = fs_policy::normalize_relative(&file.name) {
                return fail(format!("declared file: {}", e));
            }
            if !seen.insert(file.param_name()) {
                return fail(format!(
                    "declared file '{}' collides with another file parameter",
                    file.name
                ));
            }
        }
        if self.parameters.additional_files && seen.contains(ADDITIONAL_FILES_PARAM) {
            return fail(format!(
                "a file parameter is named '{}', which is reserved for additional files",
                ADDITIONAL_FILES_PARAM
            ));
        }

        Ok(())
    }
}

/// Parameter name carrying additional `{filename, content}` uploads.
pub const ADDITIONAL_FILES_PARAM: &str = "files";

/// Map a file name to a parameter name (`main.py` -> `main_py`).
pub fn param_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
