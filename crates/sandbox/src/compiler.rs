//! Tool compiler.
//!
//! Turns a [`SandboxDefinition`] into a [`ToolDescriptor`]: name, generated
//! description, parameter schema, and capability hints. Compilation is a pure
//! function of the definition and the active backend kind, so the same input
//! always yields a byte-identical descriptor.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use sandbox_mcp_core::{Error, Result, ToolAnnotations, ToolDefinition};

use crate::backend::BackendKind;
use crate::definition::{NetworkPolicy, SandboxDefinition, ADDITIONAL_FILES_PARAM};

/// What a tool parameter carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// Required string: the content of the file `file_name`.
    RequiredString { file_name: String },
    /// Optional list of `{filename, content}` objects.
    OptionalFileList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub description: String,
    pub kind: ParameterKind,
}

impl ParameterSpec {
    pub fn is_required(&self) -> bool {
        matches!(self.kind, ParameterKind::RequiredString { .. })
    }

    fn schema(&self) -> Value {
        match &self.kind {
            ParameterKind::RequiredString { .. } => json!({
                "type": "string",
                "description": self.description,
            }),
            ParameterKind::OptionalFileList => json!({
                "type": "array",
                "description": self.description,
                "items": {
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "Name of the file, relative to the working directory"
                        },
                        "content": {
                            "type": "string",
                            "description": "Content of the file"
                        }
                    },
                    "required": ["filename", "content"]
                }
            }),
        }
    }
}

/// Compiled, externally callable form of a sandbox definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    /// Parameter carrying the entrypoint content. Always the first parameter.
    pub entrypoint_param: String,
    pub parameters: Vec<ParameterSpec>,
    pub annotations: ToolAnnotations,
}

impl ToolDescriptor {
    /// JSON Schema of the tool arguments.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(param.name.clone(), param.schema());
            if param.is_required() {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            title: Some(self.title.clone()),
            description: self.description.clone(),
            parameters: self.input_schema(),
            annotations: self.annotations,
        }
    }
}

/// Compiles definitions for a given backend posture.
#[derive(Debug, Clone, Copy)]
pub struct ToolCompiler {
    backend: BackendKind,
}

impl Default for ToolCompiler {
    fn default() -> Self {
        Self::new(BackendKind::Strict)
    }
}

impl ToolCompiler {
    pub fn new(backend: BackendKind) -> Self {
        Self { backend }
    }

    pub fn compile(&self, definition: &SandboxDefinition) -> ToolDescriptor {
        ToolDescriptor {
            name: definition.id.clone(),
            title: definition.display_name().to_string(),
            description: self.describe(definition),
            entrypoint_param: definition.entrypoint_param(),
            parameters: parameters(definition),
            annotations: annotations(definition),
        }
    }

    /// Human-readable description of the sandbox.
    pub fn describe(&self, definition: &SandboxDefinition) -> String {
        let mut description = definition.description.trim().to_string();
        if !description.is_empty() {
            if !description.ends_with('.') {
                description.push('.');
            }
            description.push(' ');
        }

        let resources = &definition.resources;
        description.push_str(&format!(
            "This sandbox uses {} with {} CPU {}, {} MB RAM, and {} processes.",
            self.backend.isolation_label(),
            resources.cpu,
            if resources.cpu == 1 { "core" } else { "cores" },
            resources.memory_mb,
            resources.max_processes,
        ));

        match definition.security.network {
            NetworkPolicy::None => description.push_str(" It has no network access"),
            level => description.push_str(&format!(" It has {} network access", level)),
        }
        if definition.is_read_only() {
            description.push_str(" and read-only filesystem permissions.");
        } else {
            description.push_str(" and read-write filesystem permissions.");
        }

        if !self.backend.enforces_limits() {
            description.push_str(
                " Execution falls back to the host runtime, so these limits are advisory and not enforced.",
            );
        }

        let files = &definition.parameters.files;
        let additional = definition.parameters.additional_files;
        if !files.is_empty() {
            let listed: Vec<String> = files
                .iter()
                .map(|file| {
                    if file.description.is_empty() {
                        format!("`{}`", file.name)
                    } else {
                        format!("`{}` ({})", file.name, file.description)
                    }
                })
                .collect();
            if listed.len() == 1 {
                description.push_str(&format!(" It requires a {} file", listed[0]));
            } else {
                description.push_str(&format!(
                    " It requires the following files: {}",
                    oxford_join(&listed)
                ));
            }
            if additional {
                description.push_str(" and supports uploading additional files.");
            } else {
                description.push('.');
            }
        } else if additional {
            description.push_str(" It supports uploading additional files.");
        }

        description.push_str(&format!(
            " The execution is limited to {} seconds.",
            definition.timeout_seconds
        ));

        description
    }
}

fn parameters(definition: &SandboxDefinition) -> Vec<ParameterSpec> {
    let command = if definition.command.is_empty() {
        "selected by file extension".to_string()
    } else {
        format!("`{}`", definition.command.join(" "))
    };

    let mut params = vec![ParameterSpec {
        name: definition.entrypoint_param(),
        description: format!(
            "Code to be stored in a file named `{}` and executed with the command {}.",
            definition.entrypoint, command
        ),
        kind: ParameterKind::RequiredString {
            file_name: definition.entrypoint.clone(),
        },
    }];

    for file in &definition.parameters.files {
        let description = if file.description.is_empty() {
            format!("Content of the file `{}`.", file.name)
        } else {
            file.description.clone()
        };
        params.push(ParameterSpec {
            name: file.param_name(),
            description,
            kind: ParameterKind::RequiredString {
                file_name: file.name.clone(),
            },
        });
    }

    if definition.parameters.additional_files {
        params.push(ParameterSpec {
            name: ADDITIONAL_FILES_PARAM.to_string(),
            description: "Additional files to store next to the entrypoint before execution."
                .to_string(),
            kind: ParameterKind::OptionalFileList,
        });
    }

    params
}

fn annotations(definition: &SandboxDefinition) -> ToolAnnotations {
    let hints = &definition.hints;
    ToolAnnotations {
        read_only_hint: hints.read_only.unwrap_or_else(|| definition.is_read_only()),
        // Running code is not classified as destructive unless the definition says so.
        destructive_hint: hints.destructive.unwrap_or(false),
        idempotent_hint: hints.idempotent.unwrap_or(false),
        open_world_hint: hints
            .external_interaction
            .unwrap_or(definition.security.network != NetworkPolicy::None),
    }
}

fn oxford_join(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{} and {}", first, second),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

/// The set of compiled tools, keyed by definition id.
#[derive(Debug, Default)]
pub struct ToolSet {
    compiler: ToolCompiler,
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolSet {
    pub fn new(compiler: ToolCompiler) -> Self {
        Self {
            compiler,
            tools: BTreeMap::new(),
        }
    }

    /// Validate and compile `definition`, adding it to the set.
    pub fn compile(&mut self, definition: &SandboxDefinition) -> Result<&ToolDescriptor> {
        definition.validate()?;
        if self.tools.contains_key(&definition.id) {
            return Err(Error::duplicate_tool(&definition.id));
        }
        let descriptor = self.compiler.compile(definition);
        Ok(self
            .tools
            .entry(definition.id.clone())
            .or_insert(descriptor))
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }
}
