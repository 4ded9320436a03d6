//! Execution requests and argument decoding.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::compiler::{ParameterKind, ToolDescriptor};
use crate::result::FailureReason;

/// Code and files supplied for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Content of the definition's entrypoint file.
    pub entrypoint_content: String,
    /// Declared files and extra uploads, keyed by file name.
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    filename: String,
    content: String,
}

impl ExecutionRequest {
    pub fn new(entrypoint_content: impl Into<String>) -> Self {
        Self {
            entrypoint_content: entrypoint_content.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(name.into(), content.into());
        self
    }

    /// Decode tool-call arguments shaped by `descriptor`'s input schema.
    ///
    /// Missing parameters decode as absent and are reported by the executor.
    /// Unknown keys are ignored.
    pub fn from_arguments(descriptor: &ToolDescriptor, args: &Value) -> Result<Self, FailureReason> {
        let empty = Map::new();
        let args = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(FailureReason::validation(
                    "Arguments must be a JSON object.",
                ))
            }
        };

        let mut request = Self::default();
        let mut entrypoint_file = None;

        for param in &descriptor.parameters {
            let value = args.get(&param.name).filter(|v| !v.is_null());
            match &param.kind {
                ParameterKind::RequiredString { file_name } => {
                    let content = match value {
                        None => None,
                        Some(Value::String(s)) => Some(s.clone()),
                        Some(_) => {
                            return Err(FailureReason::validation(format!(
                                "Parameter `{}` must be a string.",
                                param.name
                            )))
                        }
                    };
                    if param.name == descriptor.entrypoint_param {
                        request.entrypoint_content = content.unwrap_or_default();
                        entrypoint_file = Some(file_name.as_str());
                    } else if let Some(content) = content {
                        request.files.insert(file_name.clone(), content);
                    }
                }
                ParameterKind::OptionalFileList => {
                    let Some(value) = value else { continue };
                    let uploads: Vec<UploadedFile> = serde_json::from_value(value.clone())
                        .map_err(|e| {
                            FailureReason::validation(format!(
                                "Invalid `{}` parameter: {}",
                                param.name, e
                            ))
                        })?;
                    for upload in uploads {
                        if request.files.contains_key(&upload.filename) {
                            return Err(FailureReason::validation(format!(
                                "Duplicate file name `{}`.",
                                upload.filename
                            )));
                        }
                        request.files.insert(upload.filename, upload.content);
                    }
                }
            }
        }

        if let Some(entrypoint) = entrypoint_file {
            if request.files.contains_key(entrypoint) {
                return Err(FailureReason::validation(format!(
                    "File `{}` conflicts with the entrypoint.",
                    entrypoint
                )));
            }
        }

        Ok(request)
    }
}
