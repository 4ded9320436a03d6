//! Per-invocation execution results.

use serde::Serialize;
use thiserror::Error;

use crate::backend::BackendKind;

/// Why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Arguments were missing, empty, or malformed. Nothing ran.
    ValidationError,
    /// The wall-clock limit was hit and the process tree was killed.
    TimeoutError,
    /// The program could not be started or exited non-zero.
    RuntimeError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ValidationError => "validation_error",
            FailureKind::TimeoutError => "timeout_error",
            FailureKind::RuntimeError => "runtime_error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind}: {message}")]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ValidationError,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::TimeoutError,
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::RuntimeError,
            message: message.into(),
        }
    }
}

/// Outcome of one execution.
///
/// `failed` is true exactly when `failure` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Interleaved stdout and stderr (partial on timeout).
    pub output: String,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub backend: BackendKind,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(output: impl Into<String>, exit_code: i32, backend: BackendKind) -> Self {
        Self {
            output: output.into(),
            failed: false,
            failure: None,
            exit_code: Some(exit_code),
            timed_out: false,
            backend,
            duration_ms: 0,
        }
    }

    pub fn failure(reason: FailureReason, output: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            output: output.into(),
            failed: true,
            timed_out: reason.kind == FailureKind::TimeoutError,
            failure: Some(reason),
            exit_code: None,
            backend,
            duration_ms: 0,
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::timeout("Execution timed out after 2 seconds.");
        assert_eq!(
            reason.to_string(),
            "timeout_error: Execution timed out after 2 seconds."
        );
    }

    #[test]
    fn test_failed_tracks_failure() {
        let ok = ExecutionResult::succeeded("hi\n", 0, BackendKind::Strict);
        assert!(!ok.failed);
        assert_eq!(ok.failure_kind(), None);

        let timed_out = ExecutionResult::failure(
            FailureReason::timeout("too slow"),
            "partial",
            BackendKind::Fallback,
        );
        assert!(timed_out.failed);
        assert!(timed_out.timed_out);
        assert_eq!(timed_out.failure_kind(), Some(FailureKind::TimeoutError));

        let json = serde_json::to_value(&timed_out).unwrap();
        assert_eq!(json["failure"]["kind"], "timeout_error");
        assert_eq!(json["backend"], "fallback");
    }
}
