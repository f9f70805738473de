use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage an error belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Resolve,
    Decode,
    Invoke,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Load => "load",
            Stage::Resolve => "resolve",
            Stage::Decode => "decode",
            Stage::Invoke => "invoke",
        })
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("artifact not found at {}", path.display())]
    ArtifactNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact is corrupt: {reason}")]
    ArtifactCorrupt { reason: String },
    #[error("type '{name}' not found in artifact")]
    TypeNotFound { name: String },
    #[error("handler '{handler}' has no operation '{operation}'")]
    EntryOperationMissing { handler: String, operation: String },
    #[error("handler '{handler}' declares {count} '{operation}' operations")]
    AmbiguousEntryOperation {
        handler: String,
        operation: String,
        count: usize,
    },
    #[error("'{handler}.{operation}' takes {arity} parameters, expected exactly 1")]
    InvalidArity {
        handler: String,
        operation: String,
        arity: usize,
    },
    #[error("handler '{handler}' has no parameter type '{expected}'")]
    ParameterTypeNotFound { handler: String, expected: String },
    #[error("payload is not valid JSON: {source}")]
    MalformedPayload {
        #[source]
        source: serde_json::Error,
    },
    #[error("expected {expected} at {path}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: &'static str,
    },
    #[error("cannot instantiate handler '{handler}': {reason}")]
    InstantiationFailed { handler: String, reason: String },
    #[error("handler '{handler}' failed")]
    HandlerExecutionFailed {
        handler: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("handler '{handler}' exhausted its fuel budget of {fuel}")]
    ExecutionBudgetExceeded { handler: String, fuel: u64 },
}

impl HarnessError {
    pub fn stage(&self) -> Stage {
        use HarnessError::*;
        match self {
            ArtifactNotFound { .. } | ArtifactCorrupt { .. } => Stage::Load,
            TypeNotFound { .. }
            | EntryOperationMissing { .. }
            | AmbiguousEntryOperation { .. }
            | InvalidArity { .. }
            | ParameterTypeNotFound { .. } => Stage::Resolve,
            MalformedPayload { .. } | TypeMismatch { .. } => Stage::Decode,
            InstantiationFailed { .. }
            | HandlerExecutionFailed { .. }
            | ExecutionBudgetExceeded { .. } => Stage::Invoke,
        }
    }

    /// Whether handler code ran before the failure.
    pub fn handler_ran(&self) -> bool {
        matches!(
            self,
            HarnessError::HandlerExecutionFailed { .. }
                | HarnessError::ExecutionBudgetExceeded { .. }
        )
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        HarnessError::ArtifactCorrupt {
            reason: reason.into(),
        }
    }

    pub(crate) fn instantiation(handler: &str, reason: impl fmt::Display) -> Self {
        HarnessError::InstantiationFailed {
            handler: handler.to_owned(),
            reason: reason.to_string(),
        }
    }
}
