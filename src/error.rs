//! Error types with fix suggestions

use thiserror::Error;

use crate::compiler::CompilationReport;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The authored tree failed validation; carries every violation found
    #[error("Compilation failed:\n{0}")]
    Compilation(CompilationReport),

    #[error("Unresolved variable '${{{name}}}'")]
    UnresolvedVariable { name: String },

    #[error("Handler failed: {message}")]
    HandlerFailure { message: String },

    #[error("Handler timed out after {seconds}s")]
    HandlerTimeout { seconds: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Node '{id}' not found in workflow")]
    NodeNotFound { id: String },
}

impl FixSuggestion for WorkflowError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            WorkflowError::JsonParse(_) => {
                Some("Check the workflow JSON: every node needs id, type and data")
            }
            WorkflowError::Io(_) => Some("Check file path and permissions"),
            WorkflowError::Compilation(_) => {
                Some("Fix every listed violation, then compile again")
            }
            WorkflowError::UnresolvedVariable { .. } => {
                Some("Declare the variable on this node or an ancestor before referencing it")
            }
            WorkflowError::HandlerFailure { .. } => {
                Some("Check the detector id / query text and the backing service")
            }
            WorkflowError::HandlerTimeout { .. } => {
                Some("Raise the node timeout or simplify the step")
            }
            WorkflowError::Cancelled => None,
            WorkflowError::NodeNotFound { .. } => {
                Some("Use an id that exists in the compiled workflow tree")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_variable_message_names_the_token() {
        let err = WorkflowError::UnresolvedVariable {
            name: "siteName".to_string(),
        };
        assert_eq!(err.to_string(), "Unresolved variable '${siteName}'");
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn timeout_message_carries_seconds() {
        let err = WorkflowError::HandlerTimeout { seconds: 30 };
        assert!(err.to_string().contains("30s"));
    }
}
