//! Diagflow - diagnostic workflow execution engine

pub mod binding;
pub mod compiler;
pub mod condition;
pub mod error;
pub mod execution;
pub mod handlers;
pub mod interpreter;
pub mod limits;
pub mod status;
pub mod template;
pub mod workflow;

pub use binding::Scope;
pub use compiler::{compile, CompilationReport, CompiledWorkflow};
pub use condition::Condition;
pub use error::{FixSuggestion, WorkflowError};
pub use execution::{TraceEntry, TraceLevel, WorkflowExecution, WorkflowNodeResult};
pub use handlers::{
    ClientResponse, DetectorClient, MockDetectorClient, MockQueryClient, QueryClient, StepExecutor,
};
pub use interpreter::Interpreter;
pub use limits::{CancelToken, RunLimits};
pub use status::{NodeState, NodeStatus};
pub use workflow::{Step, StepVariable, Workflow, WorkflowNode};
