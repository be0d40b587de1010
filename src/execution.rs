//! Execution results
//!
//! The run-time mirror of a workflow: one execution node per definition
//! node, carrying status, traces, and the variable bindings that were live
//! when the node ran. The mirror is plain data, fully serializable, and is
//! what callers inspect (or splice into on resume).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::status::{NodeState, NodeStatus};
use crate::workflow::StepVariable;

/// A finished (or paused) run of an entire workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub root: WorkflowNodeExecution,
    /// Rolled-up severity of the whole tree
    pub status: NodeStatus,
}

/// Execution state of one node, mirroring its definition node by id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNodeExecution {
    pub id: String,
    pub data: WorkflowNodeResult,
    #[serde(default)]
    pub children: Vec<WorkflowNodeExecution>,
}

impl WorkflowNodeExecution {
    pub fn find(&self, id: &str) -> Option<&WorkflowNodeExecution> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut WorkflowNodeExecution> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Path of ids from this node down to `id`, inclusive at both ends
    pub fn path_to(&self, id: &str) -> Option<Vec<String>> {
        if self.id == id {
            return Some(vec![self.id.clone()]);
        }
        for child in &self.children {
            if let Some(mut path) = child.path_to(id) {
                path.insert(0, self.id.clone());
                return Some(path);
            }
        }
        None
    }
}

/// Everything a run recorded about one node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNodeResult {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub state: NodeState,
    pub status: NodeStatus,
    pub succeeded: bool,
    #[serde(default)]
    pub message: String,
    /// Child references with their activation flags. Inactive children were
    /// branch arms not taken (or subtrees skipped by cancellation).
    #[serde(default)]
    pub children: Vec<NodeRef>,
    #[serde(default)]
    pub execution_traces: Vec<TraceEntry>,
    /// Frame bindings live when this node ran, runtime values included
    #[serde(default)]
    pub variables: Vec<StepVariable>,
}

impl WorkflowNodeResult {
    /// Fresh result for a node that has not run yet
    pub fn pending(name: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            state: NodeState::Pending,
            status: NodeStatus::None,
            succeeded: false,
            message: String::new(),
            children: Vec::new(),
            execution_traces: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn trace(&mut self, level: TraceLevel, message: impl Into<String>) {
        self.execution_traces.push(TraceEntry::now(level, message));
    }

    /// Whether this node actually executed (was not skipped or left pending)
    pub fn executed(&self) -> bool {
        matches!(self.state, NodeState::Succeeded | NodeState::Failed)
    }
}

/// Reference from a parent result to one of its children
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub id: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TraceLevel {
    Info,
    Warning,
    Error,
}

/// One timestamped line in a node's execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    pub level: TraceLevel,
    pub message: String,
}

impl TraceEntry {
    pub fn now(level: TraceLevel, message: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            timestamp_ms,
            level,
            message: message.into(),
        }
    }
}
