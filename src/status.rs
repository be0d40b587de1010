//! Node status severity and rollup

use serde::{Deserialize, Serialize};

/// Outcome severity of one workflow node.
///
/// The derived `Ord` follows declaration order, so `Critical` is the maximum
/// and aggregation over a subtree is a plain `max()`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum NodeStatus {
    #[default]
    None,
    Success,
    Info,
    Warning,
    Critical,
}

impl NodeStatus {
    /// Combine with another status, keeping the higher severity
    pub fn escalate(self, other: NodeStatus) -> NodeStatus {
        self.max(other)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::None => "None",
            NodeStatus::Success => "Success",
            NodeStatus::Info => "Info",
            NodeStatus::Warning => "Warning",
            NodeStatus::Critical => "Critical",
        };
        write!(f, "{}", s)
    }
}

/// Per-node lifecycle state within a single run.
///
/// Terminal states (`Succeeded`, `Failed`, `Skipped`) never transition
/// further within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NodeState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeState::Pending => "Pending",
            NodeState::Running => "Running",
            NodeState::Succeeded => "Succeeded",
            NodeState::Failed => "Failed",
            NodeState::Skipped => "Skipped",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_is_total() {
        assert!(NodeStatus::Critical > NodeStatus::Warning);
        assert!(NodeStatus::Warning > NodeStatus::Info);
        assert!(NodeStatus::Info > NodeStatus::Success);
        assert!(NodeStatus::Success > NodeStatus::None);
    }

    #[test]
    fn escalate_keeps_max() {
        assert_eq!(
            NodeStatus::Info.escalate(NodeStatus::Critical),
            NodeStatus::Critical
        );
        assert_eq!(
            NodeStatus::Warning.escalate(NodeStatus::Success),
            NodeStatus::Warning
        );
        assert_eq!(NodeStatus::None.escalate(NodeStatus::None), NodeStatus::None);
    }

    #[test]
    fn status_serializes_as_pascal_case() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::Critical).unwrap(),
            "\"Critical\""
        );
        assert_eq!(serde_json::to_string(&NodeStatus::None).unwrap(), "\"None\"");
    }
}
