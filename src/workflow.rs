//! Workflow definition tree
//!
//! The authored, immutable side of the engine: a rooted tree of typed steps.
//! Each node kind carries only the payload fields it actually uses, so a
//! markdown step cannot end up with switch fields populated.

use serde::{Deserialize, Serialize};

/// A complete authored workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub root: WorkflowNode,
}

/// One node of the definition tree.
///
/// Children are exclusively owned by their parent; the tree is acyclic by
/// construction and shared read-only across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(flatten)]
    pub step: Step,
    #[serde(default)]
    pub children: Vec<WorkflowNode>,
}

/// The step kinds - serde picks the variant from the `type` tag,
/// the kind payload lives under `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Step {
    Detector(DetectorStep),
    KustoQuery(QueryStep),
    Markdown(MarkdownStep),
    If(IfStep),
    Switch(SwitchStep),
}

impl Step {
    /// Shared metadata of any step kind
    pub fn meta(&self) -> &StepMeta {
        match self {
            Step::Detector(s) => &s.meta,
            Step::KustoQuery(s) => &s.meta,
            Step::Markdown(s) => &s.meta,
            Step::If(s) => &s.meta,
            Step::Switch(s) => &s.meta,
        }
    }

    /// Kind name as it appears in the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Detector(_) => "detector",
            Step::KustoQuery(_) => "kustoQuery",
            Step::Markdown(_) => "markdown",
            Step::If(_) => "if",
            Step::Switch(_) => "switch",
        }
    }

    /// Branch nodes have mutually exclusive children; everything else
    /// runs its children concurrently.
    pub fn is_branch(&self) -> bool {
        matches!(self, Step::If(_) | Step::Switch(_))
    }
}

/// Metadata common to every step kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Variables declared by this node, visible to it and its descendants
    #[serde(default)]
    pub variables: Vec<StepVariable>,
    /// Handler-produced options available for downstream reference
    #[serde(default)]
    pub completion_options: Vec<StepVariable>,
    #[serde(default)]
    pub prompt_type: PromptType,
    /// Case label when this node is a child of a switch node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_case_value: Option<String>,
}

/// Whether a node executes automatically or waits for an explicit resume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptType {
    #[default]
    Automatic,
    OnClick,
}

/// A declared step variable with its authored default and the value the
/// handler produced at run time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepVariable {
    pub name: String,
    #[serde(rename = "type", default = "default_var_type")]
    pub var_type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_value: Option<String>,
}

fn default_var_type() -> String {
    "String".to_string()
}

impl StepVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var_type: default_var_type(),
            value: value.into(),
            runtime_value: None,
        }
    }

    /// Runtime value if the handler produced one, authored default otherwise
    pub fn effective_value(&self) -> &str {
        self.runtime_value.as_deref().unwrap_or(&self.value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorStep {
    #[serde(flatten)]
    pub meta: StepMeta,
    pub detector_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStep {
    #[serde(flatten)]
    pub meta: StepMeta,
    pub query_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownStep {
    #[serde(flatten)]
    pub meta: StepMeta,
    pub markdown_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfStep {
    #[serde(flatten)]
    pub meta: StepMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_value: Option<String>,
    #[serde(default)]
    pub ifcondition_left_value: String,
    #[serde(default)]
    pub ifcondition_right_value: String,
    #[serde(default)]
    pub ifcondition_expression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchStep {
    #[serde(flatten)]
    pub meta: StepMeta,
    pub switch_on_value: String,
}

impl WorkflowNode {
    /// Number of nodes in this subtree (self included)
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(WorkflowNode::node_count)
            .sum::<usize>()
    }

    /// Depth-first lookup by id
    pub fn find(&self, id: &str) -> Option<&WorkflowNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}
