//! Workflow compilation
//!
//! Validates an authored tree before any execution and collects every
//! problem in one pass rather than stopping at the first. A compiled
//! workflow is the only thing the interpreter accepts, so structural
//! invariants (if arity, case labels, resolvable references) hold by
//! the time a run starts.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::condition::{Condition, ConditionError};
use crate::template;
use crate::workflow::{Step, Workflow, WorkflowNode};

static NODE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap());

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompilationError {
    #[error("Duplicate node id '{id}'")]
    DuplicateNodeId { id: String },
    #[error("Node id '{id}' is not a valid identifier")]
    InvalidNodeId { id: String },
    #[error("Node '{node_id}' references undeclared variable '${{{name}}}'")]
    UnresolvedReference { node_id: String, name: String },
    #[error("Node '{node_id}' has an invalid condition: {source}")]
    InvalidCondition {
        node_id: String,
        source: ConditionError,
    },
    #[error("If node '{node_id}' has {found} children, expected exactly 2 (true branch, false branch)")]
    IfBranchCount { node_id: String, found: usize },
    #[error("Child '{child_id}' of switch node '{node_id}' has no case value")]
    MissingCaseValue { node_id: String, child_id: String },
    #[error("Switch node '{node_id}' has no children")]
    EmptySwitch { node_id: String },
}

/// Every problem found in one compilation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilationReport {
    pub errors: Vec<CompilationError>,
}

impl CompilationReport {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl fmt::Display for CompilationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}", err)?;
        }
        Ok(())
    }
}

/// Facts gathered while walking the tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilationMetadata {
    pub node_count: usize,
    pub max_depth: usize,
    pub declared_variables: usize,
}

/// A validated workflow, shared read-only across runs
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub workflow: Arc<Workflow>,
    pub metadata: CompilationMetadata,
}

impl CompiledWorkflow {
    pub fn root(&self) -> &WorkflowNode {
        &self.workflow.root
    }
}

/// Compile a workflow, returning every validation error found.
pub fn compile(workflow: Workflow) -> Result<CompiledWorkflow, CompilationReport> {
    let mut pass = CompilePass::default();
    let visible = HashSet::new();
    pass.check_node(&workflow.root, &visible, 1);

    if !pass.report.is_empty() {
        return Err(pass.report);
    }

    debug!(
        nodes = pass.metadata.node_count,
        depth = pass.metadata.max_depth,
        "workflow compiled"
    );
    Ok(CompiledWorkflow {
        workflow: Arc::new(workflow),
        metadata: pass.metadata,
    })
}

#[derive(Default)]
struct CompilePass {
    report: CompilationReport,
    seen_ids: HashSet<String>,
    metadata: CompilationMetadata,
}

impl CompilePass {
    fn check_node(&mut self, node: &WorkflowNode, visible: &HashSet<String>, depth: usize) {
        self.metadata.node_count += 1;
        self.metadata.max_depth = self.metadata.max_depth.max(depth);

        if !NODE_ID_RE.is_match(&node.id) {
            self.report.errors.push(CompilationError::InvalidNodeId {
                id: node.id.clone(),
            });
        }
        if !self.seen_ids.insert(node.id.clone()) {
            self.report.errors.push(CompilationError::DuplicateNodeId {
                id: node.id.clone(),
            });
        }

        // Names visible to this node's own templates and to its subtree.
        // Declared variables come into scope in authoring order, so a
        // variable's default may reference one declared above it.
        let mut scope = visible.clone();
        let meta = node.step.meta();
        for var in &meta.variables {
            self.check_template(&node.id, &var.value, &scope);
            scope.insert(var.name.clone());
            self.metadata.declared_variables += 1;
        }
        // Handler-produced values exist only at run time but their names
        // are declared up front, so downstream references are checkable.
        for opt in &meta.completion_options {
            scope.insert(opt.name.clone());
        }

        match &node.step {
            Step::Detector(s) => self.check_template(&node.id, &s.detector_id, &scope),
            Step::KustoQuery(s) => self.check_template(&node.id, &s.query_text, &scope),
            Step::Markdown(s) => self.check_template(&node.id, &s.markdown_text, &scope),
            Step::If(s) => {
                match Condition::from_if_step(s) {
                    Ok(cond) => {
                        self.check_template(&node.id, &cond.left, &scope);
                        self.check_template(&node.id, &cond.right, &scope);
                    }
                    Err(source) => {
                        self.report.errors.push(CompilationError::InvalidCondition {
                            node_id: node.id.clone(),
                            source,
                        });
                    }
                }
                if node.children.len() != 2 {
                    self.report.errors.push(CompilationError::IfBranchCount {
                        node_id: node.id.clone(),
                        found: node.children.len(),
                    });
                }
            }
            Step::Switch(s) => {
                self.check_template(&node.id, &s.switch_on_value, &scope);
                if node.children.is_empty() {
                    self.report.errors.push(CompilationError::EmptySwitch {
                        node_id: node.id.clone(),
                    });
                }
                for child in &node.children {
                    if child.step.meta().switch_case_value.is_none() {
                        self.report.errors.push(CompilationError::MissingCaseValue {
                            node_id: node.id.clone(),
                            child_id: child.id.clone(),
                        });
                    }
                }
            }
        }

        for child in &node.children {
            self.check_node(child, &scope, depth + 1);
        }
    }

    fn check_template(&mut self, node_id: &str, text: &str, scope: &HashSet<String>) {
        for name in template::referenced_vars(text) {
            if !scope.contains(&name) {
                self.report
                    .errors
                    .push(CompilationError::UnresolvedReference {
                        node_id: node_id.to_string(),
                        name,
                    });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Workflow {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn valid_workflow_compiles_with_metadata() {
        let wf = parse(
            r###"{
                "root": {
                    "id": "root",
                    "type": "markdown",
                    "data": {
                        "name": "root",
                        "variables": [{"name": "site", "value": "contoso"}],
                        "markdownText": "## ${site}"
                    },
                    "children": [
                        {
                            "id": "child",
                            "type": "markdown",
                            "data": {"markdownText": "site is ${site}"}
                        }
                    ]
                }
            }"###,
        );
        let compiled = compile(wf).unwrap();
        assert_eq!(compiled.metadata.node_count, 2);
        assert_eq!(compiled.metadata.max_depth, 2);
        assert_eq!(compiled.metadata.declared_variables, 1);
    }

    #[test]
    fn collects_all_errors_in_one_pass() {
        // Duplicate id, unresolved reference, and bad if arity together
        let wf = parse(
            r#"{
                "root": {
                    "id": "root",
                    "type": "if",
                    "data": {"ifconditionExpression": "${missing} > 3"},
                    "children": [
                        {"id": "dup", "type": "markdown", "data": {"markdownText": "a"}}
                    ]
                }
            }"#,
        );
        let mut wf = wf;
        // Second child shares the first's id
        wf.root.children.push(wf.root.children[0].clone());
        wf.root.children.push(wf.root.children[0].clone());

        let report = compile(wf).unwrap_err();
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, CompilationError::DuplicateNodeId { id } if id == "dup")));
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, CompilationError::UnresolvedReference { name, .. } if name == "missing")));
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, CompilationError::IfBranchCount { found: 3, .. })));
    }

    #[test]
    fn if_requires_exactly_two_children() {
        let wf = parse(
            r#"{
                "root": {
                    "id": "root",
                    "type": "if",
                    "data": {"ifconditionExpression": "5 > 3"},
                    "children": [
                        {"id": "only", "type": "markdown", "data": {"markdownText": "x"}}
                    ]
                }
            }"#,
        );
        let report = compile(wf).unwrap_err();
        assert_eq!(report.len(), 1);
        assert!(matches!(
            report.errors[0],
            CompilationError::IfBranchCount { found: 1, .. }
        ));
    }

    #[test]
    fn if_condition_from_separate_fields() {
        let wf = parse(
            r#"{
                "root": {
                    "id": "root",
                    "type": "if",
                    "data": {
                        "ifconditionLeftValue": "5",
                        "ifconditionExpression": ">",
                        "ifconditionRightValue": "3"
                    },
                    "children": [
                        {"id": "t", "type": "markdown", "data": {"markdownText": "t"}},
                        {"id": "f", "type": "markdown", "data": {"markdownText": "f"}}
                    ]
                }
            }"#,
        );
        assert!(compile(wf).is_ok());
    }

    #[test]
    fn switch_children_need_case_values() {
        let wf = parse(
            r#"{
                "root": {
                    "id": "root",
                    "type": "switch",
                    "data": {"switchOnValue": "prod"},
                    "children": [
                        {"id": "a", "type": "markdown", "data": {"switchCaseValue": "prod", "markdownText": "a"}},
                        {"id": "b", "type": "markdown", "data": {"markdownText": "b"}}
                    ]
                }
            }"#,
        );
        let report = compile(wf).unwrap_err();
        assert_eq!(report.len(), 1);
        assert!(matches!(
            &report.errors[0],
            CompilationError::MissingCaseValue { child_id, .. } if child_id == "b"
        ));
    }

    #[test]
    fn empty_switch_rejected() {
        let wf = parse(
            r#"{
                "root": {
                    "id": "root",
                    "type": "switch",
                    "data": {"switchOnValue": "x"}
                }
            }"#,
        );
        let report = compile(wf).unwrap_err();
        assert!(matches!(
            report.errors[0],
            CompilationError::EmptySwitch { .. }
        ));
    }

    #[test]
    fn completion_options_are_visible_downstream() {
        let wf = parse(
            r#"{
                "root": {
                    "id": "root",
                    "type": "kustoQuery",
                    "data": {
                        "completionOptions": [{"name": "rowCount", "value": ""}],
                        "queryText": "Requests | count"
                    },
                    "children": [
                        {"id": "report", "type": "markdown", "data": {"markdownText": "rows: ${rowCount}"}}
                    ]
                }
            }"#,
        );
        assert!(compile(wf).is_ok());
    }

    #[test]
    fn sibling_variables_do_not_leak() {
        let wf = parse(
            r#"{
                "root": {
                    "id": "root",
                    "type": "markdown",
                    "data": {"markdownText": "root"},
                    "children": [
                        {
                            "id": "left",
                            "type": "markdown",
                            "data": {
                                "variables": [{"name": "onlyLeft", "value": "1"}],
                                "markdownText": "${onlyLeft}"
                            }
                        },
                        {
                            "id": "right",
                            "type": "markdown",
                            "data": {"markdownText": "${onlyLeft}"}
                        }
                    ]
                }
            }"#,
        );
        let report = compile(wf).unwrap_err();
        assert!(matches!(
            &report.errors[0],
            CompilationError::UnresolvedReference { node_id, name } if node_id == "right" && name == "onlyLeft"
        ));
    }

    #[test]
    fn invalid_node_id_rejected() {
        let wf = parse(
            r#"{
                "root": {
                    "id": "has spaces!",
                    "type": "markdown",
                    "data": {"markdownText": "x"}
                }
            }"#,
        );
        let report = compile(wf).unwrap_err();
        assert!(matches!(
            report.errors[0],
            CompilationError::InvalidNodeId { .. }
        ));
    }
}
