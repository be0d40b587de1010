//! Workflow interpreter
//!
//! Walks a compiled definition tree and produces the execution mirror.
//! Children of ordinary nodes run concurrently under a semaphore bound;
//! branch nodes activate exactly one arm and record the rest as inactive.
//! A node's severity rolls up as the maximum over itself and its active
//! children, and cancellation is checked before each node starts so
//! in-flight handlers always finish and keep their results.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::binding::Scope;
use crate::compiler::CompiledWorkflow;
use crate::condition::Condition;
use crate::error::WorkflowError;
use crate::execution::{
    NodeRef, TraceLevel, WorkflowExecution, WorkflowNodeExecution, WorkflowNodeResult,
};
use crate::handlers::StepExecutor;
use crate::limits::{CancelToken, RunLimits};
use crate::status::{NodeState, NodeStatus};
use crate::template;
use crate::workflow::{PromptType, Step, WorkflowNode};

pub struct Interpreter {
    executor: Arc<StepExecutor>,
    limits: RunLimits,
}

struct RunCtx {
    semaphore: Arc<Semaphore>,
    cancel: CancelToken,
    /// Node id whose resume unblocked this run, if any. That node executes
    /// even though it is marked on-click; its on-click descendants still
    /// pause as usual.
    resume_root: Option<String>,
}

impl Interpreter {
    pub fn new(executor: Arc<StepExecutor>) -> Self {
        Self {
            executor,
            limits: RunLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Run a compiled workflow to completion (or until every remaining node
    /// is paused on a user prompt).
    pub async fn run(
        &self,
        compiled: &CompiledWorkflow,
    ) -> Result<WorkflowExecution, WorkflowError> {
        self.run_with_cancel(compiled, CancelToken::new()).await
    }

    /// Run with an external cancellation token. Nodes not yet started when
    /// the token fires are skipped; running handlers finish naturally.
    #[instrument(skip_all, fields(nodes = compiled.metadata.node_count))]
    pub async fn run_with_cancel(
        &self,
        compiled: &CompiledWorkflow,
        cancel: CancelToken,
    ) -> Result<WorkflowExecution, WorkflowError> {
        let ctx = RunCtx {
            semaphore: Arc::new(Semaphore::new(self.limits.max_parallelism)),
            cancel: cancel.clone(),
            resume_root: None,
        };

        // The run-duration bound reuses cancellation: when the deadline
        // passes, remaining nodes wind down as skipped and the partial
        // execution is still returned.
        let deadline = self.limits.max_run_duration;
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!("run duration limit reached, cancelling remaining nodes");
            cancel.cancel();
        });

        let root = self
            .exec_node(compiled.root(), Scope::root(), &ctx)
            .await;
        watchdog.abort();

        let status = root.data.status;
        info!(%status, "run finished");
        Ok(WorkflowExecution { root, status })
    }

    /// Resume a node that paused on a user prompt.
    ///
    /// The node's ancestor scope is rebuilt from the bindings each ancestor
    /// recorded when it ran, the subtree is re-executed, and the fresh
    /// results are spliced into the existing execution with ancestor
    /// statuses re-rolled.
    #[instrument(skip_all, fields(node = %node_id))]
    pub async fn resume_node(
        &self,
        compiled: &CompiledWorkflow,
        execution: &mut WorkflowExecution,
        node_id: &str,
    ) -> Result<(), WorkflowError> {
        let target = compiled
            .root()
            .find(node_id)
            .ok_or_else(|| WorkflowError::NodeNotFound {
                id: node_id.to_string(),
            })?;
        let path = execution
            .root
            .path_to(node_id)
            .ok_or_else(|| WorkflowError::NodeNotFound {
                id: node_id.to_string(),
            })?;

        // Rebuild the scope chain from recorded ancestor bindings, runtime
        // values included, so the subtree sees exactly what it would have
        // seen in the original run.
        let mut scope = Scope::root();
        for ancestor_id in path.iter().take(path.len().saturating_sub(1)) {
            let recorded = execution
                .root
                .find(ancestor_id)
                .map(|n| n.data.variables.clone())
                .unwrap_or_default();
            scope = scope.child();
            scope.declare(&recorded);
        }

        let ctx = RunCtx {
            semaphore: Arc::new(Semaphore::new(self.limits.max_parallelism)),
            cancel: CancelToken::new(),
            resume_root: Some(node_id.to_string()),
        };
        let subtree = self.exec_node(target, scope, &ctx).await;

        let subtree_status = subtree.data.status;
        let subtree_succeeded = subtree.data.succeeded;
        let subtree_executed = subtree.data.executed();
        if let Some(slot) = execution.root.find_mut(node_id) {
            *slot = subtree;
        }

        // Severity only ever escalates, so each ancestor folds the resumed
        // subtree's status into what it already had.
        for ancestor_id in path.iter().rev().skip(1) {
            if let Some(ancestor) = execution.root.find_mut(ancestor_id) {
                ancestor.data.status = ancestor.data.status.escalate(subtree_status);
                if subtree_executed && !subtree_succeeded {
                    ancestor.data.succeeded = false;
                }
            }
        }
        execution.status = execution.root.data.status;
        Ok(())
    }

    fn exec_node<'a>(
        &'a self,
        node: &'a WorkflowNode,
        parent_scope: Scope,
        ctx: &'a RunCtx,
    ) -> BoxFuture<'a, WorkflowNodeExecution> {
        async move {
            if ctx.cancel.is_cancelled() {
                return skipped_subtree(node);
            }

            let meta = node.step.meta();
            let is_resume_root = ctx.resume_root.as_deref() == Some(node.id.as_str());
            if meta.prompt_type == PromptType::OnClick && !is_resume_root {
                return pending_subtree(node);
            }

            let mut result = WorkflowNodeResult::pending(
                if meta.name.is_empty() { &node.id } else { &meta.name },
                &meta.title,
            );
            result.state = NodeState::Running;
            result.trace(TraceLevel::Info, format!("{} step started", node.step.kind()));

            // Own frame: declared variables visible to this node's templates
            // and to everything below it.
            let scope = parent_scope.child();
            scope.declare(&meta.variables);

            let children = match &node.step {
                Step::If(_) | Step::Switch(_) => {
                    self.exec_branch(node, &scope, &mut result, ctx).await
                }
                _ => {
                    self.exec_leaf(node, &scope, &mut result, ctx).await;
                    if result.state == NodeState::Failed {
                        // A failed node's outputs never materialized, so its
                        // subtree cannot run against them.
                        node.children
                            .iter()
                            .map(|c| (skipped_subtree(c), false))
                            .collect()
                    } else {
                        join_all(
                            node.children
                                .iter()
                                .map(|c| self.exec_node(c, scope.clone(), ctx)),
                        )
                        .await
                        .into_iter()
                        .map(|exec| (exec, true))
                        .collect::<Vec<_>>()
                    }
                }
            };

            // Roll up: severity is the max over self and active children;
            // success requires no active executed child to have failed.
            for (child, active) in &children {
                if *active {
                    result.status = result.status.escalate(child.data.status);
                    if child.data.executed() && !child.data.succeeded {
                        result.succeeded = false;
                    }
                }
                result.children.push(NodeRef {
                    id: child.id.clone(),
                    is_active: *active,
                });
            }

            result.variables = scope.frame_snapshot();
            debug!(node = %node.id, state = %result.state, status = %result.status, "node finished");

            WorkflowNodeExecution {
                id: node.id.clone(),
                data: result,
                children: children.into_iter().map(|(c, _)| c).collect(),
            }
        }
        .boxed()
    }

    /// Run a leaf step's handler under the parallelism bound and record the
    /// outcome on `result`.
    async fn exec_leaf(
        &self,
        node: &WorkflowNode,
        scope: &Scope,
        result: &mut WorkflowNodeResult,
        ctx: &RunCtx,
    ) {
        // Closing the semaphore is not part of this engine, so acquire can
        // only fail if the runtime is tearing down.
        let _permit = match ctx.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                result.state = NodeState::Failed;
                result.status = NodeStatus::Critical;
                result.trace(TraceLevel::Error, "execution slot unavailable");
                return;
            }
        };

        match self
            .executor
            .execute(&node.step, scope, self.limits.node_timeout)
            .await
        {
            Ok(outcome) => {
                result.state = NodeState::Succeeded;
                result.succeeded = true;
                result.status = outcome.status;
                result.message = outcome.message;
                scope.merge(&outcome.runtime_values);
                if !outcome.runtime_values.is_empty() {
                    result.trace(
                        TraceLevel::Info,
                        format!("produced {} runtime value(s)", outcome.runtime_values.len()),
                    );
                }
                result.trace(TraceLevel::Info, "step completed");
            }
            Err(err) => {
                warn!(node = %node.id, error = %err, "step failed");
                result.state = NodeState::Failed;
                result.succeeded = false;
                result.status = NodeStatus::Critical;
                result.message = err.to_string();
                result.trace(TraceLevel::Error, err.to_string());
            }
        }
    }

    /// Evaluate a branch node and run exactly one arm; the others are
    /// recorded inactive and skipped.
    async fn exec_branch(
        &self,
        node: &WorkflowNode,
        scope: &Scope,
        result: &mut WorkflowNodeResult,
        ctx: &RunCtx,
    ) -> Vec<(WorkflowNodeExecution, bool)> {
        let taken: Result<Option<usize>, WorkflowError> = match &node.step {
            Step::If(s) => match Condition::from_if_step(s) {
                // Parse already validated at compile time
                Ok(cond) => self.eval_if(&cond, scope, result),
                Err(err) => Err(WorkflowError::HandlerFailure {
                    message: err.to_string(),
                }),
            },
            Step::Switch(s) => self.eval_switch(node, &s.switch_on_value, scope, result),
            _ => unreachable!("exec_branch called for leaf step"),
        };

        match taken {
            Ok(Some(taken_idx)) => {
                result.state = NodeState::Succeeded;
                result.succeeded = true;
                let mut children = Vec::with_capacity(node.children.len());
                for (idx, child) in node.children.iter().enumerate() {
                    if idx == taken_idx {
                        children.push((self.exec_node(child, scope.clone(), ctx).await, true));
                    } else {
                        children.push((skipped_subtree(child), false));
                    }
                }
                children
            }
            // A switch whose value matched no case activates nothing and is
            // itself skipped with neutral status
            Ok(None) => {
                result.state = NodeState::Skipped;
                result.status = NodeStatus::None;
                node.children
                    .iter()
                    .map(|c| (skipped_subtree(c), false))
                    .collect()
            }
            Err(err) => {
                result.state = NodeState::Failed;
                result.succeeded = false;
                result.status = NodeStatus::Critical;
                result.message = err.to_string();
                result.trace(TraceLevel::Error, err.to_string());
                node.children
                    .iter()
                    .map(|c| (skipped_subtree(c), false))
                    .collect()
            }
        }
    }

    /// First child is the true arm, second the false arm.
    fn eval_if(
        &self,
        cond: &Condition,
        scope: &Scope,
        result: &mut WorkflowNodeResult,
    ) -> Result<Option<usize>, WorkflowError> {
        let left = template::resolve(&cond.left, scope)?;
        let right = template::resolve(&cond.right, scope)?;
        let holds = cond.holds(&left, &right);
        result.message = format!("{} {} {} is {}", left, cond.op, right, holds);
        result.trace(TraceLevel::Info, result.message.clone());
        Ok(Some(if holds { 0 } else { 1 }))
    }

    /// First matching case in declared order wins; a case labelled
    /// "default" matches any value. No match activates nothing.
    fn eval_switch(
        &self,
        node: &WorkflowNode,
        switch_on: &str,
        scope: &Scope,
        result: &mut WorkflowNodeResult,
    ) -> Result<Option<usize>, WorkflowError> {
        let value = template::resolve(switch_on, scope)?;
        let taken = node.children.iter().position(|c| {
            c.step
                .meta()
                .switch_case_value
                .as_deref()
                .map(|case| case == value || case == "default")
                .unwrap_or(false)
        });
        match taken {
            Some(idx) => {
                result.message = format!("'{}' matched case '{}'", value, node.children[idx].id);
                result.trace(TraceLevel::Info, result.message.clone());
            }
            None => {
                result.message = format!("'{}' matched no case", value);
                result.trace(TraceLevel::Warning, result.message.clone());
            }
        }
        Ok(taken)
    }
}

/// Mirror for a subtree that will not run this time. No handlers were
/// invoked, so no traces are recorded; inactive child refs all the way down.
fn skipped_subtree(node: &WorkflowNode) -> WorkflowNodeExecution {
    let meta = node.step.meta();
    let mut data = WorkflowNodeResult::pending(
        if meta.name.is_empty() { &node.id } else { &meta.name },
        &meta.title,
    );
    data.state = NodeState::Skipped;
    let children: Vec<_> = node.children.iter().map(skipped_subtree).collect();
    data.children = children
        .iter()
        .map(|c| NodeRef {
            id: c.id.clone(),
            is_active: false,
        })
        .collect();
    WorkflowNodeExecution {
        id: node.id.clone(),
        data,
        children,
    }
}

/// Mirror for a subtree paused on a user prompt. Nothing ran, so traces
/// stay empty and no child is marked selected; a later resume re-executes
/// the subtree and replaces these records wholesale.
fn pending_subtree(node: &WorkflowNode) -> WorkflowNodeExecution {
    let meta = node.step.meta();
    let mut data = WorkflowNodeResult::pending(
        if meta.name.is_empty() { &node.id } else { &meta.name },
        &meta.title,
    );
    let children: Vec<_> = node.children.iter().map(pending_subtree).collect();
    data.children = children
        .iter()
        .map(|c| NodeRef {
            id: c.id.clone(),
            is_active: false,
        })
        .collect();
    WorkflowNodeExecution {
        id: node.id.clone(),
        data,
        children,
    }
}
