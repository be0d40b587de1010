//! Step handlers
//!
//! Leaf steps delegate their actual work to injected clients behind async
//! traits, so the engine never knows how a detector call or a query is
//! transported. The [`StepExecutor`] resolves templates, dispatches to the
//! right client, enforces the per-node timeout, and normalizes everything
//! into a [`HandlerOutcome`] the interpreter can record.

mod mock;

pub use mock::{MockDetectorClient, MockQueryClient};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::instrument;

use crate::binding::Scope;
use crate::error::WorkflowError;
use crate::status::NodeStatus;
use crate::template;
use crate::workflow::{DetectorStep, MarkdownStep, QueryStep, Step};

/// What a client produced for one invocation
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: NodeStatus,
    pub message: String,
    /// Named values the step exposes to its subtree
    pub outputs: HashMap<String, String>,
}

impl ClientResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Success,
            message: message.into(),
            outputs: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }
}

/// Executes detector steps against whatever diagnostic backend is wired in
#[async_trait]
pub trait DetectorClient: Send + Sync {
    async fn run_detector(&self, detector_id: &str) -> Result<ClientResponse>;
}

/// Executes query steps against a telemetry store
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn run_query(&self, query_text: &str) -> Result<ClientResponse>;
}

/// Normalized result of running one leaf step
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub status: NodeStatus,
    pub message: String,
    /// Values to merge into the node's scope frame
    pub runtime_values: HashMap<String, String>,
}

/// Dispatches leaf steps to their clients with template resolution. The
/// caller supplies the per-invocation timeout so run limits stay in one
/// place.
pub struct StepExecutor {
    detector: Arc<dyn DetectorClient>,
    query: Arc<dyn QueryClient>,
}

impl StepExecutor {
    pub fn new(detector: Arc<dyn DetectorClient>, query: Arc<dyn QueryClient>) -> Self {
        Self { detector, query }
    }

    /// Run a leaf step. Branch steps carry no handler and are routed by the
    /// interpreter before reaching here.
    pub async fn execute(
        &self,
        step: &Step,
        scope: &Scope,
        timeout: Duration,
    ) -> Result<HandlerOutcome, WorkflowError> {
        match step {
            Step::Detector(s) => self.run_detector(s, scope, timeout).await,
            Step::KustoQuery(s) => self.run_query(s, scope, timeout).await,
            Step::Markdown(s) => self.render_markdown(s, scope),
            Step::If(_) | Step::Switch(_) => Err(WorkflowError::HandlerFailure {
                message: format!("step kind '{}' has no handler", step.kind()),
            }),
        }
    }

    #[instrument(skip_all, fields(detector = %step.detector_id))]
    async fn run_detector(
        &self,
        step: &DetectorStep,
        scope: &Scope,
        timeout: Duration,
    ) -> Result<HandlerOutcome, WorkflowError> {
        let detector_id = template::resolve(&step.detector_id, scope)?;
        let call = self.detector.run_detector(&detector_id);
        let response = await_client(call, timeout).await?;
        Ok(outcome(response))
    }

    #[instrument(skip_all)]
    async fn run_query(
        &self,
        step: &QueryStep,
        scope: &Scope,
        timeout: Duration,
    ) -> Result<HandlerOutcome, WorkflowError> {
        let query_text = template::resolve(&step.query_text, scope)?;
        let call = self.query.run_query(&query_text);
        let response = await_client(call, timeout).await?;
        Ok(outcome(response))
    }

    /// Markdown renders locally; no client, no timeout. Rendered content is
    /// informational, never a health verdict.
    fn render_markdown(
        &self,
        step: &MarkdownStep,
        scope: &Scope,
    ) -> Result<HandlerOutcome, WorkflowError> {
        let rendered = template::resolve(&step.markdown_text, scope)?;
        Ok(HandlerOutcome {
            status: NodeStatus::Info,
            message: rendered,
            runtime_values: HashMap::new(),
        })
    }

}

async fn await_client(
    call: impl std::future::Future<Output = Result<ClientResponse>>,
    timeout: Duration,
) -> Result<ClientResponse, WorkflowError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => Err(WorkflowError::HandlerFailure {
            message: err.to_string(),
        }),
        Err(_) => Err(WorkflowError::HandlerTimeout {
            seconds: timeout.as_secs(),
        }),
    }
}

fn outcome(response: ClientResponse) -> HandlerOutcome {
    HandlerOutcome {
        status: response.status,
        message: response.message,
        runtime_values: response.outputs,
    }
}
