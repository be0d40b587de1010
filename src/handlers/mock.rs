//! Mock clients for testing
//!
//! Return configurable responses without any real backend. Responses queue
//! FIFO; an empty queue falls back to the default response. Every call is
//! recorded for assertions, and an optional delay simulates slow backends
//! for timeout tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ClientResponse, DetectorClient, QueryClient};

struct MockState {
    responses: Mutex<Vec<ClientResponse>>,
    default_response: ClientResponse,
    calls: Arc<Mutex<Vec<String>>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MockState {
    fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            default_response: ClientResponse::success("mock response"),
            calls: Arc::new(Mutex::new(Vec::new())),
            failure: None,
            delay: None,
        }
    }

    async fn respond(&self, input: &str) -> Result<ClientResponse> {
        self.calls.lock().push(input.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        let mut queue = self.responses.lock();
        if queue.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(queue.remove(0))
        }
    }
}

/// Mock detector backend with queued responses
pub struct MockDetectorClient {
    state: MockState,
}

impl MockDetectorClient {
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
        }
    }

    pub fn with_responses(responses: Vec<ClientResponse>) -> Self {
        let client = Self::new();
        *client.state.responses.lock() = responses;
        client
    }

    pub fn with_default(mut self, response: ClientResponse) -> Self {
        self.state.default_response = response;
        self
    }

    /// Make every call fail with this message
    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.state.failure = Some(message.into());
        self
    }

    /// Sleep before responding, for timeout tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.state.delay = Some(delay);
        self
    }

    pub fn queue_response(&self, response: ClientResponse) {
        self.state.responses.lock().push(response);
    }

    /// Detector ids this client was called with, in call order
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    /// Shared handle to the call log, usable after the client moves into
    /// an executor
    pub fn calls_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.state.calls)
    }
}

impl Default for MockDetectorClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DetectorClient for MockDetectorClient {
    async fn run_detector(&self, detector_id: &str) -> Result<ClientResponse> {
        self.state.respond(detector_id).await
    }
}

/// Mock query backend with queued responses
pub struct MockQueryClient {
    state: MockState,
}

impl MockQueryClient {
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
        }
    }

    pub fn with_responses(responses: Vec<ClientResponse>) -> Self {
        let client = Self::new();
        *client.state.responses.lock() = responses;
        client
    }

    pub fn with_default(mut self, response: ClientResponse) -> Self {
        self.state.default_response = response;
        self
    }

    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.state.failure = Some(message.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.state.delay = Some(delay);
        self
    }

    pub fn queue_response(&self, response: ClientResponse) {
        self.state.responses.lock().push(response);
    }

    /// Query texts this client was called with, in call order
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    pub fn calls_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.state.calls)
    }
}

impl Default for MockQueryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryClient for MockQueryClient {
    async fn run_query(&self, query_text: &str) -> Result<ClientResponse> {
        self.state.respond(query_text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::NodeStatus;

    #[tokio::test]
    async fn queued_responses_then_default() {
        let client = MockDetectorClient::with_responses(vec![
            ClientResponse::success("first").with_status(NodeStatus::Warning),
            ClientResponse::success("second"),
        ]);

        let r1 = client.run_detector("d1").await.unwrap();
        let r2 = client.run_detector("d2").await.unwrap();
        let r3 = client.run_detector("d3").await.unwrap();

        assert_eq!(r1.status, NodeStatus::Warning);
        assert_eq!(r2.message, "second");
        assert_eq!(r3.message, "mock response");
        assert_eq!(client.calls(), vec!["d1", "d2", "d3"]);
    }

    #[tokio::test]
    async fn fail_with_makes_every_call_error() {
        let client = MockQueryClient::new().fail_with("store offline");
        let err = client.run_query("Requests | count").await.unwrap_err();
        assert!(err.to_string().contains("store offline"));
        assert_eq!(client.calls(), vec!["Requests | count"]);
    }

    #[tokio::test]
    async fn outputs_flow_through() {
        let client = MockQueryClient::new()
            .with_default(ClientResponse::success("42 rows").with_output("rowCount", "42"));
        let response = client.run_query("q").await.unwrap();
        assert_eq!(response.outputs.get("rowCount").map(String::as_str), Some("42"));
    }
}
