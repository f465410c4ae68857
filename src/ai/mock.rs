use super::{UpstreamResponse, UpstreamService};
use crate::models::GenerationRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned outcome returned by [`MockUpstream`].
#[derive(Debug, Clone)]
enum MockOutcome {
    Response(UpstreamResponse),
    Timeout,
    Failure(String),
}

/// In-memory upstream used by tests and local harnesses.
///
/// Queued outcomes are returned in order and cycle once exhausted.
pub struct MockUpstream {
    outcomes: Arc<Mutex<Vec<MockOutcome>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
    configured: bool,
    delay: Option<Duration>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            configured: true,
            delay: None,
        }
    }

    /// A mock that behaves as if the credential were missing.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn with_response(self, response: UpstreamResponse) -> Self {
        self.push(MockOutcome::Response(response))
    }

    pub fn with_json(self, status: u16, value: serde_json::Value) -> Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.with_response(UpstreamResponse::json(status, value))
    }

    pub fn with_timeout(self) -> Self {
        self.push(MockOutcome::Timeout)
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.push(MockOutcome::Failure(message.to_string()))
    }

    /// Sleep before answering, to exercise cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn received_requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(self, outcome: MockOutcome) -> Self {
        self.outcomes.lock().unwrap().push(outcome);
        self
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamService for MockUpstream {
    fn ensure_ready(&self) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(Error::Configuration("mock upstream has no credential".to_string()))
        }
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<UpstreamResponse> {
        self.ensure_ready()?;

        let outcome = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());

            let outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                None
            } else {
                Some(outcomes[(requests.len() - 1) % outcomes.len()].clone())
            }
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            // Default: a minimal successful text candidate echoing the prompt
            None => Ok(UpstreamResponse::json(
                StatusCode::OK,
                serde_json::json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": format!("Echo: {}", request.prompt) }] }
                    }]
                }),
            )),
            Some(MockOutcome::Response(response)) => Ok(response),
            Some(MockOutcome::Timeout) => Err(Error::Timeout(Duration::from_secs(30))),
            Some(MockOutcome::Failure(message)) => Err(Error::Upstream(message)),
        }
    }
}
