//! Request pipeline: validation, one upstream call, extraction.

use crate::ai::{UpstreamClient, UpstreamService};
use crate::extract::extract;
use crate::models::{
    Config, ErrorKind, GatewayResponse, GenerationRequest, GenerationResult, InboundRequest,
    Modality,
};
use crate::validate::{validate, ValidationRules};
use std::fmt;
use std::future::Future;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Lifecycle of one request. Nothing is retained between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validating,
    Invoking,
    Extracting,
    Succeeded,
    Failed(ErrorKind),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Received => write!(f, "received"),
            Stage::Validating => write!(f, "validating"),
            Stage::Invoking => write!(f, "invoking"),
            Stage::Extracting => write!(f, "extracting"),
            Stage::Succeeded => write!(f, "succeeded"),
            Stage::Failed(kind) => write!(f, "failed({:?})", kind),
        }
    }
}

/// Stateless gateway in front of a single upstream provider.
///
/// Safe to share across tasks; each call is independent.
pub struct Gateway {
    upstream: Box<dyn UpstreamService>,
    rules: ValidationRules,
}

impl Gateway {
    pub fn new(upstream: Box<dyn UpstreamService>, rules: ValidationRules) -> Self {
        Self { upstream, rules }
    }

    /// Build a gateway backed by the HTTP client for the configured provider.
    ///
    /// A missing credential is not an error here; it is reported per request
    /// as a configuration failure.
    pub fn from_config(config: &Config) -> Self {
        info!(
            "Generation provider: {} (model: {}, timeout: {:?})",
            config.provider.provider, config.provider.model, config.provider.timeout
        );
        if let Err(e) = config.provider.credential() {
            warn!("{}", e);
        }

        Self::new(
            Box::new(UpstreamClient::new(config.provider.clone())),
            ValidationRules {
                default_modality: config.default_modality,
                require_json: config.require_json,
            },
        )
    }

    /// Run the full pipeline and render the caller-facing response.
    pub async fn handle(&self, inbound: &InboundRequest) -> GatewayResponse {
        let span = tracing::info_span!("generation", request_id = %Uuid::new_v4());
        async move {
            let (modality, result) = self.process(inbound).await;
            result.into_response(modality)
        }
        .instrument(span)
        .await
    }

    /// Like [`Gateway::handle`], but gives up as soon as `cancelled`
    /// completes. Dropping the pipeline aborts any in-flight upstream call.
    pub async fn handle_until<F>(
        &self,
        inbound: &InboundRequest,
        cancelled: F,
    ) -> Option<GatewayResponse>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            response = self.handle(inbound) => Some(response),
            _ = cancelled => {
                warn!("Caller went away, abandoning generation request");
                None
            }
        }
    }

    /// Validate an inbound request and generate. Returns the modality used to
    /// shape the response alongside the result.
    pub async fn process(&self, inbound: &InboundRequest) -> (Modality, GenerationResult) {
        transition(Stage::Received);
        transition(Stage::Validating);

        let request = match validate(inbound, &self.rules) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected request: {}", e);
                let result = GenerationResult::from_error(&e);
                transition(Stage::Failed(e.kind()));
                return (self.rules.default_modality, result);
            }
        };

        (request.modality, self.generate(&request).await)
    }

    /// Generate for an already validated request.
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        if let Err(e) = self.upstream.ensure_ready() {
            error!("Refusing to call upstream: {}", e);
            transition(Stage::Failed(e.kind()));
            return GenerationResult::from_error(&e);
        }

        transition(Stage::Invoking);
        let response = match self.upstream.invoke(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("Upstream call failed: {}", e);
                transition(Stage::Failed(e.kind()));
                return GenerationResult::from_error(&e);
            }
        };

        transition(Stage::Extracting);
        let result = extract(&response, request.modality);

        match result.error_kind() {
            None => {
                info!(
                    "Generated {} payload ({} chars)",
                    request.modality,
                    result.payload().len()
                );
                transition(Stage::Succeeded);
            }
            Some(kind) => {
                warn!("Generation produced no usable {} content", request.modality);
                transition(Stage::Failed(kind));
            }
        }

        result
    }
}

fn transition(stage: Stage) {
    debug!(stage = %stage, "Pipeline stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockUpstream, UpstreamResponse};
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn gateway(mock: MockUpstream) -> Gateway {
        Gateway::new(Box::new(mock), ValidationRules::default())
    }

    /// Shares one mock between the gateway and the test for call counting.
    struct Shared(Arc<MockUpstream>);

    #[async_trait::async_trait]
    impl UpstreamService for Shared {
        fn ensure_ready(&self) -> crate::Result<()> {
            self.0.ensure_ready()
        }

        async fn invoke(&self, request: &GenerationRequest) -> crate::Result<UpstreamResponse> {
            self.0.invoke(request).await
        }
    }

    fn shared_gateway(mock: MockUpstream) -> (Gateway, Arc<MockUpstream>) {
        let mock = Arc::new(mock);
        (
            Gateway::new(Box::new(Shared(mock.clone())), ValidationRules::default()),
            mock,
        )
    }

    #[tokio::test]
    async fn test_text_success() {
        let gateway = gateway(MockUpstream::new().with_json(
            200,
            json!({ "candidates": [{ "content": { "parts": [{ "text": "hello" }] } }] }),
        ));

        let response = gateway
            .handle(&InboundRequest::post_json(&json!({ "prompt": "greet me" })))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!({ "result": "hello" }));
    }

    #[tokio::test]
    async fn test_validation_failures_make_no_call() {
        let (gateway, mock) = shared_gateway(MockUpstream::new());

        let get = InboundRequest::new("GET", None, Vec::new());
        assert_eq!(gateway.handle(&get).await.status, StatusCode::METHOD_NOT_ALLOWED);

        let blank = InboundRequest::post_json(&json!({ "prompt": "   " }));
        assert_eq!(gateway.handle(&blank).await.status, StatusCode::BAD_REQUEST);

        assert_eq!(mock.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_upstream_is_configuration_error() {
        let (gateway, mock) = shared_gateway(MockUpstream::unconfigured());

        let (_, result) = gateway
            .process(&InboundRequest::post_json(&json!({ "prompt": "hi" })))
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::Configuration));
        assert_eq!(mock.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_error() {
        let gateway = gateway(MockUpstream::new().with_timeout());

        let response = gateway
            .handle(&InboundRequest::post_json(&json!({ "prompt": "hi" })))
            .await;

        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(response.body["error"], "Upstream Error");
        assert_eq!(
            response.body["message"],
            crate::models::UPSTREAM_TIMEOUT_MESSAGE
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_echoed() {
        let gateway = gateway(MockUpstream::new().with_failure("connection reset by 10.0.0.7"));

        let response = gateway
            .handle(&InboundRequest::post_json(&json!({ "prompt": "hi" })))
            .await;

        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert!(!response.body.to_string().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_image_modality_response_key() {
        let gateway = gateway(MockUpstream::new().with_json(
            200,
            json!({
                "candidates": [{
                    "content": {
                        "parts": [{ "inlineData": { "mimeType": "image/png", "data": "QQ==" } }]
                    }
                }]
            }),
        ));

        let response = gateway
            .handle(&InboundRequest::post_json(
                &json!({ "prompt": "a cat", "modality": "image" }),
            ))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!({ "image": "data:image/png;base64,QQ==" }));
    }

    #[tokio::test]
    async fn test_upstream_receives_validated_request() {
        let (gateway, mock) = shared_gateway(MockUpstream::new());

        gateway
            .handle(&InboundRequest::post_json(
                &json!({ "prompt": "  posts  ", "brand": "Acme", "tone": "bold" }),
            ))
            .await;

        let received = mock.received_requests();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].prompt, "posts");
        assert_eq!(received[0].brand.as_deref(), Some("Acme"));
        assert_eq!(received[0].tone.as_deref(), Some("bold"));
    }

    #[tokio::test]
    async fn test_cancellation_abandons_call() {
        let gateway = gateway(MockUpstream::new().with_delay(Duration::from_secs(30)));

        let started = std::time::Instant::now();
        let response = gateway
            .handle_until(
                &InboundRequest::post_json(&json!({ "prompt": "slow" })),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await;

        assert!(response.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_handle_until_completes_when_not_cancelled() {
        let gateway = gateway(MockUpstream::new());

        let response = gateway
            .handle_until(
                &InboundRequest::post_json(&json!({ "prompt": "fast" })),
                std::future::pending::<()>(),
            )
            .await
            .unwrap();

        assert_eq!(response.body, json!({ "result": "Echo: fast" }));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Invoking.to_string(), "invoking");
        assert_eq!(
            Stage::Failed(ErrorKind::EmptyGeneration).to_string(),
            "failed(EmptyGeneration)"
        );
    }
}
