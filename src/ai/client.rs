use super::types::{
    GenerateContentRequest, GenerationConfig, InferenceRequest, RequestContent, TextPart,
};
use super::{UpstreamResponse, UpstreamService};
use crate::models::{Credential, GenerationRequest, Modality, Provider, ProviderConfig};
use crate::{prompts, Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};

/// HTTP client for the configured generation provider.
///
/// Makes a single attempt per call; there is no retry loop.
pub struct UpstreamClient {
    client: Client,
    config: ProviderConfig,
}

impl UpstreamClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self::new_with_client(config, Client::new())
    }

    pub fn new_with_client(config: ProviderConfig, client: Client) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        match self.config.provider {
            Provider::Gemini => format!(
                "{}/v1beta/models/{}:generateContent",
                self.config.base_url, self.config.model
            ),
            Provider::HuggingFace => {
                format!("{}/models/{}", self.config.base_url, self.config.model)
            }
        }
    }

    fn build_request(
        &self,
        url: &str,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> RequestBuilder {
        let prompt = request.upstream_prompt();
        let builder = self.client.post(url).timeout(self.config.timeout);

        match self.config.provider {
            Provider::Gemini => builder
                .header("x-goog-api-key", credential.expose())
                .json(&gemini_request(prompt, request.modality)),
            Provider::HuggingFace => builder
                .bearer_auth(credential.expose())
                .json(&InferenceRequest { inputs: prompt }),
        }
    }

    fn transport_error(&self, credential: &Credential, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            tracing::warn!(
                "{} request timed out after {:?}",
                self.config.provider,
                self.config.timeout
            );
            return Error::Timeout(self.config.timeout);
        }

        let detail = credential.scrub(&error.to_string());
        tracing::error!(
            "Failed to send request to {}: {}",
            self.config.provider,
            detail
        );
        Error::Upstream(detail)
    }
}

fn gemini_request(prompt: String, modality: Modality) -> GenerateContentRequest {
    let mut parts = vec![TextPart { text: prompt }];
    let generation_config = match modality {
        Modality::Text => None,
        Modality::Image => {
            parts.push(TextPart {
                text: prompts::IMAGE_INSTRUCTION.trim().to_string(),
            });
            Some(GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            })
        }
    };

    GenerateContentRequest {
        contents: vec![RequestContent {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config,
    }
}

#[async_trait]
impl UpstreamService for UpstreamClient {
    fn ensure_ready(&self) -> Result<()> {
        self.config.credential().map(|_| ())
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<UpstreamResponse> {
        let credential = self.config.credential()?;
        let url = self.endpoint();

        tracing::debug!(
            provider = %self.config.provider,
            model = %self.config.model,
            modality = %request.modality,
            url = %url,
            "Sending generation request"
        );

        let response = self
            .build_request(&url, credential, request)
            .send()
            .await
            .map_err(|e| self.transport_error(credential, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(credential, e))?;

        let body = if status.is_success() {
            tracing::info!(
                "{} responded with status {} ({} bytes)",
                self.config.provider,
                status,
                bytes.len()
            );
            bytes.to_vec()
        } else {
            tracing::warn!(
                "{} responded with status {}",
                self.config.provider,
                status
            );
            // Error bodies only feed the server log; providers sometimes echo the key.
            credential
                .scrub(&String::from_utf8_lossy(&bytes))
                .into_bytes()
        };

        Ok(UpstreamResponse::from_bytes(
            status,
            content_type.as_deref(),
            body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::UpstreamBody;
    use crate::models::ErrorKind;
    use reqwest::StatusCode;
    use std::time::Duration;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GEMINI_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

    fn gemini(server: &MockServer) -> ProviderConfig {
        ProviderConfig::new(Provider::Gemini)
            .with_api_key("test-key")
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_gemini_text_request_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_json(serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "say hi" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "hi" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = UpstreamClient::new(gemini(&server));
        let response = client
            .invoke(&GenerationRequest::new("say hi", Modality::Text))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert!(matches!(response.body, UpstreamBody::Json(_)));
    }

    #[tokio::test]
    async fn test_gemini_image_request_asks_for_image_modality() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .and(body_string_contains("\"responseModalities\":[\"TEXT\",\"IMAGE\"]"))
            .and(body_string_contains("visually represents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = UpstreamClient::new(gemini(&server));
        client
            .invoke(&GenerationRequest::new("a lighthouse", Modality::Image))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_key_is_not_sent_in_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(gemini(&server));
        client
            .invoke(&GenerationRequest::new("x", Modality::Text))
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].url.as_str().contains("test-key"));
    }

    #[tokio::test]
    async fn test_huggingface_binary_response() {
        let server = MockServer::start().await;
        let png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];

        Mock::given(method("POST"))
            .and(path("/models/stabilityai/stable-diffusion-2"))
            .and(header("authorization", "Bearer hf_token"))
            .and(body_json(serde_json::json!({ "inputs": "a fox" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(png.clone(), "image/png"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = ProviderConfig::new(Provider::HuggingFace)
            .with_api_key("hf_token")
            .with_base_url(server.uri());
        let response = UpstreamClient::new(config)
            .invoke(&GenerationRequest::new("a fox", Modality::Image))
            .await
            .unwrap();

        assert_eq!(
            response.body,
            UpstreamBody::Binary {
                content_type: Some("image/png".to_string()),
                bytes: png,
            }
        );
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({ "error": "quota exceeded" })),
            )
            .mount(&server)
            .await;

        let response = UpstreamClient::new(gemini(&server))
            .invoke(&GenerationRequest::new("x", Modality::Text))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_error_body_has_credential_scrubbed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "error": "Invalid token: hf_SECRET123" })),
            )
            .mount(&server)
            .await;

        let config = ProviderConfig::new(Provider::HuggingFace)
            .with_api_key("hf_SECRET123")
            .with_base_url(server.uri());
        let response = UpstreamClient::new(config)
            .invoke(&GenerationRequest::new("a fox", Modality::Image))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.body,
            UpstreamBody::Json(serde_json::json!({ "error": "Invalid token: [redacted]" }))
        );
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_call() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = UpstreamClient::new(
            ProviderConfig::new(Provider::Gemini).with_base_url(server.uri()),
        );

        assert!(matches!(client.ensure_ready(), Err(Error::Configuration(_))));
        let err = client
            .invoke(&GenerationRequest::new("x", Modality::Text))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client =
            UpstreamClient::new(gemini(&server).with_timeout(Duration::from_millis(100)));
        let err = client
            .invoke(&GenerationRequest::new("x", Modality::Text))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn test_connection_failure_is_upstream_error() {
        let config = ProviderConfig::new(Provider::Gemini)
            .with_api_key("test-key")
            .with_base_url("http://127.0.0.1:1");

        let err = UpstreamClient::new(config)
            .invoke(&GenerationRequest::new("x", Modality::Text))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upstream(_)));
        assert!(!err.to_string().contains("test-key"));
    }
}
