//! Upstream generation provider integration
//!
//! One HTTP client serves every supported provider; the provider only changes
//! the URL, auth header and request envelope.

pub mod client;
pub mod mime;
pub mod mock;
pub mod types;

pub use client::UpstreamClient;
pub use mock::MockUpstream;

use crate::models::GenerationRequest;
use crate::Result;
use async_trait::async_trait;
use reqwest::StatusCode;

/// Body returned by the provider, classified but otherwise untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Json(serde_json::Value),
    Binary {
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn json(status: StatusCode, value: serde_json::Value) -> Self {
        Self {
            status,
            body: UpstreamBody::Json(value),
        }
    }

    pub fn binary(status: StatusCode, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            status,
            body: UpstreamBody::Binary {
                content_type: content_type.map(str::to_string),
                bytes,
            },
        }
    }

    /// Classify a raw body. Anything that is not declared as an image and
    /// parses as JSON is treated as JSON.
    pub fn from_bytes(status: StatusCode, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let is_image = content_type
            .map(|ct| mime::essence(ct).starts_with("image/"))
            .unwrap_or(false);

        if !is_image {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                return Self::json(status, value);
            }
        }

        Self::binary(status, content_type, bytes)
    }
}

#[async_trait]
pub trait UpstreamService: Send + Sync {
    /// Fails with a configuration error when no call could be made, e.g.
    /// because the credential is missing.
    fn ensure_ready(&self) -> Result<()>;

    /// Perform exactly one outbound generation call.
    async fn invoke(&self, request: &GenerationRequest) -> Result<UpstreamResponse>;
}
