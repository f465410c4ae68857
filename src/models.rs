//! Data models and structures
//!
//! Defines the request/result types that flow through the gateway, the
//! caller-facing error taxonomy, and provider configuration.

use crate::{prompts, Error, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TONE: &str = "friendly";

/// Kind of content requested from the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl FromStr for Modality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Modality::Text),
            "image" => Ok(Modality::Image),
            other => Err(Error::BadRequest(format!("Unsupported modality '{}'", other))),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Text => write!(f, "text"),
            Modality::Image => write!(f, "image"),
        }
    }
}

/// Caller-facing error classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    BadRequest,
    MethodNotAllowed,
    Configuration,
    Upstream,
    EmptyGeneration,
    Internal,
}

pub const UPSTREAM_TIMEOUT_MESSAGE: &str =
    "The generation provider did not respond in time. Please try again.";

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Configuration | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Upstream | ErrorKind::EmptyGeneration => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "Bad Request",
            ErrorKind::MethodNotAllowed => "Method Not Allowed",
            ErrorKind::Configuration => "Configuration Error",
            ErrorKind::Upstream => "Upstream Error",
            ErrorKind::EmptyGeneration => "Generation Failed",
            ErrorKind::Internal => "Internal Server Error",
        }
    }

    /// Generic message safe to show to callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => {
                "A non-empty string \"prompt\" is required in a JSON request body."
            }
            ErrorKind::MethodNotAllowed => "This endpoint only accepts POST requests.",
            ErrorKind::Configuration => "The generation service is not configured.",
            ErrorKind::Upstream => "The generation provider returned an error. Please try again.",
            ErrorKind::EmptyGeneration => {
                "The AI model did not return any usable content. Please try rephrasing."
            }
            ErrorKind::Internal => "An unexpected error occurred.",
        }
    }
}

/// Validated generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub modality: Modality,
    pub brand: Option<String>,
    pub tone: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, modality: Modality) -> Self {
        Self {
            prompt: prompt.into(),
            modality,
            brand: None,
            tone: None,
        }
    }

    /// Prompt text as sent upstream, wrapped in the brand template when a
    /// brand was supplied.
    pub fn upstream_prompt(&self) -> String {
        match &self.brand {
            Some(brand) => prompts::render(
                prompts::BRAND_CONTENT,
                &[
                    ("brand", brand),
                    ("tone", self.tone.as_deref().unwrap_or(DEFAULT_TONE)),
                    ("prompt", &self.prompt),
                ],
            ),
            None => self.prompt.clone(),
        }
    }
}

/// Outcome of a single generation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    ok: bool,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl GenerationResult {
    /// A blank payload is not a success and becomes `EmptyGeneration`.
    pub fn success(payload: String) -> Self {
        if payload.trim().is_empty() {
            return Self::failure(ErrorKind::EmptyGeneration);
        }
        Self {
            ok: true,
            payload,
            error_kind: None,
            message: None,
        }
    }

    pub fn failure(kind: ErrorKind) -> Self {
        Self::failure_with_message(kind, kind.public_message())
    }

    pub fn timeout() -> Self {
        Self::failure_with_message(ErrorKind::Upstream, UPSTREAM_TIMEOUT_MESSAGE)
    }

    pub fn from_error(error: &Error) -> Self {
        if error.is_timeout() {
            Self::timeout()
        } else {
            Self::failure(error.kind())
        }
    }

    fn failure_with_message(kind: ErrorKind, message: &str) -> Self {
        Self {
            ok: false,
            payload: String::new(),
            error_kind: Some(kind),
            message: Some(message.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Render into the JSON shape returned to callers.
    pub fn into_response(self, modality: Modality) -> GatewayResponse {
        match self.error_kind {
            None => {
                let key = match modality {
                    Modality::Text => "result",
                    Modality::Image => "image",
                };
                let mut body = serde_json::Map::new();
                body.insert(key.to_string(), serde_json::Value::String(self.payload));
                GatewayResponse {
                    status: StatusCode::OK,
                    body: serde_json::Value::Object(body),
                }
            }
            Some(kind) => GatewayResponse::error(kind, self.message.as_deref()),
        }
    }
}

/// Raw request handed over by the hosting transport.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, content_type: Option<&str>, body: Vec<u8>) -> Self {
        Self {
            method: method.into(),
            content_type: content_type.map(str::to_string),
            body,
        }
    }

    /// POST with an `application/json` body.
    pub fn post_json(body: &serde_json::Value) -> Self {
        Self::new("POST", Some("application/json"), body.to_string().into_bytes())
    }
}

/// Status and JSON body handed back to the hosting transport.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl GatewayResponse {
    pub fn error(kind: ErrorKind, message: Option<&str>) -> Self {
        Self {
            status: kind.status(),
            body: serde_json::json!({
                "error": kind.title(),
                "message": message.unwrap_or_else(|| kind.public_message()),
            }),
        }
    }
}

/// Supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    HuggingFace,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com",
            Provider::HuggingFace => "https://api-inference.huggingface.co",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-1.5-flash",
            Provider::HuggingFace => "stabilityai/stable-diffusion-2",
        }
    }

    pub fn default_modality(&self) -> Modality {
        match self {
            Provider::Gemini => Modality::Text,
            Provider::HuggingFace => Modality::Image,
        }
    }

    /// Provider-specific variable consulted when `GENAI_API_KEY` is unset.
    fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::HuggingFace => "HF_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "huggingface" | "hf" => Ok(Provider::HuggingFace),
            other => Err(Error::Configuration(format!(
                "Unknown provider '{}'. Expected gemini or huggingface",
                other
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::HuggingFace => write!(f, "huggingface"),
        }
    }
}

/// API credential. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Blank values and template placeholders such as `YOUR_API_KEY_HERE`
    /// are not usable.
    pub fn is_usable(&self) -> bool {
        let value = self.0.trim();
        let upper = value.to_ascii_uppercase();
        !value.is_empty() && !upper.starts_with("YOUR_") && !upper.ends_with("_HERE")
    }

    /// Remove every occurrence of the secret from `text`.
    pub fn scrub(&self, text: &str) -> String {
        let secret = self.0.trim();
        if secret.is_empty() {
            text.to_string()
        } else {
            text.replace(secret, "[redacted]")
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([redacted])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

/// Everything needed to reach one upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<Credential>,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            model: provider.default_model().to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(Credential::new(api_key));
        self
    }

    /// `models/`-prefixed IDs are accepted and stored bare.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = model.strip_prefix("models/").unwrap_or(&model).to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The usable credential, or a configuration error.
    pub fn credential(&self) -> Result<&Credential> {
        match &self.api_key {
            Some(key) if key.is_usable() => Ok(key),
            Some(_) => Err(Error::Configuration(format!(
                "API key for {} is blank or a placeholder",
                self.provider
            ))),
            None => Err(Error::Configuration(format!(
                "API key for {} is not set",
                self.provider
            ))),
        }
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub default_modality: Modality,
    pub require_json: bool,
}

impl Config {
    /// Load `.env` (if present) and read configuration from the process
    /// environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("GENAI_PROVIDER") {
            Some(value) => value.parse::<Provider>()?,
            None => Provider::Gemini,
        };

        let mut provider_config = ProviderConfig::new(provider);

        if let Some(key) = get("GENAI_API_KEY").or_else(|| get(provider.api_key_var())) {
            provider_config = provider_config.with_api_key(key);
        }
        if let Some(model) = get("GENAI_MODEL") {
            provider_config = provider_config.with_model(model);
        }
        if let Some(base_url) = get("GENAI_BASE_URL") {
            provider_config = provider_config.with_base_url(base_url);
        }
        if let Some(secs) = get("GENAI_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::Configuration(format!("GENAI_TIMEOUT_SECS '{}' is not a number", secs))
            })?;
            if secs == 0 {
                return Err(Error::Configuration(
                    "GENAI_TIMEOUT_SECS must be greater than zero".to_string(),
                ));
            }
            provider_config = provider_config.with_timeout(Duration::from_secs(secs));
        }

        let default_modality = match get("GENAI_MODALITY") {
            Some(value) => value
                .parse::<Modality>()
                .map_err(|_| Error::Configuration(format!("Unknown GENAI_MODALITY '{}'", value)))?,
            None => provider.default_modality(),
        };

        let require_json = match get("GENAI_REQUIRE_JSON") {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                Error::Configuration(format!("GENAI_REQUIRE_JSON '{}' is not a boolean", value))
            })?,
            None => true,
        };

        Ok(Self {
            provider: provider_config,
            default_modality,
            require_json,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
