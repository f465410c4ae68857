//! Inbound request validation.
//!
//! Turns an [`InboundRequest`] into a [`GenerationRequest`] without touching
//! the network.

use crate::models::{GenerationRequest, InboundRequest, Modality};
use crate::{Error, Result};
use serde_json::Value;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Validation knobs that depend on the hosting transport.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRules {
    pub default_modality: Modality,
    pub require_json: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            default_modality: Modality::Text,
            require_json: true,
        }
    }
}

/// Validate method, content type and body, in that order.
pub fn validate(request: &InboundRequest, rules: &ValidationRules) -> Result<GenerationRequest> {
    if request.method.trim() != "POST" {
        return Err(Error::MethodNotAllowed(request.method.clone()));
    }

    if rules.require_json && !is_json_content_type(request.content_type.as_deref()) {
        return Err(Error::BadRequest(format!(
            "Content-Type must be {}, got {:?}",
            JSON_MEDIA_TYPE, request.content_type
        )));
    }

    let body: Value = serde_json::from_slice(&request.body)
        .map_err(|e| Error::BadRequest(format!("Body is not valid JSON: {}", e)))?;
    let fields = body
        .as_object()
        .ok_or_else(|| Error::BadRequest("Body must be a JSON object".to_string()))?;

    let prompt = match fields.get("prompt") {
        Some(Value::String(prompt)) if !prompt.trim().is_empty() => prompt.trim().to_string(),
        Some(Value::String(_)) => return Err(Error::BadRequest("Prompt is blank".to_string())),
        Some(_) => return Err(Error::BadRequest("Prompt must be a string".to_string())),
        None => return Err(Error::BadRequest("Prompt is required".to_string())),
    };

    let modality = match fields.get("modality") {
        None | Some(Value::Null) => rules.default_modality,
        Some(Value::String(value)) => value.parse::<Modality>()?,
        Some(_) => return Err(Error::BadRequest("Modality must be a string".to_string())),
    };

    Ok(GenerationRequest {
        prompt,
        modality,
        brand: optional_text(fields.get("brand")),
        tone: optional_text(fields.get("tone")),
    })
}

/// Accepts `application/json` with optional parameters such as `charset`.
fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .map(|media_type| media_type.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
        .unwrap_or(false)
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
