//! Response extraction.
//!
//! Turns an [`UpstreamResponse`] into a [`GenerationResult`]. Every nested
//! field is treated as possibly absent; a malformed body yields a classified
//! failure, never a panic. Extraction is a pure function of its inputs.

use crate::ai::mime;
use crate::ai::types::{Candidate, GenerateContentResponse, GeneratedText, InlineData};
use crate::ai::{UpstreamBody, UpstreamResponse};
use crate::models::{ErrorKind, GenerationResult, Modality};
use base64::Engine as _;
use serde_json::Value;

/// Upper bound on how much of an upstream error body ends up in the log.
const MAX_LOGGED_ERROR_LEN: usize = 512;

pub fn extract(response: &UpstreamResponse, modality: Modality) -> GenerationResult {
    if !response.status.is_success() {
        tracing::error!(
            "Upstream error (status {}): {}",
            response.status,
            describe_upstream_error(&response.body)
        );
        return GenerationResult::failure(ErrorKind::Upstream);
    }

    let payload = match (&response.body, modality) {
        (UpstreamBody::Json(value), Modality::Text) => extract_text(value),
        (UpstreamBody::Json(value), Modality::Image) => extract_inline_image(value),
        (
            UpstreamBody::Binary {
                content_type,
                bytes,
            },
            Modality::Image,
        ) => binary_to_data_uri(content_type.as_deref(), bytes),
        (UpstreamBody::Binary { .. }, Modality::Text) => {
            tracing::warn!("Upstream returned a binary body for a text request");
            None
        }
    };

    match payload {
        Some(payload) => GenerationResult::success(payload),
        None => GenerationResult::failure(ErrorKind::EmptyGeneration),
    }
}

/// Loosely parse a `generateContent` envelope. Shape mismatches (for example
/// `candidates` being a string) are logged and yield `None`.
fn parse_envelope(value: &Value) -> Option<GenerateContentResponse> {
    if !value.is_object() {
        return None;
    }
    match serde_json::from_value::<GenerateContentResponse>(value.clone()) {
        Ok(envelope) => {
            if let Some(reason) = envelope
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.as_deref())
            {
                tracing::warn!("Upstream blocked the prompt: {}", reason);
            }
            Some(envelope)
        }
        Err(e) => {
            tracing::warn!("Upstream response has an unexpected shape: {}", e);
            None
        }
    }
}

fn first_candidate(envelope: &GenerateContentResponse) -> Option<&Candidate> {
    let candidate = envelope.candidates.as_ref()?.first()?;
    if let Some(reason) = candidate.finish_reason.as_deref() {
        tracing::debug!("Candidate finish reason: {}", reason);
    }
    Some(candidate)
}

fn non_blank(text: Option<&String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty()).cloned()
}

/// `candidates[0].content.parts[0].text`, then `candidates[0].output`, then
/// a text-generation array's `[0].generated_text`.
pub fn extract_text(value: &Value) -> Option<String> {
    if value.is_array() {
        return generated_text(value);
    }

    let envelope = parse_envelope(value)?;
    let candidate = first_candidate(&envelope)?;

    candidate
        .content
        .as_ref()
        .and_then(|c| c.parts.as_ref())
        .and_then(|parts| parts.first())
        .and_then(|part| non_blank(part.text.as_ref()))
        .or_else(|| non_blank(candidate.output.as_ref()))
}

fn generated_text(value: &Value) -> Option<String> {
    let first = value.as_array()?.first()?;
    let item: GeneratedText = serde_json::from_value(first.clone()).ok()?;
    non_blank(item.generated_text.as_ref())
}

/// First inline part of `candidates[0]` whose MIME type is `image/*` and
/// whose data is valid base64, as a data URI.
pub fn extract_inline_image(value: &Value) -> Option<String> {
    let envelope = parse_envelope(value)?;
    let parts = first_candidate(&envelope)?
        .content
        .as_ref()?
        .parts
        .as_ref()?;

    parts
        .iter()
        .filter_map(|part| part.inline_data.as_ref())
        .find_map(inline_image_uri)
}

fn inline_image_uri(inline: &InlineData) -> Option<String> {
    let mime_type = inline.mime_type.as_deref()?.trim();
    if !mime_type.to_ascii_lowercase().starts_with("image/") {
        return None;
    }
    let data = inline.data.as_deref()?.trim();
    if data.is_empty() {
        return None;
    }
    if let Err(e) = base64::engine::general_purpose::STANDARD.decode(data) {
        tracing::warn!("Skipping inline {} part with invalid base64: {}", mime_type, e);
        return None;
    }
    Some(data_uri(mime_type, data))
}

/// Raw image body to a data URI. Empty bodies, `text/*` bodies and bodies
/// declared as JSON (which reach here only when they failed to parse) are
/// not images.
fn binary_to_data_uri(content_type: Option<&str>, bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    let declared = content_type.map(mime::essence);
    let mime_type = match declared.as_deref() {
        Some(ct) if ct.starts_with("image/") => ct.to_string(),
        Some(ct) if ct.starts_with("text/") || mime::is_json(ct) => {
            tracing::warn!("Upstream returned {} instead of an image", ct);
            return None;
        }
        _ => mime::detect_image_mime(bytes).to_string(),
    };

    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Some(data_uri(&mime_type, &encoded))
}

fn data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Human-readable summary of an upstream error body, for server logs only.
pub fn describe_upstream_error(body: &UpstreamBody) -> String {
    let text = match body {
        UpstreamBody::Json(value) => json_error_message(value).unwrap_or_else(|| value.to_string()),
        UpstreamBody::Binary { bytes, .. } if bytes.is_empty() => "<empty body>".to_string(),
        UpstreamBody::Binary { bytes, .. } => String::from_utf8_lossy(bytes).into_owned(),
    };
    truncate(text.trim(), MAX_LOGGED_ERROR_LEN)
}

/// `{"error":"..."}`, `{"error":{"message":"..."}}` or `{"message":"..."}`.
fn json_error_message(value: &Value) -> Option<String> {
    let error = value.get("error");
    error
        .and_then(Value::as_str)
        .or_else(|| error.and_then(|e| e.get("message")).and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
