//! Record payload decoding
//!
//! Model output rarely contains bare JSON: payloads arrive wrapped in code
//! fences or surrounded by prose. [`extract_json`] finds the object and the
//! decoders turn it into typed records.

use crate::domain::TopicDraft;

/// Why a record payload could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("record payload is empty")]
    Empty,

    #[error("no JSON object found in record payload")]
    NoJson,

    #[error("invalid record JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turns the raw text between two record markers into a typed record
pub trait RecordDecoder {
    type Output;

    fn decode(&self, raw: &str) -> Result<Self::Output, DecodeError>;
}

/// Locate a JSON object inside free-form model output.
///
/// Tries a ```` ```json ```` fence, then any fence, then the span from the
/// first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }

    if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        // skip a language tag on the fence line
        let body = match body.find('\n') {
            Some(nl) if !body[..nl].contains('{') => &body[nl + 1..],
            _ => body,
        };
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Decodes topic payloads with field defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicDecoder;

impl RecordDecoder for TopicDecoder {
    type Output = TopicDraft;

    fn decode(&self, raw: &str) -> Result<TopicDraft, DecodeError> {
        if raw.trim().is_empty() {
            return Err(DecodeError::Empty);
        }
        let json = extract_json(raw).ok_or(DecodeError::NoJson)?;
        Ok(serde_json::from_str(json)?)
    }
}

/// Decodes payloads into untyped JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValueDecoder;

impl RecordDecoder for JsonValueDecoder {
    type Output = serde_json::Value;

    fn decode(&self, raw: &str) -> Result<serde_json::Value, DecodeError> {
        if raw.trim().is_empty() {
            return Err(DecodeError::Empty);
        }
        let json = extract_json(raw).ok_or(DecodeError::NoJson)?;
        Ok(serde_json::from_str(json)?)
    }
}
