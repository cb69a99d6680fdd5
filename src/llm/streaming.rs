//! Streaming support for LLM responses.
//!
//! Provides the fragment type handed to the pipeline and the parsing of
//! OpenAI-compatible SSE payloads of the shape
//! `{"choices":[{"delta":{"content"?:..., "reasoning_content"?:...}}]}`.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use super::LlmError;

/// Sentinel prefix marking a fragment as out-of-band reasoning text.
///
/// Reasoning delivered in a separate `reasoning_content` field is tagged with
/// this prefix instead of being wrapped in inline tags, so the classifier can
/// route it without touching its inline scanning state.
pub const REASONING_MARKER: &str = "\u{0}__REASONING__\u{0}";

/// Ordered, finite stream of fragments for one provider call.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, LlmError>> + Send>>;

/// Opaque unit of text delivered by the transport.
///
/// No alignment with token or marker boundaries is guaranteed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment(String);

impl Fragment {
    /// A content fragment (may contain inline reasoning tags)
    pub fn content(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// An out-of-band reasoning fragment
    pub fn reasoning(text: impl AsRef<str>) -> Self {
        Self(format!("{}{}", REASONING_MARKER, text.as_ref()))
    }

    /// Wrap raw transport text as-is
    pub fn raw(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn is_reasoning(&self) -> bool {
        self.0.starts_with(REASONING_MARKER)
    }

    /// Reasoning text without the sentinel, if this is a reasoning fragment
    pub fn reasoning_text(&self) -> Option<&str> {
        self.0.strip_prefix(REASONING_MARKER)
    }

    /// Full fragment text, sentinel included
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// One `data:` payload of a chat completion stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

/// What one SSE payload means for the fragment stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsePayload {
    /// Forward this fragment
    Fragment(Fragment),
    /// Payload carries no text (role header, keep-alive, finish marker)
    Empty,
    /// The literal `[DONE]` terminator
    Done,
}

/// Parse the data of one SSE event.
///
/// Reasoning is checked first: a delta carrying `reasoning_content` yields a
/// reasoning fragment; otherwise `content` yields a content fragment. A payload
/// yields at most one fragment.
pub fn parse_sse_data(data: &str) -> Result<SsePayload, serde_json::Error> {
    let data = data.trim();
    let data = data
        .strip_prefix("data: ")
        .or_else(|| data.strip_prefix("data:"))
        .unwrap_or(data)
        .trim();

    if data.is_empty() {
        return Ok(SsePayload::Empty);
    }
    if data == "[DONE]" {
        return Ok(SsePayload::Done);
    }

    let chunk: ChatChunk = serde_json::from_str(data)?;
    Ok(fragment_from_chunk(chunk).map_or(SsePayload::Empty, SsePayload::Fragment))
}

/// Extract the fragment carried by a parsed chunk, if any
pub fn fragment_from_chunk(chunk: ChatChunk) -> Option<Fragment> {
    let delta = chunk.choices.into_iter().next()?.delta?;
    match (delta.reasoning_content, delta.content) {
        (Some(reasoning), _) if !reasoning.is_empty() => Some(Fragment::reasoning(reasoning)),
        (_, Some(content)) if !content.is_empty() => Some(Fragment::content(content)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_content() {
        let f = Fragment::content("hello");
        assert!(!f.is_reasoning());
        assert_eq!(f.as_str(), "hello");
        assert_eq!(f.reasoning_text(), None);
    }

    #[test]
    fn test_fragment_reasoning() {
        let f = Fragment::reasoning("because");
        assert!(f.is_reasoning());
        assert_eq!(f.reasoning_text(), Some("because"));
        assert!(f.as_str().starts_with(REASONING_MARKER));
    }

    #[test]
    fn test_parse_content_delta() {
        let data = r#"{"id":"x","choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(
            parse_sse_data(data).unwrap(),
            SsePayload::Fragment(Fragment::content("Hello"))
        );
    }

    #[test]
    fn test_parse_reasoning_delta_wins() {
        let data = r#"{"choices":[{"delta":{"reasoning_content":"think","content":"x"}}]}"#;
        assert_eq!(
            parse_sse_data(data).unwrap(),
            SsePayload::Fragment(Fragment::reasoning("think"))
        );
    }

    #[test]
    fn test_parse_null_reasoning_falls_back_to_content() {
        let data = r#"{"choices":[{"delta":{"reasoning_content":null,"content":"x"}}]}"#;
        assert_eq!(
            parse_sse_data(data).unwrap(),
            SsePayload::Fragment(Fragment::content("x"))
        );
    }

    #[test]
    fn test_parse_done() {
        assert_eq!(parse_sse_data("[DONE]").unwrap(), SsePayload::Done);
        assert_eq!(parse_sse_data(" data: [DONE] ").unwrap(), SsePayload::Done);
    }

    #[test]
    fn test_parse_empty_and_role_only() {
        assert_eq!(parse_sse_data("").unwrap(), SsePayload::Empty);
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_data(data).unwrap(), SsePayload::Empty);
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_data(data).unwrap(), SsePayload::Empty);
        assert_eq!(parse_sse_data(r#"{"choices":[]}"#).unwrap(), SsePayload::Empty);
    }

    #[test]
    fn test_parse_strips_data_prefix() {
        let data = r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#;
        assert_eq!(
            parse_sse_data(data).unwrap(),
            SsePayload::Fragment(Fragment::content("hi"))
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_sse_data("not json").is_err());
        assert!(parse_sse_data(r#"{"choices":[{"delta":"#).is_err());
    }
}
