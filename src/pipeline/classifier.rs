//! Dual-channel classification of a fragment stream into thinking and content.
//!
//! Two conventions are recognized at once: fragments tagged with
//! [`REASONING_MARKER`](crate::llm::REASONING_MARKER) are reasoning in their
//! entirety, and inline paired tags (`<think>` / `</think>` by default) switch
//! the channel mid-text. Inline tags may be split across any number of
//! fragments; the unmatched tail is carried into the next scan.

use crate::llm::Fragment;

use super::marker::split_partial;

/// Default inline tag opening a reasoning section
pub const DEFAULT_OPEN_TAG: &str = "<think>";

/// Default inline tag closing a reasoning section
pub const DEFAULT_CLOSE_TAG: &str = "</think>";

/// Classifier settings for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub open_tag: String,
    pub close_tag: String,
    /// Start inside reasoning, for providers that omit the opening tag
    pub initial_in_reasoning: bool,
    /// When false, all text is content and reasoning fragments are dropped
    pub thinking_enabled: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            open_tag: DEFAULT_OPEN_TAG.to_string(),
            close_tag: DEFAULT_CLOSE_TAG.to_string(),
            initial_in_reasoning: false,
            thinking_enabled: true,
        }
    }
}

impl ClassifierConfig {
    /// Default tags with thinking switched on or off
    pub fn with_thinking(thinking_enabled: bool) -> Self {
        Self {
            thinking_enabled,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.open_tag = open.into();
        self.close_tag = close.into();
        self
    }

    pub fn starting_in_reasoning(mut self) -> Self {
        self.initial_in_reasoning = true;
        self
    }
}

/// One classified piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    Thinking(String),
    Content(String),
}

impl ClassifiedEvent {
    pub fn text(&self) -> &str {
        match self {
            ClassifiedEvent::Thinking(t) | ClassifiedEvent::Content(t) => t,
        }
    }

    pub fn is_thinking(&self) -> bool {
        matches!(self, ClassifiedEvent::Thinking(_))
    }
}

/// Per-session classifier state
#[derive(Debug)]
pub struct DualChannelClassifier {
    config: ClassifierConfig,
    in_reasoning: bool,
    carry: String,
    thinking: String,
    content: String,
}

impl DualChannelClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let in_reasoning = config.initial_in_reasoning && config.thinking_enabled;
        Self {
            config,
            in_reasoning,
            carry: String::new(),
            thinking: String::new(),
            content: String::new(),
        }
    }

    /// Classify one fragment.
    ///
    /// Always returns at least one event; a fragment that yields no text
    /// produces a single empty content event.
    pub fn consume(&mut self, fragment: &Fragment) -> Vec<ClassifiedEvent> {
        if let Some(reasoning) = fragment.reasoning_text() {
            if !self.config.thinking_enabled {
                return vec![ClassifiedEvent::Content(String::new())];
            }
            self.thinking.push_str(reasoning);
            return vec![ClassifiedEvent::Thinking(reasoning.to_string())];
        }

        if !self.config.thinking_enabled {
            let text = fragment.as_str();
            self.content.push_str(text);
            return vec![ClassifiedEvent::Content(text.to_string())];
        }

        let mut buffer = std::mem::take(&mut self.carry);
        buffer.push_str(fragment.as_str());

        let mut events = Vec::new();
        let mut rest = buffer.as_str();
        let mut after_marker = false;

        loop {
            let awaited = self.awaited_tag().to_string();
            match rest.find(&awaited) {
                Some(pos) => {
                    let segment = &rest[..pos];
                    if !segment.is_empty() {
                        events.push(self.route(segment));
                    } else if after_marker && !self.in_reasoning {
                        events.push(ClassifiedEvent::Content(String::new()));
                    }
                    self.in_reasoning = !self.in_reasoning;
                    rest = &rest[pos + awaited.len()..];
                    after_marker = true;
                }
                None => {
                    let (settled, held) = split_partial(rest, &awaited);
                    if !settled.is_empty() {
                        events.push(self.route(settled));
                    }
                    self.carry = held.to_string();
                    break;
                }
            }
        }

        if events.is_empty() {
            events.push(ClassifiedEvent::Content(String::new()));
        }
        events
    }

    /// Flush the carry-over as literal text of the active channel
    pub fn finish(&mut self) -> Vec<ClassifiedEvent> {
        if self.carry.is_empty() {
            return Vec::new();
        }
        let carry = std::mem::take(&mut self.carry);
        vec![self.route(&carry)]
    }

    /// Accumulated reasoning text
    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    /// Accumulated content text
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_in_reasoning(&self) -> bool {
        self.in_reasoning
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn awaited_tag(&self) -> &str {
        if self.in_reasoning {
            &self.config.close_tag
        } else {
            &self.config.open_tag
        }
    }

    fn route(&mut self, text: &str) -> ClassifiedEvent {
        if self.in_reasoning {
            self.thinking.push_str(text);
            ClassifiedEvent::Thinking(text.to_string())
        } else {
            self.content.push_str(text);
            ClassifiedEvent::Content(text.to_string())
        }
    }
}

impl Default for DualChannelClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

/// Remove leftover reasoning tags from final content.
///
/// A closed pair is removed together with its inner text, which becomes the
/// thinking when none was accumulated. A stray open tag splits content into
/// what precedes it (content) and what follows it (thinking). Stray close
/// tags are dropped.
pub fn strip_reasoning_artifacts(content: &str, thinking: &str, open: &str, close: &str) -> (String, String) {
    let mut content = content.to_string();
    let mut thinking = thinking.to_string();

    while let Some(start) = content.find(open) {
        let inner_start = start + open.len();
        match content[inner_start..].find(close) {
            Some(rel) => {
                let inner_end = inner_start + rel;
                if thinking.trim().is_empty() {
                    thinking = content[inner_start..inner_end].trim().to_string();
                }
                content.replace_range(start..inner_end + close.len(), "");
            }
            None => {
                let after = content[inner_start..].trim().to_string();
                if thinking.trim().is_empty() {
                    thinking = after;
                } else if !after.is_empty() {
                    thinking.push_str(&after);
                }
                content.truncate(start);
                break;
            }
        }
    }

    let content = content.replace(close, "");
    (content.trim().to_string(), thinking)
}
