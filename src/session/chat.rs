//! Streaming chat sessions.
//!
//! A chat message becomes one provider stream whose fragments are split into
//! `thinking` and `content` events. The stream opens with a `session` event
//! carrying the conversation id and always ends with one `done` or `error`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ChatConfig, ModelsConfig};
use crate::domain::{Conversation, PartialOutput, SessionResult, Turn};
use crate::error::{NexusError, Result};
use crate::framing::FramedEvent;
use crate::id::generate_session_id;
use crate::llm::{CompletionRequest, LlmClient, Message, Role};
use crate::pipeline::{
    ClassifiedEvent, ClassifierConfig, DEFAULT_CLOSE_TAG, DEFAULT_OPEN_TAG, DualChannelClassifier,
    strip_reasoning_artifacts,
};
use crate::store::{ConversationStore, TurnStore};

use super::finalizer::{SessionContext, SessionFinalizer};
use super::handle::{DEFAULT_EVENT_BUFFER, EventSink, EventStreamHandle, PumpEnd, create_event_channel, pump};

/// A user message to send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,

    /// Conversation to continue; None starts a new one
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Model id; blank or unknown selects the default
    #[serde(default)]
    pub model: Option<String>,

    /// Ask for reasoning; honored only by models that support it
    #[serde(default)]
    pub thinking: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_thinking(mut self, thinking: bool) -> Self {
        self.thinking = thinking;
        self
    }
}

pub struct ChatService {
    client: Arc<dyn LlmClient>,
    turns: Arc<dyn TurnStore>,
    conversations: Arc<dyn ConversationStore>,
    finalizer: Arc<SessionFinalizer>,
    models: ModelsConfig,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        client: Arc<dyn LlmClient>,
        turns: Arc<dyn TurnStore>,
        conversations: Arc<dyn ConversationStore>,
        finalizer: Arc<SessionFinalizer>,
        models: ModelsConfig,
        config: ChatConfig,
    ) -> Self {
        Self {
            client,
            turns,
            conversations,
            finalizer,
            models,
            config,
        }
    }

    /// Persist the user turn and start streaming the reply.
    ///
    /// Errors here mean nothing was streamed: a blank message, an unknown
    /// conversation, or a store failure.
    pub async fn send_message(&self, request: ChatRequest) -> Result<EventStreamHandle> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(NexusError::InvalidRequest("message must not be blank".to_string()));
        }

        let model = self.models.resolve_model_id(request.model.as_deref());
        let thinking = request.thinking && self.models.supports_thinking(&model);

        let (conversation, is_new) = match &request.conversation_id {
            Some(id) => {
                let conversation = self
                    .conversations
                    .get(id)?
                    .ok_or_else(|| NexusError::NotFound(format!("conversation {}", id)))?;
                (conversation, false)
            }
            None => {
                let conversation = Conversation::new(message, model.as_str(), self.config.title_max_chars);
                self.conversations.create(&conversation)?;
                log::info!("Created conversation {}: {}", conversation.id, conversation.title);
                (conversation, true)
            }
        };

        let history = self.turns.find_history(&conversation.id)?;
        self.turns.save(&Turn::user(&conversation.id, message))?;
        self.conversations.record_activity(&conversation.id, 1)?;

        let completion = self.build_request(&model, &history, message);
        log::info!(
            "Streaming chat for conversation {} (model: {}, messages: {}, thinking: {})",
            conversation.id,
            model,
            completion.messages.len(),
            thinking
        );

        let session_id = generate_session_id();
        let (sink, handle) = create_event_channel(DEFAULT_EVENT_BUFFER, session_id.as_str());
        let client = Arc::clone(&self.client);
        let finalizer = Arc::clone(&self.finalizer);

        tokio::spawn(async move {
            let result = if sink.send(FramedEvent::session(&conversation.id, is_new)).await {
                stream_reply(client, completion, &sink, thinking).await
            } else {
                SessionResult::Cancelled { partial: None }
            };

            let ctx = SessionContext::chat(session_id, conversation.id, model);
            if let Some(event) = finalizer.finalize(&ctx, result) {
                sink.send_final(event).await;
            }
        });

        Ok(handle)
    }

    /// System prompt, prior turns, then the new message
    fn build_request(&self, model: &str, history: &[Turn], message: &str) -> CompletionRequest {
        let mut request = CompletionRequest::new(model)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.models.resolve_max_tokens(Some(model)))
            .with_stream(true);

        if !self.config.system_prompt.trim().is_empty() {
            request = request.with_system_message(self.config.system_prompt.as_str());
        }

        for turn in history {
            if let Some(message) = history_message(turn) {
                request = request.with_message(message);
            }
        }

        request.with_user_message(message)
    }
}

/// Replay form of a stored turn; blank turns are dropped
fn history_message(turn: &Turn) -> Option<Message> {
    let content = match turn.role {
        Role::Assistant => strip_reasoning_artifacts(&turn.content, "", DEFAULT_OPEN_TAG, DEFAULT_CLOSE_TAG).0,
        _ => turn.content.clone(),
    };
    if content.trim().is_empty() {
        return None;
    }
    Some(Message {
        role: turn.role,
        content,
    })
}

fn to_framed(event: ClassifiedEvent) -> FramedEvent {
    match event {
        ClassifiedEvent::Thinking(text) => FramedEvent::thinking(&text),
        ClassifiedEvent::Content(text) => FramedEvent::content(&text),
    }
}

async fn stream_reply(
    client: Arc<dyn LlmClient>,
    request: CompletionRequest,
    sink: &EventSink,
    thinking: bool,
) -> SessionResult {
    let stream = match client.stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("Failed to open chat stream: {}", e);
            return SessionResult::Failed {
                reason: e.to_string(),
                partial: None,
            };
        }
    };

    let mut classifier = DualChannelClassifier::new(ClassifierConfig::with_thinking(thinking));
    let end = pump(stream, sink, |fragment| {
        Ok(classifier.consume(fragment).into_iter().map(to_framed).collect())
    })
    .await;

    match end {
        PumpEnd::Finished => {
            for event in classifier.finish() {
                sink.send(to_framed(event)).await;
            }
            let reasoning = classifier.thinking();
            SessionResult::Completed {
                content: classifier.content().to_string(),
                reasoning: (!reasoning.is_empty()).then(|| reasoning.to_string()),
                records: Vec::new(),
            }
        }
        PumpEnd::Failed(reason) => {
            // Held-back text is part of what was received
            classifier.finish();
            SessionResult::Failed {
                reason,
                partial: PartialOutput::non_empty(classifier.content(), classifier.thinking()),
            }
        }
        PumpEnd::Cancelled => {
            classifier.finish();
            SessionResult::Cancelled {
                partial: PartialOutput::non_empty(classifier.content(), classifier.thinking()),
            }
        }
    }
}
