//! Streaming roadmap generation.
//!
//! The provider writes a narrative section followed by `TOPIC:` records. The
//! narrative is forwarded as `thinking` events, and every decoded record is
//! stored as a topic and forwarded as a `topic` event. The roadmap draft is
//! created when the first topic arrives.

use std::sync::Arc;

use crate::config::{ModelsConfig, RoadmapConfig};
use crate::domain::{PartialOutput, RoadmapDraft, RoadmapRequest, SessionResult, Topic, TopicDraft};
use crate::error::{NexusError, Result};
use crate::framing::FramedEvent;
use crate::id::generate_session_id;
use crate::llm::{CompletionRequest, LlmClient};
use crate::pipeline::{ExtractEvent, StructuredStreamExtractor, TopicDecoder};
use crate::store::{RoadmapStore, TopicStore};

use super::finalizer::{SessionContext, SessionFinalizer};
use super::handle::{DEFAULT_EVENT_BUFFER, EventSink, EventStreamHandle, PumpEnd, create_event_channel, pump};

/// Per-session roadmap state
struct RoadmapSession {
    request: RoadmapRequest,
    model: String,
    topics: Arc<dyn TopicStore>,
    roadmaps: Arc<dyn RoadmapStore>,
    roadmap_id: Option<String>,
    stored: Vec<Topic>,
}

impl RoadmapSession {
    fn handle(&mut self, events: Vec<ExtractEvent<TopicDraft>>) -> Result<Vec<FramedEvent>> {
        let mut framed = Vec::with_capacity(events.len());
        for event in events {
            match event {
                ExtractEvent::Narrative(text) => framed.push(FramedEvent::thinking(&text)),
                ExtractEvent::Record(record) => {
                    let roadmap_id = self.ensure_draft()?;
                    let topic = self
                        .topics
                        .save(Topic::from_draft(roadmap_id, record.ordinal, record.payload))?;
                    log::debug!("Stored topic {} #{}: {}", topic.id, topic.sequence_order, topic.title());
                    framed.push(FramedEvent::topic(&topic));
                    self.stored.push(topic);
                }
            }
        }
        Ok(framed)
    }

    /// Create the draft on first use
    fn ensure_draft(&mut self) -> Result<String> {
        if let Some(id) = &self.roadmap_id {
            return Ok(id.clone());
        }
        let roadmap = self
            .roadmaps
            .create_draft(RoadmapDraft::from_request(&self.request, &self.model))?;
        log::info!("Created roadmap draft {}: {}", roadmap.id, roadmap.title);
        self.roadmap_id = Some(roadmap.id.clone());
        Ok(roadmap.id)
    }

    fn topic_count(&self) -> u32 {
        u32::try_from(self.stored.len()).unwrap_or(u32::MAX)
    }
}

pub struct RoadmapService {
    client: Arc<dyn LlmClient>,
    topics: Arc<dyn TopicStore>,
    roadmaps: Arc<dyn RoadmapStore>,
    finalizer: Arc<SessionFinalizer>,
    models: ModelsConfig,
    config: RoadmapConfig,
}

impl RoadmapService {
    pub fn new(
        client: Arc<dyn LlmClient>,
        topics: Arc<dyn TopicStore>,
        roadmaps: Arc<dyn RoadmapStore>,
        finalizer: Arc<SessionFinalizer>,
        models: ModelsConfig,
        config: RoadmapConfig,
    ) -> Self {
        Self {
            client,
            topics,
            roadmaps,
            finalizer,
            models,
            config,
        }
    }

    /// Start generating a roadmap for the request
    pub async fn generate(&self, request: RoadmapRequest) -> Result<EventStreamHandle> {
        if request.goal.trim().is_empty() {
            return Err(NexusError::InvalidRequest("goal must not be blank".to_string()));
        }

        let model = self.models.resolve_model_id(Some(request.model.as_str()));
        let completion = self.build_request(&model, &request);
        log::info!("Streaming roadmap for goal {:?} (model: {})", request.goal, model);

        let session_id = generate_session_id();
        let (sink, handle) = create_event_channel(DEFAULT_EVENT_BUFFER, session_id.as_str());
        let client = Arc::clone(&self.client);
        let finalizer = Arc::clone(&self.finalizer);
        let mut session = RoadmapSession {
            request,
            model,
            topics: Arc::clone(&self.topics),
            roadmaps: Arc::clone(&self.roadmaps),
            roadmap_id: None,
            stored: Vec::new(),
        };

        tokio::spawn(async move {
            let result = stream_topics(client, completion, &sink, &mut session).await;
            let ctx = SessionContext::roadmap(
                session_id,
                session.model.as_str(),
                session.roadmap_id.clone(),
                session.topic_count(),
            );
            if let Some(event) = finalizer.finalize(&ctx, result) {
                sink.send_final(event).await;
            }
        });

        Ok(handle)
    }

    fn build_request(&self, model: &str, request: &RoadmapRequest) -> CompletionRequest {
        let prompt = self.config.render_prompt(
            request.goal.trim(),
            or_unspecified(&request.current_level),
            or_unspecified(&request.difficulty),
            request.hours_per_week,
            or_unspecified(&request.learning_style),
        );

        let mut completion = CompletionRequest::new(model)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.models.resolve_max_tokens(Some(model)))
            .with_stream(true);
        if !self.config.system_prompt.trim().is_empty() {
            completion = completion.with_system_message(self.config.system_prompt.as_str());
        }
        completion.with_user_message(prompt)
    }
}

fn or_unspecified(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() { "not specified" } else { value }
}

async fn stream_topics(
    client: Arc<dyn LlmClient>,
    request: CompletionRequest,
    sink: &EventSink,
    session: &mut RoadmapSession,
) -> SessionResult {
    let stream = match client.stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("Failed to open roadmap stream: {}", e);
            return SessionResult::Failed {
                reason: e.to_string(),
                partial: None,
            };
        }
    };

    let mut extractor = StructuredStreamExtractor::new(TopicDecoder);
    let end = pump(stream, sink, |fragment| session.handle(extractor.consume(fragment))).await;

    let end = match end {
        PumpEnd::Finished => match session.handle(extractor.finish()) {
            Ok(events) => {
                for event in events {
                    sink.send(event).await;
                }
                PumpEnd::Finished
            }
            Err(e) => PumpEnd::Failed(e.to_string()),
        },
        other => other,
    };

    if !extractor.skipped().is_empty() {
        log::warn!("Skipped {} undecodable topic records", extractor.skipped().len());
    }

    let partial = || PartialOutput::non_empty("", extractor.narrative());
    match end {
        PumpEnd::Finished => SessionResult::Completed {
            content: String::new(),
            reasoning: Some(extractor.narrative().to_string()).filter(|n| !n.is_empty()),
            records: session.stored.clone(),
        },
        PumpEnd::Failed(reason) => SessionResult::Failed {
            reason,
            partial: partial(),
        },
        PumpEnd::Cancelled => SessionResult::Cancelled { partial: partial() },
    }
}
