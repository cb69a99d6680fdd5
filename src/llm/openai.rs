//! OpenAI-compatible chat completion client
//!
//! Implements [`LlmClient`] against any endpoint speaking the
//! `/chat/completions` protocol (NVIDIA NIM by default). Streaming goes over
//! SSE via `reqwest-eventsource` with its own reconnect disabled; retries and
//! the deadline are owned by [`resilient_stream`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde_json::Value;

use super::client::{LlmClient, LlmError};
use super::retry::{RetryPolicy, resilient_stream, retry_call};
use super::streaming::{FragmentStream, SsePayload, parse_sse_data};
use super::types::{CompletionRequest, CompletionResponse, Usage};

/// Default provider endpoint
pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

/// Environment variable holding the API key
pub const DEFAULT_API_KEY_ENV: &str = "NVIDIA_API_KEY";

/// Key value shipped in sample configuration; treated as absent
pub const PLACEHOLDER_API_KEY: &str = "your-nvidia-api-key-here";

/// Default model to use
pub const DEFAULT_MODEL: &str = "minimaxai/minimax-m2.1";

const PROGRESS_EVERY: usize = 50;

/// Connection settings for [`OpenAiClient`]
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub default_model: String,
    /// Global deadline for one call, retries included
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProviderSettings {
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Treat blank and placeholder keys as missing
fn usable_key(key: &str) -> Option<&str> {
    let key = key.trim();
    (!key.is_empty() && key != PLACEHOLDER_API_KEY).then_some(key)
}

/// OpenAI-compatible API client
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    settings: ProviderSettings,
}

impl OpenAiClient {
    /// Create a client reading the key from `settings.api_key_env`
    pub fn new(settings: ProviderSettings) -> Result<Self, LlmError> {
        let key = std::env::var(&settings.api_key_env).unwrap_or_default();
        match usable_key(&key) {
            Some(key) => {
                let key = key.to_string();
                Self::with_api_key(key, settings)
            }
            None => Err(LlmError::MissingApiKey {
                env_var: settings.api_key_env.clone(),
            }),
        }
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: impl Into<String>, settings: ProviderSettings) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if usable_key(&api_key).is_none() {
            return Err(LlmError::MissingApiKey {
                env_var: settings.api_key_env.clone(),
            });
        }

        let http = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            settings,
        })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Send a non-streaming request and return the parsed JSON body
    async fn send_request(&self, body: &CompletionRequest) -> Result<Value, LlmError> {
        let response = self
            .http
            .post(self.settings.completions_url())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, text, retry_after));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Parse a non-streaming response body
    fn parse_response(&self, body: Value, requested_model: &str) -> Result<CompletionResponse, LlmError> {
        let message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        let content = message["content"].as_str().unwrap_or_default().to_string();
        let reasoning = message["reasoning_content"]
            .as_str()
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let usage = match body.get("usage") {
            Some(u) => Usage::new(
                u["prompt_tokens"].as_u64().unwrap_or(0),
                u["completion_tokens"].as_u64().unwrap_or(0),
            ),
            None => Usage::default(),
        };

        let model = body["model"].as_str().unwrap_or(requested_model).to_string();

        Ok(CompletionResponse {
            content,
            reasoning,
            model,
            usage,
        })
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a non-success HTTP status onto the error taxonomy
fn status_error(status: u16, body: String, retry_after: Option<Duration>) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth(format!("HTTP {}: {}", status, body)),
        429 => LlmError::RateLimited { retry_after },
        _ => LlmError::ApiError { status, message: body },
    }
}

async fn map_eventsource_error(err: reqwest_eventsource::Error) -> LlmError {
    use reqwest_eventsource::Error;

    match err {
        Error::InvalidStatusCode(status, response) => {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            status_error(status.as_u16(), body, retry_after)
        }
        Error::InvalidContentType(content_type, _) => {
            LlmError::Protocol(format!("unexpected content type {:?}", content_type))
        }
        Error::Transport(e) => LlmError::Transport(e.to_string()),
        Error::StreamEnded => LlmError::Transport("stream ended".to_string()),
        other => LlmError::Transport(other.to_string()),
    }
}

/// Open one SSE connection and wait for the server to accept it
async fn open_event_source(
    http: Client,
    url: String,
    api_key: String,
    body: CompletionRequest,
) -> Result<FragmentStream, LlmError> {
    let mut source: EventSource = http
        .post(&url)
        .bearer_auth(&api_key)
        .header("Accept", "text/event-stream")
        .json(&body)
        .eventsource()
        .map_err(|e| LlmError::InvalidRequest(format!("request body cannot be cloned: {}", e)))?;
    source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

    let pending = match source.next().await {
        Some(Ok(Event::Open)) => None,
        Some(Ok(Event::Message(message))) => Some(message.data),
        Some(Err(e)) => {
            source.close();
            return Err(map_eventsource_error(e).await);
        }
        None => return Err(LlmError::Transport("connection closed before open".to_string())),
    };

    Ok(adapt_event_source(source, body.model, pending))
}

/// Turn SSE messages into fragments, logging progress as it goes
fn adapt_event_source(mut source: EventSource, model: String, pending: Option<String>) -> FragmentStream {
    Box::pin(async_stream::stream! {
        let started = Instant::now();
        let mut fragments: usize = 0;
        let mut pending = pending;

        loop {
            let data = match pending.take() {
                Some(data) => data,
                None => match source.next().await {
                    None => break,
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(message))) => message.data,
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) => break,
                    Some(Err(e)) => {
                        yield Err(map_eventsource_error(e).await);
                        break;
                    }
                },
            };

            match parse_sse_data(&data) {
                Ok(SsePayload::Fragment(fragment)) => {
                    fragments += 1;
                    if fragments == 1 {
                        log::info!("First fragment from {} after {:?}", model, started.elapsed());
                    } else if fragments % PROGRESS_EVERY == 0 {
                        log::debug!("Received {} fragments from {}", fragments, model);
                    }
                    yield Ok(fragment);
                }
                Ok(SsePayload::Empty) => {}
                Ok(SsePayload::Done) => break,
                Err(e) => log::trace!("Skipping malformed payload: {} ({})", data, e),
            }
        }

        source.close();
        log::info!(
            "Stream from {} complete: {} fragments in {:?}",
            model,
            fragments,
            started.elapsed()
        );
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        request.validate()?;
        let request = request.with_stream(false);
        log::info!(
            "Completion request: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let body = retry_call(&self.settings.retry, self.settings.timeout, |_| self.send_request(&request)).await?;
        self.parse_response(body, &request.model)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, LlmError> {
        request.validate()?;
        let request = request.with_stream(true);
        log::info!(
            "Streaming request: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let http = self.http.clone();
        let url = self.settings.completions_url();
        let api_key = self.api_key.clone();

        Ok(resilient_stream(
            self.settings.retry.clone(),
            self.settings.timeout,
            move |attempt| {
                if attempt > 0 {
                    log::debug!("Reconnecting to {} (attempt {})", url, attempt + 1);
                }
                open_event_source(http.clone(), url.clone(), api_key.clone(), request.clone())
            },
        ))
    }

    fn model(&self) -> &str {
        &self.settings.default_model
    }

    fn is_ready(&self) -> bool {
        usable_key(&self.api_key).is_some()
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.default_model)
            .finish()
    }
}
