//! Core LLM client trait, error taxonomy and a scripted mock client

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::retry::{RetryPolicy, resilient_stream};
use super::streaming::{Fragment, FragmentStream};
use super::types::{CompletionRequest, CompletionResponse};

/// Stateless LLM client - each call is independent
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request (returns once the full response is available)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion: an ordered, finite, non-restartable fragment stream
    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, LlmError>;

    /// Default model used when a request names none
    fn model(&self) -> &str;

    /// Whether the client has credentials to make calls
    fn is_ready(&self) -> bool;
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Deadline of {limit:?} exceeded after {fragments} fragments")]
    Timeout { limit: Duration, fragments: usize },

    #[error("Upstream protocol error: {0}")]
    Protocol(String),

    #[error("Stream failed after {fragments} fragments: {source}")]
    MidStream {
        fragments: usize,
        #[source]
        source: Box<LlmError>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl LlmError {
    pub fn is_auth(&self) -> bool {
        matches!(self, LlmError::Auth(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout { .. })
    }

    /// Whether a failure before any output may be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::MissingApiKey { .. } => false,
            LlmError::InvalidRequest(_) => false,
            LlmError::Auth(_) => false,
            LlmError::Timeout { .. } => false,
            LlmError::Protocol(_) => false,
            LlmError::MidStream { .. } => false,
            LlmError::InvalidResponse(_) => false,
            LlmError::JsonError(_) => false,
        }
    }
}

/// One scripted connection attempt for [`MockLlmClient`]
#[derive(Debug)]
pub enum MockAttempt {
    /// The connection fails before the stream opens
    ConnectError(LlmError),
    /// The stream opens and yields these items in order
    Stream(Vec<Result<Fragment, LlmError>>),
}

impl MockAttempt {
    /// An attempt that streams the given content fragments and ends cleanly
    pub fn content<S: Into<String>>(fragments: impl IntoIterator<Item = S>) -> Self {
        MockAttempt::Stream(fragments.into_iter().map(|f| Ok(Fragment::content(f))).collect())
    }
}

/// Scripted client for tests and offline runs.
///
/// Each `stream` call consumes scripted attempts through the same retry and
/// deadline policy the HTTP client uses, so retry behavior is observable
/// without a network.
pub struct MockLlmClient {
    attempts: Arc<Mutex<VecDeque<MockAttempt>>>,
    connects: Arc<AtomicUsize>,
    requests: Mutex<Vec<CompletionRequest>>,
    policy: RetryPolicy,
    timeout: Duration,
    fragment_delay: Option<Duration>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(Mutex::new(VecDeque::new())),
            connects: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
            policy: RetryPolicy::immediate(2),
            timeout: Duration::from_secs(30),
            fragment_delay: None,
        }
    }

    /// Client whose single attempt streams the given content fragments
    pub fn with_fragments<S: Into<String>>(fragments: impl IntoIterator<Item = S>) -> Self {
        Self::new().with_attempt(MockAttempt::content(fragments))
    }

    pub fn with_attempt(self, attempt: MockAttempt) -> Self {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push_back(attempt);
        }
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sleep before every fragment, to exercise deadlines and cancellation
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    /// Number of connection attempts made so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = request.model.clone();
        let mut stream = self.stream(request).await?;
        let mut content = String::new();
        let mut reasoning = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            match fragment.reasoning_text() {
                Some(text) => reasoning.push_str(text),
                None => content.push_str(fragment.as_str()),
            }
        }
        Ok(CompletionResponse {
            content,
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            model,
            usage: Default::default(),
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, LlmError> {
        request.validate()?;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let attempts = Arc::clone(&self.attempts);
        let connects = Arc::clone(&self.connects);
        let delay = self.fragment_delay;

        Ok(resilient_stream(self.policy.clone(), self.timeout, move |_attempt| {
            connects.fetch_add(1, Ordering::SeqCst);
            let next = attempts.lock().ok().and_then(|mut a| a.pop_front());
            async move {
                match next {
                    None => Err(LlmError::Transport("no scripted attempt left".to_string())),
                    Some(MockAttempt::ConnectError(e)) => Err(e),
                    Some(MockAttempt::Stream(items)) => {
                        let stream = futures::stream::iter(items).then(move |item| async move {
                            if let Some(delay) = delay {
                                tokio::time::sleep(delay).await;
                            }
                            item
                        });
                        Ok(Box::pin(stream) as FragmentStream)
                    }
                }
            }
        }))
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn is_ready(&self) -> bool {
        true
    }
}
