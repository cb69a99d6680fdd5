//! Retry and deadline policy for provider calls.
//!
//! Failures before the first fragment is delivered are retried with
//! exponential backoff; failures after that are terminal. A single deadline
//! bounds the whole call, backoff sleeps included.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{Instant, timeout_at};

use super::LlmError;
use super::streaming::FragmentStream;

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Policy that never retries
    pub fn never() -> Self {
        Self::immediate(0)
    }

    /// Delay before retry number `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

fn deadline_exceeded(limit: Duration, fragments: usize) -> LlmError {
    LlmError::Timeout { limit, fragments }
}

/// Drive `connect` under the retry policy and deadline, yielding fragments.
///
/// `connect` receives the zero-based attempt number and opens one upstream
/// stream. An error from `connect`, or from the opened stream before it has
/// yielded anything, is retried when [`LlmError::is_retryable`] allows and
/// budget remains. Once a fragment has been yielded, any failure ends the
/// stream with [`LlmError::MidStream`] (or [`LlmError::Timeout`]).
pub fn resilient_stream<F, Fut>(policy: RetryPolicy, limit: Duration, mut connect: F) -> FragmentStream
where
    F: FnMut(u32) -> Fut + Send + 'static,
    Fut: Future<Output = Result<FragmentStream, LlmError>> + Send + 'static,
{
    let deadline = Instant::now() + limit;

    Box::pin(async_stream::stream! {
        let mut attempt: u32 = 0;
        let mut delivered: usize = 0;

        loop {
            let failure = match timeout_at(deadline, connect(attempt)).await {
                Err(_) => deadline_exceeded(limit, delivered),
                Ok(Err(e)) => e,
                Ok(Ok(mut upstream)) => {
                    let mut failure = None;
                    loop {
                        match timeout_at(deadline, upstream.next()).await {
                            Err(_) => {
                                failure = Some(deadline_exceeded(limit, delivered));
                                break;
                            }
                            Ok(None) => break,
                            Ok(Some(Ok(fragment))) => {
                                delivered += 1;
                                yield Ok(fragment);
                            }
                            Ok(Some(Err(e))) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    match failure {
                        Some(e) => e,
                        None => break,
                    }
                }
            };

            if delivered > 0 {
                let terminal = match failure {
                    LlmError::Timeout { .. } => failure,
                    other => LlmError::MidStream {
                        fragments: delivered,
                        source: Box::new(other),
                    },
                };
                log::error!("Stream failed after {} fragments: {}", delivered, terminal);
                yield Err(terminal);
                break;
            }

            if !failure.is_retryable() || attempt >= policy.max_retries {
                log::error!("Provider call failed after {} attempt(s): {}", attempt + 1, failure);
                yield Err(failure);
                break;
            }

            let delay = policy.backoff(attempt);
            if Instant::now() + delay >= deadline {
                yield Err(deadline_exceeded(limit, 0));
                break;
            }

            log::warn!("Retrying provider call (attempt {}) in {:?}: {}", attempt + 2, delay, failure);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    })
}

/// Run a one-shot call under the same retry policy and deadline.
///
/// Used for non-streaming completions where there is no partial output to
/// protect, so every retryable failure is retried while budget remains.
pub async fn retry_call<T, F, Fut>(policy: &RetryPolicy, limit: Duration, mut call: F) -> Result<T, LlmError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let deadline = Instant::now() + limit;
    let mut attempt: u32 = 0;

    loop {
        let failure = match timeout_at(deadline, call(attempt)).await {
            Err(_) => return Err(deadline_exceeded(limit, 0)),
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
        };

        if !failure.is_retryable() || attempt >= policy.max_retries {
            return Err(failure);
        }

        let delay = policy.backoff(attempt);
        if Instant::now() + delay >= deadline {
            return Err(deadline_exceeded(limit, 0));
        }

        log::warn!("Retrying provider call (attempt {}) in {:?}: {}", attempt + 2, delay, failure);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
