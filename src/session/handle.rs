//! Caller-facing event channel and the fragment pump that feeds it.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::framing::FramedEvent;
use crate::llm::{Fragment, FragmentStream};

/// Default capacity of a session's event channel
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Receiving side of a streaming session.
///
/// Dropping the handle counts as a client disconnect: the session stops
/// pulling from the provider and finalizes as cancelled.
#[derive(Debug)]
pub struct EventStreamHandle {
    receiver: mpsc::Receiver<FramedEvent>,
    cancel: CancellationToken,
    session_id: String,
}

impl EventStreamHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event, or None once the session is over
    pub async fn recv(&mut self) -> Option<FramedEvent> {
        self.receiver.recv().await
    }

    /// Ask the session to stop; a terminal event still follows
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token for cancelling from another task (e.g. a signal handler)
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain every remaining event
    pub async fn collect(mut self) -> Vec<FramedEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.receiver.recv().await {
            events.push(event);
        }
        events
    }
}

/// Sending side of a streaming session
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<FramedEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Deliver an event; false once the caller cancelled or went away
    pub async fn send(&self, event: FramedEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// Deliver the terminal event, even after cancellation
    pub async fn send_final(&self, event: FramedEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

pub fn create_event_channel(buffer: usize, session_id: impl Into<String>) -> (EventSink, EventStreamHandle) {
    let (tx, receiver) = mpsc::channel(buffer.max(1));
    let cancel = CancellationToken::new();
    let sink = EventSink {
        tx,
        cancel: cancel.clone(),
    };
    let handle = EventStreamHandle {
        receiver,
        cancel,
        session_id: session_id.into(),
    };
    (sink, handle)
}

/// How a pumped stream stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEnd {
    /// The provider ended the stream
    Finished,
    Failed(String),
    Cancelled,
}

/// Pull fragments in order, fold each through `on_fragment` and forward the
/// resulting events.
///
/// Returning drops the stream, which closes the upstream connection.
pub async fn pump<F>(mut stream: FragmentStream, sink: &EventSink, mut on_fragment: F) -> PumpEnd
where
    F: FnMut(&Fragment) -> Result<Vec<FramedEvent>>,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = sink.cancel.cancelled() => return PumpEnd::Cancelled,
            _ = sink.tx.closed() => return PumpEnd::Cancelled,
            next = stream.next() => next,
        };

        match next {
            None => return PumpEnd::Finished,
            Some(Err(e)) => {
                log::warn!("Stream failed: {}", e);
                return PumpEnd::Failed(e.to_string());
            }
            Some(Ok(fragment)) => match on_fragment(&fragment) {
                Ok(events) => {
                    for event in events {
                        if !sink.send(event).await {
                            return PumpEnd::Cancelled;
                        }
                    }
                }
                Err(e) => {
                    log::error!("Failed to handle fragment: {}", e);
                    return PumpEnd::Failed(e.to_string());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NexusError;
    use crate::llm::LlmError;

    fn fragments(items: Vec<std::result::Result<Fragment, LlmError>>) -> FragmentStream {
        Box::pin(futures::stream::iter(items))
    }

    fn echo(fragment: &Fragment) -> Result<Vec<FramedEvent>> {
        Ok(vec![FramedEvent::content(fragment.as_str())])
    }

    #[tokio::test]
    async fn test_pump_forwards_in_order() {
        let (sink, handle) = create_event_channel(4, "ses-1");
        let stream = fragments(vec![
            Ok(Fragment::content("a")),
            Ok(Fragment::content("b")),
            Ok(Fragment::content("c")),
        ]);

        let end = pump(stream, &sink, echo).await;
        drop(sink);

        assert_eq!(end, PumpEnd::Finished);
        let texts: Vec<String> = handle
            .collect()
            .await
            .iter()
            .filter_map(|e| e.text().map(str::to_string))
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_pump_stops_on_stream_error() {
        let (sink, handle) = create_event_channel(4, "ses-1");
        let stream = fragments(vec![
            Ok(Fragment::content("a")),
            Err(LlmError::Transport("connection reset".to_string())),
            Ok(Fragment::content("never")),
        ]);

        let end = pump(stream, &sink, echo).await;
        drop(sink);

        assert!(matches!(end, PumpEnd::Failed(ref reason) if reason.contains("connection reset")));
        assert_eq!(handle.collect().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pump_stops_on_handler_error() {
        let (sink, _handle) = create_event_channel(4, "ses-1");
        let stream = fragments(vec![Ok(Fragment::content("a"))]);

        let end = pump(stream, &sink, |_| Err(NexusError::Storage("disk full".to_string()))).await;
        assert!(matches!(end, PumpEnd::Failed(ref reason) if reason.contains("disk full")));
    }

    #[tokio::test]
    async fn test_pump_cancelled_by_token() {
        let (sink, handle) = create_event_channel(4, "ses-1");
        handle.cancel();

        let end = pump(Box::pin(futures::stream::pending()), &sink, echo).await;
        assert_eq!(end, PumpEnd::Cancelled);
        assert!(sink.is_cancelled());
    }

    #[tokio::test]
    async fn test_pump_cancelled_when_receiver_dropped() {
        let (sink, handle) = create_event_channel(4, "ses-1");
        drop(handle);

        let end = pump(Box::pin(futures::stream::pending()), &sink, echo).await;
        assert_eq!(end, PumpEnd::Cancelled);
    }

    #[tokio::test]
    async fn test_send_final_after_cancel() {
        let (sink, mut handle) = create_event_channel(4, "ses-1");
        handle.cancel();

        assert!(!sink.send(FramedEvent::content("x")).await);
        assert!(sink.send_final(FramedEvent::error("cancelled")).await);
        assert_eq!(handle.recv().await, Some(FramedEvent::error("cancelled")));
        assert_eq!(handle.session_id(), "ses-1");
    }
}
