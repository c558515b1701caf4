use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A normalized event parsed out of the response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A verbatim text delta.
    Content(String),
    /// A raw fragment of the function-call JSON under construction.
    FunctionCall(String),
}

/// Why a run stopped. Exactly one of these is delivered per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Done-sentinel seen or the stream ended cleanly.
    Done,
    /// The cancellation predicate turned true mid-stream.
    Cancelled,
    Failed(StreamError),
}

/// Fatal per-run error categories. None of these are retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("failed to build request body: {0}")]
    Serialize(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// What a subscriber receives: every event in emission order, then exactly
/// one terminal signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubMessage {
    Event(StreamEvent),
    End(StreamEnd),
}

/// Events a subscriber consumes, in emission order.
pub type EventStream = UnboundedReceiverStream<HubMessage>;

/// Fan-out of stream events to any number of subscribers.
///
/// Subscribers may register before or during a run; registration is
/// serialized against an in-progress publish. Once the hub is closed the
/// terminal signal is replayed to late subscribers and nothing else is
/// delivered.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Debug, Default)]
struct HubState {
    subscribers: Vec<mpsc::UnboundedSender<HubMessage>>,
    end: Option<StreamEnd>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still has a usable state; the terminal signal must go
    // out even if a publisher panicked.
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        match &state.end {
            Some(end) => {
                let _ = tx.send(HubMessage::End(end.clone()));
            }
            None => state.subscribers.push(tx),
        }
        UnboundedReceiverStream::new(rx)
    }

    /// Deliver an event to every current subscriber. No-op after close.
    pub(crate) fn publish(&self, event: StreamEvent) {
        let mut state = self.lock();
        if state.end.is_some() {
            return;
        }
        // Subscribers that dropped their receiver are forgotten here.
        state
            .subscribers
            .retain(|tx| tx.send(HubMessage::Event(event.clone())).is_ok());
    }

    /// Close with a terminal signal. Only the first close takes effect.
    pub(crate) fn close(&self, end: StreamEnd) {
        let mut state = self.lock();
        if state.end.is_some() {
            return;
        }
        for tx in state.subscribers.drain(..) {
            let _ = tx.send(HubMessage::End(end.clone()));
        }
        state.end = Some(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    async fn drain(mut stream: EventStream) -> Vec<HubMessage> {
        let mut out = Vec::new();
        while let Some(msg) = stream.next().await {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn events_fan_out_in_order() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.publish(StreamEvent::Content("one".into()));
        hub.publish(StreamEvent::Content("two".into()));
        hub.close(StreamEnd::Done);

        let expected = vec![
            HubMessage::Event(StreamEvent::Content("one".into())),
            HubMessage::Event(StreamEvent::Content("two".into())),
            HubMessage::End(StreamEnd::Done),
        ];
        assert_eq!(drain(a).await, expected);
        assert_eq!(drain(b).await, expected);
    }

    #[tokio::test]
    async fn mid_run_subscriber_sees_later_events() {
        let hub = EventHub::new();
        hub.publish(StreamEvent::Content("missed".into()));

        let late = hub.subscribe();
        hub.publish(StreamEvent::Content("seen".into()));
        hub.close(StreamEnd::Done);

        assert_eq!(
            drain(late).await,
            vec![
                HubMessage::Event(StreamEvent::Content("seen".into())),
                HubMessage::End(StreamEnd::Done),
            ]
        );
    }

    #[tokio::test]
    async fn only_first_close_is_delivered() {
        let hub = EventHub::new();
        let sub = hub.subscribe();

        hub.close(StreamEnd::Cancelled);
        hub.close(StreamEnd::Failed(StreamError::Transport("late".into())));
        hub.publish(StreamEvent::Content("after close".into()));

        assert_eq!(drain(sub).await, vec![HubMessage::End(StreamEnd::Cancelled)]);
    }

    #[tokio::test]
    async fn late_subscriber_gets_terminal_replay() {
        let hub = EventHub::new();
        hub.close(StreamEnd::Done);

        let sub = hub.subscribe();
        assert_eq!(drain(sub).await, vec![HubMessage::End(StreamEnd::Done)]);
    }
}
