//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the publisher.  Publishing never waits: the engine's tick must not block.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::RegisterChanges`] | Register writes issued by a tick or by shutdown restore |
//! | [`Topic::Diagnostics`] | Refusals, malformed directives, unsupported features |

use cputune_types::{EventPayload, TuneError, TuneEvent};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Register writes and restores.
    RegisterChanges,
    /// Non-fatal diagnostics.
    Diagnostics,
}

impl Topic {
    /// The lane a payload belongs on.
    pub fn for_payload(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::RegisterChanged { .. } | EventPayload::RegisterRestored { .. } => {
                Topic::RegisterChanges
            }
            EventPayload::Diagnostic { .. } => Topic::Diagnostics,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    register_changes: broadcast::Sender<TuneEvent>,
    diagnostics: broadcast::Sender<TuneEvent>,
}

impl EventBus {
    /// Create a new bus with the given per-topic channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (register_changes, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        Self {
            register_changes,
            diagnostics,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`TuneError::Channel`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, event: TuneEvent) -> Result<usize, TuneError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| TuneError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Publish `event` on the lane matching its payload.
    pub fn publish(&self, event: TuneEvent) -> Result<usize, TuneError> {
        let topic = Topic::for_payload(&event.payload);
        self.publish_to(topic, event)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<TuneEvent> {
        match topic {
            Topic::RegisterChanges => &self.register_changes,
            Topic::Diagnostics => &self.diagnostics,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<TuneEvent>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic, skipping over gaps caused by
    /// lagging.  Returns `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<TuneEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<TuneEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cputune_types::{Feature, msr};

    fn change_event() -> TuneEvent {
        TuneEvent::new(
            "cputune-runtime::engine",
            EventPayload::RegisterChanged {
                feature: Some(Feature::ProcHot),
                register: msr::MSR_POWER_CTL,
                from: 0,
                to: 1,
            },
        )
    }

    fn diagnostic_event() -> TuneEvent {
        TuneEvent::new(
            "cputune-runtime::engine",
            EventPayload::Diagnostic {
                feature: Some(Feature::ProcHot),
                message: "refused".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::RegisterChanges);

        let event = change_event();
        bus.publish(event.clone())?;

        let received = rx.recv().await.ok_or("No event received")?;
        assert_eq!(received.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        assert!(matches!(
            bus.publish(change_event()),
            Err(TuneError::Channel(_))
        ));
    }

    #[test]
    fn payload_picks_topic() {
        assert_eq!(
            Topic::for_payload(&change_event().payload),
            Topic::RegisterChanges
        );
        assert_eq!(
            Topic::for_payload(&diagnostic_event().payload),
            Topic::Diagnostics
        );
    }

    #[tokio::test]
    async fn topics_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut changes = bus.subscribe_to(Topic::RegisterChanges);
        let mut diags = bus.subscribe_to(Topic::Diagnostics);

        bus.publish(diagnostic_event())?;

        assert!(changes.try_recv().is_none());
        let got = diags.recv().await.ok_or("No diagnostic received")?;
        assert!(matches!(got.payload, EventPayload::Diagnostic { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to(Topic::RegisterChanges);
        let mut rx2 = bus.subscribe_to(Topic::RegisterChanges);

        let event = change_event();
        bus.publish_to(Topic::RegisterChanges, event.clone())?;

        assert_eq!(rx1.recv().await.ok_or("rx1")?.id, event.id);
        assert_eq!(rx2.recv().await.ok_or("rx2")?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_newest() {
        let bus = EventBus::new(4);
        let mut slow = bus.subscribe_to(Topic::Diagnostics);
        for _ in 0..32 {
            let _ = bus.publish(diagnostic_event());
        }
        let last = diagnostic_event();
        let _ = bus.publish(last.clone());

        let mut seen = Vec::new();
        while let Some(event) = slow.try_recv() {
            seen.push(event.id);
        }
        assert!(seen.len() <= 4);
        assert_eq!(seen.last(), Some(&last.id));
    }
}
