//! Headless, topic-based publish/subscribe bus for grasp events.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others (or the controller that publishes).
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Goals`] | Goal acceptance notices |
//! | [`Topic::Feedback`] | Per-tick progress of the executing goal |
//! | [`Topic::Results`] | Exactly one terminal outcome per accepted goal |

use grasp_types::{GraspError, GraspEvent, GraspPayload};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Goals,
    Feedback,
    Results,
}

impl Topic {
    /// The lane an event belongs on, derived from its payload.
    pub fn for_payload(payload: &GraspPayload) -> Self {
        match payload {
            GraspPayload::Accepted { .. } => Topic::Goals,
            GraspPayload::Feedback { .. } => Topic::Feedback,
            GraspPayload::Finished(_) => Topic::Results,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    goals: broadcast::Sender<GraspEvent>,
    feedback: broadcast::Sender<GraspEvent>,
    results: broadcast::Sender<GraspEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a tokio broadcast channel requirement).
    pub fn new(capacity: usize) -> Self {
        let (goals, _) = broadcast::channel(capacity);
        let (feedback, _) = broadcast::channel(capacity);
        let (results, _) = broadcast::channel(capacity);
        Self {
            goals,
            feedback,
            results,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when no subscribers are currently listening on the
    /// topic (this is a normal condition, not an error).
    pub fn publish_to(&self, topic: Topic, event: GraspEvent) -> Result<usize, GraspError> {
        let sender = self.topic_sender(topic);
        if sender.receiver_count() == 0 {
            return Ok(0);
        }
        sender
            .send(event)
            .map_err(|e| GraspError::Channel(format!("event bus send error on {topic:?}: {e}")))
    }

    /// Publish `event` on the lane matching its payload.
    pub fn publish(&self, event: GraspEvent) -> Result<usize, GraspError> {
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

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<GraspEvent> {
        match topic {
            Topic::Goals => &self.goals,
            Topic::Feedback => &self.feedback,
            Topic::Results => &self.results,
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
    receiver: broadcast::Receiver<GraspEvent>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<GraspEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<GraspEvent, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
