//! Message types for actor communication.

use chrono::{DateTime, Utc};
use ractor::RpcReplyPort;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ulid::Ulid;

/// Unique identifier for a message on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Ulid);

impl MessageId {
    /// Create a new unique message ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message carried by a topic. Bodies are small opaque tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: MessageId,
    pub body: String,
    /// Number of times this message has been handed to a consumer.
    #[serde(default)]
    pub attempts: u32,
    pub published_at: DateTime<Utc>,
}

impl BusMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            body: body.into(),
            attempts: 0,
            published_at: Utc::now(),
        }
    }
}

/// Point-in-time counters for a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStats {
    /// Messages ready to be handed out.
    pub depth: usize,
    /// Requeued messages waiting out their delay.
    pub deferred: usize,
    /// Messages handed out and not yet finished or requeued.
    pub in_flight: usize,
    /// Current in-flight limit.
    pub max_in_flight: u32,
    pub published: u64,
    pub finished: u64,
    pub requeued: u64,
    /// In-flight messages that exceeded the message timeout and were redelivered.
    pub timed_out: u64,
}

impl TopicStats {
    /// Messages not yet finished.
    pub fn unfinished(&self) -> usize {
        self.depth + self.deferred + self.in_flight
    }
}

/// Messages for the TopicActor.
#[derive(Debug)]
pub enum TopicMessage {
    /// Append a message to the topic.
    Publish {
        body: String,
        reply: RpcReplyPort<Result<MessageId, String>>,
    },

    /// Hand the next ready message to a consumer, if the in-flight limit allows.
    RequestMessage {
        consumer_id: String,
        reply: RpcReplyPort<Option<BusMessage>>,
    },

    /// The consumer handled the message; remove it for good.
    Finish { message_id: MessageId },

    /// The consumer failed; make the message available again after `delay`.
    Requeue {
        message_id: MessageId,
        delay: Duration,
    },

    /// Change how many messages may be in flight at once.
    SetMaxInFlight { limit: u32 },

    /// Get topic stats.
    GetStats { reply: RpcReplyPort<TopicStats> },

    /// Persist and stop.
    Shutdown,

    /// Periodic tick for deferred promotion and timeout redelivery.
    Tick,
}

/// Messages for the ConsumerActor.
#[derive(Debug)]
pub enum ConsumerMessage {
    /// Pull and handle one message if idle.
    Poll,

    /// Shutdown the consumer.
    Shutdown,
}

/// Error type for bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to spawn actor: {0}")]
    Spawn(String),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Publish rejected: {0}")]
    Rejected(String),

    #[error("Timeout")]
    Timeout,
}
