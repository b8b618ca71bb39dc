//! Actor system for label job delivery.
//!
//! This crate provides the Ractor-based durable bus and the pieces that
//! move job references from it to connected agents.
//!
//! # Architecture
//!
//! - `TopicActor` - Owns one topic's messages and its in-flight limit
//! - `ConsumerActor` - Pulls messages from a topic and runs a handler
//! - `ConnectionRegistry` - Authenticated agent connections
//! - `BackpressureController` - Holds the topic at zero in flight while no agent is connected
//! - `DeliveryCoordinator` - Submission, dispatch and acknowledgment
//!
//! # Usage
//!
//! ```ignore
//! use actors::{Topic, TopicConfig, DeliveryHandler};
//!
//! let mut topic = Topic::start(TopicConfig::new("label-jobs")).await?;
//! let bus = topic.client();
//! // build the registry and coordinator around `bus`, then:
//! topic.spawn_consumers(Arc::new(DeliveryHandler::new(coordinator))).await?;
//! ```

pub mod backpressure;
mod bus;
mod consumer_actor;
mod coordinator;
mod handler;
mod messages;
mod persistence;
pub mod registry;
mod topic_actor;

pub use backpressure::{BackpressureController, FlowControl, in_flight_limit};
pub use bus::{BusClient, Topic, TopicConfig};
pub use consumer_actor::ConsumerActor;
pub use coordinator::{DeliveryCoordinator, DeliveryError, DeliveryHandler, Dispatch};
pub use handler::{FnHandler, HandlerFuture, HandlerResult, MessageHandler};
pub use messages::{BusError, BusMessage, MessageId, TopicStats};
pub use persistence::{PersistenceError, TopicJournal, TopicSnapshot};
pub use registry::{
    AgentFrame, AgentLink, AgentMailbox, BroadcastReport, ConnectionRegistry, Outbound, WriteReceipt,
};
pub use topic_actor::TopicActor;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef};
