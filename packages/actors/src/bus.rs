//! Starting topics, attaching consumers, and the client used to drive them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorRef};

use crate::consumer_actor::{ConsumerActor, ConsumerArgs};
use crate::handler::MessageHandler;
use crate::messages::{BusError, ConsumerMessage, MessageId, TopicMessage, TopicStats};
use crate::topic_actor::TopicActor;

/// Configuration for one topic and its consumer pool.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Topic name, also the journal file stem.
    pub name: String,
    /// In-flight limit before anything changes it. Zero holds all messages.
    pub initial_max_in_flight: u32,
    /// How long a consumer may hold a message before it is redelivered.
    pub message_timeout: Duration,
    /// Delay before a requeued message is handed out again.
    pub requeue_delay: Duration,
    /// Number of consumer actors.
    pub consumers: u32,
    /// How often an idle consumer asks for work.
    pub poll_interval: Duration,
    /// Upper bound on one handler invocation.
    pub handler_timeout: Duration,
    /// Housekeeping interval.
    pub tick_interval: Duration,
    /// Directory for the topic journal; `None` keeps the topic in memory only.
    pub data_dir: Option<PathBuf>,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            name: "label-jobs".to_string(),
            initial_max_in_flight: 0,
            message_timeout: Duration::from_secs(60),
            requeue_delay: Duration::from_secs(1),
            consumers: 1,
            poll_interval: Duration::from_millis(100),
            handler_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            data_dir: None,
        }
    }
}

impl TopicConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Persist unfinished messages under `dir`.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the number of consumers.
    pub fn with_consumers(mut self, consumers: u32) -> Self {
        self.consumers = consumers;
        self
    }

    /// Set the requeue delay.
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    /// Set the in-flight message timeout.
    pub fn with_message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    /// Set the consumer poll and topic tick intervals together.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.tick_interval = interval;
        self
    }
}

/// Cheap, cloneable handle for publishing to and steering a topic.
#[derive(Clone)]
pub struct BusClient {
    topic: ActorRef<TopicMessage>,
    rpc_timeout: Duration,
}

impl BusClient {
    pub fn new(topic: ActorRef<TopicMessage>) -> Self {
        Self {
            topic,
            rpc_timeout: Duration::from_secs(5),
        }
    }

    /// Append a message body to the topic.
    pub async fn publish(&self, body: impl Into<String>) -> Result<MessageId, BusError> {
        let body = body.into();
        let result = ractor::rpc::call(
            &self.topic,
            |reply| TopicMessage::Publish { body, reply },
            Some(self.rpc_timeout),
        )
        .await
        .map_err(|e| BusError::Actor(e.to_string()))?;

        match result {
            ractor::rpc::CallResult::Success(reply) => reply.map_err(BusError::Rejected),
            ractor::rpc::CallResult::Timeout => Err(BusError::Timeout),
            ractor::rpc::CallResult::SenderError => {
                Err(BusError::Actor("Topic dropped the reply".into()))
            }
        }
    }

    /// Change the topic's in-flight limit.
    pub fn set_max_in_flight(&self, limit: u32) -> Result<(), BusError> {
        self.topic
            .send_message(TopicMessage::SetMaxInFlight { limit })
            .map_err(|e| BusError::Actor(e.to_string()))
    }

    /// Current topic counters.
    pub async fn stats(&self) -> Result<TopicStats, BusError> {
        let result = ractor::rpc::call(
            &self.topic,
            |reply| TopicMessage::GetStats { reply },
            Some(self.rpc_timeout),
        )
        .await
        .map_err(|e| BusError::Actor(e.to_string()))?;

        match result {
            ractor::rpc::CallResult::Success(stats) => Ok(stats),
            ractor::rpc::CallResult::Timeout => Err(BusError::Timeout),
            ractor::rpc::CallResult::SenderError => {
                Err(BusError::Actor("Topic dropped the reply".into()))
            }
        }
    }
}

/// A running topic with its consumer pool.
pub struct Topic {
    config: TopicConfig,
    actor: ActorRef<TopicMessage>,
    handle: tokio::task::JoinHandle<()>,
    consumers: Vec<ActorRef<ConsumerMessage>>,
}

impl Topic {
    /// Spawn the topic actor. No consumers are attached yet.
    pub async fn start(config: TopicConfig) -> Result<Self, BusError> {
        let (actor, handle) = Actor::spawn(None, TopicActor, config.clone())
            .await
            .map_err(|e| BusError::Spawn(e.to_string()))?;

        Ok(Self {
            config,
            actor,
            handle,
            consumers: Vec::new(),
        })
    }

    /// Client for publishing and flow control.
    pub fn client(&self) -> BusClient {
        BusClient::new(self.actor.clone())
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Attach `config.consumers` consumers that feed every message to `handler`.
    pub async fn spawn_consumers(&mut self, handler: Arc<dyn MessageHandler>) -> Result<(), BusError> {
        for _ in 0..self.config.consumers {
            let consumer_id = format!("{}-consumer-{}", self.config.name, self.consumers.len() + 1);
            let args = ConsumerArgs {
                consumer_id,
                topic: self.actor.clone(),
                handler: handler.clone(),
                handler_timeout: self.config.handler_timeout,
                requeue_delay: self.config.requeue_delay,
                poll_interval: self.config.poll_interval,
            };

            let (consumer, _handle) = Actor::spawn(None, ConsumerActor, args)
                .await
                .map_err(|e| BusError::Spawn(e.to_string()))?;
            self.consumers.push(consumer);
        }
        Ok(())
    }

    /// Stop consumers, persist and stop the topic.
    pub async fn shutdown(self) {
        for consumer in &self.consumers {
            let _ = consumer.send_message(ConsumerMessage::Shutdown);
        }
        if self.actor.send_message(TopicMessage::Shutdown).is_ok() {
            let _ = self.handle.await;
        }
    }
}
