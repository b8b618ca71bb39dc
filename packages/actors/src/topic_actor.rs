//! Topic actor: the durable at-least-once bus.
//!
//! Messages move `ready -> in flight -> finished`. A consumer failure or an
//! in-flight timeout puts the message back (`deferred` first when a requeue
//! delay applies). Nothing is handed out while `in_flight >= max_in_flight`,
//! so a limit of 0 holds every message on the topic.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::time::Instant;

use crate::bus::TopicConfig;
use crate::messages::{BusMessage, MessageId, TopicMessage, TopicStats};
use crate::persistence::{TopicJournal, TopicSnapshot};

/// A message handed to a consumer.
struct InFlight {
    message: BusMessage,
    consumer_id: String,
    deadline: Instant,
}

/// State for the topic actor.
pub struct TopicActorState {
    config: TopicConfig,
    ready: VecDeque<BusMessage>,
    /// Requeued messages and the instant they become ready again.
    deferred: Vec<(Instant, BusMessage)>,
    in_flight: HashMap<MessageId, InFlight>,
    max_in_flight: u32,
    stats: TopicStats,
    journal: Option<TopicJournal>,
}

impl TopicActorState {
    /// Create a new topic actor state.
    pub fn new(config: TopicConfig) -> Self {
        let journal = config
            .data_dir
            .as_ref()
            .map(|dir| TopicJournal::new(dir, &config.name));
        Self {
            max_in_flight: config.initial_max_in_flight,
            config,
            ready: VecDeque::new(),
            deferred: Vec::new(),
            in_flight: HashMap::new(),
            stats: TopicStats::default(),
            journal,
        }
    }

    fn snapshot(&self) -> TopicSnapshot {
        let messages = self
            .in_flight
            .values()
            .map(|f| f.message.clone())
            .chain(self.ready.iter().cloned())
            .chain(self.deferred.iter().map(|(_, m)| m.clone()))
            .collect();
        TopicSnapshot { messages }
    }

    async fn persist(&self) -> Result<(), String> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        journal
            .save(&self.snapshot())
            .await
            .map_err(|e| e.to_string())
    }

    /// Move deferred messages whose delay has elapsed onto the ready queue.
    fn promote_deferred(&mut self, now: Instant) {
        let mut index = 0;
        while index < self.deferred.len() {
            if self.deferred[index].0 <= now {
                let (_, message) = self.deferred.swap_remove(index);
                self.ready.push_back(message);
            } else {
                index += 1;
            }
        }
    }

    /// Put timed-out in-flight messages back at the front of the queue.
    fn redeliver_expired(&mut self, now: Instant) {
        let expired: Vec<MessageId> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(flight) = self.in_flight.remove(&id) {
                tracing::warn!(
                    message_id = %id,
                    consumer = %flight.consumer_id,
                    "Message timed out in flight, redelivering"
                );
                self.stats.timed_out += 1;
                self.ready.push_front(flight.message);
            }
        }
    }

    fn requeue(&mut self, message: BusMessage, delay: Duration) {
        if delay.is_zero() {
            self.ready.push_back(message);
        } else {
            self.deferred.push((Instant::now() + delay, message));
        }
    }

    fn current_stats(&self) -> TopicStats {
        TopicStats {
            depth: self.ready.len(),
            deferred: self.deferred.len(),
            in_flight: self.in_flight.len(),
            max_in_flight: self.max_in_flight,
            ..self.stats.clone()
        }
    }
}

/// Topic actor that owns one topic's messages.
pub struct TopicActor;

impl Actor for TopicActor {
    type Msg = TopicMessage;
    type State = TopicActorState;
    type Arguments = TopicConfig;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting topic actor: {}", args.name);
        let tick_interval = args.tick_interval;
        let mut state = TopicActorState::new(args);

        if let Some(journal) = &state.journal {
            match journal.load().await {
                Ok(Some(snapshot)) => {
                    tracing::info!(
                        "Recovered {} unfinished message(s) for topic {}",
                        snapshot.messages.len(),
                        state.config.name
                    );
                    state.ready.extend(snapshot.messages);
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(ActorProcessingErr::from(format!(
                        "Failed to load topic journal: {}",
                        e
                    )));
                }
            }
        }

        // Start periodic tick
        let myself_clone = myself.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            loop {
                interval.tick().await;
                if myself_clone.send_message(TopicMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            TopicMessage::Publish { body, reply } => {
                let message = BusMessage::new(body);
                let message_id = message.id;
                state.ready.push_back(message);

                if let Err(e) = state.persist().await {
                    state.ready.retain(|m| m.id != message_id);
                    let _ = reply.send(Err(format!("Failed to persist message: {}", e)));
                    return Ok(());
                }

                state.stats.published += 1;
                tracing::debug!(message_id = %message_id, topic = %state.config.name, "Published");
                let _ = reply.send(Ok(message_id));
            }

            TopicMessage::RequestMessage { consumer_id, reply } => {
                let now = Instant::now();
                state.promote_deferred(now);

                if state.in_flight.len() >= state.max_in_flight as usize {
                    let _ = reply.send(None);
                    return Ok(());
                }

                if let Some(mut message) = state.ready.pop_front() {
                    message.attempts = message.attempts.saturating_add(1);
                    state.in_flight.insert(
                        message.id,
                        InFlight {
                            message: message.clone(),
                            consumer_id,
                            deadline: now + state.config.message_timeout,
                        },
                    );
                    let _ = reply.send(Some(message));
                } else {
                    let _ = reply.send(None);
                }
            }

            TopicMessage::Finish { message_id } => {
                if state.in_flight.remove(&message_id).is_some() {
                    state.stats.finished += 1;
                    if let Err(e) = state.persist().await {
                        tracing::warn!("Failed to persist topic {}: {}", state.config.name, e);
                    }
                } else {
                    // Already timed out and redelivered; the redelivery is handled on its own.
                    tracing::debug!(message_id = %message_id, "Finish for message not in flight");
                }
            }

            TopicMessage::Requeue { message_id, delay } => {
                if let Some(flight) = state.in_flight.remove(&message_id) {
                    state.stats.requeued += 1;
                    state.requeue(flight.message, delay);
                    if let Err(e) = state.persist().await {
                        tracing::warn!("Failed to persist topic {}: {}", state.config.name, e);
                    }
                } else {
                    tracing::debug!(message_id = %message_id, "Requeue for message not in flight");
                }
            }

            TopicMessage::SetMaxInFlight { limit } => {
                if state.max_in_flight != limit {
                    tracing::info!(
                        "Topic {} max in flight {} -> {}",
                        state.config.name,
                        state.max_in_flight,
                        limit
                    );
                }
                state.max_in_flight = limit;
            }

            TopicMessage::GetStats { reply } => {
                let _ = reply.send(state.current_stats());
            }

            TopicMessage::Shutdown => {
                tracing::info!("Shutting down topic: {}", state.config.name);
                if let Err(e) = state.persist().await {
                    tracing::warn!("Failed to persist topic {}: {}", state.config.name, e);
                }
                myself.stop(None);
                return Ok(());
            }

            TopicMessage::Tick => {
                let now = Instant::now();
                state.promote_deferred(now);
                state.redeliver_expired(now);
            }
        }

        Ok(())
    }
}
