//! Consumer actor for pulling and handling topic messages.

use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::handler::MessageHandler;
use crate::messages::{BusMessage, ConsumerMessage, TopicMessage};

/// State for the consumer actor.
pub struct ConsumerActorState {
    /// Unique consumer ID.
    pub consumer_id: String,
    /// Topic actor reference.
    pub topic: ActorRef<TopicMessage>,
    /// Handler for pulled messages.
    pub handler: Arc<dyn MessageHandler>,
    /// Upper bound on one handler invocation.
    pub handler_timeout: Duration,
    /// Delay applied when requeueing a failed message.
    pub requeue_delay: Duration,
}

/// Consumer actor arguments.
pub struct ConsumerArgs {
    pub consumer_id: String,
    pub topic: ActorRef<TopicMessage>,
    pub handler: Arc<dyn MessageHandler>,
    pub handler_timeout: Duration,
    pub requeue_delay: Duration,
    pub poll_interval: Duration,
}

impl ConsumerActorState {
    async fn process(&self, message: BusMessage) -> Result<(), ActorProcessingErr> {
        let message_id = message.id;
        let result = tokio::time::timeout(self.handler_timeout, self.handler.handle(&message)).await;

        let reply = match result {
            Ok(Ok(())) => TopicMessage::Finish { message_id },
            Ok(Err(error)) => {
                tracing::warn!(
                    message_id = %message_id,
                    attempts = message.attempts,
                    "Handler failed, requeueing: {}",
                    error
                );
                TopicMessage::Requeue {
                    message_id,
                    delay: self.requeue_delay,
                }
            }
            Err(_) => {
                tracing::warn!(message_id = %message_id, "Handler timed out, requeueing");
                TopicMessage::Requeue {
                    message_id,
                    delay: self.requeue_delay,
                }
            }
        };

        self.topic.send_message(reply)?;
        Ok(())
    }
}

/// Consumer actor that pulls messages from a topic.
pub struct ConsumerActor;

impl Actor for ConsumerActor {
    type Msg = ConsumerMessage;
    type State = ConsumerActorState;
    type Arguments = ConsumerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting consumer: {}", args.consumer_id);

        // Start the poll loop
        let myself_clone = myself.clone();
        let poll_interval = args.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if myself_clone.send_message(ConsumerMessage::Poll).is_err() {
                    break;
                }
            }
        });

        Ok(ConsumerActorState {
            consumer_id: args.consumer_id,
            topic: args.topic,
            handler: args.handler,
            handler_timeout: args.handler_timeout,
            requeue_delay: args.requeue_delay,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ConsumerMessage::Poll => {
                let timeout = Duration::from_secs(5);
                let result = ractor::rpc::call(
                    &state.topic,
                    |reply| TopicMessage::RequestMessage {
                        consumer_id: state.consumer_id.clone(),
                        reply,
                    },
                    Some(timeout),
                )
                .await;

                match result {
                    Ok(ractor::rpc::CallResult::Success(Some(message))) => {
                        state.process(message).await?;
                    }
                    Ok(_) => {}
                    Err(_) => {
                        tracing::info!("Topic gone, stopping consumer: {}", state.consumer_id);
                        myself.stop(None);
                    }
                }
            }

            ConsumerMessage::Shutdown => {
                tracing::info!("Shutting down consumer: {}", state.consumer_id);
                myself.stop(None);
            }
        }

        Ok(())
    }
}
