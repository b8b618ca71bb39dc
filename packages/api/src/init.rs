//! Server initialization for label delivery.

use std::sync::Arc;
use std::time::Duration;

use actors::{
    BackpressureController, BusError, ConnectionRegistry, DeliveryCoordinator, DeliveryHandler,
    Topic, TopicConfig,
};
use db::{DbError, repositories::JobRepository};
use label_core::{SharedSecret, SignatureGate};
use tokio::sync::broadcast;

use crate::config::ServerConfig;

/// Topic carrying job references.
pub const JOB_TOPIC: &str = "label-jobs";

/// Errors raised while starting the server.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<SignatureGate>,
    pub secret: SharedSecret,
    pub coordinator: DeliveryCoordinator,
    pub idle_timeout: Option<Duration>,
}

/// A started server: route state plus the running job topic.
pub struct LabelServer {
    pub state: AppState,
    topic: Topic,
}

impl LabelServer {
    pub fn router(&self) -> axum::Router {
        crate::app(self.state.clone())
    }

    /// Close agent connections, then persist and stop the topic.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down label server...");
        self.state.coordinator.registry().disconnect_all().await;
        self.topic.shutdown().await;
    }
}

/// Connect the job store, start the job topic and wire the delivery pipeline.
pub async fn init_label_server(config: &ServerConfig) -> Result<LabelServer, InitError> {
    tracing::info!("Initializing label server...");

    let db = db::init(config.db.clone()).await?;
    let jobs = JobRepository::new(db);

    let mut topic_config = TopicConfig::new(JOB_TOPIC);
    if let Some(dir) = &config.bus_data_dir {
        topic_config = topic_config.with_data_dir(dir);
    }
    let mut topic = Topic::start(topic_config).await?;
    let bus = topic.client();

    let (events, _) = broadcast::channel(1024);
    let registry = Arc::new(
        ConnectionRegistry::new(config.broadcast_write_timeout)
            .with_backpressure(BackpressureController::new(bus.clone()))
            .with_events(events.clone()),
    );

    let coordinator = DeliveryCoordinator::new(jobs, bus, registry, events);
    topic
        .spawn_consumers(Arc::new(DeliveryHandler::new(coordinator.clone())))
        .await?;

    tracing::info!("Label server initialized");

    Ok(LabelServer {
        state: AppState {
            gate: Arc::new(SignatureGate::new(config.hmac_secret.as_bytes().to_vec())),
            secret: SharedSecret::new(config.ws_password.clone()),
            coordinator,
            idle_timeout: config.agent_idle_timeout,
        },
        topic,
    })
}
