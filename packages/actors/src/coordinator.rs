//! Delivery coordinator: submission, dispatch of bus references, and acknowledgment.

use std::sync::Arc;

use chrono::Utc;
use db::DbError;
use db::repositories::{JobRepository, MarkPrinted};
use label_core::{ConnectionId, DeliveryEvent, Job, JobId, JobReference};
use tokio::sync::broadcast;

use crate::bus::BusClient;
use crate::handler::{HandlerFuture, MessageHandler};
use crate::messages::{BusError, BusMessage};
use crate::registry::{BroadcastReport, ConnectionRegistry};

/// Errors from the delivery pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Job store error: {0}")]
    Store(#[from] DbError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("No agent connected")]
    NoAgents,

    #[error("Job {0} reached no agent")]
    NotDelivered(JobId),

    #[error("Failed to encode job {0}: {1}")]
    Encode(JobId, String),
}

/// What happened to one bus reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Pushed to at least one agent.
    Delivered { job_id: JobId, report: BroadcastReport },
    /// The job was printed already; the reference is discarded.
    AlreadyPrinted(JobId),
    /// The reference cannot be acted on and is discarded.
    Dropped(String),
}

/// Ties the job store, the bus and the connection registry together.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    jobs: JobRepository,
    bus: BusClient,
    registry: Arc<ConnectionRegistry>,
    events: broadcast::Sender<DeliveryEvent>,
}

impl DeliveryCoordinator {
    pub fn new(
        jobs: JobRepository,
        bus: BusClient,
        registry: Arc<ConnectionRegistry>,
        events: broadcast::Sender<DeliveryEvent>,
    ) -> Self {
        Self {
            jobs,
            bus,
            registry,
            events,
        }
    }

    pub fn jobs(&self) -> &JobRepository {
        &self.jobs
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &BusClient {
        &self.bus
    }

    /// Observe delivery events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DeliveryEvent) {
        tracing::debug!("{}", event.description());
        let _ = self.events.send(event);
    }

    /// Persist a job and publish its reference.
    ///
    /// Publishing happens only after the store write succeeded.
    pub async fn submit(&self, content: impl Into<String>) -> Result<Job, DeliveryError> {
        let job = self.jobs.create(content).await?;
        self.emit(DeliveryEvent::JobCreated {
            job_id: job.id,
            timestamp: Utc::now(),
        });

        if let Err(e) = self.bus.publish(job.reference().to_body()).await {
            tracing::error!(job_id = %job.id, "Job stored but not published: {}", e);
            return Err(e.into());
        }

        tracing::info!(job_id = %job.id, "Job submitted");
        Ok(job)
    }

    /// Handle one bus reference.
    ///
    /// `Ok` finishes the bus message; `Err` requeues it.
    pub async fn dispatch(&self, message: &BusMessage) -> Result<Dispatch, DeliveryError> {
        let body = message.body.trim();
        if body.is_empty() {
            return Ok(Dispatch::Dropped("empty body".into()));
        }

        let job_id = match JobReference::from_body(body) {
            Ok(reference) => reference.job_id(),
            Err(e) => {
                tracing::warn!(message_id = %message.id, "Dropping malformed job reference {:?}: {}", body, e);
                return Ok(Dispatch::Dropped(format!("malformed reference: {}", e)));
            }
        };

        // Checked before the store lookup so a missing agent never costs a read.
        if self.registry.count().await == 0 {
            return Err(DeliveryError::NoAgents);
        }

        let job = match self.jobs.get(job_id).await {
            Ok(job) => job,
            Err(DbError::NotFound(_)) => {
                tracing::warn!(job_id = %job_id, "Dropping reference to unknown job");
                return Ok(Dispatch::Dropped(format!("job {} not found", job_id)));
            }
            Err(e) => return Err(e.into()),
        };

        if job.is_printed() {
            tracing::info!(job_id = %job_id, "Job already printed, discarding redelivery");
            self.emit(DeliveryEvent::DuplicateSuppressed {
                job_id,
                timestamp: Utc::now(),
            });
            return Ok(Dispatch::AlreadyPrinted(job_id));
        }

        let frame = serde_json::to_string(&job.to_wire())
            .map_err(|e| DeliveryError::Encode(job_id, e.to_string()))?;
        let report = self.registry.broadcast(&frame).await;

        self.emit(DeliveryEvent::JobDispatched {
            job_id,
            delivered: report.delivered.len(),
            failed: report.failed.len(),
            timestamp: Utc::now(),
        });

        if !report.delivered_any() {
            return Err(DeliveryError::NotDelivered(job_id));
        }

        tracing::info!(
            job_id = %job_id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Job dispatched"
        );
        Ok(Dispatch::Delivered { job_id, report })
    }

    /// Record an acknowledgment for `job_id`.
    pub async fn acknowledge(
        &self,
        job_id: JobId,
        connection_id: Option<ConnectionId>,
    ) -> Result<MarkPrinted, DeliveryError> {
        let outcome = self.jobs.mark_printed(job_id).await?;

        if outcome.transitioned() {
            tracing::info!(job_id = %job_id, "Job printed");
            self.emit(DeliveryEvent::JobPrinted {
                job_id,
                connection_id,
                timestamp: Utc::now(),
            });
        } else {
            tracing::debug!(job_id = %job_id, "Repeated acknowledgment");
        }

        Ok(outcome)
    }
}

/// Bus consumer handler that dispatches job references.
pub struct DeliveryHandler {
    coordinator: DeliveryCoordinator,
}

impl DeliveryHandler {
    pub fn new(coordinator: DeliveryCoordinator) -> Self {
        Self { coordinator }
    }
}

impl MessageHandler for DeliveryHandler {
    fn handle(&self, message: &BusMessage) -> HandlerFuture {
        let coordinator = self.coordinator.clone();
        let message = message.clone();
        Box::pin(async move {
            coordinator
                .dispatch(&message)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }
}
