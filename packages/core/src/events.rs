//! Event types for observing job delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConnectionId, JobId};

/// Events emitted by the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// A submission was persisted as a pending job.
    JobCreated {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A pending job was pushed to connected agents.
    JobDispatched {
        job_id: JobId,
        delivered: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
    /// An agent acknowledged a job and it moved to printed.
    JobPrinted {
        job_id: JobId,
        connection_id: Option<ConnectionId>,
        timestamp: DateTime<Utc>,
    },
    /// A reference to an already printed job came back and was discarded.
    DuplicateSuppressed {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// An agent completed the handshake.
    AgentConnected {
        connection_id: ConnectionId,
        timestamp: DateTime<Utc>,
    },
    /// An agent left the registry.
    AgentDisconnected {
        connection_id: ConnectionId,
        timestamp: DateTime<Utc>,
    },
}

impl DeliveryEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DeliveryEvent::JobCreated { timestamp, .. }
            | DeliveryEvent::JobDispatched { timestamp, .. }
            | DeliveryEvent::JobPrinted { timestamp, .. }
            | DeliveryEvent::DuplicateSuppressed { timestamp, .. }
            | DeliveryEvent::AgentConnected { timestamp, .. }
            | DeliveryEvent::AgentDisconnected { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            DeliveryEvent::JobCreated { job_id, .. }
            | DeliveryEvent::JobDispatched { job_id, .. }
            | DeliveryEvent::JobPrinted { job_id, .. }
            | DeliveryEvent::DuplicateSuppressed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            DeliveryEvent::JobCreated { job_id, .. } => format!("Job {} created", job_id),
            DeliveryEvent::JobDispatched {
                job_id,
                delivered,
                failed,
                ..
            } => format!(
                "Job {} dispatched to {} agent(s), {} failed",
                job_id, delivered, failed
            ),
            DeliveryEvent::JobPrinted { job_id, .. } => format!("Job {} printed", job_id),
            DeliveryEvent::DuplicateSuppressed { job_id, .. } => {
                format!("Job {} already printed, redelivery dropped", job_id)
            }
            DeliveryEvent::AgentConnected { connection_id, .. } => {
                format!("Agent {} connected", connection_id)
            }
            DeliveryEvent::AgentDisconnected { connection_id, .. } => {
                format!("Agent {} disconnected", connection_id)
            }
        }
    }
}
