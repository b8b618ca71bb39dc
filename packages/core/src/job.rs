//! Job domain types for label print requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identifier for a job.
///
/// Ids come from a monotonic sequence in the job store, so they are plain
/// integers on the wire and as bus message bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Parse a job ID from its decimal string form.
    pub fn parse(s: &str) -> Result<Self, std::num::ParseIntError> {
        Ok(Self(s.trim().parse()?))
    }

    /// Raw integer value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Delivery state of a job.
///
/// The only transition is `Pending -> Printed`, and it happens at most once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// Waiting for an agent to acknowledge it.
    #[default]
    Pending,
    /// Acknowledged by an agent.
    Printed,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Pending => "pending",
            DeliveryState::Printed => "printed",
        }
    }

    pub fn is_printed(&self) -> bool {
        matches!(self, DeliveryState::Printed)
    }
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted label print request and its delivery lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, immutable after creation.
    pub id: JobId,
    /// Rendered label (ZPL).
    pub content: String,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Current delivery state.
    pub state: DeliveryState,
    /// When an agent acknowledged the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Check if the job has already been acknowledged.
    pub fn is_printed(&self) -> bool {
        self.state.is_printed()
    }

    /// The reference carried on the durable bus for this job.
    pub fn reference(&self) -> JobReference {
        JobReference(self.id)
    }

    /// The frame pushed to socket agents for this job.
    pub fn to_wire(&self) -> WireJob {
        WireJob {
            id: self.id,
            timestamp: self.created_at.timestamp(),
            print: self.content.clone(),
        }
    }
}

/// The unit carried on the durable bus: only the job id, never the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobReference(pub JobId);

impl JobReference {
    /// Encode as a bus message body.
    pub fn to_body(&self) -> String {
        self.0.to_string()
    }

    /// Decode a bus message body.
    pub fn from_body(body: &str) -> Result<Self, std::num::ParseIntError> {
        Ok(Self(JobId::parse(body)?))
    }

    pub fn job_id(&self) -> JobId {
        self.0
    }
}

/// One job as pushed to a socket agent: `{id, timestamp, print}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireJob {
    pub id: JobId,
    /// Creation time in unix seconds.
    pub timestamp: i64,
    /// Rendered label.
    pub print: String,
}

impl WireJob {
    /// The acknowledgment text an agent replies with.
    pub fn ack(&self) -> String {
        self.id.to_string()
    }
}
