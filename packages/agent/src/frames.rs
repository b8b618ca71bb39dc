//! Agent side of the socket protocol.

use std::time::Duration;

use chrono::{DateTime, Utc};
use label_core::{AUTH_FAILED, AUTHENTICATED, WireJob};

use crate::staleness::is_stale;

/// What to do with one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    /// Nothing to do (pre-handshake chatter).
    Ignore,
    /// The server accepted the secret.
    Authenticated,
    /// The server rejected the secret.
    Refused,
    /// A job: acknowledge it, then print unless stale.
    Job { job: WireJob, stale: bool },
    /// Unparseable job frame. The connection is closed.
    Malformed(String),
}

/// Tracks the handshake and classifies job frames.
#[derive(Debug)]
pub struct FrameHandler {
    authenticated: bool,
    max_age: Duration,
}

impl FrameHandler {
    pub fn new(max_age: Duration) -> Self {
        Self {
            authenticated: false,
            max_age,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn on_text(&mut self, text: &str, now: DateTime<Utc>) -> AgentStep {
        if !self.authenticated {
            if text == AUTHENTICATED {
                self.authenticated = true;
                return AgentStep::Authenticated;
            }
            if text == AUTH_FAILED {
                return AgentStep::Refused;
            }
            return AgentStep::Ignore;
        }

        match serde_json::from_str::<WireJob>(text) {
            Ok(job) => {
                let stale = is_stale(job.timestamp, now, self.max_age);
                AgentStep::Job { job, stale }
            }
            Err(e) => AgentStep::Malformed(e.to_string()),
        }
    }
}
