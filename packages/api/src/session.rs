//! Server side of the agent socket protocol.
//!
//! A connection starts unauthenticated and the only acceptable frame is the
//! shared secret. After that, the secret again is a heartbeat and any other
//! text is a decimal job id acknowledgment.

use label_core::{JobId, SharedSecret};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// What the connection task should do with an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Handshake succeeded: reply and register the connection.
    Authenticate,
    /// Handshake failed: reply with the failure text and close.
    Reject,
    /// Secret repeated by an authenticated agent.
    Heartbeat,
    /// The agent acknowledged a job.
    Ack(JobId),
    /// Text that is neither the secret nor a job id. Logged and skipped.
    InvalidAck(String),
    /// Frame with no meaning for the protocol.
    Ignore,
    /// Protocol violation: close without reply.
    Close,
}

/// Per-connection handshake and acknowledgment state.
#[derive(Debug)]
pub struct Session {
    secret: SharedSecret,
    state: SessionState,
}

impl Session {
    pub fn new(secret: SharedSecret) -> Self {
        Self {
            secret,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn on_text(&mut self, text: &str) -> SessionAction {
        match self.state {
            SessionState::Unauthenticated => {
                if self.secret.matches(text) {
                    self.state = SessionState::Authenticated;
                    SessionAction::Authenticate
                } else {
                    SessionAction::Reject
                }
            }
            SessionState::Authenticated => {
                if self.secret.matches(text) {
                    return SessionAction::Heartbeat;
                }
                match JobId::parse(text) {
                    Ok(id) => SessionAction::Ack(id),
                    Err(e) => SessionAction::InvalidAck(e.to_string()),
                }
            }
        }
    }

    pub fn on_binary(&mut self) -> SessionAction {
        match self.state {
            SessionState::Unauthenticated => SessionAction::Close,
            SessionState::Authenticated => SessionAction::Ignore,
        }
    }
}
