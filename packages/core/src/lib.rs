//! Core domain types for label job delivery.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobId and DeliveryState for print requests
//! - WireJob and JobReference for the two delivery transports
//! - LabelRequest for submissions and ZPL rendering
//! - SignatureGate and SharedSecret for the trust boundaries
//! - Events for observing delivery

mod connection;
mod events;
mod job;
mod label;
mod secret;
mod signature;

pub use connection::ConnectionId;
pub use events::DeliveryEvent;
pub use job::{DeliveryState, Job, JobId, JobReference, WireJob};
pub use label::{FieldError, LabelRequest, require_not_blank};
pub use secret::{AUTH_FAILED, AUTHENTICATED, SharedSecret};
pub use signature::{GateError, SignatureGate};
