//! Print agent: connects to the label server, acknowledges every job it is
//! sent, and prints the ones that are not stale.

mod client;
mod config;
mod frames;
mod printer;
mod staleness;

pub use client::{Agent, AgentError, SessionEnd};
pub use config::AgentConfig;
pub use frames::{AgentStep, FrameHandler};
pub use printer::{CommandPrinter, PrintAction, PrintError};
pub use staleness::is_stale;
