//! HTTP and websocket surface of the label server.
//!
//! - `GET /` - welcome text
//! - `GET /ws` - agent socket (shared-secret handshake, job frames, acks)
//! - `POST /print` - signed label submissions

mod config;
mod init;
pub mod session;
mod submission;
mod ws;

use axum::Router;
use axum::routing::{get, post};

pub use config::{ConfigError, ServerConfig};
pub use init::{AppState, InitError, JOB_TOPIC, LabelServer, init_label_server};
pub use submission::{PrintRequest, SubmissionError, submit};

pub const WELCOME: &str = "Welcome to the 3D Printing Label Server!";

async fn welcome() -> &'static str {
    WELCOME
}

/// Build the router over `state`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/ws", get(ws::ws_handler))
        .route("/print", post(submission::print_handler))
        .with_state(state)
}
