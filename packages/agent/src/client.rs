//! Socket connection to the label server.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use futures_util::{Sink, SinkExt, StreamExt};
use label_core::SharedSecret;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::config::AgentConfig;
use crate::frames::{AgentStep, FrameHandler};
use crate::printer::PrintAction;

/// How long to wait for the server to acknowledge our close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to connect: {0}")]
    Connect(tungstenite::Error),

    #[error("connection failed: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Why a connection ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Local shutdown; the close handshake was performed.
    Shutdown,
    /// The server closed the connection.
    ServerClosed,
}

/// A print agent bound to one server and one printer.
pub struct Agent<P> {
    url: String,
    secret: SharedSecret,
    heartbeat: Duration,
    max_age: Duration,
    printer: P,
}

impl<P: PrintAction> Agent<P> {
    pub fn new(config: &AgentConfig, printer: P) -> Self {
        Self {
            url: config.url(),
            secret: SharedSecret::new(config.ws_password.clone()),
            heartbeat: config.heartbeat(),
            max_age: config.max_age(),
            printer,
        }
    }

    /// Override the heartbeat interval.
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn printer(&self) -> &P {
        &self.printer
    }

    /// Connect, authenticate and handle jobs until the server goes away or
    /// `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<SessionEnd, AgentError> {
        tracing::info!("Connecting to {}", self.url);
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(AgentError::Connect)?;
        let (mut sink, mut stream) = socket.split();
        tracing::info!("Waiting for messages");

        let mut frames = FrameHandler::new(self.max_age);
        // First tick fires immediately and doubles as the handshake.
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Interrupted, closing connection");
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    }));
                    if let Err(e) = sink.send(close).await {
                        tracing::warn!("Failed to send close frame: {}", e);
                        return Ok(SessionEnd::Shutdown);
                    }
                    let drained = tokio::time::timeout(CLOSE_GRACE, async {
                        while let Some(Ok(message)) = stream.next().await {
                            if message.is_close() {
                                break;
                            }
                        }
                    })
                    .await;
                    if drained.is_err() {
                        tracing::debug!("Server did not close in time");
                    }
                    return Ok(SessionEnd::Shutdown);
                }

                _ = heartbeat.tick() => {
                    sink.send(Message::Text(self.secret.expose().into())).await?;
                }

                next = stream.next() => match next {
                    Some(Ok(Message::Text(text))) => {
                        self.on_text(&mut sink, &mut frames, text.as_str()).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        if !frames.is_authenticated() {
                            return Err(AgentError::Protocol(
                                "server closed before authentication".into(),
                            ));
                        }
                        tracing::info!("Server closed the connection");
                        return Ok(SessionEnd::ServerClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }

    async fn on_text<S>(
        &self,
        sink: &mut S,
        frames: &mut FrameHandler,
        text: &str,
    ) -> Result<(), AgentError>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        match frames.on_text(text, Utc::now()) {
            AgentStep::Ignore => {}
            AgentStep::Authenticated => tracing::info!("Successfully authenticated"),
            AgentStep::Refused => {
                let _ = sink.send(Message::Close(None)).await;
                return Err(AgentError::Protocol("authentication refused".into()));
            }
            AgentStep::Job { job, stale } => {
                tracing::info!(job_id = %job.id, timestamp = job.timestamp, "Received");

                // Ack before anything else so the server never resends it.
                sink.send(Message::Text(job.ack().into())).await?;
                tracing::debug!(job_id = %job.id, "Acked");

                if stale {
                    tracing::warn!(job_id = %job.id, "Too old, not printing");
                    return Ok(());
                }

                match self.printer.print(&job.print).await {
                    Ok(()) => tracing::info!(job_id = %job.id, "Printed"),
                    Err(e) => tracing::error!(job_id = %job.id, "Print failed, dropping job: {}", e),
                }
            }
            AgentStep::Malformed(reason) => {
                let _ = sink.send(Message::Close(None)).await;
                return Err(AgentError::Protocol(format!("bad job frame: {}", reason)));
            }
        }
        Ok(())
    }
}
