//! Agent websocket route.

use std::time::Duration;

use actors::{AgentFrame, AgentLink, AgentMailbox, DeliveryError};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use db::DbError;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use label_core::{AUTH_FAILED, AUTHENTICATED, ConnectionId, JobId};

use crate::init::AppState;
use crate::session::{Session, SessionAction};

/// Frames queued ahead of the writer. Broadcasts still wait for the transport write.
const FRAME_BUFFER: usize = 4;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| agent_connection(socket, state))
}

enum Inbound {
    Frame(Message),
    Closed,
    Idle,
}

async fn next_inbound(stream: &mut SplitStream<WebSocket>, idle: Option<Duration>) -> Inbound {
    let next = match idle {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Inbound::Idle,
        },
        None => stream.next().await,
    };

    match next {
        Some(Ok(message)) => Inbound::Frame(message),
        Some(Err(e)) => {
            tracing::debug!("Agent read failed: {}", e);
            Inbound::Closed
        }
        None => Inbound::Closed,
    }
}

async fn agent_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (link, mailbox) = AgentLink::channel(FRAME_BUFFER);
    let AgentMailbox {
        mut frames,
        evicted,
    } = mailbox;

    let registry = state.coordinator.registry().clone();
    let write_timeout = registry.write_timeout();
    let stalled = evicted.clone();

    // Writer: the only task touching the sink, so frames keep their order.
    let writer = tokio::spawn(async move {
        while let Some(outbound) = frames.recv().await {
            let (frame, receipt) = outbound.into_parts();
            let message = match frame {
                AgentFrame::Text(text) => Message::Text(text),
                AgentFrame::Close => {
                    let close = sink.send(Message::Close(None));
                    let _ = tokio::time::timeout(write_timeout, close).await;
                    break;
                }
            };
            match tokio::time::timeout(write_timeout, sink.send(message)).await {
                Ok(Ok(())) => receipt.confirm(),
                Ok(Err(e)) => {
                    tracing::debug!("Agent write failed: {}", e);
                    stalled.notify_one();
                    break;
                }
                Err(_) => {
                    tracing::warn!("Agent write timed out after {:?}", write_timeout);
                    stalled.notify_one();
                    break;
                }
            }
        }
        let _ = tokio::time::timeout(write_timeout, sink.close()).await;
    });

    let mut session = Session::new(state.secret.clone());
    let mut connection_id: Option<ConnectionId> = None;

    loop {
        let inbound = tokio::select! {
            _ = evicted.notified() => {
                tracing::info!(connection_id = ?connection_id, "Agent evicted");
                break;
            }
            inbound = next_inbound(&mut stream, state.idle_timeout) => inbound,
        };

        let action = match inbound {
            Inbound::Frame(Message::Text(text)) => session.on_text(&text),
            Inbound::Frame(Message::Binary(_)) => session.on_binary(),
            Inbound::Frame(Message::Close(_)) | Inbound::Closed => break,
            Inbound::Frame(_) => SessionAction::Ignore,
            Inbound::Idle => {
                tracing::warn!(connection_id = ?connection_id, "Agent idle too long, closing");
                link.send(AgentFrame::Close).await;
                break;
            }
        };

        match action {
            SessionAction::Authenticate => {
                // Reply before registering so no job frame can overtake it.
                if !link.send(AgentFrame::Text(AUTHENTICATED.to_string())).await {
                    break;
                }
                connection_id = Some(registry.add(link.clone()).await);
            }
            SessionAction::Reject => {
                tracing::warn!("Agent failed to authenticate");
                link.send(AgentFrame::Text(AUTH_FAILED.to_string())).await;
                link.send(AgentFrame::Close).await;
                break;
            }
            SessionAction::Close => {
                tracing::warn!("Protocol violation before handshake, closing");
                link.send(AgentFrame::Close).await;
                break;
            }
            SessionAction::Heartbeat => {
                tracing::trace!(connection_id = ?connection_id, "Heartbeat");
            }
            SessionAction::Ack(job_id) => acknowledge(&state, job_id, connection_id).await,
            SessionAction::InvalidAck(reason) => {
                tracing::warn!(connection_id = ?connection_id, "Invalid ack: {}", reason);
            }
            SessionAction::Ignore => {}
        }
    }

    if let Some(id) = connection_id {
        registry.remove(id).await;
    }
    drop(link);

    if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
        tracing::debug!(connection_id = ?connection_id, "Writer did not finish in time");
    }
}

async fn acknowledge(state: &AppState, job_id: JobId, connection_id: Option<ConnectionId>) {
    tracing::info!(job_id = %job_id, connection_id = ?connection_id, "Acked");
    match state.coordinator.acknowledge(job_id, connection_id).await {
        Ok(_) => {}
        Err(DeliveryError::Store(DbError::NotFound(_))) => {
            tracing::warn!(job_id = %job_id, "Ack for unknown job");
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, "Failed to record ack: {}", e);
        }
    }
}
