//! Registry of authenticated agent connections.
//!
//! Every mutation recomputes occupancy under the registry lock and hands it
//! to the backpressure controller, so the bus in-flight limit is zero exactly
//! when the registry is empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use label_core::{ConnectionId, DeliveryEvent};
use tokio::sync::{Mutex, Notify, broadcast, mpsc, oneshot};

use crate::backpressure::BackpressureController;

/// Outbound frame for one agent connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentFrame {
    Text(String),
    Close,
}

/// A queued frame. Broadcast frames carry a receipt the writer confirms once
/// the frame has reached the transport.
#[derive(Debug)]
pub struct Outbound {
    pub frame: AgentFrame,
    receipt: WriteReceipt,
}

#[derive(Debug)]
pub struct WriteReceipt(Option<oneshot::Sender<()>>);

impl WriteReceipt {
    /// Report a completed transport write. Dropping the receipt reports failure.
    pub fn confirm(self) {
        if let Some(tx) = self.0 {
            let _ = tx.send(());
        }
    }
}

impl Outbound {
    pub fn into_parts(self) -> (AgentFrame, WriteReceipt) {
        (self.frame, self.receipt)
    }
}

/// Registry side of a connection: where frames go and how to evict it.
#[derive(Debug, Clone)]
pub struct AgentLink {
    frames: mpsc::Sender<Outbound>,
    evict: Arc<Notify>,
}

/// Session side of a connection.
#[derive(Debug)]
pub struct AgentMailbox {
    pub frames: mpsc::Receiver<Outbound>,
    /// Signalled when the registry drops the connection.
    pub evicted: Arc<Notify>,
}

impl AgentMailbox {
    /// Take the next frame and count it as written.
    pub async fn next_frame(&mut self) -> Option<AgentFrame> {
        let (frame, receipt) = self.frames.recv().await?.into_parts();
        receipt.confirm();
        Some(frame)
    }
}

impl AgentLink {
    /// Create a linked pair with room for `capacity` queued frames.
    pub fn channel(capacity: usize) -> (AgentLink, AgentMailbox) {
        let (tx, rx) = mpsc::channel(capacity);
        let evict = Arc::new(Notify::new());
        (
            AgentLink {
                frames: tx,
                evict: evict.clone(),
            },
            AgentMailbox {
                frames: rx,
                evicted: evict,
            },
        )
    }

    /// Queue a frame for this connection. False once the session has gone.
    pub async fn send(&self, frame: AgentFrame) -> bool {
        let outbound = Outbound {
            frame,
            receipt: WriteReceipt(None),
        };
        self.frames.send(outbound).await.is_ok()
    }

    /// Queue `text` and wait until the writer has put it on the transport.
    async fn write(&self, text: String, deadline: Duration) -> Result<(), &'static str> {
        let (tx, rx) = oneshot::channel();
        let outbound = Outbound {
            frame: AgentFrame::Text(text),
            receipt: WriteReceipt(Some(tx)),
        };
        let write = async {
            self.frames
                .send(outbound)
                .await
                .map_err(|_| "connection closed")?;
            rx.await.map_err(|_| "write failed")
        };
        tokio::time::timeout(deadline, write)
            .await
            .unwrap_or(Err("write timed out"))
    }

    fn evict(&self) {
        self.evict.notify_one();
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<ConnectionId>,
    /// Connections that failed the write and were removed.
    pub failed: Vec<(ConnectionId, String)>,
}

impl BroadcastReport {
    pub fn delivered_any(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Set of authenticated agent connections.
pub struct ConnectionRegistry {
    members: Mutex<HashMap<ConnectionId, AgentLink>>,
    write_timeout: Duration,
    backpressure: Option<BackpressureController>,
    events: Option<broadcast::Sender<DeliveryEvent>>,
}

impl ConnectionRegistry {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            write_timeout,
            backpressure: None,
            events: None,
        }
    }

    /// Drive `controller` from occupancy changes. Applies the empty limit immediately.
    pub fn with_backpressure(mut self, controller: BackpressureController) -> Self {
        controller.occupancy_changed(0);
        self.backpressure = Some(controller);
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<DeliveryEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn occupancy_changed(&self, occupancy: usize) {
        if let Some(controller) = &self.backpressure {
            controller.occupancy_changed(occupancy);
        }
    }

    fn emit(&self, event: DeliveryEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Register a freshly authenticated connection.
    pub async fn add(&self, link: AgentLink) -> ConnectionId {
        let id = ConnectionId::new();
        {
            let mut members = self.members.lock().await;
            members.insert(id, link);
            self.occupancy_changed(members.len());
            tracing::info!(connection_id = %id, occupancy = members.len(), "Agent registered");
        }
        self.emit(DeliveryEvent::AgentConnected {
            connection_id: id,
            timestamp: Utc::now(),
        });
        id
    }

    /// Remove a connection. Returns false when it was already gone.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut members = self.members.lock().await;
            let removed = members.remove(&id).is_some();
            if removed {
                self.occupancy_changed(members.len());
                tracing::info!(connection_id = %id, occupancy = members.len(), "Agent unregistered");
            }
            removed
        };
        if removed {
            self.emit(DeliveryEvent::AgentDisconnected {
                connection_id: id,
                timestamp: Utc::now(),
            });
        }
        removed
    }

    /// Deadline for one frame to reach an agent's transport.
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub async fn count(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.members.lock().await.contains_key(&id)
    }

    /// Write `text` to every member concurrently.
    ///
    /// A member counts as delivered once its writer has put the frame on the
    /// transport, within the registry's write timeout. Members whose write
    /// fails or times out are removed and told to close.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        let snapshot: Vec<(ConnectionId, AgentLink)> = {
            let members = self.members.lock().await;
            members.iter().map(|(id, link)| (*id, link.clone())).collect()
        };

        let write_timeout = self.write_timeout;
        let writes = snapshot.iter().map(|(id, link)| async move {
            (*id, link.write(text.to_string(), write_timeout).await)
        });

        let mut report = BroadcastReport::default();
        for (id, result) in join_all(writes).await {
            match result {
                Ok(()) => report.delivered.push(id),
                Err(reason) => report.failed.push((id, reason.to_string())),
            }
        }

        for (id, reason) in &report.failed {
            tracing::warn!(connection_id = %id, "Dropping agent after failed write: {}", reason);
            if let Some((_, link)) = snapshot.iter().find(|(member, _)| member == id) {
                link.evict();
            }
            self.remove(*id).await;
        }

        report
    }

    /// Close and forget every connection.
    pub async fn disconnect_all(&self) {
        let drained: Vec<(ConnectionId, AgentLink)> = {
            let mut members = self.members.lock().await;
            let drained = members.drain().collect();
            self.occupancy_changed(0);
            drained
        };

        for (id, link) in drained {
            let _ = link.frames.try_send(Outbound {
                frame: AgentFrame::Close,
                receipt: WriteReceipt(None),
            });
            link.evict();
            self.emit(DeliveryEvent::AgentDisconnected {
                connection_id: id,
                timestamp: Utc::now(),
            });
        }
    }
}
