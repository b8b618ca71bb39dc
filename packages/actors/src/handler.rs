//! Message handler trait for topic consumers.

use std::future::Future;
use std::pin::Pin;

use crate::messages::BusMessage;

/// Result type for message handlers. `Err` requeues the message.
pub type HandlerResult = Result<(), String>;

/// Future type for async message handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for message handlers.
///
/// Returning `Ok` finishes the message. Returning `Err` (or exceeding the
/// consumer's handler timeout) requeues it for another delivery attempt.
pub trait MessageHandler: Send + Sync + 'static {
    /// Process a message.
    fn handle(&self, message: &BusMessage) -> HandlerFuture;
}

/// A simple function-based message handler.
pub struct FnHandler<F>
where
    F: Fn(&BusMessage) -> HandlerFuture + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&BusMessage) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&BusMessage) -> HandlerFuture + Send + Sync + 'static,
{
    fn handle(&self, message: &BusMessage) -> HandlerFuture {
        (self.handler)(message)
    }
}
