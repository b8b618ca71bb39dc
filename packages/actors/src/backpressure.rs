//! Keeps the bus from handing out jobs while no agent can take them.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::bus::BusClient;
use crate::messages::BusError;

/// In-flight limit for a given number of connected agents.
///
/// Only the zero / non-zero distinction matters: one job at a time is
/// dispatched whenever any agent is listening.
pub fn in_flight_limit(occupancy: usize) -> u32 {
    if occupancy == 0 { 0 } else { 1 }
}

/// Something whose delivery rate can be throttled.
pub trait FlowControl: Send + Sync {
    fn set_in_flight_limit(&self, limit: u32) -> Result<(), BusError>;
}

impl FlowControl for BusClient {
    fn set_in_flight_limit(&self, limit: u32) -> Result<(), BusError> {
        self.set_max_in_flight(limit)
    }
}

const UNSET: u32 = u32::MAX;

/// Applies [`in_flight_limit`] whenever registry occupancy changes.
pub struct BackpressureController {
    flow: Box<dyn FlowControl>,
    applied: AtomicU32,
}

impl BackpressureController {
    pub fn new(flow: impl FlowControl + 'static) -> Self {
        Self {
            flow: Box::new(flow),
            applied: AtomicU32::new(UNSET),
        }
    }

    /// Recompute the limit for `occupancy` and push it if it changed.
    ///
    /// A failed push is logged and retried on the next change.
    pub fn occupancy_changed(&self, occupancy: usize) {
        let limit = in_flight_limit(occupancy);
        if self.applied.load(Ordering::Acquire) == limit {
            return;
        }

        match self.flow.set_in_flight_limit(limit) {
            Ok(()) => {
                self.applied.store(limit, Ordering::Release);
                tracing::info!(occupancy, limit, "Adjusted in-flight limit");
            }
            Err(e) => {
                self.applied.store(UNSET, Ordering::Release);
                tracing::error!(occupancy, limit, "Failed to adjust in-flight limit: {}", e);
            }
        }
    }

    /// Last limit successfully applied.
    pub fn applied_limit(&self) -> Option<u32> {
        match self.applied.load(Ordering::Acquire) {
            UNSET => None,
            limit => Some(limit),
        }
    }
}
