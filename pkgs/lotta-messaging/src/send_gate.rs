//! Per-destination send lock
//!
//! Input for a destination stays locked while a send to it is in flight.
//! Sends to different destinations proceed independently.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::MessageDestination;

#[derive(Clone, Default)]
pub struct SendGate {
    in_flight: Arc<Mutex<HashSet<MessageDestination>>>,
}

impl SendGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `destination`, or `None` when a send to it is already running
    pub fn try_acquire(&self, destination: &MessageDestination) -> Option<SendPermit> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(destination.clone()) {
            return None;
        }
        Some(SendPermit {
            in_flight: Arc::clone(&self.in_flight),
            destination: destination.clone(),
        })
    }

    pub fn is_sending(&self, destination: &MessageDestination) -> bool {
        self.in_flight.lock().contains(destination)
    }
}

/// Releases its destination when dropped
#[must_use]
pub struct SendPermit {
    in_flight: Arc<Mutex<HashSet<MessageDestination>>>,
    destination: MessageDestination,
}

impl SendPermit {
    pub fn destination(&self) -> &MessageDestination {
        &self.destination
    }
}

impl Drop for SendPermit {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.destination);
    }
}
