//! Event emission system.
//!
//! Valve events are pushed to subscribers (RPC bridges, audit sinks)
//! over a broadcast channel. Each subscriber has an independent buffer;
//! slow subscribers lag and drop, they never block the valve.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use flowvalve_types::events::ValveEvent;

/// Event bus for broadcasting valve events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ValveEvent>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: ValveEvent) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ValveEvent> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
