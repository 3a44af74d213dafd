//! Typed domain event bus
//!
//! A small publish/subscribe registry with synchronous per-event
//! fan-out. Handler panics are isolated: one faulty subscriber never
//! interrupts the others or the publisher.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use tracing::warn;

use crate::controller::BufferState;
use crate::types::ForkliftState;

/// The closed set of domain events.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    BufferLevelChanged {
        level: f64,
        prev: BufferState,
        state: BufferState,
    },
    PalletDelivered {
        pallet_id: String,
    },
    PalletConsumed {
        pallet_id: String,
    },
    PalletRequested {
        count: u32,
        priority: u32,
    },
    ForkliftStateChanged {
        forklift_id: String,
        state: ForkliftState,
    },
    TaskStreamCompleted {
        stream_id: String,
        sequence_number: u64,
    },
}

type Handler = Box<dyn Fn(&DomainEvent) + Send + Sync>;

/// Synchronous fan-out event bus.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<Vec<(String, Handler)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named handler. The name only shows up in logs when
    /// the handler misbehaves.
    pub fn subscribe(&self, name: impl Into<String>, handler: impl Fn(&DomainEvent) + Send + Sync + 'static) {
        self.handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((name.into(), Box::new(handler)));
    }

    /// Publish to every subscriber, isolating panics per handler.
    pub fn publish(&self, event: &DomainEvent) {
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (name, handler) in handlers.iter() {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(handler = %name, event = ?event, "event handler panicked, isolated");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fan_out_reaches_every_subscriber() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = Arc::clone(&count);
            bus.subscribe("counter", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.publish(&DomainEvent::PalletDelivered { pallet_id: "PAL-1".into() });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panicking_handler_does_not_stop_the_rest() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));
        bus.subscribe("faulty", |_| panic!("boom"));
        {
            let reached = Arc::clone(&reached);
            bus.subscribe("healthy", move |_| {
                reached.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.publish(&DomainEvent::PalletConsumed { pallet_id: "PAL-2".into() });
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }
}
