//! Typed event bus.
//!
//! Handlers register by [`EventKind`] and run synchronously inside the
//! operation that produced the event, after its persistent write and
//! before control returns to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use gossip_types::{EngineEvent, EventKind};

type Handler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Event bus with per-kind handler lists.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<HashMap<EventKind, Vec<Handler>>>>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&EngineEvent) + Send + Sync + 'static) {
        let mut handlers = self
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Deliver an event to the handlers of its kind, synchronously.
    pub fn emit(&self, event: &EngineEvent) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // Snapshot the list so a handler can register further handlers.
        let snapshot: Vec<Handler> = {
            let handlers = self
                .handlers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            handlers.get(&event.kind()).cloned().unwrap_or_default()
        };
        for handler in snapshot {
            handler(event);
        }
    }

    /// Total number of events emitted.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use gossip_types::UserId;

    use super::*;

    #[test]
    fn test_emit_reaches_registered_kind_only() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        bus.on(EventKind::SessionRenewalNeeded, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&EngineEvent::SessionRenewalNeeded {
            contact: UserId::from_bytes([1; 32]),
        });
        bus.emit(&EngineEvent::Error {
            detail: "unrelated".to_string(),
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.sequence(), 2);
    }

    #[test]
    fn test_handlers_run_synchronously() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        bus.on(EventKind::Error, move |event| {
            if let EngineEvent::Error { detail } = event {
                seen.lock().expect("lock").push(detail.clone());
            }
        });

        bus.emit(&EngineEvent::Error {
            detail: "first".to_string(),
        });
        // The handler has already run by the time emit returns.
        assert_eq!(order.lock().expect("lock").as_slice(), ["first"]);
    }

    #[test]
    fn test_event_payloads_serialize_for_rpc_forwarding() {
        let event = EngineEvent::Error {
            detail: "ratchet out of sync".to_string(),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({ "error": { "detail": "ratchet out of sync" } })
        );

        let event = EngineEvent::SessionRenewalNeeded {
            contact: UserId::from_bytes([7; 32]),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value["session_renewal_needed"]["contact"],
            serde_json::json!(vec![7u8; 32])
        );
        let restored: EngineEvent = serde_json::from_value(value).expect("deserialize");
        assert_eq!(restored.kind(), EventKind::SessionRenewalNeeded);
    }

    #[test]
    fn test_handler_can_register_handler() {
        let bus = EventBus::new();
        let clone = bus.clone();
        bus.on(EventKind::Error, move |_| {
            clone.on(EventKind::MessageReceived, |_| {});
        });
        bus.emit(&EngineEvent::Error {
            detail: "x".to_string(),
        });
    }
}
