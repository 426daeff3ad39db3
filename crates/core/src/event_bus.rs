//! Server event sink — the seam between the forwarder and the network.
//!
//! The forwarder hands each finished [`ServerEventEnvelope`] to an
//! `Arc<dyn EventSink>`. Production code posts it to the first-party endpoint;
//! tests capture it in memory.

use crate::types::{EventKind, ServerEventEnvelope};
use std::sync::{Arc, Mutex};

/// Receives server-mirrored events. `emit` must return promptly and must not
/// fail: delivery is fire-and-forget.
pub trait EventSink: Send + Sync {
    fn emit(&self, endpoint: &str, envelope: ServerEventEnvelope);
}

/// No-op sink for trackers without server mirroring.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _endpoint: &str, _envelope: ServerEventEnvelope) {}
}

/// An envelope together with the endpoint it was addressed to.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub endpoint: String,
    pub envelope: ServerEventEnvelope,
}

/// In-memory sink that captures envelopes for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<CapturedEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().expect("event sink mutex poisoned").clone()
    }

    pub fn envelopes(&self) -> Vec<ServerEventEnvelope> {
        self.events()
            .into_iter()
            .map(|captured| captured.envelope)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event sink mutex poisoned").len()
    }

    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .expect("event sink mutex poisoned")
            .iter()
            .filter(|e| e.envelope.event_name == kind.as_str())
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event sink mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, endpoint: &str, envelope: ServerEventEnvelope) {
        self.events
            .lock()
            .expect("event sink mutex poisoned")
            .push(CapturedEvent {
                endpoint: endpoint.to_string(),
                envelope,
            });
    }
}

/// Convenience: a sink that drops everything.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{PagePayload, SearchPayload, TrackedEvent, UserData};
    use chrono::Utc;

    fn envelope(event: &TrackedEvent, id: &str) -> ServerEventEnvelope {
        ServerEventEnvelope::new(event, id, UserData::default(), None, Utc::now())
    }

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        let search = TrackedEvent::Search(SearchPayload {
            query: "boots".into(),
        });
        let page = TrackedEvent::PageView(PagePayload::default());
        sink.emit("/api/tracking/shop/event", envelope(&search, "1-a"));
        sink.emit("/api/tracking/shop/event", envelope(&page, "2-b"));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_kind(EventKind::Search), 1);
        assert_eq!(sink.count_kind(EventKind::PageView), 1);

        let events = sink.events();
        assert_eq!(events[0].endpoint, "/api/tracking/shop/event");
        assert_eq!(events[1].envelope.event_id, "2-b");

        sink.clear();
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        let page = TrackedEvent::HomePageView(PagePayload::default());
        // Should not panic
        sink.emit("/ignored", envelope(&page, "1-a"));
    }
}
