//! Monitoring events (spec §6): every storage operation emits
//! `{event, latency_ns, [bytes], [id], [position]}`. Consumers of this
//! stream are outside the core — this module only defines the shape and a
//! default `tracing`-backed sink.

#[derive(Debug, Clone)]
pub struct MonitorEvent {
    pub event: &'static str,
    pub latency_ns: u64,
    pub bytes: Option<usize>,
    pub id: Option<String>,
    pub position: Option<i64>,
}

pub trait MonitorSink: Send + Sync + 'static {
    fn emit(&self, event: MonitorEvent);
}

/// Default sink: forwards every event as a structured `tracing::info!` span,
/// matching the teacher crate's convention of logging request metadata
/// rather than routing it through a bespoke metrics pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MonitorSink for TracingSink {
    fn emit(&self, event: MonitorEvent) {
        tracing::info!(
            event = event.event,
            latency_ns = event.latency_ns,
            bytes = event.bytes,
            id = event.id.as_deref(),
            position = event.position,
            "onyx-log operation"
        );
    }
}

/// A sink that records every event for assertions in tests.
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<MonitorEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().expect("monitor lock poisoned").clone()
    }
}

impl MonitorSink for RecordingSink {
    fn emit(&self, event: MonitorEvent) {
        self.events.lock().expect("monitor lock poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::{logs_contain, traced_test};

    #[traced_test]
    #[test]
    fn tracing_sink_logs_the_event_shape() {
        TracingSink.emit(MonitorEvent {
            event: "write_log_entry",
            latency_ns: 42,
            bytes: Some(128),
            id: None,
            position: Some(7),
        });
        assert!(logs_contain("onyx-log operation"));
        assert!(logs_contain("write_log_entry"));
    }

    #[test]
    fn recording_sink_accumulates_events_in_order() {
        let sink = RecordingSink::new();
        sink.emit(MonitorEvent {
            event: "write_origin",
            latency_ns: 1,
            bytes: None,
            id: None,
            position: Some(1),
        });
        sink.emit(MonitorEvent {
            event: "read_origin",
            latency_ns: 2,
            bytes: None,
            id: None,
            position: Some(1),
        });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "write_origin");
        assert_eq!(events[1].event, "read_origin");
    }
}
