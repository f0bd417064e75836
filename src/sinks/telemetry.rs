use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::{Attributes, TelemetrySink};

/// Event names the service reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryEvent {
    Preview,
    ScanStarted,
    ScanCompleted,
    ScanFailed,
    ScanCancelled,
    /// A Result Sink rejected a page or preview.
    ResultSinkError,
}

impl TelemetryEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            TelemetryEvent::Preview => "Preview",
            TelemetryEvent::ScanStarted => "ScanStarted",
            TelemetryEvent::ScanCompleted => "ScanCompleted",
            TelemetryEvent::ScanFailed => "ScanFailed",
            TelemetryEvent::ScanCancelled => "ScanCancelled",
            TelemetryEvent::ResultSinkError => "ResultSinkError",
        }
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes every tracked event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn track(&self, event: &str, attributes: &Attributes) {
        let mut pairs: Vec<_> = attributes.iter().collect();
        pairs.sort();
        tracing::info!(target: "pagescan::telemetry", event, attributes = ?pairs, "telemetry");
    }
}

/// Counts events by name and remembers the attributes of the latest one.
#[derive(Debug, Default)]
pub struct TelemetryCounter {
    counts: DashMap<String, u64>,
    last: DashMap<String, Attributes>,
}

impl TelemetryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, event: &str) -> u64 {
        self.counts.get(event).map(|c| *c).unwrap_or(0)
    }

    pub fn last_attributes(&self, event: &str) -> Option<Attributes> {
        self.last.get(event).map(|a| a.clone())
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    /// Counts sorted by event name.
    pub fn summary(&self) -> Vec<(String, u64)> {
        let mut out: Vec<_> = self
            .counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        out.sort();
        out
    }
}

impl TelemetrySink for TelemetryCounter {
    fn track(&self, event: &str, attributes: &Attributes) {
        *self.counts.entry(event.to_string()).or_insert(0) += 1;
        self.last.insert(event.to_string(), attributes.clone());
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default)]
pub struct TelemetryFanout {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl TelemetryFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl TelemetrySink for TelemetryFanout {
    fn track(&self, event: &str, attributes: &Attributes) {
        for sink in &self.sinks {
            sink.track(event, attributes);
        }
    }
}
