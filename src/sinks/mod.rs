//! Outbound collaborators of the orchestration service.
//!
//! Both sinks are called synchronously from the service's event path and must
//! return quickly; a slow sink stalls delivery of the next page.

pub mod result;
pub mod telemetry;

use std::collections::HashMap;

use crate::models::{ScanImage, ScanResultPage};

pub use result::PageCollector;
pub use telemetry::{TelemetryCounter, TelemetryEvent, TelemetryFanout, TracingTelemetry};

/// Receives captured pages and previews. Ownership of each page moves here as
/// soon as it is captured.
pub trait ResultSink: Send + Sync {
    fn receive_page(&self, page: ScanResultPage) -> anyhow::Result<()>;

    fn receive_preview(&self, image: ScanImage) -> anyhow::Result<()>;
}

pub type Attributes = HashMap<String, String>;

/// Fire-and-forget lifecycle reporting. Implementations must not block.
pub trait TelemetrySink: Send + Sync {
    fn track(&self, event: &str, attributes: &Attributes);
}
