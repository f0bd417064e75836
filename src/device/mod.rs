//! Device handle abstraction.
//!
//! A [`DeviceHandle`] proxies one discovered scanner. The orchestration service is
//! the only caller and never issues two operations on one handle at the same time,
//! so implementations do not need to serialize calls themselves.
//!
//! Starting an operation is synchronous: `fetch_preview` and `execute_scan` put
//! the device in flight before they return, and the returned future or stream
//! only waits for its results. An `abort()` issued after the call returns must
//! reach that operation.

pub mod simulated;

use std::fmt;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::{DiscoveredScanner, ScanConfiguration, ScanImage, ScannerCapabilities};

/// Lazy, finite sequence of captured images. Not restartable.
///
/// Ends normally after the last page; an `Err` item is always the final item.
pub type PageStream = BoxStream<'static, Result<ScanImage, DeviceError>>;

/// Pending result of a preview capture.
pub type PreviewFuture = BoxFuture<'static, Result<ScanImage, DeviceError>>;

pub trait DeviceHandle: Send + Sync {
    fn scanner(&self) -> &DiscoveredScanner;

    fn capabilities(&self) -> &ScannerCapabilities;

    /// Starts capturing a single low-resolution preview.
    fn fetch_preview(&self, config: &ScanConfiguration) -> PreviewFuture;

    /// Starts a scan job. Each stream item becomes available when the device
    /// finishes a physical page. Errors here mean the job never started.
    fn execute_scan(&self, config: &ScanConfiguration) -> Result<PageStream, DeviceError>;

    /// Best-effort request to stop the in-flight preview or scan. Idempotent.
    ///
    /// An acknowledged abort surfaces as [`DeviceError::Aborted`] from the
    /// in-flight call or stream. The device may still finish normally if it
    /// was already done when the request arrived.
    fn abort(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum FaultKind {
    Disconnected,
    PaperJam,
    OutOfPaper,
    Busy,
    Unknown,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultKind::Disconnected => "disconnected",
            FaultKind::PaperJam => "jam",
            FaultKind::OutOfPaper => "out of paper",
            FaultKind::Busy => "busy",
            FaultKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Transport or hardware problem reported by a device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DeviceFault {
    pub kind: FaultKind,
    pub reason: String,
}

impl DeviceFault {
    pub fn new(kind: FaultKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<FaultKind> for DeviceFault {
    fn from(kind: FaultKind) -> Self {
        Self::new(kind, kind.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Fault(#[from] DeviceFault),

    #[error("operation aborted by device")]
    Aborted,
}
