use std::fmt;

use serde::{Deserialize, Serialize};

use super::page::ScanImage;
use crate::device::DeviceFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOperationState {
    Idle,
    PreviewInProgress,
    ScanInProgress,
    Cancelling,
}

impl ScanOperationState {
    pub fn is_idle(self) -> bool {
        self == ScanOperationState::Idle
    }
}

impl fmt::Display for ScanOperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanOperationState::Idle => "idle",
            ScanOperationState::PreviewInProgress => "preview in progress",
            ScanOperationState::ScanInProgress => "scan in progress",
            ScanOperationState::Cancelling => "cancelling",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Preview,
    Scan,
}

impl OperationKind {
    pub fn in_progress_state(self) -> ScanOperationState {
        match self {
            OperationKind::Preview => ScanOperationState::PreviewInProgress,
            OperationKind::Scan => ScanOperationState::ScanInProgress,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Preview => f.write_str("Preview"),
            OperationKind::Scan => f.write_str("Scan"),
        }
    }
}

/// Identifies one started preview or scan. Ids increase monotonically per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Preview(ScanImage),
    Pages { count: u32 },
}

/// Terminal value of a preview or scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed(Completion),
    Cancelled,
    Failed(DeviceFault),
}

impl ScanOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ScanOutcome::Completed(_) => "completed",
            ScanOutcome::Cancelled => "cancelled",
            ScanOutcome::Failed(_) => "failed",
        }
    }
}
