use compact_str::CompactString;
use tokio::sync::mpsc;

use crate::device::DeviceFault;
use crate::models::{
    Completion, OperationId, OperationKind, ScanImage, ScanOutcome, ScanResultPage, ScanSource,
};

/// Lifecycle events of the orchestration service.
///
/// Per operation the order is: `ScanStarted`, zero or more `PageCaptured`
/// with strictly increasing index, then exactly one terminal event.
#[derive(Debug, Clone)]
pub enum Event {
    ScanStarted {
        operation: OperationId,
        kind: OperationKind,
        scanner: CompactString,
        source: ScanSource,
    },
    PageCaptured {
        operation: OperationId,
        page: ScanResultPage,
    },

    // Terminal
    PreviewReady {
        operation: OperationId,
        image: ScanImage,
    },
    ScanCompleted {
        operation: OperationId,
        pages: u32,
        duration_ms: u64,
    },
    OperationCancelled {
        operation: OperationId,
        kind: OperationKind,
        pages: u32,
    },
    OperationFailed {
        operation: OperationId,
        kind: OperationKind,
        fault: DeviceFault,
        pages: u32,
    },
}

impl Event {
    pub fn operation(&self) -> OperationId {
        match self {
            Event::ScanStarted { operation, .. }
            | Event::PageCaptured { operation, .. }
            | Event::PreviewReady { operation, .. }
            | Event::ScanCompleted { operation, .. }
            | Event::OperationCancelled { operation, .. }
            | Event::OperationFailed { operation, .. } => *operation,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::ScanStarted { .. } | Event::PageCaptured { .. })
    }

    /// The outcome a terminal event closes its operation with.
    pub fn outcome(&self) -> Option<ScanOutcome> {
        match self {
            Event::PreviewReady { image, .. } => {
                Some(ScanOutcome::Completed(Completion::Preview(image.clone())))
            }
            Event::ScanCompleted { pages, .. } => {
                Some(ScanOutcome::Completed(Completion::Pages { count: *pages }))
            }
            Event::OperationCancelled { .. } => Some(ScanOutcome::Cancelled),
            Event::OperationFailed { fault, .. } => Some(ScanOutcome::Failed(fault.clone())),
            Event::ScanStarted { .. } | Event::PageCaptured { .. } => None,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
