use compact_str::CompactString;

use super::validation::UnsupportedConfiguration;
use crate::models::ScanOperationState;

/// Rejections returned synchronously by the orchestration service.
///
/// None of these change the service state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("operation not allowed while {current}")]
    InvalidState { current: ScanOperationState },

    #[error(transparent)]
    UnsupportedConfiguration(#[from] UnsupportedConfiguration),

    #[error("{operation} is not supported by device {device}")]
    UnsupportedOperation {
        operation: &'static str,
        device: CompactString,
    },

    #[error("no Tokio runtime available to drive the operation")]
    NoRuntime,
}
