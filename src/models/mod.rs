pub mod configuration;
pub mod operation;
pub mod page;
pub mod scanner;

pub use configuration::{ColorMode, FileFormat, PageSize, Resolution, ScanConfiguration, ScanSource};
pub use operation::{Completion, OperationId, OperationKind, ScanOperationState, ScanOutcome};
pub use page::{ScanImage, ScanResultPage};
pub use scanner::{ConnectionType, DiscoveredScanner, ScannerCapabilities};
