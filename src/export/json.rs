use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    Completion, DiscoveredScanner, OperationKind, ScanConfiguration, ScanOutcome, ScanResultPage,
};

/// Metadata summary of one preview or scan. Image payloads are not included.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub device: DiscoveredScanner,
    pub configuration: ScanConfiguration,
    pub kind: OperationKind,
    pub outcome: String,
    pub fault: Option<String>,
    pub pages: Vec<PageRecord>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    pub index: u32,
    pub bytes: usize,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl From<&ScanResultPage> for PageRecord {
    fn from(page: &ScanResultPage) -> Self {
        Self {
            index: page.index,
            bytes: page.image.len(),
            width: page.image.width,
            height: page.image.height,
            captured_at: page.image.captured_at,
        }
    }
}

impl RunReport {
    pub fn new(
        device: DiscoveredScanner,
        configuration: ScanConfiguration,
        kind: OperationKind,
        outcome: &ScanOutcome,
        pages: &[ScanResultPage],
    ) -> Self {
        let fault = match outcome {
            ScanOutcome::Failed(fault) => Some(fault.reason.clone()),
            _ => None,
        };
        let pages = match outcome {
            // A preview is reported as a single page with index 0.
            ScanOutcome::Completed(Completion::Preview(image)) => vec![PageRecord {
                index: 0,
                bytes: image.len(),
                width: image.width,
                height: image.height,
                captured_at: image.captured_at,
            }],
            _ => pages.iter().map(PageRecord::from).collect(),
        };
        Self {
            device,
            configuration,
            kind,
            outcome: outcome.label().to_string(),
            fault,
            pages,
            generated_at: Utc::now(),
        }
    }
}

pub fn export_report(report: &RunReport, output_path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(output_path, json)?;
    Ok(())
}
