use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::configuration::FileFormat;

/// Encoded image as produced by a device. Cloning shares the pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanImage {
    pub data: Arc<[u8]>,
    pub format: FileFormat,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl ScanImage {
    pub fn new(data: impl Into<Arc<[u8]>>, format: FileFormat, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            format,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A captured page and its 1-based position within the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResultPage {
    pub index: u32,
    pub image: ScanImage,
}
