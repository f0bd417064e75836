use std::sync::{Mutex, PoisonError};

use crate::models::{ScanImage, ScanResultPage};

use super::ResultSink;

/// In-memory page list. Keeps every page in arrival order and the latest preview.
#[derive(Debug, Default)]
pub struct PageCollector {
    pages: Mutex<Vec<ScanResultPage>>,
    preview: Mutex<Option<ScanImage>>,
}

impl PageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(&self) -> Vec<ScanResultPage> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn page_count(&self) -> usize {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn preview(&self) -> Option<ScanImage> {
        self.preview
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns all collected pages.
    pub fn take_pages(&self) -> Vec<ScanResultPage> {
        std::mem::take(&mut *self.pages.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ResultSink for PageCollector {
    fn receive_page(&self, page: ScanResultPage) -> anyhow::Result<()> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(page);
        Ok(())
    }

    fn receive_preview(&self, image: ScanImage) -> anyhow::Result<()> {
        *self.preview.lock().unwrap_or_else(PoisonError::into_inner) = Some(image);
        Ok(())
    }
}
