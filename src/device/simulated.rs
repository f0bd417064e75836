use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use smallvec::smallvec;
use tokio::sync::Notify;

use crate::models::{
    ColorMode, ConnectionType, DiscoveredScanner, FileFormat, PageSize, Resolution,
    ScanConfiguration, ScanImage, ScannerCapabilities, ScanSource,
};

use super::{DeviceError, DeviceFault, DeviceHandle, FaultKind, PageStream, PreviewFuture};

#[derive(Debug, Clone)]
pub struct SimulatedBehavior {
    /// Pages in the virtual feeder (flatbed scans always yield one page).
    pub pages: u32,
    pub page_delay: Duration,
    /// 1-based page at which the scan faults instead of delivering.
    pub fault_at_page: Option<u32>,
    pub fault_kind: FaultKind,
}

impl Default for SimulatedBehavior {
    fn default() -> Self {
        Self {
            pages: 3,
            page_delay: Duration::from_millis(400),
            fault_at_page: None,
            fault_kind: FaultKind::PaperJam,
        }
    }
}

type AbortSlot = Arc<Mutex<Option<Arc<Notify>>>>;

/// Virtual device that fabricates pages after a delay.
pub struct SimulatedScanner {
    scanner: DiscoveredScanner,
    capabilities: ScannerCapabilities,
    behavior: SimulatedBehavior,
    abort_slot: AbortSlot,
}

impl SimulatedScanner {
    pub fn new(
        scanner: DiscoveredScanner,
        capabilities: ScannerCapabilities,
        behavior: SimulatedBehavior,
    ) -> Self {
        Self {
            scanner,
            capabilities,
            behavior,
            abort_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn behavior(&self) -> &SimulatedBehavior {
        &self.behavior
    }

    /// Installs a fresh abort signal for the operation about to start.
    fn arm(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.abort_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&notify));
        notify
    }
}

fn disarm(slot: &AbortSlot, notify: &Arc<Notify>) {
    let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if current.as_ref().is_some_and(|n| Arc::ptr_eq(n, notify)) {
        *current = None;
    }
}

impl DeviceHandle for SimulatedScanner {
    fn scanner(&self) -> &DiscoveredScanner {
        &self.scanner
    }

    fn capabilities(&self) -> &ScannerCapabilities {
        &self.capabilities
    }

    fn fetch_preview(&self, config: &ScanConfiguration) -> PreviewFuture {
        let abort = self.arm();
        let slot = Arc::clone(&self.abort_slot);
        let delay = self.behavior.page_delay;
        let config = config.clone();
        tracing::debug!(device = %self.scanner.id, source = %config.source(), "Warming up preview");

        async move {
            let result = tokio::select! {
                _ = tokio::time::sleep(delay) => Ok(render_page(&config, 0, Resolution(75))),
                _ = abort.notified() => Err(DeviceError::Aborted),
            };
            disarm(&slot, &abort);
            result
        }
        .boxed()
    }

    fn execute_scan(&self, config: &ScanConfiguration) -> Result<PageStream, DeviceError> {
        if !self.capabilities.supports_source(config.source()) {
            return Err(DeviceFault::new(
                FaultKind::Unknown,
                format!("source {} not available", config.source()),
            )
            .into());
        }

        let total = match config.source() {
            ScanSource::Flatbed => 1,
            ScanSource::Duplex => self.behavior.pages * 2,
            _ => self.behavior.pages,
        };
        if total == 0 {
            return Err(DeviceFault::from(FaultKind::OutOfPaper).into());
        }

        tracing::debug!(device = %self.scanner.id, pages = total, "Feeding pages");

        let job = FeedJob {
            next: 1,
            total,
            config: config.clone(),
            behavior: self.behavior.clone(),
            abort: self.arm(),
            slot: Arc::clone(&self.abort_slot),
        };

        let pages = stream::unfold(Some(job), |job| async move {
            let mut job = job?;
            if job.next > job.total {
                job.finish();
                return None;
            }

            tokio::select! {
                _ = tokio::time::sleep(job.behavior.page_delay) => {}
                _ = job.abort.notified() => {
                    job.finish();
                    return Some((Err(DeviceError::Aborted), None));
                }
            }

            if job.behavior.fault_at_page == Some(job.next) {
                job.finish();
                let fault = DeviceFault::from(job.behavior.fault_kind);
                return Some((Err(fault.into()), None));
            }

            let image = render_page(&job.config, job.next, job.config.resolution());
            job.next += 1;
            Some((Ok(image), Some(job)))
        });

        Ok(pages.boxed())
    }

    fn abort(&self) {
        if let Some(notify) = self
            .abort_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            // notify_one keeps a permit, so an abort between pages is seen at the next one.
            notify.notify_one();
        }
    }
}

struct FeedJob {
    next: u32,
    total: u32,
    config: ScanConfiguration,
    behavior: SimulatedBehavior,
    abort: Arc<Notify>,
    slot: AbortSlot,
}

impl FeedJob {
    fn finish(&self) {
        disarm(&self.slot, &self.abort);
    }
}

fn render_page(config: &ScanConfiguration, index: u32, resolution: Resolution) -> ScanImage {
    // Page dimensions in hundredths of an inch.
    let (w, h) = match config.page_size() {
        PageSize::A4 | PageSize::Auto => (827, 1169),
        PageSize::A5 => (583, 827),
        PageSize::Letter => (850, 1100),
        PageSize::Legal => (850, 1400),
    };
    let width = w * resolution.dpi() / 100;
    let height = h * resolution.dpi() / 100;
    let payload = format!(
        "{} page {} {}x{} {}",
        config.format(),
        index,
        width,
        height,
        config.color_mode()
    );
    ScanImage::new(payload.into_bytes(), config.format(), width, height)
}

fn default_formats() -> smallvec::SmallVec<[FileFormat; 4]> {
    smallvec![FileFormat::Jpeg, FileFormat::Png, FileFormat::Tiff, FileFormat::Pdf]
}

/// Virtual devices a host can offer when no hardware is attached.
pub fn discover(behavior: &SimulatedBehavior) -> Vec<SimulatedScanner> {
    vec![
        SimulatedScanner::new(
            DiscoveredScanner::new("virtual-flatbed", "Virtual Flatbed", ConnectionType::Virtual),
            ScannerCapabilities {
                sources: smallvec![ScanSource::Flatbed],
                color_modes: smallvec![ColorMode::Color, ColorMode::Grayscale],
                resolutions: smallvec![Resolution(150), Resolution(300), Resolution(600)],
                formats: default_formats(),
                supports_abort: true,
            },
            behavior.clone(),
        ),
        SimulatedScanner::new(
            DiscoveredScanner::new("virtual-mfp", "Virtual Office MFP", ConnectionType::Virtual),
            ScannerCapabilities {
                sources: smallvec![
                    ScanSource::Flatbed,
                    ScanSource::Feeder,
                    ScanSource::Duplex,
                    ScanSource::AutoConfigured
                ],
                color_modes: smallvec![
                    ColorMode::Color,
                    ColorMode::Grayscale,
                    ColorMode::Monochrome,
                    ColorMode::AutoColor
                ],
                resolutions: smallvec![
                    Resolution(100),
                    Resolution(150),
                    Resolution(200),
                    Resolution(300),
                    Resolution(600)
                ],
                formats: default_formats(),
                supports_abort: true,
            },
            behavior.clone(),
        ),
        SimulatedScanner::new(
            DiscoveredScanner::new("virtual-legacy", "Legacy Network Scanner", ConnectionType::Network),
            ScannerCapabilities {
                sources: smallvec![ScanSource::Flatbed, ScanSource::Feeder],
                color_modes: smallvec![ColorMode::Grayscale, ColorMode::Monochrome],
                resolutions: smallvec![Resolution(200), Resolution(300)],
                formats: smallvec![FileFormat::Tiff, FileFormat::Pdf],
                supports_abort: false,
            },
            behavior.clone(),
        ),
    ]
}
