#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use smallvec::smallvec;
use tokio::sync::mpsc;

use pagescan::core::events::{Event, EventReceiver};
use pagescan::device::{DeviceError, DeviceFault, DeviceHandle, PageStream, PreviewFuture};
use pagescan::models::{
    ColorMode, ConnectionType, DiscoveredScanner, FileFormat, Resolution, ScanConfiguration,
    ScanImage, ScanResultPage, ScanSource, ScannerCapabilities,
};
use pagescan::sinks::ResultSink;

/// One scripted device reaction, fed by the test.
#[derive(Debug)]
pub enum Step {
    Page(ScanImage),
    Fault(DeviceFault),
    Aborted,
    /// Natural end of the page sequence.
    End,
    Panic,
}

type Feed = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Step>>>;

/// Device double driven step by step through [`ScriptedDevice::push`].
///
/// Records how often each device operation was invoked.
pub struct ScriptedDevice {
    scanner: DiscoveredScanner,
    capabilities: ScannerCapabilities,
    feed_tx: mpsc::UnboundedSender<Step>,
    feed_rx: Feed,
    acknowledge_abort: bool,
    preview_calls: AtomicUsize,
    scan_calls: AtomicUsize,
    abort_calls: AtomicUsize,
}

impl ScriptedDevice {
    /// A device that acknowledges aborts by failing the in-flight call with `Aborted`.
    pub fn new(capabilities: ScannerCapabilities) -> Arc<Self> {
        Self::build(capabilities, true)
    }

    /// A device that ignores abort requests; only scripted steps end an operation.
    pub fn ignoring_abort(capabilities: ScannerCapabilities) -> Arc<Self> {
        Self::build(capabilities, false)
    }

    fn build(capabilities: ScannerCapabilities, acknowledge_abort: bool) -> Arc<Self> {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            scanner: DiscoveredScanner::new("scripted", "Scripted Scanner", ConnectionType::Virtual),
            capabilities,
            feed_tx,
            feed_rx: Arc::new(tokio::sync::Mutex::new(feed_rx)),
            acknowledge_abort,
            preview_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
            abort_calls: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, step: Step) {
        let _ = self.feed_tx.send(step);
    }

    pub fn preview_calls(&self) -> usize {
        self.preview_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.preview_calls() + self.scan_calls() + self.abort_calls()
    }
}

impl DeviceHandle for ScriptedDevice {
    fn scanner(&self) -> &DiscoveredScanner {
        &self.scanner
    }

    fn capabilities(&self) -> &ScannerCapabilities {
        &self.capabilities
    }

    fn fetch_preview(&self, _config: &ScanConfiguration) -> PreviewFuture {
        self.preview_calls.fetch_add(1, Ordering::SeqCst);
        let feed = Arc::clone(&self.feed_rx);
        async move {
            let step = feed.lock().await.recv().await;
            match step {
                Some(Step::Page(image)) => Ok(image),
                Some(Step::Fault(fault)) => Err(fault.into()),
                Some(Step::Aborted) => Err(DeviceError::Aborted),
                Some(Step::Panic) => panic!("scripted device panic"),
                Some(Step::End) | None => Err(DeviceFault::new(
                    pagescan::device::FaultKind::Unknown,
                    "no preview produced",
                )
                .into()),
            }
        }
        .boxed()
    }

    fn execute_scan(&self, _config: &ScanConfiguration) -> Result<PageStream, DeviceError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        let feed = Arc::clone(&self.feed_rx);
        let pages = stream::unfold(Some(feed), |feed| async move {
            let feed = feed?;
            let step = feed.lock().await.recv().await?;
            match step {
                Step::Page(image) => Some((Ok(image), Some(feed))),
                Step::Fault(fault) => Some((Err(fault.into()), None)),
                Step::Aborted => Some((Err(DeviceError::Aborted), None)),
                Step::End => None,
                Step::Panic => panic!("scripted device panic"),
            }
        });
        Ok(pages.boxed())
    }

    fn abort(&self) {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        if self.acknowledge_abort {
            let _ = self.feed_tx.send(Step::Aborted);
        }
    }
}

/// Result sink that refuses everything.
#[derive(Default)]
pub struct RejectingSink {
    attempts: Mutex<usize>,
}

impl RejectingSink {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResultSink for RejectingSink {
    fn receive_page(&self, _page: ScanResultPage) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        anyhow::bail!("page list is read-only")
    }

    fn receive_preview(&self, _image: ScanImage) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        anyhow::bail!("page list is read-only")
    }
}

pub fn flatbed_and_feeder() -> ScannerCapabilities {
    ScannerCapabilities {
        sources: smallvec![ScanSource::Flatbed, ScanSource::Feeder],
        color_modes: smallvec![ColorMode::Color, ColorMode::Grayscale],
        resolutions: smallvec![Resolution(150), Resolution(300)],
        formats: smallvec![FileFormat::Png, FileFormat::Pdf],
        supports_abort: true,
    }
}

pub fn config(source: ScanSource) -> ScanConfiguration {
    ScanConfiguration::new(source, ColorMode::Color, Resolution(300), FileFormat::Png)
}

pub fn image(tag: &str) -> ScanImage {
    ScanImage::new(tag.as_bytes().to_vec(), FileFormat::Png, 100, 140)
}

/// Receives the next event, failing the test if none arrives in time.
pub async fn next_event(rx: &mut EventReceiver) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Collects events up to and including the next terminal event.
pub async fn events_until_terminal(rx: &mut EventReceiver) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}
