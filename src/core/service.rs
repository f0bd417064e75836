use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::watch;

use crate::device::{DeviceError, DeviceFault, DeviceHandle, FaultKind};
use crate::models::{
    Completion, OperationId, OperationKind, ScanConfiguration, ScanImage, ScanOperationState,
    ScanOutcome, ScanResultPage, ScanSource,
};
use crate::sinks::{Attributes, ResultSink, TelemetryEvent, TelemetrySink};

use super::error::ServiceError;
use super::events::{Event, EventSender};
use super::progress::{ProgressSnapshot, ProgressTracker};
use super::validation::validate;

/// Single-flight scan orchestration.
///
/// Holds the only [`ScanOperationState`] and is the only caller of device
/// operations. `start_preview`/`start_scan` return as soon as the request is
/// accepted; everything after that arrives on the event channel.
#[derive(Clone)]
pub struct ScanService {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    // Written only while `inner` is locked.
    state_tx: watch::Sender<ScanOperationState>,
    next_id: AtomicU64,
    event_tx: EventSender,
    results: Arc<dyn ResultSink>,
    telemetry: Arc<dyn TelemetrySink>,
}

#[derive(Default)]
struct Inner {
    active: Option<ActiveOperation>,
}

/// What `finish` needs from the active operation once it has ended.
struct Closing {
    kind: OperationKind,
    source: ScanSource,
    snapshot: ProgressSnapshot,
}

struct ActiveOperation {
    id: OperationId,
    kind: OperationKind,
    source: ScanSource,
    device: Arc<dyn DeviceHandle>,
    progress: Arc<ProgressTracker>,
    cancel_requested: Arc<AtomicBool>,
}

impl ScanService {
    pub fn new(
        event_tx: EventSender,
        results: Arc<dyn ResultSink>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ScanOperationState::Idle);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                state_tx,
                next_id: AtomicU64::new(1),
                event_tx,
                results,
                telemetry,
            }),
        }
    }

    pub fn current_state(&self) -> ScanOperationState {
        self.shared.current_state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ScanOperationState> {
        self.shared.state_tx.subscribe()
    }

    /// Resolves once the service is idle again.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.subscribe_state();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|state| state.is_idle()).await;
    }

    pub fn active_operation(&self) -> Option<OperationId> {
        self.shared.lock().active.as_ref().map(|op| op.id)
    }

    /// Progress of the in-flight operation, if any.
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.shared
            .lock()
            .active
            .as_ref()
            .map(|op| op.progress.snapshot())
    }

    /// Requests a preview. Must be called from within a Tokio runtime.
    pub fn start_preview(
        &self,
        device: Arc<dyn DeviceHandle>,
        config: ScanConfiguration,
    ) -> Result<OperationId, ServiceError> {
        self.begin(OperationKind::Preview, device, config)
    }

    /// Starts a multi-page scan. Must be called from within a Tokio runtime.
    pub fn start_scan(
        &self,
        device: Arc<dyn DeviceHandle>,
        config: ScanConfiguration,
    ) -> Result<OperationId, ServiceError> {
        self.begin(OperationKind::Scan, device, config)
    }

    /// Asks the device to stop the in-flight operation.
    ///
    /// A no-op when idle or already cancelling. The operation still ends with
    /// whatever the device reports first, so a preview or page that was already
    /// done is delivered as usual.
    pub fn cancel(&self) -> Result<(), ServiceError> {
        let inner = self.shared.lock();
        let current = self.current_state();

        let active = match (current, inner.active.as_ref()) {
            (ScanOperationState::PreviewInProgress | ScanOperationState::ScanInProgress, Some(active)) => {
                active
            }
            _ => return Ok(()),
        };

        if !active.device.capabilities().supports_abort {
            tracing::warn!(
                operation = %active.id,
                device = %active.device.scanner().id,
                "Cancel requested but device cannot abort"
            );
            return Err(ServiceError::UnsupportedOperation {
                operation: "cancel",
                device: active.device.scanner().id.clone(),
            });
        }

        self.shared.state_tx.send_replace(ScanOperationState::Cancelling);
        active.cancel_requested.store(true, Ordering::SeqCst);
        // Under the lock so the abort cannot reach a later operation on the same device.
        active.device.abort();
        tracing::info!(operation = %active.id, kind = %active.kind, "Cancel requested");
        Ok(())
    }

    fn begin(
        &self,
        kind: OperationKind,
        device: Arc<dyn DeviceHandle>,
        config: ScanConfiguration,
    ) -> Result<OperationId, ServiceError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ServiceError::NoRuntime)?;

        let mut inner = self.shared.lock();
        let current = self.current_state();
        if !current.is_idle() {
            tracing::warn!(%kind, %current, "Rejected request: service busy");
            return Err(ServiceError::InvalidState { current });
        }
        if let Err(e) = validate(device.capabilities(), &config) {
            tracing::warn!(%kind, device = %device.scanner().id, "Rejected request: {}", e);
            return Err(e.into());
        }

        let id = OperationId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let progress = Arc::new(ProgressTracker::new());
        let cancel_requested = Arc::new(AtomicBool::new(false));
        inner.active = Some(ActiveOperation {
            id,
            kind,
            source: config.source(),
            device: Arc::clone(&device),
            progress: Arc::clone(&progress),
            cancel_requested: Arc::clone(&cancel_requested),
        });
        self.shared.state_tx.send_replace(kind.in_progress_state());
        let _ = self.shared.event_tx.send(Event::ScanStarted {
            operation: id,
            kind,
            scanner: device.scanner().id.clone(),
            source: config.source(),
        });
        drop(inner);

        tracing::info!(
            operation = %id,
            %kind,
            device = %device.scanner().id,
            source = %config.source(),
            resolution = %config.resolution(),
            "Operation started"
        );
        let started = match kind {
            OperationKind::Preview => TelemetryEvent::Preview,
            OperationKind::Scan => TelemetryEvent::ScanStarted,
        };
        self.shared.track(
            started,
            config.source(),
            [
                ("ColorMode", config.color_mode().to_string()),
                ("Resolution", config.resolution().dpi().to_string()),
                ("Format", config.format().to_string()),
            ],
        );

        let shared = Arc::clone(&self.shared);
        let driver = Driver {
            shared: Arc::clone(&shared),
            id,
            device,
            config,
            progress,
            cancel_requested,
        };
        let driver = match kind {
            OperationKind::Preview => runtime.spawn(driver.preview()),
            OperationKind::Scan => runtime.spawn(driver.scan()),
        };
        // Supervisor: a panicking device or sink must still close the operation.
        runtime.spawn(async move {
            let outcome = match driver.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(operation = %id, "Operation task failed: {}", e);
                    ScanOutcome::Failed(DeviceFault::new(
                        FaultKind::Unknown,
                        format!("operation task failed: {}", e),
                    ))
                }
            };
            shared.finish(id, outcome);
        });

        Ok(id)
    }
}

impl std::fmt::Debug for ScanService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanService")
            .field("state", &self.current_state())
            .field("active", &self.active_operation())
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reports the outcome, then emits the terminal event and returns to Idle in
    /// one critical section, so nothing from the next operation can be observed
    /// before the terminal event. Telemetry and logging run outside the lock.
    fn finish(&self, id: OperationId, outcome: ScanOutcome) {
        let closing = {
            let inner = self.lock();
            match inner.active.as_ref() {
                Some(active) if active.id == id => Closing {
                    kind: active.kind,
                    source: active.source,
                    snapshot: active.progress.snapshot(),
                },
                _ => return,
            }
        };

        if self.current_state() == ScanOperationState::Cancelling
            && matches!(outcome, ScanOutcome::Completed(_))
        {
            tracing::info!(operation = %id, "Device finished before acting on cancel");
        }
        self.report(id, &closing, &outcome);

        let pages = closing.snapshot.pages_captured;
        let event = match outcome {
            ScanOutcome::Completed(Completion::Preview(image)) => Event::PreviewReady {
                operation: id,
                image,
            },
            ScanOutcome::Completed(Completion::Pages { count }) => Event::ScanCompleted {
                operation: id,
                pages: count,
                duration_ms: closing.snapshot.elapsed.as_millis() as u64,
            },
            ScanOutcome::Cancelled => Event::OperationCancelled {
                operation: id,
                kind: closing.kind,
                pages,
            },
            ScanOutcome::Failed(fault) => Event::OperationFailed {
                operation: id,
                kind: closing.kind,
                fault,
                pages,
            },
        };

        let mut inner = self.lock();
        if inner.active.as_ref().is_some_and(|active| active.id == id) {
            inner.active = None;
            let _ = self.event_tx.send(event);
            self.state_tx.send_replace(ScanOperationState::Idle);
        }
    }

    fn current_state(&self) -> ScanOperationState {
        *self.state_tx.borrow()
    }

    fn report(&self, id: OperationId, closing: &Closing, outcome: &ScanOutcome) {
        let snapshot = &closing.snapshot;
        let pages = snapshot.pages_captured;
        let kind_attr = ("Operation", closing.kind.to_string());
        let pages_attr = ("Pages", pages.to_string());
        match outcome {
            ScanOutcome::Completed(_) => {
                tracing::info!(
                    operation = %id,
                    kind = %closing.kind,
                    pages,
                    elapsed_ms = snapshot.elapsed.as_millis() as u64,
                    "Operation completed"
                );
                self.track(TelemetryEvent::ScanCompleted, closing.source, [kind_attr, pages_attr]);
            }
            ScanOutcome::Cancelled => {
                tracing::info!(operation = %id, kind = %closing.kind, pages, "Operation cancelled");
                self.track(TelemetryEvent::ScanCancelled, closing.source, [kind_attr, pages_attr]);
            }
            ScanOutcome::Failed(fault) => {
                tracing::warn!(
                    operation = %id,
                    kind = %closing.kind,
                    fault_kind = ?fault.kind,
                    pages,
                    "Operation failed: {}",
                    fault
                );
                self.track(
                    TelemetryEvent::ScanFailed,
                    closing.source,
                    [kind_attr, pages_attr, ("Reason", fault.reason.clone())],
                );
            }
        }
    }

    fn deliver_preview(&self, source: ScanSource, image: ScanImage) {
        if let Err(e) = self.results.receive_preview(image) {
            tracing::warn!("Result sink rejected preview: {:#}", e);
            self.track(
                TelemetryEvent::ResultSinkError,
                source,
                [("Error", format!("{:#}", e))],
            );
        }
    }

    fn deliver_page(&self, id: OperationId, source: ScanSource, page: ScanResultPage) {
        tracing::debug!(operation = %id, index = page.index, bytes = page.image.len(), "Page captured");
        let index = page.index;
        if let Err(e) = self.results.receive_page(page.clone()) {
            tracing::warn!(operation = %id, index, "Result sink rejected page: {:#}", e);
            self.track(
                TelemetryEvent::ResultSinkError,
                source,
                [("Page", index.to_string()), ("Error", format!("{:#}", e))],
            );
        }
        let _ = self.event_tx.send(Event::PageCaptured { operation: id, page });
    }

    fn track<const N: usize>(
        &self,
        event: TelemetryEvent,
        source: ScanSource,
        extra: [(&str, String); N],
    ) {
        let mut attributes = Attributes::with_capacity(N + 1);
        attributes.insert("Source".to_string(), source.to_string());
        for (key, value) in extra {
            attributes.insert(key.to_string(), value);
        }
        let name = event.as_str();
        let tracked =
            panic::catch_unwind(AssertUnwindSafe(|| self.telemetry.track(name, &attributes)));
        if tracked.is_err() {
            tracing::error!(event = name, "Telemetry sink panicked; event dropped");
        }
    }
}

/// Runs one operation against the device and reports what it ended with.
struct Driver {
    shared: Arc<Shared>,
    id: OperationId,
    device: Arc<dyn DeviceHandle>,
    config: ScanConfiguration,
    progress: Arc<ProgressTracker>,
    cancel_requested: Arc<AtomicBool>,
}

impl Driver {
    /// Starts the device call under the service lock. A concurrent `cancel()`
    /// therefore either lands first, and the device is never called, or finds
    /// the device already in flight so its abort reaches this operation.
    fn engage<T>(
        &self,
        start: impl FnOnce(&dyn DeviceHandle, &ScanConfiguration) -> T,
    ) -> Option<T> {
        let _inner = self.shared.lock();
        if self.cancel_requested.load(Ordering::SeqCst) {
            tracing::debug!(operation = %self.id, "Cancelled before reaching the device");
            return None;
        }
        Some(start(self.device.as_ref(), &self.config))
    }

    async fn preview(self) -> ScanOutcome {
        let Some(capture) = self.engage(|device, config| device.fetch_preview(config)) else {
            return ScanOutcome::Cancelled;
        };
        match capture.await {
            Ok(image) => {
                self.progress.record_page(image.len());
                self.shared.deliver_preview(self.config.source(), image.clone());
                ScanOutcome::Completed(Completion::Preview(image))
            }
            Err(e) => outcome_of(e),
        }
    }

    async fn scan(self) -> ScanOutcome {
        let mut pages = match self.engage(|device, config| device.execute_scan(config)) {
            None => return ScanOutcome::Cancelled,
            Some(Ok(pages)) => pages,
            Some(Err(e)) => return outcome_of(e),
        };

        let mut index = 0u32;
        while let Some(item) = pages.next().await {
            match item {
                Ok(image) => {
                    index += 1;
                    self.progress.record_page(image.len());
                    let page = ScanResultPage { index, image };
                    self.shared.deliver_page(self.id, self.config.source(), page);
                }
                Err(e) => return outcome_of(e),
            }
        }

        ScanOutcome::Completed(Completion::Pages { count: index })
    }
}

fn outcome_of(error: DeviceError) -> ScanOutcome {
    match error {
        DeviceError::Aborted => ScanOutcome::Cancelled,
        DeviceError::Fault(fault) => ScanOutcome::Failed(fault),
    }
}
