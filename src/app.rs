use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::settings::Settings;
use crate::core::events::{self, Event};
use crate::core::{ScanService, ServiceError};
use crate::device::simulated::{self, SimulatedScanner};
use crate::device::DeviceHandle;
use crate::export::json::{export_report, RunReport};
use crate::models::{Completion, OperationId, OperationKind, ScanOutcome, ScanResultPage};
use crate::sinks::{PageCollector, TelemetryCounter, TelemetryFanout, TracingTelemetry};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Caller deadline: cancel the operation once this much time has passed.
    pub cancel_after: Option<Duration>,
    pub export_json: Option<PathBuf>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub operation: OperationId,
    pub outcome: ScanOutcome,
    pub pages: Vec<ScanResultPage>,
    pub telemetry: Vec<(String, u64)>,
}

/// Host shell around one [`ScanService`]: discovery, a single operation, reporting.
pub struct App {
    settings: Settings,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn devices(&self) -> Vec<SimulatedScanner> {
        simulated::discover(&self.settings.simulated_behavior())
    }

    pub async fn run(&mut self, kind: OperationKind, options: RunOptions) -> anyhow::Result<RunSummary> {
        let device = self
            .devices()
            .into_iter()
            .find(|d| d.scanner().id == self.settings.device_id)
            .with_context(|| format!("no device with id '{}'", self.settings.device_id))?;
        let scanner = device.scanner().clone();
        let device: Arc<dyn DeviceHandle> = Arc::new(device);

        let (event_tx, event_rx) = events::create_event_channel();
        let collector = Arc::new(PageCollector::new());
        let counter = Arc::new(TelemetryCounter::new());
        let telemetry = TelemetryFanout::new()
            .with(Arc::new(TracingTelemetry))
            .with(counter.clone());
        let service = ScanService::new(event_tx, collector.clone(), Arc::new(telemetry));

        let config = self.settings.scan_configuration();
        println!("{} on {} ({}, {})", kind, scanner, config.source(), config.resolution());

        let operation = match kind {
            OperationKind::Preview => service.start_preview(device, config.clone())?,
            OperationKind::Scan => service.start_scan(device, config.clone())?,
        };

        let outcome = self.event_loop(&service, operation, event_rx, &options).await?;
        let pages = collector.take_pages();

        println!("{}", describe_outcome(&outcome, pages.len()));

        if let Some(ref path) = options.export_json {
            let report = RunReport::new(scanner, config, kind, &outcome, &pages);
            export_report(&report, path)?;
            println!("Exported to: {}", path.display());
        }

        Ok(RunSummary {
            operation,
            outcome,
            pages,
            telemetry: counter.summary(),
        })
    }

    async fn event_loop(
        &self,
        service: &ScanService,
        operation: OperationId,
        mut event_rx: events::EventReceiver,
        options: &RunOptions,
    ) -> anyhow::Result<ScanOutcome> {
        // The branch is disabled when no deadline was given, so the duration is never used.
        let deadline = tokio::time::sleep(options.cancel_after.unwrap_or_default());
        tokio::pin!(deadline);
        let mut deadline_armed = options.cancel_after.is_some();

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let event = event.context("event channel closed before the operation finished")?;
                    print_event(&event);
                    if event.operation() == operation {
                        if let Some(outcome) = event.outcome() {
                            return Ok(outcome);
                        }
                    }
                }
                _ = &mut deadline, if deadline_armed => {
                    deadline_armed = false;
                    match service.cancel() {
                        Ok(()) => println!("Deadline reached, cancelling"),
                        Err(e @ ServiceError::UnsupportedOperation { .. }) => {
                            tracing::warn!("Deadline reached but cannot cancel: {}", e);
                            println!("Deadline reached, but {}; waiting for the device", e);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }
}

fn describe_outcome(outcome: &ScanOutcome, pages: usize) -> String {
    match outcome {
        ScanOutcome::Completed(Completion::Preview(image)) => format!(
            "Preview ready: {}x{} {} ({} bytes)",
            image.width,
            image.height,
            image.format,
            image.len()
        ),
        ScanOutcome::Completed(Completion::Pages { .. }) => {
            format!("Completed with {} page(s)", pages)
        }
        ScanOutcome::Cancelled => format!("Cancelled after {} page(s)", pages),
        ScanOutcome::Failed(fault) => format!("Failed after {} page(s): {}", pages, fault),
    }
}

fn print_event(event: &Event) {
    match event {
        Event::ScanStarted { kind, scanner, source, .. } => {
            println!("  {} started on {} from {}", kind, scanner, source)
        }
        Event::PageCaptured { page, .. } => println!(
            "  page {} captured ({}x{}, {} bytes)",
            page.index,
            page.image.width,
            page.image.height,
            page.image.len()
        ),
        Event::PreviewReady { image, .. } => println!(
            "  preview ready ({}x{}, {} bytes)",
            image.width,
            image.height,
            image.len()
        ),
        Event::ScanCompleted { pages, duration_ms, .. } => {
            println!("  scan completed: {} page(s) in {} ms", pages, duration_ms)
        }
        Event::OperationCancelled { kind, pages, .. } => {
            println!("  {} cancelled after {} page(s)", kind, pages)
        }
        Event::OperationFailed { kind, fault, pages, .. } => {
            println!("  {} failed after {} page(s): {}", kind, pages, fault)
        }
    }
}
