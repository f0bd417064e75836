mod common;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pagescan::app::{App, RunOptions};
use pagescan::config::settings::Settings;
use pagescan::core::events::{create_event_channel, Event};
use pagescan::core::{ScanService, ServiceError};
use pagescan::device::simulated::{discover, SimulatedBehavior, SimulatedScanner};
use pagescan::device::{DeviceError, DeviceHandle, FaultKind, PageStream, PreviewFuture};
use pagescan::models::{
    ColorMode, Completion, DiscoveredScanner, FileFormat, OperationKind, Resolution,
    ScanConfiguration, ScanOperationState, ScanOutcome, ScanSource, ScannerCapabilities,
};
use pagescan::sinks::{PageCollector, TelemetryCounter};

use common::events_until_terminal;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_behavior() -> SimulatedBehavior {
    SimulatedBehavior {
        pages: 3,
        page_delay: Duration::from_millis(5),
        fault_at_page: None,
        fault_kind: FaultKind::PaperJam,
    }
}

fn device(id: &str, behavior: &SimulatedBehavior) -> Arc<dyn DeviceHandle> {
    let device: SimulatedScanner = discover(behavior)
        .into_iter()
        .find(|d| d.scanner().id == id)
        .expect("device is discovered");
    Arc::new(device)
}

fn mfp_config(source: ScanSource) -> ScanConfiguration {
    ScanConfiguration::new(source, ColorMode::Color, Resolution(300), FileFormat::Png)
}

fn service() -> (ScanService, pagescan::core::EventReceiver, Arc<PageCollector>) {
    let (event_tx, rx) = create_event_channel();
    let collector = Arc::new(PageCollector::new());
    let service = ScanService::new(event_tx, collector.clone(), Arc::new(TelemetryCounter::new()));
    (service, rx, collector)
}

/// Create a unique temporary path for a test.
fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("pagescan_test_{}", name));
    let _ = std::fs::remove_file(&path);
    path
}

fn fast_settings() -> Settings {
    Settings {
        page_delay_ms: 5,
        ..Settings::default()
    }
}

// ---------------------------------------------------------------------------
// 1. Discovery
// ---------------------------------------------------------------------------

#[test]
fn test_discover_virtual_devices() {
    let devices = discover(&SimulatedBehavior::default());
    let ids: Vec<_> = devices.iter().map(|d| d.scanner().id.to_string()).collect();
    assert_eq!(ids, vec!["virtual-flatbed", "virtual-mfp", "virtual-legacy"]);

    let legacy = &devices[2];
    assert!(!legacy.capabilities().supports_abort);
    assert!(!legacy.capabilities().supports_source(ScanSource::Duplex));

    let mfp = &devices[1];
    assert!(mfp.capabilities().supports_source(ScanSource::Duplex));
    assert!(mfp.capabilities().supports_abort);
}

// ---------------------------------------------------------------------------
// 2. Simulated scans through the service
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_simulated_feeder_scan_completes() {
    let (service, mut rx, collector) = service();
    let behavior = fast_behavior();

    service
        .start_scan(device("virtual-mfp", &behavior), mfp_config(ScanSource::Feeder))
        .unwrap();
    let events = events_until_terminal(&mut rx).await;

    assert!(matches!(events.last(), Some(Event::ScanCompleted { pages: 3, .. })));
    service.wait_until_idle().await;
    let pages = collector.pages();
    assert_eq!(pages.iter().map(|p| p.index).collect::<Vec<_>>(), vec![1, 2, 3]);
    // A4 at 300 dpi
    assert_eq!(pages[0].image.width, 2481);
    assert_eq!(pages[0].image.height, 3507);
}

#[tokio::test]
async fn test_simulated_duplex_and_flatbed_page_counts() {
    let (service, mut rx, _collector) = service();
    let behavior = fast_behavior();
    let mfp = device("virtual-mfp", &behavior);

    service.start_scan(mfp.clone(), mfp_config(ScanSource::Duplex)).unwrap();
    let events = events_until_terminal(&mut rx).await;
    assert!(matches!(events.last(), Some(Event::ScanCompleted { pages: 6, .. })));
    service.wait_until_idle().await;

    service.start_scan(mfp, mfp_config(ScanSource::Flatbed)).unwrap();
    let events = events_until_terminal(&mut rx).await;
    assert!(matches!(events.last(), Some(Event::ScanCompleted { pages: 1, .. })));
}

#[tokio::test]
async fn test_simulated_jam_keeps_earlier_pages() {
    let (service, mut rx, collector) = service();
    let behavior = SimulatedBehavior {
        fault_at_page: Some(3),
        ..fast_behavior()
    };

    service
        .start_scan(device("virtual-mfp", &behavior), mfp_config(ScanSource::Feeder))
        .unwrap();
    let events = events_until_terminal(&mut rx).await;

    match events.last() {
        Some(Event::OperationFailed { fault, pages, .. }) => {
            assert_eq!(fault.reason, "jam");
            assert_eq!(*pages, 2);
        }
        other => panic!("unexpected terminal event: {:?}", other),
    }
    service.wait_until_idle().await;
    assert_eq!(collector.page_count(), 2);
}

#[tokio::test]
async fn test_simulated_empty_feeder_fails_before_first_page() {
    let (service, mut rx, _collector) = service();
    let behavior = SimulatedBehavior {
        pages: 0,
        ..fast_behavior()
    };

    service
        .start_scan(device("virtual-mfp", &behavior), mfp_config(ScanSource::Feeder))
        .unwrap();
    let events = events_until_terminal(&mut rx).await;
    assert_eq!(events.len(), 2);
    match events.last() {
        Some(Event::OperationFailed { fault, .. }) => assert_eq!(fault.kind, FaultKind::OutOfPaper),
        other => panic!("unexpected terminal event: {:?}", other),
    }
    service.wait_until_idle().await;
    assert_eq!(service.current_state(), ScanOperationState::Idle);
}

#[tokio::test]
async fn test_simulated_cancel_stops_feeding() {
    let (service, mut rx, collector) = service();
    let behavior = SimulatedBehavior {
        pages: 50,
        page_delay: Duration::from_millis(200),
        ..fast_behavior()
    };

    service
        .start_scan(device("virtual-mfp", &behavior), mfp_config(ScanSource::Feeder))
        .unwrap();
    service.cancel().unwrap();

    let events = events_until_terminal(&mut rx).await;
    assert!(matches!(events.last(), Some(Event::OperationCancelled { .. })));
    service.wait_until_idle().await;
    assert!(collector.page_count() < 50);
}

#[tokio::test]
async fn test_simulated_preview() {
    let (service, mut rx, collector) = service();
    let behavior = fast_behavior();

    service
        .start_preview(device("virtual-flatbed", &behavior), mfp_config(ScanSource::Flatbed))
        .unwrap();
    let events = events_until_terminal(&mut rx).await;

    match events.last().and_then(Event::outcome) {
        Some(ScanOutcome::Completed(Completion::Preview(image))) => {
            // Previews are captured at 75 dpi.
            assert_eq!(image.width, 620);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    service.wait_until_idle().await;
    assert!(collector.preview().is_some());
}

#[tokio::test]
async fn test_legacy_device_cannot_cancel() {
    let (service, mut rx, _collector) = service();
    let behavior = fast_behavior();
    let config = ScanConfiguration::new(
        ScanSource::Feeder,
        ColorMode::Grayscale,
        Resolution(300),
        FileFormat::Tiff,
    );

    service
        .start_scan(device("virtual-legacy", &behavior), config)
        .unwrap();
    assert!(matches!(
        service.cancel(),
        Err(ServiceError::UnsupportedOperation { .. })
    ));

    let events = events_until_terminal(&mut rx).await;
    assert!(matches!(events.last(), Some(Event::ScanCompleted { pages: 3, .. })));
}

/// Simulated device that counts started operations.
struct CountingDevice {
    inner: SimulatedScanner,
    starts: AtomicUsize,
}

impl DeviceHandle for CountingDevice {
    fn scanner(&self) -> &DiscoveredScanner {
        self.inner.scanner()
    }

    fn capabilities(&self) -> &ScannerCapabilities {
        self.inner.capabilities()
    }

    fn fetch_preview(&self, config: &ScanConfiguration) -> PreviewFuture {
        let preview = self.inner.fetch_preview(config);
        self.starts.fetch_add(1, Ordering::SeqCst);
        preview
    }

    fn execute_scan(&self, config: &ScanConfiguration) -> Result<PageStream, DeviceError> {
        let pages = self.inner.execute_scan(config);
        self.starts.fetch_add(1, Ordering::SeqCst);
        pages
    }

    fn abort(&self) {
        self.inner.abort()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_right_after_device_start_is_never_lost() {
    let (service, mut rx, collector) = service();
    let behavior = SimulatedBehavior {
        pages: 50,
        // Far beyond the event timeout: only an honoured abort ends these operations in time.
        page_delay: Duration::from_secs(60),
        ..fast_behavior()
    };
    let device = Arc::new(CountingDevice {
        inner: discover(&behavior)
            .into_iter()
            .find(|d| d.scanner().id == "virtual-mfp")
            .expect("device is discovered"),
        starts: AtomicUsize::new(0),
    });

    for round in 0..20 {
        let before = device.starts.load(Ordering::SeqCst);
        let canceller = {
            let service = service.clone();
            let device = Arc::clone(&device);
            tokio::spawn(async move {
                while device.starts.load(Ordering::SeqCst) == before {
                    tokio::task::yield_now().await;
                }
                service.cancel()
            })
        };

        let handle: Arc<dyn DeviceHandle> = device.clone();
        if round % 2 == 0 {
            service.start_scan(handle, mfp_config(ScanSource::Feeder)).unwrap();
        } else {
            service.start_preview(handle, mfp_config(ScanSource::Flatbed)).unwrap();
        }
        canceller.await.unwrap().unwrap();

        let events = events_until_terminal(&mut rx).await;
        assert!(
            matches!(events.last(), Some(Event::OperationCancelled { pages: 0, .. })),
            "round {}: {:?}",
            round,
            events.last()
        );
        service.wait_until_idle().await;
    }

    assert_eq!(device.starts.load(Ordering::SeqCst), 20);
    assert_eq!(collector.page_count(), 0);
    assert!(collector.preview().is_none());
}

// ---------------------------------------------------------------------------
// 3. App runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_app_scan_exports_report() {
    let export = temp_path("report.json");
    let mut app = App::new(fast_settings());

    let summary = app
        .run(
            OperationKind::Scan,
            RunOptions {
                cancel_after: None,
                export_json: Some(export.clone()),
            },
        )
        .await
        .expect("run succeeds");

    assert!(matches!(
        summary.outcome,
        ScanOutcome::Completed(Completion::Pages { count: 3 })
    ));
    assert_eq!(summary.pages.len(), 3);
    assert!(summary.telemetry.iter().any(|(name, count)| name == "ScanStarted" && *count == 1));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(json["outcome"], "completed");
    assert_eq!(json["kind"], "Scan");
    assert_eq!(json["device"]["id"], "virtual-mfp");
    assert_eq!(json["pages"].as_array().unwrap().len(), 3);
    assert_eq!(json["pages"][0]["index"], 1);
    assert!(json["fault"].is_null());

    let _ = std::fs::remove_file(&export);
}

#[tokio::test]
async fn test_app_deadline_cancels_scan() {
    let mut app = App::new(Settings {
        simulated_pages: 50,
        page_delay_ms: 100,
        ..Settings::default()
    });

    let summary = app
        .run(
            OperationKind::Scan,
            RunOptions {
                cancel_after: Some(Duration::from_millis(250)),
                export_json: None,
            },
        )
        .await
        .expect("run succeeds");

    assert_eq!(summary.outcome, ScanOutcome::Cancelled);
    assert!(summary.pages.len() < 50);
}

#[tokio::test]
async fn test_app_rejects_unknown_device() {
    let mut app = App::new(Settings {
        device_id: "nope".to_string(),
        ..fast_settings()
    });
    let err = app
        .run(OperationKind::Preview, RunOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[tokio::test]
async fn test_app_rejects_unsupported_configuration() {
    let mut app = App::new(Settings {
        device_id: "virtual-flatbed".to_string(),
        source: ScanSource::Feeder,
        ..fast_settings()
    });
    let err = app
        .run(OperationKind::Scan, RunOptions::default())
        .await
        .unwrap_err();
    let service_err = err.downcast_ref::<ServiceError>().expect("service error");
    assert!(matches!(service_err, ServiceError::UnsupportedConfiguration(_)));
}
