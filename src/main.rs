use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use pagescan::app::{App, RunOptions};
use pagescan::config::settings::Settings;
use pagescan::device::{DeviceHandle, FaultKind};
use pagescan::models::{ColorMode, FileFormat, OperationKind, PageSize, Resolution, ScanSource};

#[derive(Parser, Debug)]
#[command(name = "pagescan", version, about = "Preview and scan pages from a scanner device")]
struct Cli {
    /// Settings file (JSON); flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available devices and their capabilities
    Devices,
    /// Capture a single preview image
    Preview(ScanArgs),
    /// Run a (multi-page) scan
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Device id (see `devices`)
    #[arg(short = 'd', long)]
    device: Option<String>,

    #[arg(short = 's', long, value_enum)]
    source: Option<ScanSource>,

    #[arg(short = 'c', long, value_enum)]
    color: Option<ColorMode>,

    /// Resolution in dpi
    #[arg(short = 'r', long)]
    dpi: Option<u32>,

    #[arg(short = 'f', long, value_enum)]
    format: Option<FileFormat>,

    #[arg(long, value_enum)]
    page_size: Option<PageSize>,

    /// Pages loaded in the virtual feeder
    #[arg(long)]
    pages: Option<u32>,

    /// Simulated time per page in milliseconds
    #[arg(long)]
    page_delay_ms: Option<u64>,

    /// Inject a device fault at this 1-based page
    #[arg(long)]
    fault_at: Option<u32>,

    #[arg(long, value_enum)]
    fault_kind: Option<FaultKind>,

    /// Cancel the operation after this many milliseconds
    #[arg(long)]
    cancel_after_ms: Option<u64>,

    /// Export a run report as JSON to file
    #[arg(long)]
    export_json: Option<PathBuf>,
}

impl ScanArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(ref device) = self.device {
            settings.device_id = device.clone();
        }
        if let Some(source) = self.source {
            settings.source = source;
        }
        if let Some(color) = self.color {
            settings.color_mode = color;
        }
        if let Some(dpi) = self.dpi {
            settings.resolution = Resolution(dpi);
        }
        if let Some(format) = self.format {
            settings.format = format;
        }
        if let Some(page_size) = self.page_size {
            settings.page_size = page_size;
        }
        if let Some(pages) = self.pages {
            settings.simulated_pages = pages;
        }
        if let Some(delay) = self.page_delay_ms {
            settings.page_delay_ms = delay;
        }
        if self.fault_at.is_some() {
            settings.fault_at_page = self.fault_at;
        }
        if let Some(kind) = self.fault_kind {
            settings.fault_kind = kind;
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            cancel_after: self.cancel_after_ms.map(Duration::from_millis),
            export_json: self.export_json.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (logs to stderr)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match cli.config {
        Some(ref path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let (kind, args) = match cli.command {
        Command::Devices => {
            let app = App::new(settings);
            for device in app.devices() {
                let caps = device.capabilities();
                println!("{}", device.scanner());
                println!("  sources:     {:?}", caps.sources.as_slice());
                println!("  color modes: {:?}", caps.color_modes.as_slice());
                println!(
                    "  dpi:         {:?}",
                    caps.resolutions.iter().map(|r| r.dpi()).collect::<Vec<_>>()
                );
                println!("  formats:     {:?}", caps.formats.as_slice());
                println!("  abort:       {}", caps.supports_abort);
            }
            return Ok(());
        }
        Command::Preview(args) => (OperationKind::Preview, args),
        Command::Scan(args) => (OperationKind::Scan, args),
    };

    args.apply(&mut settings);
    let mut app = App::new(settings);
    let summary = app.run(kind, args.run_options()).await?;

    for (event, count) in summary.telemetry {
        tracing::debug!(event = %event, count, "telemetry total");
    }
    Ok(())
}
