use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::simulated::SimulatedBehavior;
use crate::device::FaultKind;
use crate::models::{ColorMode, FileFormat, PageSize, Resolution, ScanConfiguration, ScanSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device_id: String,
    pub source: ScanSource,
    pub color_mode: ColorMode,
    pub resolution: Resolution,
    pub format: FileFormat,
    pub page_size: PageSize,

    // Virtual device
    pub simulated_pages: u32,
    pub page_delay_ms: u64,
    pub fault_at_page: Option<u32>,
    pub fault_kind: FaultKind,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_id: "virtual-mfp".to_string(),
            source: ScanSource::Feeder,
            color_mode: ColorMode::Color,
            resolution: Resolution(300),
            format: FileFormat::Png,
            page_size: PageSize::A4,
            simulated_pages: 3,
            page_delay_ms: 400,
            fault_at_page: None,
            fault_kind: FaultKind::PaperJam,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Settings {
    /// Reads settings from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn scan_configuration(&self) -> ScanConfiguration {
        ScanConfiguration::new(self.source, self.color_mode, self.resolution, self.format)
            .with_page_size(self.page_size)
    }

    pub fn simulated_behavior(&self) -> SimulatedBehavior {
        SimulatedBehavior {
            pages: self.simulated_pages,
            page_delay: Duration::from_millis(self.page_delay_ms),
            fault_at_page: self.fault_at_page,
            fault_kind: self.fault_kind,
        }
    }
}
