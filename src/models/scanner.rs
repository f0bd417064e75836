use std::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::configuration::{ColorMode, FileFormat, Resolution, ScanSource};

/// One physical or virtual device as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredScanner {
    pub id: CompactString,
    pub name: CompactString,
    pub connection: ConnectionType,
}

impl DiscoveredScanner {
    pub fn new(
        id: impl Into<CompactString>,
        name: impl Into<CompactString>,
        connection: ConnectionType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connection,
        }
    }
}

impl fmt::Display for DiscoveredScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.id, self.connection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    Usb,
    Network,
    Virtual,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionType::Usb => "usb",
            ConnectionType::Network => "network",
            ConnectionType::Virtual => "virtual",
        };
        f.write_str(s)
    }
}

/// Static set of values a device reports as supported.
///
/// Configuration validation runs against this before any device call is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerCapabilities {
    pub sources: SmallVec<[ScanSource; 4]>,
    pub color_modes: SmallVec<[ColorMode; 4]>,
    pub resolutions: SmallVec<[Resolution; 8]>,
    pub formats: SmallVec<[FileFormat; 4]>,
    /// Whether the transport can stop an in-flight preview or scan.
    pub supports_abort: bool,
}

impl ScannerCapabilities {
    pub fn supports_source(&self, source: ScanSource) -> bool {
        self.sources.contains(&source)
    }

    pub fn supports_color_mode(&self, mode: ColorMode) -> bool {
        self.color_modes.contains(&mode)
    }

    pub fn supports_resolution(&self, resolution: Resolution) -> bool {
        self.resolutions.contains(&resolution)
    }

    pub fn supports_format(&self, format: FileFormat) -> bool {
        self.formats.contains(&format)
    }
}
