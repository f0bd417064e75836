use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum ScanSource {
    Flatbed,
    Feeder,
    /// Both sides of each sheet through the feeder.
    Duplex,
    /// Let the device pick between flatbed and feeder.
    AutoConfigured,
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanSource::Flatbed => "Flatbed",
            ScanSource::Feeder => "Feeder",
            ScanSource::Duplex => "Duplex",
            ScanSource::AutoConfigured => "AutoConfigured",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum ColorMode {
    Color,
    Grayscale,
    Monochrome,
    AutoColor,
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColorMode::Color => "Color",
            ColorMode::Grayscale => "Grayscale",
            ColorMode::Monochrome => "Monochrome",
            ColorMode::AutoColor => "AutoColor",
        };
        f.write_str(s)
    }
}

/// Scan resolution in dots per inch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resolution(pub u32);

impl Resolution {
    pub fn dpi(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dpi", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum FileFormat {
    Jpeg,
    Png,
    Bmp,
    Tiff,
    Pdf,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Jpeg => "jpg",
            FileFormat::Png => "png",
            FileFormat::Bmp => "bmp",
            FileFormat::Tiff => "tiff",
            FileFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileFormat::Jpeg => "Jpeg",
            FileFormat::Png => "Png",
            FileFormat::Bmp => "Bmp",
            FileFormat::Tiff => "Tiff",
            FileFormat::Pdf => "Pdf",
        };
        f.write_str(s)
    }
}

/// Page size hint passed through to the device; never validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum PageSize {
    A4,
    A5,
    Letter,
    Legal,
    Auto,
}

/// Parameters of a single scan or preview request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfiguration {
    source: ScanSource,
    color_mode: ColorMode,
    resolution: Resolution,
    format: FileFormat,
    page_size: PageSize,
}

impl ScanConfiguration {
    pub fn new(
        source: ScanSource,
        color_mode: ColorMode,
        resolution: Resolution,
        format: FileFormat,
    ) -> Self {
        Self {
            source,
            color_mode,
            resolution,
            format,
            page_size: PageSize::Auto,
        }
    }

    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn source(&self) -> ScanSource {
        self.source
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }
}
