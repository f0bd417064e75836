use std::fmt;

use crate::models::{ScanConfiguration, ScannerCapabilities};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Source,
    ColorMode,
    Resolution,
    Format,
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigField::Source => "source",
            ConfigField::ColorMode => "color mode",
            ConfigField::Resolution => "resolution",
            ConfigField::Format => "format",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported {field}: {value}")]
pub struct UnsupportedConfiguration {
    pub field: ConfigField,
    pub value: String,
}

impl UnsupportedConfiguration {
    fn new(field: ConfigField, value: impl fmt::Display) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

/// Checks `config` against the device capabilities.
///
/// Fields are checked in the order source, color mode, resolution, format and
/// the first unsupported one is reported.
pub fn validate<'a>(
    capabilities: &ScannerCapabilities,
    config: &'a ScanConfiguration,
) -> Result<&'a ScanConfiguration, UnsupportedConfiguration> {
    if !capabilities.supports_source(config.source()) {
        return Err(UnsupportedConfiguration::new(ConfigField::Source, config.source()));
    }
    if !capabilities.supports_color_mode(config.color_mode()) {
        return Err(UnsupportedConfiguration::new(
            ConfigField::ColorMode,
            config.color_mode(),
        ));
    }
    if !capabilities.supports_resolution(config.resolution()) {
        return Err(UnsupportedConfiguration::new(
            ConfigField::Resolution,
            config.resolution(),
        ));
    }
    if !capabilities.supports_format(config.format()) {
        return Err(UnsupportedConfiguration::new(ConfigField::Format, config.format()));
    }
    Ok(config)
}
