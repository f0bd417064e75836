//! Scan orchestration: preview and multi-page scan lifecycle over a device
//! handle, with cancellation, typed lifecycle events and pluggable sinks.

pub mod app;
pub mod config;
pub mod core;
pub mod device;
pub mod export;
pub mod models;
pub mod sinks;
