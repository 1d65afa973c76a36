//! Channel Exporter - export a YouTube channel's videos to CSV, JSON or Google Sheets
//!
//! Video metadata is listed with an API key. Caption transcripts are optional and
//! need an OAuth client authorized by the channel owner; Google Sheets output needs
//! a service account with edit access to the target spreadsheet.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod google;
pub mod output;
pub mod pipeline;
pub mod sinks;
pub mod utils;
pub mod youtube;

pub use cli::{Cli, FileFormat};
pub use config::{AppConfig, ExportConfig};
pub use errors::{CredentialError, ExportError, RecordError, SinkError};
pub use pipeline::{CancelFlag, Pipeline, RunFailure, RunResult, Stage};
pub use youtube::{Transcript, VideoRecord};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
