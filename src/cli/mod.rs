use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "channel-export",
    about = "Export YouTube channel video data to CSV, JSON, and/or Google Sheets",
    version,
    long_about = "Reads public video metadata for a YouTube channel through the YouTube Data API and, when an OAuth client secret is given, the caption tracks you are authorized to download. Results are written to a local file, a Google Sheets worksheet, or stdout."
)]
pub struct Cli {
    /// YouTube Data API key
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub api_key: String,

    /// Channel handle (@name), channel id, or channel URL
    #[arg(long, value_name = "CHANNEL")]
    pub channel: String,

    /// Maximum number of videos to export (defaults to the configured value)
    #[arg(long, value_name = "COUNT", value_parser = clap::value_parser!(u32).range(1..))]
    pub max: Option<u32>,

    /// Service account JSON key used to write Google Sheets
    #[arg(long, value_name = "FILE")]
    pub service_account: Option<PathBuf>,

    /// Target spreadsheet id
    #[arg(long, value_name = "ID")]
    pub spreadsheet_id: Option<String>,

    /// Worksheet name inside the spreadsheet
    #[arg(long, value_name = "NAME")]
    pub worksheet: Option<String>,

    /// OAuth client secret JSON enabling caption downloads
    #[arg(long, value_name = "FILE")]
    pub oauth_secrets: Option<PathBuf>,

    /// Write records to this file
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Output file format (inferred from the --out extension if not specified)
    #[arg(short, long, value_enum)]
    pub format: Option<FileFormat>,

    /// Where the caption OAuth token is cached
    #[arg(long, value_name = "FILE")]
    pub token_path: Option<PathBuf>,

    /// Settings file (YAML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fail instead of creating the worksheet when it does not exist
    #[arg(long)]
    pub no_create_worksheet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Default tracing filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "channel_exporter=debug,channel_export=debug"
        } else if self.quiet {
            "channel_exporter=warn,channel_export=warn"
        } else {
            "channel_exporter=info,channel_export=info"
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma separated values with a header row
    Csv,
    /// JSON array of records
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => FileFormat::Json,
            _ => FileFormat::Csv,
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Csv => write!(f, "csv"),
            FileFormat::Json => write!(f, "json"),
        }
    }
}
