use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{Cli, FileFormat};

const APP_DIR: &str = "channel-exporter";
const LOCAL_CONFIG: &str = "channel-exporter.yaml";

/// Application settings loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// YouTube Data API settings
    pub youtube: YoutubeConfig,

    /// Google Sheets settings
    pub sheets: SheetsConfig,

    /// OAuth consent and token cache settings
    pub oauth: OAuthConfig,

    /// Retry policy for transient upstream failures
    pub retry: RetryConfig,

    /// Defaults for values not given on the command line
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub api_base: String,

    /// Items per listing page (the API allows at most 50)
    pub page_size: u32,

    /// Caption languages to prefer, in order
    pub caption_languages: Vec<String>,

    pub transcript_format: TranscriptFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub api_base: String,
    pub default_worksheet: String,

    /// Create the worksheet when it does not exist instead of failing
    pub create_missing_worksheet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Where the caption OAuth token is cached (defaults to the config directory)
    pub token_path: Option<PathBuf>,

    pub consent_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub max_results: u32,
}

/// Caption text representation stored in the transcript field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptFormat {
    Srt,
    Vtt,
    /// SRT with cue numbers and timings stripped
    Plain,
}

impl TranscriptFormat {
    /// Value of the `tfmt` parameter for caption downloads
    pub fn download_format(&self) -> &'static str {
        match self {
            TranscriptFormat::Srt | TranscriptFormat::Plain => "srt",
            TranscriptFormat::Vtt => "vtt",
        }
    }
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            page_size: 50,
            caption_languages: vec!["en".to_string(), "de".to_string()],
            transcript_format: TranscriptFormat::Srt,
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://sheets.googleapis.com/v4".to_string(),
            default_worksheet: "Example".to_string(),
            create_missing_worksheet: true,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_path: None,
            consent_timeout_secs: 300,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { max_results: 25 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            youtube: YoutubeConfig::default(),
            sheets: SheetsConfig::default(),
            oauth: OAuthConfig::default(),
            retry: RetryConfig::default(),
            defaults: DefaultsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load settings from an explicit path, the working directory, or the user config directory.
    /// Falls back to defaults when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            return Self::load_from(&local_config);
        }

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate settings from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.youtube.page_size == 0 {
            anyhow::bail!("youtube.page_size must be at least 1");
        }
        if self.youtube.api_base.trim().is_empty() {
            anyhow::bail!("youtube.api_base must not be empty");
        }
        if self.sheets.api_base.trim().is_empty() {
            anyhow::bail!("sheets.api_base must not be empty");
        }
        if self.sheets.default_worksheet.trim().is_empty() {
            anyhow::bail!("sheets.default_worksheet must not be empty");
        }
        if self.defaults.max_results == 0 {
            anyhow::bail!("defaults.max_results must be at least 1");
        }
        Ok(())
    }

    /// Listing page size clamped to what the API accepts
    pub fn page_size(&self) -> u32 {
        self.youtube.page_size.clamp(1, 50)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry.base_delay_ms)
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.oauth.consent_timeout_secs)
    }

    /// Token cache location, defaulting next to the user config file
    pub fn token_path(&self) -> PathBuf {
        if let Some(path) = &self.oauth.token_path {
            return path.clone();
        }
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("token.json"))
            .unwrap_or_else(|| PathBuf::from("token.json"))
    }
}

/// Everything one export run needs, fixed at start
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub api_key: String,
    pub channel_handle: String,
    pub max_results: u32,
    pub service_account_path: Option<PathBuf>,
    pub spreadsheet_id: Option<String>,
    pub worksheet_name: Option<String>,
    pub oauth_client_secret_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub output_format: FileFormat,
    pub token_path: PathBuf,
    pub create_missing_worksheet: bool,
}

impl ExportConfig {
    /// Merge command line flags over the loaded settings
    pub fn from_cli(cli: &Cli, settings: &AppConfig) -> Self {
        let output_format = cli.format.unwrap_or_else(|| {
            cli.out
                .as_deref()
                .map(FileFormat::from_path)
                .unwrap_or(FileFormat::Csv)
        });

        Self {
            api_key: cli.api_key.trim().to_string(),
            channel_handle: cli.channel.trim().to_string(),
            max_results: cli.max.unwrap_or(settings.defaults.max_results),
            service_account_path: cli.service_account.clone(),
            spreadsheet_id: non_blank(cli.spreadsheet_id.as_deref()),
            worksheet_name: non_blank(cli.worksheet.as_deref()),
            oauth_client_secret_path: cli.oauth_secrets.clone(),
            output_path: cli.out.clone(),
            output_format,
            token_path: cli.token_path.clone().unwrap_or_else(|| settings.token_path()),
            create_missing_worksheet: settings.sheets.create_missing_worksheet && !cli.no_create_worksheet,
        }
    }

    /// Worksheet to write, falling back to the configured default
    pub fn worksheet_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.worksheet_name.as_deref().unwrap_or(default)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
