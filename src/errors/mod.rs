use std::fmt;

/// Which of the three credential artifacts a failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ApiKey,
    ServiceAccount,
    OAuthClient,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::ApiKey => write!(f, "YouTube API key"),
            CredentialSource::ServiceAccount => write!(f, "service account key"),
            CredentialSource::OAuthClient => write!(f, "OAuth client secret"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialErrorKind {
    Missing,
    Malformed,
    Unauthorized,
}

impl fmt::Display for CredentialErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialErrorKind::Missing => write!(f, "missing"),
            CredentialErrorKind::Malformed => write!(f, "malformed"),
            CredentialErrorKind::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{source_name} is {kind}: {detail}")]
pub struct CredentialError {
    pub source_name: CredentialSource,
    pub kind: CredentialErrorKind,
    pub detail: String,
}

impl CredentialError {
    pub fn missing(source_name: CredentialSource, detail: impl Into<String>) -> Self {
        Self { source_name, kind: CredentialErrorKind::Missing, detail: detail.into() }
    }

    pub fn malformed(source_name: CredentialSource, detail: impl Into<String>) -> Self {
        Self { source_name, kind: CredentialErrorKind::Malformed, detail: detail.into() }
    }

    pub fn unauthorized(source_name: CredentialSource, detail: impl Into<String>) -> Self {
        Self { source_name, kind: CredentialErrorKind::Unauthorized, detail: detail.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    PermissionDenied,
    WorksheetNotFound,
    WriteFailed,
}

impl fmt::Display for SinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkErrorKind::PermissionDenied => write!(f, "permission denied"),
            SinkErrorKind::WorksheetNotFound => write!(f, "worksheet not found"),
            SinkErrorKind::WriteFailed => write!(f, "write failed"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{sink} sink: {kind}: {detail}")]
pub struct SinkError {
    pub sink: &'static str,
    pub kind: SinkErrorKind,
    pub detail: String,
}

impl SinkError {
    pub fn new(sink: &'static str, kind: SinkErrorKind, detail: impl Into<String>) -> Self {
        Self { sink, kind, detail: detail.into() }
    }

    /// Map a filesystem error onto the sink taxonomy
    pub fn from_io(sink: &'static str, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => SinkErrorKind::PermissionDenied,
            _ => SinkErrorKind::WriteFailed,
        };
        Self::new(sink, kind, err.to_string())
    }
}

/// Why a single video is missing data in the run result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordErrorKind {
    /// Listed by the channel but its metadata could not be read
    MetadataUnavailable,
    /// Caption download failed after retries; the transcript is left unavailable
    TranscriptFetch,
}

impl fmt::Display for RecordErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordErrorKind::MetadataUnavailable => write!(f, "metadata unavailable"),
            RecordErrorKind::TranscriptFetch => write!(f, "transcript fetch failed"),
        }
    }
}

/// Non-fatal, per-video problem collected during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub video_id: String,
    pub kind: RecordErrorKind,
    pub detail: String,
}

impl RecordError {
    pub fn new(video_id: &str, kind: RecordErrorKind, detail: impl Into<String>) -> Self {
        Self {
            video_id: video_id.to_string(),
            kind,
            detail: detail.into(),
        }
    }
}

/// Fatal errors that end an export run
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("YouTube API quota exceeded: {0}. Reduce --max, wait for the daily quota reset, or use another Google Cloud project")]
    Quota(String),

    #[error("Request failed after {attempts} attempt(s): {detail}")]
    Fetch { attempts: u32, detail: String },

    #[error("Caption access is no longer authorized: {0}")]
    Auth(String),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Export cancelled")]
    Cancelled,
}

impl ExportError {
    /// Short label for the error class, used in run summaries
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExportError::Credential(_) => "CredentialError",
            ExportError::Quota(_) => "QuotaError",
            ExportError::Fetch { .. } => "FetchError",
            ExportError::Auth(_) => "AuthError",
            ExportError::Sink(_) => "SinkError",
            ExportError::ChannelNotFound(_) => "ChannelNotFound",
            ExportError::Cancelled => "Cancelled",
        }
    }

    /// Process exit code for a run that failed with this error
    pub fn exit_code(&self) -> u8 {
        1
    }
}
