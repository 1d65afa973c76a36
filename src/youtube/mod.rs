use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

pub mod api;
pub mod captions;
pub mod metadata;

pub use api::YoutubeClient;
pub use captions::TranscriptFetcher;
pub use metadata::{MetadataFetcher, MetadataPage};

use crate::credentials::ApiKey;
use crate::errors::{CredentialError, CredentialSource, ExportError};
use crate::google::ApiError;

/// One exported video
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub view_count: u64,
    pub like_count: u64,

    /// Best available thumbnail
    pub thumbnail_url: Option<String>,

    pub transcript: Transcript,
}

impl VideoRecord {
    /// Public watch URL
    pub fn url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

/// Caption text, or the explicit marker that none could be obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Transcript {
    Available(String),
    Unavailable,
}

impl Transcript {
    /// Marker written to tabular outputs for [`Transcript::Unavailable`]
    pub const UNAVAILABLE_MARKER: &'static str = "(transcript not available)";

    /// Blank text counts as unavailable
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Transcript::Unavailable
        } else {
            Transcript::Available(text.to_string())
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Transcript::Available(text) => Some(text),
            Transcript::Unavailable => None,
        }
    }

    /// Cell value for CSV and spreadsheet output
    pub fn display_text(&self) -> &str {
        self.as_text().unwrap_or(Self::UNAVAILABLE_MARKER)
    }
}

/// The different ways a channel can be named on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Id(String),
    Handle(String),
    Username(String),
    CustomUrl(String),
}

impl ChannelRef {
    /// Interpret a handle, channel id, or channel URL. Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if input.starts_with('@') {
            return Some(ChannelRef::Handle(input.to_string()));
        }

        if is_channel_id(input) {
            return Some(ChannelRef::Id(input.to_string()));
        }

        if let Some(channel) = Self::from_url(input) {
            return Some(channel);
        }

        Some(ChannelRef::Username(input.to_string()))
    }

    fn from_url(input: &str) -> Option<Self> {
        let lower = input.to_lowercase();
        if !lower.contains("youtube.com") && !lower.contains("youtu.be") {
            return None;
        }

        let url = if lower.starts_with("http://") || lower.starts_with("https://") {
            Url::parse(input).ok()?
        } else {
            Url::parse(&format!("https://{input}")).ok()?
        };

        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [handle, ..] if handle.starts_with('@') && handle.len() > 1 => {
                Some(ChannelRef::Handle(handle.to_string()))
            }
            ["channel", id, ..] if is_channel_id(id) => Some(ChannelRef::Id(id.to_string())),
            ["user", name, ..] => Some(ChannelRef::Username(name.to_string())),
            ["c", name, ..] => Some(ChannelRef::CustomUrl(name.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "channel id {id}"),
            ChannelRef::Handle(handle) => write!(f, "handle {handle}"),
            ChannelRef::Username(name) => write!(f, "username {name}"),
            ChannelRef::CustomUrl(name) => write!(f, "custom URL {name}"),
        }
    }
}

/// `UC` followed by at least 20 id characters
fn is_channel_id(s: &str) -> bool {
    s.len() >= 22
        && s.starts_with("UC")
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Map a failed API-key call onto the fatal error taxonomy
pub(crate) fn metadata_error(err: ApiError, context: &str) -> ExportError {
    match err {
        ApiError::Quota { reason } => ExportError::Quota(reason),
        ApiError::Transient { attempts, message } => ExportError::Fetch {
            attempts,
            detail: format!("{context}: {message}"),
        },
        ApiError::Unauthorized { reason } | ApiError::Forbidden { reason } => {
            CredentialError::unauthorized(CredentialSource::ApiKey, format!("{context}: {reason}")).into()
        }
        ApiError::NotFound { reason } => ExportError::ChannelNotFound(format!("{context}: {reason}")),
        other => ExportError::Fetch {
            attempts: 1,
            detail: format!("{context}: {other}"),
        },
    }
}

/// Query pair carrying the API key
pub(crate) fn key_param(key: &ApiKey) -> (&'static str, String) {
    ("key", key.as_str().to_string())
}
