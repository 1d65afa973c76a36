use serde::Deserialize;

use super::Transcript;
use crate::config::TranscriptFormat;
use crate::errors::ExportError;
use crate::google::{AccessToken, ApiClient, ApiError, ApiRequest};
use crate::utils;

#[derive(Debug, Deserialize)]
struct CaptionList {
    #[serde(default)]
    items: Vec<CaptionTrack>,
}

#[derive(Debug, Clone, Deserialize)]
struct CaptionTrack {
    id: String,
    #[serde(default)]
    snippet: CaptionSnippet,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionSnippet {
    #[serde(default)]
    language: String,
    #[serde(default)]
    status: String,
}

/// Downloads caption tracks through an authorized OAuth session.
///
/// Missing, forbidden, and not-owned captions are ordinary outcomes and yield
/// [`Transcript::Unavailable`]. Only an expired or revoked session (`Auth`),
/// quota exhaustion (`Quota`) and exhausted retries (`Fetch`) are errors.
pub struct TranscriptFetcher<'a> {
    api: &'a ApiClient,
    base: String,
    token: &'a AccessToken,
    languages: &'a [String],
    format: TranscriptFormat,
}

impl<'a> TranscriptFetcher<'a> {
    pub fn new(
        api: &'a ApiClient,
        base: &str,
        token: &'a AccessToken,
        languages: &'a [String],
        format: TranscriptFormat,
    ) -> Self {
        Self {
            api,
            base: base.trim_end_matches('/').to_string(),
            token,
            languages,
            format,
        }
    }

    pub async fn fetch(&self, video_id: &str) -> Result<Transcript, ExportError> {
        let request = ApiRequest::get(format!("{}/captions", self.base))
            .query("part", "snippet")
            .query("videoId", video_id)
            .bearer(self.token.secret());

        let tracks = match self.api.json::<CaptionList>(&request).await {
            Ok(list) => list.items,
            Err(err) => return unavailable_or_error(err, video_id),
        };

        let Some(track) = self.pick_track(&tracks) else {
            tracing::debug!("No caption tracks for {}", video_id);
            return Ok(Transcript::Unavailable);
        };

        let request = ApiRequest::get(format!("{}/captions/{}", self.base, track.id))
            .query("tfmt", self.format.download_format())
            .bearer(self.token.secret());

        let body = match self.api.text(&request).await {
            Ok(body) => body,
            Err(err) => return unavailable_or_error(err, video_id),
        };

        let text = match self.format {
            TranscriptFormat::Plain => utils::srt_to_plain_text(&body),
            TranscriptFormat::Srt | TranscriptFormat::Vtt => body,
        };

        Ok(Transcript::from_text(&text))
    }

    /// First track in a preferred language, else the first usable track
    fn pick_track<'t>(&self, tracks: &'t [CaptionTrack]) -> Option<&'t CaptionTrack> {
        let usable: Vec<&CaptionTrack> = tracks
            .iter()
            .filter(|t| !t.snippet.status.eq_ignore_ascii_case("failed"))
            .collect();

        self.languages
            .iter()
            .find_map(|lang| usable.iter().find(|t| language_matches(&t.snippet.language, lang)))
            .or_else(|| usable.first())
            .copied()
    }
}

/// `en` matches `en`, `en-US` and `en-GB`
fn language_matches(track_language: &str, preferred: &str) -> bool {
    let track = track_language.to_ascii_lowercase();
    let preferred = preferred.to_ascii_lowercase();
    track == preferred || track.split('-').next() == Some(preferred.as_str())
}

fn unavailable_or_error(err: ApiError, video_id: &str) -> Result<Transcript, ExportError> {
    match err {
        ApiError::Forbidden { reason } | ApiError::NotFound { reason } => {
            tracing::debug!("Captions for {} not accessible ({})", video_id, reason);
            Ok(Transcript::Unavailable)
        }
        ApiError::Unauthorized { reason } => Err(ExportError::Auth(format!(
            "caption request for {video_id} was rejected ({reason}); re-run to grant consent again"
        ))),
        ApiError::Quota { reason } => Err(ExportError::Quota(reason)),
        ApiError::Transient { attempts, message } => Err(ExportError::Fetch {
            attempts,
            detail: format!("captions for {video_id}: {message}"),
        }),
        other => Err(ExportError::Fetch {
            attempts: 1,
            detail: format!("captions for {video_id}: {other}"),
        }),
    }
}
