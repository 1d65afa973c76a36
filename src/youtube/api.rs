use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use super::{key_param, metadata_error, ChannelRef, Transcript, VideoRecord};
use crate::credentials::ApiKey;
use crate::errors::ExportError;
use crate::google::{ApiClient, ApiError, ApiRequest};

/// Maximum ids accepted by one `videos.list` call
pub const VIDEO_BATCH_LIMIT: usize = 50;

const THUMBNAIL_PREFERENCE: &[&str] = &["maxres", "standard", "high", "medium", "default"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    id: String,
    #[serde(default)]
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    #[serde(default)]
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    channel_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: PlaylistItemDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: String,
}

/// One page of the uploads playlist
#[derive(Debug, Clone, Default)]
pub struct PlaylistPage {
    pub video_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Raw `videos.list` item
#[derive(Debug, Clone, Deserialize)]
pub struct VideoItem {
    pub id: String,
    #[serde(default)]
    snippet: Option<VideoSnippet>,
    #[serde(default)]
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
}

#[derive(Debug, Clone, Deserialize)]
struct Thumbnail {
    url: String,
}

// Counts arrive as decimal strings; hidden like counts are absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default)]
    view_count: Option<String>,
    #[serde(default)]
    like_count: Option<String>,
}

impl VideoItem {
    /// Normalize into a metadata-only record; the error names what is missing
    pub fn into_record(self) -> Result<VideoRecord, String> {
        let snippet = self.snippet.ok_or("no snippet returned")?;

        let title = snippet.title.trim().to_string();
        if self.id.trim().is_empty() {
            return Err("empty video id".into());
        }
        if title.is_empty() {
            return Err("empty title".into());
        }

        let published_at = snippet
            .published_at
            .as_deref()
            .ok_or("no publish date")?
            .parse::<DateTime<Utc>>()
            .map_err(|e| format!("invalid publish date: {e}"))?;

        let thumbnail_url = THUMBNAIL_PREFERENCE
            .iter()
            .find_map(|size| snippet.thumbnails.get(*size))
            .map(|thumb| thumb.url.clone());

        let stats = self.statistics;
        let count = |value: Option<&String>| value.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);

        Ok(VideoRecord {
            video_id: self.id,
            title,
            published_at,
            view_count: count(stats.as_ref().and_then(|s| s.view_count.as_ref())),
            like_count: count(stats.as_ref().and_then(|s| s.like_count.as_ref())),
            thumbnail_url,
            transcript: Transcript::Unavailable,
        })
    }
}

/// API-key client for the public YouTube Data API endpoints
pub struct YoutubeClient {
    api: ApiClient,
    base: String,
    key: ApiKey,
}

impl YoutubeClient {
    pub fn new(api: ApiClient, base: &str, key: ApiKey) -> Self {
        Self {
            api,
            base: base.trim_end_matches('/').to_string(),
            key,
        }
    }

    fn request(&self, resource: &str) -> ApiRequest {
        let (name, value) = key_param(&self.key);
        ApiRequest::get(format!("{}/{}", self.base, resource)).query(name, value)
    }

    async fn first_channel(&self, filter: &str, value: &str) -> Result<Option<String>, ExportError> {
        let request = self.request("channels").query("part", "id").query(filter, value);
        let response: ListResponse<ChannelItem> = self
            .api
            .json(&request)
            .await
            .map_err(|e| metadata_error(e, "resolving channel id"))?;
        Ok(response.items.into_iter().next().map(|c| c.id))
    }

    async fn search_channel(&self, query: &str) -> Result<Option<String>, ExportError> {
        let request = self
            .request("search")
            .query("part", "snippet")
            .query("q", query)
            .query("type", "channel")
            .query("maxResults", 1);
        let response: ListResponse<SearchItem> = self
            .api
            .json(&request)
            .await
            .map_err(|e| metadata_error(e, "searching for channel"))?;
        Ok(response.items.into_iter().next().map(|s| s.snippet.channel_id))
    }

    /// Resolve any channel reference to a channel id
    pub async fn resolve_channel_id(&self, channel: &ChannelRef) -> Result<String, ExportError> {
        let found = match channel {
            ChannelRef::Id(id) => Some(id.clone()),
            ChannelRef::Handle(handle) => self.first_channel("forHandle", handle).await?,
            ChannelRef::Username(name) => match self.first_channel("forUsername", name).await? {
                Some(id) => Some(id),
                None => {
                    tracing::debug!("No channel for username {}, falling back to search", name);
                    self.search_channel(name).await?
                }
            },
            ChannelRef::CustomUrl(name) => self.search_channel(name).await?,
        };

        found.ok_or_else(|| ExportError::ChannelNotFound(channel.to_string()))
    }

    /// The playlist holding every upload of the channel
    pub async fn uploads_playlist_id(&self, channel_id: &str) -> Result<String, ExportError> {
        let request = self
            .request("channels")
            .query("part", "contentDetails")
            .query("id", channel_id);
        let response: ListResponse<ChannelItem> = self
            .api
            .json(&request)
            .await
            .map_err(|e| metadata_error(e, "fetching uploads playlist id"))?;

        response
            .items
            .into_iter()
            .next()
            .and_then(|c| c.content_details)
            .and_then(|d| d.related_playlists.uploads)
            .ok_or_else(|| ExportError::ChannelNotFound(format!("no uploads playlist for channel {channel_id}")))
    }

    pub async fn playlist_page(
        &self,
        playlist_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<PlaylistPage, ExportError> {
        let mut request = self
            .request("playlistItems")
            .query("part", "contentDetails")
            .query("playlistId", playlist_id)
            .query("maxResults", page_size);
        if let Some(token) = page_token {
            request = request.query("pageToken", token);
        }

        // A channel that never uploaded has no uploads playlist yet
        let response: ListResponse<PlaylistItem> = match self.api.json(&request).await {
            Ok(response) => response,
            Err(ApiError::NotFound { reason }) if page_token.is_none() => {
                tracing::debug!("Uploads playlist {} not found ({}); treating the channel as empty", playlist_id, reason);
                return Ok(PlaylistPage {
                    video_ids: Vec::new(),
                    next_page_token: None,
                });
            }
            Err(e) => return Err(metadata_error(e, "listing channel uploads")),
        };

        Ok(PlaylistPage {
            video_ids: response
                .items
                .into_iter()
                .map(|item| item.content_details.video_id)
                .collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// Snippet and statistics for up to [`VIDEO_BATCH_LIMIT`] ids per call
    pub async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoItem>, ExportError> {
        let mut items = Vec::with_capacity(ids.len());
        for batch in ids.chunks(VIDEO_BATCH_LIMIT) {
            let request = self
                .request("videos")
                .query("part", "snippet,statistics")
                .query("id", batch.join(","));
            let response: ListResponse<VideoItem> = self
                .api
                .json(&request)
                .await
                .map_err(|e| metadata_error(e, "fetching video details"))?;
            items.extend(response.items);
        }
        Ok(items)
    }
}
