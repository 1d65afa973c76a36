use std::collections::{HashMap, HashSet};

use super::{ChannelRef, VideoRecord, YoutubeClient};
use crate::errors::{ExportError, RecordError, RecordErrorKind};

/// Records produced by one listing page
#[derive(Debug, Default)]
pub struct MetadataPage {
    pub records: Vec<VideoRecord>,

    /// Listed videos that could not be turned into records
    pub skipped: Vec<RecordError>,
}

/// Pages through a channel's uploads, newest first.
///
/// The sequence is finite and can only be walked once: each call to
/// [`MetadataFetcher::next_page`] advances the underlying page token. It ends
/// when `max_results` records have been produced or the playlist runs out.
pub struct MetadataFetcher<'a> {
    client: &'a YoutubeClient,
    playlist_id: String,
    page_size: u32,
    max_results: usize,
    emitted: usize,
    seen: HashSet<String>,
    next_token: Option<String>,
    exhausted: bool,
}

impl<'a> MetadataFetcher<'a> {
    /// Resolve the channel and position the fetcher before the first page
    pub async fn open(
        client: &'a YoutubeClient,
        channel_input: &str,
        max_results: u32,
        page_size: u32,
    ) -> Result<MetadataFetcher<'a>, ExportError> {
        let channel = ChannelRef::parse(channel_input)
            .ok_or_else(|| ExportError::ChannelNotFound("empty channel identifier".into()))?;

        let channel_id = client.resolve_channel_id(&channel).await?;
        tracing::info!("Resolved {} to channel id {}", channel, channel_id);

        let playlist_id = client.uploads_playlist_id(&channel_id).await?;
        tracing::debug!("Uploads playlist id: {}", playlist_id);

        Ok(Self::for_playlist(client, playlist_id, max_results, page_size))
    }

    pub fn for_playlist(client: &'a YoutubeClient, playlist_id: String, max_results: u32, page_size: u32) -> Self {
        Self {
            client,
            playlist_id,
            page_size: page_size.clamp(1, 50),
            max_results: max_results as usize,
            emitted: 0,
            seen: HashSet::new(),
            next_token: None,
            exhausted: false,
        }
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Fetch the next page, or `None` once the sequence is finished
    pub async fn next_page(&mut self) -> Result<Option<MetadataPage>, ExportError> {
        if self.exhausted || self.emitted >= self.max_results {
            return Ok(None);
        }

        let remaining = self.max_results - self.emitted;
        let request_size = self.page_size.min(remaining as u32);

        let page = self
            .client
            .playlist_page(&self.playlist_id, request_size, self.next_token.as_deref())
            .await?;

        self.next_token = page.next_page_token;
        if self.next_token.is_none() {
            self.exhausted = true;
        }

        let ids: Vec<String> = page
            .video_ids
            .into_iter()
            .filter(|id| !id.is_empty() && self.seen.insert(id.clone()))
            .take(remaining)
            .collect();

        if ids.is_empty() {
            return Ok(Some(MetadataPage::default()));
        }

        let mut details: HashMap<String, _> = self
            .client
            .video_details(&ids)
            .await?
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        let mut result = MetadataPage::default();
        for id in ids {
            let Some(item) = details.remove(&id) else {
                result.skipped.push(RecordError::new(
                    &id,
                    RecordErrorKind::MetadataUnavailable,
                    "not returned by the videos endpoint (private or deleted)",
                ));
                continue;
            };

            match item.into_record() {
                Ok(record) => result.records.push(record),
                Err(reason) => {
                    result
                        .skipped
                        .push(RecordError::new(&id, RecordErrorKind::MetadataUnavailable, reason));
                }
            }
        }

        self.emitted += result.records.len();
        tracing::debug!(
            "Fetched {} records ({} skipped), {} total",
            result.records.len(),
            result.skipped.len(),
            self.emitted
        );
        Ok(Some(result))
    }
}
