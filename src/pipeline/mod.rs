use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::{AppConfig, ExportConfig};
use crate::credentials::{CredentialResolver, ResolvedCredentials};
use crate::errors::{ExportError, RecordError, RecordErrorKind};
use crate::google::{AccessToken, ApiClient, SessionProvider};
use crate::sinks::{ExportSink, FileSink, SheetsSink, StdoutSink};
use crate::youtube::{MetadataFetcher, Transcript, TranscriptFetcher, VideoRecord, YoutubeClient};

/// Pipeline states, in the order a successful run visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ResolvingCredentials,
    FetchingMetadata,
    EnrichingTranscripts,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::ResolvingCredentials => "resolving credentials",
            Stage::FetchingMetadata => "fetching metadata",
            Stage::EnrichingTranscripts => "enriching transcripts",
            Stage::Writing => "writing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Output of a run that reached `Done`, possibly with per-video gaps
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub records: Vec<VideoRecord>,
    pub errors: Vec<RecordError>,
}

impl RunResult {
    pub fn transcripts_available(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.transcript, Transcript::Available(_)))
            .count()
    }
}

/// A run that ended in `Failed`
#[derive(thiserror::Error, Debug)]
#[error("{error} (while {stage})")]
pub struct RunFailure {
    /// The stage that was active when the fatal error occurred
    pub stage: Stage,
    #[source]
    pub error: ExportError,
    /// Sinks that completed their write before the failure
    pub sinks_written: Vec<&'static str>,
    /// Whatever had been collected before the failure
    pub partial: RunResult,
}

/// Cooperative cancellation, checked between pages and between transcript fetches.
/// Waits that can block for long (the consent flow) also race [`CancelFlag::cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelFlag::cancel`] has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Resolve credentials, fetch metadata, enrich transcripts, write sinks.
///
/// Runs strictly sequentially. Per-video transcript failures are collected in
/// [`RunResult::errors`]; credential, quota, auth and sink failures end the run.
pub struct Pipeline {
    config: ExportConfig,
    settings: AppConfig,
    api: ApiClient,
    sessions: Arc<dyn SessionProvider>,
    cancel: CancelFlag,
    show_progress: bool,
    stage: Stage,
    extra_sinks: Vec<Box<dyn ExportSink>>,
}

struct Run {
    stage: Stage,
    result: RunResult,
    written: Vec<&'static str>,
}

impl Run {
    fn enter(&mut self, stage: Stage) {
        tracing::debug!("Pipeline: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn fail(self, error: ExportError) -> RunFailure {
        tracing::error!("Export failed while {}: {}", self.stage, error);
        RunFailure {
            stage: self.stage,
            error,
            sinks_written: self.written,
            partial: self.result,
        }
    }
}

impl Pipeline {
    pub fn new(config: ExportConfig, settings: AppConfig, api: ApiClient, sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            config,
            settings,
            api,
            sessions,
            cancel: CancelFlag::new(),
            show_progress: true,
            stage: Stage::Idle,
            extra_sinks: Vec::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Add a sink in addition to those named by the configuration
    pub fn with_sink(mut self, sink: Box<dyn ExportSink>) -> Self {
        self.extra_sinks.push(sink);
        self
    }

    /// Current state; `Done` or `Failed` after [`Pipeline::run`] returns
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub async fn run(&mut self) -> Result<RunResult, RunFailure> {
        tracing::info!("Starting export for {} (max {} videos)", self.config.channel_handle, self.config.max_results);

        let mut extra_sinks = std::mem::take(&mut self.extra_sinks);
        let outcome = self.execute(&mut extra_sinks).await;
        self.extra_sinks = extra_sinks;

        self.stage = match &outcome {
            Ok(_) => Stage::Done,
            Err(_) => Stage::Failed,
        };
        outcome
    }

    async fn execute(&self, extra_sinks: &mut [Box<dyn ExportSink>]) -> Result<RunResult, RunFailure> {
        let mut run = Run {
            stage: Stage::Idle,
            result: RunResult::default(),
            written: Vec::new(),
        };

        run.enter(Stage::ResolvingCredentials);
        if let Err(e) = self.check_cancelled() {
            return Err(run.fail(e));
        }
        let credentials = match CredentialResolver::resolve(&self.config) {
            Ok(credentials) => credentials,
            Err(e) => return Err(run.fail(e.into())),
        };

        let caption_token = match &credentials.oauth_client {
            Some(client) => {
                tracing::info!("OAuth enabled for transcripts");
                let session = tokio::select! {
                    session = self.sessions.caption_session(client) => session,
                    _ = self.cancel.cancelled() => Err(ExportError::Cancelled),
                };
                match session {
                    Ok(token) => Some(token),
                    Err(e) => return Err(run.fail(e)),
                }
            }
            None => {
                tracing::info!("OAuth not enabled; transcripts will be marked unavailable");
                None
            }
        };

        let mut sinks = self.configured_sinks(&credentials, extra_sinks.is_empty());

        run.enter(Stage::FetchingMetadata);
        if let Err(e) = self.fetch_metadata(&credentials, &mut run.result).await {
            return Err(run.fail(e));
        }
        tracing::info!("Fetched metadata for {} videos", run.result.records.len());

        if let Some(token) = &caption_token {
            run.enter(Stage::EnrichingTranscripts);
            if let Err(e) = self.enrich_transcripts(token, &mut run.result).await {
                return Err(run.fail(e));
            }
        }

        run.enter(Stage::Writing);
        let all_sinks = sinks.iter_mut().chain(extra_sinks.iter_mut());
        for sink in all_sinks {
            tracing::debug!("Writing {} records to {} sink", run.result.records.len(), sink.name());
            if let Err(e) = sink.write(&run.result.records).await {
                return Err(run.fail(e));
            }
            run.written.push(sink.name());
        }

        run.enter(Stage::Done);
        tracing::info!(
            "Export finished: {} records, {} transcripts, {} problems",
            run.result.records.len(),
            run.result.transcripts_available(),
            run.result.errors.len()
        );
        Ok(run.result)
    }

    fn configured_sinks(&self, credentials: &ResolvedCredentials, fallback_to_stdout: bool) -> Vec<Box<dyn ExportSink>> {
        let mut sinks: Vec<Box<dyn ExportSink>> = Vec::new();

        if let Some(path) = &self.config.output_path {
            sinks.push(Box::new(FileSink::new(path.clone(), self.config.output_format)));
        }

        if let (Some(spreadsheet_id), Some(key)) = (&self.config.spreadsheet_id, &credentials.service_account) {
            sinks.push(Box::new(SheetsSink::new(
                self.api.clone(),
                &self.settings.sheets.api_base,
                spreadsheet_id,
                self.config.worksheet_or(&self.settings.sheets.default_worksheet),
                key.clone(),
                self.sessions.clone(),
                self.config.create_missing_worksheet,
            )));
        }

        if sinks.is_empty() && fallback_to_stdout {
            sinks.push(Box::new(StdoutSink::new(self.config.output_format)));
        }

        sinks
    }

    async fn fetch_metadata(&self, credentials: &ResolvedCredentials, result: &mut RunResult) -> Result<(), ExportError> {
        self.check_cancelled()?;

        let youtube = YoutubeClient::new(self.api.clone(), &self.settings.youtube.api_base, credentials.api_key.clone());
        let mut fetcher = MetadataFetcher::open(
            &youtube,
            &self.config.channel_handle,
            self.config.max_results,
            self.settings.page_size(),
        )
        .await?;

        let spinner = self.spinner("Fetching video metadata...");
        loop {
            self.check_cancelled()?;
            let Some(page) = fetcher.next_page().await? else {
                break;
            };
            result.records.extend(page.records);
            result.errors.extend(page.skipped);
            spinner.set_message(format!("Fetched {} videos", result.records.len()));
        }
        spinner.finish_and_clear();

        Ok(())
    }

    async fn enrich_transcripts(&self, token: &AccessToken, result: &mut RunResult) -> Result<(), ExportError> {
        let fetcher = TranscriptFetcher::new(
            &self.api,
            &self.settings.youtube.api_base,
            token,
            &self.settings.youtube.caption_languages,
            self.settings.youtube.transcript_format,
        );

        let bar = self.progress_bar(result.records.len() as u64, "Downloading captions");
        for record in result.records.iter_mut() {
            if let Err(e) = self.check_cancelled() {
                bar.abandon();
                return Err(e);
            }

            match fetcher.fetch(&record.video_id).await {
                Ok(transcript) => record.transcript = transcript,
                Err(ExportError::Fetch { attempts, detail }) => {
                    tracing::warn!("Transcript for {} failed after {} attempts: {}", record.video_id, attempts, detail);
                    record.transcript = Transcript::Unavailable;
                    result
                        .errors
                        .push(RecordError::new(&record.video_id, RecordErrorKind::TranscriptFetch, detail));
                }
                Err(fatal) => {
                    bar.abandon();
                    return Err(fatal);
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), ExportError> {
        if self.cancel.is_cancelled() {
            Err(ExportError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn spinner(&self, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(message);
        spinner
    }

    fn progress_bar(&self, len: u64, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(message);
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::FileFormat;
    use crate::credentials::fixtures::{json_file, oauth_client_json};
    use crate::errors::CredentialSource;
    use crate::google::session::StaticSessions;
    use crate::google::testing::{google_error, ScriptedTransport};
    use crate::credentials::{OAuthClientSecret, ServiceAccountKey};
    use crate::errors::CredentialError;
    use crate::google::{ApiRequest, ApiResponse, HttpTransport, RetryPolicy, TransportError};
    use crate::sinks::MockExportSink;
    use async_trait::async_trait;
    use crate::youtube::fixtures::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn config(max_results: u32, oauth: Option<PathBuf>) -> ExportConfig {
        ExportConfig {
            api_key: "key".into(),
            channel_handle: "@creator".into(),
            max_results,
            service_account_path: None,
            spreadsheet_id: None,
            worksheet_name: None,
            oauth_client_secret_path: oauth,
            output_path: None,
            output_format: FileFormat::Csv,
            token_path: PathBuf::from("unused-token.json"),
            create_missing_worksheet: true,
        }
    }

    fn pipeline(transport: &Arc<ScriptedTransport>, config: ExportConfig) -> Pipeline {
        pipeline_with(transport.clone(), Arc::new(StaticSessions::ok()), config)
    }

    fn pipeline_with(
        transport: Arc<dyn HttpTransport>,
        sessions: Arc<dyn SessionProvider>,
        config: ExportConfig,
    ) -> Pipeline {
        let mut settings = AppConfig::default();
        settings.youtube.api_base = "https://yt.test/v3".into();
        settings.sheets.api_base = "https://sheets.test/v4".into();
        let api = ApiClient::new(transport, RetryPolicy::new(1, Duration::ZERO));
        Pipeline::new(config, settings, api, sessions).with_progress(false)
    }

    /// Cancels the run once a request to `suffix` has been answered
    struct CancelAfter {
        inner: Arc<ScriptedTransport>,
        suffix: &'static str,
        cancel: CancelFlag,
    }

    #[async_trait]
    impl HttpTransport for CancelAfter {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
            let response = self.inner.send(request).await;
            if request.url.ends_with(self.suffix) {
                self.cancel.cancel();
            }
            response
        }
    }

    /// A consent flow the user never completes
    struct StalledConsent;

    #[async_trait]
    impl SessionProvider for StalledConsent {
        async fn caption_session(&self, _client: &OAuthClientSecret) -> Result<AccessToken, ExportError> {
            std::future::pending().await
        }

        async fn spreadsheet_session(&self, _key: &ServiceAccountKey) -> Result<AccessToken, CredentialError> {
            std::future::pending().await
        }
    }

    fn channel(transport: &ScriptedTransport) {
        transport.respond_to_query("/channels", &[("part", "id")], ApiResponse::new(200, channel_lookup("UCx").to_string()));
        transport.respond_to_query(
            "/channels",
            &[("part", "contentDetails")],
            ApiResponse::new(200, channel_uploads("UCx", "UUx").to_string()),
        );
    }

    /// Sink that records every write
    fn recording_sink() -> (MockExportSink, Arc<Mutex<Vec<Vec<VideoRecord>>>>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let captured = writes.clone();
        let mut sink = MockExportSink::new();
        sink.expect_name().return_const("mock");
        sink.expect_write().returning(move |records| {
            captured.lock().unwrap().push(records.to_vec());
            Ok(())
        });
        (sink, writes)
    }

    fn never_written_sink() -> MockExportSink {
        let mut sink = MockExportSink::new();
        sink.expect_name().return_const("mock");
        sink.expect_write().times(0);
        sink
    }

    #[tokio::test]
    async fn test_quota_exceeded_fails_without_sink_writes() {
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond("/playlistItems", ApiResponse::new(403, google_error(403, "quotaExceeded")));

        let mut pipeline = pipeline(&transport, config(10, None)).with_sink(Box::new(never_written_sink()));
        let failure = pipeline.run().await.unwrap_err();

        assert_eq!(failure.stage, Stage::FetchingMetadata);
        assert!(matches!(failure.error, ExportError::Quota(_)));
        assert!(failure.sinks_written.is_empty());
        assert_eq!(pipeline.stage(), Stage::Failed);
    }

    #[tokio::test]
    async fn test_transcript_gaps_do_not_fail_the_run() {
        let oauth = json_file(&oauth_client_json());
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond_json("/playlistItems", playlist_page(&["a", "b", "c"], None));
        transport.respond_json("/videos", videos(&["a", "b", "c"]));

        transport.respond_to_query("/captions", &[("videoId", "a")], ApiResponse::new(200, json!({"items": [{"id": "cap-a", "snippet": {"language": "en"}}]}).to_string()));
        transport.respond("/captions/cap-a", ApiResponse::new(200, "Hello"));
        transport.respond_to_query("/captions", &[("videoId", "b")], ApiResponse::new(503, google_error(503, "backendError")));
        transport.respond_to_query("/captions", &[("videoId", "c")], ApiResponse::new(403, google_error(403, "forbidden")));

        let (sink, writes) = recording_sink();
        let mut pipeline = pipeline(&transport, config(10, Some(oauth.path().to_path_buf()))).with_sink(Box::new(sink));
        let result = pipeline.run().await.unwrap();

        assert_eq!(pipeline.stage(), Stage::Done);
        let transcripts: Vec<&Transcript> = result.records.iter().map(|r| &r.transcript).collect();
        assert_eq!(transcripts, vec![&Transcript::Available("Hello".into()), &Transcript::Unavailable, &Transcript::Unavailable]);

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].video_id, "b");
        assert_eq!(result.errors[0].kind, RecordErrorKind::TranscriptFetch);

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], result.records);
    }

    #[tokio::test]
    async fn test_record_count_bounded_and_ids_unique() {
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond_to_query("/playlistItems", &[("maxResults", "4")], ApiResponse::new(200, playlist_page(&["a", "b", "a", "c"], Some("p2")).to_string()));
        transport.respond_to_query("/playlistItems", &[("pageToken", "p2")], ApiResponse::new(200, playlist_page(&["c", "d", "e"], Some("p3")).to_string()));
        transport.respond_to_query("/videos", &[("id", "a,b,c")], ApiResponse::new(200, videos(&["a", "b", "c"]).to_string()));
        transport.respond_to_query("/videos", &[("id", "d")], ApiResponse::new(200, videos(&["d"]).to_string()));

        let (sink, _) = recording_sink();
        let mut pipeline = pipeline(&transport, config(4, None)).with_sink(Box::new(sink));
        let result = pipeline.run().await.unwrap();

        assert!(result.records.len() <= 4);
        let ids: HashSet<&str> = result.records.iter().map(|r| r.video_id.as_str()).collect();
        assert_eq!(ids.len(), result.records.len());
        assert_eq!(result.records.len(), 4);
    }

    #[tokio::test]
    async fn test_without_oauth_transcripts_are_unavailable() {
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond_json("/playlistItems", playlist_page(&["a"], None));
        transport.respond_json("/videos", videos(&["a"]));

        let (sink, _) = recording_sink();
        let result = pipeline(&transport, config(5, None)).with_sink(Box::new(sink)).run().await.unwrap();

        assert_eq!(result.records[0].transcript, Transcript::Unavailable);
        assert_eq!(transport.calls("/captions"), 0);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_empty_channel_still_writes() {
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond_json("/playlistItems", playlist_page(&[], None));

        let (sink, writes) = recording_sink();
        let result = pipeline(&transport, config(5, None)).with_sink(Box::new(sink)).run().await.unwrap();

        assert!(result.records.is_empty());
        assert_eq!(writes.lock().unwrap().as_slice(), &[Vec::<VideoRecord>::new()]);
    }

    #[tokio::test]
    async fn test_auth_error_is_fatal_during_enrichment() {
        let oauth = json_file(&oauth_client_json());
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond_json("/playlistItems", playlist_page(&["a", "b"], None));
        transport.respond_json("/videos", videos(&["a", "b"]));
        transport.respond("/captions", ApiResponse::new(401, google_error(401, "authError")));

        let mut pipeline = pipeline(&transport, config(5, Some(oauth.path().to_path_buf()))).with_sink(Box::new(never_written_sink()));
        let failure = pipeline.run().await.unwrap_err();

        assert_eq!(failure.stage, Stage::EnrichingTranscripts);
        assert!(matches!(failure.error, ExportError::Auth(_)));
        assert_eq!(transport.calls("/captions"), 1);
        assert_eq!(failure.partial.records.len(), 2);
    }

    #[tokio::test]
    async fn test_credential_failure_happens_before_any_request() {
        let transport = ScriptedTransport::new();
        let mut cfg = config(5, None);
        cfg.spreadsheet_id = Some("sheet".into());

        let failure = pipeline(&transport, cfg)
            .with_sink(Box::new(never_written_sink()))
            .run()
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::ResolvingCredentials);
        match failure.error {
            ExportError::Credential(e) => assert_eq!(e.source_name, CredentialSource::ServiceAccount),
            other => panic!("unexpected error: {other}"),
        }
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let transport = ScriptedTransport::new();
        channel(&transport);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let failure = pipeline(&transport, config(5, None))
            .with_cancel_flag(cancel)
            .with_sink(Box::new(never_written_sink()))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ExportError::Cancelled));
        assert_eq!(failure.stage, Stage::ResolvingCredentials);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_consent_wait() {
        let oauth = json_file(&oauth_client_json());
        let transport = ScriptedTransport::new();
        let cancel = CancelFlag::new();

        let interrupt = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            interrupt.cancel();
        });

        let mut pipeline = pipeline_with(
            transport.clone(),
            Arc::new(StalledConsent),
            config(5, Some(oauth.path().to_path_buf())),
        )
        .with_cancel_flag(cancel)
        .with_sink(Box::new(never_written_sink()));

        let failure = tokio::time::timeout(Duration::from_secs(5), pipeline.run())
            .await
            .expect("cancellation did not interrupt the consent wait")
            .unwrap_err();

        assert!(matches!(failure.error, ExportError::Cancelled));
        assert_eq!(failure.stage, Stage::ResolvingCredentials);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_enrichment_writes_nothing() {
        let oauth = json_file(&oauth_client_json());
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond_json("/playlistItems", playlist_page(&["a", "b"], None));
        transport.respond_json("/videos", videos(&["a", "b"]));
        transport.respond_json("/captions", json!({"items": [{"id": "cap-a", "snippet": {"language": "en"}}]}));
        transport.respond("/captions/cap-a", ApiResponse::new(200, "Hello"));

        let cancel = CancelFlag::new();
        let cancelling = Arc::new(CancelAfter {
            inner: transport.clone(),
            suffix: "/captions/cap-a",
            cancel: cancel.clone(),
        });

        let mut pipeline = pipeline_with(cancelling, Arc::new(StaticSessions::ok()), config(5, Some(oauth.path().to_path_buf())))
            .with_cancel_flag(cancel)
            .with_sink(Box::new(never_written_sink()));
        let failure = pipeline.run().await.unwrap_err();

        assert!(matches!(failure.error, ExportError::Cancelled));
        assert_eq!(failure.stage, Stage::EnrichingTranscripts);
        assert_eq!(transport.calls("/captions"), 1);
        assert_eq!(transport.calls("/captions/cap-a"), 1);
        assert!(failure.sinks_written.is_empty());
        assert_eq!(failure.partial.records[0].transcript, Transcript::Available("Hello".into()));
    }

    #[tokio::test]
    async fn test_channel_without_uploads_playlist_is_empty() {
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond("/playlistItems", ApiResponse::new(404, google_error(404, "playlistNotFound")));

        let (sink, writes) = recording_sink();
        let mut pipeline = pipeline(&transport, config(5, None)).with_sink(Box::new(sink));
        let result = pipeline.run().await.unwrap();

        assert_eq!(pipeline.stage(), Stage::Done);
        assert!(result.records.is_empty());
        assert_eq!(writes.lock().unwrap().as_slice(), &[Vec::<VideoRecord>::new()]);
        assert_eq!(transport.calls("/videos"), 0);
    }

    #[tokio::test]
    async fn test_sink_failure_is_fatal() {
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond_json("/playlistItems", playlist_page(&[], None));

        let mut sink = MockExportSink::new();
        sink.expect_name().return_const("mock");
        sink.expect_write().times(1).returning(|_| {
            Err(crate::errors::SinkError::new("mock", crate::errors::SinkErrorKind::WriteFailed, "disk full").into())
        });

        let failure = pipeline(&transport, config(5, None)).with_sink(Box::new(sink)).run().await.unwrap_err();
        assert_eq!(failure.stage, Stage::Writing);
        assert!(matches!(failure.error, ExportError::Sink(_)));
    }

    #[tokio::test]
    async fn test_rerun_produces_identical_output() {
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond_json("/playlistItems", playlist_page(&["a", "b"], None));
        transport.respond_json("/videos", videos(&["a", "b"]));

        let (sink, writes) = recording_sink();
        let mut pipeline = pipeline(&transport, config(5, None)).with_sink(Box::new(sink));
        pipeline.run().await.unwrap();
        pipeline.run().await.unwrap();

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], writes[1]);
    }

    #[tokio::test]
    async fn test_file_sink_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("videos.csv");
        let transport = ScriptedTransport::new();
        channel(&transport);
        transport.respond_json("/playlistItems", playlist_page(&["a"], None));
        transport.respond_json("/videos", videos(&["a"]));

        let mut cfg = config(5, None);
        cfg.output_path = Some(out.clone());
        pipeline(&transport, cfg).run().await.unwrap();

        let content = fs_err::read_to_string(&out).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("Video a"));
    }
}
