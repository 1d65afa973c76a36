use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::ExportSink;
use crate::credentials::ServiceAccountKey;
use crate::errors::{ExportError, SinkError, SinkErrorKind};
use crate::google::{AccessToken, ApiClient, ApiError, ApiRequest, SessionProvider};
use crate::utils;
use crate::youtube::VideoRecord;

const SINK: &str = "spreadsheet";

/// Google Sheets rejects cells longer than this
pub const CELL_CHAR_LIMIT: usize = 50_000;

pub const HEADERS: &[&str] = &[
    "Video Link",
    "Thumbnail",
    "Title",
    "Posted Date",
    "Views",
    "Likes",
    "Transcript",
];

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

/// Replaces the contents of one worksheet with the record set.
///
/// Each write clears the worksheet before writing the header and rows, so
/// running the same export twice leaves the same content.
pub struct SheetsSink {
    api: ApiClient,
    base: String,
    spreadsheet_id: String,
    worksheet: String,
    key: ServiceAccountKey,
    sessions: Arc<dyn SessionProvider>,
    create_missing: bool,
}

impl SheetsSink {
    pub fn new(
        api: ApiClient,
        base: &str,
        spreadsheet_id: &str,
        worksheet: &str,
        key: ServiceAccountKey,
        sessions: Arc<dyn SessionProvider>,
        create_missing: bool,
    ) -> Self {
        Self {
            api,
            base: base.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            worksheet: worksheet.to_string(),
            key,
            sessions,
            create_missing,
        }
    }

    async fn open_session(&self) -> Result<SheetsSession<'_>, ExportError> {
        let token = self.sessions.spreadsheet_session(&self.key).await?;
        tracing::debug!("Acquired spreadsheet session for {}", self.key.client_email);
        Ok(SheetsSession { sink: self, token })
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/spreadsheets/{}", self.base, urlencoding::encode(&self.spreadsheet_id))
    }

    fn map_error(&self, err: ApiError, action: &str) -> SinkError {
        match err {
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. } => SinkError::new(
                SINK,
                SinkErrorKind::PermissionDenied,
                format!(
                    "cannot {action} ({}). Share the spreadsheet with {} as Editor",
                    err.reason(),
                    self.key.client_email
                ),
            ),
            ApiError::NotFound { .. } => SinkError::new(
                SINK,
                SinkErrorKind::WorksheetNotFound,
                format!("spreadsheet {} was not found while trying to {action}", self.spreadsheet_id),
            ),
            other => SinkError::new(SINK, SinkErrorKind::WriteFailed, format!("cannot {action}: {other}")),
        }
    }
}

/// Authorized session, held only for the duration of one write
struct SheetsSession<'a> {
    sink: &'a SheetsSink,
    token: AccessToken,
}

impl SheetsSession<'_> {
    async fn worksheet_titles(&self) -> Result<Vec<String>, SinkError> {
        let request = ApiRequest::get(self.sink.spreadsheet_url())
            .query("fields", "sheets.properties.title")
            .bearer(self.token.secret());

        let meta: SpreadsheetMeta = self
            .sink
            .api
            .json(&request)
            .await
            .map_err(|e| self.sink.map_error(e, "read spreadsheet metadata"))?;

        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn add_worksheet(&self) -> Result<(), SinkError> {
        let request = ApiRequest::post(format!("{}:batchUpdate", self.sink.spreadsheet_url()))
            .bearer(self.token.secret())
            .json(json!({
                "requests": [{ "addSheet": { "properties": { "title": self.sink.worksheet } } }]
            }));

        self.sink
            .api
            .execute(&request)
            .await
            .map_err(|e| self.sink.map_error(e, "create the worksheet"))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), SinkError> {
        let range = sheet_range(&self.sink.worksheet, None);
        let request = ApiRequest::post(format!(
            "{}/values/{}:clear",
            self.sink.spreadsheet_url(),
            urlencoding::encode(&range)
        ))
        .bearer(self.token.secret())
        .json(json!({}));

        self.sink
            .api
            .execute(&request)
            .await
            .map_err(|e| self.sink.map_error(e, "clear the worksheet"))?;
        Ok(())
    }

    async fn update(&self, values: Vec<Vec<Value>>) -> Result<(), SinkError> {
        let range = sheet_range(&self.sink.worksheet, Some("A1"));
        let request = ApiRequest::put(format!(
            "{}/values/{}",
            self.sink.spreadsheet_url(),
            urlencoding::encode(&range)
        ))
        .query("valueInputOption", "USER_ENTERED")
        .bearer(self.token.secret())
        .json(json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        }));

        self.sink
            .api
            .execute(&request)
            .await
            .map_err(|e| self.sink.map_error(e, "write rows"))?;
        Ok(())
    }
}

impl Drop for SheetsSession<'_> {
    fn drop(&mut self) {
        tracing::debug!("Released spreadsheet session");
    }
}

#[async_trait]
impl ExportSink for SheetsSink {
    fn name(&self) -> &'static str {
        SINK
    }

    async fn write(&mut self, records: &[VideoRecord]) -> Result<(), ExportError> {
        let session = self.open_session().await?;

        let titles = session.worksheet_titles().await?;
        if !titles.iter().any(|t| t == &self.worksheet) {
            if !self.create_missing {
                let available = if titles.is_empty() { "(none)".to_string() } else { titles.join(", ") };
                return Err(SinkError::new(
                    SINK,
                    SinkErrorKind::WorksheetNotFound,
                    format!("worksheet \"{}\" not found. Available worksheets: {}", self.worksheet, available),
                )
                .into());
            }
            tracing::info!("Creating worksheet \"{}\"", self.worksheet);
            session.add_worksheet().await?;
        }

        session.clear().await?;
        session.update(sheet_values(records)).await?;

        tracing::info!(
            "Wrote {} rows to worksheet \"{}\" of spreadsheet {}",
            records.len(),
            self.worksheet,
            self.spreadsheet_id
        );
        Ok(())
    }
}

/// A1 range for a whole sheet, or a cell within it. Names are always quoted.
pub fn sheet_range(worksheet: &str, cell: Option<&str>) -> String {
    let quoted = format!("'{}'", worksheet.replace('\'', "''"));
    match cell {
        Some(cell) => format!("{quoted}!{cell}"),
        None => quoted,
    }
}

/// Header row plus one row per record
pub fn sheet_values(records: &[VideoRecord]) -> Vec<Vec<Value>> {
    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(HEADERS.iter().map(|h| Value::from(*h)).collect());

    for record in records {
        let thumbnail = record
            .thumbnail_url
            .as_deref()
            .map(|url| format!("=IMAGE(\"{}\")", url.replace('"', "\"\"")))
            .unwrap_or_default();

        rows.push(vec![
            Value::from(record.url()),
            Value::from(thumbnail),
            text_cell(&record.title),
            Value::from(record.published_at.format("%Y-%m-%d").to_string()),
            Value::from(record.view_count),
            Value::from(record.like_count),
            text_cell(record.transcript.display_text()),
        ]);
    }

    rows
}

/// User-entered text that must not be parsed as a formula or number
fn text_cell(text: &str) -> Value {
    let text = utils::truncate_chars(text, CELL_CHAR_LIMIT - 1);
    if text.starts_with(['=', '+', '-', '@']) {
        Value::from(format!("'{text}"))
    } else {
        Value::from(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{CredentialError, CredentialSource};
    use crate::google::session::StaticSessions;
    use crate::google::testing::{google_error, ScriptedTransport};
    use crate::google::{ApiResponse, RequestBody, RetryPolicy};
    use crate::youtube::Transcript;
    use chrono::TimeZone;
    use reqwest::Method;
    use std::time::Duration;

    fn key() -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "exporter@demo.iam.gserviceaccount.com".into(),
            private_key: String::new(),
            private_key_id: None,
            token_uri: "https://oauth2.example/token".into(),
        }
    }

    fn sink(transport: &Arc<ScriptedTransport>, create_missing: bool) -> SheetsSink {
        let api = ApiClient::new(transport.clone(), RetryPolicy::new(0, Duration::ZERO));
        SheetsSink::new(api, "https://sheets.test/v4", "sheet-1", "My Videos", key(), Arc::new(StaticSessions::ok()), create_missing)
    }

    fn record(id: &str) -> VideoRecord {
        VideoRecord {
            video_id: id.into(),
            title: format!("Title {id}"),
            published_at: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            view_count: 1500,
            like_count: 42,
            thumbnail_url: Some(format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg")),
            transcript: Transcript::Available("hello".into()),
        }
    }

    fn with_worksheet(transport: &ScriptedTransport, title: &str) {
        transport.respond_json("/spreadsheets/sheet-1", json!({ "sheets": [{ "properties": { "title": title } }] }));
        transport.respond_json(":batchUpdate", json!({ "replies": [{}] }));
        transport.respond_json(":clear", json!({ "clearedRange": "'My Videos'!A1:Z1000" }));
        transport.respond_json("%21A1", json!({ "updatedRows": 1 }));
    }

    fn written_values(transport: &ScriptedTransport) -> Vec<Value> {
        transport
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::PUT)
            .map(|r| match r.body {
                Some(RequestBody::Json(body)) => body["values"].clone(),
                other => panic!("unexpected body: {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_sheet_range_quotes_names() {
        assert_eq!(sheet_range("Sheet1", Some("A1")), "'Sheet1'!A1");
        assert_eq!(sheet_range("Bob's videos", None), "'Bob''s videos'");
    }

    #[test]
    fn test_sheet_values_layout() {
        let rows = sheet_values(&[record("a1")]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "Video Link");
        assert_eq!(rows[1][0], "https://www.youtube.com/watch?v=a1");
        assert_eq!(rows[1][1], "=IMAGE(\"https://i.ytimg.com/vi/a1/hqdefault.jpg\")");
        assert_eq!(rows[1][3], "2024-03-01");
        assert_eq!(rows[1][4], 1500);
        assert_eq!(rows[1][6], "hello");
    }

    #[test]
    fn test_text_cells_are_not_formulas_and_are_truncated() {
        assert_eq!(text_cell("=HYPERLINK(\"x\")"), Value::from("'=HYPERLINK(\"x\")"));
        let long = "a".repeat(CELL_CHAR_LIMIT + 10);
        assert_eq!(text_cell(&long).as_str().unwrap().chars().count(), CELL_CHAR_LIMIT - 1);
    }

    #[test]
    fn test_empty_record_set_is_header_only() {
        let rows = sheet_values(&[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), HEADERS.len());
    }

    #[tokio::test]
    async fn test_clears_then_writes_existing_worksheet() {
        let transport = ScriptedTransport::new();
        with_worksheet(&transport, "My Videos");

        sink(&transport, true).write(&[record("a1")]).await.unwrap();

        let requests = transport.requests();
        let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec![
            "https://sheets.test/v4/spreadsheets/sheet-1",
            "https://sheets.test/v4/spreadsheets/sheet-1/values/%27My%20Videos%27:clear",
            "https://sheets.test/v4/spreadsheets/sheet-1/values/%27My%20Videos%27%21A1",
        ]);
        assert_eq!(requests[2].query_value("valueInputOption"), Some("USER_ENTERED"));
        assert_eq!(requests[2].bearer.as_deref(), Some("sheets-token"));
    }

    #[tokio::test]
    async fn test_creates_missing_worksheet() {
        let transport = ScriptedTransport::new();
        with_worksheet(&transport, "Other");

        sink(&transport, true).write(&[]).await.unwrap();

        assert_eq!(transport.calls("/spreadsheets/sheet-1:batchUpdate"), 1);
        assert_eq!(written_values(&transport), vec![json!([HEADERS])]);
    }

    #[tokio::test]
    async fn test_missing_worksheet_without_create() {
        let transport = ScriptedTransport::new();
        with_worksheet(&transport, "Other");

        let err = sink(&transport, false).write(&[]).await.unwrap_err();
        match err {
            ExportError::Sink(err) => {
                assert_eq!(err.kind, SinkErrorKind::WorksheetNotFound);
                assert!(err.detail.contains("Other"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(written_values(&transport).is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_names_service_account() {
        let transport = ScriptedTransport::new();
        transport.respond("/spreadsheets/sheet-1", ApiResponse::new(403, google_error(403, "PERMISSION_DENIED")));

        match sink(&transport, true).write(&[]).await.unwrap_err() {
            ExportError::Sink(err) => {
                assert_eq!(err.kind, SinkErrorKind::PermissionDenied);
                assert!(err.detail.contains("exporter@demo.iam.gserviceaccount.com"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_service_account_is_credential_error() {
        let transport = ScriptedTransport::new();
        let api = ApiClient::new(transport.clone(), RetryPolicy::new(0, Duration::ZERO));
        let sessions = StaticSessions {
            spreadsheet: Err(CredentialError::unauthorized(CredentialSource::ServiceAccount, "invalid_grant")),
            ..StaticSessions::ok()
        };
        let mut sink = SheetsSink::new(api, "https://sheets.test/v4", "sheet-1", "Videos", key(), Arc::new(sessions), true);

        let err = sink.write(&[]).await.unwrap_err();
        assert!(matches!(err, ExportError::Credential(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_rewriting_same_records_is_idempotent() {
        let transport = ScriptedTransport::new();
        with_worksheet(&transport, "My Videos");
        let mut sink = sink(&transport, true);
        let records = [record("a1"), record("b2")];

        sink.write(&records).await.unwrap();
        sink.write(&records).await.unwrap();

        let writes = written_values(&transport);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], writes[1]);
        assert_eq!(transport.calls(":clear"), 2);
    }
}
