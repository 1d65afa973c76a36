use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

use super::ExportSink;
use crate::cli::FileFormat;
use crate::errors::{ExportError, SinkError, SinkErrorKind};
use crate::youtube::VideoRecord;

pub const CSV_HEADERS: &[&str] = &[
    "video_id",
    "video_url",
    "title",
    "thumbnail_url",
    "published_at",
    "view_count",
    "like_count",
    "transcript",
];

#[derive(Serialize)]
struct JsonRecord<'a> {
    #[serde(flatten)]
    record: &'a VideoRecord,
    video_url: String,
}

/// Render records in the requested file format
pub fn render(records: &[VideoRecord], format: FileFormat) -> Result<String, SinkError> {
    match format {
        FileFormat::Csv => Ok(format_as_csv(records)),
        FileFormat::Json => format_as_json(records),
    }
}

fn format_as_csv(records: &[VideoRecord]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_HEADERS.join(","));
    out.push('\n');

    for record in records {
        let fields = [
            record.video_id.clone(),
            record.url(),
            record.title.clone(),
            record.thumbnail_url.clone().unwrap_or_default(),
            record.published_at.to_rfc3339(),
            record.view_count.to_string(),
            record.like_count.to_string(),
            record.transcript.display_text().to_string(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }

    out
}

fn format_as_json(records: &[VideoRecord]) -> Result<String, SinkError> {
    let rows: Vec<JsonRecord<'_>> = records
        .iter()
        .map(|record| JsonRecord {
            record,
            video_url: record.url(),
        })
        .collect();

    serde_json::to_string_pretty(&rows)
        .map_err(|e| SinkError::new("file", SinkErrorKind::WriteFailed, e.to_string()))
}

/// Quote a CSV field when it contains a delimiter, quote, or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Writes the record set to a local CSV or JSON file
pub struct FileSink {
    path: PathBuf,
    format: FileFormat,
}

impl FileSink {
    pub fn new(path: PathBuf, format: FileFormat) -> Self {
        Self { path, format }
    }
}

#[async_trait]
impl ExportSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn write(&mut self, records: &[VideoRecord]) -> Result<(), ExportError> {
        let content = render(records, self.format)?;

        fs_err::write(&self.path, content).map_err(|e| SinkError::from_io("file", &e))?;

        tracing::info!("Wrote {} records to {} ({})", records.len(), self.path.display(), self.format);
        Ok(())
    }
}

/// Prints the record set when no other destination is configured
pub struct StdoutSink {
    format: FileFormat,
}

impl StdoutSink {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl ExportSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn write(&mut self, records: &[VideoRecord]) -> Result<(), ExportError> {
        let content = render(records, self.format)?;
        print!("{}", content);
        if !content.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}
