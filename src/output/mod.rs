use console::style;
use std::time::Duration;

use crate::errors::{CredentialErrorKind, ExportError, SinkErrorKind};
use crate::pipeline::{RunFailure, RunResult};
use crate::utils::{format_count, format_duration};

/// Human-readable summary of a finished run
pub fn summary_lines(result: &RunResult, elapsed: Duration) -> Vec<String> {
    let views: u64 = result.records.iter().map(|r| r.view_count).sum();

    let mut lines = vec![
        format!(
            "Exported {} videos in {}",
            result.records.len(),
            format_duration(elapsed.as_secs_f64())
        ),
        format!(
            "  Transcripts: {} of {}",
            result.transcripts_available(),
            result.records.len()
        ),
        format!("  Total views: {}", format_count(views)),
    ];

    if !result.errors.is_empty() {
        lines.push(format!("  Problems ({}):", result.errors.len()));
        for error in &result.errors {
            lines.push(format!("    {}: {} ({})", error.video_id, error.kind, error.detail));
        }
    }

    lines
}

/// Print the summary to stderr so stdout stays clean for exported data
pub fn print_summary(result: &RunResult, elapsed: Duration) {
    let lines = summary_lines(result, elapsed);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            eprintln!("{}", style(line).green().bold());
        } else if line.starts_with("    ") {
            eprintln!("{}", style(line).yellow());
        } else {
            eprintln!("{}", line);
        }
    }
}

/// Extra guidance for failures the user can usually fix themselves
pub fn failure_hint(error: &ExportError) -> Option<&'static str> {
    match error {
        ExportError::Quota(_) => Some("The YouTube Data API quota resets daily (midnight Pacific time)."),
        ExportError::Credential(e) if e.kind == CredentialErrorKind::Missing => {
            Some("Pass the missing credential on the command line or in the config file.")
        }
        ExportError::Auth(_) => Some("Delete the cached token if needed and run again to grant consent."),
        ExportError::Sink(e) if e.kind == SinkErrorKind::WorksheetNotFound => {
            Some("Create the worksheet first, or drop --no-create-worksheet.")
        }
        ExportError::ChannelNotFound(_) => Some("Use a channel id (UC...), an @handle, or a channel URL."),
        _ => None,
    }
}

pub fn print_failure(failure: &RunFailure) {
    eprintln!(
        "{} {}: {} ({})",
        style("Export failed:").red().bold(),
        failure.error.kind_name(),
        failure.error,
        style(format!("while {}", failure.stage)).dim()
    );

    if !failure.sinks_written.is_empty() {
        eprintln!("  Already written: {}", failure.sinks_written.join(", "));
    }
    if let Some(hint) = failure_hint(&failure.error) {
        eprintln!("  {}", style(hint).cyan());
    }
}
