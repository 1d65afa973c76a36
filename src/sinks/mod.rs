use async_trait::async_trait;

pub mod file;
pub mod sheets;

pub use file::{render, FileSink, StdoutSink};
pub use sheets::SheetsSink;

use crate::errors::ExportError;
use crate::youtube::VideoRecord;

/// Destination for the finished record set.
///
/// A sink receives every record of a run in one call, so a write for an
/// empty run still produces header-only output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Short name for logs and summaries
    fn name(&self) -> &'static str;

    /// Write the records, replacing any previous output
    async fn write(&mut self, records: &[VideoRecord]) -> Result<(), ExportError>;
}
