//! File-based record source for unstructured text logs.
//!
//! Reads a plain log file, structures every line with [`LogLineParser`] and
//! serves the result as spans and log entries. Lines carrying a response
//! time become spans (see [`StructuredRecord::to_span`]); every parsed line
//! becomes a log entry.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use tracepulse_types::{LogRecord, RecordKind, Records, StructuredRecord};

use crate::{LogLineParser, RecordSource, SourceError};

/// A record source backed by a text log file.
///
/// The file is re-read only when its modification time changes; otherwise
/// the previously structured records are reused.
#[derive(Debug)]
pub struct LogFileSource {
    path: PathBuf,
    description: String,
    parser: LogLineParser,
    cache: RwLock<Cache>,
}

#[derive(Debug, Default)]
struct Cache {
    last_modified: Option<SystemTime>,
    records: Vec<StructuredRecord>,
}

impl LogFileSource {
    /// Create a new file source for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path,
            description,
            parser: LogLineParser::new(),
            cache: RwLock::new(Cache::default()),
        }
    }

    /// Returns the path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file if it changed since the last fetch.
    async fn refresh(&self) -> Result<(), SourceError> {
        let modified = tokio::fs::metadata(&self.path).await?.modified().ok();

        let stale = {
            let cache = self.cache.read();
            match (cache.last_modified, modified) {
                (None, _) => true,
                (Some(_), None) => true,
                (Some(last), Some(current)) => current > last,
            }
        };
        if !stale {
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut records = self.parser.parse_lines(content.lines());
        records.sort_by_key(|r| r.timestamp);
        debug!(path = %self.path.display(), records = records.len(), "structured log file");

        let mut cache = self.cache.write();
        cache.last_modified = modified;
        cache.records = records;
        Ok(())
    }
}

/// Severity implied by the HTTP status in a structured line.
fn severity(record: &StructuredRecord) -> &'static str {
    match record.status_code {
        Some(code) if code >= 500 => "ERROR",
        Some(code) if code >= 400 => "WARN",
        _ => "INFO",
    }
}

fn to_log_record(record: &StructuredRecord) -> LogRecord {
    LogRecord {
        timestamp: record.timestamp,
        trace_id: String::new(),
        span_id: String::new(),
        service_name: record.service.clone().unwrap_or_default(),
        body: record.message.clone().unwrap_or_default(),
        severity: severity(record).to_string(),
    }
}

#[async_trait]
impl RecordSource for LogFileSource {
    async fn fetch(&self, kind: RecordKind, since: DateTime<Utc>) -> Result<Records, SourceError> {
        if kind.metric_kind().is_some() {
            return Ok(kind.empty());
        }

        self.refresh().await?;

        let cache = self.cache.read();
        let recent = cache.records.iter().filter(|r| r.timestamp >= since);
        let records = match kind {
            RecordKind::Traces => Records::Traces(recent.filter_map(StructuredRecord::to_span).collect()),
            _ => Records::Logs(recent.map(to_log_record).collect()),
        };
        Ok(records)
    }

    fn description(&self) -> &str {
        &self.description
    }
}
