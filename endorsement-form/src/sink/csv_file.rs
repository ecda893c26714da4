use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{
    error::SinkError,
    record::{COLUMNS, Record},
};

use super::RecordSink;

/// Appends records to a local CSV file.
///
/// The header row is written only when the file is missing or empty. Every
/// record gets the write-time timestamp, and a whole submission goes out in a
/// single append write.
pub struct CsvFileSink {
    path: PathBuf,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, local_now)
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: fn() -> NaiveDateTime) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn needs_header(&self) -> Result<bool, SinkError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(SinkError::WriteFailed(format!(
                "cannot inspect {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn encode(
        records: &[Record],
        with_header: bool,
        at: NaiveDateTime,
    ) -> Result<Vec<u8>, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        if with_header {
            writer
                .write_record(COLUMNS)
                .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        }
        for record in records {
            writer
                .write_record(record.stamped(at).row())
                .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|e| SinkError::WriteFailed(e.to_string()))
    }
}

#[async_trait]
impl RecordSink for CsvFileSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn append(&self, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let with_header = self.needs_header().await?;
        let buffer = Self::encode(records, with_header, (self.clock)())?;

        let write_failed =
            |e: std::io::Error| SinkError::WriteFailed(format!("{}: {e}", self.path.display()));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(write_failed)?;
        file.write_all(&buffer).await.map_err(write_failed)?;
        file.flush().await.map_err(write_failed)?;

        if with_header {
            debug!(path = %self.path.display(), "Wrote CSV header");
        }
        info!(
            path = %self.path.display(),
            records = records.len(),
            "Appended records to CSV file"
        );
        Ok(())
    }
}
