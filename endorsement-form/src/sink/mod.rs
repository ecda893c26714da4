use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::{error::SinkError, record::Record};

pub mod csv_file;
#[cfg(feature = "sheets")]
pub mod sheets;

pub use csv_file::CsvFileSink;
#[cfg(feature = "sheets")]
pub use sheets::{GoogleSheetsSink, SheetsEndpoints};

/// Append-only destination for submitted records.
///
/// `append` is not idempotent. When it fails partway through a multi-record
/// submission some rows may already be durable, and calling it again can
/// duplicate them.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Short name used in logs and submission receipts.
    fn name(&self) -> &str;

    /// Acquire whatever the sink needs before its first append.
    async fn prepare(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn append(&self, records: &[Record]) -> Result<(), SinkError>;
}

/// In-process sink that keeps every appended record and counts append calls.
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
    calls: AtomicUsize,
    failure: Option<SinkError>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            failure: None,
        }
    }

    /// A sink whose every append fails with `error` and stores nothing.
    pub fn failing(error: SinkError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn records(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, records: &[Record]) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.records.lock().await.extend_from_slice(records);
        Ok(())
    }
}
