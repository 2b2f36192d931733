//! Label printer trait with recording and spool-directory implementations.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{BatchId, PalletNumber};
use thiserror::Error;

/// Printing failed. Labels stay stored and confirmed and can be reprinted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Print dispatch failed: {0}")]
pub struct PrintDispatchFailure(pub String);

/// One label inside a [`PrintJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintDocument {
    pub pallet_number: PalletNumber,
    pub url: String,
    pub bytes: Vec<u8>,
}

/// All labels of a batch, in ascending sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub batch_id: BatchId,
    pub documents: Vec<PrintDocument>,
}

impl PrintJob {
    pub fn pallet_numbers(&self) -> Vec<&str> {
        self.documents
            .iter()
            .map(|d| d.pallet_number.as_str())
            .collect()
    }
}

#[async_trait]
pub trait LabelPrinter: Send + Sync {
    async fn print(&self, job: PrintJob) -> Result<(), PrintDispatchFailure>;
}

#[derive(Debug, Default)]
struct RecordingPrinterState {
    jobs: Vec<PrintJob>,
    fail_on_print: bool,
}

/// Keeps every job in memory, for testing.
#[derive(Debug, Clone, Default)]
pub struct RecordingPrinter {
    state: Arc<RwLock<RecordingPrinterState>>,
}

impl RecordingPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_print(&self, fail: bool) {
        self.state.write().unwrap().fail_on_print = fail;
    }

    pub fn jobs(&self) -> Vec<PrintJob> {
        self.state.read().unwrap().jobs.clone()
    }
}

#[async_trait]
impl LabelPrinter for RecordingPrinter {
    async fn print(&self, job: PrintJob) -> Result<(), PrintDispatchFailure> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_print {
            return Err(PrintDispatchFailure("printer offline".to_string()));
        }
        state.jobs.push(job);
        Ok(())
    }
}

/// Writes each job to a spool directory as `{batch_id}-{index:03}.pdf`,
/// where a print daemon picks the files up in name order.
#[derive(Debug, Clone)]
pub struct SpoolPrinter {
    dir: PathBuf,
}

impl SpoolPrinter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl LabelPrinter for SpoolPrinter {
    async fn print(&self, job: PrintJob) -> Result<(), PrintDispatchFailure> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PrintDispatchFailure(format!("spool dir: {e}")))?;

        for (index, document) in job.documents.iter().enumerate() {
            let path = self.dir.join(format!("{}-{:03}.pdf", job.batch_id, index + 1));
            tokio::fs::write(&path, &document.bytes)
                .await
                .map_err(|e| {
                    PrintDispatchFailure(format!("{}: {e}", document.pallet_number))
                })?;
        }

        tracing::info!(batch_id = %job.batch_id, labels = job.documents.len(), "print job spooled");
        Ok(())
    }
}
