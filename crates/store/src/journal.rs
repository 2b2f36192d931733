//! Append-only journal of print batch steps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::BatchId;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub batch_id: BatchId,
    /// 1-based position within the batch's journal.
    pub sequence: u32,
    pub kind: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Durable log of what happened to each print batch.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Appends an entry and returns its sequence number.
    async fn append(
        &self,
        batch_id: BatchId,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<u32>;

    /// Returns every entry for a batch in append order.
    async fn entries(&self, batch_id: BatchId) -> Result<Vec<JournalEntry>>;
}
