//! Telemetry seam for the print saga.
//!
//! The saga never logs through a global handle: a [`SagaTelemetry`] is
//! injected at construction so tests can observe what was reported.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::BatchId;

use crate::state::PrintState;

pub trait SagaTelemetry: Send + Sync {
    fn batch_started(&self, batch_id: BatchId, label_kind: &str, pallet_count: usize);

    /// A batch was refused before anything was reserved.
    fn batch_rejected(&self, reason: &str);

    fn stage_entered(&self, batch_id: BatchId, stage: PrintState);

    /// An allocation attempt failed and will be retried after `backoff`.
    fn reserve_retry(&self, attempt: u32, cause: &str, backoff: Duration);

    /// Post-allocation verification found existing records.
    fn collision_detected(&self, pallet_numbers: &[String]);

    fn item_failed(&self, batch_id: BatchId, stage: PrintState, pallet_number: &str, error: &str);

    /// A best-effort release failed. Never fatal.
    fn release_failed(&self, error: &str);

    fn warning(&self, batch_id: BatchId, message: &str);

    fn batch_finished(
        &self,
        batch_id: BatchId,
        state: PrintState,
        duration: Duration,
        reason: Option<&str>,
    );
}

/// Forwards to `tracing` and `metrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl SagaTelemetry for TracingTelemetry {
    fn batch_started(&self, batch_id: BatchId, label_kind: &str, pallet_count: usize) {
        metrics::counter!("print_batches_total", "kind" => label_kind.to_string()).increment(1);
        tracing::info!(%batch_id, label_kind, pallet_count, "print batch started");
    }

    fn batch_rejected(&self, reason: &str) {
        metrics::counter!("print_batches_rejected_total", "reason" => reason.to_string())
            .increment(1);
        tracing::info!(reason, "print batch rejected");
    }

    fn stage_entered(&self, batch_id: BatchId, stage: PrintState) {
        tracing::debug!(%batch_id, %stage, "stage entered");
    }

    fn reserve_retry(&self, attempt: u32, cause: &str, backoff: Duration) {
        metrics::counter!("identifier_reserve_attempts_total").increment(1);
        tracing::warn!(
            attempt,
            cause,
            backoff_ms = backoff.as_millis() as u64,
            "identifier reservation failed, retrying"
        );
    }

    fn collision_detected(&self, pallet_numbers: &[String]) {
        metrics::counter!("identifier_collisions_total").increment(pallet_numbers.len() as u64);
        tracing::warn!(?pallet_numbers, "reserved identifiers already have records");
    }

    fn item_failed(&self, batch_id: BatchId, stage: PrintState, pallet_number: &str, error: &str) {
        metrics::counter!("label_items_failed_total", "stage" => stage.as_str()).increment(1);
        tracing::warn!(%batch_id, %stage, pallet_number, error, "label item failed");
    }

    fn release_failed(&self, error: &str) {
        metrics::counter!("identifier_release_failures_total").increment(1);
        tracing::error!(error, "failed to release identifiers");
    }

    fn warning(&self, batch_id: BatchId, message: &str) {
        tracing::warn!(%batch_id, message, "print batch warning");
    }

    fn batch_finished(
        &self,
        batch_id: BatchId,
        state: PrintState,
        duration: Duration,
        reason: Option<&str>,
    ) {
        let seconds = duration.as_secs_f64();
        metrics::histogram!("print_batch_duration_seconds").record(seconds);
        match state {
            PrintState::Completed => {
                metrics::counter!("print_batches_completed").increment(1);
                tracing::info!(%batch_id, duration = seconds, "print batch completed");
            }
            _ => {
                let reason = reason.unwrap_or("unknown").to_string();
                tracing::error!(%batch_id, %state, duration = seconds, %reason, "print batch failed");
                metrics::counter!("print_batches_failed", "reason" => reason).increment(1);
            }
        }
    }
}

/// One call captured by [`RecordingTelemetry`].
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    BatchStarted { batch_id: BatchId, pallet_count: usize },
    BatchRejected { reason: String },
    StageEntered { batch_id: BatchId, stage: PrintState },
    ReserveRetry { attempt: u32, cause: String },
    CollisionDetected { pallet_numbers: Vec<String> },
    ItemFailed { stage: PrintState, pallet_number: String, error: String },
    ReleaseFailed { error: String },
    Warning { batch_id: BatchId, message: String },
    BatchFinished { batch_id: BatchId, state: PrintState, reason: Option<String> },
}

/// Collects telemetry calls in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: TelemetryRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stages entered by one batch, in order.
    pub fn stages(&self, batch_id: BatchId) -> Vec<PrintState> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                TelemetryRecord::StageEntered { batch_id: id, stage } if id == batch_id => {
                    Some(stage)
                }
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                TelemetryRecord::Warning { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn retry_count(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| matches!(r, TelemetryRecord::ReserveRetry { .. }))
            .count()
    }
}

impl SagaTelemetry for RecordingTelemetry {
    fn batch_started(&self, batch_id: BatchId, _label_kind: &str, pallet_count: usize) {
        self.push(TelemetryRecord::BatchStarted {
            batch_id,
            pallet_count,
        });
    }

    fn batch_rejected(&self, reason: &str) {
        self.push(TelemetryRecord::BatchRejected {
            reason: reason.to_string(),
        });
    }

    fn stage_entered(&self, batch_id: BatchId, stage: PrintState) {
        self.push(TelemetryRecord::StageEntered { batch_id, stage });
    }

    fn reserve_retry(&self, attempt: u32, cause: &str, _backoff: Duration) {
        self.push(TelemetryRecord::ReserveRetry {
            attempt,
            cause: cause.to_string(),
        });
    }

    fn collision_detected(&self, pallet_numbers: &[String]) {
        self.push(TelemetryRecord::CollisionDetected {
            pallet_numbers: pallet_numbers.to_vec(),
        });
    }

    fn item_failed(&self, _batch_id: BatchId, stage: PrintState, pallet_number: &str, error: &str) {
        self.push(TelemetryRecord::ItemFailed {
            stage,
            pallet_number: pallet_number.to_string(),
            error: error.to_string(),
        });
    }

    fn release_failed(&self, error: &str) {
        self.push(TelemetryRecord::ReleaseFailed {
            error: error.to_string(),
        });
    }

    fn warning(&self, batch_id: BatchId, message: &str) {
        self.push(TelemetryRecord::Warning {
            batch_id,
            message: message.to_string(),
        });
    }

    fn batch_finished(
        &self,
        batch_id: BatchId,
        state: PrintState,
        _duration: Duration,
        reason: Option<&str>,
    ) {
        self.push(TelemetryRecord::BatchFinished {
            batch_id,
            state,
            reason: reason.map(str::to_string),
        });
    }
}
