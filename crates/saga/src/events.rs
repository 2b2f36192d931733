//! Print batch events: the journaled history of a batch and the live
//! progress stream.

use chrono::{DateTime, Utc};
use common::{BatchId, Identifier};
use serde::{Deserialize, Serialize};

use crate::state::PrintState;

/// Events appended to the transaction journal for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BatchEvent {
    /// The batch passed validation and cooldown.
    Submitted(SubmittedData),

    /// The state machine moved to a new state.
    StateChanged(StateChangedData),

    /// Identifiers were reserved for the batch.
    Reserved(IdentifiersData),

    /// One item finished a stage successfully.
    ItemSucceeded(ItemData),

    /// One item failed a stage.
    ItemFailed(ItemFailedData),

    /// Identifiers were confirmed.
    Confirmed(IdentifiersData),

    /// Identifiers were released back to the pool.
    Released(IdentifiersData),

    /// A non-fatal problem (aggregates, pdf url write-back, printing).
    Warning(WarningData),

    /// The batch reached a terminal state.
    Finished(FinishedData),
}

impl BatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BatchEvent::Submitted(_) => "Submitted",
            BatchEvent::StateChanged(_) => "StateChanged",
            BatchEvent::Reserved(_) => "Reserved",
            BatchEvent::ItemSucceeded(_) => "ItemSucceeded",
            BatchEvent::ItemFailed(_) => "ItemFailed",
            BatchEvent::Confirmed(_) => "Confirmed",
            BatchEvent::Released(_) => "Released",
            BatchEvent::Warning(_) => "Warning",
            BatchEvent::Finished(_) => "Finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedData {
    pub batch_id: BatchId,
    pub label_kind: String,
    pub product_code: String,
    pub clock_number: String,
    pub pallet_count: usize,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedData {
    pub from: PrintState,
    pub to: PrintState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiersData {
    pub identifiers: Vec<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    pub stage: PrintState,
    pub index: usize,
    pub pallet_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailedData {
    pub stage: PrintState,
    pub index: usize,
    pub pallet_number: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningData {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedData {
    pub state: PrintState,
    pub reason: Option<String>,
    pub finished_at: DateTime<Utc>,
}

// Convenience constructors
impl BatchEvent {
    pub fn submitted(
        batch_id: BatchId,
        label_kind: impl Into<String>,
        product_code: impl Into<String>,
        clock_number: impl Into<String>,
        pallet_count: usize,
    ) -> Self {
        BatchEvent::Submitted(SubmittedData {
            batch_id,
            label_kind: label_kind.into(),
            product_code: product_code.into(),
            clock_number: clock_number.into(),
            pallet_count,
            submitted_at: Utc::now(),
        })
    }

    pub fn state_changed(from: PrintState, to: PrintState) -> Self {
        BatchEvent::StateChanged(StateChangedData { from, to })
    }

    pub fn reserved(identifiers: &[Identifier]) -> Self {
        BatchEvent::Reserved(IdentifiersData {
            identifiers: identifiers.to_vec(),
        })
    }

    pub fn item_succeeded(stage: PrintState, index: usize, identifier: &Identifier) -> Self {
        BatchEvent::ItemSucceeded(ItemData {
            stage,
            index,
            pallet_number: identifier.pallet_number.to_string(),
        })
    }

    pub fn item_failed(
        stage: PrintState,
        index: usize,
        identifier: &Identifier,
        error: impl Into<String>,
    ) -> Self {
        BatchEvent::ItemFailed(ItemFailedData {
            stage,
            index,
            pallet_number: identifier.pallet_number.to_string(),
            error: error.into(),
        })
    }

    pub fn confirmed(identifiers: &[Identifier]) -> Self {
        BatchEvent::Confirmed(IdentifiersData {
            identifiers: identifiers.to_vec(),
        })
    }

    pub fn released(identifiers: &[Identifier]) -> Self {
        BatchEvent::Released(IdentifiersData {
            identifiers: identifiers.to_vec(),
        })
    }

    pub fn warning(message: impl Into<String>) -> Self {
        BatchEvent::Warning(WarningData {
            message: message.into(),
        })
    }

    pub fn finished(state: PrintState, reason: Option<String>) -> Self {
        BatchEvent::Finished(FinishedData {
            state,
            reason,
            finished_at: Utc::now(),
        })
    }
}

/// Status carried by a [`ProgressEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressStatus {
    /// The batch entered `stage`.
    Entered,
    Succeeded,
    Failed { reason: String },
    Warning { message: String },
}

/// One entry of the live progress stream.
///
/// Stage-level events have no `item_index`; per-item events carry the
/// 0-based index of the item in ascending sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub batch_id: BatchId,
    pub stage: PrintState,
    pub item_index: Option<usize>,
    #[serde(flatten)]
    pub status: ProgressStatus,
}

impl ProgressEvent {
    pub fn stage(batch_id: BatchId, stage: PrintState, status: ProgressStatus) -> Self {
        Self {
            batch_id,
            stage,
            item_index: None,
            status,
        }
    }

    pub fn item(batch_id: BatchId, stage: PrintState, index: usize, status: ProgressStatus) -> Self {
        Self {
            batch_id,
            stage,
            item_index: Some(index),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{PalletNumber, Series};

    #[test]
    fn test_event_serialization_roundtrip() {
        let id = Identifier::new(
            PalletNumber::new("20240521", 1),
            Series::new("210524-ABCDEF").unwrap(),
        );
        let event = BatchEvent::item_failed(PrintState::WritingRecords, 0, &id, "timeout");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ItemFailed");
        assert_eq!(json["data"]["pallet_number"], "20240521/001");

        let back: BatchEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_progress_event_json_shape() {
        let event = ProgressEvent::item(
            BatchId::new(),
            PrintState::GeneratingArtifacts,
            2,
            ProgressStatus::Failed {
                reason: "upload".into(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stage"], "generating_artifacts");
        assert_eq!(json["item_index"], 2);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "upload");
    }
}
