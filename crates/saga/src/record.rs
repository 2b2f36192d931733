//! Batch record rebuilt from the transaction journal.

use std::collections::BTreeSet;

use common::{BatchId, Identifier};
use serde::{Deserialize, Serialize};

use crate::events::{BatchEvent, ItemFailedData};
use crate::state::PrintState;

/// What the journal says happened to a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    batch_id: Option<BatchId>,
    label_kind: String,
    product_code: String,
    clock_number: String,
    pallet_count: usize,
    state: PrintState,
    /// Every state entered, in order.
    history: Vec<PrintState>,
    reserved: Vec<Identifier>,
    confirmed: BTreeSet<Identifier>,
    released: BTreeSet<Identifier>,
    failures: Vec<ItemFailedData>,
    warnings: Vec<String>,
    failure_reason: Option<String>,
}

impl BatchRecord {
    pub fn apply(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::Submitted(data) => {
                self.batch_id = Some(data.batch_id);
                self.label_kind = data.label_kind;
                self.product_code = data.product_code;
                self.clock_number = data.clock_number;
                self.pallet_count = data.pallet_count;
            }
            BatchEvent::StateChanged(data) => {
                self.state = data.to;
                self.history.push(data.to);
            }
            BatchEvent::Reserved(data) => {
                self.reserved = data.identifiers;
            }
            BatchEvent::ItemSucceeded(_) => {}
            BatchEvent::ItemFailed(data) => {
                self.failures.push(data);
            }
            BatchEvent::Confirmed(data) => {
                self.confirmed.extend(data.identifiers);
            }
            BatchEvent::Released(data) => {
                self.released.extend(data.identifiers);
            }
            BatchEvent::Warning(data) => {
                self.warnings.push(data.message);
            }
            BatchEvent::Finished(data) => {
                self.state = data.state;
                self.failure_reason = data.reason;
            }
        }
    }
}

// Query methods
impl BatchRecord {
    pub fn batch_id(&self) -> Option<BatchId> {
        self.batch_id
    }

    pub fn label_kind(&self) -> &str {
        &self.label_kind
    }

    pub fn product_code(&self) -> &str {
        &self.product_code
    }

    pub fn clock_number(&self) -> &str {
        &self.clock_number
    }

    pub fn pallet_count(&self) -> usize {
        self.pallet_count
    }

    pub fn state(&self) -> PrintState {
        self.state
    }

    pub fn history(&self) -> &[PrintState] {
        &self.history
    }

    pub fn reserved(&self) -> &[Identifier] {
        &self.reserved
    }

    /// Confirmed identifiers in ascending sequence order.
    pub fn confirmed(&self) -> Vec<&Identifier> {
        self.confirmed.iter().collect()
    }

    /// Released identifiers in ascending sequence order.
    pub fn released(&self) -> Vec<&Identifier> {
        self.released.iter().collect()
    }

    pub fn failures(&self) -> &[ItemFailedData] {
        &self.failures
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{PalletNumber, Series};

    fn id(seq: u32) -> Identifier {
        Identifier::new(
            PalletNumber::new("20240521", seq),
            Series::new(format!("210524-S{seq}")).unwrap(),
        )
    }

    #[test]
    fn test_apply_completed_batch() {
        let batch_id = BatchId::new();
        let ids = vec![id(1), id(2)];
        let events = vec![
            BatchEvent::submitted(batch_id, "qc", "ME6060150", "5997", 2),
            BatchEvent::state_changed(PrintState::Idle, PrintState::Reserving),
            BatchEvent::reserved(&ids),
            BatchEvent::state_changed(PrintState::Reserving, PrintState::WritingRecords),
            BatchEvent::item_failed(PrintState::WritingRecords, 1, &ids[1], "timeout"),
            BatchEvent::confirmed(&ids[..1]),
            BatchEvent::released(&ids[1..]),
            BatchEvent::finished(PrintState::Completed, None),
        ];

        let mut record = BatchRecord::default();
        for event in events {
            record.apply(event);
        }

        assert_eq!(record.batch_id(), Some(batch_id));
        assert_eq!(record.state(), PrintState::Completed);
        assert_eq!(
            record.history(),
            &[PrintState::Reserving, PrintState::WritingRecords]
        );
        assert_eq!(record.confirmed(), vec![&ids[0]]);
        assert_eq!(record.released(), vec![&ids[1]]);
        assert_eq!(record.failures()[0].pallet_number, "20240521/002");
    }

    #[test]
    fn test_apply_failed_batch_keeps_reason() {
        let mut record = BatchRecord::default();
        record.apply(BatchEvent::finished(
            PrintState::Failed,
            Some("Duplicate identifier: 20240521/001".into()),
        ));
        assert_eq!(record.state(), PrintState::Failed);
        assert_eq!(
            record.failure_reason(),
            Some("Duplicate identifier: 20240521/001")
        );
    }
}
