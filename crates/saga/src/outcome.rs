//! Terminal result of a print batch.

use common::{BatchId, Identifier};
use domain::OrderProgress;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactRef;
use crate::state::PrintState;

/// One item that did not make it to confirmation. Its identifier was released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub index: usize,
    pub identifier: Identifier,
    pub stage: PrintState,
    pub error: String,
}

/// Result of a batch that reached `Completed`.
///
/// Batches that end in `Failed` are reported as a [`crate::SagaError`]
/// instead; their details live in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintOutcome {
    pub batch_id: BatchId,
    pub success: bool,
    /// Confirmed identifiers in ascending sequence order.
    pub succeeded: Vec<Identifier>,
    pub failed: Vec<ItemFailure>,
    /// Uploaded labels, in the same order as `succeeded`.
    pub artifacts: Vec<ArtifactRef>,
    pub warnings: Vec<String>,
    pub order_progress: Option<OrderProgress>,
    pub stock_level: Option<i64>,
    /// True if the merged print job was accepted by the printer.
    pub printed: bool,
}

impl PrintOutcome {
    /// Some labels succeeded and some failed.
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failed.is_empty()
    }

    /// Every error and warning, as shown to the operator.
    pub fn errors(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|f| format!("{}: {}", f.identifier.pallet_number, f.error))
            .chain(self.warnings.iter().cloned())
            .collect()
    }

    /// One-line summary for the operator.
    pub fn summary(&self) -> String {
        let total = self.succeeded.len() + self.failed.len();
        if self.is_partial() {
            format!(
                "Some labels succeeded, some failed: {} of {total} printed, {} failed.",
                self.succeeded.len(),
                self.failed.len()
            )
        } else if self.warnings.is_empty() {
            format!("All {total} labels printed.")
        } else {
            format!(
                "All {total} labels printed with {} warning(s).",
                self.warnings.len()
            )
        }
    }
}
