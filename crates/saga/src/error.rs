//! Saga error types.

use domain::ValidationError;
use store::StoreError;
use thiserror::Error;

use crate::state::PrintState;

/// Per-item failure of [`crate::RecordWriter::create_records`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The pallet number already has records. Aborts the whole batch.
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// A retryable write failure. The item is marked failed, the batch continues.
    #[error("Transient write failure: {0}")]
    TransientWriteFailure(String),

    /// A permanent write failure. The item is marked failed, the batch continues.
    #[error("Fatal write failure: {0}")]
    FatalWriteFailure(String),
}

impl WriteError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, WriteError::DuplicateIdentifier(_))
    }
}

impl From<StoreError> for WriteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(pallet_number) => WriteError::DuplicateIdentifier(pallet_number),
            e if e.is_transient() => WriteError::TransientWriteFailure(e.to_string()),
            e => WriteError::FatalWriteFailure(e.to_string()),
        }
    }
}

/// Per-item failure of [`crate::ArtifactGenerator::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    /// The renderer rejected the label data.
    #[error("Render failed: {0}")]
    Render(String),

    /// The upload failed in a way that may succeed on retry.
    #[error("Transient artifact failure: {0}")]
    TransientArtifactFailure(String),

    /// The storage service refused the upload.
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// The generation task died before reporting a result.
    #[error("Artifact task aborted: {0}")]
    Aborted(String),
}

impl ArtifactError {
    /// Returns true if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ArtifactError::TransientArtifactFailure(_))
    }
}

/// Coarse grouping of batch failures for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Nothing happened, the input must be fixed.
    InvalidInput,
    /// The operator must wait before retrying.
    Cooldown,
    /// The operator cancelled the batch.
    Cancelled,
    /// System error, contact support.
    System,
}

/// Batch-level errors returned by the print saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The batch was rejected before any identifier was reserved.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A batch from the same operator was accepted too recently.
    #[error("Cooldown active: retry in {remaining_ms} ms")]
    CooldownActive { remaining_ms: u64 },

    /// Identifier allocation kept failing.
    #[error("Identifier allocation exhausted after {attempts} attempts: {last_cause}")]
    AllocationExhausted { attempts: u32, last_cause: String },

    /// A record write hit an existing pallet number; the whole batch was released.
    #[error("Duplicate identifier: {pallet_number}")]
    DuplicateIdentifier { pallet_number: String },

    /// Every item failed; nothing was confirmed or printed.
    #[error("No labels were produced: all {failed} items failed")]
    NoItemsSucceeded { failed: usize },

    /// The operator cancelled the batch.
    #[error("Batch cancelled by user")]
    CancelledByUser,

    /// The state machine refused a transition.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: PrintState, to: PrintState },

    /// Unexpected failure inside a stage.
    #[error("Unexpected failure during {stage}: {reason}")]
    Unexpected { stage: PrintState, reason: String },

    /// System of record error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    pub fn category(&self) -> FailureCategory {
        match self {
            SagaError::Validation(_) => FailureCategory::InvalidInput,
            SagaError::CooldownActive { .. } => FailureCategory::Cooldown,
            SagaError::CancelledByUser => FailureCategory::Cancelled,
            _ => FailureCategory::System,
        }
    }

    /// Message suitable for showing to the operator.
    pub fn user_message(&self) -> String {
        match self.category() {
            FailureCategory::InvalidInput => {
                format!("Nothing was printed. Please fix your input: {self}")
            }
            FailureCategory::Cooldown => {
                "Please wait a few seconds before printing again.".to_string()
            }
            FailureCategory::Cancelled => {
                "Printing was cancelled. No labels were kept.".to_string()
            }
            FailureCategory::System => {
                format!("System error, please contact support. ({self})")
            }
        }
    }

    /// Short label used as a metrics dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            SagaError::Validation(_) => "validation",
            SagaError::CooldownActive { .. } => "cooldown",
            SagaError::AllocationExhausted { .. } => "allocation_exhausted",
            SagaError::DuplicateIdentifier { .. } => "duplicate",
            SagaError::NoItemsSucceeded { .. } => "no_items_succeeded",
            SagaError::CancelledByUser => "cancelled",
            SagaError::InvalidTransition { .. } => "invalid_transition",
            SagaError::Unexpected { .. } => "unexpected",
            SagaError::Store(_) => "store",
            SagaError::Serialization(_) => "serialization",
        }
    }
}

impl From<WriteError> for SagaError {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::DuplicateIdentifier(pallet_number) => {
                SagaError::DuplicateIdentifier { pallet_number }
            }
            other => SagaError::Unexpected {
                stage: PrintState::WritingRecords,
                reason: other.to_string(),
            },
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
