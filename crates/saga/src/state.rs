//! Print saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a print batch in its lifecycle.
///
/// State transitions:
/// ```text
/// Idle ──► Reserving ──► WritingRecords ──► GeneratingArtifacts ──► Confirming
///             │                │                    │                   │
///             │                └────────────────────┴─────────┬─────────┘
///             │                                               ▼
///             │                                      ReleasingIdentifiers
///             ▼                                               │
///           Failed ◄──────────────────────────────────────────┘
///
/// Confirming ──► UpdatingAggregates ──► Completed
/// ```
///
/// `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrintState {
    #[default]
    Idle,
    Reserving,
    WritingRecords,
    GeneratingArtifacts,
    Confirming,
    UpdatingAggregates,
    /// Terminal.
    Completed,
    /// Compensating: returning reserved identifiers to the pool.
    ReleasingIdentifiers,
    /// Terminal.
    Failed,
}

impl PrintState {
    /// Returns true if the transition `self -> next` is allowed.
    pub fn can_transition_to(&self, next: PrintState) -> bool {
        use PrintState::*;

        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, Reserving)
                | (Reserving, WritingRecords)
                | (Reserving, ReleasingIdentifiers)
                | (WritingRecords, GeneratingArtifacts)
                | (WritingRecords, ReleasingIdentifiers)
                | (GeneratingArtifacts, Confirming)
                | (GeneratingArtifacts, ReleasingIdentifiers)
                | (Confirming, UpdatingAggregates)
                | (Confirming, ReleasingIdentifiers)
                | (UpdatingAggregates, Completed)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PrintState::Completed | PrintState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrintState::Idle => "idle",
            PrintState::Reserving => "reserving",
            PrintState::WritingRecords => "writing_records",
            PrintState::GeneratingArtifacts => "generating_artifacts",
            PrintState::Confirming => "confirming",
            PrintState::UpdatingAggregates => "updating_aggregates",
            PrintState::Completed => "completed",
            PrintState::ReleasingIdentifiers => "releasing_identifiers",
            PrintState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PrintState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
