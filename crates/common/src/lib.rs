//! Shared identifier types for the label printing system.

mod types;

pub use types::{BatchId, Identifier, IdentifierError, PalletNumber, Series};
