//! System of record for the label printing workflow.
//!
//! This crate provides:
//! - [`PalletStore`]: identifier allocation, dependent record inserts,
//!   existence checks and aggregate counters (stock, ACO orders, work level)
//! - [`TransactionLog`]: an append-only journal of print batch steps
//! - In-memory and PostgreSQL implementations of both

pub mod error;
pub mod journal;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use journal::{JournalEntry, TransactionLog};
pub use memory::{InMemoryPalletStore, InsertFault};
pub use postgres::PostgresPalletStore;
pub use store::{IdentifierState, PalletStore, ReleaseReport, date_prefix, series_code};
