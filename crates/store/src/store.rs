use async_trait::async_trait;
use chrono::NaiveDate;
use common::{Identifier, PalletNumber};
use domain::{OrderProgress, PalletRecordSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Lifecycle state of an allocated identifier.
///
/// ```text
/// Reserved ──┬──► Confirmed
///            └──► Released ──► Reserved (reused by a later allocation)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierState {
    Reserved,
    Confirmed,
    Released,
}

impl IdentifierState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierState::Reserved => "reserved",
            IdentifierState::Confirmed => "confirmed",
            IdentifierState::Released => "released",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reserved" => Some(IdentifierState::Reserved),
            "confirmed" => Some(IdentifierState::Confirmed),
            "released" => Some(IdentifierState::Released),
            _ => None,
        }
    }
}

impl std::fmt::Display for IdentifierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a release did with each identifier it was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Back in the pool. Rows written under these identifiers were deleted.
    pub released: Vec<PalletNumber>,
    /// Still backed by another writer's rows, so taken out of circulation.
    pub retired: Vec<PalletNumber>,
    /// Pallets whose own rows were deleted.
    pub records_removed: usize,
}

/// Date prefix used in pallet numbers (`YYYYMMDD`).
pub fn date_prefix(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Generates a fresh series code: `DDMMYY-XXXXXX`.
pub fn series_code(date: NaiveDate) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", date.format("%d%m%y"), random[..6].to_uppercase())
}

/// Core trait for the system of record.
///
/// The store is the only mutual-exclusion boundary for identifier
/// allocation: callers never increment counters themselves.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PalletStore: Send + Sync {
    /// Allocates `count` identifiers for today and marks them reserved.
    ///
    /// Released identifiers of the same day are handed out first (lowest
    /// sequence first), then the day counter is extended. Allocation races
    /// surface as [`crate::StoreError::Transient`].
    async fn allocate_identifiers(&self, count: usize) -> Result<Vec<Identifier>>;

    /// Marks reserved identifiers confirmed. Already-confirmed identifiers
    /// are left untouched. Fails with `InvalidState` if any identifier is
    /// released or unknown.
    async fn confirm_identifiers(&self, identifiers: &[Identifier]) -> Result<()>;

    /// Returns reserved identifiers to the pool. Confirmed and unknown
    /// identifiers are skipped.
    ///
    /// Rows written under a released identifier (same pallet number and
    /// series) are deleted in the same transaction, so a number is never
    /// back in the pool while it still has records. A number whose rows
    /// belong to another series is retired instead.
    async fn release_identifiers(&self, identifiers: &[Identifier]) -> Result<ReleaseReport>;

    /// Permanently removes identifiers from circulation (marks them
    /// confirmed) regardless of current state. Used when an identifier turns
    /// out to be backed by an existing record.
    async fn retire_identifiers(&self, identifiers: &[Identifier]) -> Result<()>;

    /// Returns the lifecycle state of a pallet number, if it was ever allocated.
    async fn identifier_state(&self, pallet_number: &PalletNumber)
    -> Result<Option<IdentifierState>>;

    /// Returns true if pallet records already exist for this pallet number.
    async fn check_exists(&self, pallet_number: &PalletNumber) -> Result<bool>;

    /// Inserts every row for one pallet atomically.
    ///
    /// Unique-key conflicts on the pallet number or series are reported as
    /// [`crate::StoreError::Duplicate`].
    async fn insert_records(&self, records: &PalletRecordSet) -> Result<()>;

    /// Attaches the uploaded label URL to a pallet record.
    async fn update_pdf_url(&self, pallet_number: &PalletNumber, url: &str) -> Result<()>;

    /// Loads the rows written for a pallet.
    async fn get_record(&self, pallet_number: &PalletNumber) -> Result<Option<PalletRecordSet>>;

    /// Loads an ACO order line.
    async fn order_progress(
        &self,
        order_ref: &str,
        product_code: &str,
    ) -> Result<Option<OrderProgress>>;

    /// Subtracts `quantity` from an ACO order line's remaining quantity.
    ///
    /// Fails with `InvalidState` rather than letting the remaining quantity
    /// go negative.
    async fn update_order_progress(
        &self,
        order_ref: &str,
        product_code: &str,
        quantity: i64,
    ) -> Result<OrderProgress>;

    /// Number of pallets already recorded against an ACO order.
    async fn aco_pallet_count(&self, order_ref: &str) -> Result<u32>;

    /// Adds `delta` to a product's stock level and returns the new level.
    async fn add_stock(&self, product_code: &str, delta: i64) -> Result<i64>;

    /// Current stock level for a product (0 if never stocked).
    async fn stock_level(&self, product_code: &str) -> Result<i64>;

    /// Credits an operator's daily work level for a label kind.
    async fn add_work_level(
        &self,
        clock_number: &str,
        label_kind: &str,
        pallets: u32,
        quantity: i64,
    ) -> Result<()>;
}
