use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use common::{BatchId, Identifier, PalletNumber, Series};
use domain::{OrderProgress, PalletRecordSet};

use crate::journal::{JournalEntry, TransactionLog};
use crate::store::{IdentifierState, PalletStore, ReleaseReport, date_prefix, series_code};
use crate::{Result, StoreError};

/// Failure injected into `insert_records` for one pallet number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFault {
    Duplicate,
    Transient,
    Fatal,
}

#[derive(Debug, Default)]
struct Faults {
    transient_allocations: usize,
    allocation_unavailable: bool,
    colliding_allocations: usize,
    inserts: HashMap<String, InsertFault>,
    update_pdf_url: bool,
    confirm: bool,
    release: bool,
    aggregates: bool,
    journal: bool,
}

#[derive(Debug, Default)]
struct State {
    date: Option<NaiveDate>,
    counters: HashMap<String, u32>,
    identifiers: BTreeMap<PalletNumber, (Series, IdentifierState)>,
    series_in_use: HashSet<Series>,
    records: HashMap<PalletNumber, PalletRecordSet>,
    orders: HashMap<(String, String), OrderProgress>,
    stock: HashMap<String, i64>,
    work: HashMap<(String, NaiveDate, String), (u32, i64)>,
    journal: HashMap<BatchId, Vec<JournalEntry>>,
    allocation_calls: usize,
    faults: Faults,
}

impl State {
    fn today(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn fresh_series(&mut self, date: NaiveDate) -> Series {
        loop {
            if let Ok(series) = Series::new(series_code(date))
                && self.series_in_use.insert(series.clone())
            {
                return series;
            }
        }
    }

    /// Deletes the rows written under each identifier. Rows recorded under
    /// another series are left alone.
    fn delete_records(&mut self, identifiers: &[Identifier]) -> usize {
        let mut removed = 0;
        for id in identifiers {
            let owned = self
                .records
                .get(&id.pallet_number)
                .is_some_and(|rows| rows.pallet.identifier.series == id.series);
            if owned {
                self.records.remove(&id.pallet_number);
                removed += 1;
            }
        }
        removed
    }

    fn aggregate_fault(&self) -> Result<()> {
        if self.faults.aggregates {
            return Err(StoreError::Unavailable(
                "aggregate update rejected".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory system of record for testing and local runs.
///
/// Every `set_fail_*` / `inject_*` switch lets tests drive the failure paths
/// of the print workflow.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPalletStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryPalletStore {
    /// Creates an empty store that dates pallets with the current UTC day.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pinned to a fixed allocation date.
    pub fn with_date(date: NaiveDate) -> Self {
        let store = Self::default();
        store.lock().date = Some(date);
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next `n` allocations fail with a transient race error.
    pub fn fail_next_allocations(&self, n: usize) {
        self.lock().faults.transient_allocations = n;
    }

    /// Makes every allocation fail with a non-transient error.
    pub fn set_allocation_unavailable(&self, fail: bool) {
        self.lock().faults.allocation_unavailable = fail;
    }

    /// Makes the next `n` allocations hand out identifiers whose pallet
    /// number already has records, as if another writer raced us.
    pub fn inject_colliding_allocations(&self, n: usize) {
        self.lock().faults.colliding_allocations = n;
    }

    /// Injects a failure for inserts of one pallet number.
    pub fn fail_insert_for(&self, pallet_number: &str, fault: InsertFault) {
        self.lock()
            .faults
            .inserts
            .insert(pallet_number.to_string(), fault);
    }

    pub fn set_fail_on_update_pdf_url(&self, fail: bool) {
        self.lock().faults.update_pdf_url = fail;
    }

    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.lock().faults.confirm = fail;
    }

    pub fn set_fail_on_release(&self, fail: bool) {
        self.lock().faults.release = fail;
    }

    /// Fails stock, order-progress and work-level updates.
    pub fn set_fail_on_aggregates(&self, fail: bool) {
        self.lock().faults.aggregates = fail;
    }

    pub fn set_fail_on_journal(&self, fail: bool) {
        self.lock().faults.journal = fail;
    }

    /// Seeds an ACO order line.
    pub fn insert_order(&self, order: OrderProgress) {
        self.lock().orders.insert(
            (order.order_ref.clone(), order.product_code.clone()),
            order,
        );
    }

    /// Seeds pallet records without going through allocation.
    pub fn seed_record(&self, records: PalletRecordSet) {
        let mut state = self.lock();
        state
            .series_in_use
            .insert(records.pallet.identifier.series.clone());
        state
            .records
            .insert(records.pallet.identifier.pallet_number.clone(), records);
    }

    /// Number of pallets with records.
    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Number of identifiers currently in the given state.
    pub fn count_in_state(&self, wanted: IdentifierState) -> usize {
        self.lock()
            .identifiers
            .values()
            .filter(|(_, state)| *state == wanted)
            .count()
    }

    /// Number of `allocate_identifiers` calls made so far.
    pub fn allocation_calls(&self) -> usize {
        self.lock().allocation_calls
    }

    /// Work level credited to an operator today for a label kind.
    pub fn work_level(&self, clock_number: &str, label_kind: &str) -> (u32, i64) {
        let state = self.lock();
        let today = state.today();
        state
            .work
            .get(&(clock_number.to_string(), today, label_kind.to_string()))
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PalletStore for InMemoryPalletStore {
    async fn allocate_identifiers(&self, count: usize) -> Result<Vec<Identifier>> {
        let mut state = self.lock();
        state.allocation_calls += 1;

        if state.faults.allocation_unavailable {
            return Err(StoreError::Unavailable(
                "allocation service unavailable".to_string(),
            ));
        }
        if state.faults.transient_allocations > 0 {
            state.faults.transient_allocations -= 1;
            return Err(StoreError::Transient(
                "counter row locked by a concurrent allocation".to_string(),
            ));
        }

        let today = state.today();
        let prefix = date_prefix(today);

        let mut allocated: Vec<Identifier> = state
            .identifiers
            .iter()
            .filter(|(pn, (_, s))| pn.date_prefix() == prefix && *s == IdentifierState::Released)
            .take(count)
            .map(|(pn, (series, _))| Identifier::new(pn.clone(), series.clone()))
            .collect();
        for id in &allocated {
            if let Some(entry) = state.identifiers.get_mut(&id.pallet_number) {
                entry.1 = IdentifierState::Reserved;
            }
        }

        let collide = state.faults.colliding_allocations > 0;
        if collide {
            state.faults.colliding_allocations -= 1;
        }

        while allocated.len() < count {
            let next = state.counters.entry(prefix.clone()).or_insert(0);
            *next += 1;
            let pallet_number = PalletNumber::new(&prefix, *next);
            let series = state.fresh_series(today);

            if collide && allocated.is_empty() {
                // Another writer already recorded this pallet number.
                let foreign = Identifier::new(pallet_number.clone(), state.fresh_series(today));
                let mut rows = PalletRecordSet::build(
                    &domain::PrintBatch::qc(
                        domain::ProductInfo::new("FOREIGN", "", domain::ProductType::Standard),
                        "0",
                        domain::QcDetails {
                            quantity: 1,
                            count: 1,
                            operator: None,
                            context: domain::ProductTypeContext::None,
                        },
                    ),
                    &foreign,
                    0,
                    1,
                    None,
                    Utc::now(),
                );
                rows.pallet.remark = "Recorded by another writer".to_string();
                state.records.insert(pallet_number.clone(), rows);
            }

            state
                .identifiers
                .insert(pallet_number.clone(), (series.clone(), IdentifierState::Reserved));
            allocated.push(Identifier::new(pallet_number, series));
        }

        allocated.sort();
        Ok(allocated)
    }

    async fn confirm_identifiers(&self, identifiers: &[Identifier]) -> Result<()> {
        let mut state = self.lock();
        if state.faults.confirm {
            return Err(StoreError::Unavailable("confirm rejected".to_string()));
        }

        let invalid: Vec<String> = identifiers
            .iter()
            .filter(|id| {
                !matches!(
                    state.identifiers.get(&id.pallet_number),
                    Some((_, IdentifierState::Reserved | IdentifierState::Confirmed))
                )
            })
            .map(|id| id.pallet_number.to_string())
            .collect();
        if !invalid.is_empty() {
            return Err(StoreError::InvalidState(format!(
                "cannot confirm identifiers that are not reserved: {}",
                invalid.join(", ")
            )));
        }

        for id in identifiers {
            if let Some(entry) = state.identifiers.get_mut(&id.pallet_number) {
                entry.1 = IdentifierState::Confirmed;
            }
        }
        Ok(())
    }

    async fn release_identifiers(&self, identifiers: &[Identifier]) -> Result<ReleaseReport> {
        let mut state = self.lock();
        if state.faults.release {
            return Err(StoreError::Unavailable("release rejected".to_string()));
        }

        let reserved: Vec<Identifier> = identifiers
            .iter()
            .filter(|id| {
                matches!(
                    state.identifiers.get(&id.pallet_number),
                    Some((_, IdentifierState::Reserved))
                )
            })
            .cloned()
            .collect();

        let mut report = ReleaseReport {
            records_removed: state.delete_records(&reserved),
            ..ReleaseReport::default()
        };
        for id in reserved {
            let foreign = state.records.contains_key(&id.pallet_number);
            if let Some(entry) = state.identifiers.get_mut(&id.pallet_number) {
                if foreign {
                    entry.1 = IdentifierState::Confirmed;
                    report.retired.push(id.pallet_number);
                } else {
                    entry.1 = IdentifierState::Released;
                    report.released.push(id.pallet_number);
                }
            }
        }
        Ok(report)
    }

    async fn retire_identifiers(&self, identifiers: &[Identifier]) -> Result<()> {
        let mut state = self.lock();
        for id in identifiers {
            state
                .identifiers
                .entry(id.pallet_number.clone())
                .and_modify(|entry| entry.1 = IdentifierState::Confirmed)
                .or_insert_with(|| (id.series.clone(), IdentifierState::Confirmed));
        }
        Ok(())
    }

    async fn identifier_state(
        &self,
        pallet_number: &PalletNumber,
    ) -> Result<Option<IdentifierState>> {
        Ok(self
            .lock()
            .identifiers
            .get(pallet_number)
            .map(|(_, state)| *state))
    }

    async fn check_exists(&self, pallet_number: &PalletNumber) -> Result<bool> {
        Ok(self.lock().records.contains_key(pallet_number))
    }

    async fn insert_records(&self, records: &PalletRecordSet) -> Result<()> {
        let mut state = self.lock();
        let pallet_number = records.pallet.identifier.pallet_number.clone();

        match state.faults.inserts.get(pallet_number.as_str()) {
            Some(InsertFault::Duplicate) => {
                return Err(StoreError::Duplicate(pallet_number.to_string()));
            }
            Some(InsertFault::Transient) => {
                return Err(StoreError::Transient(format!(
                    "write timeout for {pallet_number}"
                )));
            }
            Some(InsertFault::Fatal) => {
                return Err(StoreError::InvalidState(format!(
                    "constraint violated for {pallet_number}"
                )));
            }
            None => {}
        }

        if state.records.contains_key(&pallet_number) {
            return Err(StoreError::Duplicate(pallet_number.to_string()));
        }
        state.records.insert(pallet_number, records.clone());
        Ok(())
    }

    async fn update_pdf_url(&self, pallet_number: &PalletNumber, url: &str) -> Result<()> {
        let mut state = self.lock();
        if state.faults.update_pdf_url {
            return Err(StoreError::Unavailable("pdf url update rejected".to_string()));
        }
        let record = state
            .records
            .get_mut(pallet_number)
            .ok_or_else(|| StoreError::NotFound(format!("pallet {pallet_number}")))?;
        record.pallet.pdf_url = Some(url.to_string());
        Ok(())
    }

    async fn get_record(&self, pallet_number: &PalletNumber) -> Result<Option<PalletRecordSet>> {
        Ok(self.lock().records.get(pallet_number).cloned())
    }

    async fn order_progress(
        &self,
        order_ref: &str,
        product_code: &str,
    ) -> Result<Option<OrderProgress>> {
        Ok(self
            .lock()
            .orders
            .get(&(order_ref.to_string(), product_code.to_string()))
            .cloned())
    }

    async fn update_order_progress(
        &self,
        order_ref: &str,
        product_code: &str,
        quantity: i64,
    ) -> Result<OrderProgress> {
        let mut state = self.lock();
        state.aggregate_fault()?;

        let order = state
            .orders
            .get_mut(&(order_ref.to_string(), product_code.to_string()))
            .ok_or_else(|| {
                StoreError::NotFound(format!("ACO order {order_ref} / {product_code}"))
            })?;
        order
            .consume(quantity)
            .map_err(|e| StoreError::InvalidState(e.to_string()))?;
        Ok(order.clone())
    }

    async fn aco_pallet_count(&self, order_ref: &str) -> Result<u32> {
        let needle = format!("ACO Ref : {}", order_ref.trim());
        let count = self
            .lock()
            .records
            .values()
            .filter(|r| r.pallet.remark.ends_with(&needle))
            .count();
        Ok(count as u32)
    }

    async fn add_stock(&self, product_code: &str, delta: i64) -> Result<i64> {
        let mut state = self.lock();
        state.aggregate_fault()?;
        let level = state.stock.entry(product_code.to_string()).or_insert(0);
        *level += delta;
        Ok(*level)
    }

    async fn stock_level(&self, product_code: &str) -> Result<i64> {
        Ok(self.lock().stock.get(product_code).copied().unwrap_or(0))
    }

    async fn add_work_level(
        &self,
        clock_number: &str,
        label_kind: &str,
        pallets: u32,
        quantity: i64,
    ) -> Result<()> {
        let mut state = self.lock();
        state.aggregate_fault()?;
        let today = state.today();
        let entry = state
            .work
            .entry((clock_number.to_string(), today, label_kind.to_string()))
            .or_default();
        entry.0 += pallets;
        entry.1 += quantity;
        Ok(())
    }
}

#[async_trait]
impl TransactionLog for InMemoryPalletStore {
    async fn append(
        &self,
        batch_id: BatchId,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<u32> {
        let mut state = self.lock();
        if state.faults.journal {
            return Err(StoreError::Unavailable("journal rejected".to_string()));
        }
        let entries = state.journal.entry(batch_id).or_default();
        let sequence = entries.len() as u32 + 1;
        entries.push(JournalEntry {
            batch_id,
            sequence,
            kind: kind.to_string(),
            payload,
            recorded_at: Utc::now(),
        });
        Ok(sequence)
    }

    async fn entries(&self, batch_id: BatchId) -> Result<Vec<JournalEntry>> {
        Ok(self
            .lock()
            .journal
            .get(&batch_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{PrintBatch, ProductInfo, ProductType, ProductTypeContext, QcDetails};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 21).unwrap()
    }

    fn records_for(id: &Identifier) -> PalletRecordSet {
        let batch = PrintBatch::qc(
            ProductInfo::new("ME6060150", "Cover", ProductType::Standard),
            "5997",
            QcDetails {
                quantity: 10,
                count: 1,
                operator: None,
                context: ProductTypeContext::None,
            },
        );
        PalletRecordSet::build(&batch, id, 0, 10, None, Utc::now())
    }

    #[tokio::test]
    async fn test_allocate_sequential_numbers() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(3).await.unwrap();
        let numbers: Vec<&str> = ids.iter().map(|i| i.pallet_number.as_str()).collect();
        assert_eq!(numbers, vec!["20240521/001", "20240521/002", "20240521/003"]);

        let series: HashSet<_> = ids.iter().map(|i| i.series.clone()).collect();
        assert_eq!(series.len(), 3);

        let next = store.allocate_identifiers(1).await.unwrap();
        assert_eq!(next[0].pallet_number.as_str(), "20240521/004");
    }

    #[tokio::test]
    async fn test_released_numbers_are_reused_first() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(3).await.unwrap();
        assert_eq!(store.release_identifiers(&ids[1..]).await.unwrap().released.len(), 2);

        let again = store.allocate_identifiers(3).await.unwrap();
        let numbers: Vec<&str> = again.iter().map(|i| i.pallet_number.as_str()).collect();
        assert_eq!(numbers, vec!["20240521/002", "20240521/003", "20240521/004"]);
        assert_eq!(again[0].series, ids[1].series);
    }

    #[tokio::test]
    async fn test_release_skips_confirmed_and_unknown() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(2).await.unwrap();
        store.confirm_identifiers(&ids[..1]).await.unwrap();

        let unknown = Identifier::new(
            PalletNumber::new("20240521", 99),
            Series::new("X").unwrap(),
        );
        let report = store
            .release_identifiers(&[ids[0].clone(), ids[1].clone(), unknown])
            .await
            .unwrap();
        assert_eq!(report.released, vec![ids[1].pallet_number.clone()]);
        assert!(report.retired.is_empty());
        assert_eq!(
            store.identifier_state(&ids[0].pallet_number).await.unwrap(),
            Some(IdentifierState::Confirmed)
        );
        assert_eq!(
            store.identifier_state(&ids[1].pallet_number).await.unwrap(),
            Some(IdentifierState::Released)
        );
    }

    #[tokio::test]
    async fn test_release_deletes_rows_written_under_the_identifier() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(2).await.unwrap();
        store.insert_records(&records_for(&ids[0])).await.unwrap();

        let report = store.release_identifiers(&ids).await.unwrap();
        assert_eq!(report.records_removed, 1);
        assert_eq!(report.released.len(), 2);
        assert_eq!(store.record_count(), 0);

        // The reused number takes new rows without a duplicate conflict.
        let again = store.allocate_identifiers(1).await.unwrap();
        assert_eq!(again[0], ids[0]);
        store.insert_records(&records_for(&again[0])).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_retires_numbers_backed_by_another_writer() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(1).await.unwrap();
        let foreign = Identifier::new(
            ids[0].pallet_number.clone(),
            Series::new("210524-FOREIGN").unwrap(),
        );
        store.seed_record(records_for(&foreign));

        let report = store.release_identifiers(&ids).await.unwrap();
        assert!(report.released.is_empty());
        assert_eq!(report.retired, vec![ids[0].pallet_number.clone()]);
        assert_eq!(report.records_removed, 0);
        assert!(store.check_exists(&ids[0].pallet_number).await.unwrap());
        assert_eq!(
            store.identifier_state(&ids[0].pallet_number).await.unwrap(),
            Some(IdentifierState::Confirmed)
        );
    }

    #[tokio::test]
    async fn test_confirm_rejects_released() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(1).await.unwrap();
        store.release_identifiers(&ids).await.unwrap();
        let err = store.confirm_identifiers(&ids).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_confirm_twice_is_noop() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(1).await.unwrap();
        store.confirm_identifiers(&ids).await.unwrap();
        store.confirm_identifiers(&ids).await.unwrap();
        assert_eq!(store.count_in_state(IdentifierState::Confirmed), 1);
    }

    #[tokio::test]
    async fn test_insert_detects_duplicates() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(1).await.unwrap();
        let rows = records_for(&ids[0]);

        store.insert_records(&rows).await.unwrap();
        assert!(store.check_exists(&ids[0].pallet_number).await.unwrap());

        let err = store.insert_records(&rows).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_injected_insert_faults() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(1).await.unwrap();
        store.fail_insert_for(ids[0].pallet_number.as_str(), InsertFault::Transient);

        let err = store.insert_records(&records_for(&ids[0])).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_allocation_fault_is_consumed() {
        let store = InMemoryPalletStore::with_date(date());
        store.fail_next_allocations(1);
        assert!(store.allocate_identifiers(1).await.unwrap_err().is_transient());
        assert!(store.allocate_identifiers(1).await.is_ok());
        assert_eq!(store.allocation_calls(), 2);
    }

    #[tokio::test]
    async fn test_colliding_allocation_seeds_foreign_record() {
        let store = InMemoryPalletStore::with_date(date());
        store.inject_colliding_allocations(1);
        let ids = store.allocate_identifiers(2).await.unwrap();
        assert!(store.check_exists(&ids[0].pallet_number).await.unwrap());
        assert!(!store.check_exists(&ids[1].pallet_number).await.unwrap());
    }

    #[tokio::test]
    async fn test_pdf_url_update() {
        let store = InMemoryPalletStore::with_date(date());
        let ids = store.allocate_identifiers(1).await.unwrap();
        store.insert_records(&records_for(&ids[0])).await.unwrap();
        store
            .update_pdf_url(&ids[0].pallet_number, "https://cdn/x.pdf")
            .await
            .unwrap();
        let rows = store.get_record(&ids[0].pallet_number).await.unwrap().unwrap();
        assert_eq!(rows.pallet.pdf_url.as_deref(), Some("https://cdn/x.pdf"));
    }

    #[tokio::test]
    async fn test_order_progress_never_negative() {
        let store = InMemoryPalletStore::new();
        store.insert_order(OrderProgress::new("123456", "MHALFWG", 50));

        let order = store
            .update_order_progress("123456", "MHALFWG", 30)
            .await
            .unwrap();
        assert_eq!(order.remaining_qty, 20);

        let err = store
            .update_order_progress("123456", "MHALFWG", 21)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));

        let err = store
            .update_order_progress("999999", "MHALFWG", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stock_and_work_levels() {
        let store = InMemoryPalletStore::with_date(date());
        assert_eq!(store.add_stock("ME6060150", 30).await.unwrap(), 30);
        assert_eq!(store.add_stock("ME6060150", 5).await.unwrap(), 35);
        assert_eq!(store.stock_level("ME6060150").await.unwrap(), 35);
        assert_eq!(store.stock_level("OTHER").await.unwrap(), 0);

        store.add_work_level("5997", "qc", 3, 30).await.unwrap();
        store.add_work_level("5997", "qc", 1, 10).await.unwrap();
        assert_eq!(store.work_level("5997", "qc"), (4, 40));
    }

    #[tokio::test]
    async fn test_journal_sequences_per_batch() {
        let store = InMemoryPalletStore::new();
        let a = BatchId::new();
        let b = BatchId::new();

        assert_eq!(store.append(a, "started", serde_json::json!({})).await.unwrap(), 1);
        assert_eq!(store.append(a, "completed", serde_json::json!({})).await.unwrap(), 2);
        assert_eq!(store.append(b, "started", serde_json::json!({})).await.unwrap(), 1);

        let entries = store.entries(a).await.unwrap();
        let kinds: Vec<&str> = entries.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["started", "completed"]);
    }
}
