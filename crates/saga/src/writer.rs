//! Record writer: the dependent rows for each pallet and the batch-level
//! aggregate counters.

use std::sync::Arc;

use chrono::Utc;
use common::Identifier;
use domain::{OrderProgress, PalletRecordSet, PrintBatch, ValidationError};
use store::{PalletStore, StoreError};

use crate::error::{Result, WriteError};

/// Per-pallet input to [`RecordWriter::create_records`].
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    pub batch: &'a PrintBatch,
    /// 0-based position in ascending sequence order.
    pub index: usize,
    pub quantity: i64,
    /// Exact GRN net weight; `None` for QC pallets.
    pub net_weight: Option<f64>,
}

/// Aggregate counters after a batch was confirmed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateReport {
    pub order_progress: Option<OrderProgress>,
    pub stock_level: Option<i64>,
    /// One entry per failed update. Labels already exist, so these never
    /// roll anything back.
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct RecordWriter {
    store: Arc<dyn PalletStore>,
}

impl RecordWriter {
    pub fn new(store: Arc<dyn PalletStore>) -> Self {
        Self { store }
    }

    /// Writes pallet info, history, inventory and the optional Slate/GRN row
    /// for one identifier as a single unit.
    #[tracing::instrument(skip(self, ctx), fields(pallet_number = %identifier.pallet_number))]
    pub async fn create_records(
        &self,
        identifier: &Identifier,
        ctx: &RecordContext<'_>,
    ) -> std::result::Result<(), WriteError> {
        let records = PalletRecordSet::build(
            ctx.batch,
            identifier,
            ctx.index,
            ctx.quantity,
            ctx.net_weight,
            Utc::now(),
        );
        self.store.insert_records(&records).await?;
        Ok(())
    }

    /// Checks an existing ACO order can absorb the whole batch before any
    /// identifier is reserved.
    pub async fn check_order_capacity(&self, batch: &PrintBatch) -> Result<Option<OrderProgress>> {
        let (Some(order_ref), Some(unit)) = (batch.existing_aco_order_ref(), batch.unit_quantity())
        else {
            return Ok(None);
        };

        let order = self
            .store
            .order_progress(order_ref, &batch.product.code)
            .await?
            .ok_or_else(|| ValidationError::AcoOrderNotFound {
                order_ref: order_ref.to_string(),
                product_code: batch.product.code.clone(),
            })?;

        order.ensure_can_consume(unit * batch.pallet_count() as i64)?;
        Ok(Some(order))
    }

    /// Applies the batch's consumption to its ACO order, once per batch.
    ///
    /// Only existing orders are updated; the consumed quantity is the unit
    /// quantity times the number of confirmed pallets.
    #[tracing::instrument(skip(self, batch), fields(batch_id = %batch.batch_id))]
    pub async fn apply_order_progress(
        &self,
        batch: &PrintBatch,
        confirmed: usize,
    ) -> Result<Option<OrderProgress>> {
        let (Some(order_ref), Some(unit)) = (batch.existing_aco_order_ref(), batch.unit_quantity())
        else {
            return Ok(None);
        };
        if confirmed == 0 {
            return Ok(None);
        }

        let order = self
            .store
            .update_order_progress(order_ref, &batch.product.code, unit * confirmed as i64)
            .await?;
        if order.is_completed() {
            tracing::info!(order_ref, "ACO order completed");
        }
        Ok(Some(order))
    }

    /// Updates order progress, stock level and the operator's work level
    /// for the confirmed pallets.
    pub async fn apply_aggregates(
        &self,
        batch: &PrintBatch,
        confirmed_quantities: &[i64],
    ) -> AggregateReport {
        let mut report = AggregateReport::default();
        let confirmed = confirmed_quantities.len();
        let total: i64 = confirmed_quantities.iter().sum();

        match self.apply_order_progress(batch, confirmed).await {
            Ok(order) => report.order_progress = order,
            Err(e) => report
                .warnings
                .push(format!("ACO order progress not updated: {e}")),
        }

        match self.store.add_stock(&batch.product.code, total).await {
            Ok(level) => report.stock_level = Some(level),
            Err(e) => report.warnings.push(format!(
                "stock level for {} not updated: {e}",
                batch.product.code
            )),
        }

        if let Err(e) = self
            .store
            .add_work_level(
                batch.clock_number.trim(),
                batch.kind_name(),
                confirmed as u32,
                total,
            )
            .await
        {
            report
                .warnings
                .push(format!("work level not updated: {e}"));
        }

        report
    }

    /// Pallets already recorded against the batch's ACO order.
    pub async fn aco_pallets_before(&self, batch: &PrintBatch) -> std::result::Result<u32, StoreError> {
        match batch.aco_order_ref() {
            Some(order_ref) if batch.product.product_type == domain::ProductType::Aco => {
                self.store.aco_pallet_count(order_ref).await
            }
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ProductInfo, ProductType, ProductTypeContext, QcDetails};
    use crate::error::SagaError;
    use store::{InMemoryPalletStore, InsertFault};

    fn aco_batch(count: u32, quantity: u32, new_order: bool) -> PrintBatch {
        PrintBatch::qc(
            ProductInfo::new("MHALFWG", "Half wedge", ProductType::Aco),
            "5997",
            QcDetails {
                quantity,
                count,
                operator: None,
                context: ProductTypeContext::Aco {
                    order_ref: "123456".to_string(),
                    new_order,
                },
            },
        )
    }

    fn writer(store: &InMemoryPalletStore) -> RecordWriter {
        RecordWriter::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_create_records_writes_aco_remark() {
        let store = InMemoryPalletStore::new();
        let ids = store.allocate_identifiers(1).await.unwrap();
        let batch = aco_batch(1, 10, false);

        writer(&store)
            .create_records(
                &ids[0],
                &RecordContext {
                    batch: &batch,
                    index: 0,
                    quantity: 10,
                    net_weight: None,
                },
            )
            .await
            .unwrap();

        let rows = store.get_record(&ids[0].pallet_number).await.unwrap().unwrap();
        assert_eq!(rows.pallet.remark, "Finished In Production ACO Ref : 123456");
        assert_eq!(rows.history.remark, "ACO Ref : 123456");
        assert_eq!(rows.inventory.await_qty, 10);
    }

    #[tokio::test]
    async fn test_create_records_classifies_failures() {
        let store = InMemoryPalletStore::new();
        let ids = store.allocate_identifiers(3).await.unwrap();
        store.fail_insert_for(ids[0].pallet_number.as_str(), InsertFault::Duplicate);
        store.fail_insert_for(ids[1].pallet_number.as_str(), InsertFault::Transient);
        store.fail_insert_for(ids[2].pallet_number.as_str(), InsertFault::Fatal);
        let batch = aco_batch(3, 10, true);
        let writer = writer(&store);

        let mut errors = Vec::new();
        for (index, id) in ids.iter().enumerate() {
            let ctx = RecordContext {
                batch: &batch,
                index,
                quantity: 10,
                net_weight: None,
            };
            errors.push(writer.create_records(id, &ctx).await.unwrap_err());
        }
        assert!(errors[0].is_duplicate());
        assert!(matches!(errors[1], WriteError::TransientWriteFailure(_)));
        assert!(matches!(errors[2], WriteError::FatalWriteFailure(_)));
    }

    #[tokio::test]
    async fn test_order_capacity_rejects_excess() {
        let store = InMemoryPalletStore::new();
        store.insert_order(OrderProgress::new("123456", "MHALFWG", 50));
        let writer = writer(&store);

        assert!(writer.check_order_capacity(&aco_batch(5, 10, false)).await.unwrap().is_some());
        let err = writer
            .check_order_capacity(&aco_batch(6, 10, false))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SagaError::Validation(ValidationError::AcoQuantityExcess {
                requested: 60,
                remaining: 50,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_order_capacity_unknown_order() {
        let store = InMemoryPalletStore::new();
        let err = writer(&store)
            .check_order_capacity(&aco_batch(1, 10, false))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SagaError::Validation(ValidationError::AcoOrderNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_new_orders_are_not_checked_or_consumed() {
        let store = InMemoryPalletStore::new();
        let writer = writer(&store);
        let batch = aco_batch(2, 10, true);

        assert_eq!(writer.check_order_capacity(&batch).await.unwrap(), None);
        assert_eq!(writer.apply_order_progress(&batch, 2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_aggregates_use_confirmed_items_once() {
        let store = InMemoryPalletStore::new();
        store.insert_order(OrderProgress::new("123456", "MHALFWG", 100));
        let writer = writer(&store);
        let batch = aco_batch(4, 10, false);

        let report = writer.apply_aggregates(&batch, &[10, 10, 10]).await;
        assert!(report.warnings.is_empty());
        assert_eq!(report.order_progress.unwrap().remaining_qty, 70);
        assert_eq!(report.stock_level, Some(30));
        assert_eq!(store.work_level("5997", "qc"), (3, 30));
    }

    #[tokio::test]
    async fn test_aggregate_failures_become_warnings() {
        let store = InMemoryPalletStore::new();
        store.insert_order(OrderProgress::new("123456", "MHALFWG", 100));
        store.set_fail_on_aggregates(true);

        let report = writer(&store)
            .apply_aggregates(&aco_batch(1, 10, false), &[10])
            .await;
        assert_eq!(report.warnings.len(), 3);
        assert_eq!(report.stock_level, None);
    }
}
