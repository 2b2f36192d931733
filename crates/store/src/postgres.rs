use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BatchId, Identifier, PalletNumber, Series};
use domain::{
    GrnRecord, HistoryEntry, InventoryRecord, OrderProgress, PalletInfo, PalletRecordSet,
    SlateRecord,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::journal::{JournalEntry, TransactionLog};
use crate::store::{IdentifierState, PalletStore, ReleaseReport, date_prefix, series_code};
use crate::{Result, StoreError};

/// Postgres unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed system of record.
#[derive(Clone)]
pub struct PostgresPalletStore {
    pool: PgPool,
}

impl PostgresPalletStore {
    /// Creates a new PostgreSQL pallet store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
    }

    async fn reuse_released(
        tx: &mut Transaction<'_, Postgres>,
        prefix: &str,
        count: usize,
    ) -> Result<Vec<Identifier>> {
        let rows = sqlx::query(
            r#"
            SELECT pallet_number, series
            FROM pallet_identifiers
            WHERE date_prefix = $1 AND state = 'released'
            ORDER BY sequence ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(prefix)
        .bind(count as i64)
        .fetch_all(&mut **tx)
        .await?;

        let mut reused = Vec::with_capacity(rows.len());
        for row in rows {
            let pallet_number = PalletNumber::parse(row.try_get::<&str, _>("pallet_number")?)?;
            let series = Series::new(row.try_get::<String, _>("series")?)?;
            reused.push(Identifier::new(pallet_number, series));
        }

        if !reused.is_empty() {
            let numbers: Vec<String> = reused
                .iter()
                .map(|id| id.pallet_number.to_string())
                .collect();
            sqlx::query(
                r#"
                UPDATE pallet_identifiers
                SET state = 'reserved', updated_at = NOW()
                WHERE pallet_number = ANY($1)
                "#,
            )
            .bind(&numbers)
            .execute(&mut **tx)
            .await?;
        }

        Ok(reused)
    }

    async fn set_state(
        &self,
        identifiers: &[Identifier],
        to: IdentifierState,
        from: &[IdentifierState],
    ) -> Result<u64> {
        let numbers: Vec<String> = identifiers
            .iter()
            .map(|id| id.pallet_number.to_string())
            .collect();
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE pallet_identifiers
            SET state = $1, updated_at = NOW()
            WHERE pallet_number = ANY($2) AND state = ANY($3)
            "#,
        )
        .bind(to.as_str())
        .bind(&numbers)
        .bind(&from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes every row written under the given identifiers. Rows of a
    /// pallet recorded under another series are left alone. Returns the
    /// number of pallets removed.
    async fn delete_records(
        tx: &mut Transaction<'_, Postgres>,
        identifiers: &[Identifier],
    ) -> Result<u64> {
        if identifiers.is_empty() {
            return Ok(0);
        }
        let numbers: Vec<String> = identifiers
            .iter()
            .map(|id| id.pallet_number.to_string())
            .collect();
        let series: Vec<String> = identifiers
            .iter()
            .map(|id| id.series.to_string())
            .collect();

        let owned: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT p.plt_num FROM record_palletinfo p
            JOIN UNNEST($1::TEXT[], $2::TEXT[]) AS o(plt_num, series)
              ON p.plt_num = o.plt_num AND p.series = o.series
            FOR UPDATE OF p
            "#,
        )
        .bind(&numbers)
        .bind(&series)
        .fetch_all(&mut **tx)
        .await?;
        if owned.is_empty() {
            return Ok(0);
        }

        for table in ["record_history", "record_inventory", "record_slate", "record_grn"] {
            let sql = format!("DELETE FROM {table} WHERE plt_num = ANY($1)");
            sqlx::query(&sql)
                .bind(&owned)
                .execute(&mut **tx)
                .await?;
        }
        let removed = sqlx::query("DELETE FROM record_palletinfo WHERE plt_num = ANY($1)")
            .bind(&owned)
            .execute(&mut **tx)
            .await?
            .rows_affected();
        Ok(removed)
    }

    fn row_to_pallet(row: &PgRow) -> Result<PalletInfo> {
        let pallet_number = PalletNumber::parse(row.try_get::<&str, _>("plt_num")?)?;
        let series = Series::new(row.try_get::<String, _>("series")?)?;
        Ok(PalletInfo {
            identifier: Identifier::new(pallet_number, series),
            product_code: row.try_get("product_code")?,
            product_qty: row.try_get("product_qty")?,
            remark: row.try_get("plt_remark")?,
            generated_at: row.try_get::<DateTime<Utc>, _>("generate_time")?,
            pdf_url: row.try_get("pdf_url")?,
        })
    }
}

#[async_trait]
impl PalletStore for PostgresPalletStore {
    #[tracing::instrument(skip(self))]
    async fn allocate_identifiers(&self, count: usize) -> Result<Vec<Identifier>> {
        let today = Utc::now().date_naive();
        let prefix = date_prefix(today);

        let mut tx = self.pool.begin().await?;
        let mut allocated = Self::reuse_released(&mut tx, &prefix, count).await?;
        let reused = allocated.len();
        let missing = (count - reused) as i32;

        if missing > 0 {
            let last: i32 = sqlx::query_scalar(
                r#"
                INSERT INTO pallet_counters (date_prefix, last_sequence)
                VALUES ($1, $2)
                ON CONFLICT (date_prefix) DO UPDATE
                SET last_sequence = pallet_counters.last_sequence + EXCLUDED.last_sequence
                RETURNING last_sequence
                "#,
            )
            .bind(&prefix)
            .bind(missing)
            .fetch_one(&mut *tx)
            .await?;

            for sequence in (last - missing + 1)..=last {
                let pallet_number = PalletNumber::new(&prefix, sequence as u32);
                let series = Series::new(series_code(today))?;

                sqlx::query(
                    r#"
                    INSERT INTO pallet_identifiers (pallet_number, date_prefix, sequence, series, state)
                    VALUES ($1, $2, $3, $4, 'reserved')
                    "#,
                )
                .bind(pallet_number.as_str())
                .bind(&prefix)
                .bind(sequence)
                .bind(series.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    // A series or pallet number clash means another allocator won the race.
                    if Self::is_unique_violation(&e) {
                        return StoreError::Transient(format!(
                            "identifier clash while allocating {pallet_number}"
                        ));
                    }
                    StoreError::Database(e)
                })?;

                allocated.push(Identifier::new(pallet_number, series));
            }
        }

        tx.commit().await?;

        metrics::counter!("pallet_identifiers_allocated_total").increment(count as u64);
        tracing::debug!(count, reused, "identifiers allocated");

        allocated.sort();
        Ok(allocated)
    }

    async fn confirm_identifiers(&self, identifiers: &[Identifier]) -> Result<()> {
        let numbers: Vec<String> = identifiers
            .iter()
            .map(|id| id.pallet_number.to_string())
            .collect();

        let invalid: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT n FROM UNNEST($1::TEXT[]) AS n
            WHERE NOT EXISTS (
                SELECT 1 FROM pallet_identifiers
                WHERE pallet_number = n AND state IN ('reserved', 'confirmed')
            )
            "#,
        )
        .bind(&numbers)
        .fetch_all(&self.pool)
        .await?;

        if !invalid.is_empty() {
            return Err(StoreError::InvalidState(format!(
                "cannot confirm identifiers that are not reserved: {}",
                invalid.join(", ")
            )));
        }

        self.set_state(
            identifiers,
            IdentifierState::Confirmed,
            &[IdentifierState::Reserved],
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, identifiers), fields(count = identifiers.len()))]
    async fn release_identifiers(&self, identifiers: &[Identifier]) -> Result<ReleaseReport> {
        let numbers: Vec<String> = identifiers
            .iter()
            .map(|id| id.pallet_number.to_string())
            .collect();
        let mut tx = self.pool.begin().await?;

        let reserved: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT pallet_number FROM pallet_identifiers
            WHERE pallet_number = ANY($1) AND state = 'reserved'
            FOR UPDATE
            "#,
        )
        .bind(&numbers)
        .fetch_all(&mut *tx)
        .await?;

        let reserved: Vec<Identifier> = identifiers
            .iter()
            .filter(|id| reserved.iter().any(|n| n == id.pallet_number.as_str()))
            .cloned()
            .collect();
        let records_removed = Self::delete_records(&mut tx, &reserved).await?;

        let reserved_numbers: Vec<String> = reserved
            .iter()
            .map(|id| id.pallet_number.to_string())
            .collect();
        let rows = sqlx::query(
            r#"
            UPDATE pallet_identifiers i
            SET state = CASE
                    WHEN EXISTS (SELECT 1 FROM record_palletinfo r WHERE r.plt_num = i.pallet_number)
                    THEN 'confirmed'
                    ELSE 'released'
                END,
                updated_at = NOW()
            WHERE i.pallet_number = ANY($1) AND i.state = 'reserved'
            RETURNING i.pallet_number, i.state
            "#,
        )
        .bind(&reserved_numbers)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut report = ReleaseReport {
            records_removed: records_removed as usize,
            ..ReleaseReport::default()
        };
        for row in rows {
            let pallet_number = PalletNumber::parse(row.try_get::<&str, _>("pallet_number")?)?;
            match row.try_get::<&str, _>("state")? {
                "released" => report.released.push(pallet_number),
                _ => report.retired.push(pallet_number),
            }
        }
        report.released.sort();
        report.retired.sort();
        Ok(report)
    }

    async fn retire_identifiers(&self, identifiers: &[Identifier]) -> Result<()> {
        for id in identifiers {
            sqlx::query(
                r#"
                INSERT INTO pallet_identifiers (pallet_number, date_prefix, sequence, series, state)
                VALUES ($1, $2, $3, $4, 'confirmed')
                ON CONFLICT (pallet_number) DO UPDATE
                SET state = 'confirmed', updated_at = NOW()
                "#,
            )
            .bind(id.pallet_number.as_str())
            .bind(id.pallet_number.date_prefix())
            .bind(id.sequence() as i32)
            .bind(id.series.as_str())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn identifier_state(
        &self,
        pallet_number: &PalletNumber,
    ) -> Result<Option<IdentifierState>> {
        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM pallet_identifiers WHERE pallet_number = $1")
                .bind(pallet_number.as_str())
                .fetch_optional(&self.pool)
                .await?;

        state
            .map(|s| {
                IdentifierState::parse(&s)
                    .ok_or_else(|| StoreError::InvalidState(format!("unknown state {s}")))
            })
            .transpose()
    }

    async fn check_exists(&self, pallet_number: &PalletNumber) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM record_palletinfo WHERE plt_num = $1)",
        )
        .bind(pallet_number.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self, records), fields(pallet_number = %records.identifier().pallet_number))]
    async fn insert_records(&self, records: &PalletRecordSet) -> Result<()> {
        let pallet_number = records.identifier().pallet_number.as_str();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO record_palletinfo (plt_num, series, product_code, product_qty, plt_remark, generate_time, pdf_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(pallet_number)
        .bind(records.pallet.identifier.series.as_str())
        .bind(&records.pallet.product_code)
        .bind(records.pallet.product_qty)
        .bind(&records.pallet.remark)
        .bind(records.pallet.generated_at)
        .bind(&records.pallet.pdf_url)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                return StoreError::Duplicate(pallet_number.to_string());
            }
            StoreError::Database(e)
        })?;

        sqlx::query(
            r#"
            INSERT INTO record_history (plt_num, time, operator_id, action, location, remark)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(pallet_number)
        .bind(records.history.time)
        .bind(&records.history.operator_id)
        .bind(&records.history.action)
        .bind(&records.history.location)
        .bind(&records.history.remark)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO record_inventory (plt_num, product_code, await_qty) VALUES ($1, $2, $3)",
        )
        .bind(pallet_number)
        .bind(&records.inventory.product_code)
        .bind(records.inventory.await_qty)
        .execute(&mut *tx)
        .await?;

        if let Some(slate) = &records.slate {
            sqlx::query(
                "INSERT INTO record_slate (plt_num, batch_num, first_off, setter) VALUES ($1, $2, $3, $4)",
            )
            .bind(pallet_number)
            .bind(&slate.batch_number)
            .bind(slate.first_off)
            .bind(&slate.setter)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(grn) = &records.grn {
            sqlx::query(
                r#"
                INSERT INTO record_grn (plt_num, grn_ref, sup_code, material_code, gross_weight, net_weight,
                                        pallet, package, pallet_count, package_count)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(pallet_number)
            .bind(&grn.grn_ref)
            .bind(&grn.supplier_code)
            .bind(&grn.material_code)
            .bind(grn.gross_weight)
            .bind(grn.net_weight)
            .bind(&grn.pallet_type)
            .bind(&grn.package_type)
            .bind(grn.pallet_count as i32)
            .bind(grn.package_count as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_pdf_url(&self, pallet_number: &PalletNumber, url: &str) -> Result<()> {
        let result = sqlx::query("UPDATE record_palletinfo SET pdf_url = $1 WHERE plt_num = $2")
            .bind(url)
            .bind(pallet_number.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("pallet {pallet_number}")));
        }
        Ok(())
    }

    async fn get_record(&self, pallet_number: &PalletNumber) -> Result<Option<PalletRecordSet>> {
        let Some(row) = sqlx::query(
            r#"
            SELECT plt_num, series, product_code, product_qty, plt_remark, generate_time, pdf_url
            FROM record_palletinfo
            WHERE plt_num = $1
            "#,
        )
        .bind(pallet_number.as_str())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };
        let pallet = Self::row_to_pallet(&row)?;

        let row = sqlx::query(
            r#"
            SELECT time, operator_id, action, location, remark
            FROM record_history
            WHERE plt_num = $1
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(pallet_number.as_str())
        .fetch_one(&self.pool)
        .await?;
        let history = HistoryEntry {
            time: row.try_get("time")?,
            operator_id: row.try_get("operator_id")?,
            action: row.try_get("action")?,
            location: row.try_get("location")?,
            remark: row.try_get("remark")?,
        };

        let row = sqlx::query("SELECT product_code, await_qty FROM record_inventory WHERE plt_num = $1")
            .bind(pallet_number.as_str())
            .fetch_one(&self.pool)
            .await?;
        let inventory = InventoryRecord {
            product_code: row.try_get("product_code")?,
            await_qty: row.try_get("await_qty")?,
        };

        let slate = sqlx::query("SELECT batch_num, first_off, setter FROM record_slate WHERE plt_num = $1")
            .bind(pallet_number.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| -> Result<SlateRecord> {
                Ok(SlateRecord {
                    batch_number: row.try_get("batch_num")?,
                    first_off: row.try_get("first_off")?,
                    setter: row.try_get("setter")?,
                })
            })
            .transpose()?;

        let grn = sqlx::query(
            r#"
            SELECT grn_ref, sup_code, material_code, gross_weight, net_weight,
                   pallet, package, pallet_count, package_count
            FROM record_grn
            WHERE plt_num = $1
            "#,
        )
        .bind(pallet_number.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(|row| -> Result<GrnRecord> {
            Ok(GrnRecord {
                grn_ref: row.try_get("grn_ref")?,
                supplier_code: row.try_get("sup_code")?,
                material_code: row.try_get("material_code")?,
                gross_weight: row.try_get("gross_weight")?,
                net_weight: row.try_get("net_weight")?,
                pallet_type: row.try_get("pallet")?,
                package_type: row.try_get("package")?,
                pallet_count: row.try_get::<i32, _>("pallet_count")? as u32,
                package_count: row.try_get::<i32, _>("package_count")? as u32,
            })
        })
        .transpose()?;

        Ok(Some(PalletRecordSet {
            pallet,
            history,
            inventory,
            slate,
            grn,
        }))
    }

    async fn order_progress(
        &self,
        order_ref: &str,
        product_code: &str,
    ) -> Result<Option<OrderProgress>> {
        let row = sqlx::query(
            "SELECT required_qty, remain_qty FROM record_aco WHERE order_ref = $1 AND code = $2",
        )
        .bind(order_ref)
        .bind(product_code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(OrderProgress {
                order_ref: order_ref.to_string(),
                product_code: product_code.to_string(),
                required_qty: row.try_get("required_qty")?,
                remaining_qty: row.try_get("remain_qty")?,
            })),
            None => Ok(None),
        }
    }

    async fn update_order_progress(
        &self,
        order_ref: &str,
        product_code: &str,
        quantity: i64,
    ) -> Result<OrderProgress> {
        let row = sqlx::query(
            r#"
            UPDATE record_aco
            SET remain_qty = remain_qty - $3
            WHERE order_ref = $1 AND code = $2 AND remain_qty >= $3
            RETURNING required_qty, remain_qty
            "#,
        )
        .bind(order_ref)
        .bind(product_code)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(OrderProgress {
                order_ref: order_ref.to_string(),
                product_code: product_code.to_string(),
                required_qty: row.try_get("required_qty")?,
                remaining_qty: row.try_get("remain_qty")?,
            }),
            None => match self.order_progress(order_ref, product_code).await? {
                Some(order) => Err(StoreError::InvalidState(format!(
                    "ACO order {order_ref} has {} remaining, cannot consume {quantity}",
                    order.remaining_qty
                ))),
                None => Err(StoreError::NotFound(format!(
                    "ACO order {order_ref} / {product_code}"
                ))),
            },
        }
    }

    async fn aco_pallet_count(&self, order_ref: &str) -> Result<u32> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM record_palletinfo WHERE plt_remark LIKE $1")
                .bind(format!("%ACO Ref : {}", order_ref.trim()))
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    async fn add_stock(&self, product_code: &str, delta: i64) -> Result<i64> {
        let level: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_level (product_code, stock_level)
            VALUES ($1, $2)
            ON CONFLICT (product_code) DO UPDATE
            SET stock_level = stock_level.stock_level + EXCLUDED.stock_level, updated_at = NOW()
            RETURNING stock_level
            "#,
        )
        .bind(product_code)
        .bind(delta)
        .fetch_one(&self.pool)
        .await?;
        Ok(level)
    }

    async fn stock_level(&self, product_code: &str) -> Result<i64> {
        let level: Option<i64> =
            sqlx::query_scalar("SELECT stock_level FROM stock_level WHERE product_code = $1")
                .bind(product_code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(level.unwrap_or(0))
    }

    async fn add_work_level(
        &self,
        clock_number: &str,
        label_kind: &str,
        pallets: u32,
        quantity: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO work_level (clock_number, work_date, label_kind, pallets, quantity)
            VALUES ($1, CURRENT_DATE, $2, $3, $4)
            ON CONFLICT (clock_number, work_date, label_kind) DO UPDATE
            SET pallets = work_level.pallets + EXCLUDED.pallets,
                quantity = work_level.quantity + EXCLUDED.quantity
            "#,
        )
        .bind(clock_number)
        .bind(label_kind)
        .bind(pallets as i32)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionLog for PostgresPalletStore {
    async fn append(
        &self,
        batch_id: BatchId,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<u32> {
        let sequence: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO transaction_journal (batch_id, sequence, kind, payload)
            SELECT $1, COALESCE(MAX(sequence), 0) + 1, $2, $3
            FROM transaction_journal
            WHERE batch_id = $1
            RETURNING sequence
            "#,
        )
        .bind(batch_id.as_uuid())
        .bind(kind)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                return StoreError::Transient(format!("concurrent journal append for {batch_id}"));
            }
            StoreError::Database(e)
        })?;
        Ok(sequence as u32)
    }

    async fn entries(&self, batch_id: BatchId) -> Result<Vec<JournalEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT batch_id, sequence, kind, payload, recorded_at
            FROM transaction_journal
            WHERE batch_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(batch_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<JournalEntry> {
                Ok(JournalEntry {
                    batch_id: BatchId::from_uuid(row.try_get::<Uuid, _>("batch_id")?),
                    sequence: row.try_get::<i32, _>("sequence")? as u32,
                    kind: row.try_get("kind")?,
                    payload: row.try_get("payload")?,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }
}
