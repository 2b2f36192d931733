//! Print saga coordinator: reserve, write, generate, confirm or release,
//! update aggregates, print.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use common::{BatchId, Identifier, PalletNumber};
use domain::{LabelData, PrintBatch};
use futures_util::FutureExt;
use store::{PalletStore, TransactionLog};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::artifact::{ArtifactGenerator, PdfArtifact};
use crate::config::SagaConfig;
use crate::error::{ArtifactError, Result, SagaError, WriteError};
use crate::events::{BatchEvent, ProgressEvent, ProgressStatus};
use crate::outcome::{ItemFailure, PrintOutcome};
use crate::pool::IdentifierPool;
use crate::record::BatchRecord;
use crate::services::{BlobStorage, LabelPrinter, PdfRenderer, PrintDocument, PrintJob};
use crate::state::PrintState;
use crate::telemetry::{SagaTelemetry, TracingTelemetry};
use crate::writer::{RecordContext, RecordWriter};

const PROGRESS_CAPACITY: usize = 1024;

fn join_numbers(numbers: &[PalletNumber]) -> String {
    numbers
        .iter()
        .map(PalletNumber::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One pallet that made it through record writing.
struct WrittenItem {
    index: usize,
    identifier: Identifier,
    quantity: i64,
}

/// Mutable bookkeeping for one batch while it runs.
struct BatchRun {
    batch_id: BatchId,
    state: PrintState,
    reserved: Vec<Identifier>,
    /// Identifiers whose rows were written by this batch.
    written: HashSet<PalletNumber>,
    confirmed: HashSet<PalletNumber>,
    released: HashSet<PalletNumber>,
    retired: HashSet<PalletNumber>,
    failures: Vec<ItemFailure>,
    warnings: Vec<String>,
    journal_degraded: bool,
}

impl BatchRun {
    fn new(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            state: PrintState::Idle,
            reserved: Vec::new(),
            written: HashSet::new(),
            confirmed: HashSet::new(),
            released: HashSet::new(),
            retired: HashSet::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            journal_degraded: false,
        }
    }

    /// Reserved identifiers that are not confirmed, released or retired yet.
    fn outstanding(&self) -> Vec<Identifier> {
        self.reserved
            .iter()
            .filter(|id| {
                !self.confirmed.contains(&id.pallet_number)
                    && !self.released.contains(&id.pallet_number)
                    && !self.retired.contains(&id.pallet_number)
            })
            .cloned()
            .collect()
    }
}

/// Orchestrates print batches end to end.
///
/// Each call to [`PrintSaga::submit_print_batch`] drives one batch through
/// the [`PrintState`] machine. Identifiers that were reserved but not
/// confirmed are always released before a batch ends in `Failed`.
pub struct PrintSaga {
    store: Arc<dyn PalletStore>,
    journal: Arc<dyn TransactionLog>,
    pool: IdentifierPool,
    writer: RecordWriter,
    generator: ArtifactGenerator,
    printer: Arc<dyn LabelPrinter>,
    telemetry: Arc<dyn SagaTelemetry>,
    config: SagaConfig,
    cooldowns: Mutex<HashMap<String, Instant>>,
    progress: broadcast::Sender<ProgressEvent>,
}

impl PrintSaga {
    /// Creates a new print saga reporting through [`TracingTelemetry`].
    pub fn new(
        store: Arc<dyn PalletStore>,
        journal: Arc<dyn TransactionLog>,
        renderer: Arc<dyn PdfRenderer>,
        storage: Arc<dyn BlobStorage>,
        printer: Arc<dyn LabelPrinter>,
        config: SagaConfig,
    ) -> Self {
        Self::with_telemetry(
            store,
            journal,
            renderer,
            storage,
            printer,
            config,
            Arc::new(TracingTelemetry),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_telemetry(
        store: Arc<dyn PalletStore>,
        journal: Arc<dyn TransactionLog>,
        renderer: Arc<dyn PdfRenderer>,
        storage: Arc<dyn BlobStorage>,
        printer: Arc<dyn LabelPrinter>,
        config: SagaConfig,
        telemetry: Arc<dyn SagaTelemetry>,
    ) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            pool: IdentifierPool::new(store.clone(), config.clone(), telemetry.clone()),
            writer: RecordWriter::new(store.clone()),
            generator: ArtifactGenerator::new(renderer, storage, store.clone(), config.clone()),
            store,
            journal,
            printer,
            telemetry,
            config,
            cooldowns: Mutex::new(HashMap::new()),
            progress,
        }
    }

    /// Subscribes to progress events of every batch.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Runs one print batch to a terminal state.
    ///
    /// Cooldown and validation are checked before anything is reserved.
    /// Cancelling `cancel` stops the batch at the next stage boundary or
    /// before the next artifact task, releases every unconfirmed identifier
    /// and returns [`SagaError::CancelledByUser`].
    #[tracing::instrument(
        skip(self, batch, cancel),
        fields(batch_id = %batch.batch_id, kind = batch.kind_name(), count = batch.pallet_count())
    )]
    pub async fn submit_print_batch(
        &self,
        batch: PrintBatch,
        cancel: CancellationToken,
    ) -> Result<PrintOutcome> {
        let clock = batch.clock_number.trim().to_string();
        let previous = match self.acquire_cooldown(&clock) {
            Ok(previous) => previous,
            Err(e) => {
                self.telemetry.batch_rejected(e.reason());
                return Err(e);
            }
        };

        if let Err(e) = self.admit(&batch).await {
            self.restore_cooldown(&clock, previous);
            self.telemetry.batch_rejected(e.reason());
            return Err(e);
        }

        let started = Instant::now();
        let mut run = BatchRun::new(batch.batch_id);
        self.telemetry
            .batch_started(run.batch_id, batch.kind_name(), batch.pallet_count());
        self.journal(
            &mut run,
            BatchEvent::submitted(
                batch.batch_id,
                batch.kind_name(),
                batch.product.code.clone(),
                clock,
                batch.pallet_count(),
            ),
        )
        .await;

        match self.execute(&mut run, &batch, &cancel).await {
            Ok(outcome) => {
                self.journal(&mut run, BatchEvent::finished(PrintState::Completed, None))
                    .await;
                self.telemetry.batch_finished(
                    run.batch_id,
                    PrintState::Completed,
                    started.elapsed(),
                    None,
                );
                Ok(outcome)
            }
            Err(err) => {
                self.fail(&mut run, &err).await;
                self.telemetry.batch_finished(
                    run.batch_id,
                    PrintState::Failed,
                    started.elapsed(),
                    Some(err.reason()),
                );
                Err(err)
            }
        }
    }

    /// Rebuilds a batch record from the journal.
    pub async fn get_batch(&self, batch_id: BatchId) -> Result<Option<BatchRecord>> {
        let entries = self.journal.entries(batch_id).await?;
        if entries.is_empty() {
            return Ok(None);
        }

        let mut record = BatchRecord::default();
        for entry in entries {
            let event: BatchEvent = serde_json::from_value(entry.payload)?;
            record.apply(event);
        }
        Ok(Some(record))
    }

    /// Validation that needs no reservation: the batch itself and, for
    /// existing ACO orders, the remaining quantity.
    async fn admit(&self, batch: &PrintBatch) -> Result<()> {
        batch.validate(self.config.max_batch_size)?;
        self.writer.check_order_capacity(batch).await?;
        Ok(())
    }

    async fn execute(
        &self,
        run: &mut BatchRun,
        batch: &PrintBatch,
        cancel: &CancellationToken,
    ) -> Result<PrintOutcome> {
        let quantities = batch.pallet_quantities()?;
        let net_weights = batch.net_weights()?;

        // Reserving
        self.transition(run, PrintState::Reserving).await?;
        Self::check_cancelled(cancel)?;
        let identifiers = self.pool.reserve(batch.pallet_count()).await?;
        run.reserved = identifiers.clone();
        self.journal(run, BatchEvent::reserved(&identifiers)).await;
        Self::check_cancelled(cancel)?;

        let aco_pallets_before = match self.writer.aco_pallets_before(batch).await {
            Ok(count) => count,
            Err(e) => {
                self.warn(run, format!("ACO pallet count unavailable: {e}"))
                    .await;
                0
            }
        };

        // WritingRecords
        self.transition(run, PrintState::WritingRecords).await?;
        let mut written = Vec::with_capacity(identifiers.len());
        for (index, identifier) in identifiers.iter().enumerate() {
            Self::check_cancelled(cancel)?;
            let ctx = RecordContext {
                batch,
                index,
                quantity: quantities[index],
                net_weight: net_weights.get(index).copied(),
            };
            match self.writer.create_records(identifier, &ctx).await {
                Ok(()) => {
                    run.written.insert(identifier.pallet_number.clone());
                    self.item_succeeded(run, PrintState::WritingRecords, index, identifier)
                        .await;
                    written.push(WrittenItem {
                        index,
                        identifier: identifier.clone(),
                        quantity: ctx.quantity,
                    });
                }
                Err(e @ WriteError::DuplicateIdentifier(_)) => {
                    self.item_failed(
                        run,
                        PrintState::WritingRecords,
                        index,
                        identifier,
                        e.to_string(),
                    )
                    .await;
                    return Err(e.into());
                }
                Err(e) => {
                    self.item_failed(
                        run,
                        PrintState::WritingRecords,
                        index,
                        identifier,
                        e.to_string(),
                    )
                    .await;
                }
            }
        }
        if written.is_empty() {
            return Err(SagaError::NoItemsSucceeded {
                failed: run.failures.len(),
            });
        }

        // GeneratingArtifacts
        self.transition(run, PrintState::GeneratingArtifacts).await?;
        Self::check_cancelled(cancel)?;
        let quantity_by_pallet: HashMap<PalletNumber, i64> = written
            .iter()
            .map(|item| (item.identifier.pallet_number.clone(), item.quantity))
            .collect();
        let mut artifacts = self
            .generate_artifacts(run, batch, written, aco_pallets_before, cancel)
            .await?;
        artifacts.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        if artifacts.is_empty() {
            return Err(SagaError::NoItemsSucceeded {
                failed: run.failures.len(),
            });
        }

        // Confirming
        self.transition(run, PrintState::Confirming).await?;
        let succeeded: Vec<Identifier> = artifacts.iter().map(|a| a.identifier.clone()).collect();
        self.pool.confirm(&succeeded).await?;
        run.confirmed
            .extend(succeeded.iter().map(|id| id.pallet_number.clone()));
        self.journal(run, BatchEvent::confirmed(&succeeded)).await;

        let failed_ids = run.outstanding();
        self.release(run, &failed_ids).await;

        // UpdatingAggregates
        self.transition(run, PrintState::UpdatingAggregates).await?;
        let confirmed_quantities: Vec<i64> = succeeded
            .iter()
            .filter_map(|id| quantity_by_pallet.get(&id.pallet_number).copied())
            .collect();
        let report = self.writer.apply_aggregates(batch, &confirmed_quantities).await;
        for warning in report.warnings {
            self.warn(run, warning).await;
        }

        let job = PrintJob {
            batch_id: run.batch_id,
            documents: artifacts
                .iter()
                .map(|a| PrintDocument {
                    pallet_number: a.identifier.pallet_number.clone(),
                    url: a.url.clone(),
                    bytes: a.bytes.clone(),
                })
                .collect(),
        };
        let printed = match self.printer.print(job).await {
            Ok(()) => true,
            Err(e) => {
                self.warn(run, e.to_string()).await;
                false
            }
        };

        self.transition(run, PrintState::Completed).await?;

        let mut failed = std::mem::take(&mut run.failures);
        failed.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        Ok(PrintOutcome {
            batch_id: run.batch_id,
            success: true,
            succeeded,
            failed,
            artifacts: artifacts.iter().map(PdfArtifact::reference).collect(),
            warnings: run.warnings.clone(),
            order_progress: report.order_progress,
            stock_level: report.stock_level,
            printed,
        })
    }

    /// Runs the artifact stage: sequentially for a single item, otherwise
    /// with at most `parallelism` tasks in flight. Returns the successful
    /// artifacts; failures are recorded on `run`.
    async fn generate_artifacts(
        &self,
        run: &mut BatchRun,
        batch: &PrintBatch,
        items: Vec<WrittenItem>,
        aco_pallets_before: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<PdfArtifact>> {
        let bucket = batch.bucket();
        let jobs: Vec<(usize, Identifier, LabelData)> = items
            .into_iter()
            .map(|item| {
                let label = LabelData::for_pallet(
                    batch,
                    &item.identifier,
                    item.index,
                    item.quantity,
                    aco_pallets_before,
                );
                (item.index, item.identifier, label)
            })
            .collect();

        let mut results: Vec<(usize, Identifier, std::result::Result<PdfArtifact, ArtifactError>)> =
            Vec::with_capacity(jobs.len());

        if jobs.len() == 1 {
            for (index, identifier, label) in jobs {
                Self::check_cancelled(cancel)?;
                let result = self.generator.generate(&identifier, &label, bucket).await;
                results.push((index, identifier, result));
            }
        } else {
            let semaphore = Arc::new(Semaphore::new(self.config.effective_parallelism()));
            let mut tasks = JoinSet::new();
            let mut pending: HashMap<usize, Identifier> = HashMap::new();

            for (index, identifier, label) in jobs {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    permit = semaphore.clone().acquire_owned() => {
                        permit.map_err(|e| SagaError::Unexpected {
                            stage: PrintState::GeneratingArtifacts,
                            reason: e.to_string(),
                        })?
                    }
                };

                pending.insert(index, identifier.clone());
                let generator = self.generator.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let result = AssertUnwindSafe(generator.generate(&identifier, &label, bucket))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(ArtifactError::Aborted(format!(
                                "generation task for {} panicked",
                                identifier.pallet_number
                            )))
                        });
                    (index, identifier, result)
                });
            }

            // In-flight tasks always run to completion, even after a cancel.
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, identifier, result)) => {
                        pending.remove(&index);
                        results.push((index, identifier, result));
                    }
                    Err(e) => tracing::error!(error = %e, "artifact task failed to join"),
                }
            }
            for (index, identifier) in pending {
                results.push((
                    index,
                    identifier,
                    Err(ArtifactError::Aborted("task ended without a result".to_string())),
                ));
            }
        }

        Self::check_cancelled(cancel)?;

        results.sort_by_key(|(index, _, _)| *index);
        let mut artifacts = Vec::with_capacity(results.len());
        for (index, identifier, result) in results {
            match result {
                Ok(artifact) => {
                    if let Some(warning) = &artifact.warning {
                        self.warn(run, warning.clone()).await;
                    }
                    self.item_succeeded(run, PrintState::GeneratingArtifacts, index, &identifier)
                        .await;
                    artifacts.push(artifact);
                }
                Err(e) => {
                    self.item_failed(
                        run,
                        PrintState::GeneratingArtifacts,
                        index,
                        &identifier,
                        e.to_string(),
                    )
                    .await;
                }
            }
        }
        Ok(artifacts)
    }

    /// Moves the run to `Failed`, releasing every outstanding identifier first.
    async fn fail(&self, run: &mut BatchRun, err: &SagaError) {
        let outstanding = run.outstanding();
        if !outstanding.is_empty() && run.state.can_transition_to(PrintState::ReleasingIdentifiers)
        {
            let _ = self.transition(run, PrintState::ReleasingIdentifiers).await;
        }
        self.release(run, &outstanding).await;

        if run.state.can_transition_to(PrintState::Failed) {
            let _ = self.transition(run, PrintState::Failed).await;
        }
        self.emit(ProgressEvent::stage(
            run.batch_id,
            PrintState::Failed,
            ProgressStatus::Failed {
                reason: err.user_message(),
            },
        ));
        self.journal(
            run,
            BatchEvent::finished(PrintState::Failed, Some(err.to_string())),
        )
        .await;
    }

    /// Best-effort release. Rows this batch wrote are deleted as their
    /// identifiers go back to the pool. If the release fails, identifiers
    /// with written rows are retired so their numbers never come back.
    /// Failures become warnings and are never returned.
    async fn release(&self, run: &mut BatchRun, identifiers: &[Identifier]) {
        if identifiers.is_empty() {
            return;
        }
        match self.pool.release(identifiers).await {
            Ok(report) => {
                let released: Vec<Identifier> = identifiers
                    .iter()
                    .filter(|id| report.released.contains(&id.pallet_number))
                    .cloned()
                    .collect();
                run.released.extend(report.released);
                if !released.is_empty() {
                    self.journal(run, BatchEvent::released(&released)).await;
                }
                if !report.retired.is_empty() {
                    let numbers = join_numbers(&report.retired);
                    run.retired.extend(report.retired);
                    self.warn(
                        run,
                        format!("identifiers retired, recorded by another writer: {numbers}"),
                    )
                    .await;
                }
            }
            Err(e) => {
                let written: Vec<Identifier> = identifiers
                    .iter()
                    .filter(|id| run.written.contains(&id.pallet_number))
                    .cloned()
                    .collect();
                let message = match self.pool.retire(&written).await {
                    Ok(()) if !written.is_empty() => {
                        let numbers: Vec<PalletNumber> =
                            written.iter().map(|id| id.pallet_number.clone()).collect();
                        let message = format!(
                            "identifiers not released: {e}; retired {}",
                            join_numbers(&numbers)
                        );
                        run.retired.extend(numbers);
                        message
                    }
                    Ok(()) => format!("identifiers not released: {e}"),
                    Err(retire_err) => {
                        format!("identifiers not released: {e}; not retired: {retire_err}")
                    }
                };
                self.warn(run, message).await;
            }
        }
    }

    async fn transition(&self, run: &mut BatchRun, to: PrintState) -> Result<()> {
        let from = run.state;
        if !from.can_transition_to(to) {
            return Err(SagaError::InvalidTransition { from, to });
        }
        run.state = to;
        self.telemetry.stage_entered(run.batch_id, to);
        self.emit(ProgressEvent::stage(run.batch_id, to, ProgressStatus::Entered));
        self.journal(run, BatchEvent::state_changed(from, to)).await;
        Ok(())
    }

    async fn item_succeeded(
        &self,
        run: &mut BatchRun,
        stage: PrintState,
        index: usize,
        identifier: &Identifier,
    ) {
        self.emit(ProgressEvent::item(
            run.batch_id,
            stage,
            index,
            ProgressStatus::Succeeded,
        ));
        self.journal(run, BatchEvent::item_succeeded(stage, index, identifier))
            .await;
    }

    async fn item_failed(
        &self,
        run: &mut BatchRun,
        stage: PrintState,
        index: usize,
        identifier: &Identifier,
        reason: String,
    ) {
        self.telemetry.item_failed(
            run.batch_id,
            stage,
            identifier.pallet_number.as_str(),
            &reason,
        );
        self.emit(ProgressEvent::item(
            run.batch_id,
            stage,
            index,
            ProgressStatus::Failed {
                reason: reason.clone(),
            },
        ));
        self.journal(
            run,
            BatchEvent::item_failed(stage, index, identifier, reason.clone()),
        )
        .await;
        run.failures.push(ItemFailure {
            index,
            identifier: identifier.clone(),
            stage,
            error: reason,
        });
    }

    async fn warn(&self, run: &mut BatchRun, message: String) {
        self.telemetry.warning(run.batch_id, &message);
        self.emit(ProgressEvent::stage(
            run.batch_id,
            run.state,
            ProgressStatus::Warning {
                message: message.clone(),
            },
        ));
        self.journal(run, BatchEvent::warning(message.clone())).await;
        run.warnings.push(message);
    }

    /// Appends to the journal. The first failure becomes a warning, later
    /// ones are dropped silently.
    async fn journal(&self, run: &mut BatchRun, event: BatchEvent) {
        let kind = event.kind();
        let result = match serde_json::to_value(&event) {
            Ok(payload) => self
                .journal
                .append(run.batch_id, kind, payload)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(e) = result
            && !run.journal_degraded
        {
            run.journal_degraded = true;
            let message = format!("transaction journal unavailable: {e}");
            self.telemetry.warning(run.batch_id, &message);
            run.warnings.push(message);
        }
    }

    fn emit(&self, event: ProgressEvent) {
        // No subscribers is fine.
        let _ = self.progress.send(event);
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(SagaError::CancelledByUser);
        }
        Ok(())
    }

    /// Rejects the batch if this operator had a batch accepted within the
    /// cooldown window; otherwise stamps now and returns the previous stamp.
    fn acquire_cooldown(&self, clock_number: &str) -> Result<Option<Instant>> {
        let window = self.config.cooldown();
        let mut cooldowns = self
            .cooldowns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        if let Some(last) = cooldowns.get(clock_number) {
            let elapsed = now.duration_since(*last);
            if elapsed < window {
                return Err(SagaError::CooldownActive {
                    remaining_ms: (window - elapsed).as_millis() as u64,
                });
            }
        }
        Ok(cooldowns.insert(clock_number.to_string(), now))
    }

    /// Puts back the stamp replaced by [`Self::acquire_cooldown`] when the
    /// batch was rejected by validation.
    fn restore_cooldown(&self, clock_number: &str, previous: Option<Instant>) {
        let mut cooldowns = self
            .cooldowns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match previous {
            Some(at) => cooldowns.insert(clock_number.to_string(), at),
            None => cooldowns.remove(clock_number),
        };
    }
}
