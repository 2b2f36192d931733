//! Identifier pool: reservation, verification, confirmation and release of
//! pallet identifiers.

use std::collections::HashSet;
use std::sync::Arc;

use common::Identifier;
use domain::ValidationError;
use store::{PalletStore, ReleaseReport};

use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::telemetry::SagaTelemetry;

/// Outcome of one allocation attempt.
enum Attempt {
    Retry(String),
    Abort(SagaError),
}

/// Hands out unique identifiers from the shared counter in the system of
/// record.
///
/// Every reservation is verified against existing records before it is
/// returned. Any inconsistency fails the attempt closed: nothing from that
/// attempt is returned and the attempt is retried with backoff.
#[derive(Clone)]
pub struct IdentifierPool {
    store: Arc<dyn PalletStore>,
    config: SagaConfig,
    telemetry: Arc<dyn SagaTelemetry>,
}

impl IdentifierPool {
    pub fn new(
        store: Arc<dyn PalletStore>,
        config: SagaConfig,
        telemetry: Arc<dyn SagaTelemetry>,
    ) -> Self {
        Self {
            store,
            config,
            telemetry,
        }
    }

    /// Reserves exactly `count` identifiers sorted by ascending sequence.
    ///
    /// Transient allocation races and collisions are retried up to
    /// `max_reserve_retries` times with capped exponential backoff.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, count: usize) -> Result<Vec<Identifier>> {
        if count == 0 {
            return Err(ValidationError::InvalidCount.into());
        }
        if count > self.config.max_batch_size {
            return Err(ValidationError::CountTooLarge {
                count,
                max: self.config.max_batch_size,
            }
            .into());
        }

        let max_attempts = self.config.max_reserve_retries.max(1);
        let mut last_cause = String::new();

        for attempt in 1..=max_attempts {
            match self.try_reserve(count).await {
                Ok(identifiers) => return Ok(identifiers),
                Err(Attempt::Abort(err)) => return Err(err),
                Err(Attempt::Retry(cause)) => {
                    if attempt < max_attempts {
                        let backoff = self.config.backoff(attempt);
                        self.telemetry.reserve_retry(attempt, &cause, backoff);
                        if !backoff.is_zero() {
                            tokio::time::sleep(backoff).await;
                        }
                    }
                    last_cause = cause;
                }
            }
        }

        Err(SagaError::AllocationExhausted {
            attempts: max_attempts,
            last_cause,
        })
    }

    async fn try_reserve(&self, count: usize) -> std::result::Result<Vec<Identifier>, Attempt> {
        let mut identifiers = match self.store.allocate_identifiers(count).await {
            Ok(ids) => ids,
            Err(e) if e.is_transient() => return Err(Attempt::Retry(e.to_string())),
            Err(e) => return Err(Attempt::Abort(e.into())),
        };
        identifiers.sort();

        let distinct: HashSet<_> = identifiers.iter().map(|id| &id.pallet_number).collect();
        if identifiers.len() != count || distinct.len() != count {
            let cause = format!(
                "allocation returned {} identifiers ({} distinct), expected {count}",
                identifiers.len(),
                distinct.len()
            );
            self.release_quietly(&identifiers).await;
            return Err(Attempt::Retry(cause));
        }

        let mut collided = Vec::new();
        for id in &identifiers {
            match self.store.check_exists(&id.pallet_number).await {
                Ok(true) => collided.push(id.clone()),
                Ok(false) => {}
                Err(e) => {
                    self.release_quietly(&identifiers).await;
                    return Err(Attempt::Retry(format!(
                        "existence check for {} failed: {e}",
                        id.pallet_number
                    )));
                }
            }
        }

        if !collided.is_empty() {
            let numbers: Vec<String> = collided
                .iter()
                .map(|id| id.pallet_number.to_string())
                .collect();
            self.telemetry.collision_detected(&numbers);

            let _ = self.retire(&collided).await;
            let clean: Vec<Identifier> = identifiers
                .into_iter()
                .filter(|id| !collided.contains(id))
                .collect();
            self.release_quietly(&clean).await;

            return Err(Attempt::Retry(format!(
                "identifier collision on {}",
                numbers.join(", ")
            )));
        }

        Ok(identifiers)
    }

    /// Marks identifiers permanently used.
    #[tracing::instrument(skip(self, identifiers), fields(count = identifiers.len()))]
    pub async fn confirm(&self, identifiers: &[Identifier]) -> Result<()> {
        if identifiers.is_empty() {
            return Ok(());
        }
        self.store.confirm_identifiers(identifiers).await?;
        Ok(())
    }

    /// Returns reserved identifiers to the pool, deleting any rows written
    /// under them.
    ///
    /// Confirmed and unknown identifiers are skipped, so calling this twice
    /// is harmless. Numbers still backed by another writer's rows come back
    /// in [`ReleaseReport::retired`]. Callers on a compensation path should
    /// treat an error as a warning and carry on.
    #[tracing::instrument(skip(self, identifiers), fields(count = identifiers.len()))]
    pub async fn release(&self, identifiers: &[Identifier]) -> Result<ReleaseReport> {
        if identifiers.is_empty() {
            return Ok(ReleaseReport::default());
        }
        match self.store.release_identifiers(identifiers).await {
            Ok(report) => {
                tracing::debug!(
                    released = report.released.len(),
                    retired = report.retired.len(),
                    records_removed = report.records_removed,
                    "identifiers released"
                );
                Ok(report)
            }
            Err(e) => {
                self.telemetry.release_failed(&e.to_string());
                Err(e.into())
            }
        }
    }

    /// Takes identifiers out of circulation for good.
    pub async fn retire(&self, identifiers: &[Identifier]) -> Result<()> {
        if identifiers.is_empty() {
            return Ok(());
        }
        self.store.retire_identifiers(identifiers).await.map_err(|e| {
            self.telemetry.release_failed(&e.to_string());
            e.into()
        })
    }

    async fn release_quietly(&self, identifiers: &[Identifier]) {
        let _ = self.release(identifiers).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{RecordingTelemetry, TelemetryRecord};
    use chrono::NaiveDate;
    use store::{IdentifierState, InMemoryPalletStore};

    fn pool_with(store: &InMemoryPalletStore, config: SagaConfig) -> (IdentifierPool, RecordingTelemetry) {
        let telemetry = RecordingTelemetry::new();
        let pool = IdentifierPool::new(
            Arc::new(store.clone()),
            config,
            Arc::new(telemetry.clone()),
        );
        (pool, telemetry)
    }

    fn store() -> InMemoryPalletStore {
        InMemoryPalletStore::with_date(NaiveDate::from_ymd_opt(2024, 5, 21).unwrap())
    }

    #[tokio::test]
    async fn test_reserve_returns_sorted_identifiers() {
        let store = store();
        let (pool, _) = pool_with(&store, SagaConfig::immediate());

        let ids = pool.reserve(3).await.unwrap();
        let numbers: Vec<&str> = ids.iter().map(|i| i.pallet_number.as_str()).collect();
        assert_eq!(numbers, vec!["20240521/001", "20240521/002", "20240521/003"]);
    }

    #[tokio::test]
    async fn test_reserve_rejects_bad_counts_without_allocating() {
        let store = store();
        let (pool, _) = pool_with(&store, SagaConfig::immediate());

        assert!(matches!(
            pool.reserve(0).await.unwrap_err(),
            SagaError::Validation(ValidationError::InvalidCount)
        ));
        assert!(matches!(
            pool.reserve(101).await.unwrap_err(),
            SagaError::Validation(ValidationError::CountTooLarge { count: 101, max: 100 })
        ));
        assert_eq!(store.allocation_calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = store();
        store.fail_next_allocations(2);
        let (pool, telemetry) = pool_with(&store, SagaConfig::immediate());

        let ids = pool.reserve(2).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.allocation_calls(), 3);
        assert_eq!(telemetry.retry_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_name_last_cause() {
        let store = store();
        store.fail_next_allocations(10);
        let config = SagaConfig {
            max_reserve_retries: 3,
            ..SagaConfig::immediate()
        };
        let (pool, _) = pool_with(&store, config);

        match pool.reserve(1).await.unwrap_err() {
            SagaError::AllocationExhausted {
                attempts,
                last_cause,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_cause.contains("concurrent allocation"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.allocation_calls(), 3);
    }

    #[tokio::test]
    async fn test_non_transient_failure_aborts_immediately() {
        let store = store();
        store.set_allocation_unavailable(true);
        let (pool, _) = pool_with(&store, SagaConfig::immediate());

        assert!(matches!(pool.reserve(1).await.unwrap_err(), SagaError::Store(_)));
        assert_eq!(store.allocation_calls(), 1);
    }

    #[tokio::test]
    async fn test_collision_fails_closed_and_retries() {
        let store = store();
        store.inject_colliding_allocations(1);
        let (pool, telemetry) = pool_with(&store, SagaConfig::immediate());

        let ids = pool.reserve(2).await.unwrap();

        // The collided number is retired, the clean one is reused.
        let numbers: Vec<&str> = ids.iter().map(|i| i.pallet_number.as_str()).collect();
        assert_eq!(numbers, vec!["20240521/002", "20240521/003"]);
        assert_eq!(
            store
                .identifier_state(&common::PalletNumber::new("20240521", 1))
                .await
                .unwrap(),
            Some(IdentifierState::Confirmed)
        );
        assert!(telemetry
            .records()
            .iter()
            .any(|r| matches!(r, TelemetryRecord::CollisionDetected { .. })));
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_keeps_confirmed() {
        let store = store();
        let (pool, _) = pool_with(&store, SagaConfig::immediate());

        let ids = pool.reserve(2).await.unwrap();
        pool.confirm(&ids[..1]).await.unwrap();

        pool.release(&ids).await.unwrap();
        pool.release(&ids).await.unwrap();

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
    async fn test_collision_cause_names_the_pallet_number() {
        let store = store();
        store.inject_colliding_allocations(5);
        let config = SagaConfig {
            max_reserve_retries: 2,
            ..SagaConfig::immediate()
        };
        let (pool, _) = pool_with(&store, config);

        match pool.reserve(1).await.unwrap_err() {
            SagaError::AllocationExhausted { last_cause, .. } => {
                assert_eq!(last_cause, "identifier collision on 20240521/002");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_release_failure_is_reported() {
        let store = store();
        let (pool, telemetry) = pool_with(&store, SagaConfig::immediate());
        let ids = pool.reserve(1).await.unwrap();

        store.set_fail_on_release(true);
        assert!(pool.release(&ids).await.is_err());
        assert!(telemetry
            .records()
            .iter()
            .any(|r| matches!(r, TelemetryRecord::ReleaseFailed { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_overlap() {
        let store = store();
        let (pool, _) = pool_with(&store, SagaConfig::immediate());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.reserve(7).await }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap().unwrap() {
                assert!(seen.insert(id.pallet_number));
            }
        }
        assert_eq!(seen.len(), 70);
    }
}
