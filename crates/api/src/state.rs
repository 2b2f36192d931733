//! Shared application state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use common::BatchId;
use saga::PrintSaga;
use store::PalletStore;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub saga: Arc<PrintSaga>,
    pub store: Arc<dyn PalletStore>,
    in_flight: Mutex<HashMap<BatchId, CancellationToken>>,
}

impl AppState {
    pub fn new(saga: Arc<PrintSaga>, store: Arc<dyn PalletStore>) -> Self {
        Self {
            saga,
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a batch as running so it can be cancelled.
    ///
    /// The registration is removed when the returned guard is dropped.
    pub fn begin(&self, batch_id: BatchId) -> Result<InFlight<'_>, ApiError> {
        let mut in_flight = self.lock();
        if in_flight.contains_key(&batch_id) {
            return Err(ApiError::Conflict(format!(
                "Batch {batch_id} is already running"
            )));
        }
        let token = CancellationToken::new();
        in_flight.insert(batch_id, token.clone());
        Ok(InFlight {
            state: self,
            batch_id,
            token,
        })
    }

    /// Cancels a running batch. Returns false if no such batch is running.
    pub fn cancel(&self, batch_id: BatchId) -> bool {
        match self.lock().get(&batch_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every running batch and returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let in_flight = self.lock();
        for token in in_flight.values() {
            token.cancel();
        }
        in_flight.len()
    }

    pub fn running(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BatchId, CancellationToken>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A running batch's registration in [`AppState`].
pub struct InFlight<'a> {
    state: &'a AppState,
    batch_id: BatchId,
    token: CancellationToken,
}

impl InFlight<'_> {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().remove(&self.batch_id);
    }
}
