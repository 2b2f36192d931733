//! Batch inspection and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::BatchId;
use saga::BatchRecord;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CancelResponse {
    pub batch_id: String,
    pub status: &'static str,
}

/// GET /batches/{id}: the batch as recorded in the transaction journal.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchRecord>, ApiError> {
    let batch_id = parse_batch_id(&id)?;
    let record = state
        .saga
        .get_batch(batch_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Batch {id} not found")))?;
    Ok(Json(record))
}

/// POST /batches/{id}/cancel: cancel a running batch.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let batch_id = parse_batch_id(&id)?;
    if !state.cancel(batch_id) {
        return Err(ApiError::NotFound(format!("Batch {id} is not running")));
    }
    tracing::info!(%batch_id, "batch cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            batch_id: batch_id.to_string(),
            status: "cancelling",
        }),
    ))
}

fn parse_batch_id(id: &str) -> Result<BatchId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid batch id: {e}")))?;
    Ok(BatchId::from_uuid(uuid))
}
