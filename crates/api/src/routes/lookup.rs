//! Pallet and stock lookups.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::PalletNumber;
use domain::PalletRecordSet;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PalletQuery {
    pub number: String,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_code: String,
    pub stock_level: i64,
}

/// GET /pallets?number=: rows written for one pallet.
#[tracing::instrument(skip(state))]
pub async fn pallet(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PalletQuery>,
) -> Result<Json<PalletRecordSet>, ApiError> {
    let pallet_number = PalletNumber::parse(query.number.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid pallet number: {e}")))?;
    let record = state
        .store
        .get_record(&pallet_number)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Pallet {pallet_number} not found")))?;
    Ok(Json(record))
}

/// GET /stock/{product_code}: current stock level.
#[tracing::instrument(skip(state))]
pub async fn stock(
    State(state): State<Arc<AppState>>,
    Path(product_code): Path<String>,
) -> Result<Json<StockResponse>, ApiError> {
    let stock_level = state.store.stock_level(&product_code).await?;
    Ok(Json(StockResponse {
        product_code,
        stock_level,
    }))
}
