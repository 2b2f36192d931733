//! Label print endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::BatchId;
use domain::{GrnDetails, PrintBatch, ProductInfo, QcDetails};
use saga::PrintOutcome;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct QcLabelRequest {
    /// Caller-chosen batch id, so the batch can be cancelled while it runs.
    #[serde(default)]
    pub batch_id: Option<uuid::Uuid>,
    pub product: ProductInfo,
    pub clock_number: String,
    #[serde(flatten)]
    pub details: QcDetails,
}

#[derive(Deserialize)]
pub struct GrnLabelRequest {
    #[serde(default)]
    pub batch_id: Option<uuid::Uuid>,
    pub product: ProductInfo,
    pub clock_number: String,
    #[serde(flatten)]
    pub details: GrnDetails,
}

// -- Response types --

#[derive(Serialize)]
pub struct PrintResponse {
    pub summary: String,
    pub partial: bool,
    pub errors: Vec<String>,
    #[serde(flatten)]
    pub outcome: PrintOutcome,
}

impl From<PrintOutcome> for PrintResponse {
    fn from(outcome: PrintOutcome) -> Self {
        Self {
            summary: outcome.summary(),
            partial: outcome.is_partial(),
            errors: outcome.errors(),
            outcome,
        }
    }
}

// -- Handlers --

/// POST /labels/qc: print a QC batch.
#[tracing::instrument(skip(state, req), fields(product_code = %req.product.code))]
pub async fn submit_qc(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QcLabelRequest>,
) -> Result<Json<PrintResponse>, ApiError> {
    let mut batch = PrintBatch::qc(req.product, req.clock_number, req.details);
    if let Some(id) = req.batch_id {
        batch.batch_id = BatchId::from_uuid(id);
    }
    run(&state, batch).await
}

/// POST /labels/grn: print a GRN batch.
#[tracing::instrument(skip(state, req), fields(product_code = %req.product.code))]
pub async fn submit_grn(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GrnLabelRequest>,
) -> Result<Json<PrintResponse>, ApiError> {
    let mut batch = PrintBatch::grn(req.product, req.clock_number, req.details);
    if let Some(id) = req.batch_id {
        batch.batch_id = BatchId::from_uuid(id);
    }
    run(&state, batch).await
}

async fn run(state: &AppState, batch: PrintBatch) -> Result<Json<PrintResponse>, ApiError> {
    let in_flight = state.begin(batch.batch_id)?;
    let outcome = state
        .saga
        .submit_print_batch(batch, in_flight.token())
        .await?;
    Ok(Json(outcome.into()))
}
