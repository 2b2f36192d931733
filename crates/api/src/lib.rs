//! HTTP API server for QC and GRN pallet label printing.
//!
//! Provides REST endpoints to submit, cancel and inspect print batches,
//! server-sent progress events and pallet/stock lookups, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    BlobStorage, FileBlobStorage, InMemoryBlobStorage, LabelPrinter, PrintSaga, RecordingPrinter,
    SagaConfig, SpoolPrinter, TextPdfRenderer,
};
use store::{InMemoryPalletStore, PalletStore, PostgresPalletStore, StoreError, TransactionLog};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/labels/qc", post(routes::labels::submit_qc))
        .route("/labels/grn", post(routes::labels::submit_grn))
        .route("/batches/{id}", get(routes::batches::get))
        .route("/batches/{id}/cancel", post(routes::batches::cancel))
        .route("/events", get(routes::events::stream))
        .route("/pallets", get(routes::lookup::pallet))
        .route("/stock/{product_code}", get(routes::lookup::stock))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over an in-memory store, storage and printer.
pub fn create_default_state(saga_config: SagaConfig) -> Arc<AppState> {
    let store = InMemoryPalletStore::new();
    let saga = PrintSaga::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(TextPdfRenderer),
        Arc::new(InMemoryBlobStorage::new()),
        Arc::new(RecordingPrinter::new()),
        saga_config,
    );
    Arc::new(AppState::new(Arc::new(saga), Arc::new(store)))
}

/// Creates application state from configuration.
///
/// Uses PostgreSQL when `DATABASE_URL` is set and runs its migrations;
/// otherwise everything is kept in memory.
pub async fn create_state(config: &Config) -> Result<Arc<AppState>, StoreError> {
    let (store, journal): (Arc<dyn PalletStore>, Arc<dyn TransactionLog>) =
        match &config.database_url {
            Some(url) => {
                let pg = PostgresPalletStore::connect(url, config.database_max_connections).await?;
                pg.run_migrations().await?;
                tracing::info!("using PostgreSQL store");
                (Arc::new(pg.clone()), Arc::new(pg))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                let memory = InMemoryPalletStore::new();
                (Arc::new(memory.clone()), Arc::new(memory))
            }
        };

    let storage: Arc<dyn BlobStorage> = match &config.label_storage_dir {
        Some(dir) => Arc::new(FileBlobStorage::new(dir, &config.label_public_base_url)),
        None => Arc::new(InMemoryBlobStorage::new()),
    };
    let printer: Arc<dyn LabelPrinter> = match &config.label_spool_dir {
        Some(dir) => Arc::new(SpoolPrinter::new(dir)),
        None => Arc::new(RecordingPrinter::new()),
    };

    let saga = PrintSaga::new(
        store.clone(),
        journal,
        Arc::new(TextPdfRenderer),
        storage,
        printer,
        config.saga.clone(),
    );
    Ok(Arc::new(AppState::new(Arc::new(saga), store)))
}
