//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryBlobStorage, PrintSaga, RecordingPrinter, SagaConfig, TextPdfRenderer};
use store::InMemoryPalletStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let state = api::create_default_state(SagaConfig::immediate());
    api::create_app(state, get_metrics_handle())
}

/// An app over a store pinned to 2024-05-21, with direct access to the
/// in-memory collaborators.
fn setup_with_store(
    config: SagaConfig,
) -> (axum::Router, InMemoryPalletStore, InMemoryBlobStorage) {
    let store = InMemoryPalletStore::with_date(NaiveDate::from_ymd_opt(2024, 5, 21).unwrap());
    let storage = InMemoryBlobStorage::new();
    let saga = PrintSaga::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(TextPdfRenderer),
        Arc::new(storage.clone()),
        Arc::new(RecordingPrinter::new()),
        config,
    );
    let state = Arc::new(api::AppState::new(Arc::new(saga), Arc::new(store.clone())));
    (api::create_app(state, get_metrics_handle()), store, storage)
}

fn qc_body(clock: &str, count: u32) -> serde_json::Value {
    serde_json::json!({
        "product": {
            "code": "ME6060150",
            "description": "Manhole cover",
            "product_type": "Standard"
        },
        "clock_number": clock,
        "quantity": 10,
        "count": count
    })
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["running_batches"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_submit_qc_batch() {
    let app = setup();

    let response = app
        .oneshot(post_json("/labels/qc", &qc_body("5997", 2)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["partial"], false);
    assert_eq!(json["summary"], "All 2 labels printed.");
    assert_eq!(json["succeeded"].as_array().unwrap().len(), 2);
    assert_eq!(json["artifacts"].as_array().unwrap().len(), 2);
    assert_eq!(json["stock_level"], 20);
    assert_eq!(json["printed"], true);
}

#[tokio::test]
async fn test_submit_aco_batch_with_context() {
    let (app, store, _) = setup_with_store(SagaConfig::immediate());
    store.insert_order(domain::OrderProgress::new("123456", "MHALFWG", 100));

    let body = serde_json::json!({
        "product": { "code": "MHALFWG", "description": "Half wedge", "product_type": "ACO" },
        "clock_number": "5997",
        "quantity": 25,
        "count": 2,
        "context": { "type": "aco", "order_ref": "123456", "new_order": false }
    });
    let response = app.oneshot(post_json("/labels/qc", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["order_progress"]["remaining_qty"], 50);
}

#[tokio::test]
async fn test_invalid_batch_is_bad_request() {
    let app = setup();

    let response = app
        .oneshot(post_json("/labels/qc", &qc_body("5997", 0)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["reason"], "validation");
    assert!(json["error"].as_str().unwrap().starts_with("Nothing was printed"));
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = setup();

    let response = app
        .oneshot(post_json("/labels/qc", &serde_json::json!({ "clock_number": "5997" })))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_cooldown_is_too_many_requests() {
    let config = SagaConfig {
        cooldown_ms: 60_000,
        ..SagaConfig::immediate()
    };
    let (app, _, _) = setup_with_store(config);

    let first = app
        .clone()
        .oneshot(post_json("/labels/qc", &qc_body("5997", 1)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_json("/labels/qc", &qc_body("5997", 1)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = read_json(second).await;
    assert_eq!(json["reason"], "cooldown");
}

#[tokio::test]
async fn test_submit_grn_batch() {
    let (app, _, storage) = setup_with_store(SagaConfig::immediate());

    let body = serde_json::json!({
        "product": { "code": "RM-PLASTIC", "description": "Plastic granules" },
        "clock_number": "6001",
        "grn_number": "GRN1001",
        "supplier_code": "SUP01",
        "gross_weights": [500.0, 480.0],
        "pallet_type": "whiteDry",
        "package_type": "still"
    });
    let response = app.oneshot(post_json("/labels/grn", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["succeeded"].as_array().unwrap().len(), 2);
    assert!(storage.has_object("grn-labels", "20240521_002.pdf"));
}

#[tokio::test]
async fn test_batch_record_after_submit() {
    let app = setup();
    let batch_id = uuid::Uuid::new_v4();
    let mut body = qc_body("5997", 2);
    body["batch_id"] = serde_json::json!(batch_id);

    let response = app
        .clone()
        .oneshot(post_json("/labels/qc", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get(&format!("/batches/{batch_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["state"], "completed");
    assert_eq!(json["confirmed"].as_array().unwrap().len(), 2);
    assert_eq!(json["history"][0], "reserving");
}

#[tokio::test]
async fn test_unknown_and_invalid_batch_ids() {
    let app = setup();

    let response = app
        .clone()
        .oneshot(get(&format!("/batches/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(get("/batches/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            &format!("/batches/{}/cancel", uuid::Uuid::new_v4()),
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_running_batch() {
    let (app, store, storage) = setup_with_store(SagaConfig::immediate());
    for n in 1..=3 {
        storage.delay_upload_for(&format!("20240521_00{n}.pdf"), Duration::from_millis(300));
    }
    let batch_id = uuid::Uuid::new_v4();
    let mut body = qc_body("5997", 3);
    body["batch_id"] = serde_json::json!(batch_id);

    let submit = tokio::spawn(app.clone().oneshot(post_json("/labels/qc", &body)));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cancel = app
        .clone()
        .oneshot(post_json(
            &format!("/batches/{batch_id}/cancel"),
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::ACCEPTED);

    let response = submit.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = read_json(response).await;
    assert_eq!(json["reason"], "cancelled");
    assert_eq!(store.count_in_state(store::IdentifierState::Reserved), 0);
    assert_eq!(store.count_in_state(store::IdentifierState::Confirmed), 0);
}

#[tokio::test]
async fn test_pallet_and_stock_lookup() {
    let (app, _, _) = setup_with_store(SagaConfig::immediate());
    let response = app
        .clone()
        .oneshot(post_json("/labels/qc", &qc_body("5997", 2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/pallets?number=20240521%2F002"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["pallet"]["product_code"], "ME6060150");
    assert_eq!(json["pallet"]["product_qty"], 10);
    assert_eq!(
        json["pallet"]["pdf_url"],
        "memory://qc-labels/20240521_002.pdf"
    );

    let response = app
        .clone()
        .oneshot(get("/pallets?number=20240521%2F099"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get("/pallets?number=garbage"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get("/stock/ME6060150")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["stock_level"], 20);
}

#[tokio::test]
async fn test_progress_event_stream() {
    let app = setup();

    let response = app.oneshot(get("/events")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert_eq!(content_type, "text/event-stream");
}
