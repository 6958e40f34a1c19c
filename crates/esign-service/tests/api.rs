use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use esign_adapters::{FixtureProvider, InMemoryDocumentVault, RecordingNotifier};
use esign_core::{
    InMemoryEventStore, InMemoryRequestStore, NotificationIntent, OrchestrationService,
    OrchestratorConfig, WebhookVerifier,
};
use esign_service::{build_router, ProviderKind, ServiceConfig, ServiceState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "whsec_api";

struct TestApp {
    router: Router,
    provider: Arc<FixtureProvider>,
    notifier: Arc<RecordingNotifier>,
    vault: Arc<InMemoryDocumentVault>,
}

fn test_app() -> TestApp {
    let provider = Arc::new(FixtureProvider::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let vault = Arc::new(InMemoryDocumentVault::new());
    let service = OrchestrationService::new(
        provider.clone(),
        Arc::new(InMemoryRequestStore::new()),
        Arc::new(InMemoryEventStore::new()),
        notifier.clone(),
        vault.clone(),
        WebhookVerifier::new(SECRET),
        OrchestratorConfig::default(),
    );
    let state = ServiceState::from_parts(Arc::new(service), "memory", ProviderKind::Fixture);
    TestApp {
        router: build_router(state, 1024 * 1024),
        provider,
        notifier,
        vault,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn webhook(event_id: &str, event_type: &str, submission: &str, order: Option<u32>) -> Request<Body> {
    let mut data = json!({ "submission_id": submission });
    if let Some(order) = order {
        data["signer_order"] = json!(order);
    }
    let raw = json!({
        "event_id": event_id,
        "event_type": event_type,
        "timestamp": "2024-05-01T10:00:00Z",
        "data": data,
    })
    .to_string();
    let signature = WebhookVerifier::new(SECRET).sign(raw.as_bytes());
    Request::builder()
        .method("POST")
        .uri("/webhooks/signing")
        .header("content-type", "application/json")
        .header("X-Signature", signature)
        .body(Body::from(raw))
        .unwrap()
}

fn create_payload(mode: &str) -> Value {
    json!({
        "contract_id": "contract-9",
        "initiator_id": "user-1",
        "document_base64": base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.7 lease"),
        "filename": "lease.pdf",
        "mode": mode,
        "signers": [
            { "name": "Alice", "email": "alice@example.com", "order": 1 },
            { "name": "Bob", "email": "bob@example.com", "order": 2 }
        ]
    })
}

async fn create(app: &TestApp, mode: &str) -> Value {
    let (status, body) = send(
        &app.router,
        post_json("/v1/signature-requests", &create_payload(mode)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

fn submission(request: &Value) -> String {
    request["provider_request_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_backends() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage_backend"], "memory");
    assert_eq!(body["provider"], "fixture");
}

#[tokio::test]
async fn create_notifies_only_first_sequential_signer() {
    let app = test_app();
    let request = create(&app, "sequential").await;

    assert_eq!(request["status"], "pending");
    assert_eq!(request["signatories"][0]["status"], "pending");
    assert_eq!(request["signatories"][1]["status"], "waiting");

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        NotificationIntent::NotifyNextSigner { email, .. } if email == "alice@example.com"
    ));
}

#[tokio::test]
async fn signed_webhooks_drive_request_to_completion() {
    let app = test_app();
    let request = create(&app, "sequential").await;
    let id = request["id"].as_str().unwrap().to_string();
    let sub = submission(&request);

    let (status, body) = send(
        &app.router,
        webhook("evt-1", "signature.completed", &sub, Some(1)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");

    let (_, body) = send(
        &app.router,
        webhook("evt-1", "signature.completed", &sub, Some(1)),
    )
    .await;
    assert_eq!(body["status"], "duplicate");

    app.provider.complete_signer(&sub, 1).unwrap();
    app.provider.complete_signer(&sub, 2).unwrap();
    let (status, body) = send(
        &app.router,
        webhook("evt-2", "signature.completed", &sub, Some(2)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");

    let (status, body) = send(&app.router, get(&format!("/v1/signature-requests/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body["signed_pdf_ref"].is_string());
    assert!(app.vault.get(Uuid::parse_str(&id).unwrap()).is_some());
}

#[tokio::test]
async fn out_of_order_webhook_reconciles_against_provider() {
    let app = test_app();
    let request = create(&app, "sequential").await;
    let id = request["id"].as_str().unwrap().to_string();
    let sub = submission(&request);

    // Signer 1's webhook was lost; the provider knows both have signed.
    app.provider.complete_signer(&sub, 1).unwrap();
    app.provider.complete_signer(&sub, 2).unwrap();

    let (status, body) = send(
        &app.router,
        webhook("evt-late", "signature.completed", &sub, Some(2)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");

    let (_, body) = send(&app.router, get(&format!("/v1/signature-requests/{id}"))).await;
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn unsigned_or_forged_webhooks_are_rejected() {
    let app = test_app();
    let request = create(&app, "sequential").await;
    let sub = submission(&request);

    let unsigned = Request::builder()
        .method("POST")
        .uri("/webhooks/signing")
        .body(Body::from(
            json!({ "event_id": "e", "event_type": "signature.completed" }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app.router, unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["retryable"], false);

    let mut forged = webhook("evt-x", "signature.completed", &sub, Some(1));
    forged
        .headers_mut()
        .insert("x-signature", format!("sha256={}", "0".repeat(64)).parse().unwrap());
    let (status, _) = send(&app.router, forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_for_unknown_submission_is_acknowledged() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        webhook("evt-9", "signature.completed", "fixture-sub-999", Some(1)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unknown_request");
}

#[tokio::test]
async fn cancel_is_final() {
    let app = test_app();
    let request = create(&app, "parallel").await;
    let id = request["id"].as_str().unwrap().to_string();
    let sub = submission(&request);

    let (status, body) = send(
        &app.router,
        post_empty(&format!("/v1/signature-requests/{id}/cancel")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert!(app.provider.is_archived(&sub));

    let (status, body) = send(
        &app.router,
        post_empty(&format!("/v1/signature-requests/{id}/cancel")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["retryable"], false);

    let (status, body) = send(
        &app.router,
        webhook("evt-after-cancel", "signature.completed", &sub, Some(1)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn reminders_are_throttled() {
    let app = test_app();
    let request = create(&app, "sequential").await;
    let id = request["id"].as_str().unwrap().to_string();
    let alice = request["signatories"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/v1/signature-requests/{id}/signatories/{alice}/remind");

    let (status, body) = send(&app.router, post_empty(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reminders_sent"], 1);

    let response = app.router.clone().oneshot(post_empty(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn rejects_invalid_create_input() {
    let app = test_app();
    let mut payload = create_payload("sequential");
    payload["signers"][1]["order"] = json!(3);

    let (status, body) = send(&app.router, post_json("/v1/signature-requests", &payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("order"));

    payload = create_payload("sequential");
    payload["document_base64"] = json!("not base64!");
    let (status, _) = send(&app.router, post_json("/v1/signature-requests", &payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let app = test_app();
    let (status, _) = send(
        &app.router,
        get(&format!("/v1/signature-requests/{}", Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lists_requests_for_contract() {
    let app = test_app();
    create(&app, "sequential").await;
    create(&app, "parallel").await;

    let (status, body) = send(
        &app.router,
        get("/v1/contracts/contract-9/signature-requests"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (_, body) = send(&app.router, get("/v1/contracts/other/signature-requests")).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn bootstrap_tolerates_callback_registration() {
    let mut config = ServiceConfig::default();
    config.provider_kind = ProviderKind::Fixture;
    config.webhook.secret = SECRET.to_string();
    config.webhook.callback_url = "https://esign.example/webhooks/signing".to_string();

    let state = ServiceState::bootstrap(&config).await.unwrap();
    assert_eq!(state.provider_kind, ProviderKind::Fixture);
    assert_eq!(state.storage_label, "memory");
}

#[tokio::test]
async fn bootstrap_requires_webhook_secret() {
    let config = ServiceConfig::default();
    assert!(ServiceState::bootstrap(&config).await.is_err());
}

#[tokio::test]
async fn bootstrap_refuses_unconfigured_http_provider() {
    let mut config = ServiceConfig::default();
    config.webhook.secret = SECRET.to_string();
    assert_eq!(config.provider_kind, ProviderKind::Http);
    assert!(ServiceState::bootstrap(&config).await.is_err());
}
