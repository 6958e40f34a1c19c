#![deny(unsafe_code)]

pub mod config;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use chrono::{DateTime, Utc};
use esign_adapters::{FixtureProvider, FsDocumentVault, InMemoryDocumentVault, LoggingNotifier};
use esign_core::webhook::SIGNATURE_HEADER;
use esign_core::{
    bootstrap_storage, DocumentVault, EsignError, HttpProviderClient, NewSignatureRequest,
    NewSigner, OrchestrationService, ProviderError, SignatureRequest, Signatory, SigningMode,
    SigningProvider, WebhookVerifier,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

pub use config::{ProviderKind, ServiceConfig};

#[derive(Clone)]
pub struct ServiceState {
    pub service: Arc<OrchestrationService>,
    pub storage_label: &'static str,
    pub provider_kind: ProviderKind,
}

impl ServiceState {
    pub async fn bootstrap(config: &ServiceConfig) -> Result<Self, ServiceError> {
        config.validate().map_err(ServiceError::Config)?;

        let provider: Arc<dyn SigningProvider> = match config.provider_kind {
            ProviderKind::Http => Arc::new(HttpProviderClient::new(&config.provider)?),
            ProviderKind::Fixture => {
                warn!("using the fixture signing provider; no real signatures are collected");
                Arc::new(FixtureProvider::new())
            }
        };

        let storage = bootstrap_storage(&config.storage).await?;
        let vault: Arc<dyn DocumentVault> = if config.vault_dir.trim().is_empty() {
            Arc::new(InMemoryDocumentVault::new())
        } else {
            Arc::new(FsDocumentVault::new(config.vault_dir.trim()))
        };

        if let Some(url) = config.webhook.callback_url() {
            ensure_webhook_registered(provider.as_ref(), url, &config.webhook.secret).await;
        }

        let service = OrchestrationService::new(
            provider,
            storage.requests,
            storage.events,
            Arc::new(LoggingNotifier),
            vault,
            WebhookVerifier::new(config.webhook.secret.as_bytes()),
            config.orchestrator.clone(),
        );
        info!(
            storage = storage.label,
            provider = config.provider_kind.name(),
            "signature orchestration service ready"
        );

        Ok(Self::from_parts(
            Arc::new(service),
            storage.label,
            config.provider_kind,
        ))
    }

    pub fn from_parts(
        service: Arc<OrchestrationService>,
        storage_label: &'static str,
        provider_kind: ProviderKind,
    ) -> Self {
        Self {
            service,
            storage_label,
            provider_kind,
        }
    }
}

/// Registers `url` with the provider unless it is already subscribed.
///
/// Failure is logged and tolerated; webhooks can be registered out of band.
async fn ensure_webhook_registered(provider: &dyn SigningProvider, url: &str, secret: &str) {
    match provider.list_webhooks().await {
        Ok(existing) if existing.iter().any(|w| w.url == url) => {
            info!(url, "webhook already registered");
            return;
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "could not list provider webhooks"),
    }

    match provider.register_webhook(url, secret).await {
        Ok(registration) => info!(url, webhook_id = %registration.id, "webhook registered"),
        Err(err) => warn!(url, error = %err, "webhook registration failed"),
    }
}

pub fn build_router(state: ServiceState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/webhooks/signing", post(receive_webhook))
        .route("/v1/health", get(health))
        .route("/v1/signature-requests", post(create_request))
        .route("/v1/signature-requests/:id", get(get_request))
        .route("/v1/signature-requests/:id/cancel", post(cancel_request))
        .route(
            "/v1/signature-requests/:id/signatories/:signatory_id/remind",
            post(remind_signatory),
        )
        .route("/v1/signature-requests/:id/resubmit", post(resubmit_request))
        .route(
            "/v1/signature-requests/:id/signed-document/refresh",
            post(refresh_signed_document),
        )
        .route(
            "/v1/contracts/:contract_id/signature-requests",
            get(list_for_contract),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("core error: {0}")]
    Core(#[from] EsignError),
    #[error("provider client error: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] EsignError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// HTTP status for a core error. Retryable provider failures map to 503 so that the
/// provider redelivers webhooks and operators know to try again.
fn status_for(err: &EsignError) -> StatusCode {
    match err {
        EsignError::VerificationFailed(_) => StatusCode::UNAUTHORIZED,
        EsignError::NotFound(_) => StatusCode::NOT_FOUND,
        EsignError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EsignError::AlreadyTerminal { .. }
        | EsignError::InvalidState(_)
        | EsignError::PreconditionViolation(_) => StatusCode::CONFLICT,
        EsignError::ReminderThrottled { .. } => StatusCode::TOO_MANY_REQUESTS,
        EsignError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        EsignError::Provider(ProviderError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
        EsignError::Provider(provider) if provider.is_retryable() => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        EsignError::Provider(
            ProviderError::Ambiguous { .. }
            | ProviderError::ClientError { .. }
            | ProviderError::Decode(_),
        ) => StatusCode::BAD_GATEWAY,
        EsignError::Provider(_) | EsignError::Serialization(_) | EsignError::Notifier(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => (
                status,
                Json(serde_json::json!({ "error": message, "retryable": false })),
            )
                .into_response(),
            ApiError::Core(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    warn!(error = %err, status = status.as_u16(), "request failed");
                }
                let body = Json(serde_json::json!({
                    "error": err.to_string(),
                    "retryable": err.is_retryable(),
                }));
                let mut response = (status, body).into_response();
                if let EsignError::ReminderThrottled { retry_after_secs } = err {
                    if let Ok(value) = HeaderValue::from_str(&retry_after_secs.max(1).to_string())
                    {
                        response.headers_mut().insert(header::RETRY_AFTER, value);
                    }
                }
                response
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    storage_backend: &'static str,
    provider: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "esign-service",
        storage_backend: state.storage_label,
        provider: state.provider_kind.name(),
    })
}

#[derive(Debug, Clone, Serialize)]
struct WebhookResponse {
    status: &'static str,
}

/// The body is taken as raw bytes; it is parsed only after the signature checks out.
async fn receive_webhook(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let ack = state.service.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookResponse { status: ack.name() }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSignatureRequestBody {
    pub contract_id: String,
    pub initiator_id: String,
    /// PDF bytes, standard base64.
    pub document_base64: String,
    #[serde(default)]
    pub filename: Option<String>,
    pub signers: Vec<NewSigner>,
    #[serde(default)]
    pub mode: Option<SigningMode>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreateSignatureRequestBody {
    fn into_input(self) -> Result<NewSignatureRequest, ApiError> {
        let document = base64::engine::general_purpose::STANDARD
            .decode(self.document_base64.trim())
            .map_err(|e| ApiError::bad_request(format!("document_base64 is not valid base64: {e}")))?;
        Ok(NewSignatureRequest {
            contract_id: self.contract_id,
            initiator_id: self.initiator_id,
            document,
            filename: self.filename.unwrap_or_default(),
            signers: self.signers,
            mode: self.mode.unwrap_or(SigningMode::Sequential),
            expires_at: self.expires_at,
        })
    }
}

async fn create_request(
    State(state): State<ServiceState>,
    Json(body): Json<CreateSignatureRequestBody>,
) -> Result<(StatusCode, Json<SignatureRequest>), ApiError> {
    let request = state.service.create_request(body.into_input()?).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_request(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SignatureRequest>, ApiError> {
    Ok(Json(state.service.get_status(id).await?))
}

#[derive(Debug, Clone, Serialize)]
struct ContractRequestsResponse {
    contract_id: String,
    total: usize,
    items: Vec<SignatureRequest>,
}

async fn list_for_contract(
    State(state): State<ServiceState>,
    Path(contract_id): Path<String>,
) -> Result<Json<ContractRequestsResponse>, ApiError> {
    let items = state.service.list_for_contract(&contract_id).await?;
    Ok(Json(ContractRequestsResponse {
        contract_id,
        total: items.len(),
        items,
    }))
}

async fn cancel_request(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SignatureRequest>, ApiError> {
    Ok(Json(state.service.cancel(id).await?))
}

async fn remind_signatory(
    State(state): State<ServiceState>,
    Path((id, signatory_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Signatory>, ApiError> {
    Ok(Json(state.service.remind(id, signatory_id).await?))
}

async fn resubmit_request(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SignatureRequest>, ApiError> {
    Ok(Json(state.service.resubmit(id).await?))
}

async fn refresh_signed_document(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SignatureRequest>, ApiError> {
    Ok(Json(state.service.refresh_signed_document(id).await?))
}
