//! External signing provider boundary.
//!
//! The orchestrator only ever talks to the provider through [`SigningProvider`], so the HTTP
//! client can be replaced by a fixture or a test double.

mod error;
mod http;
mod retry;

pub use crate::config::ProviderConfig;
pub use error::ProviderError;
pub use http::HttpProviderClient;
pub use retry::{CallSafety, RetryPolicy};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque provider reference to an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Signer entry of a batch creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSpec {
    pub name: String,
    pub email: String,
    pub order: u32,
}

/// Provider-side handle for one signer of a created batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerHandle {
    pub provider_request_id: String,
    pub order: u32,
    pub email: String,
    pub signing_token: String,
}

/// Provider's view of one signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSignerState {
    pub order: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Provider's authoritative view of a signature request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider_request_id: String,
    pub status: String,
    pub signers: Vec<ProviderSignerState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRegistration {
    pub id: String,
    pub url: String,
}

/// Transport to the external signing service.
///
/// Implementations are stateless with respect to signing state; they own transport concerns
/// (timeouts, retries, authentication) only.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    async fn upload_document(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<DocumentRef, ProviderError>;

    /// Creates one provider-side request for all signers. Handles are returned in input order.
    async fn create_batch_signature_requests(
        &self,
        document: &DocumentRef,
        signers: &[SignerSpec],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<SignerHandle>, ProviderError>;

    async fn get_request_status(
        &self,
        provider_request_id: &str,
    ) -> Result<ProviderStatus, ProviderError>;

    async fn download_signed_document(
        &self,
        provider_request_id: &str,
    ) -> Result<Vec<u8>, ProviderError>;

    async fn register_webhook(
        &self,
        url: &str,
        secret: &str,
    ) -> Result<WebhookRegistration, ProviderError>;

    async fn list_webhooks(&self) -> Result<Vec<WebhookRegistration>, ProviderError>;

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ProviderError>;

    /// Removes an uploaded document that never became part of a signature request.
    async fn delete_document(&self, document: &DocumentRef) -> Result<(), ProviderError>;

    /// Stops a provider-side request from accepting further signatures.
    async fn archive_request(&self, provider_request_id: &str) -> Result<(), ProviderError>;
}

/// Rejects structurally invalid batches before any network I/O.
pub fn validate_signer_specs(signers: &[SignerSpec]) -> Result<(), ProviderError> {
    if signers.is_empty() {
        return Err(ProviderError::InvalidRequest(
            "batch requires at least one signer".to_string(),
        ));
    }

    for (index, signer) in signers.iter().enumerate() {
        if signer.name.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(format!(
                "signer #{} has an empty name",
                index + 1
            )));
        }
        if signer.email.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(format!(
                "signer #{} has an empty email",
                index + 1
            )));
        }
    }

    Ok(())
}
