//! reqwest-backed client for a DocuSeal-style signing API.

use super::error::ProviderError;
use super::retry::{CallSafety, RetryPolicy};
use super::{
    validate_signer_specs, DocumentRef, ProviderConfig, ProviderSignerState, ProviderStatus,
    SignerHandle, SignerSpec, SigningProvider, WebhookRegistration,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const AUTH_HEADER: &str = "X-Auth-Token";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
const WEBHOOK_EVENTS: &[&str] = &[
    "document.uploaded",
    "signature.requested",
    "signature.completed",
    "signature.all_completed",
    "signature.next_signer_ready",
];

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

#[derive(Debug, Serialize)]
struct SubmitterBody<'a> {
    name: &'a str,
    email: &'a str,
    order: u32,
}

#[derive(Debug, Serialize)]
struct CreateSubmissionBody<'a> {
    document_id: &'a str,
    send_email: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expire_at: Option<DateTime<Utc>>,
    submitters: Vec<SubmitterBody<'a>>,
}

#[derive(Debug, Deserialize)]
struct SubmitterResponse {
    #[serde(deserialize_with = "string_or_number")]
    submission_id: String,
    email: String,
    slug: String,
    order: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitterStatusResponse {
    order: u32,
    status: String,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SubmissionResponse {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    status: String,
    submitters: Vec<SubmitterStatusResponse>,
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    url: String,
}

/// HTTP client for the signing provider.
///
/// Every attempt is bounded by the configured request timeout; retries follow the
/// [`RetryPolicy`]. The client holds no signing state.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    supports_idempotency_key: bool,
}

impl HttpProviderClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        if config.base_url.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(
                "provider base_url is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| ProviderError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: RetryPolicy::from_config(config),
            supports_idempotency_key: config.supports_idempotency_key,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request
            .header(AUTH_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| classify_transport(operation, e))?;

        let status = response.status();
        debug!(operation, status = status.as_u16(), "provider responded");
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), retry_after, truncate(&body, 320)))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = self.send(operation, request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(format!("{operation}: {e}")))
    }
}

#[async_trait]
impl SigningProvider for HttpProviderClient {
    async fn upload_document(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<DocumentRef, ProviderError> {
        let url = self.url("documents");
        let url = url.as_str();
        let this = self;

        let uploaded: UploadResponse = self
            .retry
            .run("upload_document", CallSafety::Idempotent, move || async move {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                    .file_name(filename.to_string())
                    .mime_str("application/pdf")
                    .map_err(|e| ProviderError::InvalidRequest(format!("invalid mime type: {e}")))?;
                let form = reqwest::multipart::Form::new().part("file", part);
                this.send_json("upload_document", this.client.post(url).multipart(form))
                    .await
            })
            .await?;

        Ok(DocumentRef::new(uploaded.id))
    }

    async fn create_batch_signature_requests(
        &self,
        document: &DocumentRef,
        signers: &[SignerSpec],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<SignerHandle>, ProviderError> {
        validate_signer_specs(signers)?;

        let body = CreateSubmissionBody {
            document_id: &document.id,
            send_email: false,
            expire_at: expires_at,
            submitters: signers
                .iter()
                .map(|s| SubmitterBody {
                    name: &s.name,
                    email: &s.email,
                    order: s.order,
                })
                .collect(),
        };
        let body = &body;
        let url = self.url("submissions");
        let url = url.as_str();
        let this = self;

        // One key per logical create so every attempt is deduplicated provider-side.
        let (safety, idempotency_key) = if self.supports_idempotency_key {
            (CallSafety::Idempotent, Some(Uuid::new_v4().to_string()))
        } else {
            (CallSafety::NonIdempotent, None)
        };
        let idempotency_key = idempotency_key.as_deref();

        let submitters: Vec<SubmitterResponse> = self
            .retry
            .run("create_batch_signature_requests", safety, move || async move {
                let mut request = this.client.post(url).json(body);
                if let Some(key) = idempotency_key {
                    request = request.header(IDEMPOTENCY_HEADER, key);
                }
                this.send_json("create_batch_signature_requests", request)
                    .await
            })
            .await?;

        order_handles(signers, submitters)
    }

    async fn get_request_status(
        &self,
        provider_request_id: &str,
    ) -> Result<ProviderStatus, ProviderError> {
        let url = self.url(&format!("submissions/{provider_request_id}"));
        let url = url.as_str();
        let this = self;

        let submission: SubmissionResponse = self
            .retry
            .run("get_request_status", CallSafety::Idempotent, move || async move {
                this.send_json("get_request_status", this.client.get(url))
                    .await
            })
            .await?;

        Ok(to_provider_status(submission))
    }

    async fn download_signed_document(
        &self,
        provider_request_id: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = self.url(&format!("submissions/{provider_request_id}/documents/download"));
        let url = url.as_str();
        let this = self;

        self.retry
            .run("download_signed_document", CallSafety::Idempotent, move || async move {
                let response = this
                    .send("download_signed_document", this.client.get(url))
                    .await?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| classify_transport("download_signed_document", e))?;
                Ok(bytes.to_vec())
            })
            .await
    }

    async fn register_webhook(
        &self,
        url: &str,
        secret: &str,
    ) -> Result<WebhookRegistration, ProviderError> {
        let endpoint = self.url("webhooks");
        let endpoint = endpoint.as_str();
        let payload = json!({
            "url": url,
            "secret": secret,
            "events": WEBHOOK_EVENTS,
        });
        let payload = &payload;
        let this = self;

        // Re-registering the same URL is harmless, so retries are safe.
        let registered: WebhookResponse = self
            .retry
            .run("register_webhook", CallSafety::Idempotent, move || async move {
                this.send_json("register_webhook", this.client.post(endpoint).json(payload))
                    .await
            })
            .await?;

        Ok(WebhookRegistration {
            id: registered.id,
            url: registered.url,
        })
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookRegistration>, ProviderError> {
        let url = self.url("webhooks");
        let url = url.as_str();
        let this = self;

        let hooks: Vec<WebhookResponse> = self
            .retry
            .run("list_webhooks", CallSafety::Idempotent, move || async move {
                this.send_json("list_webhooks", this.client.get(url)).await
            })
            .await?;

        Ok(hooks
            .into_iter()
            .map(|hook| WebhookRegistration {
                id: hook.id,
                url: hook.url,
            })
            .collect())
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ProviderError> {
        let url = self.url(&format!("webhooks/{webhook_id}"));
        self.delete("delete_webhook", &url).await
    }

    async fn delete_document(&self, document: &DocumentRef) -> Result<(), ProviderError> {
        let url = self.url(&format!("documents/{}", document.id));
        self.delete("delete_document", &url).await
    }

    async fn archive_request(&self, provider_request_id: &str) -> Result<(), ProviderError> {
        let url = self.url(&format!("submissions/{provider_request_id}"));
        self.delete("archive_request", &url).await
    }
}

impl HttpProviderClient {
    async fn delete(&self, operation: &'static str, url: &str) -> Result<(), ProviderError> {
        let this = self;
        let result = self
            .retry
            .run(operation, CallSafety::Idempotent, move || async move {
                this.send(operation, this.client.delete(url)).await.map(|_| ())
            })
            .await;

        match result {
            // Already gone counts as deleted.
            Err(ProviderError::ClientError { status: 404, .. }) => Ok(()),
            other => other,
        }
    }
}

fn classify_transport(operation: &'static str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout { operation }
    } else if err.is_connect() {
        ProviderError::Network {
            message: err.to_string(),
            request_sent: false,
        }
    } else if err.is_builder() {
        ProviderError::InvalidRequest(err.to_string())
    } else {
        ProviderError::Network {
            message: err.to_string(),
            request_sent: true,
        }
    }
}

fn classify_status(status: u16, retry_after: Option<Duration>, message: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after },
        400..=499 => ProviderError::ClientError { status, message },
        _ => ProviderError::ServerError { status, message },
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Re-orders provider handles to match the input signer order.
fn order_handles(
    signers: &[SignerSpec],
    submitters: Vec<SubmitterResponse>,
) -> Result<Vec<SignerHandle>, ProviderError> {
    if submitters.len() != signers.len() {
        return Err(ProviderError::Decode(format!(
            "expected {} signer handles, provider returned {}",
            signers.len(),
            submitters.len()
        )));
    }

    let mut handles = Vec::with_capacity(signers.len());
    for signer in signers {
        let submitter = submitters
            .iter()
            .find(|s| s.order == signer.order)
            .ok_or_else(|| {
                ProviderError::Decode(format!(
                    "provider response is missing signer order {}",
                    signer.order
                ))
            })?;
        handles.push(SignerHandle {
            provider_request_id: submitter.submission_id.clone(),
            order: submitter.order,
            email: submitter.email.clone(),
            signing_token: submitter.slug.clone(),
        });
    }

    Ok(handles)
}

fn to_provider_status(submission: SubmissionResponse) -> ProviderStatus {
    let mut signers: Vec<ProviderSignerState> = submission
        .submitters
        .into_iter()
        .map(|s| ProviderSignerState {
            order: s.order,
            completed: s.status.eq_ignore_ascii_case("completed"),
            completed_at: s.completed_at,
        })
        .collect();
    signers.sort_by_key(|s| s.order);

    ProviderStatus {
        provider_request_id: submission.id,
        status: submission.status,
        signers,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let head: String = value.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn spec(name: &str, order: u32) -> SignerSpec {
        SignerSpec {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            order,
        }
    }

    fn submitter(order: u32) -> SubmitterResponse {
        SubmitterResponse {
            submission_id: "sub-1".to_string(),
            email: format!("s{order}@example.com"),
            slug: format!("slug-{order}"),
            order,
        }
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(429, Some(Duration::from_secs(3)), String::new()),
            ProviderError::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            classify_status(404, None, "missing".to_string()),
            ProviderError::ClientError { status: 404, .. }
        ));
        assert!(matches!(
            classify_status(503, None, String::new()),
            ProviderError::ServerError { status: 503, .. }
        ));
    }

    #[test]
    fn retry_after_header_is_parsed_as_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn handles_follow_input_order() {
        let signers = vec![spec("Alice", 1), spec("Bob", 2)];
        let handles = order_handles(&signers, vec![submitter(2), submitter(1)]).unwrap();
        assert_eq!(handles[0].order, 1);
        assert_eq!(handles[0].signing_token, "slug-1");
        assert_eq!(handles[1].order, 2);
    }

    #[test]
    fn partial_batch_response_is_rejected() {
        let signers = vec![spec("Alice", 1), spec("Bob", 2)];
        let err = order_handles(&signers, vec![submitter(1)]).unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[test]
    fn submission_ids_accept_numbers() {
        let parsed: SubmissionResponse = serde_json::from_value(json!({
            "id": 42,
            "status": "pending",
            "submitters": [
                { "order": 2, "status": "awaiting", "completed_at": null },
                { "order": 1, "status": "completed", "completed_at": "2024-01-01T00:00:00Z" }
            ]
        }))
        .unwrap();
        let status = to_provider_status(parsed);
        assert_eq!(status.provider_request_id, "42");
        assert_eq!(status.signers[0].order, 1);
        assert!(status.signers[0].completed);
        assert!(!status.signers[1].completed);
    }

    #[tokio::test]
    async fn invalid_batch_fails_before_network() {
        let client =
            HttpProviderClient::new(&ProviderConfig::new("http://127.0.0.1:9", "key")).unwrap();
        let err = client
            .create_batch_signature_requests(
                &DocumentRef::new("doc"),
                &[spec("Alice", 1), SignerSpec {
                    name: String::new(),
                    email: "x@example.com".to_string(),
                    order: 2,
                }],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_missing_base_url() {
        assert!(HttpProviderClient::new(&ProviderConfig::new("", "key")).is_err());
    }
}
