//! Authentication and decoding of inbound provider webhooks.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` over the raw request body.
pub const SIGNATURE_HEADER: &str = "X-Signature";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("missing webhook signature")]
    MissingSignature,

    #[error("malformed webhook signature")]
    MalformedSignature,

    #[error("webhook signature mismatch")]
    InvalidSignature,

    #[error("malformed webhook body: {0}")]
    MalformedBody(String),
}

/// Closed set of provider events the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    DocumentUploaded,
    SignatureRequested,
    SignatureCompleted { signer_order: u32 },
    AllSignedCompleted,
    NextSignerReady { signer_order: u32 },
    /// Event types added by the provider after this build; acknowledged and ignored.
    Unknown { event_type: String },
}

impl ProviderEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::DocumentUploaded => "document.uploaded",
            Self::SignatureRequested => "signature.requested",
            Self::SignatureCompleted { .. } => "signature.completed",
            Self::AllSignedCompleted => "signature.all_completed",
            Self::NextSignerReady { .. } => "signature.next_signer_ready",
            Self::Unknown { event_type } => event_type,
        }
    }
}

/// An authenticated, decoded webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEvent {
    pub event_id: String,
    pub provider_request_id: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub event: ProviderEvent,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(deserialize_with = "id_string")]
    event_id: String,
    event_type: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    data: EnvelopeData,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeData {
    #[serde(default, deserialize_with = "optional_id_string")]
    submission_id: Option<String>,
    #[serde(default)]
    signer_order: Option<u32>,
}

/// Verifies webhooks against the shared secret configured with the provider.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn verify(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<VerifiedEvent, VerificationError> {
        verify(raw_body, signature_header, &self.secret)
    }

    /// Produces the header value the provider would send for `raw_body`.
    pub fn sign(&self, raw_body: &[u8]) -> String {
        let digest = mac_bytes(&self.secret, raw_body).unwrap_or_default();
        format!("{SIGNATURE_PREFIX}{}", hex::encode(digest))
    }
}

/// Authenticates `raw_body` and decodes it.
///
/// Nothing is parsed before the signature has been checked.
pub fn verify(
    raw_body: &[u8],
    signature_header: Option<&str>,
    secret: &[u8],
) -> Result<VerifiedEvent, VerificationError> {
    let header = signature_header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(VerificationError::MissingSignature)?;
    let hex_digest = header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(VerificationError::MalformedSignature)?;
    let provided = hex::decode(hex_digest).map_err(|_| VerificationError::MalformedSignature)?;

    let expected = mac_bytes(secret, raw_body)?;
    if provided.len() != expected.len() || !bool::from(provided.ct_eq(&expected)) {
        return Err(VerificationError::InvalidSignature);
    }

    decode(raw_body)
}

fn mac_bytes(secret: &[u8], body: &[u8]) -> Result<Vec<u8>, VerificationError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| VerificationError::InvalidSignature)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn decode(raw_body: &[u8]) -> Result<VerifiedEvent, VerificationError> {
    let envelope: Envelope = serde_json::from_slice(raw_body)
        .map_err(|e| VerificationError::MalformedBody(e.to_string()))?;

    if envelope.event_id.trim().is_empty() {
        return Err(VerificationError::MalformedBody("empty event_id".to_string()));
    }

    let signer_order = |event_type: &str| {
        envelope.data.signer_order.ok_or_else(|| {
            VerificationError::MalformedBody(format!("{event_type} requires data.signer_order"))
        })
    };

    // Events that move a signer forward are useless without a submission to route to.
    let submission_id = |event_type: &str| {
        if envelope.data.submission_id.is_some() {
            Ok(())
        } else {
            Err(VerificationError::MalformedBody(format!(
                "{event_type} requires data.submission_id"
            )))
        }
    };

    let event = match envelope.event_type.as_str() {
        "document.uploaded" => ProviderEvent::DocumentUploaded,
        "signature.requested" => ProviderEvent::SignatureRequested,
        "signature.completed" => {
            submission_id("signature.completed")?;
            ProviderEvent::SignatureCompleted {
                signer_order: signer_order("signature.completed")?,
            }
        }
        "signature.all_completed" => {
            submission_id("signature.all_completed")?;
            ProviderEvent::AllSignedCompleted
        }
        "signature.next_signer_ready" => {
            submission_id("signature.next_signer_ready")?;
            ProviderEvent::NextSignerReady {
                signer_order: signer_order("signature.next_signer_ready")?,
            }
        }
        other => ProviderEvent::Unknown {
            event_type: other.to_string(),
        },
    };

    Ok(VerifiedEvent {
        event_id: envelope.event_id,
        provider_request_id: envelope.data.submission_id,
        occurred_at: envelope.timestamp,
        event,
    })
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(value) => Ok(Some(value)),
        Value::Number(value) => Ok(Some(value.to_string())),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}
