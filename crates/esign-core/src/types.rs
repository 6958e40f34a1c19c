use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How signers of one request are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMode {
    /// Every signer is notified immediately and may sign in any order.
    Parallel,
    /// One active signer at a time, in ascending `order`.
    Sequential,
}

impl SigningMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        }
    }
}

/// Request-level lifecycle.
///
/// Moves forward only: `pending -> in_progress -> completed`, or to `cancelled`/`expired`
/// from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-signer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatoryStatus {
    /// Sequential mode, not yet this signer's turn.
    Waiting,
    /// Actionable now.
    Pending,
    /// Terminal success.
    Signed,
    /// The request expired before this signer signed.
    Expired,
}

impl SignatoryStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Signed => "signed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SignatoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signatory {
    pub id: Uuid,
    pub request_id: Uuid,
    pub order: u32,
    pub name: String,
    pub email: String,
    pub provider_signing_token: Option<String>,
    pub status: SignatoryStatus,
    pub signed_at: Option<DateTime<Utc>>,
    pub reminders_sent: u32,
    pub last_reminded_at: Option<DateTime<Utc>>,
}

impl Signatory {
    pub fn is_signed(&self) -> bool {
        self.status == SignatoryStatus::Signed
    }
}

/// Locally owned state of one multi-party signature request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub id: Uuid,
    pub document_id: String,
    pub contract_id: String,
    pub initiator_id: String,
    pub mode: SigningMode,
    pub status: RequestStatus,
    pub provider_request_id: Option<String>,
    pub needs_provider_retry: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub signed_pdf_ref: Option<String>,
    /// Sorted by `order`, 1..=N.
    pub signatories: Vec<Signatory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SignatureRequest {
    pub fn signatory(&self, signatory_id: Uuid) -> Option<&Signatory> {
        self.signatories.iter().find(|s| s.id == signatory_id)
    }

    pub fn signatory_by_order(&self, order: u32) -> Option<&Signatory> {
        self.signatories.iter().find(|s| s.order == order)
    }

    pub fn signed_count(&self) -> usize {
        self.signatories.iter().filter(|s| s.is_signed()).count()
    }

    pub fn all_signed(&self) -> bool {
        !self.signatories.is_empty() && self.signatories.iter().all(Signatory::is_signed)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// One signer as supplied by the caller at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSigner {
    pub name: String,
    pub email: String,
    pub order: u32,
}

impl NewSigner {
    pub fn new(name: impl Into<String>, email: impl Into<String>, order: u32) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            order,
        }
    }
}

/// Input for `OrchestrationService::create_request`.
#[derive(Debug, Clone)]
pub struct NewSignatureRequest {
    pub contract_id: String,
    pub initiator_id: String,
    pub document: Vec<u8>,
    pub filename: String,
    pub signers: Vec<NewSigner>,
    pub mode: SigningMode,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::InProgress.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let value = serde_json::to_value(RequestStatus::InProgress).unwrap();
        assert_eq!(value, serde_json::json!("in_progress"));
        let mode: SigningMode = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(mode, SigningMode::Sequential);
    }
}
