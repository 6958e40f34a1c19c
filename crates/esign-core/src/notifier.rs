//! Outbound collaborators: signer/initiator notification and signed document storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("document vault error: {0}")]
    Vault(String),
}

/// A notification decided by a state transition, dispatched after the transition is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationIntent {
    NotifyNextSigner {
        request_id: Uuid,
        signatory_id: Uuid,
        name: String,
        email: String,
        signing_token: Option<String>,
    },
    NotifyInitiatorProgress {
        request_id: Uuid,
        initiator_id: String,
        signed_count: usize,
        total: usize,
    },
    NotifyAllComplete {
        request_id: Uuid,
        contract_id: String,
        initiator_id: String,
        recipients: Vec<String>,
    },
    NotifyCancelled {
        request_id: Uuid,
        signatory_id: Uuid,
        name: String,
        email: String,
    },
    NotifyReminder {
        request_id: Uuid,
        signatory_id: Uuid,
        name: String,
        email: String,
        signing_token: Option<String>,
        reminders_sent: u32,
    },
    NotifyExpired {
        request_id: Uuid,
        initiator_id: String,
    },
}

impl NotificationIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotifyNextSigner { .. } => "notify_next_signer",
            Self::NotifyInitiatorProgress { .. } => "notify_initiator_progress",
            Self::NotifyAllComplete { .. } => "notify_all_complete",
            Self::NotifyCancelled { .. } => "notify_cancelled",
            Self::NotifyReminder { .. } => "notify_reminder",
            Self::NotifyExpired { .. } => "notify_expired",
        }
    }

    pub fn request_id(&self) -> Uuid {
        match self {
            Self::NotifyNextSigner { request_id, .. }
            | Self::NotifyInitiatorProgress { request_id, .. }
            | Self::NotifyAllComplete { request_id, .. }
            | Self::NotifyCancelled { request_id, .. }
            | Self::NotifyReminder { request_id, .. }
            | Self::NotifyExpired { request_id, .. } => *request_id,
        }
    }
}

/// Delivers notifications (email, chat, ...). Failures never roll back signing state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, intent: &NotificationIntent) -> Result<(), NotifierError>;
}

/// Durable storage for completed, signed documents.
#[async_trait]
pub trait DocumentVault: Send + Sync {
    /// Stores the signed artifact and returns a reference to it.
    async fn store_signed(&self, request_id: Uuid, bytes: &[u8]) -> Result<String, NotifierError>;
}
