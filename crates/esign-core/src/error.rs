use crate::notifier::NotifierError;
use crate::provider::ProviderError;
use crate::types::RequestStatus;
use crate::webhook::VerificationError;
use thiserror::Error;
use uuid::Uuid;

/// Orchestration errors surfaced to callers of the service façade.
#[derive(Debug, Error)]
pub enum EsignError {
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("webhook verification failed: {0}")]
    VerificationFailed(#[from] VerificationError),

    #[error("precondition violation: {0}")]
    PreconditionViolation(String),

    #[error("signature request {request_id} is already terminal ({status})")]
    AlreadyTerminal {
        request_id: Uuid,
        status: RequestStatus,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("reminder throttled; retry in {retry_after_secs}s")]
    ReminderThrottled { retry_after_secs: i64 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("notifier error: {0}")]
    Notifier(#[from] NotifierError),
}

impl EsignError {
    pub fn not_found_request(request_id: Uuid) -> Self {
        Self::NotFound(format!("signature request '{request_id}'"))
    }

    pub fn out_of_order(order: u32, blocking: u32) -> Self {
        Self::PreconditionViolation(format!(
            "signer {order} cannot advance before signer {blocking} has signed"
        ))
    }

    /// Whether the caller may safely retry the same operation later.
    ///
    /// Transport and availability failures are retryable; client errors, terminal-state
    /// rejections and ambiguous creates are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(err) => err.is_retryable(),
            Self::ReminderThrottled { .. } | Self::Storage(_) => true,
            Self::VerificationFailed(_)
            | Self::PreconditionViolation(_)
            | Self::AlreadyTerminal { .. }
            | Self::NotFound(_)
            | Self::InvalidInput(_)
            | Self::InvalidState(_)
            | Self::Serialization(_)
            | Self::Notifier(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinguishes_retryable_failures() {
        let unavailable = EsignError::Provider(ProviderError::Unavailable {
            operation: "upload_document",
            attempts: 4,
            last_error: "503".to_string(),
        });
        assert!(unavailable.is_retryable());

        let client = EsignError::Provider(ProviderError::ClientError {
            status: 422,
            message: "bad signer".to_string(),
        });
        assert!(!client.is_retryable());

        let terminal = EsignError::AlreadyTerminal {
            request_id: Uuid::new_v4(),
            status: RequestStatus::Cancelled,
        };
        assert!(!terminal.is_retryable());
        assert!(terminal.to_string().contains("cancelled"));

        let ambiguous = EsignError::Provider(ProviderError::Ambiguous {
            operation: "create_batch_signature_requests",
        });
        assert!(!ambiguous.is_retryable());
    }
}
