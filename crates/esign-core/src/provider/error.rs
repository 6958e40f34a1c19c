use std::time::Duration;
use thiserror::Error;

/// Typed failures of the provider boundary.
///
/// Transport problems never escape as opaque errors; callers branch on the variant.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider call '{operation}' timed out")]
    Timeout { operation: &'static str },

    #[error("provider rate limited the call (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider rejected the call ({status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("provider server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("network error: {message}")]
    Network { message: String, request_sent: bool },

    #[error("invalid provider request: {0}")]
    InvalidRequest(String),

    #[error("provider unavailable for '{operation}' after {attempts} attempts: {last_error}")]
    Unavailable {
        operation: &'static str,
        attempts: u32,
        last_error: String,
    },

    #[error("outcome of '{operation}' is unknown; the provider may have applied it")]
    Ambiguous { operation: &'static str },

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Failures that a local retry loop may try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::Network { .. }
        )
    }

    /// True when the provider may have received and applied the call.
    ///
    /// Any 5xx counts: a gateway timeout or a crash after the write leaves the outcome open.
    pub fn may_have_reached_provider(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ServerError { .. } => true,
            Self::Network { request_sent, .. } => *request_sent,
            _ => false,
        }
    }

    /// Whether a caller may retry the whole operation later.
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || matches!(self, Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_failures() {
        assert!(ProviderError::Timeout { operation: "x" }.is_transient());
        assert!(ProviderError::ServerError {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!ProviderError::ClientError {
            status: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!ProviderError::Ambiguous { operation: "x" }.is_retryable());
    }

    #[test]
    fn connect_failures_never_reached_provider() {
        let refused = ProviderError::Network {
            message: "connection refused".to_string(),
            request_sent: false,
        };
        assert!(!refused.may_have_reached_provider());

        let reset = ProviderError::Network {
            message: "connection reset".to_string(),
            request_sent: true,
        };
        assert!(reset.may_have_reached_provider());
    }

    #[test]
    fn gateway_errors_may_have_reached_provider() {
        for status in [500, 502, 503, 504] {
            let err = ProviderError::ServerError {
                status,
                message: String::new(),
            };
            assert!(err.may_have_reached_provider(), "status {status}");
        }
        assert!(!ProviderError::RateLimited { retry_after: None }.may_have_reached_provider());
    }
}
