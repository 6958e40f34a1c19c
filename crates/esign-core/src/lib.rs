//! Signature orchestration core.
//!
//! This crate owns the authoritative signing state for multi-party signature requests while
//! delegating signature capture to an external provider. It enforces sequential signing order,
//! applies provider webhooks idempotently, and emits notification intents as data so they are
//! dispatched only after a transition has been persisted.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod notifier;
pub mod orchestrator;
pub mod provider;
pub mod scheduler;
pub mod state_machine;
pub mod storage;
pub mod types;
pub mod webhook;

pub use config::OrchestratorConfig;
pub use error::EsignError;
pub use ledger::{InMemoryEventStore, MarkOutcome, ProcessedEvent, ProcessedEventStore};
pub use notifier::{DocumentVault, NotificationIntent, Notifier, NotifierError};
pub use orchestrator::{OrchestrationService, WebhookAck};
pub use provider::{
    DocumentRef, HttpProviderClient, ProviderConfig, ProviderError, ProviderSignerState,
    ProviderStatus, RetryPolicy, SignerHandle, SignerSpec, SigningProvider, WebhookRegistration,
};
pub use scheduler::{ActiveSigners, SigningOrderScheduler};
pub use state_machine::{SideEffectIntent, Transition, TransitionOutcome};
pub use storage::{bootstrap_storage, InMemoryRequestStore, RequestStore, StorageBackends, StorageConfig};
pub use types::{
    NewSignatureRequest, NewSigner, RequestStatus, SignatureRequest, Signatory, SignatoryStatus,
    SigningMode,
};
pub use webhook::{ProviderEvent, VerificationError, VerifiedEvent, WebhookVerifier};
