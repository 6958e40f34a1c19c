//! Collaborator adapters for the signature orchestrator.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use esign_core::{
    DocumentRef, DocumentVault, NotificationIntent, Notifier, NotifierError, ProviderError,
    ProviderSignerState, ProviderStatus, SignerHandle, SignerSpec, SigningProvider,
    WebhookRegistration,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Notifier that only logs each intent. Used when no delivery channel is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, intent: &NotificationIntent) -> Result<(), NotifierError> {
        match intent {
            NotificationIntent::NotifyNextSigner {
                request_id, email, ..
            } => info!(%request_id, email = %email, "signer is up next"),
            NotificationIntent::NotifyInitiatorProgress {
                request_id,
                initiator_id,
                signed_count,
                total,
            } => info!(%request_id, initiator_id = %initiator_id, signed_count, total, "signing progress"),
            NotificationIntent::NotifyAllComplete {
                request_id,
                contract_id,
                recipients,
                ..
            } => info!(%request_id, contract_id = %contract_id, recipients = recipients.len(), "all signatures collected"),
            NotificationIntent::NotifyCancelled {
                request_id, email, ..
            } => info!(%request_id, email = %email, "signature request cancelled"),
            NotificationIntent::NotifyReminder {
                request_id,
                email,
                reminders_sent,
                ..
            } => info!(%request_id, email = %email, reminders_sent, "signing reminder"),
            NotificationIntent::NotifyExpired {
                request_id,
                initiator_id,
            } => info!(%request_id, initiator_id = %initiator_id, "signature request expired"),
        }
        Ok(())
    }
}

/// Notifier that keeps every intent in memory, for local inspection and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationIntent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<NotificationIntent> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, intent: &NotificationIntent) -> Result<(), NotifierError> {
        self.sent
            .lock()
            .map_err(|_| NotifierError::Delivery("recording notifier lock poisoned".to_string()))?
            .push(intent.clone());
        Ok(())
    }
}

/// Deterministic failing notifier useful for chaos testing.
#[derive(Debug, Clone)]
pub struct AlwaysFailNotifier {
    reason: String,
}

impl AlwaysFailNotifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Notifier for AlwaysFailNotifier {
    async fn notify(&self, _intent: &NotificationIntent) -> Result<(), NotifierError> {
        Err(NotifierError::Delivery(self.reason.clone()))
    }
}

/// Vault that keeps signed documents in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentVault {
    documents: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl InMemoryDocumentVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, request_id: Uuid) -> Option<Vec<u8>> {
        self.documents
            .lock()
            .ok()
            .and_then(|documents| documents.get(&request_id).cloned())
    }
}

#[async_trait]
impl DocumentVault for InMemoryDocumentVault {
    async fn store_signed(&self, request_id: Uuid, bytes: &[u8]) -> Result<String, NotifierError> {
        self.documents
            .lock()
            .map_err(|_| NotifierError::Vault("vault lock poisoned".to_string()))?
            .insert(request_id, bytes.to_vec());
        Ok(format!("memory://signed/{request_id}.pdf"))
    }
}

/// Vault that writes signed documents under a local directory.
#[derive(Debug, Clone)]
pub struct FsDocumentVault {
    root: PathBuf,
}

impl FsDocumentVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DocumentVault for FsDocumentVault {
    async fn store_signed(&self, request_id: Uuid, bytes: &[u8]) -> Result<String, NotifierError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| NotifierError::Vault(format!("create {}: {e}", self.root.display())))?;

        let path = self.root.join(format!("{request_id}.pdf"));
        // Write-then-rename so readers never observe a partial file.
        let partial = path.with_extension("pdf.partial");
        tokio::fs::write(&partial, bytes)
            .await
            .map_err(|e| NotifierError::Vault(format!("write {}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| NotifierError::Vault(format!("rename {}: {e}", path.display())))?;

        Ok(format!("file://{}", path.display()))
    }
}

#[derive(Debug, Clone)]
struct FixtureSubmission {
    signers: Vec<SignerSpec>,
    completed: HashMap<u32, DateTime<Utc>>,
    archived: bool,
}

#[derive(Debug, Default)]
struct FixtureState {
    documents: HashMap<String, usize>,
    submissions: HashMap<String, FixtureSubmission>,
    webhooks: Vec<WebhookRegistration>,
    sequence: u64,
}

impl FixtureState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{}", self.sequence)
    }
}

/// Deterministic in-process stand-in for the signing provider.
///
/// Signatures are recorded with [`FixtureProvider::complete_signer`]; the fixture does not
/// send webhooks itself.
#[derive(Debug, Default)]
pub struct FixtureProvider {
    state: Mutex<FixtureState>,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one signer as completed on the provider side.
    pub fn complete_signer(&self, provider_request_id: &str, order: u32) -> Result<(), ProviderError> {
        let mut state = self.lock()?;
        let submission = state
            .submissions
            .get_mut(provider_request_id)
            .ok_or_else(|| not_found("submission", provider_request_id))?;
        if !submission.signers.iter().any(|s| s.order == order) {
            return Err(ProviderError::ClientError {
                status: 422,
                message: format!("submission has no signer with order {order}"),
            });
        }
        submission.completed.entry(order).or_insert_with(Utc::now);
        Ok(())
    }

    pub fn is_archived(&self, provider_request_id: &str) -> bool {
        self.lock()
            .ok()
            .and_then(|state| state.submissions.get(provider_request_id).map(|s| s.archived))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, FixtureState>, ProviderError> {
        self.state.lock().map_err(|_| ProviderError::ServerError {
            status: 500,
            message: "fixture provider lock poisoned".to_string(),
        })
    }
}

fn not_found(kind: &str, id: &str) -> ProviderError {
    ProviderError::ClientError {
        status: 404,
        message: format!("{kind} '{id}' not found"),
    }
}

#[async_trait]
impl SigningProvider for FixtureProvider {
    async fn upload_document(
        &self,
        bytes: &[u8],
        _filename: &str,
    ) -> Result<DocumentRef, ProviderError> {
        if bytes.is_empty() {
            return Err(ProviderError::InvalidRequest("document is empty".to_string()));
        }
        let mut state = self.lock()?;
        let id = state.next_id("fixture-doc");
        state.documents.insert(id.clone(), bytes.len());
        Ok(DocumentRef::new(id))
    }

    async fn create_batch_signature_requests(
        &self,
        document: &DocumentRef,
        signers: &[SignerSpec],
        _expires_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<SignerHandle>, ProviderError> {
        esign_core::provider::validate_signer_specs(signers)?;
        let mut state = self.lock()?;
        if !state.documents.contains_key(&document.id) {
            return Err(not_found("document", &document.id));
        }

        let submission_id = state.next_id("fixture-sub");
        let handles = signers
            .iter()
            .map(|signer| SignerHandle {
                provider_request_id: submission_id.clone(),
                order: signer.order,
                email: signer.email.clone(),
                signing_token: format!("{submission_id}-s{}", signer.order),
            })
            .collect();
        state.submissions.insert(
            submission_id,
            FixtureSubmission {
                signers: signers.to_vec(),
                completed: HashMap::new(),
                archived: false,
            },
        );
        Ok(handles)
    }

    async fn get_request_status(
        &self,
        provider_request_id: &str,
    ) -> Result<ProviderStatus, ProviderError> {
        let state = self.lock()?;
        let submission = state
            .submissions
            .get(provider_request_id)
            .ok_or_else(|| not_found("submission", provider_request_id))?;

        let mut signers: Vec<ProviderSignerState> = submission
            .signers
            .iter()
            .map(|signer| ProviderSignerState {
                order: signer.order,
                completed: submission.completed.contains_key(&signer.order),
                completed_at: submission.completed.get(&signer.order).copied(),
            })
            .collect();
        signers.sort_by_key(|s| s.order);

        let status = if submission.archived {
            "archived"
        } else if submission.completed.len() == submission.signers.len() {
            "completed"
        } else {
            "pending"
        };
        Ok(ProviderStatus {
            provider_request_id: provider_request_id.to_string(),
            status: status.to_string(),
            signers,
        })
    }

    async fn download_signed_document(
        &self,
        provider_request_id: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let state = self.lock()?;
        let submission = state
            .submissions
            .get(provider_request_id)
            .ok_or_else(|| not_found("submission", provider_request_id))?;
        if submission.completed.len() != submission.signers.len() {
            return Err(ProviderError::ClientError {
                status: 409,
                message: "submission is not completed".to_string(),
            });
        }
        Ok(format!("%PDF-1.7 fixture signed {provider_request_id}").into_bytes())
    }

    async fn register_webhook(
        &self,
        url: &str,
        _secret: &str,
    ) -> Result<WebhookRegistration, ProviderError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.webhooks.iter().find(|hook| hook.url == url) {
            return Ok(existing.clone());
        }
        let registration = WebhookRegistration {
            id: state.next_id("fixture-hook"),
            url: url.to_string(),
        };
        state.webhooks.push(registration.clone());
        Ok(registration)
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookRegistration>, ProviderError> {
        Ok(self.lock()?.webhooks.clone())
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ProviderError> {
        self.lock()?.webhooks.retain(|hook| hook.id != webhook_id);
        Ok(())
    }

    async fn delete_document(&self, document: &DocumentRef) -> Result<(), ProviderError> {
        self.lock()?.documents.remove(&document.id);
        Ok(())
    }

    async fn archive_request(&self, provider_request_id: &str) -> Result<(), ProviderError> {
        let mut state = self.lock()?;
        let submission = state
            .submissions
            .get_mut(provider_request_id)
            .ok_or_else(|| not_found("submission", provider_request_id))?;
        submission.archived = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signers() -> Vec<SignerSpec> {
        vec![
            SignerSpec {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                order: 1,
            },
            SignerSpec {
                name: "Bob".to_string(),
                email: "bob@example.com".to_string(),
                order: 2,
            },
        ]
    }

    #[tokio::test]
    async fn fixture_tracks_signatures() {
        let provider = FixtureProvider::new();
        let document = provider.upload_document(b"%PDF", "a.pdf").await.unwrap();
        let handles = provider
            .create_batch_signature_requests(&document, &signers(), None)
            .await
            .unwrap();
        assert_eq!(handles.len(), 2);
        let submission = handles[0].provider_request_id.clone();

        provider.complete_signer(&submission, 1).unwrap();
        let status = provider.get_request_status(&submission).await.unwrap();
        assert_eq!(status.status, "pending");
        assert!(status.signers[0].completed);
        assert!(!status.signers[1].completed);
        assert!(provider.download_signed_document(&submission).await.is_err());

        provider.complete_signer(&submission, 2).unwrap();
        let status = provider.get_request_status(&submission).await.unwrap();
        assert_eq!(status.status, "completed");
        assert!(provider.download_signed_document(&submission).await.is_ok());

        assert!(provider.complete_signer(&submission, 9).is_err());
    }

    #[tokio::test]
    async fn fixture_rejects_unknown_documents_and_archives() {
        let provider = FixtureProvider::new();
        let err = provider
            .create_batch_signature_requests(&DocumentRef::new("missing"), &signers(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ClientError { status: 404, .. }));

        let document = provider.upload_document(b"%PDF", "a.pdf").await.unwrap();
        let handles = provider
            .create_batch_signature_requests(&document, &signers(), None)
            .await
            .unwrap();
        provider
            .archive_request(&handles[0].provider_request_id)
            .await
            .unwrap();
        assert!(provider.is_archived(&handles[0].provider_request_id));
    }

    #[tokio::test]
    async fn webhook_registration_is_idempotent_per_url() {
        let provider = FixtureProvider::new();
        let first = provider
            .register_webhook("https://esign.local/webhooks/signing", "s")
            .await
            .unwrap();
        let second = provider
            .register_webhook("https://esign.local/webhooks/signing", "s")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.list_webhooks().await.unwrap().len(), 1);

        provider.delete_webhook(&first.id).await.unwrap();
        assert!(provider.list_webhooks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vaults_return_references() {
        let vault = InMemoryDocumentVault::new();
        let id = Uuid::new_v4();
        let reference = vault.store_signed(id, b"signed").await.unwrap();
        assert!(reference.contains(&id.to_string()));
        assert_eq!(vault.get(id).unwrap(), b"signed".to_vec());

        let dir = std::env::temp_dir().join(format!("esign-vault-{}", Uuid::new_v4()));
        let fs_vault = FsDocumentVault::new(&dir);
        let reference = fs_vault.store_signed(id, b"signed").await.unwrap();
        assert!(reference.starts_with("file://"));
        let stored = tokio::fs::read(dir.join(format!("{id}.pdf"))).await.unwrap();
        assert_eq!(stored, b"signed".to_vec());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn notifiers() {
        let intent = NotificationIntent::NotifyExpired {
            request_id: Uuid::new_v4(),
            initiator_id: "user-1".to_string(),
        };
        LoggingNotifier.notify(&intent).await.unwrap();

        let recording = RecordingNotifier::new();
        recording.notify(&intent).await.unwrap();
        assert_eq!(recording.sent(), vec![intent.clone()]);

        assert!(AlwaysFailNotifier::new("down").notify(&intent).await.is_err());
    }
}
