//! Service façade: the only entry point that mutates signing state.
//!
//! Every mutation of one request runs under that request's lock and follows the same shape:
//! load, lazily expire, transition, persist, release, then dispatch side effects. Provider
//! calls and notifier dispatch never happen while a lock is held.

mod locks;

use crate::config::OrchestratorConfig;
use crate::error::EsignError;
use crate::ledger::{MarkOutcome, ProcessedEventStore};
use crate::notifier::{DocumentVault, NotificationIntent, Notifier};
use crate::provider::{DocumentRef, ProviderError, SignerHandle, SignerSpec, SigningProvider};
use crate::scheduler::SigningOrderScheduler;
use crate::state_machine::{self, SideEffectIntent, Transition};
use crate::storage::RequestStore;
use crate::types::{
    NewSignatureRequest, RequestStatus, Signatory, SignatoryStatus, SignatureRequest,
};
use crate::webhook::{VerifiedEvent, WebhookVerifier};
use chrono::{DateTime, Utc};
use locks::RequestLocks;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How an authenticated webhook was handled. Every variant is acknowledged to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAck {
    /// The event changed local state.
    Applied,
    /// The event id was processed before.
    Duplicate,
    /// Valid but no state change (terminal request, informational or unknown event).
    Ignored,
    /// No local request matches the event's provider request id.
    UnknownRequest,
}

impl WebhookAck {
    pub fn name(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
            Self::UnknownRequest => "unknown_request",
        }
    }
}

/// Result of a locked mutation: what to tell the caller and what to dispatch afterwards.
struct Committed<T> {
    value: T,
    intents: Vec<SideEffectIntent>,
}

pub struct OrchestrationService {
    provider: Arc<dyn SigningProvider>,
    requests: Arc<dyn RequestStore>,
    events: Arc<dyn ProcessedEventStore>,
    notifier: Arc<dyn Notifier>,
    vault: Arc<dyn DocumentVault>,
    verifier: WebhookVerifier,
    config: OrchestratorConfig,
    locks: RequestLocks,
}

impl OrchestrationService {
    pub fn new(
        provider: Arc<dyn SigningProvider>,
        requests: Arc<dyn RequestStore>,
        events: Arc<dyn ProcessedEventStore>,
        notifier: Arc<dyn Notifier>,
        vault: Arc<dyn DocumentVault>,
        verifier: WebhookVerifier,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            requests,
            events,
            notifier,
            vault,
            verifier,
            config,
            locks: RequestLocks::default(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Uploads the document, creates one provider request for all signers and persists the
    /// local request.
    ///
    /// A batch failure whose provider-side outcome is unknown still persists the request,
    /// flagged `needs_provider_retry`; it is never resubmitted automatically.
    pub async fn create_request(
        &self,
        input: NewSignatureRequest,
    ) -> Result<SignatureRequest, EsignError> {
        let now = Utc::now();
        validate_new_request(&input, now)?;

        let filename = if input.filename.trim().is_empty() {
            self.config.default_filename.clone()
        } else {
            input.filename.clone()
        };

        let document = self
            .provider
            .upload_document(&input.document, &filename)
            .await?;
        debug!(document_id = %document.id, "document uploaded to provider");

        let mut request = build_request(&input, &document, now);
        let specs = signer_specs(&request);

        match self
            .provider
            .create_batch_signature_requests(&document, &specs, input.expires_at)
            .await
        {
            Ok(handles) => {
                if let Err(err) = attach_handles(&mut request, &handles) {
                    let created = handles.first().map(|h| h.provider_request_id.as_str());
                    self.rollback_create(&document, created).await;
                    return Err(err);
                }
            }
            Err(err @ (ProviderError::ClientError { .. } | ProviderError::InvalidRequest(_))) => {
                self.rollback_create(&document, None).await;
                return Err(err.into());
            }
            Err(err) => {
                warn!(
                    request_id = %request.id,
                    error = %err,
                    "batch creation outcome unknown; request flagged for provider retry"
                );
                request.needs_provider_retry = true;
            }
        }

        if let Err(err) = self.requests.insert(&request).await {
            warn!(
                request_id = %request.id,
                error = %err,
                "failed to persist new signature request; rolling back provider state"
            );
            self.rollback_create(&document, request.provider_request_id.as_deref())
                .await;
            return Err(err);
        }
        info!(
            request_id = %request.id,
            contract_id = %request.contract_id,
            mode = request.mode.name(),
            signers = request.signatories.len(),
            needs_provider_retry = request.needs_provider_retry,
            "signature request created"
        );

        if !request.needs_provider_retry {
            self.dispatch(initial_notifications(&request)).await;
        }
        Ok(request)
    }

    /// Re-runs batch creation for a request flagged `needs_provider_retry`.
    ///
    /// Call only after confirming that no provider-side request exists for it.
    pub async fn resubmit(&self, request_id: Uuid) -> Result<SignatureRequest, EsignError> {
        // Claim the retry so concurrent resubmits cannot create two provider requests.
        let claimed = self
            .with_request(request_id, |current, _now| {
                if current.status.is_terminal() {
                    return Err(EsignError::AlreadyTerminal {
                        request_id,
                        status: current.status,
                    });
                }
                if !current.needs_provider_retry {
                    return Err(EsignError::InvalidState(format!(
                        "signature request '{request_id}' is not awaiting provider retry"
                    )));
                }
                let mut next = current.clone();
                next.needs_provider_retry = false;
                Ok(Transition::applied(next, Vec::new()))
            })
            .await?
            .value;

        let document = DocumentRef::new(claimed.document_id.clone());
        let specs = signer_specs(&claimed);
        let result = self
            .provider
            .create_batch_signature_requests(&document, &specs, claimed.expires_at)
            .await;

        let committed = self
            .with_request(request_id, |current, now| {
                let mut next = current.clone();
                next.updated_at = now;
                match &result {
                    Ok(handles) => attach_handles(&mut next, handles)?,
                    Err(_) => next.needs_provider_retry = true,
                }
                let intents = if result.is_ok() && !next.status.is_terminal() {
                    initial_notifications(&next)
                } else {
                    Vec::new()
                };
                Ok(Transition::applied(next, intents))
            })
            .await?;

        let request = committed.value;
        if let Err(err) = result {
            warn!(request_id = %request_id, error = %err, "provider resubmission failed");
            return Err(err.into());
        }

        // Cancelled while the provider call was in flight.
        if request.status.is_terminal() {
            self.archive_best_effort(&request).await;
        }
        info!(request_id = %request_id, "signature request resubmitted to provider");
        self.dispatch(committed.intents).await;
        Ok(request)
    }

    /// Authenticates and applies one provider webhook.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookAck, EsignError> {
        let verified = self
            .verifier
            .verify(raw_body, signature_header)
            .map_err(|err| {
                warn!(error = %err, "rejected webhook");
                err
            })?;
        let received_at = Utc::now();

        if self.events.contains(&verified.event_id).await? {
            debug!(event_id = %verified.event_id, "duplicate webhook");
            return Ok(WebhookAck::Duplicate);
        }

        let Some(provider_request_id) = verified.provider_request_id.clone() else {
            // Nothing to route; record it so redeliveries short-circuit.
            self.events
                .try_mark_processed(&verified.event_id, received_at)
                .await?;
            debug!(event_id = %verified.event_id, kind = verified.event.kind(), "webhook without submission id ignored");
            return Ok(WebhookAck::Ignored);
        };

        let Some(request) = self
            .requests
            .find_by_provider_request(&provider_request_id)
            .await?
        else {
            warn!(
                event_id = %verified.event_id,
                provider_request_id = %provider_request_id,
                "webhook for unknown provider request"
            );
            return Ok(WebhookAck::UnknownRequest);
        };

        let applied = self
            .commit_event(request.id, &verified, received_at, |current, now| {
                state_machine::apply(current, &verified.event, now)
            })
            .await;

        match applied {
            Ok(committed) => {
                self.dispatch(committed.intents).await;
                Ok(committed.value)
            }
            Err(EsignError::PreconditionViolation(reason)) => {
                info!(
                    request_id = %request.id,
                    event_id = %verified.event_id,
                    reason = %reason,
                    "out-of-order webhook; reconciling with provider"
                );
                self.reconcile(request.id, &provider_request_id, &verified, received_at)
                    .await
            }
            Err(err) => Err(err),
        }
    }

    /// Re-sends the signing link to a pending signatory, at most once per cooldown window.
    pub async fn remind(
        &self,
        request_id: Uuid,
        signatory_id: Uuid,
    ) -> Result<Signatory, EsignError> {
        let cooldown = self.config.reminder_cooldown();
        let committed = self
            .with_request(request_id, |current, now| {
                if let Some(expired) = state_machine::expire_if_due(current, now) {
                    return Ok(expired);
                }
                ensure_active(current)?;
                if current.provider_request_id.is_none() {
                    return Err(EsignError::InvalidState(format!(
                        "signature request '{request_id}' has not been submitted to the provider"
                    )));
                }

                let signatory = current.signatory(signatory_id).ok_or_else(|| {
                    EsignError::NotFound(format!("signatory '{signatory_id}'"))
                })?;
                if signatory.status != SignatoryStatus::Pending {
                    return Err(EsignError::InvalidState(format!(
                        "signatory '{signatory_id}' is {}, only pending signatories can be reminded",
                        signatory.status
                    )));
                }
                if let Some(last) = signatory.last_reminded_at {
                    let allowed_at = last + cooldown;
                    if now < allowed_at {
                        return Err(EsignError::ReminderThrottled {
                            retry_after_secs: (allowed_at - now).num_seconds().max(1),
                        });
                    }
                }

                let mut next = current.clone();
                next.updated_at = now;
                let mut intents = Vec::new();
                if let Some(signatory) = next.signatories.iter_mut().find(|s| s.id == signatory_id)
                {
                    signatory.reminders_sent += 1;
                    signatory.last_reminded_at = Some(now);
                    intents.push(SideEffectIntent::Notify(NotificationIntent::NotifyReminder {
                        request_id,
                        signatory_id,
                        name: signatory.name.clone(),
                        email: signatory.email.clone(),
                        signing_token: signatory.provider_signing_token.clone(),
                        reminders_sent: signatory.reminders_sent,
                    }));
                }
                Ok(Transition::applied(next, intents))
            })
            .await?;

        let request = committed.value;
        self.dispatch(committed.intents).await;
        // An expired request surfaces as terminal after its expiry was stored.
        ensure_active(&request)?;

        let signatory = request
            .signatory(signatory_id)
            .cloned()
            .ok_or_else(|| EsignError::NotFound(format!("signatory '{signatory_id}'")))?;
        info!(
            request_id = %request_id,
            signatory_id = %signatory_id,
            reminders_sent = signatory.reminders_sent,
            "reminder sent"
        );
        Ok(signatory)
    }

    /// Cancels a non-terminal request and asks the provider to stop collecting signatures.
    pub async fn cancel(&self, request_id: Uuid) -> Result<SignatureRequest, EsignError> {
        let committed = self
            .with_request(request_id, |current, now| {
                if let Some(expired) = state_machine::expire_if_due(current, now) {
                    return Ok(expired);
                }
                state_machine::cancel(current, now)
            })
            .await?;

        let request = committed.value;
        self.dispatch(committed.intents).await;
        if request.status != RequestStatus::Cancelled {
            return Err(EsignError::AlreadyTerminal {
                request_id,
                status: request.status,
            });
        }

        info!(request_id = %request_id, "signature request cancelled");
        self.archive_best_effort(&request).await;
        Ok(request)
    }

    /// Current state of a request, expiring it first if its deadline has passed.
    pub async fn get_status(&self, request_id: Uuid) -> Result<SignatureRequest, EsignError> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| EsignError::not_found_request(request_id))?;

        if state_machine::expire_if_due(&request, Utc::now()).is_none() {
            return Ok(request);
        }
        self.expire(request_id).await
    }

    pub async fn list_for_contract(
        &self,
        contract_id: &str,
    ) -> Result<Vec<SignatureRequest>, EsignError> {
        let now = Utc::now();
        let requests = self.requests.list_by_contract(contract_id).await?;
        let mut listed = Vec::with_capacity(requests.len());
        for request in requests {
            if state_machine::expire_if_due(&request, now).is_some() {
                listed.push(self.expire(request.id).await?);
            } else {
                listed.push(request);
            }
        }
        Ok(listed)
    }

    /// Downloads the signed artifact of a completed request and stores it in the vault.
    pub async fn refresh_signed_document(
        &self,
        request_id: Uuid,
    ) -> Result<SignatureRequest, EsignError> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| EsignError::not_found_request(request_id))?;

        if request.status != RequestStatus::Completed {
            return Err(EsignError::InvalidState(format!(
                "signature request '{request_id}' is {}, not completed",
                request.status
            )));
        }
        let provider_request_id = request.provider_request_id.clone().ok_or_else(|| {
            EsignError::InvalidState(format!(
                "signature request '{request_id}' has no provider request"
            ))
        })?;

        self.store_signed_document(request_id, &provider_request_id)
            .await
    }

    async fn expire(&self, request_id: Uuid) -> Result<SignatureRequest, EsignError> {
        let committed = self
            .with_request(request_id, |current, now| {
                Ok(state_machine::expire_if_due(current, now)
                    .unwrap_or_else(|| Transition::applied(current.clone(), Vec::new())))
            })
            .await?;
        if committed.value.status == RequestStatus::Expired {
            info!(request_id = %request_id, "signature request expired");
        }
        self.dispatch(committed.intents).await;
        Ok(committed.value)
    }

    async fn reconcile(
        &self,
        request_id: Uuid,
        provider_request_id: &str,
        verified: &VerifiedEvent,
        received_at: DateTime<Utc>,
    ) -> Result<WebhookAck, EsignError> {
        // The event stays unmarked on failure so the provider redelivers it.
        let status = self
            .provider
            .get_request_status(provider_request_id)
            .await
            .map_err(|err| {
                warn!(
                    request_id = %request_id,
                    event_id = %verified.event_id,
                    error = %err,
                    "reconciliation status fetch failed"
                );
                EsignError::Provider(err)
            })?;

        let committed = self
            .commit_event(request_id, verified, received_at, |current, now| {
                state_machine::reconcile(current, &status, now)
            })
            .await?;
        self.dispatch(committed.intents).await;
        Ok(committed.value)
    }

    /// Applies `transition` to a stored request under its lock and records the event id.
    ///
    /// The transition is persisted before the event is marked processed. A failure between
    /// the two leaves the event unmarked; its redelivery re-applies as a no-op.
    async fn commit_event<F>(
        &self,
        request_id: Uuid,
        verified: &VerifiedEvent,
        received_at: DateTime<Utc>,
        transition: F,
    ) -> Result<Committed<WebhookAck>, EsignError>
    where
        F: FnOnce(&SignatureRequest, DateTime<Utc>) -> Result<Transition, EsignError>,
    {
        let _guard = self.locks.acquire(request_id).await;

        if self.events.contains(&verified.event_id).await? {
            return Ok(Committed {
                value: WebhookAck::Duplicate,
                intents: Vec::new(),
            });
        }

        let mut current = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| EsignError::not_found_request(request_id))?;

        let mut intents = Vec::new();
        let mut dirty = false;
        if let Some(expired) = state_machine::expire_if_due(&current, received_at) {
            current = expired.request;
            intents.extend(expired.intents);
            dirty = true;
        }

        let next = transition(&current, received_at)?;
        let ack = if next.is_applied() {
            debug!(
                request_id = %request_id,
                event_id = %verified.event_id,
                kind = verified.event.kind(),
                status = %next.request.status,
                "webhook applied"
            );
            current = next.request;
            intents.extend(next.intents);
            dirty = true;
            WebhookAck::Applied
        } else {
            debug!(
                request_id = %request_id,
                event_id = %verified.event_id,
                kind = verified.event.kind(),
                outcome = ?next.outcome,
                "webhook ignored"
            );
            WebhookAck::Ignored
        };

        if dirty {
            self.requests.save(&current).await?;
        }

        match self
            .events
            .try_mark_processed(&verified.event_id, received_at)
            .await?
        {
            MarkOutcome::Inserted => Ok(Committed {
                value: ack,
                intents,
            }),
            // Another process committed the same event first; it owns the side effects.
            MarkOutcome::AlreadyProcessed => Ok(Committed {
                value: WebhookAck::Duplicate,
                intents: Vec::new(),
            }),
        }
    }

    /// Runs a non-webhook mutation under the request lock and persists the result.
    async fn with_request<F>(
        &self,
        request_id: Uuid,
        transition: F,
    ) -> Result<Committed<SignatureRequest>, EsignError>
    where
        F: FnOnce(&SignatureRequest, DateTime<Utc>) -> Result<Transition, EsignError>,
    {
        let _guard = self.locks.acquire(request_id).await;
        let current = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| EsignError::not_found_request(request_id))?;

        let next = transition(&current, Utc::now())?;
        if next.request != current {
            self.requests.save(&next.request).await?;
        }
        Ok(Committed {
            value: next.request,
            intents: next.intents,
        })
    }

    async fn dispatch(&self, intents: Vec<SideEffectIntent>) {
        for intent in intents {
            match intent {
                SideEffectIntent::Notify(notification) => {
                    if let Err(err) = self.notifier.notify(&notification).await {
                        warn!(
                            request_id = %notification.request_id(),
                            kind = notification.kind(),
                            error = %err,
                            "notification dispatch failed"
                        );
                    }
                }
                SideEffectIntent::FetchSignedDocument {
                    request_id,
                    provider_request_id,
                } => {
                    if let Err(err) = self
                        .store_signed_document(request_id, &provider_request_id)
                        .await
                    {
                        warn!(
                            request_id = %request_id,
                            error = %err,
                            "signed document retrieval failed"
                        );
                    }
                }
            }
        }
    }

    async fn store_signed_document(
        &self,
        request_id: Uuid,
        provider_request_id: &str,
    ) -> Result<SignatureRequest, EsignError> {
        let bytes = self
            .provider
            .download_signed_document(provider_request_id)
            .await?;
        let reference = self.vault.store_signed(request_id, &bytes).await?;

        let committed = self
            .with_request(request_id, |current, now| {
                let mut next = current.clone();
                next.signed_pdf_ref = Some(reference.clone());
                next.updated_at = now;
                Ok(Transition::applied(next, Vec::new()))
            })
            .await?;
        info!(request_id = %request_id, reference = %reference, "signed document stored");
        Ok(committed.value)
    }

    /// Removes provider state created by a `create_request` that will not be persisted.
    async fn rollback_create(&self, document: &DocumentRef, provider_request_id: Option<&str>) {
        if let Some(provider_request_id) = provider_request_id {
            if let Err(err) = self.provider.archive_request(provider_request_id).await {
                warn!(
                    provider_request_id,
                    error = %err,
                    "failed to archive orphaned provider request"
                );
            }
        }
        if let Err(err) = self.provider.delete_document(document).await {
            warn!(
                document_id = %document.id,
                error = %err,
                "failed to delete orphaned upload"
            );
        }
    }

    async fn archive_best_effort(&self, request: &SignatureRequest) {
        let Some(provider_request_id) = request.provider_request_id.as_deref() else {
            return;
        };
        if let Err(err) = self.provider.archive_request(provider_request_id).await {
            warn!(
                request_id = %request.id,
                provider_request_id,
                error = %err,
                "provider archive failed"
            );
        }
    }
}

fn ensure_active(request: &SignatureRequest) -> Result<(), EsignError> {
    if request.status.is_terminal() {
        return Err(EsignError::AlreadyTerminal {
            request_id: request.id,
            status: request.status,
        });
    }
    Ok(())
}

fn validate_new_request(input: &NewSignatureRequest, now: DateTime<Utc>) -> Result<(), EsignError> {
    if input.contract_id.trim().is_empty() {
        return Err(EsignError::InvalidInput("contract_id is required".to_string()));
    }
    if input.initiator_id.trim().is_empty() {
        return Err(EsignError::InvalidInput("initiator_id is required".to_string()));
    }
    if input.document.is_empty() {
        return Err(EsignError::InvalidInput("document is empty".to_string()));
    }
    if input.signers.is_empty() {
        return Err(EsignError::InvalidInput(
            "at least one signer is required".to_string(),
        ));
    }

    let mut orders = BTreeSet::new();
    for signer in &input.signers {
        if signer.name.trim().is_empty() {
            return Err(EsignError::InvalidInput(format!(
                "signer {} has an empty name",
                signer.order
            )));
        }
        let email = signer.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(EsignError::InvalidInput(format!(
                "signer {} has an invalid email '{}'",
                signer.order, signer.email
            )));
        }
        if !orders.insert(signer.order) {
            return Err(EsignError::InvalidInput(format!(
                "duplicate signer order {}",
                signer.order
            )));
        }
    }

    let expected: BTreeSet<u32> = (1..=input.signers.len() as u32).collect();
    if orders != expected {
        return Err(EsignError::InvalidInput(format!(
            "signer orders must be exactly 1..={}",
            input.signers.len()
        )));
    }

    if let Some(expires_at) = input.expires_at {
        if expires_at <= now {
            return Err(EsignError::InvalidInput(
                "expires_at must be in the future".to_string(),
            ));
        }
    }

    Ok(())
}

fn build_request(
    input: &NewSignatureRequest,
    document: &DocumentRef,
    now: DateTime<Utc>,
) -> SignatureRequest {
    let id = Uuid::new_v4();
    let mut signers = input.signers.clone();
    signers.sort_by_key(|s| s.order);
    let statuses = SigningOrderScheduler::initial_statuses(input.mode, signers.len());

    SignatureRequest {
        id,
        document_id: document.id.clone(),
        contract_id: input.contract_id.clone(),
        initiator_id: input.initiator_id.clone(),
        mode: input.mode,
        status: RequestStatus::Pending,
        provider_request_id: None,
        needs_provider_retry: false,
        expires_at: input.expires_at,
        cancelled_at: None,
        completed_at: None,
        signed_pdf_ref: None,
        signatories: signers
            .into_iter()
            .zip(statuses)
            .map(|(signer, status)| Signatory {
                id: Uuid::new_v4(),
                request_id: id,
                order: signer.order,
                name: signer.name.trim().to_string(),
                email: signer.email.trim().to_string(),
                provider_signing_token: None,
                status,
                signed_at: None,
                reminders_sent: 0,
                last_reminded_at: None,
            })
            .collect(),
        created_at: now,
        updated_at: now,
    }
}

fn signer_specs(request: &SignatureRequest) -> Vec<SignerSpec> {
    request
        .signatories
        .iter()
        .map(|s| SignerSpec {
            name: s.name.clone(),
            email: s.email.clone(),
            order: s.order,
        })
        .collect()
}

fn attach_handles(
    request: &mut SignatureRequest,
    handles: &[SignerHandle],
) -> Result<(), EsignError> {
    let provider_request_id = handles
        .first()
        .map(|h| h.provider_request_id.clone())
        .ok_or_else(|| {
            EsignError::Provider(ProviderError::Decode(
                "provider returned no signer handles".to_string(),
            ))
        })?;

    for signatory in request.signatories.iter_mut() {
        signatory.provider_signing_token = handles
            .iter()
            .find(|h| h.order == signatory.order)
            .map(|h| h.signing_token.clone());
    }
    request.provider_request_id = Some(provider_request_id);
    request.needs_provider_retry = false;
    Ok(())
}

fn initial_notifications(request: &SignatureRequest) -> Vec<SideEffectIntent> {
    request
        .signatories
        .iter()
        .filter(|s| s.status == SignatoryStatus::Pending)
        .map(|s| {
            SideEffectIntent::Notify(NotificationIntent::NotifyNextSigner {
                request_id: request.id,
                signatory_id: s.id,
                name: s.name.clone(),
                email: s.email.clone(),
                signing_token: s.provider_signing_token.clone(),
            })
        })
        .collect()
}
