//! Pure signing state transitions.
//!
//! Every function here takes the current request by reference and returns the next state plus
//! the side effects it implies. Nothing is persisted or dispatched from this module.

use crate::error::EsignError;
use crate::notifier::NotificationIntent;
use crate::provider::ProviderStatus;
use crate::scheduler::SigningOrderScheduler;
use crate::types::{RequestStatus, SignatureRequest, SignatoryStatus, SigningMode};
use crate::webhook::ProviderEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Work to perform once a transition has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffectIntent {
    Notify(NotificationIntent),
    FetchSignedDocument {
        request_id: Uuid,
        provider_request_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Ignored(String),
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub request: SignatureRequest,
    pub intents: Vec<SideEffectIntent>,
    pub outcome: TransitionOutcome,
}

impl Transition {
    pub(crate) fn applied(request: SignatureRequest, intents: Vec<SideEffectIntent>) -> Self {
        Self {
            request,
            intents,
            outcome: TransitionOutcome::Applied,
        }
    }

    fn ignored(request: &SignatureRequest, reason: impl Into<String>) -> Self {
        Self {
            request: request.clone(),
            intents: Vec::new(),
            outcome: TransitionOutcome::Ignored(reason.into()),
        }
    }

    pub fn is_applied(&self) -> bool {
        self.outcome == TransitionOutcome::Applied
    }
}

/// Applies one provider event.
///
/// Terminal requests acknowledge and discard every event. Events that would break signing
/// order fail with [`EsignError::PreconditionViolation`] and leave the request untouched.
pub fn apply(
    request: &SignatureRequest,
    event: &ProviderEvent,
    now: DateTime<Utc>,
) -> Result<Transition, EsignError> {
    if request.status.is_terminal() {
        return Ok(Transition::ignored(
            request,
            format!("request is already {}", request.status),
        ));
    }

    match event {
        ProviderEvent::SignatureCompleted { signer_order } => {
            signature_completed(request, *signer_order, now)
        }
        ProviderEvent::NextSignerReady { signer_order } => {
            next_signer_ready(request, *signer_order, now)
        }
        ProviderEvent::AllSignedCompleted => {
            if request.all_signed() {
                Ok(Transition::ignored(request, "completion already recorded"))
            } else {
                Err(EsignError::PreconditionViolation(format!(
                    "provider reports completion but only {}/{} signatories are signed",
                    request.signed_count(),
                    request.signatories.len()
                )))
            }
        }
        ProviderEvent::DocumentUploaded | ProviderEvent::SignatureRequested => Ok(
            Transition::ignored(request, format!("{} carries no state change", event.kind())),
        ),
        ProviderEvent::Unknown { event_type } => Ok(Transition::ignored(
            request,
            format!("unknown event type '{event_type}'"),
        )),
    }
}

fn signature_completed(
    request: &SignatureRequest,
    order: u32,
    now: DateTime<Utc>,
) -> Result<Transition, EsignError> {
    let signatory = request.signatory_by_order(order).ok_or_else(|| {
        EsignError::PreconditionViolation(format!("unknown signer order {order}"))
    })?;

    if signatory.is_signed() {
        return Ok(Transition::ignored(
            request,
            format!("signer {order} already signed"),
        ));
    }

    if request.mode == SigningMode::Sequential {
        if let Some(blocking) =
            SigningOrderScheduler::first_unsigned_before(&request.signatories, order)
        {
            return Err(EsignError::out_of_order(order, blocking));
        }
    }

    let mut next = request.clone();
    record_signature(&mut next, order, now);
    let mut intents = Vec::new();
    after_signatures(&mut next, now, &mut intents);
    Ok(Transition::applied(next, intents))
}

fn next_signer_ready(
    request: &SignatureRequest,
    order: u32,
    now: DateTime<Utc>,
) -> Result<Transition, EsignError> {
    let signatory = request.signatory_by_order(order).ok_or_else(|| {
        EsignError::PreconditionViolation(format!("unknown signer order {order}"))
    })?;

    match signatory.status {
        SignatoryStatus::Waiting => {}
        status => {
            return Ok(Transition::ignored(
                request,
                format!("signer {order} is already {status}"),
            ))
        }
    }

    if let Some(blocking) = SigningOrderScheduler::first_unsigned_before(&request.signatories, order)
    {
        return Err(EsignError::out_of_order(order, blocking));
    }

    let mut next = request.clone();
    let mut intents = Vec::new();
    activate(&mut next, order, &mut intents);
    if next.status == RequestStatus::Pending {
        next.status = RequestStatus::InProgress;
    }
    next.updated_at = now;
    Ok(Transition::applied(next, intents))
}

/// Lazily expires a request whose deadline has passed.
///
/// Returns `None` when the request is terminal or not yet due.
pub fn expire_if_due(request: &SignatureRequest, now: DateTime<Utc>) -> Option<Transition> {
    if request.status.is_terminal() || !request.is_expired_at(now) {
        return None;
    }

    let mut next = request.clone();
    next.status = RequestStatus::Expired;
    next.updated_at = now;
    for signatory in next.signatories.iter_mut().filter(|s| !s.is_signed()) {
        signatory.status = SignatoryStatus::Expired;
    }

    let intents = vec![SideEffectIntent::Notify(NotificationIntent::NotifyExpired {
        request_id: next.id,
        initiator_id: next.initiator_id.clone(),
    })];
    Some(Transition::applied(next, intents))
}

/// Cancels a non-terminal request and notifies every signer who has not signed.
///
/// A request the provider never accepted has invited nobody, so nobody is told.
pub fn cancel(request: &SignatureRequest, now: DateTime<Utc>) -> Result<Transition, EsignError> {
    if request.status.is_terminal() {
        return Err(EsignError::AlreadyTerminal {
            request_id: request.id,
            status: request.status,
        });
    }

    let mut next = request.clone();
    next.status = RequestStatus::Cancelled;
    next.cancelled_at = Some(now);
    next.updated_at = now;

    let invited = next.provider_request_id.is_some();
    let intents = next
        .signatories
        .iter()
        .filter(|s| invited && !s.is_signed())
        .map(|s| {
            SideEffectIntent::Notify(NotificationIntent::NotifyCancelled {
                request_id: next.id,
                signatory_id: s.id,
                name: s.name.clone(),
                email: s.email.clone(),
            })
        })
        .collect();

    Ok(Transition::applied(next, intents))
}

/// Brings local state in line with the provider's view.
///
/// Signatures are taken in ascending order. In sequential mode the walk stops at the first
/// signer the provider does not report as completed, so a gap in the report never lets a
/// later signer through.
pub fn reconcile(
    request: &SignatureRequest,
    status: &ProviderStatus,
    now: DateTime<Utc>,
) -> Result<Transition, EsignError> {
    if request.status.is_terminal() {
        return Ok(Transition::ignored(
            request,
            format!("request is already {}", request.status),
        ));
    }

    let mut orders: Vec<u32> = request.signatories.iter().map(|s| s.order).collect();
    orders.sort_unstable();

    let mut next = request.clone();
    let mut recorded = 0usize;
    for order in orders {
        let already_signed = next
            .signatory_by_order(order)
            .map(|s| s.is_signed())
            .unwrap_or(false);
        if already_signed {
            continue;
        }

        let remote = status.signers.iter().find(|s| s.order == order);
        match remote {
            Some(remote) if remote.completed => {
                record_signature(&mut next, order, remote.completed_at.unwrap_or(now));
                recorded += 1;
            }
            _ if request.mode == SigningMode::Sequential => break,
            _ => {}
        }
    }

    if recorded == 0 {
        return Ok(Transition::ignored(
            request,
            "provider reports no new signatures",
        ));
    }

    next.updated_at = now;
    let mut intents = Vec::new();
    after_signatures(&mut next, now, &mut intents);
    Ok(Transition::applied(next, intents))
}

fn record_signature(request: &mut SignatureRequest, order: u32, signed_at: DateTime<Utc>) {
    if let Some(signatory) = request.signatories.iter_mut().find(|s| s.order == order) {
        signatory.status = SignatoryStatus::Signed;
        signatory.signed_at = Some(signed_at);
    }
}

fn after_signatures(
    request: &mut SignatureRequest,
    now: DateTime<Utc>,
    intents: &mut Vec<SideEffectIntent>,
) {
    request.updated_at = now;
    if request.status == RequestStatus::Pending {
        request.status = RequestStatus::InProgress;
    }

    intents.push(SideEffectIntent::Notify(
        NotificationIntent::NotifyInitiatorProgress {
            request_id: request.id,
            initiator_id: request.initiator_id.clone(),
            signed_count: request.signed_count(),
            total: request.signatories.len(),
        },
    ));

    if request.all_signed() {
        request.status = RequestStatus::Completed;
        request.completed_at = Some(now);
        if let Some(provider_request_id) = &request.provider_request_id {
            intents.push(SideEffectIntent::FetchSignedDocument {
                request_id: request.id,
                provider_request_id: provider_request_id.clone(),
            });
        }
        intents.push(SideEffectIntent::Notify(NotificationIntent::NotifyAllComplete {
            request_id: request.id,
            contract_id: request.contract_id.clone(),
            initiator_id: request.initiator_id.clone(),
            recipients: request.signatories.iter().map(|s| s.email.clone()).collect(),
        }));
        return;
    }

    if request.mode == SigningMode::Sequential {
        let next_order = SigningOrderScheduler::next_active(request.mode, &request.signatories)
            .into_vec()
            .first()
            .map(|s| s.order);
        if let Some(order) = next_order {
            activate(request, order, intents);
        }
    }
}

/// Moves a waiting signer to pending and asks for them to be notified.
fn activate(request: &mut SignatureRequest, order: u32, intents: &mut Vec<SideEffectIntent>) {
    let request_id = request.id;
    if let Some(signatory) = request
        .signatories
        .iter_mut()
        .find(|s| s.order == order && s.status == SignatoryStatus::Waiting)
    {
        signatory.status = SignatoryStatus::Pending;
        intents.push(SideEffectIntent::Notify(NotificationIntent::NotifyNextSigner {
            request_id,
            signatory_id: signatory.id,
            name: signatory.name.clone(),
            email: signatory.email.clone(),
            signing_token: signatory.provider_signing_token.clone(),
        }));
    }
}
