//! Signing order policy.

use crate::types::{Signatory, SignatoryStatus, SigningMode};

/// Signatories that may act right now.
#[derive(Debug, PartialEq, Eq)]
pub enum ActiveSigners<'a> {
    None,
    One(&'a Signatory),
    Many(Vec<&'a Signatory>),
}

impl<'a> ActiveSigners<'a> {
    pub fn into_vec(self) -> Vec<&'a Signatory> {
        match self {
            Self::None => Vec::new(),
            Self::One(signatory) => vec![signatory],
            Self::Many(signatories) => signatories,
        }
    }
}

/// Decides which signers are actionable.
///
/// In sequential mode the only active signer is the lowest-order unsigned one, so no signer
/// is ever activated while a predecessor is unsigned.
pub struct SigningOrderScheduler;

impl SigningOrderScheduler {
    pub fn next_active(mode: SigningMode, signatories: &[Signatory]) -> ActiveSigners<'_> {
        match mode {
            SigningMode::Sequential => signatories
                .iter()
                .filter(|s| !s.is_signed())
                .min_by_key(|s| s.order)
                .filter(|s| Self::predecessors_signed(signatories, s.order))
                .map(ActiveSigners::One)
                .unwrap_or(ActiveSigners::None),
            SigningMode::Parallel => {
                let mut unsigned: Vec<&Signatory> =
                    signatories.iter().filter(|s| !s.is_signed()).collect();
                unsigned.sort_by_key(|s| s.order);
                match unsigned.len() {
                    0 => ActiveSigners::None,
                    1 => ActiveSigners::One(unsigned[0]),
                    _ => ActiveSigners::Many(unsigned),
                }
            }
        }
    }

    /// Creation-time statuses for `count` signers in order 1..=count.
    pub fn initial_statuses(mode: SigningMode, count: usize) -> Vec<SignatoryStatus> {
        (0..count)
            .map(|index| match mode {
                SigningMode::Parallel => SignatoryStatus::Pending,
                SigningMode::Sequential if index == 0 => SignatoryStatus::Pending,
                SigningMode::Sequential => SignatoryStatus::Waiting,
            })
            .collect()
    }

    pub fn predecessors_signed(signatories: &[Signatory], order: u32) -> bool {
        signatories
            .iter()
            .filter(|s| s.order < order)
            .all(Signatory::is_signed)
    }

    /// Lowest unsigned order below `order`, if any.
    pub fn first_unsigned_before(signatories: &[Signatory], order: u32) -> Option<u32> {
        signatories
            .iter()
            .filter(|s| s.order < order && !s.is_signed())
            .map(|s| s.order)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn signatories(statuses: &[SignatoryStatus]) -> Vec<Signatory> {
        let request_id = Uuid::new_v4();
        statuses
            .iter()
            .enumerate()
            .map(|(index, status)| Signatory {
                id: Uuid::new_v4(),
                request_id,
                order: index as u32 + 1,
                name: format!("Signer {}", index + 1),
                email: format!("s{}@example.com", index + 1),
                provider_signing_token: None,
                status: *status,
                signed_at: None,
                reminders_sent: 0,
                last_reminded_at: None,
            })
            .collect()
    }

    #[test]
    fn sequential_activates_lowest_unsigned() {
        use SignatoryStatus::*;
        let list = signatories(&[Signed, Pending, Waiting]);
        match SigningOrderScheduler::next_active(SigningMode::Sequential, &list) {
            ActiveSigners::One(s) => assert_eq!(s.order, 2),
            other => panic!("unexpected {other:?}"),
        }

        let done = signatories(&[Signed, Signed]);
        assert_eq!(
            SigningOrderScheduler::next_active(SigningMode::Sequential, &done),
            ActiveSigners::None
        );
    }

    #[test]
    fn parallel_activates_every_unsigned() {
        use SignatoryStatus::*;
        let list = signatories(&[Pending, Signed, Pending]);
        let active = SigningOrderScheduler::next_active(SigningMode::Parallel, &list).into_vec();
        let orders: Vec<u32> = active.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 3]);
    }

    #[test]
    fn initial_statuses_follow_mode() {
        use SignatoryStatus::*;
        assert_eq!(
            SigningOrderScheduler::initial_statuses(SigningMode::Sequential, 3),
            vec![Pending, Waiting, Waiting]
        );
        assert_eq!(
            SigningOrderScheduler::initial_statuses(SigningMode::Parallel, 2),
            vec![Pending, Pending]
        );
    }

    #[test]
    fn predecessor_checks() {
        use SignatoryStatus::*;
        let list = signatories(&[Signed, Pending, Waiting]);
        assert!(SigningOrderScheduler::predecessors_signed(&list, 2));
        assert!(!SigningOrderScheduler::predecessors_signed(&list, 3));
        assert_eq!(SigningOrderScheduler::first_unsigned_before(&list, 3), Some(2));
        assert_eq!(SigningOrderScheduler::first_unsigned_before(&list, 1), None);
    }
}
