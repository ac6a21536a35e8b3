//! # Domain Invariants
//!
//! Link rules between donations and requests.
//!
//! | Rule | Meaning |
//! |------|---------|
//! | Link consistency | accepted donation ⇔ exactly one matched request references it |
//! | Terminal finality | accepted / matched entries never change again |
//! | No self-match | owner of the donation ≠ requester of the request |

use super::entities::{Donation, Request};
use super::errors::MatchError;
use super::value_objects::{DonationId, DonationStatus, RequestId, RequestStatus, UserId};
use std::collections::HashMap;
use thiserror::Error;

/// Invariant: No self-match.
///
/// A user may never be both sides of a match.
pub fn invariant_not_self_match(donor: UserId, requester: UserId) -> Result<(), MatchError> {
    if donor == requester {
        return Err(MatchError::ForbiddenSelfMatch { user: donor });
    }
    Ok(())
}

/// Invariant: Link consistency for one committed pair.
///
/// Checked on the rows read back inside the committing transaction.
pub fn invariant_link_consistent(donation: &Donation, request: &Request) -> Result<(), MatchError> {
    let consistent = donation.status == DonationStatus::Accepted
        && request.status == RequestStatus::Matched
        && request.matched_donation == Some(donation.id)
        && donation.accepted_by == Some(request.requester);
    if !consistent {
        return Err(MatchError::ConstraintViolation(format!(
            "inconsistent link between donation {} and request {}",
            donation.id, request.id
        )));
    }
    invariant_not_self_match(donation.owner, request.requester)
}

/// A broken link found by [`audit_links`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LinkViolation {
    /// Accepted donation with no matched request pointing at it.
    #[error("donation {0} is accepted but unreferenced")]
    OrphanAcceptance(DonationId),

    /// More than one request points at the same donation.
    #[error("donation {donation} is referenced by {count} requests")]
    SharedDonation {
        /// The over-referenced donation
        donation: DonationId,
        /// How many requests reference it
        count: usize,
    },

    /// Matched request whose donation is missing or still pending.
    #[error("request {0} is matched to a donation that is not accepted")]
    DanglingMatch(RequestId),

    /// Status and link field disagree on a request.
    #[error("request {0} has status and link out of step")]
    HalfLinkedRequest(RequestId),

    /// Status and acceptor field disagree on a donation.
    #[error("donation {0} has status and acceptor out of step")]
    HalfAcceptedDonation(DonationId),

    /// Both sides of a link belong to the same user.
    #[error("donation {donation} and request {request} share an owner")]
    SelfMatch {
        /// The donation
        donation: DonationId,
        /// The request
        request: RequestId,
    },
}

/// Audit a full snapshot of both pools for link violations.
///
/// Returns an empty vector when every invariant holds.
pub fn audit_links(donations: &[Donation], requests: &[Request]) -> Vec<LinkViolation> {
    let mut violations = Vec::new();
    let by_id: HashMap<DonationId, &Donation> = donations.iter().map(|d| (d.id, d)).collect();
    let mut references: HashMap<DonationId, usize> = HashMap::new();

    for request in requests {
        match (request.status, request.matched_donation) {
            (RequestStatus::Matched, Some(donation_id)) => {
                *references.entry(donation_id).or_default() += 1;
                match by_id.get(&donation_id) {
                    Some(d) if d.status == DonationStatus::Accepted => {
                        if d.owner == request.requester {
                            violations.push(LinkViolation::SelfMatch {
                                donation: d.id,
                                request: request.id,
                            });
                        }
                    }
                    _ => violations.push(LinkViolation::DanglingMatch(request.id)),
                }
            }
            (RequestStatus::Pending, None) => {}
            _ => violations.push(LinkViolation::HalfLinkedRequest(request.id)),
        }
    }

    for donation in donations {
        if donation.status.is_terminal() != donation.accepted_by.is_some() {
            violations.push(LinkViolation::HalfAcceptedDonation(donation.id));
        }
        let count = references.get(&donation.id).copied().unwrap_or(0);
        if count > 1 {
            violations.push(LinkViolation::SharedDonation {
                donation: donation.id,
                count,
            });
        }
        if donation.status == DonationStatus::Accepted && count == 0 {
            violations.push(LinkViolation::OrphanAcceptance(donation.id));
        }
    }

    violations
}
