//! # Match Transaction
//!
//! Links one donation to one request inside an open store transaction.
//!
//! ## Protocol
//!
//! ```text
//! read donation FOR UPDATE ── missing ──→ NotFound
//!        │ not pending ─────────────────→ DonationTaken
//! read request FOR UPDATE ─── missing ──→ NotFound
//!        │ not pending ─────────────────→ RequestTaken
//! owner == requester ───────────────────→ ForbiddenSelfMatch
//! UPDATE donation WHERE status=pending ── 0 rows → DonationTaken
//! UPDATE request  WHERE status=pending ── 0 rows → RequestTaken
//! read both back, check link invariant
//! ```
//!
//! Any error leaves the enclosing transaction to roll back, so either both
//! rows change or neither does.

use crate::domain::{
    invariant_link_consistent, invariant_not_self_match, DonationId, DonationStatus, MatchError,
    MatchedPair, RequestId, RequestStatus, Unavailability,
};
use crate::ports::StoreTransaction;

/// Atomically claim `donation` for `request`.
///
/// Must run inside [`crate::ports::RecordStore::transaction`]; the caller's
/// scope commits on `Ok` and rolls back on `Err`.
pub fn commit_match(
    tx: &mut dyn StoreTransaction,
    donation_id: DonationId,
    request_id: RequestId,
) -> Result<MatchedPair, MatchError> {
    let donation = tx
        .donation_for_update(donation_id)?
        .ok_or(Unavailability::DonationNotFound(donation_id))?;
    if !donation.is_pending() {
        return Err(Unavailability::DonationTaken(donation_id).into());
    }

    let request = tx
        .request_for_update(request_id)?
        .ok_or(Unavailability::RequestNotFound(request_id))?;
    if !request.is_pending() {
        return Err(Unavailability::RequestTaken(request_id).into());
    }

    invariant_not_self_match(donation.owner, request.requester)?;

    let claimed = tx.conditional_update_donation(
        donation_id,
        DonationStatus::Pending,
        DonationStatus::Accepted,
        request.requester,
    )?;
    if claimed == 0 {
        return Err(Unavailability::DonationTaken(donation_id).into());
    }

    let linked = tx.conditional_update_request(
        request_id,
        RequestStatus::Pending,
        RequestStatus::Matched,
        donation_id,
    )?;
    if linked == 0 {
        return Err(Unavailability::RequestTaken(request_id).into());
    }

    let pair = MatchedPair {
        donation: tx
            .donation_for_update(donation_id)?
            .ok_or(Unavailability::DonationNotFound(donation_id))?,
        request: tx
            .request_for_update(request_id)?
            .ok_or(Unavailability::RequestNotFound(request_id))?,
    };
    invariant_link_consistent(&pair.donation, &pair.request)?;
    Ok(pair)
}
