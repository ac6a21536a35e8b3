//! # Match Finder
//!
//! Pure search over an oldest-first pool of pending counterparts.
//!
//! A new donation probes the request pool with
//! `is_compatible(new_donor, candidate_required)`; a new request probes the
//! donation pool with `is_compatible(candidate_donor, new_required)`. The
//! first acceptable candidate in pool order wins, so the earliest arrival is
//! served first.

use super::compatibility::is_compatible;
use crate::domain::{BloodGroup, Donation, OrganType, Request, Side, UserId};

/// An entry that can sit in a matching pool.
pub trait PoolEntry {
    /// Side this entry is on.
    const SIDE: Side;

    /// Owning user.
    fn owner(&self) -> UserId;

    /// Donor group for donations, required group for requests.
    fn blood_group(&self) -> BloodGroup;

    /// Organ offered or needed.
    fn organ(&self) -> &OrganType;
}

impl PoolEntry for Donation {
    const SIDE: Side = Side::Donor;

    fn owner(&self) -> UserId {
        self.owner
    }

    fn blood_group(&self) -> BloodGroup {
        self.blood_group
    }

    fn organ(&self) -> &OrganType {
        &self.organ
    }
}

impl PoolEntry for Request {
    const SIDE: Side = Side::Recipient;

    fn owner(&self) -> UserId {
        self.requester
    }

    fn blood_group(&self) -> BloodGroup {
        self.blood_group
    }

    fn organ(&self) -> &OrganType {
        &self.organ_needed
    }
}

/// What the searching side brings to a search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchProbe {
    /// Side of the searcher.
    pub side: Side,
    /// Organ being matched.
    pub organ: OrganType,
    /// Searcher's blood group.
    pub blood_group: BloodGroup,
    /// Entries owned by this user are skipped.
    pub excluding: Option<UserId>,
}

impl MatchProbe {
    /// A donor searching the request pool.
    pub fn donor(organ: OrganType, blood_group: BloodGroup) -> Self {
        Self {
            side: Side::Donor,
            organ,
            blood_group,
            excluding: None,
        }
    }

    /// A recipient searching the donation pool.
    pub fn recipient(organ: OrganType, blood_group: BloodGroup) -> Self {
        Self {
            side: Side::Recipient,
            organ,
            blood_group,
            excluding: None,
        }
    }

    /// Probe for a freshly created donation, skipping its owner's requests.
    pub fn for_donation(donation: &Donation) -> Self {
        Self::donor(donation.organ.clone(), donation.blood_group).excluding(donation.owner)
    }

    /// Probe for a freshly created request, skipping its owner's donations.
    pub fn for_request(request: &Request) -> Self {
        Self::recipient(request.organ_needed.clone(), request.blood_group)
            .excluding(request.requester)
    }

    /// Skip entries owned by `user`.
    pub fn excluding(mut self, user: UserId) -> Self {
        self.excluding = Some(user);
        self
    }

    /// Check a single candidate.
    pub fn accepts<E: PoolEntry>(&self, candidate: &E) -> bool {
        if E::SIDE != self.side.opposite() || candidate.organ() != &self.organ {
            return false;
        }
        if self.excluding == Some(candidate.owner()) {
            return false;
        }
        match self.side {
            Side::Donor => is_compatible(self.blood_group, candidate.blood_group()),
            Side::Recipient => is_compatible(candidate.blood_group(), self.blood_group),
        }
    }
}

/// First acceptable candidate in pool order.
pub fn find_match<'a, E: PoolEntry>(pool: &'a [E], probe: &MatchProbe) -> Option<&'a E> {
    pool.iter().find(|candidate| probe.accepts(*candidate))
}

/// Every acceptable candidate, in pool order.
pub fn compatible_candidates<'a, E: PoolEntry>(
    pool: &'a [E],
    probe: &'a MatchProbe,
) -> impl Iterator<Item = &'a E> + 'a {
    pool.iter().filter(move |candidate| probe.accepts(*candidate))
}
