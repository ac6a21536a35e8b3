//! # Domain Entities
//!
//! Donations, requests and the results of matching them.

use super::value_objects::{
    BloodGroup, DonationId, DonationStatus, OrganType, RequestId, RequestStatus, Timestamp,
    UserId,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An offer of an organ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    /// Store-assigned id.
    pub id: DonationId,
    /// User who created the offer.
    pub owner: UserId,
    /// Donor's name.
    pub donor_name: String,
    /// Donor's age in years.
    pub age: u8,
    /// Donor's blood group.
    pub blood_group: BloodGroup,
    /// Organ offered.
    pub organ: OrganType,
    /// Contact details.
    pub contact: String,
    /// City.
    pub city: String,
    /// Date from which the organ is available.
    pub availability_date: NaiveDate,
    /// Free-text medical notes.
    pub medical_notes: Option<String>,
    /// Compensation asked for, zero if none.
    pub requested_compensation: Decimal,
    /// Lifecycle state.
    pub status: DonationStatus,
    /// Recipient who claimed it. Set exactly when `status` is accepted.
    pub accepted_by: Option<UserId>,
    /// Arrival time.
    pub created_at: Timestamp,
}

impl Donation {
    /// Still open for matching.
    pub fn is_pending(&self) -> bool {
        self.status == DonationStatus::Pending
    }
}

/// A need for an organ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Store-assigned id.
    pub id: RequestId,
    /// User who created the request.
    pub requester: UserId,
    /// Patient's name.
    pub requester_name: String,
    /// Patient's age in years.
    pub age: u8,
    /// Blood group the recipient requires.
    pub blood_group: BloodGroup,
    /// Organ needed.
    pub organ_needed: OrganType,
    /// Contact details.
    pub contact: String,
    /// City.
    pub city: String,
    /// Free-text medical reason.
    pub medical_reason: Option<String>,
    /// Budget, zero if unspecified.
    pub budget: Decimal,
    /// Lifecycle state.
    pub status: RequestStatus,
    /// Donation it was linked to. Set exactly when `status` is matched.
    pub matched_donation: Option<DonationId>,
    /// Arrival time.
    pub created_at: Timestamp,
}

impl Request {
    /// Still open for matching.
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// Both sides of a committed match, as read back inside the committing transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    /// The donation, now accepted.
    pub donation: Donation,
    /// The request, now matched.
    pub request: Request,
}

/// Result of the automatic match attempted after a creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MatchOutcome<C> {
    /// Linked to this counterpart.
    Matched(C),
    /// No compatible pending counterpart exists.
    NoMatch,
    /// A counterpart was found but was claimed concurrently.
    Contended,
    /// Automatic matching is switched off.
    Skipped,
    /// Matching failed; the entry was still created.
    Failed(String),
}

impl<C> MatchOutcome<C> {
    /// The counterpart, if a match was committed.
    pub fn counterpart(&self) -> Option<&C> {
        match self {
            MatchOutcome::Matched(c) => Some(c),
            _ => None,
        }
    }

    /// True if a match was committed.
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}

/// A created entry plus what happened when matching it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creation<E, C> {
    /// The entry as it stands after matching.
    pub entry: E,
    /// Automatic matching result.
    pub match_outcome: MatchOutcome<C>,
}

/// A new donation and its automatic match.
pub type DonationCreation = Creation<Donation, Request>;

/// A new request and its automatic match.
pub type RequestCreation = Creation<Request, Donation>;

/// Who is accepting a donation, and for which of their requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptContext {
    /// The accepting user.
    pub accepter: UserId,
    /// Request to link. Defaults to the accepter's oldest pending request for the organ.
    pub request: Option<RequestId>,
}

impl AcceptContext {
    /// Accept on behalf of a user, letting the store pick their request.
    pub fn for_user(accepter: UserId) -> Self {
        Self {
            accepter,
            request: None,
        }
    }

    /// Accept for a specific request.
    pub fn with_request(mut self, request: RequestId) -> Self {
        self.request = Some(request);
        self
    }
}

/// A user's donation with the request that claimed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationActivity {
    /// The donation.
    pub donation: Donation,
    /// The linked request, if accepted.
    pub matched_request: Option<Request>,
}

/// A user's request with the donation it received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestActivity {
    /// The request.
    pub request: Request,
    /// The linked donation, if matched.
    pub matched_donation: Option<Donation>,
}
