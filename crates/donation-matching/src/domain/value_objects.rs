//! # Domain Value Objects
//!
//! Identifiers, blood groups, organ types and the two entry lifecycles.

use super::errors::MatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milliseconds since the Unix epoch, assigned by the store on insert.
pub type Timestamp = u64;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identity of an authenticated user, supplied by the calling layer.
    UserId
);
entity_id!(
    /// Store-assigned identity of a donation.
    DonationId
);
entity_id!(
    /// Store-assigned identity of a request.
    RequestId
);

/// ABO/Rh blood group.
///
/// The set is closed: text that is not one of the eight groups is rejected
/// when parsed, so compatibility is total over this type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodGroup {
    /// O negative, the universal donor.
    #[serde(rename = "O-")]
    ONeg,
    /// O positive.
    #[serde(rename = "O+")]
    OPos,
    /// A negative.
    #[serde(rename = "A-")]
    ANeg,
    /// A positive.
    #[serde(rename = "A+")]
    APos,
    /// B negative.
    #[serde(rename = "B-")]
    BNeg,
    /// B positive.
    #[serde(rename = "B+")]
    BPos,
    /// AB negative.
    #[serde(rename = "AB-")]
    AbNeg,
    /// AB positive, the universal recipient.
    #[serde(rename = "AB+")]
    AbPos,
}

impl BloodGroup {
    /// All eight groups, in a stable order.
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::ONeg,
        BloodGroup::OPos,
        BloodGroup::ANeg,
        BloodGroup::APos,
        BloodGroup::BNeg,
        BloodGroup::BPos,
        BloodGroup::AbNeg,
        BloodGroup::AbPos,
    ];

    /// Canonical text form, e.g. `"AB-"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::ONeg => "O-",
            BloodGroup::OPos => "O+",
            BloodGroup::ANeg => "A-",
            BloodGroup::APos => "A+",
            BloodGroup::BNeg => "B-",
            BloodGroup::BPos => "B+",
            BloodGroup::AbNeg => "AB-",
            BloodGroup::AbPos => "AB+",
        }
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodGroup {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        BloodGroup::ALL
            .into_iter()
            .find(|group| group.as_str() == normalized)
            .ok_or_else(|| MatchError::Validation(format!("unknown blood group: {:?}", s)))
    }
}

/// Organ type, normalised to trimmed lower-case text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganType(String);

impl OrganType {
    /// Normalise and validate an organ name.
    pub fn new(raw: &str) -> Result<Self, MatchError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(MatchError::Validation("organ type must not be empty".into()));
        }
        Ok(Self(normalized))
    }

    /// Normalised text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrganType {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrganType::new(s)
    }
}

impl TryFrom<String> for OrganType {
    type Error = MatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        OrganType::new(&value)
    }
}

impl From<OrganType> for String {
    fn from(value: OrganType) -> Self {
        value.0
    }
}

/// Which side of a match an entry sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Offers an organ.
    Donor,
    /// Needs an organ.
    Recipient,
}

impl Side {
    /// The side an entry of this side is matched against.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Donor => Side::Recipient,
            Side::Recipient => Side::Donor,
        }
    }
}

/// Donation lifecycle.
///
/// ```text
/// Pending ──accept/match──→ Accepted
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    /// Open for matching.
    #[default]
    Pending,
    /// Claimed by a recipient. Terminal.
    Accepted,
}

impl DonationStatus {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: DonationStatus) -> bool {
        matches!((self, next), (DonationStatus::Pending, DonationStatus::Accepted))
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DonationStatus::Accepted)
    }

    /// Stored text form.
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Accepted => "accepted",
        }
    }
}

impl FromStr for DonationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DonationStatus::Pending),
            "accepted" => Ok(DonationStatus::Accepted),
            other => Err(format!("unknown donation status: {other}")),
        }
    }
}

/// Request lifecycle.
///
/// ```text
/// Pending ──match/fulfil──→ Matched
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Open for matching.
    #[default]
    Pending,
    /// Linked to a donation. Terminal.
    Matched,
}

impl RequestStatus {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!((self, next), (RequestStatus::Pending, RequestStatus::Matched))
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Matched)
    }

    /// Stored text form.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Matched => "matched",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "matched" => Ok(RequestStatus::Matched),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

/// Arrival order of a scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanOrder {
    /// Earliest first. Used for matching fairness.
    #[default]
    OldestFirst,
    /// Latest first. Used for browsing.
    NewestFirst,
}

/// Case-folded form of a city name, as compared by the city filter.
pub fn city_key(city: &str) -> String {
    city.trim().to_lowercase()
}

/// Optional filters for browsing pending entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFilter {
    /// Exact organ type.
    pub organ: Option<OrganType>,
    /// Exact blood group.
    pub blood_group: Option<BloodGroup>,
    /// Case-insensitive substring of the city.
    pub city: Option<String>,
}

impl ListingFilter {
    /// Filter on organ.
    pub fn with_organ(mut self, organ: OrganType) -> Self {
        self.organ = Some(organ);
        self
    }

    /// Filter on blood group.
    pub fn with_blood_group(mut self, group: BloodGroup) -> Self {
        self.blood_group = Some(group);
        self
    }

    /// Filter on city substring. Blank text disables the filter.
    pub fn with_city(mut self, city: &str) -> Self {
        let trimmed = city.trim();
        self.city = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Check an entry's fields against every active filter.
    pub fn accepts(&self, organ: &OrganType, group: BloodGroup, city: &str) -> bool {
        if self.organ.as_ref().is_some_and(|o| o != organ) {
            return false;
        }
        if self.blood_group.is_some_and(|g| g != group) {
            return false;
        }
        match &self.city {
            Some(needle) => city_key(city).contains(&city_key(needle)),
            None => true,
        }
    }
}

/// A scan over pending entries of one side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingQuery {
    /// Field filters.
    pub filter: ListingFilter,
    /// Restrict to entries owned by this user.
    pub owner: Option<UserId>,
    /// Arrival order.
    pub order: ScanOrder,
    /// Maximum number of entries returned.
    pub limit: Option<usize>,
}

impl PendingQuery {
    /// Oldest-first scan of every pending entry for an organ.
    pub fn matching_pool(organ: &OrganType) -> Self {
        Self {
            filter: ListingFilter::default().with_organ(organ.clone()),
            order: ScanOrder::OldestFirst,
            ..Self::default()
        }
    }

    /// Newest-first scan for browsing.
    pub fn browse(filter: ListingFilter, limit: usize) -> Self {
        Self {
            filter,
            owner: None,
            order: ScanOrder::NewestFirst,
            limit: Some(limit),
        }
    }

    /// Restrict to one owner.
    pub fn owned_by(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }
}
