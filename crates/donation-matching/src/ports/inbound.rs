//! # Inbound Ports
//!
//! API trait defining what the matching core offers to a calling layer.
//! Authentication happens before these calls: every `UserId` here is trusted.

use crate::domain::{
    AcceptContext, BloodGroup, Donation, DonationActivity, DonationCreation, DonationDraft,
    DonationId, ListingFilter, MatchError, MatchedPair, OrganType, Request, RequestActivity,
    RequestCreation, RequestDraft, RequestId, UserId,
};
use crate::ports::outbound::StoreHealth;
use async_trait::async_trait;

/// Matching API - inbound port.
#[async_trait]
pub trait MatchingApi: Send + Sync {
    /// Create a pending donation and try to match it against waiting requests.
    ///
    /// Fails only if the donation itself cannot be stored; matching problems
    /// are reported in the returned outcome.
    async fn create_donation(
        &self,
        owner: UserId,
        draft: DonationDraft,
    ) -> Result<DonationCreation, MatchError>;

    /// Create a pending request and try to match it against offered donations.
    async fn create_request(
        &self,
        requester: UserId,
        draft: RequestDraft,
    ) -> Result<RequestCreation, MatchError>;

    /// Claim a pending donation for one of the accepter's pending requests.
    async fn accept_donation(
        &self,
        donation: DonationId,
        context: AcceptContext,
    ) -> Result<MatchedPair, MatchError>;

    /// Create a donation for a specific pending request and link them atomically.
    async fn fulfill_request(
        &self,
        request: RequestId,
        donor: UserId,
        draft: DonationDraft,
    ) -> Result<MatchedPair, MatchError>;

    /// Pending donations, newest first.
    async fn list_available_donations(
        &self,
        filter: ListingFilter,
    ) -> Result<Vec<Donation>, MatchError>;

    /// Pending requests, newest first.
    async fn list_available_requests(
        &self,
        filter: ListingFilter,
    ) -> Result<Vec<Request>, MatchError>;

    /// Pending requests a prospective donor could serve, oldest first.
    async fn preview_donation_matches(
        &self,
        organ: OrganType,
        donor_group: BloodGroup,
        excluding: UserId,
    ) -> Result<Vec<Request>, MatchError>;

    /// Pending donations a prospective recipient could receive, oldest first.
    async fn preview_request_matches(
        &self,
        organ: OrganType,
        required_group: BloodGroup,
        excluding: UserId,
    ) -> Result<Vec<Donation>, MatchError>;

    /// A user's own donations with their linked requests, newest first.
    async fn my_donations(&self, owner: UserId) -> Result<Vec<DonationActivity>, MatchError>;

    /// A user's own requests with their linked donations, newest first.
    async fn my_requests(&self, requester: UserId) -> Result<Vec<RequestActivity>, MatchError>;

    /// Check the store is reachable.
    async fn health_check(&self) -> Result<StoreHealth, MatchError>;
}
