//! # Domain Errors
//!
//! Error types for the matching core and its store port.

use super::value_objects::{DonationId, RequestId, UserId};
use thiserror::Error;

/// Why a target entry cannot take part in a match.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Unavailability {
    /// No donation with this id.
    #[error("donation {0} not found")]
    DonationNotFound(DonationId),

    /// No request with this id (or not visible to the caller).
    #[error("request {0} not found")]
    RequestNotFound(RequestId),

    /// Donation already left the pending state.
    #[error("donation {0} is no longer available")]
    DonationTaken(DonationId),

    /// Request already left the pending state.
    #[error("request {0} is no longer available")]
    RequestTaken(RequestId),

    /// The accepter has no pending request the donation could be linked to.
    #[error("no pending request eligible for this donation")]
    NoEligibleRequest,
}

/// Matching service errors.
#[derive(Clone, Debug, Error)]
pub enum MatchError {
    /// Malformed or missing input fields.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Target does not exist or already left its eligible state.
    #[error("Not found or unavailable: {0}")]
    NotFoundOrUnavailable(Unavailability),

    /// A user tried to match against their own entry.
    #[error("User {user} cannot match their own entry")]
    ForbiddenSelfMatch {
        /// The offending user
        user: UserId,
    },

    /// The store could not complete the operation. Safe to retry.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// The store rejected a write that would break a uniqueness rule.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl MatchError {
    /// Only transient storage failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchError::Storage(_))
    }

    /// True if the target was missing or already claimed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, MatchError::NotFoundOrUnavailable(_))
    }
}

impl From<Unavailability> for MatchError {
    fn from(reason: Unavailability) -> Self {
        MatchError::NotFoundOrUnavailable(reason)
    }
}

/// Record store errors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend I/O or driver failure.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Uniqueness or integrity constraint rejected the write.
    #[error("Store constraint violated: {0}")]
    Constraint(String),

    /// A conditional update asked for a transition the lifecycle forbids.
    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition {
        /// Expected current status
        from: &'static str,
        /// Requested status
        to: &'static str,
    },
}

impl From<StoreError> for MatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Constraint(msg) => MatchError::ConstraintViolation(msg),
            other => MatchError::Storage(other.to_string()),
        }
    }
}
