//! # Outbound Ports
//!
//! The record store and the clock the matching core depends on.
//!
//! The store is synchronous. [`crate::MatchingService`] drives it from
//! `spawn_blocking`, so adapters are free to block on locks and disk.

use crate::domain::{
    Donation, DonationDraft, DonationId, DonationStatus, PendingQuery, Request, RequestDraft,
    RequestId, RequestStatus, StoreError, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Operations available inside one store transaction.
///
/// Every read returns state as of this transaction, including its own
/// uncommitted writes. Nothing is visible to other callers until the
/// enclosing [`RecordStore::transaction`] commits.
pub trait StoreTransaction {
    /// Read a donation, locking it against concurrent claims.
    fn donation_for_update(&mut self, id: DonationId) -> Result<Option<Donation>, StoreError>;

    /// Read a request, locking it against concurrent claims.
    fn request_for_update(&mut self, id: RequestId) -> Result<Option<Request>, StoreError>;

    /// The request currently linked to a donation, if any.
    fn request_linked_to(&mut self, donation: DonationId) -> Result<Option<Request>, StoreError>;

    /// Pending donations matching the query.
    fn pending_donations(&mut self, query: &PendingQuery) -> Result<Vec<Donation>, StoreError>;

    /// Pending requests matching the query.
    fn pending_requests(&mut self, query: &PendingQuery) -> Result<Vec<Request>, StoreError>;

    /// Insert a new pending donation.
    fn insert_pending_donation(
        &mut self,
        owner: UserId,
        draft: &DonationDraft,
    ) -> Result<Donation, StoreError>;

    /// Insert a new pending request.
    fn insert_pending_request(
        &mut self,
        requester: UserId,
        draft: &RequestDraft,
    ) -> Result<Request, StoreError>;

    /// Move a donation from `expected` to `next`, recording who accepted it.
    ///
    /// Returns the number of rows changed: 0 when the donation is missing or
    /// not in `expected` any more.
    fn conditional_update_donation(
        &mut self,
        id: DonationId,
        expected: DonationStatus,
        next: DonationStatus,
        accepted_by: UserId,
    ) -> Result<u64, StoreError>;

    /// Move a request from `expected` to `next`, recording the linked donation.
    ///
    /// Returns the number of rows changed. Fails with
    /// [`StoreError::Constraint`] if another request already links `donation`.
    fn conditional_update_request(
        &mut self,
        id: RequestId,
        expected: RequestStatus,
        next: RequestStatus,
        donation: DonationId,
    ) -> Result<u64, StoreError>;
}

/// Durable storage of donations and requests.
pub trait RecordStore: Send + Sync + 'static {
    /// Run `f` inside a transaction.
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise. A panic inside `f`
    /// also rolls back, since the transaction is released on drop.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>;

    /// Read a donation.
    fn get_donation(&self, id: DonationId) -> Result<Option<Donation>, StoreError>;

    /// Read a request.
    fn get_request(&self, id: RequestId) -> Result<Option<Request>, StoreError>;

    /// Pending donations matching the query, outside any transaction.
    fn scan_pending_donations(&self, query: &PendingQuery) -> Result<Vec<Donation>, StoreError>;

    /// Pending requests matching the query, outside any transaction.
    fn scan_pending_requests(&self, query: &PendingQuery) -> Result<Vec<Request>, StoreError>;

    /// Every donation owned by `owner`, newest first.
    fn donations_owned_by(&self, owner: UserId) -> Result<Vec<Donation>, StoreError>;

    /// Every request created by `requester`, newest first.
    fn requests_owned_by(&self, requester: UserId) -> Result<Vec<Request>, StoreError>;

    /// The request linked to `donation`, if any.
    fn request_matched_to(&self, donation: DonationId) -> Result<Option<Request>, StoreError>;

    /// Verify the store answers and report basic figures.
    fn health_check(&self) -> Result<StoreHealth, StoreError>;

    /// Consistent copy of every row, for integrity audits.
    fn snapshot(&self) -> Result<StoreSnapshot, StoreError>;

    /// Insert a pending donation in its own transaction.
    fn insert_pending_donation(
        &self,
        owner: UserId,
        draft: &DonationDraft,
    ) -> Result<Donation, StoreError> {
        self.transaction(|tx| tx.insert_pending_donation(owner, draft))
    }

    /// Insert a pending request in its own transaction.
    fn insert_pending_request(
        &self,
        requester: UserId,
        draft: &RequestDraft,
    ) -> Result<Request, StoreError> {
        self.transaction(|tx| tx.insert_pending_request(requester, draft))
    }
}

/// Every donation and request at one point in time, in id order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// All donations.
    pub donations: Vec<Donation>,
    /// All requests.
    pub requests: Vec<Request>,
}

/// Store health report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHealth {
    /// Adapter name.
    pub backend: String,
    /// Store clock at the time of the check.
    pub now: Timestamp,
    /// Donations still pending.
    pub pending_donations: u64,
    /// Requests still pending.
    pub pending_requests: u64,
}

/// Time source - outbound port.
pub trait TimeSource: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven time source for deterministic ordering.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicU64,
}

impl ManualTimeSource {
    /// Start at `start` milliseconds.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
