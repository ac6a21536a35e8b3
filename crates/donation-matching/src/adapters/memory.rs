//! In-Memory Record Store
//!
//! Implements `RecordStore` over two ordered maps behind one `RwLock`.
//!
//! A transaction holds the write lock for its whole life, so transactions are
//! serialised. Writes are staged in an overlay and only folded into the tables
//! on commit; dropping the transaction discards the overlay.

use crate::algorithms::PoolEntry;
use crate::domain::{
    Donation, DonationDraft, DonationId, DonationStatus, PendingQuery, Request, RequestDraft,
    RequestId, RequestStatus, ScanOrder, StoreError, Timestamp, UserId,
};
use crate::ports::outbound::{
    RecordStore, StoreHealth, StoreSnapshot, StoreTransaction, SystemTimeSource, TimeSource,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Fields the in-memory scans need from a row.
trait Row: PoolEntry + Clone {
    fn is_pending(&self) -> bool;
    fn city(&self) -> &str;
    fn sort_key(&self) -> (Timestamp, i64);
}

impl Row for Donation {
    fn is_pending(&self) -> bool {
        Donation::is_pending(self)
    }

    fn city(&self) -> &str {
        &self.city
    }

    fn sort_key(&self) -> (Timestamp, i64) {
        (self.created_at, self.id.0)
    }
}

impl Row for Request {
    fn is_pending(&self) -> bool {
        Request::is_pending(self)
    }

    fn city(&self) -> &str {
        &self.city
    }

    fn sort_key(&self) -> (Timestamp, i64) {
        (self.created_at, self.id.0)
    }
}

fn select_pending<'a, R: Row + 'a>(rows: impl Iterator<Item = &'a R>, query: &PendingQuery) -> Vec<R> {
    let mut selected: Vec<R> = rows
        .filter(|row| row.is_pending())
        .filter(|row| query.owner.map_or(true, |owner| row.owner() == owner))
        .filter(|row| query.filter.accepts(row.organ(), row.blood_group(), row.city()))
        .cloned()
        .collect();
    sort_rows(&mut selected, query.order);
    if let Some(limit) = query.limit {
        selected.truncate(limit);
    }
    selected
}

fn sort_rows<R: Row>(rows: &mut [R], order: ScanOrder) {
    match order {
        ScanOrder::OldestFirst => rows.sort_by_key(|row| row.sort_key()),
        ScanOrder::NewestFirst => rows.sort_by_key(|row| std::cmp::Reverse(row.sort_key())),
    }
}

#[derive(Debug, Default)]
struct Tables {
    donations: BTreeMap<DonationId, Donation>,
    requests: BTreeMap<RequestId, Request>,
    last_donation_id: i64,
    last_request_id: i64,
}

/// Uncommitted writes of one transaction.
#[derive(Debug)]
struct Overlay {
    donations: BTreeMap<DonationId, Donation>,
    requests: BTreeMap<RequestId, Request>,
    last_donation_id: i64,
    last_request_id: i64,
}

impl Tables {
    fn apply(&mut self, overlay: Overlay) {
        self.donations.extend(overlay.donations);
        self.requests.extend(overlay.requests);
        self.last_donation_id = overlay.last_donation_id;
        self.last_request_id = overlay.last_request_id;
    }
}

struct MemoryTransaction<'a> {
    base: &'a Tables,
    staged: Overlay,
    now: Timestamp,
}

impl<'a> MemoryTransaction<'a> {
    fn begin(base: &'a Tables, now: Timestamp) -> Self {
        Self {
            base,
            staged: Overlay {
                donations: BTreeMap::new(),
                requests: BTreeMap::new(),
                last_donation_id: base.last_donation_id,
                last_request_id: base.last_request_id,
            },
            now,
        }
    }

    fn donation(&self, id: DonationId) -> Option<&Donation> {
        self.staged
            .donations
            .get(&id)
            .or_else(|| self.base.donations.get(&id))
    }

    fn request(&self, id: RequestId) -> Option<&Request> {
        self.staged
            .requests
            .get(&id)
            .or_else(|| self.base.requests.get(&id))
    }

    fn donations(&self) -> impl Iterator<Item = &Donation> {
        merged(&self.base.donations, &self.staged.donations)
    }

    fn requests(&self) -> impl Iterator<Item = &Request> {
        merged(&self.base.requests, &self.staged.requests)
    }
}

/// Committed rows with staged versions substituted, then staged inserts.
fn merged<'t, K: Ord, V>(
    base: &'t BTreeMap<K, V>,
    staged: &'t BTreeMap<K, V>,
) -> impl Iterator<Item = &'t V> {
    let fresh = staged
        .iter()
        .filter(move |(id, _)| !base.contains_key(*id))
        .map(|(_, row)| row);
    base.iter()
        .map(move |(id, row)| staged.get(id).unwrap_or(row))
        .chain(fresh)
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn donation_for_update(&mut self, id: DonationId) -> Result<Option<Donation>, StoreError> {
        Ok(self.donation(id).cloned())
    }

    fn request_for_update(&mut self, id: RequestId) -> Result<Option<Request>, StoreError> {
        Ok(self.request(id).cloned())
    }

    fn request_linked_to(&mut self, donation: DonationId) -> Result<Option<Request>, StoreError> {
        Ok(self
            .requests()
            .find(|r| r.matched_donation == Some(donation))
            .cloned())
    }

    fn pending_donations(&mut self, query: &PendingQuery) -> Result<Vec<Donation>, StoreError> {
        Ok(select_pending(self.donations(), query))
    }

    fn pending_requests(&mut self, query: &PendingQuery) -> Result<Vec<Request>, StoreError> {
        Ok(select_pending(self.requests(), query))
    }

    fn insert_pending_donation(
        &mut self,
        owner: UserId,
        draft: &DonationDraft,
    ) -> Result<Donation, StoreError> {
        self.staged.last_donation_id += 1;
        let donation = Donation {
            id: DonationId(self.staged.last_donation_id),
            owner,
            donor_name: draft.donor_name.clone(),
            age: draft.age,
            blood_group: draft.blood_group,
            organ: draft.organ.clone(),
            contact: draft.contact.clone(),
            city: draft.city.clone(),
            availability_date: draft.availability_date,
            medical_notes: draft.medical_notes.clone(),
            requested_compensation: draft.requested_compensation,
            status: DonationStatus::Pending,
            accepted_by: None,
            created_at: self.now,
        };
        self.staged.donations.insert(donation.id, donation.clone());
        Ok(donation)
    }

    fn insert_pending_request(
        &mut self,
        requester: UserId,
        draft: &RequestDraft,
    ) -> Result<Request, StoreError> {
        self.staged.last_request_id += 1;
        let request = Request {
            id: RequestId(self.staged.last_request_id),
            requester,
            requester_name: draft.requester_name.clone(),
            age: draft.age,
            blood_group: draft.blood_group,
            organ_needed: draft.organ_needed.clone(),
            contact: draft.contact.clone(),
            city: draft.city.clone(),
            medical_reason: draft.medical_reason.clone(),
            budget: draft.budget,
            status: RequestStatus::Pending,
            matched_donation: None,
            created_at: self.now,
        };
        self.staged.requests.insert(request.id, request.clone());
        Ok(request)
    }

    fn conditional_update_donation(
        &mut self,
        id: DonationId,
        expected: DonationStatus,
        next: DonationStatus,
        accepted_by: UserId,
    ) -> Result<u64, StoreError> {
        if !expected.can_transition_to(next) {
            return Err(StoreError::IllegalTransition {
                from: expected.as_str(),
                to: next.as_str(),
            });
        }
        let Some(current) = self.donation(id).filter(|d| d.status == expected) else {
            return Ok(0);
        };
        let mut updated = current.clone();
        updated.status = next;
        updated.accepted_by = Some(accepted_by);
        self.staged.donations.insert(id, updated);
        Ok(1)
    }

    fn conditional_update_request(
        &mut self,
        id: RequestId,
        expected: RequestStatus,
        next: RequestStatus,
        donation: DonationId,
    ) -> Result<u64, StoreError> {
        if !expected.can_transition_to(next) {
            return Err(StoreError::IllegalTransition {
                from: expected.as_str(),
                to: next.as_str(),
            });
        }
        let Some(current) = self.request(id).filter(|r| r.status == expected) else {
            return Ok(0);
        };
        if let Some(holder) = self
            .requests()
            .find(|r| r.id != id && r.matched_donation == Some(donation))
        {
            return Err(StoreError::Constraint(format!(
                "donation {} already linked to request {}",
                donation, holder.id
            )));
        }
        let mut updated = current.clone();
        updated.status = next;
        updated.matched_donation = Some(donation);
        self.staged.requests.insert(id, updated);
        Ok(1)
    }
}

/// In-memory record store.
///
/// Suitable for tests and single-process deployments that need no durability.
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    clock: Arc<dyn TimeSource>,
}

impl InMemoryRecordStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemTimeSource))
    }

    /// Create an empty store on a caller-supplied clock.
    pub fn with_clock(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self.tables.write();
        let mut tx = MemoryTransaction::begin(&tables, self.clock.now());
        let value = f(&mut tx)?;
        let staged = tx.staged;
        debug!(
            "[matching] memory commit: {} donation / {} request writes",
            staged.donations.len(),
            staged.requests.len()
        );
        tables.apply(staged);
        Ok(value)
    }

    fn get_donation(&self, id: DonationId) -> Result<Option<Donation>, StoreError> {
        Ok(self.tables.read().donations.get(&id).cloned())
    }

    fn get_request(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        Ok(self.tables.read().requests.get(&id).cloned())
    }

    fn scan_pending_donations(&self, query: &PendingQuery) -> Result<Vec<Donation>, StoreError> {
        Ok(select_pending(self.tables.read().donations.values(), query))
    }

    fn scan_pending_requests(&self, query: &PendingQuery) -> Result<Vec<Request>, StoreError> {
        Ok(select_pending(self.tables.read().requests.values(), query))
    }

    fn donations_owned_by(&self, owner: UserId) -> Result<Vec<Donation>, StoreError> {
        let tables = self.tables.read();
        let mut owned: Vec<Donation> = tables
            .donations
            .values()
            .filter(|d| d.owner == owner)
            .cloned()
            .collect();
        sort_rows(&mut owned, ScanOrder::NewestFirst);
        Ok(owned)
    }

    fn requests_owned_by(&self, requester: UserId) -> Result<Vec<Request>, StoreError> {
        let tables = self.tables.read();
        let mut owned: Vec<Request> = tables
            .requests
            .values()
            .filter(|r| r.requester == requester)
            .cloned()
            .collect();
        sort_rows(&mut owned, ScanOrder::NewestFirst);
        Ok(owned)
    }

    fn request_matched_to(&self, donation: DonationId) -> Result<Option<Request>, StoreError> {
        Ok(self
            .tables
            .read()
            .requests
            .values()
            .find(|r| r.matched_donation == Some(donation))
            .cloned())
    }

    fn health_check(&self) -> Result<StoreHealth, StoreError> {
        let tables = self.tables.read();
        Ok(StoreHealth {
            backend: "memory".into(),
            now: self.clock.now(),
            pending_donations: tables.donations.values().filter(|d| d.is_pending()).count() as u64,
            pending_requests: tables.requests.values().filter(|r| r.is_pending()).count() as u64,
        })
    }

    fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let tables = self.tables.read();
        Ok(StoreSnapshot {
            donations: tables.donations.values().cloned().collect(),
            requests: tables.requests.values().cloned().collect(),
        })
    }
}
