//! # Matching Service
//!
//! Application service wiring compatibility, search and the atomic link
//! to a record store.
//!
//! Every store interaction runs on tokio's blocking pool. Each decision that
//! changes state re-reads the rows it depends on inside the transaction that
//! changes them; nothing read earlier is trusted.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::algorithms::{commit_match, compatible_candidates, find_match, MatchProbe};
use crate::config::MatchingConfig;
use crate::domain::{
    audit_links, invariant_not_self_match, AcceptContext, BloodGroup, Creation, Donation,
    DonationActivity, DonationCreation, DonationDraft, DonationId, LinkViolation, ListingFilter,
    MatchError, MatchOutcome, MatchedPair, OrganType, PendingQuery, Request, RequestActivity,
    RequestCreation, RequestDraft, RequestId, Unavailability, UserId,
};
use crate::ports::{MatchingApi, RecordStore, StoreHealth};

/// Matching Service - orchestrates creation, matching and claiming.
pub struct MatchingService<S: RecordStore> {
    /// Configuration.
    config: MatchingConfig,
    /// Record store.
    store: Arc<S>,
}

impl<S: RecordStore> MatchingService<S> {
    /// Create a new matching service.
    pub fn new(store: Arc<S>, config: MatchingConfig) -> Self {
        Self { config, store }
    }

    /// Active configuration.
    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Give the store back, e.g. to close it on shutdown.
    pub fn into_store(self) -> Arc<S> {
        self.store
    }

    /// Check every link in the store.
    pub async fn audit_links(&self) -> Result<Vec<LinkViolation>, MatchError> {
        let snapshot = self.run(|store| Ok(store.snapshot()?)).await?;
        Ok(audit_links(&snapshot.donations, &snapshot.requests))
    }

    /// Internal: run store work on the blocking pool.
    async fn run<T, F>(&self, work: F) -> Result<T, MatchError>
    where
        F: FnOnce(&S) -> Result<T, MatchError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|e| MatchError::Storage(format!("store task failed: {e}")))?
    }
}

/// Internal: settle a creation's automatic match, never failing the creation.
fn settle<E, C>(
    op: Uuid,
    created: E,
    attempt: Result<Creation<E, C>, MatchError>,
) -> Creation<E, C> {
    match attempt {
        Ok(creation) => creation,
        Err(e) if e.is_unavailable() => {
            debug!("[matching] {op} candidate claimed concurrently: {e}");
            Creation {
                entry: created,
                match_outcome: MatchOutcome::Contended,
            }
        }
        Err(e) => {
            warn!("[matching] {op} automatic match failed: {e}");
            Creation {
                entry: created,
                match_outcome: MatchOutcome::Failed(e.to_string()),
            }
        }
    }
}

/// Internal: match a just-created donation against waiting requests.
fn auto_match_donation<S: RecordStore>(
    store: &S,
    donation_id: DonationId,
) -> Result<DonationCreation, MatchError> {
    store.transaction(|tx| {
        let donation = tx
            .donation_for_update(donation_id)?
            .ok_or(Unavailability::DonationNotFound(donation_id))?;
        if !donation.is_pending() {
            // Claimed by a concurrent creation between insert and here.
            let match_outcome = match tx.request_linked_to(donation.id)? {
                Some(request) => MatchOutcome::Matched(request),
                None => MatchOutcome::Contended,
            };
            return Ok(Creation {
                entry: donation,
                match_outcome,
            });
        }
        let pool = tx.pending_requests(&PendingQuery::matching_pool(&donation.organ))?;
        let Some(candidate) = find_match(&pool, &MatchProbe::for_donation(&donation)) else {
            return Ok(Creation {
                entry: donation,
                match_outcome: MatchOutcome::NoMatch,
            });
        };
        let pair = commit_match(tx, donation.id, candidate.id)?;
        Ok(Creation {
            entry: pair.donation,
            match_outcome: MatchOutcome::Matched(pair.request),
        })
    })
}

/// Internal: match a just-created request against offered donations.
fn auto_match_request<S: RecordStore>(
    store: &S,
    request_id: RequestId,
) -> Result<RequestCreation, MatchError> {
    store.transaction(|tx| {
        let request = tx
            .request_for_update(request_id)?
            .ok_or(Unavailability::RequestNotFound(request_id))?;
        if !request.is_pending() {
            let linked = match request.matched_donation {
                Some(id) => tx.donation_for_update(id)?,
                None => None,
            };
            let match_outcome = match linked {
                Some(donation) => MatchOutcome::Matched(donation),
                None => MatchOutcome::Contended,
            };
            return Ok(Creation {
                entry: request,
                match_outcome,
            });
        }
        let pool = tx.pending_donations(&PendingQuery::matching_pool(&request.organ_needed))?;
        let Some(candidate) = find_match(&pool, &MatchProbe::for_request(&request)) else {
            return Ok(Creation {
                entry: request,
                match_outcome: MatchOutcome::NoMatch,
            });
        };
        let pair = commit_match(tx, candidate.id, request.id)?;
        Ok(Creation {
            entry: pair.request,
            match_outcome: MatchOutcome::Matched(pair.donation),
        })
    })
}

/// Internal: claim a donation for one of the accepter's requests.
fn accept_in_store<S: RecordStore>(
    store: &S,
    donation_id: DonationId,
    context: AcceptContext,
) -> Result<MatchedPair, MatchError> {
    store.transaction(|tx| {
        let donation = tx
            .donation_for_update(donation_id)?
            .ok_or(Unavailability::DonationNotFound(donation_id))?;
        invariant_not_self_match(donation.owner, context.accepter)?;
        if !donation.is_pending() {
            return Err(Unavailability::DonationTaken(donation_id).into());
        }

        let request_id = match context.request {
            Some(id) => {
                // Someone else's request is indistinguishable from a missing one.
                let request = tx
                    .request_for_update(id)?
                    .filter(|r| r.requester == context.accepter)
                    .ok_or(Unavailability::RequestNotFound(id))?;
                if request.organ_needed != donation.organ {
                    return Err(MatchError::Validation(format!(
                        "request {} needs {}, donation {} offers {}",
                        id, request.organ_needed, donation_id, donation.organ
                    )));
                }
                request.id
            }
            None => tx
                .pending_requests(
                    &PendingQuery::matching_pool(&donation.organ).owned_by(context.accepter),
                )?
                .first()
                .map(|r| r.id)
                .ok_or(Unavailability::NoEligibleRequest)?,
        };

        commit_match(tx, donation_id, request_id)
    })
}

/// Internal: create the donor's donation and link it to the request, all or nothing.
fn fulfill_in_store<S: RecordStore>(
    store: &S,
    request_id: RequestId,
    donor: UserId,
    draft: &DonationDraft,
) -> Result<MatchedPair, MatchError> {
    store.transaction(|tx| {
        let request = tx
            .request_for_update(request_id)?
            .ok_or(Unavailability::RequestNotFound(request_id))?;
        invariant_not_self_match(donor, request.requester)?;
        if !request.is_pending() {
            return Err(Unavailability::RequestTaken(request_id).into());
        }
        if draft.organ != request.organ_needed {
            return Err(MatchError::Validation(format!(
                "request {} needs {}, not {}",
                request_id, request.organ_needed, draft.organ
            )));
        }
        let donation = tx.insert_pending_donation(donor, draft)?;
        commit_match(tx, donation.id, request.id)
    })
}

#[async_trait]
impl<S: RecordStore> MatchingApi for MatchingService<S> {
    async fn create_donation(
        &self,
        owner: UserId,
        draft: DonationDraft,
    ) -> Result<DonationCreation, MatchError> {
        let op = Uuid::new_v4();
        draft.validate()?;

        let donation = self
            .run(move |store| Ok(store.insert_pending_donation(owner, &draft)?))
            .await?;
        info!(
            "[matching] {op} donation {} created by {} ({} {})",
            donation.id, owner, donation.organ, donation.blood_group
        );

        if !self.config.auto_match_on_create {
            return Ok(Creation {
                entry: donation,
                match_outcome: MatchOutcome::Skipped,
            });
        }

        let id = donation.id;
        let attempt = self.run(move |store| auto_match_donation(store, id)).await;
        let creation = settle(op, donation, attempt);
        if let MatchOutcome::Matched(request) = &creation.match_outcome {
            info!("[matching] {op} donation {id} matched request {}", request.id);
        }
        Ok(creation)
    }

    async fn create_request(
        &self,
        requester: UserId,
        draft: RequestDraft,
    ) -> Result<RequestCreation, MatchError> {
        let op = Uuid::new_v4();
        draft.validate()?;

        let request = self
            .run(move |store| Ok(store.insert_pending_request(requester, &draft)?))
            .await?;
        info!(
            "[matching] {op} request {} created by {} ({} {})",
            request.id, requester, request.organ_needed, request.blood_group
        );

        if !self.config.auto_match_on_create {
            return Ok(Creation {
                entry: request,
                match_outcome: MatchOutcome::Skipped,
            });
        }

        let id = request.id;
        let attempt = self.run(move |store| auto_match_request(store, id)).await;
        let creation = settle(op, request, attempt);
        if let MatchOutcome::Matched(donation) = &creation.match_outcome {
            info!("[matching] {op} request {id} matched donation {}", donation.id);
        }
        Ok(creation)
    }

    async fn accept_donation(
        &self,
        donation: DonationId,
        context: AcceptContext,
    ) -> Result<MatchedPair, MatchError> {
        let op = Uuid::new_v4();
        let result = self
            .run(move |store| accept_in_store(store, donation, context))
            .await;
        match &result {
            Ok(pair) => info!(
                "[matching] {op} donation {} accepted by {} for request {}",
                donation, context.accepter, pair.request.id
            ),
            Err(e) if e.is_unavailable() => {
                debug!("[matching] {op} accept of donation {donation} refused: {e}")
            }
            Err(e) => warn!("[matching] {op} accept of donation {donation} failed: {e}"),
        }
        result
    }

    async fn fulfill_request(
        &self,
        request: RequestId,
        donor: UserId,
        draft: DonationDraft,
    ) -> Result<MatchedPair, MatchError> {
        let op = Uuid::new_v4();
        draft.validate()?;
        let result = self
            .run(move |store| fulfill_in_store(store, request, donor, &draft))
            .await;
        match &result {
            Ok(pair) => info!(
                "[matching] {op} request {} fulfilled by {} with donation {}",
                request, donor, pair.donation.id
            ),
            Err(e) if e.is_unavailable() => {
                debug!("[matching] {op} fulfilment of request {request} refused: {e}")
            }
            Err(e) => warn!("[matching] {op} fulfilment of request {request} failed: {e}"),
        }
        result
    }

    async fn list_available_donations(
        &self,
        filter: ListingFilter,
    ) -> Result<Vec<Donation>, MatchError> {
        let query = PendingQuery::browse(filter, self.config.max_listed_entries);
        self.run(move |store| Ok(store.scan_pending_donations(&query)?))
            .await
    }

    async fn list_available_requests(
        &self,
        filter: ListingFilter,
    ) -> Result<Vec<Request>, MatchError> {
        let query = PendingQuery::browse(filter, self.config.max_listed_entries);
        self.run(move |store| Ok(store.scan_pending_requests(&query)?))
            .await
    }

    async fn preview_donation_matches(
        &self,
        organ: OrganType,
        donor_group: BloodGroup,
        excluding: UserId,
    ) -> Result<Vec<Request>, MatchError> {
        let limit = self.config.max_listed_entries;
        self.run(move |store| {
            let pool = store.scan_pending_requests(&PendingQuery::matching_pool(&organ))?;
            let probe = MatchProbe::donor(organ, donor_group).excluding(excluding);
            Ok(compatible_candidates(&pool, &probe)
                .take(limit)
                .cloned()
                .collect())
        })
        .await
    }

    async fn preview_request_matches(
        &self,
        organ: OrganType,
        required_group: BloodGroup,
        excluding: UserId,
    ) -> Result<Vec<Donation>, MatchError> {
        let limit = self.config.max_listed_entries;
        self.run(move |store| {
            let pool = store.scan_pending_donations(&PendingQuery::matching_pool(&organ))?;
            let probe = MatchProbe::recipient(organ, required_group).excluding(excluding);
            Ok(compatible_candidates(&pool, &probe)
                .take(limit)
                .cloned()
                .collect())
        })
        .await
    }

    async fn my_donations(&self, owner: UserId) -> Result<Vec<DonationActivity>, MatchError> {
        self.run(move |store| {
            store
                .donations_owned_by(owner)?
                .into_iter()
                .map(|donation| -> Result<_, MatchError> {
                    let matched_request = if donation.is_pending() {
                        None
                    } else {
                        store.request_matched_to(donation.id)?
                    };
                    Ok(DonationActivity {
                        donation,
                        matched_request,
                    })
                })
                .collect()
        })
        .await
    }

    async fn my_requests(&self, requester: UserId) -> Result<Vec<RequestActivity>, MatchError> {
        self.run(move |store| {
            store
                .requests_owned_by(requester)?
                .into_iter()
                .map(|request| -> Result<_, MatchError> {
                    let matched_donation = match request.matched_donation {
                        Some(id) => store.get_donation(id)?,
                        None => None,
                    };
                    Ok(RequestActivity {
                        request,
                        matched_donation,
                    })
                })
                .collect()
        })
        .await
    }

    async fn health_check(&self) -> Result<StoreHealth, MatchError> {
        self.run(|store| Ok(store.health_check()?)).await
    }
}
