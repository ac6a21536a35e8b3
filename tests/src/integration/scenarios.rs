//! # End-to-End Scenarios
//!
//! Every flow runs against both record store adapters.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use donation_matching::{
        is_compatible, AcceptContext, BloodGroup, DonationForm, DonationStatus, InMemoryRecordStore,
        ListingFilter, MatchError, MatchOutcome, MatchingConfig, MatchingService, PendingQuery,
        RecordStore, RequestStatus, StoreError, StoreHealth, StoreSnapshot, StoreTransaction,
        Unavailability, UserId,
    };
    use donation_matching::{Donation, DonationDraft, DonationId, Request, RequestId};
    use donation_matching::MatchingApi;

    use crate::fixtures::{donation, harness, manual_matching, organ, request, Backend};

    // =============================================================================
    // SCENARIOS
    // =============================================================================

    #[tokio::test]
    async fn test_universal_donor_reaches_waiting_recipient() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            let waiting = h
                .service
                .create_request(UserId(2), request(BloodGroup::AbPos, "Kidney"))
                .await
                .unwrap();
            assert_eq!(waiting.match_outcome, MatchOutcome::NoMatch, "{backend:?}");
            h.clock.advance(10);

            let created = h
                .service
                .create_donation(UserId(1), donation(BloodGroup::ONeg, "kidney"))
                .await
                .unwrap();
            let linked = created.match_outcome.counterpart().expect("matched");
            assert_eq!(linked.id, waiting.entry.id, "{backend:?}");
            assert_eq!(linked.status, RequestStatus::Matched);
            assert_eq!(created.entry.status, DonationStatus::Accepted);
            assert_eq!(created.entry.accepted_by, Some(UserId(2)));

            let stored = h
                .service
                .store()
                .get_request(waiting.entry.id)
                .unwrap()
                .unwrap();
            assert_eq!(stored.matched_donation, Some(created.entry.id));
        }
    }

    #[tokio::test]
    async fn test_incompatible_pair_stays_pending() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            h.service
                .create_request(UserId(2), request(BloodGroup::ONeg, "kidney"))
                .await
                .unwrap();
            let created = h
                .service
                .create_donation(UserId(1), donation(BloodGroup::AbPos, "kidney"))
                .await
                .unwrap();
            assert_eq!(created.match_outcome, MatchOutcome::NoMatch, "{backend:?}");

            let health = h.service.health_check().await.unwrap();
            assert_eq!(health.pending_donations, 1);
            assert_eq!(health.pending_requests, 1);
        }
    }

    #[tokio::test]
    async fn test_oldest_compatible_donation_is_chosen() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            let mut ids = Vec::new();
            for (user, group) in [
                (10, BloodGroup::APos),
                (11, BloodGroup::ONeg),
                (12, BloodGroup::OPos),
            ] {
                let created = h
                    .service
                    .create_donation(UserId(user), donation(group, "kidney"))
                    .await
                    .unwrap();
                ids.push(created.entry.id);
                h.clock.advance(1_000);
            }

            let created = h
                .service
                .create_request(UserId(20), request(BloodGroup::OPos, "kidney"))
                .await
                .unwrap();
            assert_eq!(
                created.match_outcome.counterpart().map(|d| d.id),
                Some(ids[1]),
                "{backend:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_same_timestamp_breaks_tie_by_id() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            let first = h
                .service
                .create_donation(UserId(10), donation(BloodGroup::ONeg, "liver"))
                .await
                .unwrap();
            h.service
                .create_donation(UserId(11), donation(BloodGroup::ONeg, "liver"))
                .await
                .unwrap();

            let created = h
                .service
                .create_request(UserId(20), request(BloodGroup::BPos, "liver"))
                .await
                .unwrap();
            assert_eq!(
                created.match_outcome.counterpart().map(|d| d.id),
                Some(first.entry.id),
                "{backend:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_different_organs_never_match() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            h.service
                .create_request(UserId(2), request(BloodGroup::AbPos, "kidney"))
                .await
                .unwrap();
            let created = h
                .service
                .create_donation(UserId(1), donation(BloodGroup::ONeg, "liver"))
                .await
                .unwrap();
            assert_eq!(created.match_outcome, MatchOutcome::NoMatch, "{backend:?}");
        }
    }

    #[tokio::test]
    async fn test_own_entries_are_skipped_by_auto_match() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            h.service
                .create_request(UserId(5), request(BloodGroup::AbPos, "kidney"))
                .await
                .unwrap();
            h.clock.advance(1);
            let other = h
                .service
                .create_request(UserId(6), request(BloodGroup::AbPos, "kidney"))
                .await
                .unwrap();
            h.clock.advance(1);

            let created = h
                .service
                .create_donation(UserId(5), donation(BloodGroup::ONeg, "kidney"))
                .await
                .unwrap();
            assert_eq!(
                created.match_outcome.counterpart().map(|r| r.id),
                Some(other.entry.id),
                "{backend:?}"
            );
        }
    }

    // =============================================================================
    // EXPLICIT CLAIMS
    // =============================================================================

    #[tokio::test]
    async fn test_accept_then_fulfill_flow() {
        for backend in Backend::ALL {
            let h = harness(backend, manual_matching());
            let req = h
                .service
                .create_request(UserId(2), request(BloodGroup::APos, "kidney"))
                .await
                .unwrap();
            let don = h
                .service
                .create_donation(UserId(1), donation(BloodGroup::ANeg, "kidney"))
                .await
                .unwrap();
            assert_eq!(don.match_outcome, MatchOutcome::Skipped);

            let pair = h
                .service
                .accept_donation(
                    don.entry.id,
                    AcceptContext::for_user(UserId(2)).with_request(req.entry.id),
                )
                .await
                .unwrap();
            assert_eq!(pair.donation.accepted_by, Some(UserId(2)), "{backend:?}");
            assert_eq!(pair.request.matched_donation, Some(don.entry.id));

            // The matched request cannot be fulfilled again.
            let err = h
                .service
                .fulfill_request(req.entry.id, UserId(3), donation(BloodGroup::ONeg, "kidney"))
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    MatchError::NotFoundOrUnavailable(Unavailability::RequestTaken(_))
                ),
                "{backend:?}: {err}"
            );
            assert!(h.service.my_donations(UserId(3)).await.unwrap().is_empty());
            assert!(h.service.audit_links().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_accept_without_request_leaves_donation_pending() {
        for backend in Backend::ALL {
            let h = harness(backend, manual_matching());
            let don = h
                .service
                .create_donation(UserId(1), donation(BloodGroup::ONeg, "heart"))
                .await
                .unwrap();
            // Pending request for a different organ does not qualify.
            h.service
                .create_request(UserId(2), request(BloodGroup::ONeg, "liver"))
                .await
                .unwrap();

            let err = h
                .service
                .accept_donation(don.entry.id, AcceptContext::for_user(UserId(2)))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                MatchError::NotFoundOrUnavailable(Unavailability::NoEligibleRequest)
            ));
            let listed = h
                .service
                .list_available_donations(ListingFilter::default())
                .await
                .unwrap();
            assert_eq!(listed.len(), 1, "{backend:?}");
        }
    }

    #[tokio::test]
    async fn test_self_match_rejected_on_every_path() {
        for backend in Backend::ALL {
            let h = harness(backend, manual_matching());
            let don = h
                .service
                .create_donation(UserId(4), donation(BloodGroup::ONeg, "kidney"))
                .await
                .unwrap();
            let req = h
                .service
                .create_request(UserId(4), request(BloodGroup::AbPos, "kidney"))
                .await
                .unwrap();

            let accept = h
                .service
                .accept_donation(
                    don.entry.id,
                    AcceptContext::for_user(UserId(4)).with_request(req.entry.id),
                )
                .await;
            assert!(matches!(accept, Err(MatchError::ForbiddenSelfMatch { .. })));

            let fulfill = h
                .service
                .fulfill_request(req.entry.id, UserId(4), donation(BloodGroup::ONeg, "kidney"))
                .await;
            assert!(matches!(fulfill, Err(MatchError::ForbiddenSelfMatch { .. })));

            let health = h.service.health_check().await.unwrap();
            assert_eq!(health.pending_donations, 1, "{backend:?}");
            assert_eq!(health.pending_requests, 1, "{backend:?}");
        }
    }

    #[tokio::test]
    async fn test_fulfill_rolls_back_on_organ_mismatch() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            let req = h
                .service
                .create_request(UserId(2), request(BloodGroup::AbPos, "kidney"))
                .await
                .unwrap();
            let err = h
                .service
                .fulfill_request(req.entry.id, UserId(1), donation(BloodGroup::ONeg, "cornea"))
                .await
                .unwrap_err();
            assert!(matches!(err, MatchError::Validation(_)), "{backend:?}");
            assert!(h.service.my_donations(UserId(1)).await.unwrap().is_empty());
        }
    }

    // =============================================================================
    // BROWSING
    // =============================================================================

    #[tokio::test]
    async fn test_listing_filters_and_order() {
        for backend in Backend::ALL {
            let h = harness(backend, manual_matching());
            let cities = ["Lahore", "Karachi", "Lahore Cantt", "Quetta"];
            for (i, city) in cities.iter().enumerate() {
                let mut draft = donation(BloodGroup::BPos, if i % 2 == 0 { "kidney" } else { "liver" });
                draft.city = (*city).into();
                h.service
                    .create_donation(UserId(i as i64 + 1), draft)
                    .await
                    .unwrap();
                h.clock.advance(1);
            }

            let filter = ListingFilter::default()
                .with_organ(organ("KIDNEY"))
                .with_blood_group(BloodGroup::BPos)
                .with_city("lahore");
            let first = h.service.list_available_donations(filter.clone()).await.unwrap();
            let second = h.service.list_available_donations(filter).await.unwrap();
            assert_eq!(first, second, "{backend:?}");
            let owners: Vec<i64> = first.iter().map(|d| d.owner.0).collect();
            assert_eq!(owners, vec![3, 1], "{backend:?}");

            let none = h
                .service
                .list_available_donations(ListingFilter::default().with_blood_group(BloodGroup::ONeg))
                .await
                .unwrap();
            assert!(none.is_empty());
        }
    }

    #[tokio::test]
    async fn test_city_filter_folds_non_ascii_case() {
        for backend in Backend::ALL {
            let h = harness(backend, manual_matching());
            for (user, city) in [(1, "Łódź"), (2, "Lodz")] {
                let mut draft = donation(BloodGroup::APos, "kidney");
                draft.city = city.into();
                h.service
                    .create_donation(UserId(user), draft)
                    .await
                    .unwrap();
            }

            let listed = h
                .service
                .list_available_donations(ListingFilter::default().with_city("ŁÓDŹ"))
                .await
                .unwrap();
            let owners: Vec<i64> = listed.iter().map(|d| d.owner.0).collect();
            assert_eq!(owners, vec![1], "{backend:?}");
        }
    }

    #[tokio::test]
    async fn test_listing_respects_cap() {
        for backend in Backend::ALL {
            let config = MatchingConfig {
                auto_match_on_create: false,
                max_listed_entries: 3,
            };
            let h = harness(backend, config);
            for user in 1..=5 {
                h.service
                    .create_request(UserId(user), request(BloodGroup::APos, "kidney"))
                    .await
                    .unwrap();
            }
            let listed = h
                .service
                .list_available_requests(ListingFilter::default())
                .await
                .unwrap();
            assert_eq!(listed.len(), 3, "{backend:?}");
        }
    }

    #[tokio::test]
    async fn test_preview_does_not_claim() {
        for backend in Backend::ALL {
            let h = harness(backend, manual_matching());
            for (user, group) in [(1, BloodGroup::APos), (2, BloodGroup::BPos), (3, BloodGroup::AbNeg)] {
                h.service
                    .create_request(UserId(user), request(group, "kidney"))
                    .await
                    .unwrap();
                h.clock.advance(1);
            }
            let preview = h
                .service
                .preview_donation_matches(organ("kidney"), BloodGroup::ANeg, UserId(1))
                .await
                .unwrap();
            let again = h
                .service
                .preview_donation_matches(organ("kidney"), BloodGroup::ANeg, UserId(1))
                .await
                .unwrap();
            assert_eq!(preview, again, "{backend:?}");
            let groups: Vec<BloodGroup> = preview.iter().map(|r| r.blood_group).collect();
            assert_eq!(groups, vec![BloodGroup::AbNeg], "{backend:?}");
            assert!(preview.iter().all(|r| is_compatible(BloodGroup::ANeg, r.blood_group)));

            let health = h.service.health_check().await.unwrap();
            assert_eq!(health.pending_requests, 3);
        }
    }

    #[tokio::test]
    async fn test_my_activity_shows_counterparts() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            let req = h
                .service
                .create_request(UserId(2), request(BloodGroup::OPos, "kidney"))
                .await
                .unwrap();
            h.clock.advance(1);
            let don = h
                .service
                .create_donation(UserId(1), donation(BloodGroup::OPos, "kidney"))
                .await
                .unwrap();
            h.clock.advance(1);
            h.service
                .create_request(UserId(2), request(BloodGroup::OPos, "heart"))
                .await
                .unwrap();

            let mine = h.service.my_requests(UserId(2)).await.unwrap();
            assert_eq!(mine.len(), 2, "{backend:?}");
            // Newest first.
            assert!(mine[0].matched_donation.is_none());
            assert_eq!(mine[1].request.id, req.entry.id);
            assert_eq!(
                mine[1].matched_donation.as_ref().map(|d| d.id),
                Some(don.entry.id)
            );

            let theirs = h.service.my_donations(UserId(1)).await.unwrap();
            assert_eq!(
                theirs[0].matched_request.as_ref().map(|r| r.id),
                Some(req.entry.id)
            );
        }
    }

    #[tokio::test]
    async fn test_form_input_flows_through_service() {
        let h = harness(Backend::Sqlite, MatchingConfig::for_testing());
        let form = DonationForm {
            donor_name: Some("  Imran  ".into()),
            age: Some(40),
            blood_group: Some("ab+".into()),
            organ: Some(" Kidney ".into()),
            contact: Some("imran@example.com".into()),
            city: Some("Peshawar".into()),
            availability_date: Some("2026-12-15".into()),
            medical_notes: Some("   ".into()),
            requested_compensation_amount: None,
        };
        let draft = DonationDraft::try_from(form).unwrap();
        let created = h.service.create_donation(UserId(9), draft).await.unwrap();
        assert_eq!(created.entry.blood_group, BloodGroup::AbPos);
        assert_eq!(created.entry.organ.as_str(), "kidney");
        assert_eq!(created.entry.medical_notes, None);

        let bad = DonationForm {
            blood_group: Some("Z+".into()),
            ..DonationForm::default()
        };
        assert!(matches!(
            DonationDraft::try_from(bad),
            Err(MatchError::Validation(_))
        ));
    }

    // =============================================================================
    // STORAGE FAILURES
    // =============================================================================

    /// Store whose transactions start failing after a number of calls.
    struct FlakyStore {
        inner: InMemoryRecordStore,
        calls: AtomicUsize,
        fail_from: usize,
    }

    impl FlakyStore {
        fn failing_from(fail_from: usize) -> Self {
            Self {
                inner: InMemoryRecordStore::new(),
                calls: AtomicUsize::new(0),
                fail_from,
            }
        }
    }

    impl RecordStore for FlakyStore {
        fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
        where
            F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
            E: From<StoreError>,
        {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_from {
                return Err(StoreError::Backend("disk I/O error".into()).into());
            }
            self.inner.transaction(f)
        }

        fn get_donation(&self, id: DonationId) -> Result<Option<Donation>, StoreError> {
            self.inner.get_donation(id)
        }

        fn get_request(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
            self.inner.get_request(id)
        }

        fn scan_pending_donations(&self, query: &PendingQuery) -> Result<Vec<Donation>, StoreError> {
            self.inner.scan_pending_donations(query)
        }

        fn scan_pending_requests(&self, query: &PendingQuery) -> Result<Vec<Request>, StoreError> {
            self.inner.scan_pending_requests(query)
        }

        fn donations_owned_by(&self, owner: UserId) -> Result<Vec<Donation>, StoreError> {
            self.inner.donations_owned_by(owner)
        }

        fn requests_owned_by(&self, requester: UserId) -> Result<Vec<Request>, StoreError> {
            self.inner.requests_owned_by(requester)
        }

        fn request_matched_to(&self, donation: DonationId) -> Result<Option<Request>, StoreError> {
            self.inner.request_matched_to(donation)
        }

        fn health_check(&self) -> Result<StoreHealth, StoreError> {
            self.inner.health_check()
        }

        fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
            self.inner.snapshot()
        }
    }

    #[tokio::test]
    async fn test_match_failure_does_not_fail_creation() {
        // Insert succeeds, the matching transaction fails.
        let store = Arc::new(FlakyStore::failing_from(1));
        let service = MatchingService::new(store, MatchingConfig::for_testing());

        let created = service
            .create_donation(UserId(1), donation(BloodGroup::ONeg, "kidney"))
            .await
            .unwrap();
        assert!(matches!(created.match_outcome, MatchOutcome::Failed(_)));
        assert!(created.entry.is_pending());
        assert_eq!(service.health_check().await.unwrap().pending_donations, 1);
    }

    #[tokio::test]
    async fn test_insert_failure_is_retryable_storage_error() {
        let service = MatchingService::new(
            Arc::new(FlakyStore::failing_from(0)),
            MatchingConfig::for_testing(),
        );
        let err = service
            .create_request(UserId(1), request(BloodGroup::ONeg, "kidney"))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err}");
        assert_eq!(service.health_check().await.unwrap().pending_requests, 0);
    }
}
