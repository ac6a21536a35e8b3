//! # Concurrent Claims
//!
//! Many callers racing for the same entry: exactly one wins, the rest see
//! the entry as unavailable, and the links stay consistent.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use donation_matching::{
        AcceptContext, BloodGroup, MatchError, MatchOutcome, MatchingApi, MatchingConfig,
        MatchingService, SqliteRecordStore, Unavailability, UserId,
    };
    use tokio::sync::Barrier;

    use crate::fixtures::{donation, harness, manual_matching, request, Backend};

    const CONTENDERS: usize = 16;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fulfill_single_winner() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            let service = Arc::new(h.service);
            let target = service
                .create_request(UserId(1), request(BloodGroup::AbPos, "kidney"))
                .await
                .unwrap()
                .entry
                .id;

            let barrier = Arc::new(Barrier::new(CONTENDERS));
            let mut handles = Vec::new();
            for donor in 0..CONTENDERS {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                handles.push(tokio::spawn(async move {
                    barrier.wait().await;
                    service
                        .fulfill_request(
                            target,
                            UserId(100 + donor as i64),
                            donation(BloodGroup::ONeg, "kidney"),
                        )
                        .await
                }));
            }

            let mut winners = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(pair) => {
                        winners += 1;
                        assert_eq!(pair.request.matched_donation, Some(pair.donation.id));
                    }
                    Err(MatchError::NotFoundOrUnavailable(Unavailability::RequestTaken(id))) => {
                        assert_eq!(id, target)
                    }
                    Err(e) => panic!("{backend:?}: unexpected error {e}"),
                }
            }
            assert_eq!(winners, 1, "{backend:?}");

            // Losers left no donation behind.
            let health = service.health_check().await.unwrap();
            assert_eq!(health.pending_donations, 0, "{backend:?}");
            assert!(service.audit_links().await.unwrap().is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accept_single_winner() {
        for backend in Backend::ALL {
            let h = harness(backend, manual_matching());
            let service = Arc::new(h.service);
            for user in 0..CONTENDERS {
                service
                    .create_request(UserId(200 + user as i64), request(BloodGroup::BPos, "liver"))
                    .await
                    .unwrap();
            }
            let target = service
                .create_donation(UserId(1), donation(BloodGroup::BNeg, "liver"))
                .await
                .unwrap()
                .entry
                .id;

            let barrier = Arc::new(Barrier::new(CONTENDERS));
            let mut handles = Vec::new();
            for user in 0..CONTENDERS {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                handles.push(tokio::spawn(async move {
                    barrier.wait().await;
                    service
                        .accept_donation(target, AcceptContext::for_user(UserId(200 + user as i64)))
                        .await
                }));
            }

            let mut winners = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(pair) => {
                        winners += 1;
                        assert_eq!(pair.donation.accepted_by, Some(pair.request.requester));
                    }
                    Err(e) => assert!(
                        matches!(
                            e,
                            MatchError::NotFoundOrUnavailable(Unavailability::DonationTaken(_))
                        ),
                        "{backend:?}: {e}"
                    ),
                }
            }
            assert_eq!(winners, 1, "{backend:?}");

            let health = service.health_check().await.unwrap();
            assert_eq!(health.pending_requests as usize, CONTENDERS - 1);
            assert!(service.audit_links().await.unwrap().is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_leaves_no_compatible_pair_waiting() {
        for backend in Backend::ALL {
            let h = harness(backend, MatchingConfig::for_testing());
            let service = Arc::new(h.service);
            let donors = 9;
            let recipients = 6;

            let barrier = Arc::new(Barrier::new(donors + recipients));
            let mut handles = Vec::new();
            for i in 0..donors {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                handles.push(tokio::spawn(async move {
                    barrier.wait().await;
                    let created = service
                        .create_donation(UserId(i as i64), donation(BloodGroup::ONeg, "kidney"))
                        .await
                        .unwrap();
                    created
                        .match_outcome
                        .counterpart()
                        .map(|r| (created.entry.id, r.id))
                }));
            }
            for i in 0..recipients {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                handles.push(tokio::spawn(async move {
                    barrier.wait().await;
                    let created = service
                        .create_request(UserId(1_000 + i as i64), request(BloodGroup::AbPos, "kidney"))
                        .await
                        .unwrap();
                    assert!(!matches!(created.match_outcome, MatchOutcome::Failed(_)));
                    created
                        .match_outcome
                        .counterpart()
                        .map(|d| (d.id, created.entry.id))
                }));
            }

            let mut reported = BTreeSet::new();
            for handle in handles {
                if let Some(link) = handle.await.unwrap() {
                    reported.insert(link);
                }
            }

            // Every recipient ends up linked, and every link is reported.
            let health = service.health_check().await.unwrap();
            assert_eq!(health.pending_requests, 0, "{backend:?}");
            assert_eq!(health.pending_donations as usize, donors - recipients);
            assert_eq!(reported.len(), recipients, "{backend:?}");
            let donations: BTreeSet<_> = reported.iter().map(|(d, _)| d).collect();
            let requests: BTreeSet<_> = reported.iter().map(|(_, r)| r).collect();
            assert_eq!(donations.len(), recipients, "{backend:?}");
            assert_eq!(requests.len(), recipients, "{backend:?}");
            assert!(service.audit_links().await.unwrap().is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_connections_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matching.db");
        let open = || {
            SqliteRecordStore::open(&path, Duration::from_secs(5)).unwrap()
        };
        let left = Arc::new(MatchingService::new(Arc::new(open()), manual_matching()));
        let right = Arc::new(MatchingService::new(Arc::new(open()), manual_matching()));

        let target = left
            .create_request(UserId(1), request(BloodGroup::APos, "kidney"))
            .await
            .unwrap()
            .entry
            .id;

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for (service, donor) in [(Arc::clone(&left), 2), (Arc::clone(&right), 3)] {
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                service
                    .fulfill_request(target, UserId(donor), donation(BloodGroup::ONeg, "kidney"))
                    .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert!(e.is_unavailable(), "{e}"),
            }
        }
        assert_eq!(winners, 1);
        assert!(left.audit_links().await.unwrap().is_empty());
        assert_eq!(right.health_check().await.unwrap().pending_requests, 0);
    }
}
