//! Shared fixtures: drafts and services over each backend.

use chrono::NaiveDate;
use donation_matching::{
    BloodGroup, DonationDraft, InMemoryRecordStore, ManualTimeSource, MatchingConfig,
    MatchingService, OrganType, RequestDraft, SqliteRecordStore,
};
use match_runtime::RuntimeStore;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Backends every end-to-end flow runs against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// `InMemoryRecordStore`
    Memory,
    /// `SqliteRecordStore` on a private in-memory database
    Sqlite,
}

impl Backend {
    /// Both adapters.
    pub const ALL: [Backend; 2] = [Backend::Memory, Backend::Sqlite];
}

/// A service, plus the clock its store stamps rows with.
pub struct Harness {
    /// Service under test.
    pub service: MatchingService<RuntimeStore>,
    /// Store clock; advance between creations to fix arrival order.
    pub clock: Arc<ManualTimeSource>,
}

/// Build a fresh service over `backend`.
pub fn harness(backend: Backend, config: MatchingConfig) -> Harness {
    let clock = Arc::new(ManualTimeSource::new(1_700_000_000_000));
    let store = match backend {
        Backend::Memory => RuntimeStore::Memory(InMemoryRecordStore::with_clock(clock.clone())),
        Backend::Sqlite => RuntimeStore::Sqlite(
            SqliteRecordStore::open_in_memory()
                .expect("in-memory sqlite")
                .with_clock(clock.clone()),
        ),
    };
    Harness {
        service: MatchingService::new(Arc::new(store), config),
        clock,
    }
}

/// Config with creation-time matching switched off.
pub fn manual_matching() -> MatchingConfig {
    MatchingConfig {
        auto_match_on_create: false,
        ..MatchingConfig::for_testing()
    }
}

/// Normalised organ.
pub fn organ(name: &str) -> OrganType {
    OrganType::new(name).expect("valid organ")
}

/// A valid donation draft.
pub fn donation(group: BloodGroup, organ_name: &str) -> DonationDraft {
    DonationDraft {
        donor_name: "Bilal Ahmed".into(),
        age: 32,
        blood_group: group,
        organ: organ(organ_name),
        contact: "+92 300 1234567".into(),
        city: "Lahore".into(),
        availability_date: NaiveDate::from_ymd_opt(2026, 12, 1).expect("date"),
        medical_notes: Some("non-smoker".into()),
        requested_compensation: Decimal::new(150_000, 0),
    }
}

/// A valid request draft.
pub fn request(group: BloodGroup, organ_name: &str) -> RequestDraft {
    RequestDraft {
        requester_name: "Sana Khan".into(),
        age: 51,
        blood_group: group,
        organ_needed: organ(organ_name),
        contact: "+92 321 7654321".into(),
        city: "Karachi".into(),
        medical_reason: Some("chronic kidney disease".into()),
        budget: Decimal::new(200_000, 0),
    }
}
