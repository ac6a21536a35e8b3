//! # Donation Matching
//!
//! Matching core for organ donations and organ requests.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Donors offer organs, patients request them. Whenever either side is
//! created the core looks for a compatible counterpart and, if one exists,
//! links the two in a single atomic step:
//! - Same organ, compatible blood groups, different users
//! - Oldest waiting counterpart first
//! - A donation serves at most one request and vice versa
//!
//! ## Guarantees
//!
//! | Rule | Enforcement |
//! |------|-------------|
//! | One request per donation | Conditional update + unique link in the store |
//! | Status agrees with link | Both rows change in one transaction |
//! | No self-matching | Checked on every path before any write |
//! | Creation never fails on match trouble | Outcome reported alongside the entry |
//!
//! ## Module Structure
//!
//! ```text
//! donation-matching/
//! ├── domain/          # Entities, drafts, value objects, errors, invariants
//! ├── algorithms/      # Compatibility table, match search, atomic link
//! ├── ports/           # MatchingApi (inbound) + RecordStore, TimeSource (outbound)
//! ├── adapters/        # In-memory and SQLite record stores
//! ├── application/     # MatchingService orchestrating everything
//! └── config.rs        # MatchingConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{InMemoryRecordStore, SqliteRecordStore};
pub use algorithms::{
    commit_match, compatible_candidates, compatible_recipients, find_match, is_compatible,
    MatchProbe, PoolEntry,
};
pub use application::MatchingService;
pub use config::{MatchingConfig, DEFAULT_MAX_LISTED_ENTRIES};
pub use domain::{
    audit_links, invariant_link_consistent, invariant_not_self_match, AcceptContext, BloodGroup,
    Creation, Donation, DonationActivity, DonationCreation, DonationDraft, DonationForm,
    DonationId, DonationStatus, LinkViolation, ListingFilter, MatchError, MatchOutcome,
    MatchedPair, OrganType, PendingQuery, Request, RequestActivity, RequestCreation,
    RequestDraft, RequestForm, RequestId, RequestStatus, ScanOrder, Side, StoreError, Timestamp,
    Unavailability, UserId, MAX_AGE, MIN_AGE,
};
pub use ports::{
    ManualTimeSource, MatchingApi, RecordStore, StoreHealth, StoreSnapshot, StoreTransaction,
    SystemTimeSource, TimeSource,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
