//! # Algorithms Module
//!
//! Compatibility, matching search and the atomic link.

pub mod compatibility;
pub mod match_finder;
pub mod match_transaction;

pub use compatibility::{compatible_recipients, is_compatible};
pub use match_finder::{compatible_candidates, find_match, MatchProbe, PoolEntry};
pub use match_transaction::commit_match;
