//! # Matching Configuration
//!
//! Tunables for the matching service.

use serde::{Deserialize, Serialize};

/// Default cap on listing and preview results.
pub const DEFAULT_MAX_LISTED_ENTRIES: usize = 500;

/// Matching service configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Try to match every new entry against the opposite pool.
    pub auto_match_on_create: bool,

    /// Maximum entries returned by listings and previews.
    pub max_listed_entries: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            auto_match_on_create: true,
            max_listed_entries: DEFAULT_MAX_LISTED_ENTRIES,
        }
    }
}

impl MatchingConfig {
    /// Create a config for testing (small listing cap).
    pub fn for_testing() -> Self {
        Self {
            auto_match_on_create: true,
            max_listed_entries: 50,
        }
    }
}
