//! Cross-component integration tests.

pub mod races;
pub mod scenarios;
