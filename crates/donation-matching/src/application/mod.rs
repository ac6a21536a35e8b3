//! Application layer: the matching service.

pub mod service;

pub use service::MatchingService;
