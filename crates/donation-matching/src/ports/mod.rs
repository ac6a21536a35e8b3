//! # Ports Module
//!
//! Hexagonal architecture ports (inbound and outbound interfaces).

pub mod inbound;
pub mod outbound;

pub use inbound::MatchingApi;
pub use outbound::{
    ManualTimeSource, RecordStore, StoreHealth, StoreSnapshot, StoreTransaction, SystemTimeSource, TimeSource,
};
