//! # Domain Module
//!
//! Core domain types for donation/request matching.

pub mod drafts;
pub mod entities;
pub mod errors;
pub mod invariants;
pub mod value_objects;

pub use drafts::*;
pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use value_objects::*;
