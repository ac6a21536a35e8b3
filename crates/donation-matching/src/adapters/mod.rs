//! # Adapters
//!
//! Implementations of the outbound `RecordStore` port.
//!
//! | Adapter | Durability | Isolation |
//! |---------|------------|-----------|
//! | [`InMemoryRecordStore`] | process lifetime | write lock held per transaction |
//! | [`SqliteRecordStore`] | file (WAL) | `BEGIN IMMEDIATE` |

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;
