//! # Runtime Store
//!
//! The record store selected by configuration.

use anyhow::{Context, Result};
use donation_matching::{
    Donation, DonationId, InMemoryRecordStore, PendingQuery, RecordStore, Request, RequestId,
    SqliteRecordStore, StoreError, StoreHealth, StoreSnapshot, StoreTransaction, UserId,
};
use std::fs;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

/// Either record store adapter, chosen at startup.
pub enum RuntimeStore {
    /// In-memory tables.
    Memory(InMemoryRecordStore),
    /// SQLite database.
    Sqlite(SqliteRecordStore),
}

macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            RuntimeStore::Memory($store) => $call,
            RuntimeStore::Sqlite($store) => $call,
        }
    };
}

impl RuntimeStore {
    /// Open the configured backend, creating the database directory if needed.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        match config.backend {
            StoreBackend::Memory => {
                info!("[runtime] Using in-memory record store");
                Ok(RuntimeStore::Memory(InMemoryRecordStore::new()))
            }
            StoreBackend::Sqlite => {
                if let Some(dir) = config.database_path.parent() {
                    if !dir.as_os_str().is_empty() {
                        fs::create_dir_all(dir).with_context(|| {
                            format!("Failed to create data directory {}", dir.display())
                        })?;
                    }
                }
                let store = SqliteRecordStore::open(&config.database_path, config.busy_timeout())
                    .with_context(|| {
                        format!("Failed to open {}", config.database_path.display())
                    })?;
                Ok(RuntimeStore::Sqlite(store))
            }
        }
    }

    /// Release the store. SQLite connections are flushed and closed.
    pub fn close(self) -> Result<()> {
        match self {
            RuntimeStore::Memory(_) => Ok(()),
            RuntimeStore::Sqlite(store) => store.close().context("Failed to close SQLite store"),
        }
    }
}

impl RecordStore for RuntimeStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        delegate!(self, s => s.transaction(f))
    }

    fn get_donation(&self, id: DonationId) -> Result<Option<Donation>, StoreError> {
        delegate!(self, s => s.get_donation(id))
    }

    fn get_request(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        delegate!(self, s => s.get_request(id))
    }

    fn scan_pending_donations(&self, query: &PendingQuery) -> Result<Vec<Donation>, StoreError> {
        delegate!(self, s => s.scan_pending_donations(query))
    }

    fn scan_pending_requests(&self, query: &PendingQuery) -> Result<Vec<Request>, StoreError> {
        delegate!(self, s => s.scan_pending_requests(query))
    }

    fn donations_owned_by(&self, owner: UserId) -> Result<Vec<Donation>, StoreError> {
        delegate!(self, s => s.donations_owned_by(owner))
    }

    fn requests_owned_by(&self, requester: UserId) -> Result<Vec<Request>, StoreError> {
        delegate!(self, s => s.requests_owned_by(requester))
    }

    fn request_matched_to(&self, donation: DonationId) -> Result<Option<Request>, StoreError> {
        delegate!(self, s => s.request_matched_to(donation))
    }

    fn health_check(&self) -> Result<StoreHealth, StoreError> {
        delegate!(self, s => s.health_check())
    }

    fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        delegate!(self, s => s.snapshot())
    }
}
