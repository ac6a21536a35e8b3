//! # Match Runtime
//!
//! Hosts the matching service over the configured record store.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (environment)
//! 2. Open the record store (create the data directory if needed)
//! 3. Health check: store answers, pending counts logged
//! 4. Link audit: every donation/request link checked, violations logged
//! 5. Signal ready
//!
//! Shutdown hands the store back from the service and closes it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod store;

use anyhow::{anyhow, Context, Result};
use donation_matching::{MatchingApi, MatchingService};
use std::sync::Arc;
use tracing::{error, info};

pub use config::{load_config, load_config_with, RuntimeConfig, StoreBackend, StoreConfig};
pub use store::RuntimeStore;

/// The running matching service and the store it owns.
pub struct MatchRuntime {
    service: MatchingService<RuntimeStore>,
}

impl MatchRuntime {
    /// Open the store and verify it before accepting work.
    pub async fn start(config: RuntimeConfig) -> Result<Self> {
        info!("===========================================");
        info!("  Donation Matching Runtime v{}", donation_matching::VERSION);
        info!("===========================================");

        let store_config = config.store.clone();
        let store = tokio::task::spawn_blocking(move || RuntimeStore::open(&store_config))
            .await
            .context("Store open task panicked")??;
        let service = MatchingService::new(Arc::new(store), config.matching);

        let health = service
            .health_check()
            .await
            .context("Store health check failed")?;
        info!(
            "[runtime] Store {} ready: {} pending donations, {} pending requests",
            health.backend, health.pending_donations, health.pending_requests
        );

        let violations = service
            .audit_links()
            .await
            .context("Link audit failed")?;
        if violations.is_empty() {
            info!("[runtime] Link audit clean");
        } else {
            for violation in &violations {
                error!("[runtime] Link audit: {}", violation);
            }
        }

        Ok(Self { service })
    }

    /// The matching service.
    pub fn service(&self) -> &MatchingService<RuntimeStore> {
        &self.service
    }

    /// Release the store.
    ///
    /// Fails if a clone of the store handle is still alive elsewhere.
    pub async fn shutdown(self) -> Result<()> {
        info!("[runtime] Initiating graceful shutdown...");
        let store = Arc::try_unwrap(self.service.into_store())
            .map_err(|_| anyhow!("Record store still in use at shutdown"))?;
        tokio::task::spawn_blocking(move || store.close())
            .await
            .context("Store close task panicked")??;
        info!("[runtime] Shutdown complete");
        Ok(())
    }
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
