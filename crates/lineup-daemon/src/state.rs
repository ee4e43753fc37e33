//! Shared daemon state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use lineup_core::config::DaemonConfig;
use lineup_core::store::ListStore;

/// Shared daemon state handed to every connection task.
pub type SharedState = Arc<DaemonStateHandle>;

/// Daemon state handle.
///
/// The store carries its own interior synchronization; nothing here needs
/// a lock beyond the shutdown flag.
pub struct DaemonStateHandle {
    store: Arc<dyn ListStore>,
    config: DaemonConfig,
    /// Shutdown flag (atomic for lock-free checking).
    shutdown: AtomicBool,
    /// Time when the daemon started.
    started_at: DateTime<Utc>,
}

impl DaemonStateHandle {
    /// Create a new daemon state handle.
    #[must_use]
    pub fn new(config: DaemonConfig, store: Arc<dyn ListStore>) -> Self {
        Self {
            store,
            config,
            shutdown: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }

    /// The document store.
    #[must_use]
    pub fn store(&self) -> &dyn ListStore {
        self.store.as_ref()
    }

    /// The daemon configuration.
    #[must_use]
    pub const fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Request shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Get daemon uptime in seconds.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // max(0) ensures non-negative
    pub fn uptime_secs(&self) -> u64 {
        let now = Utc::now();
        (now - self.started_at).num_seconds().max(0) as u64
    }
}
