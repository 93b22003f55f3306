//! Application state shared by every request handler.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::auth::LoginThrottle;
use crate::config::AppConfig;
use crate::db;
use crate::drugs::DrugLookup;
use crate::scanning::{ScanJob, ScanQueue};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}

/// Wrapped in `Arc` at startup and cloned into the API context.
pub struct CoreState {
    pub config: AppConfig,
    /// Failed login attempts per email.
    login_throttle: Mutex<LoginThrottle>,
    /// External drug database. `None` when disabled by configuration.
    drug_lookup: Option<Arc<dyn DrugLookup>>,
    scan_queue: ScanQueue,
}

impl CoreState {
    pub fn new(
        config: AppConfig,
        drug_lookup: Option<Arc<dyn DrugLookup>>,
        scan_queue: ScanQueue,
    ) -> Self {
        Self {
            config,
            login_throttle: Mutex::new(LoginThrottle::new()),
            drug_lookup,
            scan_queue,
        }
    }

    /// Open a connection to the application database. One per request.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.config.db_path()).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> PathBuf {
        self.config.db_path()
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.config.uploads_dir()
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.config.session_ttl_hours)
    }

    pub fn login_throttle(&self) -> Result<MutexGuard<'_, LoginThrottle>, CoreError> {
        self.login_throttle.lock().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn drug_lookup(&self) -> Option<Arc<dyn DrugLookup>> {
        self.drug_lookup.clone()
    }

    /// Hand a scan to the extraction worker.
    pub fn enqueue_scan(&self, job: ScanJob) -> bool {
        self.scan_queue.enqueue(job)
    }
}
