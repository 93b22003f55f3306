pub mod api;
pub mod auth;
pub mod config;
pub mod core_state;
pub mod db;
pub mod drugs;
pub mod models;
pub mod scanning;
pub mod schedule;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Cannot create data directory: {0}")]
    DataDir(std::io::Error),
    #[error("Cannot start async runtime: {0}")]
    Runtime(std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Vision client error: {0}")]
    Vision(#[from] scanning::ScanError),
    #[error("Server error: {0}")]
    Server(#[from] api::ServerError),
}

pub fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir).map_err(StartupError::DataDir)?;
    std::fs::create_dir_all(config.uploads_dir()).map_err(StartupError::DataDir)?;

    {
        let conn = db::open_database(&config.db_path())?;
        let purged = db::purge_expired_sessions(&conn, &schedule::local_now())?;
        if purged > 0 {
            tracing::info!(purged, "Expired sessions removed");
        }
    }

    // Blocking HTTP clients own a runtime of their own; build them before ours.
    let vision = Arc::new(scanning::OllamaVisionClient::new(&config.vision)?);
    let (queue, worker) = scanning::start_scan_worker(config.db_path(), config.uploads_dir(), vision);

    {
        let conn = db::open_database(&config.db_path())?;
        let requeued = scanning::recover_scans(&conn, &queue)?;
        if requeued > 0 {
            tracing::info!(requeued, "Interrupted scans re-queued");
        }
    }

    let drug_lookup: Option<Arc<dyn drugs::DrugLookup>> = if config.drug_lookup.enabled {
        match drugs::RxNavClient::new(&config.drug_lookup) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Drug lookup disabled: {e}");
                None
            }
        }
    } else {
        None
    };

    let core = Arc::new(core_state::CoreState::new(config, drug_lookup, queue));

    let runtime = tokio::runtime::Runtime::new().map_err(StartupError::Runtime)?;
    let served = runtime.block_on(api::serve_until_ctrl_c(core.clone()));
    drop(runtime);

    // Last reference to the blocking clients is released outside the runtime.
    drop(core);
    worker.shutdown();
    drop(worker);

    tracing::info!("{} stopped", config::APP_NAME);
    served.map_err(StartupError::from)
}
