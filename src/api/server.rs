//! API server lifecycle: bind, serve in a background task, shut down on
//! request.
//!
//! bind → spawn background task → return handle with shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::core_state::CoreState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind API server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Failed to get server address: {0}")]
    LocalAddr(std::io::Error),
}

/// Handle to a running API server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Ask the server to stop accepting connections. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait until in-flight requests have drained and the server task ended.
    pub async fn stopped(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("API server task failed: {e}");
            }
        }
    }
}

/// Bind `addr` and serve the API router in a background tokio task.
pub async fn start_api_server(core: Arc<CoreState>, addr: SocketAddr) -> Result<ApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let app = api_router(core);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

/// Serve until Ctrl-C, then drain and return.
pub async fn serve_until_ctrl_c(core: Arc<CoreState>) -> Result<(), ServerError> {
    let mut server = start_api_server(core.clone(), core.config.bind_addr).await?;
    tracing::info!(addr = %server.addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};

    use crate::config::AppConfig;
    use crate::scanning::{start_scan_worker, MockVisionClient, ScanWorkerHandle};

    fn test_core(dir: &tempfile::TempDir) -> (Arc<CoreState>, ScanWorkerHandle) {
        let vars: HashMap<&str, String> =
            HashMap::from([("DOSEKEEP_DATA_DIR", dir.path().display().to_string())]);
        let config = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let (queue, worker) = start_scan_worker(
            config.db_path(),
            config.uploads_dir(),
            Arc::new(MockVisionClient::new("{}")),
        );
        (Arc::new(CoreState::new(config, None, queue)), worker)
    }

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn start_serve_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (core, _worker) = test_core(&dir);
        let mut server = start_api_server(core, localhost()).await.expect("server should start");
        assert!(server.addr.port() > 0);

        let resp = reqwest::get(format!("http://{}/api/health", server.addr)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let resp = reqwest::get(format!("http://{}/api/prescriptions", server.addr))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

        let resp = reqwest::get(format!("http://{}/nonexistent", server.addr)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        server.shutdown();
        server.shutdown();
        server.stopped().await;
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (core, _worker) = test_core(&dir);
        let mut first = start_api_server(core.clone(), localhost()).await.unwrap();
        let taken = first.addr;

        let err = start_api_server(core, taken).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { addr, .. } if addr == taken));

        first.shutdown();
        first.stopped().await;
    }
}
