//! Background extraction worker.
//!
//! Upload and retry handlers push a `ScanJob` on the queue; a dedicated
//! thread drains it, one scan at a time, each with its own connection.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use uuid::Uuid;

use super::processor::process_scan;
use super::vision::VisionClient;
use crate::db::{self, DatabaseError};
use crate::models::enums::ScanKind;
use crate::schedule::local_now;

/// How long the worker blocks on the queue before re-checking shutdown.
const RECV_TIMEOUT_MILLIS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanJob {
    pub kind: ScanKind,
    pub id: Uuid,
}

/// Sending side of the scan queue. Cheap to clone.
#[derive(Clone)]
pub struct ScanQueue {
    sender: Sender<ScanJob>,
}

impl ScanQueue {
    /// Queue a scan for extraction. Returns false if the worker is gone;
    /// the record then stays `pending` and is picked up on next startup.
    pub fn enqueue(&self, job: ScanJob) -> bool {
        match self.sender.send(job) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(scan_id = %job.id, "Scan worker stopped, job left pending");
                false
            }
        }
    }
}

/// Handle for the worker thread.
///
/// Supports graceful shutdown via `shutdown()` or automatic cleanup on `Drop`.
/// A scan already being extracted runs to completion first.
pub struct ScanWorkerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ScanWorkerHandle {
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for ScanWorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start the worker thread. Returns the queue to feed it and its handle.
pub fn start_scan_worker(
    db_path: PathBuf,
    uploads_dir: PathBuf,
    vision: Arc<dyn VisionClient>,
) -> (ScanQueue, ScanWorkerHandle) {
    let (sender, receiver) = mpsc::channel();
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!("Scan worker started");
        worker_loop(&receiver, &flag, &db_path, &uploads_dir, vision.as_ref());
        tracing::info!("Scan worker shutting down");
    });

    (
        ScanQueue { sender },
        ScanWorkerHandle {
            shutdown,
            handle: Some(handle),
        },
    )
}

fn worker_loop(
    receiver: &Receiver<ScanJob>,
    shutdown: &AtomicBool,
    db_path: &Path,
    uploads_dir: &Path,
    vision: &dyn VisionClient,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match receiver.recv_timeout(Duration::from_millis(RECV_TIMEOUT_MILLIS)) {
            Ok(job) => run_job(job, db_path, uploads_dir, vision),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn run_job(job: ScanJob, db_path: &Path, uploads_dir: &Path, vision: &dyn VisionClient) {
    let conn = match db::open_database(db_path) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(scan_id = %job.id, error = %e, "Scan worker cannot open database");
            return;
        }
    };
    if let Err(e) = process_scan(&conn, uploads_dir, vision, job.kind, job.id, local_now()) {
        tracing::error!(scan_id = %job.id, error = %e, "Scan job error");
    }
}

/// Re-queue work interrupted by a previous shutdown: `processing` records go
/// back to `pending`, then every `pending` record is queued oldest first.
pub fn recover_scans(conn: &Connection, queue: &ScanQueue) -> Result<usize, DatabaseError> {
    let reset = db::reset_processing_scans(conn)?;
    let pending = db::list_pending_scans(conn)?;
    for record in &pending {
        queue.enqueue(ScanJob {
            kind: record.kind,
            id: record.id,
        });
    }
    if reset > 0 || !pending.is_empty() {
        tracing::info!(reset, queued = pending.len(), "Recovered interrupted scans");
    }
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::models::enums::ExtractionStatus;
    use crate::models::{Prescription, ScanFields};
    use crate::scanning::vision::MockVisionClient;

    struct Fixture {
        dir: tempfile::TempDir,
        db_path: PathBuf,
        uploads: PathBuf,
        user_id: Uuid,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("rx.jpg"), [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        let conn = db::open_database(&db_path).unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        Fixture { dir, db_path, uploads, user_id }
    }

    fn pending(f: &Fixture) -> Uuid {
        let conn = db::open_database(&f.db_path).unwrap();
        let id = Uuid::new_v4();
        db::insert_prescription(
            &conn,
            &Prescription {
                id,
                user_id: f.user_id,
                doctor_name: None,
                prescribed_on: None,
                valid_until: None,
                notes: None,
                scan: ScanFields::pending("rx.jpg".into(), "image/jpeg".into()),
                created_at: datetime("2024-03-01 10:00:00"),
            },
        )
        .unwrap();
        id
    }

    fn wait_for_status(f: &Fixture, id: &Uuid, status: ExtractionStatus) -> bool {
        let conn = db::open_database(&f.db_path).unwrap();
        for _ in 0..200 {
            let record = db::get_scan_record(&conn, ScanKind::Prescription, id).unwrap().unwrap();
            if record.scan.extraction_status == status {
                return true;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        false
    }

    fn mock() -> Arc<dyn VisionClient> {
        Arc::new(MockVisionClient::new(r#"{"medications": [{"name": "Metformin"}]}"#))
    }

    #[test]
    fn queued_scan_is_extracted() {
        let f = fixture();
        let id = pending(&f);
        let (queue, _handle) = start_scan_worker(f.db_path.clone(), f.uploads.clone(), mock());

        assert!(queue.enqueue(ScanJob { kind: ScanKind::Prescription, id }));
        assert!(wait_for_status(&f, &id, ExtractionStatus::Extracted));
        assert!(f.dir.path().exists());
    }

    #[test]
    fn recovery_requeues_interrupted_scans() {
        let f = fixture();
        let interrupted = pending(&f);
        let waiting = pending(&f);
        {
            let conn = db::open_database(&f.db_path).unwrap();
            db::transition_scan(
                &conn,
                ScanKind::Prescription,
                &interrupted,
                ExtractionStatus::Pending,
                ExtractionStatus::Processing,
            )
            .unwrap();
        }

        let (queue, _handle) = start_scan_worker(f.db_path.clone(), f.uploads.clone(), mock());
        let conn = db::open_database(&f.db_path).unwrap();
        assert_eq!(recover_scans(&conn, &queue).unwrap(), 2);

        assert!(wait_for_status(&f, &interrupted, ExtractionStatus::Extracted));
        assert!(wait_for_status(&f, &waiting, ExtractionStatus::Extracted));
    }

    #[test]
    fn shutdown_stops_worker() {
        let f = fixture();
        let (queue, handle) = start_scan_worker(f.db_path.clone(), f.uploads.clone(), mock());
        handle.shutdown();
        drop(handle);
        assert!(!queue.enqueue(ScanJob { kind: ScanKind::Prescription, id: Uuid::new_v4() }));
    }

    #[test]
    fn recv_timeout_is_short() {
        assert!(RECV_TIMEOUT_MILLIS <= 1000);
    }
}
