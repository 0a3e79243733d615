//! Graceful shutdown and the commit gate.
//!
//! Once shutdown is requested no new admission starts and
//! [`ShutdownController::begin_commit`] refuses to open the gate. A commit
//! already between `begin_commit` and [`ShutdownController::end_commit`] runs
//! to completion first; only then are subscribers notified.
//!
//! With a marker file configured, the hash of the in-flight block is written
//! there on `begin_commit` and the file is removed on `end_commit`. A marker
//! found at startup names a block whose commit was interrupted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tokio::signal;
use tokio::sync::broadcast;

use dagchain_types::BlockHash;

/// Why the commit gate could not be entered.
#[derive(Debug, Error)]
pub enum CommitGateError {
    #[error("shutdown requested")]
    ShuttingDown,

    #[error("commit marker: {0}")]
    Marker(#[from] std::io::Error),
}

/// Coordinates shutdown between the chain and the host.
///
/// Subsystems call [`subscribe`](Self::subscribe) to get a receiver, then
/// `select!` on it alongside their main loop.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    requested: AtomicBool,
    in_flight: Mutex<Option<BlockHash>>,
    idle: Condvar,
    marker: Option<PathBuf>,
}

impl ShutdownController {
    pub fn new(marker: Option<PathBuf>) -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            requested: AtomicBool::new(false),
            in_flight: Mutex::new(None),
            idle: Condvar::new(),
            marker,
        }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Block hash left in the marker file by an interrupted commit.
    pub fn interrupted_commit(&self) -> std::io::Result<Option<String>> {
        match &self.marker {
            Some(path) => read_marker(path),
            None => Ok(None),
        }
    }

    /// Open the gate for `hash`. Fails once shutdown was requested; the
    /// check and the request are serialized on the in-flight lock.
    pub fn begin_commit(&self, hash: &BlockHash) -> Result<(), CommitGateError> {
        let mut in_flight = self.in_flight.lock();
        if self.requested.load(Ordering::SeqCst) {
            return Err(CommitGateError::ShuttingDown);
        }
        if let Some(path) = &self.marker {
            std::fs::write(path, hash.to_hex())?;
        }
        *in_flight = Some(*hash);
        Ok(())
    }

    pub fn end_commit(&self) -> std::io::Result<()> {
        let mut in_flight = self.in_flight.lock();
        if let Some(path) = &self.marker {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        *in_flight = None;
        self.idle.notify_all();
        Ok(())
    }

    /// Release the gate after a failed commit. The marker file stays so the
    /// next start sees the interruption.
    pub fn abandon_commit(&self) {
        *self.in_flight.lock() = None;
        self.idle.notify_all();
    }

    /// Hash of the block currently being committed.
    pub fn in_flight(&self) -> Option<BlockHash> {
        *self.in_flight.lock()
    }

    /// Refuse new admissions, wait for any in-flight commit, then notify
    /// subscribers.
    pub fn shutdown(&self) {
        let mut in_flight = self.in_flight.lock();
        self.requested.store(true, Ordering::SeqCst);
        while let Some(hash) = *in_flight {
            tracing::info!(hash = %hash, "waiting for in-flight commit before shutdown");
            self.idle.wait(&mut in_flight);
        }
        drop(in_flight);
        let _ = self.tx.send(());
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
            _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new(None)
    }
}

fn read_marker(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn programmatic_shutdown_notifies_subscribers() {
        let controller = ShutdownController::default();
        let mut rx = controller.subscribe();
        controller.shutdown();
        assert!(rx.recv().await.is_ok());
        assert!(controller.is_shutdown_requested());
    }

    #[tokio::test]
    async fn multiple_subscribers_all_notified() {
        let controller = ShutdownController::default();
        let mut rx1 = controller.subscribe();
        let mut rx2 = controller.subscribe();
        controller.shutdown();
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn shutdown_waits_for_in_flight_commit() {
        let controller = Arc::new(ShutdownController::default());
        let hash = BlockHash::new([4; 32]);
        controller.begin_commit(&hash).unwrap();

        let waiter = {
            let controller = Arc::clone(&controller);
            std::thread::spawn(move || controller.shutdown())
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        assert!(controller.is_shutdown_requested());

        controller.end_commit().unwrap();
        waiter.join().unwrap();
        assert!(controller.in_flight().is_none());
    }

    #[test]
    fn gate_stays_closed_after_shutdown() {
        let controller = ShutdownController::default();
        controller.shutdown();
        let err = controller.begin_commit(&BlockHash::new([5; 32])).unwrap_err();
        assert!(matches!(err, CommitGateError::ShuttingDown));
        assert!(controller.in_flight().is_none());
    }

    #[test]
    fn marker_file_tracks_the_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit.marker");
        let controller = ShutdownController::new(Some(path.clone()));
        let hash = BlockHash::new([9; 32]);

        controller.begin_commit(&hash).unwrap();
        assert_eq!(controller.interrupted_commit().unwrap(), Some(hash.to_hex()));
        controller.end_commit().unwrap();
        assert!(!path.exists());
        assert_eq!(controller.interrupted_commit().unwrap(), None);
    }

    #[test]
    fn abandoned_commit_keeps_the_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit.marker");
        let controller = ShutdownController::new(Some(path.clone()));
        controller.begin_commit(&BlockHash::new([1; 32])).unwrap();
        controller.abandon_commit();
        assert!(path.exists());

        let restarted = ShutdownController::new(Some(path));
        assert!(restarted.interrupted_commit().unwrap().is_some());
    }
}
