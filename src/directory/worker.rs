// src/directory/worker.rs
use log::{debug, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::directory::DirectorySession;

/// Read-only view of the session worker's state, served by `/health`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    #[serde(rename = "isConnected")]
    pub is_connected: bool,
    #[serde(rename = "lastHeartbeat")]
    pub last_heartbeat: Option<u64>,
    pub version: String,
}

/// Shared session lifecycle state. The worker writes, request handlers read.
#[derive(Default)]
pub struct SessionState {
    running: AtomicBool,
    connected: AtomicBool,
    // Unix seconds; 0 means no heartbeat yet.
    last_heartbeat: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn mark_heartbeat(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.last_heartbeat.store(now, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let heartbeat = self.last_heartbeat.load(Ordering::Relaxed);
        SessionSnapshot {
            is_running: self.running.load(Ordering::Relaxed),
            is_connected: self.connected.load(Ordering::Relaxed),
            last_heartbeat: (heartbeat > 0).then_some(heartbeat),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Long-lived worker that owns the session's event loop: ticks a heartbeat
/// against the directory and keeps the shared state current. Runs for the
/// process lifetime, parallel to the request-handling workers.
pub fn spawn_session_worker(
    session: Arc<dyn DirectorySession>,
    state: Arc<SessionState>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    state.set_running(true);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match session.heartbeat().await {
                Ok(()) => {
                    debug!("directory heartbeat ok");
                    state.mark_heartbeat();
                }
                Err(e) => {
                    warn!("directory heartbeat failed: {}", e);
                    state.set_connected(false);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryError;
    use crate::models::server::{Endpoint, Region};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    struct FlakySession {
        healthy: AtomicBool,
    }

    #[async_trait]
    impl DirectorySession for FlakySession {
        async fn query(
            &self,
            _app_id: u32,
            _region: Region,
            _filter: Option<&str>,
            _max_results: usize,
        ) -> Result<Vec<Endpoint>, DirectoryError> {
            Ok(Vec::new())
        }

        async fn heartbeat(&self) -> Result<(), DirectoryError> {
            if self.healthy.load(Ordering::Relaxed) {
                Ok(())
            } else {
                Err(DirectoryError::Transport("down".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn heartbeat_drives_connected_state() {
        let session = Arc::new(FlakySession {
            healthy: AtomicBool::new(true),
        });
        let state = Arc::new(SessionState::new());
        let worker = spawn_session_worker(
            session.clone(),
            state.clone(),
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        let snapshot = state.snapshot();
        assert!(snapshot.is_running);
        assert!(snapshot.is_connected);
        assert!(snapshot.last_heartbeat.is_some());

        session.healthy.store(false, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!state.is_connected());
        // The heartbeat timestamp survives the disconnect.
        assert!(state.snapshot().last_heartbeat.is_some());

        worker.abort();
    }

    #[test]
    fn snapshot_before_first_heartbeat_has_null_timestamp() {
        let state = SessionState::new();
        let snapshot = state.snapshot();
        assert!(!snapshot.is_connected);
        assert_eq!(snapshot.last_heartbeat, None);
    }
}
