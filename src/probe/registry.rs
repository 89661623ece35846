// src/probe/registry.rs
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::models::server::Endpoint;
use crate::probe::client::{ProbeClient, ProbeError};

/// A registry-owned client plus the bookkeeping needed to evict it.
pub struct ProbeHandle {
    pub client: ProbeClient,
    last_used: Mutex<Instant>,
}

impl ProbeHandle {
    fn new(client: ProbeClient) -> Self {
        Self {
            client,
            last_used: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }
}

/// Shared Endpoint → client registry. Handles are created lazily on first
/// probe and reused afterwards; the per-key entry lock keeps two concurrent
/// first probes of one endpoint from allocating duplicate sockets. The handle
/// count is bounded; past the bound the longest-idle handles are dropped
/// (in-flight probes keep theirs alive through the Arc).
pub struct ProbeRegistry {
    handles: DashMap<Endpoint, Arc<ProbeHandle>>,
    config: Config,
}

impl ProbeRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            handles: DashMap::new(),
            config,
        }
    }

    pub fn client_for(&self, endpoint: &Endpoint) -> Result<Arc<ProbeHandle>, ProbeError> {
        if let Some(handle) = self.handles.get(endpoint) {
            handle.touch();
            return Ok(handle.clone());
        }

        if self.handles.len() >= self.config.max_probe_handles {
            self.evict_idle();
        }

        match self.handles.entry(endpoint.clone()) {
            Entry::Occupied(occupied) => {
                let handle = occupied.get().clone();
                handle.touch();
                Ok(handle)
            }
            Entry::Vacant(vacant) => {
                let client = ProbeClient::connect(
                    endpoint,
                    self.config.probe_send_timeout(),
                    self.config.probe_recv_timeout(),
                )?;
                let handle = Arc::new(ProbeHandle::new(client));
                vacant.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Drops the longest-idle handles until the registry is back under its
    /// bound with room for one more.
    fn evict_idle(&self) {
        let mut by_idle: Vec<(Endpoint, Instant)> = self
            .handles
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_used()))
            .collect();
        by_idle.sort_by_key(|(_, used)| *used);

        let excess = (self.handles.len() + 1).saturating_sub(self.config.max_probe_handles);
        for (endpoint, _) in by_idle.into_iter().take(excess) {
            self.handles.remove(&endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_endpoint(socket: &tokio::net::UdpSocket) -> Endpoint {
        Endpoint::new("127.0.0.1", socket.local_addr().unwrap().port())
    }

    #[tokio::test]
    async fn repeated_probes_reuse_one_handle() {
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let registry = ProbeRegistry::new(Config::default());
        let endpoint = local_endpoint(&peer);

        let first = registry.client_for(&endpoint).unwrap();
        let second = registry.client_for(&endpoint).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn distinct_endpoints_get_distinct_handles() {
        let a = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let registry = ProbeRegistry::new(Config::default());

        let first = registry.client_for(&local_endpoint(&a)).unwrap();
        let second = registry.client_for(&local_endpoint(&b)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn handle_count_stays_bounded() {
        let config = Config {
            max_probe_handles: 4,
            ..Config::default()
        };
        let registry = ProbeRegistry::new(config);
        for port in 20000..20010u16 {
            registry
                .client_for(&Endpoint::new("127.0.0.1", port))
                .unwrap();
        }
        assert!(registry.len() <= 4);
    }

    #[tokio::test]
    async fn concurrent_first_probes_share_a_handle() {
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let registry = Arc::new(ProbeRegistry::new(Config::default()));
        let endpoint = local_endpoint(&peer);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let endpoint = endpoint.clone();
            tasks.push(tokio::spawn(async move {
                registry.client_for(&endpoint).unwrap()
            }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }
}
