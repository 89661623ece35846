// src/search/mod.rs
use async_trait::async_trait;
use log::{debug, error};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::cache::ResultCache;
use crate::config::Config;
use crate::directory::worker::SessionState;
use crate::directory::{DirectoryError, DirectorySession};
use crate::models::server::{query_signature, Endpoint, Region, SearchResult, ServerInfo};
use crate::probe::{ProbeError, ProbeRegistry};

#[derive(Debug)]
pub enum SearchError {
    /// No active directory session. A hard precondition failure, not retried.
    SessionUnavailable,
    Directory(DirectoryError),
    Probe(ProbeError),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionUnavailable => write!(f, "no active directory session"),
            Self::Directory(e) => write!(f, "{}", e),
            Self::Probe(e) => write!(f, "{}", e),
        }
    }
}

/// Probe seam used by the aggregator. `Ok(None)` means the endpoint was
/// transiently unreachable and has no information to give.
#[async_trait]
pub trait ServerProber: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint) -> Result<Option<ServerInfo>, ProbeError>;
}

/// Memoizing wrapper over the probe registry. Successful probes are held for
/// the positive TTL, unreachable outcomes for the shorter negative TTL, so a
/// persistently-down server is re-probed rather than wedged into a permanent
/// failure state.
pub struct CachedProber {
    registry: ProbeRegistry,
    cache: ResultCache<Endpoint, Option<ServerInfo>>,
    ok_ttl: Duration,
    fail_ttl: Duration,
}

impl CachedProber {
    pub fn new(config: Config) -> Self {
        Self {
            cache: ResultCache::new(config.cache_max_entries),
            ok_ttl: Duration::from_secs(config.probe_cache_ok_secs),
            fail_ttl: Duration::from_secs(config.probe_cache_fail_secs),
            registry: ProbeRegistry::new(config),
        }
    }
}

#[async_trait]
impl ServerProber for CachedProber {
    async fn probe(&self, endpoint: &Endpoint) -> Result<Option<ServerInfo>, ProbeError> {
        if let Some(cached) = self.cache.get(endpoint) {
            return Ok(cached);
        }

        let outcome = match self.registry.client_for(endpoint) {
            Ok(handle) => handle.client.query_info().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(info) => {
                self.cache
                    .insert(endpoint.clone(), Some(info.clone()), self.ok_ttl, false);
                Ok(Some(info))
            }
            Err(e) if e.is_transient() => {
                debug!("probe of {} unavailable: {}", endpoint, e);
                self.cache.insert(endpoint.clone(), None, self.fail_ttl, false);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Directory query façade plus fan-out aggregator: signature-cached searches
/// over the external directory, with concurrent per-endpoint probing.
pub struct SearchService {
    directory: Arc<dyn DirectorySession>,
    session: Arc<SessionState>,
    prober: Arc<dyn ServerProber>,
    search_cache: ResultCache<String, Vec<SearchResult>>,
    search_ttl: Duration,
    max_candidates: usize,
}

impl SearchService {
    pub fn new(
        directory: Arc<dyn DirectorySession>,
        session: Arc<SessionState>,
        prober: Arc<dyn ServerProber>,
        config: &Config,
    ) -> Self {
        Self {
            directory,
            session,
            prober,
            search_cache: ResultCache::new(config.cache_max_entries),
            search_ttl: Duration::from_secs(config.search_cache_secs),
            max_candidates: config.max_candidates,
        }
    }

    pub async fn search(
        &self,
        app_id: u32,
        region: Region,
        filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if !self.session.is_connected() {
            return Err(SearchError::SessionUnavailable);
        }

        let signature = query_signature(app_id, region, filter);
        if let Some(hit) = self.search_cache.get(&signature) {
            debug!("search cache hit for {}", signature);
            return Ok(hit);
        }

        let candidates = self
            .directory
            .query(app_id, region, filter, self.max_candidates)
            .await
            .map_err(|e| {
                error!(
                    "directory query failed for appId={} region={} filter={:?}: {}",
                    app_id,
                    region.as_str(),
                    filter,
                    e
                );
                SearchError::Directory(e)
            })?;
        debug!("directory returned {} candidates for {}", candidates.len(), signature);

        // An identical request may have finished while we were at the
        // directory; re-checking here collapses most racing misses into one
        // fan-out. Best effort, not single-flight.
        if let Some(hit) = self.search_cache.get(&signature) {
            return Ok(hit);
        }

        let results = self.fan_out(candidates).await?;
        self.search_cache
            .insert(signature, results.clone(), self.search_ttl, true);
        Ok(results)
    }

    /// Single-endpoint status read for `/server/info`; shares the probe cache
    /// with search fan-outs.
    pub async fn server_info(&self, endpoint: &Endpoint) -> Result<Option<ServerInfo>, SearchError> {
        self.prober.probe(endpoint).await.map_err(SearchError::Probe)
    }

    async fn fan_out(&self, mut candidates: Vec<Endpoint>) -> Result<Vec<SearchResult>, SearchError> {
        candidates.truncate(self.max_candidates);

        let merged: Arc<Mutex<Vec<(usize, SearchResult)>>> = Arc::new(Mutex::new(Vec::new()));
        let mut probes = JoinSet::new();
        for (index, endpoint) in candidates
            .into_iter()
            .filter(|e| !e.has_private_prefix())
            .enumerate()
        {
            let prober = self.prober.clone();
            let merged = merged.clone();
            probes.spawn(async move {
                match prober.probe(&endpoint).await {
                    Ok(Some(info)) => {
                        merged.lock().push((index, SearchResult::new(endpoint, info)));
                        Ok(())
                    }
                    // Unreachable endpoints are omitted, no placeholder.
                    Ok(None) => Ok(()),
                    Err(e) => Err(SearchError::Probe(e)),
                }
            });
        }

        // Drain every probe before producing anything; one endpoint's hard
        // failure still lets the rest finish.
        let mut first_error = None;
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(SearchError::Probe(ProbeError::Io(
                            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                        )));
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut indexed = std::mem::take(&mut *merged.lock());
        // Restore discovery order first so the player-count sort is stable
        // with respect to it.
        indexed.sort_by_key(|(index, _)| *index);
        let mut results: Vec<SearchResult> = indexed.into_iter().map(|(_, r)| r).collect();
        results.sort_by(|a, b| b.online_players.cmp(&a.online_players));
        Ok(results)
    }
}
