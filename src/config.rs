use governor::Quota;
use std::env;
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    // Probe timeouts
    pub probe_send_timeout_secs: u64,
    pub probe_recv_timeout_secs: u64,

    // Cache TTLs
    pub probe_cache_ok_secs: u64,
    pub probe_cache_fail_secs: u64,
    pub search_cache_secs: u64,
    pub cache_max_entries: usize,

    // Fan-out limits
    pub max_candidates: usize,
    pub max_probe_handles: usize,

    // Upstream directory
    pub directory_url: String,
    pub heartbeat_period_secs: u64,

    // Rate limiting configs
    pub search_period_secs: u64,
    pub search_burst_limit: u32,
    pub info_period_secs: u64,
    pub info_burst_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_send_timeout_secs: 2,
            probe_recv_timeout_secs: 2,
            probe_cache_ok_secs: 30,
            probe_cache_fail_secs: 15,
            search_cache_secs: 30,
            cache_max_entries: 4096,
            max_candidates: 1000,
            max_probe_handles: 4096,
            directory_url: "http://127.0.0.1:8400/directory".to_string(),
            heartbeat_period_secs: 30,
            search_period_secs: 5,
            search_burst_limit: 10,
            info_period_secs: 1,
            info_burst_limit: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            probe_send_timeout_secs: env::var("PROBE_SEND_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.probe_send_timeout_secs),

            probe_recv_timeout_secs: env::var("PROBE_RECV_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.probe_recv_timeout_secs),

            probe_cache_ok_secs: env::var("PROBE_CACHE_OK_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.probe_cache_ok_secs),

            probe_cache_fail_secs: env::var("PROBE_CACHE_FAIL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.probe_cache_fail_secs),

            search_cache_secs: env::var("SEARCH_CACHE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.search_cache_secs),

            cache_max_entries: env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_max_entries),

            max_candidates: env::var("MAX_CANDIDATES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_candidates),

            max_probe_handles: env::var("MAX_PROBE_HANDLES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_probe_handles),

            directory_url: env::var("DIRECTORY_URL").unwrap_or(defaults.directory_url),

            heartbeat_period_secs: env::var("HEARTBEAT_PERIOD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.heartbeat_period_secs),

            search_period_secs: env::var("SEARCH_PERIOD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.search_period_secs),

            search_burst_limit: env::var("SEARCH_BURST_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.search_burst_limit),

            info_period_secs: env::var("INFO_PERIOD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.info_period_secs),

            info_burst_limit: env::var("INFO_BURST_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.info_burst_limit),
        }
    }

    pub fn probe_send_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_send_timeout_secs)
    }

    pub fn probe_recv_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_recv_timeout_secs)
    }

    pub fn search_quota(&self) -> Quota {
        Quota::with_period(Duration::from_secs(self.search_period_secs))
            .unwrap()
            .allow_burst(NonZeroU32::new(self.search_burst_limit).unwrap())
    }

    pub fn info_quota(&self) -> Quota {
        Quota::with_period(Duration::from_secs(self.info_period_secs))
            .unwrap()
            .allow_burst(NonZeroU32::new(self.info_burst_limit).unwrap())
    }
}
