use std::time::Duration;

use crate::error::CoreError;
use crate::pool::SpreadPolicy;

/// Public Signum API nodes polled when no hosts are configured.
pub const DEFAULT_API_HOSTS: [&str; 4] = [
    "https://europe.signum.network",
    "https://europe1.signum.network",
    "https://australia.signum.network",
    "https://brazil.signum.network",
];

/// Runtime settings for the client, rebuilder and notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_hosts: Vec<String>,
    pub cache_ttl: Duration,
    pub rebuild_period: Duration,
    pub notifier_period: Duration,
    /// Blocks are checked on every k-th notifier tick.
    pub notifier_block_tick_ratio: u32,
    /// RS address whose payments are also recorded as donations and
    /// faucet payouts.
    pub faucet_account: Option<String>,
    pub preload_big_wallet_names: bool,
    pub big_wallets: Vec<String>,
    /// Newest transactions fetched per account and filter.
    pub transactions_page: u32,
    pub spread_policy: SpreadPolicy,
    pub rng_seed: Option<u64>,
    pub request_timeout: Duration,
    pub requests_per_second: Option<u32>,
    /// Cache entries older than this many TTLs are dropped by the rebuilder.
    pub cache_sweep_factor: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_hosts: DEFAULT_API_HOSTS.iter().map(|h| h.to_string()).collect(),
            cache_ttl: Duration::from_secs(3 * 60),
            rebuild_period: Duration::from_secs(30 * 60),
            notifier_period: Duration::from_secs(4 * 60),
            notifier_block_tick_ratio: 3,
            faucet_account: None,
            preload_big_wallet_names: false,
            big_wallets: Vec::new(),
            transactions_page: 10,
            spread_policy: SpreadPolicy::default(),
            rng_seed: None,
            request_timeout: Duration::from_secs(30),
            requests_per_second: None,
            cache_sweep_factor: 10,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.api_hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(CoreError::Config("at least one API host is required".to_owned()));
        }
        for (name, period) in [
            ("cache_ttl", self.cache_ttl),
            ("rebuild_period", self.rebuild_period),
            ("notifier_period", self.notifier_period),
            ("request_timeout", self.request_timeout),
        ] {
            if period.is_zero() {
                return Err(CoreError::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.notifier_block_tick_ratio == 0 {
            return Err(CoreError::Config(
                "notifier_block_tick_ratio must be at least 1".to_owned(),
            ));
        }
        if self.transactions_page == 0 {
            return Err(CoreError::Config("transactions_page must be at least 1".to_owned()));
        }
        if self.cache_sweep_factor == 0 {
            return Err(CoreError::Config("cache_sweep_factor must be at least 1".to_owned()));
        }
        if self.requests_per_second == Some(0) {
            return Err(CoreError::Config("requests_per_second must be at least 1".to_owned()));
        }
        Ok(())
    }
}
