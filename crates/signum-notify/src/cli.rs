use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use signum_notify_core::config::DEFAULT_API_HOSTS;
use signum_notify_core::pool::SpreadPolicy;
use signum_notify_core::watermark::NotifyFlags;
use signum_notify_core::Config;

/// Watches Signum accounts and reports new payments, mining
/// transactions, messages and forged blocks.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Signum API node URLs, comma separated. Defaults to the public nodes.
    #[arg(long, env = "SIGNUM_NOTIFY_API_HOSTS", value_delimiter = ',', global = true)]
    pub api_hosts: Vec<String>,

    /// SQLite file holding monitored accounts and watermarks.
    #[arg(long, default_value = "signum-notify.db", env = "SIGNUM_NOTIFY_DB", global = true)]
    pub db: PathBuf,

    /// Keep monitored accounts in memory only; `--db` is ignored.
    #[arg(long, env = "SIGNUM_NOTIFY_IN_MEMORY", global = true)]
    pub in_memory: bool,

    /// Account and transaction cache lifetime, in seconds.
    #[arg(long, default_value = "180", env = "SIGNUM_NOTIFY_CACHE_TTL")]
    pub cache_ttl: u64,

    /// Seconds between upstream pool rebuilds.
    #[arg(long, default_value = "1800", env = "SIGNUM_NOTIFY_REBUILD_PERIOD")]
    pub rebuild_period: u64,

    /// Seconds between notifier passes.
    #[arg(long, default_value = "240", env = "SIGNUM_NOTIFY_NOTIFIER_PERIOD")]
    pub notifier_period: u64,

    /// Check forged blocks on every k-th notifier pass.
    #[arg(long, default_value = "3", env = "SIGNUM_NOTIFY_BLOCK_TICK_RATIO")]
    pub block_tick_ratio: u32,

    /// RS address whose payments are also recorded as donations and payouts.
    #[arg(long, env = "SIGNUM_NOTIFY_FAUCET_ACCOUNT")]
    pub faucet_account: Option<String>,

    /// Warm the name cache for `--big-wallets` at startup.
    #[arg(long, env = "SIGNUM_NOTIFY_PRELOAD_BIG_WALLET_NAMES")]
    pub preload_big_wallet_names: bool,

    /// Accounts preloaded by `--preload-big-wallet-names`, comma separated.
    #[arg(long, env = "SIGNUM_NOTIFY_BIG_WALLETS", value_delimiter = ',')]
    pub big_wallets: Vec<String>,

    /// Newest transactions fetched per account and kind.
    #[arg(long, default_value = "10", env = "SIGNUM_NOTIFY_TRANSACTIONS_PAGE")]
    pub transactions_page: u32,

    /// Request spreading across ranked nodes: first-half, keep or full.
    #[arg(long, default_value = "first-half", env = "SIGNUM_NOTIFY_SPREAD_POLICY")]
    pub spread_policy: SpreadPolicy,

    /// Fixed seed for the node shuffle.
    #[arg(long, env = "SIGNUM_NOTIFY_RNG_SEED")]
    pub rng_seed: Option<u64>,

    /// Per-request timeout, in seconds.
    #[arg(long, default_value = "30", env = "SIGNUM_NOTIFY_REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    /// Per-node request rate limit.
    #[arg(long, env = "SIGNUM_NOTIFY_REQUESTS_PER_SECOND")]
    pub requests_per_second: Option<u32>,

    /// Drop cache entries older than this many TTLs on each rebuild.
    #[arg(long, default_value = "10", env = "SIGNUM_NOTIFY_CACHE_SWEEP_FACTOR")]
    pub cache_sweep_factor: u32,

    /// Notifications buffered between the notifier and the output.
    #[arg(long, default_value = "256", env = "SIGNUM_NOTIFY_EVENT_BUFFER")]
    pub event_buffer: usize,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll monitored accounts and log every notification (default).
    Run,
    /// Subscribe a chat to an account, then exit.
    Watch(WatchArgs),
    /// Probe the configured nodes and print them in rank order.
    Nodes,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Account id or RS address.
    pub account: String,

    #[arg(long)]
    pub chat_id: i64,

    #[arg(long, default_value = "")]
    pub user_name: String,

    #[arg(long)]
    pub no_incoming: bool,

    #[arg(long)]
    pub no_outgoing: bool,

    #[arg(long)]
    pub no_blocks: bool,

    /// Skip mining and message transactions.
    #[arg(long)]
    pub no_other: bool,
}

impl WatchArgs {
    pub fn notify(&self) -> NotifyFlags {
        NotifyFlags {
            incoming: !self.no_incoming,
            outgoing: !self.no_outgoing,
            new_blocks: !self.no_blocks,
            other: !self.no_other,
        }
    }
}

impl Cli {
    pub fn config(&self) -> Config {
        let api_hosts = if self.api_hosts.is_empty() {
            DEFAULT_API_HOSTS.iter().map(|h| h.to_string()).collect()
        } else {
            self.api_hosts.clone()
        };
        Config {
            api_hosts,
            cache_ttl: Duration::from_secs(self.cache_ttl),
            rebuild_period: Duration::from_secs(self.rebuild_period),
            notifier_period: Duration::from_secs(self.notifier_period),
            notifier_block_tick_ratio: self.block_tick_ratio,
            faucet_account: self.faucet_account.clone(),
            preload_big_wallet_names: self.preload_big_wallet_names,
            big_wallets: self.big_wallets.clone(),
            transactions_page: self.transactions_page,
            spread_policy: self.spread_policy,
            rng_seed: self.rng_seed,
            request_timeout: Duration::from_secs(self.request_timeout),
            requests_per_second: self.requests_per_second,
            cache_sweep_factor: self.cache_sweep_factor,
        }
    }
}
