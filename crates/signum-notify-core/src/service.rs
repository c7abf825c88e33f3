//! Background task group: the upstream rebuilder and the notifier.
//!
//! Both tasks select on a shared broadcast shutdown channel next to their
//! ticker, finish the iteration in progress and return.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::client::SignumClient;
use crate::config::Config;
use crate::error::CoreError;
use crate::notifier::{Notifier, NotifierConfig, NotifierEvent};
use crate::watermark::WatermarkStore;

// ==============================================================================
// Shutdown Signal
// ==============================================================================

/// Receiving half of the shutdown broadcast. Once observed, it stays fired.
pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
    fired: bool,
}

impl ShutdownSignal {
    pub fn new(receiver: broadcast::Receiver<()>) -> Self {
        Self {
            receiver,
            fired: false,
        }
    }

    /// Wait for shutdown. A dropped sender counts as shutdown.
    pub async fn recv(&mut self) {
        if !self.fired {
            let _ = self.receiver.recv().await;
            self.fired = true;
        }
    }

    /// Non-blocking check, for stopping long iterations early.
    pub fn is_signalled(&mut self) -> bool {
        if !self.fired {
            self.fired = !matches!(self.receiver.try_recv(), Err(TryRecvError::Empty));
        }
        self.fired
    }
}

// ==============================================================================
// Rebuilder
// ==============================================================================

struct Rebuilder {
    client: Arc<SignumClient>,
    period: Duration,
    sweep_factor: u32,
}

impl Rebuilder {
    async fn run(self, mut shutdown: ShutdownSignal) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("rebuilder received shutdown signal");
                    return;
                }
                _ = ticker.tick() => {}
            }
            self.client.refresh_upstreams().await;
            let swept = self.client.sweep_caches(self.sweep_factor).await;
            if swept > 0 {
                info!(swept, "dropped long-expired cache entries");
            }
        }
    }
}

// ==============================================================================
// Service
// ==============================================================================

pub struct Service {
    client: Arc<SignumClient>,
    shutdown: broadcast::Sender<()>,
    tasks: JoinSet<()>,
}

impl Service {
    /// Rank the upstreams once, warm big-wallet names if configured, then
    /// spawn the rebuilder and notifier.
    pub async fn start(
        client: Arc<SignumClient>,
        store: Arc<dyn WatermarkStore>,
        config: &Config,
        events: mpsc::Sender<NotifierEvent>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        if client.refresh_upstreams().await == 0 {
            warn!("no upstream answered at startup, using configured order");
        }
        if config.preload_big_wallet_names && !config.big_wallets.is_empty() {
            client.preload_big_wallet_names(&config.big_wallets).await;
        }

        let (shutdown, _) = broadcast::channel(1);
        let mut tasks = JoinSet::new();

        let rebuilder = Rebuilder {
            client: client.clone(),
            period: config.rebuild_period,
            sweep_factor: config.cache_sweep_factor,
        };
        tasks.spawn(rebuilder.run(ShutdownSignal::new(shutdown.subscribe())));

        let notifier = Notifier::new(client.clone(), store, events, NotifierConfig::from(config));
        let signal = ShutdownSignal::new(shutdown.subscribe());
        tasks.spawn(async move { notifier.run(signal).await });

        info!(
            rebuild_period_s = config.rebuild_period.as_secs(),
            notifier_period_s = config.notifier_period.as_secs(),
            "background tasks started"
        );
        Ok(Self {
            client,
            shutdown,
            tasks,
        })
    }

    pub fn client(&self) -> &Arc<SignumClient> {
        &self.client
    }

    /// Signal every task and wait for all of them to return.
    pub async fn shutdown(mut self) -> Result<(), CoreError> {
        info!(tasks = self.tasks.len(), "stopping background tasks");
        let _ = self.shutdown.send(());

        let mut failed = false;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "background task ended abnormally");
                failed = true;
            }
        }
        if failed {
            return Err(CoreError::Shutdown);
        }
        info!("background tasks stopped");
        Ok(())
    }
}
