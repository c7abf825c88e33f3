//! Periodic change detection for monitored accounts.
//!
//! Each tick walks every monitored account, compares the node's newest-first
//! lists against the stored watermarks, and sends one [`NotifierEvent`] per
//! new item, oldest first. Failures are logged and the pass continues.

mod render;
mod scan;

pub use render::{chain_time, escape_html, format_signa, CHAIN_EPOCH_UNIX};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::client::SignumClient;
use crate::config::Config;
use crate::service::ShutdownSignal;
use crate::types::{Account, Attachment, Nqt, Transaction};
use crate::watermark::{Donation, FaucetPayout, MonitoredAccount, WatermarkKind, WatermarkStore};

use scan::{scan, Scan};

/// Raffle bot whose payouts are never announced.
pub const RAFFLE_ACCOUNT_RS: &str = "S-JM3M-MHWM-UVQ6-DSN3Q";

/// A chat notification produced by the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierEvent {
    pub chat_id: i64,
    pub user_name: String,
    pub account_rs: String,
    pub kind: WatermarkKind,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub period: Duration,
    /// Blocks are checked on ticks where `tick % block_tick_ratio == 0`.
    pub block_tick_ratio: u32,
    pub faucet_account: Option<String>,
}

impl From<&Config> for NotifierConfig {
    fn from(config: &Config) -> Self {
        Self {
            period: config.notifier_period,
            block_tick_ratio: config.notifier_block_tick_ratio,
            faucet_account: config.faucet_account.clone(),
        }
    }
}

/// Tick 0 is the startup pass, so blocks are checked at startup and then on
/// every `ratio`-th timer tick.
pub fn is_block_tick(tick: u64, ratio: u32) -> bool {
    tick % u64::from(ratio.max(1)) == 0
}

fn stopping(shutdown: &mut Option<&mut ShutdownSignal>) -> bool {
    shutdown.as_deref_mut().is_some_and(ShutdownSignal::is_signalled)
}

/// Counters for one pass over the monitored accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub accounts: usize,
    pub events: usize,
}

pub struct Notifier {
    client: Arc<SignumClient>,
    store: Arc<dyn WatermarkStore>,
    events: mpsc::Sender<NotifierEvent>,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(
        client: Arc<SignumClient>,
        store: Arc<dyn WatermarkStore>,
        events: mpsc::Sender<NotifierEvent>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            client,
            store,
            events,
            config,
        }
    }

    /// Run passes until `shutdown` fires. The first pass starts immediately.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        let mut ticker = interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            period_s = self.config.period.as_secs(),
            block_tick_ratio = self.config.block_tick_ratio,
            "notifier started"
        );

        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("notifier received shutdown signal");
                    return;
                }
                _ = ticker.tick() => {}
            }
            let check_blocks = is_block_tick(tick, self.config.block_tick_ratio);
            self.pass(check_blocks, Some(&mut shutdown)).await;
            tick = tick.wrapping_add(1);
        }
    }

    /// One pass over every monitored account.
    pub async fn run_once(&self, check_blocks: bool) -> PassSummary {
        self.pass(check_blocks, None).await
    }

    async fn pass(&self, check_blocks: bool, mut shutdown: Option<&mut ShutdownSignal>) -> PassSummary {
        let started = Instant::now();
        let accounts = match self.store.monitored_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                error!(error = %err, "could not load monitored accounts");
                return PassSummary::default();
            }
        };

        let mut summary = PassSummary::default();
        for account in &accounts {
            if stopping(&mut shutdown) {
                info!(
                    remaining = accounts.len() - summary.accounts,
                    "shutdown requested, ending notifier pass early"
                );
                break;
            }
            summary.accounts += 1;
            summary.events += self.check_account(account, check_blocks, &mut shutdown).await;
        }

        debug!(
            accounts = summary.accounts,
            events = summary.events,
            check_blocks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "notifier pass finished"
        );
        summary
    }

    /// Runs the enabled checks in order. A shutdown seen between two checks
    /// skips the rest, so no request starts after the signal.
    async fn check_account(
        &self,
        account: &MonitoredAccount,
        check_blocks: bool,
        shutdown: &mut Option<&mut ShutdownSignal>,
    ) -> usize {
        debug!(
            account = %account.account_rs,
            incoming = account.notify.incoming,
            outgoing = account.notify.outgoing,
            blocks = account.notify.new_blocks,
            other = account.notify.other,
            "checking account"
        );
        let kinds = [
            (WatermarkKind::Payment, account.notify.payments()),
            (WatermarkKind::Mining, account.notify.other),
            (WatermarkKind::Message, account.notify.other),
            (WatermarkKind::Block, check_blocks && account.notify.new_blocks),
        ];

        let mut sent = 0;
        for (kind, enabled) in kinds {
            if !enabled {
                continue;
            }
            if stopping(shutdown) {
                debug!(account = %account.account_rs, %kind, "shutdown requested, skipping remaining checks");
                break;
            }
            sent += match kind {
                WatermarkKind::Payment => self.check_payments(account).await,
                WatermarkKind::Mining => self.check_mining(account).await,
                WatermarkKind::Message => self.check_messages(account).await,
                WatermarkKind::Block => self.check_blocks(account).await,
            };
        }
        sent
    }

    // ==========================================================================
    // Per-Kind Checks
    // ==========================================================================

    async fn check_payments(&self, account: &MonitoredAccount) -> usize {
        let kind = WatermarkKind::Payment;
        let list = match self.client.payment_transactions(&account.account_id).await {
            Ok(list) => list,
            Err(err) => {
                warn!(account = %account.account_rs, error = %err, "could not get payment transactions");
                return 0;
            }
        };
        let fresh = match scan(&list.transactions, account.watermark(kind), |tx| tx.id.as_str()) {
            Scan::Unchanged => return 0,
            Scan::Baseline(newest) => {
                self.advance(account, kind, &newest.id).await;
                return 0;
            }
            Scan::Fresh(fresh) => fresh,
        };

        let balance = self
            .fresh_account(account)
            .await
            .map(|a| render::total_balance_line(a.total_balance))
            .unwrap_or_default();
        let is_faucet = self.config.faucet_account.as_deref() == Some(account.account_rs.as_str());

        let mut sent = 0;
        for tx in fresh.iter().rev() {
            if tx.sender_rs == RAFFLE_ACCOUNT_RS {
                debug!(account = %account.account_rs, transaction = %tx.id, "skipping raffle payout");
                continue;
            }
            let income = tx.is_income_for(&account.account_id);
            if (income && !account.notify.incoming) || (!income && !account.notify.outgoing) {
                continue;
            }

            let counterpart = if income {
                Some(tx.sender_rs.as_str())
            } else {
                tx.recipient_rs.as_deref()
            };
            let name = self.account_name(counterpart).await;
            let Some(notice) = render::payment(
                &account.account_rs,
                &account.account_id,
                tx,
                income,
                name.as_deref(),
            ) else {
                warn!(
                    account = %account.account_rs,
                    transaction = %tx.id,
                    subtype = tx.subtype,
                    "unknown payment subtype"
                );
                continue;
            };

            if is_faucet {
                self.record_faucet_row(tx, income, notice.amount).await;
            }
            if self.emit(account, kind, notice.body + &balance).await {
                sent += 1;
            }
        }

        self.advance(account, kind, &fresh[0].id).await;
        sent
    }

    async fn check_mining(&self, account: &MonitoredAccount) -> usize {
        let kind = WatermarkKind::Mining;
        let list = match self.client.mining_transactions(&account.account_id).await {
            Ok(list) => list,
            Err(err) => {
                warn!(account = %account.account_rs, error = %err, "could not get mining transactions");
                return 0;
            }
        };
        let fresh = match scan(&list.transactions, account.watermark(kind), |tx| tx.id.as_str()) {
            Scan::Unchanged => return 0,
            Scan::Baseline(newest) => {
                self.advance(account, kind, &newest.id).await;
                return 0;
            }
            Scan::Fresh(fresh) => fresh,
        };

        let commitment = self
            .fresh_account(account)
            .await
            .map(|a| render::total_commitment_line(a.committed_balance))
            .unwrap_or_default();

        let mut sent = 0;
        for tx in fresh.iter().rev() {
            let name = match tx.attachment {
                Attachment::RewardRecipientAssignment => {
                    self.account_name(tx.recipient_rs.as_deref()).await
                }
                _ => None,
            };
            let Some(body) = render::mining(&account.account_rs, tx, name.as_deref()) else {
                warn!(
                    account = %account.account_rs,
                    transaction = %tx.id,
                    subtype = tx.subtype,
                    "unknown mining subtype"
                );
                continue;
            };
            if self.emit(account, kind, body + &commitment).await {
                sent += 1;
            }
        }

        self.advance(account, kind, &fresh[0].id).await;
        sent
    }

    async fn check_messages(&self, account: &MonitoredAccount) -> usize {
        let kind = WatermarkKind::Message;
        let list = match self.client.message_transactions(&account.account_id).await {
            Ok(list) => list,
            Err(err) => {
                warn!(account = %account.account_rs, error = %err, "could not get message transactions");
                return 0;
            }
        };
        let fresh = match scan(&list.transactions, account.watermark(kind), |tx| tx.id.as_str()) {
            Scan::Unchanged => return 0,
            Scan::Baseline(newest) => {
                self.advance(account, kind, &newest.id).await;
                return 0;
            }
            Scan::Fresh(fresh) => fresh,
        };

        let mut sent = 0;
        for tx in fresh.iter().rev() {
            let income = tx.is_income_for(&account.account_id);
            let counterpart = if income {
                Some(tx.sender_rs.as_str())
            } else {
                tx.recipient_rs.as_deref()
            };
            let name = self.account_name(counterpart).await;
            let Some(body) = render::message(&account.account_rs, tx, income, name.as_deref()) else {
                warn!(
                    account = %account.account_rs,
                    transaction = %tx.id,
                    subtype = tx.subtype,
                    "unknown message subtype"
                );
                continue;
            };
            if self.emit(account, kind, body).await {
                sent += 1;
            }
        }

        self.advance(account, kind, &fresh[0].id).await;
        sent
    }

    async fn check_blocks(&self, account: &MonitoredAccount) -> usize {
        let kind = WatermarkKind::Block;
        let list = match self.client.get_cached_account_blocks(&account.account_id).await {
            Ok(list) => list,
            Err(err) => {
                warn!(account = %account.account_rs, error = %err, "could not get account blocks");
                return 0;
            }
        };
        let newest = match scan(&list.blocks, account.watermark(kind), |b| b.id.as_str()) {
            Scan::Unchanged => return 0,
            Scan::Baseline(newest) => {
                self.advance(account, kind, &newest.id).await;
                return 0;
            }
            Scan::Fresh(fresh) => &fresh[0],
        };

        let sent = self
            .emit(account, kind, render::block(&account.account_rs, newest))
            .await;
        self.advance(account, kind, &newest.id).await;
        usize::from(sent)
    }

    // ==========================================================================
    // Helpers
    // ==========================================================================

    /// Uncached account state, for balances shown under a notice.
    async fn fresh_account(&self, account: &MonitoredAccount) -> Option<Account> {
        match self.client.get_account(&account.account_id).await {
            Ok(found) => Some(found),
            Err(err) => {
                warn!(account = %account.account_rs, error = %err, "could not get account balance");
                None
            }
        }
    }

    async fn account_name(&self, account: Option<&str>) -> Option<String> {
        let account = account?;
        match self.client.get_cached_account(account).await {
            Ok(found) => found.display_name().map(str::to_owned),
            Err(err) => {
                debug!(account, error = %err, "account name lookup failed");
                None
            }
        }
    }

    async fn record_faucet_row(&self, tx: &Transaction, income: bool, amount: Nqt) {
        let result = if income {
            self.store
                .record_donation(&Donation {
                    account: tx.sender.clone(),
                    account_rs: tx.sender_rs.clone(),
                    transaction_id: tx.id.clone(),
                    amount,
                })
                .await
        } else {
            let ordinary = tx.attachment == Attachment::OrdinaryPayment;
            let recipient = |field: &Option<String>| {
                field.as_ref().filter(|_| ordinary).cloned().unwrap_or_default()
            };
            self.store
                .record_faucet(&FaucetPayout {
                    account: recipient(&tx.recipient),
                    account_rs: recipient(&tx.recipient_rs),
                    transaction_id: tx.id.clone(),
                    amount,
                    fee: tx.fee,
                })
                .await
        };
        if let Err(err) = result {
            error!(transaction = %tx.id, income, error = %err, "could not record faucet payment");
        }
    }

    async fn emit(&self, account: &MonitoredAccount, kind: WatermarkKind, body: String) -> bool {
        let event = NotifierEvent {
            chat_id: account.chat_id,
            user_name: account.user_name.clone(),
            account_rs: account.account_rs.clone(),
            kind,
            body,
        };
        if self.events.send(event).await.is_err() {
            warn!(account = %account.account_rs, %kind, "event receiver closed, notification dropped");
            return false;
        }
        true
    }

    async fn advance(&self, account: &MonitoredAccount, kind: WatermarkKind, newest: &str) {
        if let Err(err) = self.store.update_watermark(account.id, kind, newest).await {
            error!(account = %account.account_rs, %kind, error = %err, "could not persist watermark");
        }
    }
}
