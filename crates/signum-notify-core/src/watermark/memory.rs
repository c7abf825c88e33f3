use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoreError;

use super::{
    Donation, FaucetPayout, MonitoredAccount, NewMonitoredAccount, WatermarkKind, WatermarkStore,
};

#[derive(Default)]
struct State {
    accounts: Vec<MonitoredAccount>,
    donations: Vec<Donation>,
    faucets: Vec<FaucetPayout>,
    next_id: i64,
}

/// Volatile store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryWatermarkStore {
    state: RwLock<State>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account(&self, row_id: i64) -> Option<MonitoredAccount> {
        self.state
            .read()
            .await
            .accounts
            .iter()
            .find(|a| a.id == row_id)
            .cloned()
    }

    pub async fn donations(&self) -> Vec<Donation> {
        self.state.read().await.donations.clone()
    }

    pub async fn faucets(&self) -> Vec<FaucetPayout> {
        self.state.read().await.faucets.clone()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn monitored_accounts(&self) -> Result<Vec<MonitoredAccount>, CoreError> {
        Ok(self
            .state
            .read()
            .await
            .accounts
            .iter()
            .filter(|a| a.notify.any())
            .cloned()
            .collect())
    }

    async fn update_watermark(
        &self,
        row_id: i64,
        kind: WatermarkKind,
        value: &str,
    ) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == row_id)
            .ok_or_else(|| CoreError::WatermarkStore(format!("no monitored account {row_id}")))?;
        account.set_watermark(kind, value);
        Ok(())
    }

    async fn record_donation(&self, donation: &Donation) -> Result<(), CoreError> {
        self.state.write().await.donations.push(donation.clone());
        Ok(())
    }

    async fn record_faucet(&self, payout: &FaucetPayout) -> Result<(), CoreError> {
        self.state.write().await.faucets.push(payout.clone());
        Ok(())
    }

    async fn register(&self, account: &NewMonitoredAccount) -> Result<i64, CoreError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .accounts
            .iter_mut()
            .find(|a| a.chat_id == account.chat_id && a.account_id == account.account_id)
        {
            existing.notify = account.notify;
            existing.user_name = account.user_name.clone();
            return Ok(existing.id);
        }

        state.next_id += 1;
        let id = state.next_id;
        state.accounts.push(MonitoredAccount {
            id,
            account_id: account.account_id.clone(),
            account_rs: account.account_rs.clone(),
            chat_id: account.chat_id,
            user_name: account.user_name.clone(),
            notify: account.notify,
            last_payment_tx_id: None,
            last_mining_tx_id: None,
            last_message_tx_id: None,
            last_block_id: None,
        });
        Ok(id)
    }
}
