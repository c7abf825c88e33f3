//! Typed Signum node operations over the upstream pool.
//!
//! Reads go through the TTL caches where a cached variant exists; writes
//! are assembled here and sent straight to the pool.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{ApiRequest, HttpTransport, RequestType, Transport, DEFAULT_DEADLINE};
use crate::cache::{Caches, Staleness};
use crate::config::Config;
use crate::error::CoreError;
use crate::pool::UpstreamPool;
use crate::types::{
    Account, AccountBlocks, AccountId, AccountTransactions, Block, BlockchainStatus,
    DecryptedMessage, MiningInfo, Nqt, RewardRecipient, SecretPhrase, SuggestedFee, Transaction,
    TransactionFilter, TransactionResponse,
};

pub struct SignumClient {
    pool: UpstreamPool,
    caches: Caches,
    transactions_page: u32,
}

impl SignumClient {
    pub fn new(pool: UpstreamPool, caches: Caches, transactions_page: u32) -> Self {
        Self {
            pool,
            caches,
            transactions_page: transactions_page.max(1),
        }
    }

    /// Build the HTTP transport, pool and caches described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, CoreError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
            config.request_timeout,
            config.requests_per_second,
        )?);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, CoreError> {
        let pool = UpstreamPool::new(
            &config.api_hosts,
            transport,
            config.spread_policy,
            config.rng_seed,
        )?;
        Ok(Self::new(
            pool,
            Caches::new(config.cache_ttl),
            config.transactions_page,
        ))
    }

    pub fn pool(&self) -> &UpstreamPool {
        &self.pool
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    // ==========================================================================
    // Maintenance
    // ==========================================================================

    pub async fn refresh_upstreams(&self) -> usize {
        self.pool.rebuild().await
    }

    pub async fn sweep_caches(&self, factor: u32) -> usize {
        self.caches.sweep(factor).await
    }

    /// Warm the account cache for well-known large wallets so their names
    /// resolve without a round trip when they show up in notifications.
    pub async fn preload_big_wallet_names(&self, accounts: &[String]) -> usize {
        let mut loaded = 0;
        for account in accounts {
            match self.get_account(account).await {
                Ok(found) => {
                    debug!(account = %account, name = ?found.display_name(), "big wallet preloaded");
                    loaded += 1;
                }
                Err(err) => warn!(account = %account, error = %err, "big wallet preload failed"),
            }
        }
        info!(loaded, requested = accounts.len(), "big wallet names preloaded");
        loaded
    }

    // ==========================================================================
    // Chain State
    // ==========================================================================

    pub async fn get_blockchain_status(&self) -> Result<BlockchainStatus, CoreError> {
        let request = ApiRequest::new(RequestType::GetBlockchainStatus);
        self.caches
            .status
            .get_or_refresh((), Staleness::Allow, || self.pool.execute(&request))
            .await
    }

    pub async fn get_mining_info(&self) -> Result<MiningInfo, CoreError> {
        self.pool
            .execute(&ApiRequest::new(RequestType::GetMiningInfo))
            .await
    }

    pub async fn suggest_fee(&self) -> Result<SuggestedFee, CoreError> {
        let request = ApiRequest::new(RequestType::SuggestFee);
        self.caches
            .fees
            .get_or_refresh((), Staleness::Allow, || self.pool.execute(&request))
            .await
    }

    pub async fn get_block(&self, block_id: &str) -> Result<Block, CoreError> {
        self.pool
            .execute(&ApiRequest::new(RequestType::GetBlock).param("block", block_id))
            .await
    }

    pub async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, CoreError> {
        self.pool
            .execute(&ApiRequest::new(RequestType::GetTransaction).param("transaction", transaction_id))
            .await
    }

    // ==========================================================================
    // Accounts
    // ==========================================================================

    fn account_request(account: &str) -> ApiRequest {
        ApiRequest::new(RequestType::GetAccount)
            .param("account", account)
            .param("getCommittedAmount", true)
    }

    /// Fetch an account from the network and refresh its cache entry.
    pub async fn get_account(&self, account: &str) -> Result<Account, CoreError> {
        let found: Account = self.pool.execute(&Self::account_request(account)).await?;
        self.caches
            .accounts
            .insert(account.to_owned(), found.clone())
            .await;
        Ok(found)
    }

    pub async fn get_cached_account(&self, account: &str) -> Result<Account, CoreError> {
        let request = Self::account_request(account);
        self.caches
            .accounts
            .get_or_refresh(account.to_owned(), Staleness::Allow, || self.pool.execute(&request))
            .await
    }

    pub async fn get_account_id(&self, public_key: &str) -> Result<AccountId, CoreError> {
        self.pool
            .execute(&ApiRequest::new(RequestType::GetAccountId).param("publicKey", public_key))
            .await
    }

    pub async fn get_reward_recipient(&self, account: &str) -> Result<RewardRecipient, CoreError> {
        self.pool
            .execute(&ApiRequest::new(RequestType::GetRewardRecipient).param("account", account))
            .await
    }

    // ==========================================================================
    // Account History
    // ==========================================================================

    fn transactions_request(&self, account: &str, filter: TransactionFilter, page: u32) -> ApiRequest {
        ApiRequest::new(RequestType::GetAccountTransactions)
            .param("account", account)
            .param("type", filter.tx_type)
            .opt_param("subtype", filter.subtype)
            .param("firstIndex", 0)
            .param("lastIndex", page.max(1) - 1)
            .param("includeIndirect", true)
    }

    /// Newest-first transactions of `account`, at most `page` of them.
    pub async fn get_account_transactions(
        &self,
        account: &str,
        filter: TransactionFilter,
        page: u32,
    ) -> Result<AccountTransactions, CoreError> {
        self.pool
            .execute(&self.transactions_request(account, filter, page))
            .await
    }

    pub async fn get_cached_account_transactions(
        &self,
        account: &str,
        filter: TransactionFilter,
    ) -> Result<AccountTransactions, CoreError> {
        let request = self.transactions_request(account, filter, self.transactions_page);
        self.caches
            .transactions
            .get_or_refresh((account.to_owned(), filter), Staleness::Reject, || {
                self.pool.execute(&request)
            })
            .await
    }

    pub async fn payment_transactions(&self, account: &str) -> Result<AccountTransactions, CoreError> {
        self.get_cached_account_transactions(account, TransactionFilter::PAYMENTS)
            .await
    }

    pub async fn mining_transactions(&self, account: &str) -> Result<AccountTransactions, CoreError> {
        self.get_cached_account_transactions(account, TransactionFilter::MINING)
            .await
    }

    pub async fn message_transactions(&self, account: &str) -> Result<AccountTransactions, CoreError> {
        self.get_cached_account_transactions(account, TransactionFilter::MESSAGES)
            .await
    }

    fn blocks_request(&self, account: &str) -> ApiRequest {
        ApiRequest::new(RequestType::GetAccountBlocks)
            .param("account", account)
            .param("firstIndex", 0)
            .param("lastIndex", self.transactions_page - 1)
    }

    /// Newest-first blocks forged by `account`.
    pub async fn get_account_blocks(&self, account: &str) -> Result<AccountBlocks, CoreError> {
        self.pool.execute(&self.blocks_request(account)).await
    }

    pub async fn get_cached_account_blocks(&self, account: &str) -> Result<AccountBlocks, CoreError> {
        let request = self.blocks_request(account);
        self.caches
            .blocks
            .get_or_refresh(account.to_owned(), Staleness::Reject, || {
                self.pool.execute(&request)
            })
            .await
    }

    /// Read a transaction's message; `secret` decrypts an encrypted one.
    pub async fn read_message(
        &self,
        transaction_id: &str,
        secret: Option<&SecretPhrase>,
    ) -> Result<DecryptedMessage, CoreError> {
        let request = ApiRequest::new(RequestType::ReadMessage)
            .param("transaction", transaction_id)
            .opt_param("secretPhrase", secret.map(SecretPhrase::expose));
        self.pool.execute(&request).await
    }

    // ==========================================================================
    // Transactions
    // ==========================================================================

    fn transaction_request(request_type: RequestType, secret: &SecretPhrase, fee: Nqt) -> ApiRequest {
        ApiRequest::new(request_type)
            .param("secretPhrase", secret.expose())
            .param("feeNQT", fee.0)
            .param("deadline", DEFAULT_DEADLINE)
    }

    async fn create_transaction(&self, request: ApiRequest) -> Result<TransactionResponse, CoreError> {
        let response: TransactionResponse = self.pool.execute(&request).await?;
        info!(
            api.request_type = %request.request_type,
            transaction = ?response.transaction,
            broadcasted = response.broadcasted,
            "transaction created"
        );
        Ok(response)
    }

    pub async fn send_money(
        &self,
        secret: &SecretPhrase,
        recipient: &str,
        signa: f64,
        fee: Nqt,
    ) -> Result<TransactionResponse, CoreError> {
        let amount = Nqt::from_signa(signa)?;
        let request = Self::transaction_request(RequestType::SendMoney, secret, fee)
            .param("recipient", recipient)
            .param("amountNQT", amount.0);
        self.create_transaction(request).await
    }

    /// Pay each `(recipient id, SIGNA)` pair in one transaction.
    pub async fn send_money_multi(
        &self,
        secret: &SecretPhrase,
        payouts: &[(String, f64)],
        fee: Nqt,
    ) -> Result<TransactionResponse, CoreError> {
        if payouts.is_empty() {
            return Err(CoreError::InvalidData("multi-out payment needs recipients".to_owned()));
        }
        let recipients = payouts
            .iter()
            .map(|(id, signa)| Ok(format!("{id}:{}", Nqt::from_signa(*signa)?.0)))
            .collect::<Result<Vec<_>, CoreError>>()?
            .join(";");
        let request = Self::transaction_request(RequestType::SendMoneyMulti, secret, fee)
            .param("recipients", recipients);
        self.create_transaction(request).await
    }

    /// Split `total_signa` equally between `recipients`.
    pub async fn send_money_multi_same(
        &self,
        secret: &SecretPhrase,
        recipients: &[String],
        total_signa: f64,
        fee: Nqt,
    ) -> Result<TransactionResponse, CoreError> {
        let share = Nqt::from_signa(total_signa)?
            .checked_div(recipients.len() as u64)
            .ok_or_else(|| CoreError::InvalidData("multi-out payment needs recipients".to_owned()))?;
        let request = Self::transaction_request(RequestType::SendMoneyMultiSame, secret, fee)
            .param("recipients", recipients.join(";"))
            .param("amountNQT", share.0);
        self.create_transaction(request).await
    }

    pub async fn send_message(
        &self,
        secret: &SecretPhrase,
        recipient: &str,
        message: &str,
        fee: Nqt,
    ) -> Result<TransactionResponse, CoreError> {
        let request = Self::transaction_request(RequestType::SendMessage, secret, fee)
            .param("recipient", recipient)
            .param("message", message)
            .param("messageIsText", true);
        self.create_transaction(request).await
    }

    pub async fn set_reward_recipient(
        &self,
        secret: &SecretPhrase,
        recipient: &str,
        fee: Nqt,
    ) -> Result<TransactionResponse, CoreError> {
        let request = Self::transaction_request(RequestType::SetRewardRecipient, secret, fee)
            .param("recipient", recipient);
        self.create_transaction(request).await
    }

    pub async fn add_commitment(
        &self,
        secret: &SecretPhrase,
        signa: f64,
        fee: Nqt,
    ) -> Result<TransactionResponse, CoreError> {
        let request = Self::transaction_request(RequestType::AddCommitment, secret, fee)
            .param("amountNQT", Nqt::from_signa(signa)?.0);
        self.create_transaction(request).await
    }

    pub async fn remove_commitment(
        &self,
        secret: &SecretPhrase,
        signa: f64,
        fee: Nqt,
    ) -> Result<TransactionResponse, CoreError> {
        let request = Self::transaction_request(RequestType::RemoveCommitment, secret, fee)
            .param("amountNQT", Nqt::from_signa(signa)?.0);
        self.create_transaction(request).await
    }

    pub async fn set_account_info(
        &self,
        secret: &SecretPhrase,
        name: &str,
        description: &str,
        fee: Nqt,
    ) -> Result<TransactionResponse, CoreError> {
        let request = Self::transaction_request(RequestType::SetAccountInfo, secret, fee)
            .param("name", name)
            .param("description", description);
        self.create_transaction(request).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::mock::{MockRule, MockTransport};
    use crate::types::ONE_SIGNA;

    const HOST: &str = "http://node";

    fn client(mock: &Arc<MockTransport>) -> SignumClient {
        let config = Config {
            api_hosts: vec![HOST.to_owned()],
            rng_seed: Some(1),
            ..Config::default()
        };
        SignumClient::with_transport(&config, mock.clone()).expect("valid config")
    }

    fn sent() -> MockRule {
        MockRule::json(RequestType::SendMoney, json!({ "transaction": "1", "broadcasted": true }))
    }

    #[tokio::test]
    async fn get_account_asks_for_committed_amount_and_fills_cache() {
        let mock = Arc::new(
            MockTransport::builder()
                .rule(MockRule::json(
                    RequestType::GetAccount,
                    json!({ "account": "42", "balanceNQT": "500000000", "committedBalanceNQT": "100" }),
                ))
                .build(),
        );
        let client = client(&mock);

        let account = client.get_account("42").await.expect("account");
        assert_eq!(account.total_balance, Nqt(5 * ONE_SIGNA));
        let call = &mock.calls_for(RequestType::GetAccount)[0];
        assert_eq!(call.param("getCommittedAmount"), Some("true"));

        let cached = client.get_cached_account("42").await.expect("cached");
        assert_eq!(cached, account);
        assert_eq!(mock.calls_for(RequestType::GetAccount).len(), 1);
    }

    #[tokio::test]
    async fn cached_transactions_are_keyed_by_filter() {
        let mock = Arc::new(
            MockTransport::builder()
                .rule(MockRule::json(
                    RequestType::GetAccountTransactions,
                    json!({ "transactions": [] }),
                ))
                .build(),
        );
        let client = client(&mock);

        client.payment_transactions("42").await.expect("payments");
        client.payment_transactions("42").await.expect("payments again");
        client.message_transactions("42").await.expect("messages");

        let calls = mock.calls_for(RequestType::GetAccountTransactions);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].param("type"), Some("0"));
        assert_eq!(calls[0].param("subtype"), None);
        assert_eq!(calls[0].param("includeIndirect"), Some("true"));
        assert_eq!(calls[0].param("lastIndex"), Some("9"));
        assert_eq!(calls[1].param("type"), Some("1"));
        assert_eq!(calls[1].param("subtype"), Some("0"));
    }

    #[tokio::test]
    async fn send_money_builds_transaction_parameters() {
        let mock = Arc::new(MockTransport::builder().rule(sent()).build());
        let client = client(&mock);
        let secret = SecretPhrase::new("one two three");

        let response = client
            .send_money(&secret, "77", 1.5, Nqt(735_000))
            .await
            .expect("sent");
        assert!(response.broadcasted);

        let call = &mock.calls_for(RequestType::SendMoney)[0];
        assert_eq!(call.param("recipient"), Some("77"));
        assert_eq!(call.param("amountNQT"), Some("150000000"));
        assert_eq!(call.param("feeNQT"), Some("735000"));
        assert_eq!(call.param("deadline"), Some("1440"));
        assert_eq!(call.param("secretPhrase"), Some("one two three"));
    }

    #[tokio::test]
    async fn multi_payments_encode_recipients() {
        let mock = Arc::new(
            MockTransport::builder()
                .rule(MockRule::json(RequestType::SendMoneyMulti, json!({ "transaction": "2" })))
                .rule(MockRule::json(RequestType::SendMoneyMultiSame, json!({ "transaction": "3" })))
                .build(),
        );
        let client = client(&mock);
        let secret = SecretPhrase::new("s");

        client
            .send_money_multi(&secret, &[("1".into(), 1.0), ("2".into(), 0.5)], Nqt(1))
            .await
            .expect("multi");
        client
            .send_money_multi_same(&secret, &["1".into(), "2".into(), "3".into()], 3.0, Nqt(1))
            .await
            .expect("multi same");

        let multi = &mock.calls_for(RequestType::SendMoneyMulti)[0];
        assert_eq!(multi.param("recipients"), Some("1:100000000;2:50000000"));
        let same = &mock.calls_for(RequestType::SendMoneyMultiSame)[0];
        assert_eq!(same.param("recipients"), Some("1;2;3"));
        assert_eq!(same.param("amountNQT"), Some("100000000"));
    }

    #[tokio::test]
    async fn multi_same_without_recipients_is_rejected_locally() {
        let mock = Arc::new(MockTransport::default());
        let client = client(&mock);

        let err = client
            .send_money_multi_same(&SecretPhrase::new("s"), &[], 1.0, Nqt(1))
            .await
            .expect_err("no recipients");
        assert!(matches!(err, CoreError::InvalidData(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn commitment_and_info_requests_are_posts() {
        let mock = Arc::new(
            MockTransport::builder()
                .rule(MockRule::json(RequestType::AddCommitment, json!({})))
                .rule(MockRule::json(RequestType::SetAccountInfo, json!({})))
                .build(),
        );
        let client = client(&mock);
        let secret = SecretPhrase::new("s");

        client.add_commitment(&secret, 2500.0, Nqt(1)).await.expect("commit");
        client
            .set_account_info(&secret, "miner", "pool", Nqt(1))
            .await
            .expect("info");

        let commit = &mock.calls_for(RequestType::AddCommitment)[0];
        assert_eq!(commit.param("amountNQT"), Some("250000000000"));
        let info = &mock.calls_for(RequestType::SetAccountInfo)[0];
        assert_eq!(info.param("name"), Some("miner"));
    }

    #[tokio::test]
    async fn suggested_fee_is_cached() {
        let mock = Arc::new(
            MockTransport::builder()
                .rule(MockRule::json(
                    RequestType::SuggestFee,
                    json!({ "cheap": 735000, "standard": 1470000, "priority": 2205000 }),
                ))
                .build(),
        );
        let client = client(&mock);

        let fee = client.suggest_fee().await.expect("fee");
        client.suggest_fee().await.expect("fee again");
        assert_eq!(fee.standard, Nqt(1_470_000));
        assert_eq!(mock.calls_for(RequestType::SuggestFee).len(), 1);
    }

    #[tokio::test]
    async fn preload_counts_reachable_wallets() {
        let mock = Arc::new(
            MockTransport::builder()
                .rule(
                    MockRule::json(RequestType::GetAccount, json!({ "account": "1", "name": "Exchange" }))
                        .with_param("account", "1"),
                )
                .build(),
        );
        let client = client(&mock);

        let loaded = client
            .preload_big_wallet_names(&["1".to_owned(), "2".to_owned()])
            .await;
        assert_eq!(loaded, 1);
        let cached = client.caches().accounts.get(&"1".to_owned()).await.expect("warm");
        assert_eq!(cached.display_name(), Some("Exchange"));
    }
}
