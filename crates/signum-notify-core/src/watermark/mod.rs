//! Persistence of monitored accounts and their notification watermarks.
//!
//! A watermark is the id of the newest item already announced for one
//! account and one data set. The notifier is the only writer.

mod memory;
mod sqlite;

pub use memory::MemoryWatermarkStore;
pub use sqlite::SqliteWatermarkStore;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::Nqt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyFlags {
    pub incoming: bool,
    pub outgoing: bool,
    pub new_blocks: bool,
    pub other: bool,
}

impl NotifyFlags {
    pub const ALL: Self = Self {
        incoming: true,
        outgoing: true,
        new_blocks: true,
        other: true,
    };

    pub fn any(self) -> bool {
        self.incoming || self.outgoing || self.new_blocks || self.other
    }

    pub fn payments(self) -> bool {
        self.incoming || self.outgoing
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredAccount {
    /// Store row key.
    pub id: i64,
    pub account_id: String,
    pub account_rs: String,
    pub chat_id: i64,
    pub user_name: String,
    pub notify: NotifyFlags,
    pub last_payment_tx_id: Option<String>,
    pub last_mining_tx_id: Option<String>,
    pub last_message_tx_id: Option<String>,
    pub last_block_id: Option<String>,
}

impl MonitoredAccount {
    pub fn watermark(&self, kind: WatermarkKind) -> Option<&str> {
        match kind {
            WatermarkKind::Payment => self.last_payment_tx_id.as_deref(),
            WatermarkKind::Mining => self.last_mining_tx_id.as_deref(),
            WatermarkKind::Message => self.last_message_tx_id.as_deref(),
            WatermarkKind::Block => self.last_block_id.as_deref(),
        }
    }

    pub fn set_watermark(&mut self, kind: WatermarkKind, value: &str) {
        let slot = match kind {
            WatermarkKind::Payment => &mut self.last_payment_tx_id,
            WatermarkKind::Mining => &mut self.last_mining_tx_id,
            WatermarkKind::Message => &mut self.last_message_tx_id,
            WatermarkKind::Block => &mut self.last_block_id,
        };
        *slot = Some(value.to_owned());
    }
}

/// The data sets tracked per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatermarkKind {
    Payment,
    Mining,
    Message,
    Block,
}

impl WatermarkKind {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Payment => "last_payment_tx_id",
            Self::Mining => "last_mining_tx_id",
            Self::Message => "last_message_tx_id",
            Self::Block => "last_block_id",
        }
    }
}

impl std::fmt::Display for WatermarkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Payment => write!(f, "payment"),
            Self::Mining => write!(f, "mining"),
            Self::Message => write!(f, "message"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// A new account subscription, as created by a chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMonitoredAccount {
    pub chat_id: i64,
    pub user_name: String,
    pub account_id: String,
    pub account_rs: String,
    pub notify: NotifyFlags,
}

/// Incoming payment to the faucet account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Donation {
    pub account: String,
    pub account_rs: String,
    pub transaction_id: String,
    pub amount: Nqt,
}

/// Outgoing payment from the faucet account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaucetPayout {
    pub account: String,
    pub account_rs: String,
    pub transaction_id: String,
    pub amount: Nqt,
    pub fee: Nqt,
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Accounts with at least one notification flag set, in row order.
    async fn monitored_accounts(&self) -> Result<Vec<MonitoredAccount>, CoreError>;

    async fn update_watermark(
        &self,
        row_id: i64,
        kind: WatermarkKind,
        value: &str,
    ) -> Result<(), CoreError>;

    async fn record_donation(&self, donation: &Donation) -> Result<(), CoreError>;

    async fn record_faucet(&self, payout: &FaucetPayout) -> Result<(), CoreError>;

    /// Subscribe a chat to an account, or update the flags of an existing
    /// subscription. Returns the account row key.
    async fn register(&self, account: &NewMonitoredAccount) -> Result<i64, CoreError>;
}
