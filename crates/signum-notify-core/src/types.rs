//! Domain types for Signum node responses.
//!
//! Amounts are integer NQT ([`Nqt`]); node responses carry them as decimal
//! strings. Transactions decode their attachment by `(type, subtype)` into
//! an [`Attachment`] variant, with the optional message appendix kept apart.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use tracing::warn;

use crate::error::CoreError;

// ==============================================================================
// Amounts
// ==============================================================================

/// NQT per SIGNA.
pub const ONE_SIGNA: u64 = 100_000_000;

const SIGNA_DECIMALS: usize = 8;

/// An amount in NQT, the smallest Signum unit (1 SIGNA = 10^8 NQT).
///
/// Deserializes from either a JSON number or a decimal string, since nodes
/// use both. Serializes as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nqt(pub u64);

impl Nqt {
    pub const ZERO: Nqt = Nqt(0);

    /// Convert a user-supplied SIGNA amount, rounding to the nearest NQT.
    pub fn from_signa(signa: f64) -> Result<Self, CoreError> {
        if !signa.is_finite() || signa < 0.0 {
            return Err(CoreError::InvalidData(format!(
                "invalid SIGNA amount {signa}"
            )));
        }
        let nqt = (signa * ONE_SIGNA as f64).round();
        if nqt >= u64::MAX as f64 {
            return Err(CoreError::InvalidData(format!(
                "SIGNA amount {signa} out of range"
            )));
        }
        Ok(Self(nqt as u64))
    }

    /// Parse a decimal SIGNA string such as `"132"` or `"0.0735"` exactly.
    pub fn parse_signa(text: &str) -> Result<Self, CoreError> {
        let text = text.trim();
        let invalid = || CoreError::InvalidData(format!("invalid SIGNA amount `{text}`"));
        let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > SIGNA_DECIMALS
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac: u64 = if frac.is_empty() {
            0
        } else {
            let scale = 10u64.pow((SIGNA_DECIMALS - frac.len()) as u32);
            frac.parse::<u64>().map_err(|_| invalid())? * scale
        };
        whole
            .checked_mul(ONE_SIGNA)
            .and_then(|n| n.checked_add(frac))
            .map(Self)
            .ok_or_else(invalid)
    }

    pub fn to_signa(self) -> f64 {
        self.0 as f64 / ONE_SIGNA as f64
    }

    pub fn saturating_add(self, other: Nqt) -> Nqt {
        Nqt(self.0.saturating_add(other.0))
    }

    pub fn checked_div(self, divisor: u64) -> Option<Nqt> {
        self.0.checked_div(divisor).map(Nqt)
    }
}

/// Exact SIGNA rendering with trailing fractional zeros trimmed.
impl std::fmt::Display for Nqt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / ONE_SIGNA;
        let frac = self.0 % ONE_SIGNA;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:08}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for Nqt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Nqt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_u64(deserializer).map(Nqt)
    }
}

/// Accept a `u64` written as a JSON number or a decimal string.
fn deserialize_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid integer `{s}`: {e}"))),
    }
}

/// `blockReward` is reported in whole SIGNA, as a string or number.
fn deserialize_signa<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Nqt, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Nqt::parse_signa(&s).map_err(D::Error::custom),
        serde_json::Value::Number(n) => Nqt::parse_signa(&n.to_string()).map_err(D::Error::custom),
        serde_json::Value::Null => Ok(Nqt::ZERO),
        other => Err(D::Error::custom(format!("invalid SIGNA amount {other}"))),
    }
}

// ==============================================================================
// Secrets
// ==============================================================================

/// An account passphrase. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretPhrase(String);

impl SecretPhrase {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self(phrase.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretPhrase(***)")
    }
}

// ==============================================================================
// Accounts
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub account: String,
    #[serde(rename = "accountRS", default)]
    pub account_rs: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "balanceNQT", default)]
    pub total_balance: Nqt,
    #[serde(rename = "unconfirmedBalanceNQT", default)]
    pub unconfirmed_balance: Nqt,
    #[serde(rename = "committedBalanceNQT", default)]
    pub committed_balance: Nqt,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub last_activity_height: Option<u64>,
}

impl Account {
    /// The account's display name, if it has a non-blank one.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountId {
    pub account: String,
    #[serde(rename = "accountRS")]
    pub account_rs: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRecipient {
    pub reward_recipient: String,
}

// ==============================================================================
// Transactions
// ==============================================================================

pub const TYPE_PAYMENT: u8 = 0;
pub const TYPE_MESSAGING: u8 = 1;
pub const TYPE_MINING: u8 = 20;

pub const SUBTYPE_ORDINARY_PAYMENT: u8 = 0;
pub const SUBTYPE_MULTI_OUT: u8 = 1;
pub const SUBTYPE_MULTI_OUT_SAME: u8 = 2;
pub const SUBTYPE_ARBITRARY_MESSAGE: u8 = 0;
pub const SUBTYPE_REWARD_RECIPIENT_ASSIGNMENT: u8 = 0;
pub const SUBTYPE_ADD_COMMITMENT: u8 = 1;
pub const SUBTYPE_REMOVE_COMMITMENT: u8 = 2;

/// Which slice of an account's history to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionFilter {
    pub tx_type: u8,
    pub subtype: Option<u8>,
}

impl TransactionFilter {
    pub const PAYMENTS: Self = Self {
        tx_type: TYPE_PAYMENT,
        subtype: None,
    };
    pub const MINING: Self = Self {
        tx_type: TYPE_MINING,
        subtype: None,
    };
    pub const MESSAGES: Self = Self {
        tx_type: TYPE_MESSAGING,
        subtype: Some(SUBTYPE_ARBITRARY_MESSAGE),
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiOutRecipient {
    pub recipient: String,
    pub amount: Nqt,
}

/// Subtype-specific transaction payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Attachment {
    OrdinaryPayment,
    MultiOut(Vec<MultiOutRecipient>),
    /// Recipients of an equal split; the total is the parent's `amount`.
    MultiOutSame(Vec<String>),
    ArbitraryMessage,
    RewardRecipientAssignment,
    AddCommitment { amount: Nqt },
    RemoveCommitment { amount: Nqt },
    Other { tx_type: u8, subtype: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    pub data: String,
    pub nonce: String,
    #[serde(default)]
    pub is_text: bool,
}

/// Plain or encrypted message attached to a transaction of any type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageAppendix {
    pub is_text: bool,
    pub text: Option<String>,
    pub encrypted: Option<EncryptedMessage>,
}

impl MessageAppendix {
    /// Readable text, when the appendix is a non-empty plain text message.
    pub fn plain_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| self.is_text && !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireTransaction")]
pub struct Transaction {
    pub id: String,
    pub tx_type: u8,
    pub subtype: u8,
    pub timestamp: u64,
    pub sender: String,
    pub sender_rs: String,
    pub recipient: Option<String>,
    pub recipient_rs: Option<String>,
    pub amount: Nqt,
    pub fee: Nqt,
    pub height: u64,
    pub attachment: Attachment,
    pub message: Option<MessageAppendix>,
}

impl Transaction {
    /// Income is anything this account did not send.
    pub fn is_income_for(&self, account_id: &str) -> bool {
        self.sender != account_id
    }

    /// Number of recipients of a multi-out payment.
    pub fn recipient_count(&self) -> usize {
        match &self.attachment {
            Attachment::MultiOut(recipients) => recipients.len(),
            Attachment::MultiOutSame(recipients) => recipients.len(),
            _ => usize::from(self.recipient.is_some()),
        }
    }

    /// The part of this transaction paid to `account_id`.
    pub fn income_for(&self, account_id: &str) -> Nqt {
        match &self.attachment {
            Attachment::MultiOut(recipients) => recipients
                .iter()
                .filter(|r| r.recipient == account_id)
                .fold(Nqt::ZERO, |sum, r| sum.saturating_add(r.amount)),
            Attachment::MultiOutSame(recipients) => self
                .amount
                .checked_div(recipients.len() as u64)
                .unwrap_or(Nqt::ZERO),
            _ => self.amount,
        }
    }
}

#[derive(Deserialize)]
struct WireTransaction {
    #[serde(rename = "transaction")]
    id: String,
    #[serde(rename = "type")]
    tx_type: u8,
    subtype: u8,
    #[serde(default)]
    timestamp: u64,
    sender: String,
    #[serde(rename = "senderRS")]
    sender_rs: String,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(rename = "recipientRS", default)]
    recipient_rs: Option<String>,
    #[serde(rename = "amountNQT", default)]
    amount: Nqt,
    #[serde(rename = "feeNQT", default)]
    fee: Nqt,
    #[serde(default)]
    height: u64,
    #[serde(default)]
    attachment: Option<WireAttachment>,
}

#[derive(Default, Deserialize)]
struct WireAttachment {
    #[serde(default)]
    recipients: Option<serde_json::Value>,
    #[serde(rename = "amountNQT", default)]
    amount: Option<Nqt>,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "messageIsText", default)]
    message_is_text: bool,
    #[serde(rename = "encryptedMessage", default)]
    encrypted_message: Option<EncryptedMessage>,
}

impl From<WireTransaction> for Transaction {
    /// A malformed attachment does not fail the page it arrived in: the
    /// transaction is kept as [`Attachment::Other`] so watermarks still move.
    fn from(wire: WireTransaction) -> Self {
        let raw = wire.attachment.unwrap_or_default();
        let attachment = decode_attachment(wire.tx_type, wire.subtype, &raw).unwrap_or_else(|reason| {
            warn!(
                transaction = %wire.id,
                tx_type = wire.tx_type,
                subtype = wire.subtype,
                %reason,
                "malformed attachment, treating transaction as unknown"
            );
            Attachment::Other {
                tx_type: wire.tx_type,
                subtype: wire.subtype,
            }
        });

        let message = (raw.message.is_some() || raw.encrypted_message.is_some()).then(|| {
            MessageAppendix {
                is_text: raw.message_is_text,
                text: raw.message,
                encrypted: raw.encrypted_message,
            }
        });

        Self {
            id: wire.id,
            tx_type: wire.tx_type,
            subtype: wire.subtype,
            timestamp: wire.timestamp,
            sender: wire.sender,
            sender_rs: wire.sender_rs,
            recipient: wire.recipient,
            recipient_rs: wire.recipient_rs,
            amount: wire.amount,
            fee: wire.fee,
            height: wire.height,
            attachment,
            message,
        }
    }
}

fn decode_attachment(tx_type: u8, subtype: u8, raw: &WireAttachment) -> Result<Attachment, String> {
    let attachment = match (tx_type, subtype) {
        (TYPE_PAYMENT, SUBTYPE_ORDINARY_PAYMENT) => Attachment::OrdinaryPayment,
        (TYPE_PAYMENT, SUBTYPE_MULTI_OUT) => {
            let pairs: Vec<(String, Nqt)> = decode_recipients(raw.recipients.as_ref())?;
            Attachment::MultiOut(
                pairs
                    .into_iter()
                    .map(|(recipient, amount)| MultiOutRecipient { recipient, amount })
                    .collect(),
            )
        }
        (TYPE_PAYMENT, SUBTYPE_MULTI_OUT_SAME) => {
            Attachment::MultiOutSame(decode_recipients(raw.recipients.as_ref())?)
        }
        (TYPE_MESSAGING, SUBTYPE_ARBITRARY_MESSAGE) => Attachment::ArbitraryMessage,
        (TYPE_MINING, SUBTYPE_REWARD_RECIPIENT_ASSIGNMENT) => Attachment::RewardRecipientAssignment,
        (TYPE_MINING, SUBTYPE_ADD_COMMITMENT) => Attachment::AddCommitment {
            amount: raw.amount.ok_or("commitment without amountNQT")?,
        },
        (TYPE_MINING, SUBTYPE_REMOVE_COMMITMENT) => Attachment::RemoveCommitment {
            amount: raw.amount.ok_or("commitment without amountNQT")?,
        },
        (tx_type, subtype) => Attachment::Other { tx_type, subtype },
    };
    Ok(attachment)
}

fn decode_recipients<T: serde::de::DeserializeOwned>(value: Option<&serde_json::Value>) -> Result<T, String> {
    let value = value.ok_or("multi-out without recipients")?;
    T::deserialize(value).map_err(|e| format!("malformed multi-out recipients: {e}"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountTransactions {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

// ==============================================================================
// Blocks and Chain State
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "block")]
    pub id: String,
    pub height: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(rename = "blockReward", default, deserialize_with = "deserialize_signa")]
    pub reward: Nqt,
    #[serde(default)]
    pub generator: String,
    #[serde(rename = "generatorRS", default)]
    pub generator_rs: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountBlocks {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainStatus {
    #[serde(deserialize_with = "deserialize_u64")]
    pub number_of_blocks: u64,
    #[serde(default)]
    pub last_block: String,
    #[serde(default)]
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningInfo {
    #[serde(deserialize_with = "deserialize_u64")]
    pub height: u64,
    #[serde(deserialize_with = "deserialize_u64")]
    pub base_target: u64,
    #[serde(default)]
    pub generation_signature: String,
    #[serde(rename = "averageCommitmentNQT", default)]
    pub average_commitment: Nqt,
}

/// Fee suggestions in NQT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SuggestedFee {
    pub cheap: Nqt,
    pub standard: Nqt,
    pub priority: Nqt,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub full_hash: Option<String>,
    #[serde(default)]
    pub broadcasted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub message_is_text: bool,
    #[serde(default)]
    pub decrypted_message: Option<String>,
    #[serde(default)]
    pub decrypted_message_is_text: bool,
}
