//! Shared test helpers for `signum-notify-core` unit tests.
//!
//! Builders for domain transactions (`ordinary_payment`, `multi_out`, ...)
//! plus converters to the node's JSON shape (`transactions_json`,
//! `account_json`) so mock replies and expected values come from one place.

use serde_json::{json, Map, Value};

use crate::types::{
    Attachment, Block, EncryptedMessage, MessageAppendix, MultiOutRecipient, Nqt, Transaction,
    ONE_SIGNA, SUBTYPE_ADD_COMMITMENT, SUBTYPE_ARBITRARY_MESSAGE, SUBTYPE_MULTI_OUT,
    SUBTYPE_MULTI_OUT_SAME, SUBTYPE_ORDINARY_PAYMENT, SUBTYPE_REMOVE_COMMITMENT,
    SUBTYPE_REWARD_RECIPIENT_ASSIGNMENT, TYPE_MESSAGING, TYPE_MINING, TYPE_PAYMENT,
};

/// Fee used by every fixture transaction: 0.00735 SIGNA.
pub const FIXTURE_FEE: Nqt = Nqt(735_000);

/// RS address of a numeric fixture account id.
pub fn rs(account: &str) -> String {
    format!("S-{account}")
}

// ==============================================================================
// Transaction Builders
// ==============================================================================

/// Build a transaction with sane defaults; the caller picks the payload.
pub fn make_tx(id: &str, tx_type: u8, subtype: u8, sender: &str, attachment: Attachment) -> Transaction {
    Transaction {
        id: id.to_owned(),
        tx_type,
        subtype,
        timestamp: 1_000,
        sender: sender.to_owned(),
        sender_rs: rs(sender),
        recipient: None,
        recipient_rs: None,
        amount: Nqt::ZERO,
        fee: FIXTURE_FEE,
        height: 100,
        attachment,
        message: None,
    }
}

fn with_recipient(mut tx: Transaction, recipient: &str) -> Transaction {
    tx.recipient = Some(recipient.to_owned());
    tx.recipient_rs = Some(rs(recipient));
    tx
}

pub fn ordinary_payment(id: &str, sender: &str, recipient: &str, amount: u64) -> Transaction {
    let mut tx = with_recipient(
        make_tx(id, TYPE_PAYMENT, SUBTYPE_ORDINARY_PAYMENT, sender, Attachment::OrdinaryPayment),
        recipient,
    );
    tx.amount = Nqt(amount);
    tx
}

pub fn multi_out(id: &str, sender: &str, recipients: &[(&str, u64)]) -> Transaction {
    let mut tx = make_tx(
        id,
        TYPE_PAYMENT,
        SUBTYPE_MULTI_OUT,
        sender,
        Attachment::MultiOut(
            recipients
                .iter()
                .map(|(recipient, amount)| MultiOutRecipient {
                    recipient: (*recipient).to_owned(),
                    amount: Nqt(*amount),
                })
                .collect(),
        ),
    );
    tx.amount = Nqt(recipients.iter().map(|(_, a)| a).sum());
    tx
}

pub fn multi_out_same(id: &str, sender: &str, recipients: &[&str], total: u64) -> Transaction {
    let mut tx = make_tx(
        id,
        TYPE_PAYMENT,
        SUBTYPE_MULTI_OUT_SAME,
        sender,
        Attachment::MultiOutSame(recipients.iter().map(|r| (*r).to_owned()).collect()),
    );
    tx.amount = Nqt(total);
    tx
}

pub fn arbitrary_message(id: &str, sender: &str, recipient: &str, text: &str) -> Transaction {
    with_text_message(
        with_recipient(
            make_tx(id, TYPE_MESSAGING, SUBTYPE_ARBITRARY_MESSAGE, sender, Attachment::ArbitraryMessage),
            recipient,
        ),
        text,
    )
}

pub fn reward_assignment(id: &str, sender: &str, recipient: &str) -> Transaction {
    with_recipient(
        make_tx(
            id,
            TYPE_MINING,
            SUBTYPE_REWARD_RECIPIENT_ASSIGNMENT,
            sender,
            Attachment::RewardRecipientAssignment,
        ),
        recipient,
    )
}

pub fn add_commitment(id: &str, sender: &str, signa: u64) -> Transaction {
    make_tx(
        id,
        TYPE_MINING,
        SUBTYPE_ADD_COMMITMENT,
        sender,
        Attachment::AddCommitment {
            amount: Nqt(signa * ONE_SIGNA),
        },
    )
}

pub fn remove_commitment(id: &str, sender: &str, signa: u64) -> Transaction {
    make_tx(
        id,
        TYPE_MINING,
        SUBTYPE_REMOVE_COMMITMENT,
        sender,
        Attachment::RemoveCommitment {
            amount: Nqt(signa * ONE_SIGNA),
        },
    )
}

pub fn with_text_message(mut tx: Transaction, text: &str) -> Transaction {
    tx.message = Some(MessageAppendix {
        is_text: true,
        text: Some(text.to_owned()),
        encrypted: None,
    });
    tx
}

pub fn with_encrypted_message(mut tx: Transaction) -> Transaction {
    tx.message = Some(MessageAppendix {
        is_text: false,
        text: None,
        encrypted: Some(EncryptedMessage {
            data: "00ff".into(),
            nonce: "aa".into(),
            is_text: true,
        }),
    });
    tx
}

pub fn make_block(id: &str, height: u64, generator: &str) -> Block {
    Block {
        id: id.to_owned(),
        height,
        timestamp: 0,
        reward: Nqt(100 * ONE_SIGNA),
        generator: generator.to_owned(),
        generator_rs: rs(generator),
    }
}

// ==============================================================================
// Node JSON
// ==============================================================================

/// A transaction in the shape `getTransaction` returns it.
pub fn tx_json(tx: &Transaction) -> Value {
    let mut attachment = Map::new();
    match &tx.attachment {
        Attachment::MultiOut(recipients) => {
            let pairs: Vec<[String; 2]> = recipients
                .iter()
                .map(|r| [r.recipient.clone(), r.amount.0.to_string()])
                .collect();
            attachment.insert("recipients".into(), json!(pairs));
        }
        Attachment::MultiOutSame(recipients) => {
            attachment.insert("recipients".into(), json!(recipients));
        }
        Attachment::AddCommitment { amount } | Attachment::RemoveCommitment { amount } => {
            attachment.insert("amountNQT".into(), json!(amount.0.to_string()));
        }
        _ => {}
    }
    if let Some(message) = &tx.message {
        if let Some(text) = &message.text {
            attachment.insert("message".into(), json!(text));
        }
        attachment.insert("messageIsText".into(), json!(message.is_text));
        if let Some(encrypted) = &message.encrypted {
            attachment.insert("encryptedMessage".into(), json!(encrypted));
        }
    }

    json!({
        "transaction": tx.id,
        "type": tx.tx_type,
        "subtype": tx.subtype,
        "timestamp": tx.timestamp,
        "sender": tx.sender,
        "senderRS": tx.sender_rs,
        "recipient": tx.recipient,
        "recipientRS": tx.recipient_rs,
        "amountNQT": tx.amount.0.to_string(),
        "feeNQT": tx.fee.0.to_string(),
        "height": tx.height,
        "attachment": attachment,
    })
}

/// A `getAccountTransactions` reply; `txs` is newest first.
pub fn transactions_json(txs: &[Transaction]) -> Value {
    json!({ "transactions": txs.iter().map(tx_json).collect::<Vec<_>>() })
}

/// A `getAccountBlocks` reply; `blocks` is newest first.
pub fn blocks_json(blocks: &[Block]) -> Value {
    let blocks: Vec<Value> = blocks
        .iter()
        .map(|b| {
            json!({
                "block": b.id,
                "height": b.height,
                "timestamp": b.timestamp,
                "blockReward": b.reward.to_string(),
                "generator": b.generator,
                "generatorRS": b.generator_rs,
            })
        })
        .collect();
    json!({ "blocks": blocks })
}

/// A `getAccount` reply with balances in whole SIGNA.
pub fn account_json(account: &str, name: Option<&str>, balance: u64, committed: u64) -> Value {
    json!({
        "account": account,
        "accountRS": rs(account),
        "name": name,
        "balanceNQT": (balance * ONE_SIGNA).to_string(),
        "unconfirmedBalanceNQT": (balance * ONE_SIGNA).to_string(),
        "committedBalanceNQT": (committed * ONE_SIGNA).to_string(),
    })
}
