//! Chat message bodies.
//!
//! Bodies use the `<b>`, `<i>` and `<code>` tags of chat HTML markup; any
//! text that comes from chain users (names, messages) is escaped.

use std::fmt::Write as _;

use time::OffsetDateTime;

use crate::types::{Attachment, Block, Nqt, Transaction, ONE_SIGNA};

/// Unix time of the Signum genesis block (2014-08-11 02:00:00 UTC).
pub const CHAIN_EPOCH_UNIX: i64 = 1_407_722_400;

/// Messages longer than this many characters are cut in payment notices.
const MESSAGE_PREVIEW_CHARS: usize = 32;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// SIGNA rounded to two decimals, thousands grouped, zero decimals trimmed.
pub fn format_signa(amount: Nqt) -> String {
    const NQT_PER_CENT: u64 = ONE_SIGNA / 100;
    let cents = amount.0 / NQT_PER_CENT + u64::from(amount.0 % NQT_PER_CENT >= NQT_PER_CENT / 2);
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    match frac {
        0 => {}
        f if f % 10 == 0 => {
            let _ = write!(out, ".{}", f / 10);
        }
        f => {
            let _ = write!(out, ".{f:02}");
        }
    }
    out
}

/// Chain timestamp (seconds since genesis) as a UTC date and time.
pub fn chain_time(timestamp: u64) -> String {
    let unix = i64::try_from(timestamp)
        .ok()
        .and_then(|t| t.checked_add(CHAIN_EPOCH_UNIX));
    match unix.and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok()) {
        Some(at) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
            at.year(),
            u8::from(at.month()),
            at.day(),
            at.hour(),
            at.minute(),
            at.second()
        ),
        None => format!("chain time {timestamp}"),
    }
}

fn message_preview(text: &str) -> String {
    if text.chars().count() <= MESSAGE_PREVIEW_CHARS {
        return escape_html(text);
    }
    let cut: String = text
        .chars()
        .take(MESSAGE_PREVIEW_CHARS)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    format!("{}...", escape_html(&cut))
}

/// The `Message:` line of a payment notice, if the payment carries one.
fn payment_message_line(tx: &Transaction) -> String {
    let Some(message) = &tx.message else {
        return String::new();
    };
    if let Some(text) = message.plain_text() {
        format!("\n<i>Message:</i> {}", message_preview(text))
    } else if message.encrypted.is_some() {
        "\n<i>Message:</i> [encrypted]".to_owned()
    } else {
        String::new()
    }
}

fn name_line(name: Option<&str>) -> String {
    name.map(|n| format!("\n<i>Name:</i> {}", escape_html(n)))
        .unwrap_or_default()
}

pub fn total_balance_line(balance: Nqt) -> String {
    format!("\n<b>Total balance: {} SIGNA</b>", format_signa(balance))
}

pub fn total_commitment_line(committed: Nqt) -> String {
    format!("\n<b>Total commitment: {} SIGNA</b>", format_signa(committed))
}

/// A rendered payment notice and the amount it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotice {
    pub body: String,
    pub amount: Nqt,
}

/// Render a payment seen by `account_id`. `None` for payment subtypes
/// without a notice format.
pub fn payment(
    account_rs: &str,
    account_id: &str,
    tx: &Transaction,
    income: bool,
    counterpart_name: Option<&str>,
) -> Option<PaymentNotice> {
    let kind = match tx.attachment {
        Attachment::OrdinaryPayment => "Ordinary",
        Attachment::MultiOut(_) => "Multi-out",
        Attachment::MultiOutSame(_) => "Multi-out same",
        _ => return None,
    };
    let message = payment_message_line(tx);

    let (amount, mut body) = if income {
        let amount = tx.income_for(account_id);
        let body = format!(
            "💸 <b>{account_rs}</b> new income:\n<i>Payment:</i> {kind}\n<i>Sender:</i> {}{}\n<i>Amount:</i> +{} SIGNA",
            tx.sender_rs,
            name_line(counterpart_name),
            format_signa(amount),
        );
        (amount, body)
    } else {
        let counterpart = match tx.attachment {
            Attachment::OrdinaryPayment => format!(
                "\n<i>Recipient:</i> {}{}",
                tx.recipient_rs.as_deref().unwrap_or("unknown"),
                name_line(counterpart_name),
            ),
            _ => format!("\n<i>Recipients:</i> {}", tx.recipient_count()),
        };
        let body = format!(
            "💸 <b>{account_rs}</b> new outgo:\n<i>Payment:</i> {kind}{counterpart}\n<i>Amount:</i> -{} SIGNA",
            format_signa(tx.amount),
        );
        (tx.amount, body)
    };

    body.push_str(&message);
    let _ = write!(body, "\n<i>Fee:</i> {} SIGNA", tx.fee);
    Some(PaymentNotice { body, amount })
}

/// Render a mining transaction (reward recipient or commitment change).
pub fn mining(account_rs: &str, tx: &Transaction, recipient_name: Option<&str>) -> Option<String> {
    let detail = match &tx.attachment {
        Attachment::RewardRecipientAssignment => format!(
            "new recipient assigned:\n<i>Recipient:</i> {}{}",
            tx.recipient_rs.as_deref().unwrap_or("unknown"),
            name_line(recipient_name),
        ),
        Attachment::AddCommitment { amount } => format!(
            "new commitment added:\n<i>Amount:</i> +{} SIGNA",
            format_signa(*amount)
        ),
        Attachment::RemoveCommitment { amount } => format!(
            "commitment revoked:\n<i>Amount:</i> -{} SIGNA",
            format_signa(*amount)
        ),
        _ => return None,
    };
    Some(format!(
        "📝 <b>{account_rs}</b> {detail}\n<i>Fee:</i> {} SIGNA",
        tx.fee
    ))
}

/// Render an arbitrary message sent or received by the account.
pub fn message(
    account_rs: &str,
    tx: &Transaction,
    income: bool,
    counterpart_name: Option<&str>,
) -> Option<String> {
    if tx.attachment != Attachment::ArbitraryMessage {
        return None;
    }
    let text = tx
        .message
        .as_ref()
        .and_then(|m| m.plain_text())
        .map(escape_html)
        .unwrap_or_else(|| "[encrypted]".to_owned());

    let header = if income {
        format!("new message received:\n<i>Sender:</i> {}", tx.sender_rs)
    } else {
        format!(
            "new message sent:\n<i>Recipient:</i> {}",
            tx.recipient_rs.as_deref().unwrap_or("unknown")
        )
    };
    Some(format!(
        "📝 <b>{account_rs}</b> {header}{}\n<i>Message:</i> {text}\n<i>Fee:</i> {} SIGNA",
        name_line(counterpart_name),
        tx.fee
    ))
}

pub fn block(account_rs: &str, block: &Block) -> String {
    format!(
        "💽 <b>{account_rs}</b> new block at {} <b>#{}</b> ({} SIGNA)",
        chain_time(block.timestamp),
        block.height,
        block.reward
    )
}
