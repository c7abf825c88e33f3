use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::types::Nqt;

use super::{
    Donation, FaucetPayout, MonitoredAccount, NewMonitoredAccount, NotifyFlags, WatermarkKind,
    WatermarkStore,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id INTEGER NOT NULL UNIQUE,
        user_name TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        account TEXT NOT NULL,
        account_rs TEXT NOT NULL,
        notify_incoming INTEGER NOT NULL DEFAULT 0,
        notify_outgoing INTEGER NOT NULL DEFAULT 0,
        notify_new_blocks INTEGER NOT NULL DEFAULT 0,
        notify_other INTEGER NOT NULL DEFAULT 0,
        last_payment_tx_id TEXT,
        last_mining_tx_id TEXT,
        last_message_tx_id TEXT,
        last_block_id TEXT,
        UNIQUE (user_id, account)
    );
    CREATE TABLE IF NOT EXISTS donations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account TEXT NOT NULL,
        account_rs TEXT NOT NULL,
        transaction_id TEXT NOT NULL,
        amount_nqt INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS faucets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account TEXT NOT NULL,
        account_rs TEXT NOT NULL,
        transaction_id TEXT NOT NULL,
        amount_nqt INTEGER NOT NULL,
        fee_nqt INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );
";

const MONITORED_ACCOUNTS: &str = "
    SELECT a.id, a.account, a.account_rs, u.chat_id, u.user_name,
           a.notify_incoming, a.notify_outgoing, a.notify_new_blocks, a.notify_other,
           a.last_payment_tx_id, a.last_mining_tx_id, a.last_message_tx_id, a.last_block_id
    FROM accounts a
    JOIN users u ON u.id = a.user_id
    WHERE a.notify_incoming OR a.notify_outgoing OR a.notify_new_blocks OR a.notify_other
    ORDER BY a.id
";

/// SQLite-backed store. Blocking calls run on the tokio blocking pool.
#[derive(Clone)]
pub struct SqliteWatermarkStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWatermarkStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::WatermarkStore(format!(
                    "create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "watermark store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, CoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, CoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| CoreError::WatermarkStore("connection lock poisoned".to_owned()))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| CoreError::WatermarkStore(format!("store task failed: {e}")))?
    }
}

fn nqt_column(amount: Nqt) -> Result<i64, CoreError> {
    i64::try_from(amount.0)
        .map_err(|_| CoreError::WatermarkStore(format!("amount {amount} exceeds column range")))
}

fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

fn monitored_from_row(row: &Row<'_>) -> rusqlite::Result<MonitoredAccount> {
    Ok(MonitoredAccount {
        id: row.get(0)?,
        account_id: row.get(1)?,
        account_rs: row.get(2)?,
        chat_id: row.get(3)?,
        user_name: row.get(4)?,
        notify: NotifyFlags {
            incoming: row.get(5)?,
            outgoing: row.get(6)?,
            new_blocks: row.get(7)?,
            other: row.get(8)?,
        },
        last_payment_tx_id: row.get(9)?,
        last_mining_tx_id: row.get(10)?,
        last_message_tx_id: row.get(11)?,
        last_block_id: row.get(12)?,
    })
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    async fn monitored_accounts(&self) -> Result<Vec<MonitoredAccount>, CoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(MONITORED_ACCOUNTS)?;
            let rows = stmt
                .query_map([], monitored_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn update_watermark(
        &self,
        row_id: i64,
        kind: WatermarkKind,
        value: &str,
    ) -> Result<(), CoreError> {
        let value = value.to_owned();
        self.with_conn(move |conn| {
            let sql = format!("UPDATE accounts SET {} = ?1 WHERE id = ?2", kind.column());
            let changed = conn.execute(&sql, params![value, row_id])?;
            if changed == 0 {
                return Err(CoreError::WatermarkStore(format!(
                    "no monitored account {row_id}"
                )));
            }
            debug!(row_id, %kind, watermark = %value, "watermark stored");
            Ok(())
        })
        .await
    }

    async fn record_donation(&self, donation: &Donation) -> Result<(), CoreError> {
        let donation = donation.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO donations (account, account_rs, transaction_id, amount_nqt, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    donation.account,
                    donation.account_rs,
                    donation.transaction_id,
                    nqt_column(donation.amount)?,
                    unix_now(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn record_faucet(&self, payout: &FaucetPayout) -> Result<(), CoreError> {
        let payout = payout.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO faucets (account, account_rs, transaction_id, amount_nqt, fee_nqt, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    payout.account,
                    payout.account_rs,
                    payout.transaction_id,
                    nqt_column(payout.amount)?,
                    nqt_column(payout.fee)?,
                    unix_now(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn register(&self, account: &NewMonitoredAccount) -> Result<i64, CoreError> {
        let account = account.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (chat_id, user_name) VALUES (?1, ?2)
                 ON CONFLICT (chat_id) DO UPDATE SET user_name = excluded.user_name",
                params![account.chat_id, account.user_name],
            )?;
            let user_id: i64 = tx.query_row(
                "SELECT id FROM users WHERE chat_id = ?1",
                params![account.chat_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO accounts (user_id, account, account_rs,
                     notify_incoming, notify_outgoing, notify_new_blocks, notify_other)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (user_id, account) DO UPDATE SET
                     account_rs = excluded.account_rs,
                     notify_incoming = excluded.notify_incoming,
                     notify_outgoing = excluded.notify_outgoing,
                     notify_new_blocks = excluded.notify_new_blocks,
                     notify_other = excluded.notify_other",
                params![
                    user_id,
                    account.account_id,
                    account.account_rs,
                    account.notify.incoming,
                    account.notify.outgoing,
                    account.notify.new_blocks,
                    account.notify.other,
                ],
            )?;
            let row_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM accounts WHERE user_id = ?1 AND account = ?2",
                    params![user_id, account.account_id],
                    |row| row.get(0),
                )
                .optional()?;
            tx.commit()?;
            row_id.ok_or_else(|| {
                CoreError::WatermarkStore(format!("account {} not stored", account.account_id))
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(chat_id: i64, account_id: &str, notify: NotifyFlags) -> NewMonitoredAccount {
        NewMonitoredAccount {
            chat_id,
            user_name: format!("user{chat_id}"),
            account_id: account_id.to_owned(),
            account_rs: format!("S-{account_id}"),
            notify,
        }
    }

    #[tokio::test]
    async fn register_and_list_only_flagged_accounts() {
        let store = SqliteWatermarkStore::open_in_memory().expect("open");
        let flagged = store
            .register(&subscription(10, "1", NotifyFlags::ALL))
            .await
            .expect("register");
        store
            .register(&subscription(10, "2", NotifyFlags::default()))
            .await
            .expect("register silent");

        let accounts = store.monitored_accounts().await.expect("list");
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, flagged);
        assert_eq!(accounts[0].chat_id, 10);
        assert_eq!(accounts[0].user_name, "user10");
        assert_eq!(accounts[0].notify, NotifyFlags::ALL);
        assert_eq!(accounts[0].last_payment_tx_id, None);
    }

    #[tokio::test]
    async fn re_register_updates_flags_in_place() {
        let store = SqliteWatermarkStore::open_in_memory().expect("open");
        let first = store
            .register(&subscription(10, "1", NotifyFlags::ALL))
            .await
            .expect("register");
        let flags = NotifyFlags {
            incoming: true,
            ..NotifyFlags::default()
        };
        let second = store
            .register(&subscription(10, "1", flags))
            .await
            .expect("re-register");

        assert_eq!(first, second);
        let accounts = store.monitored_accounts().await.expect("list");
        assert_eq!(accounts[0].notify, flags);
    }

    #[tokio::test]
    async fn watermarks_persist_per_kind() {
        let store = SqliteWatermarkStore::open_in_memory().expect("open");
        let id = store
            .register(&subscription(10, "1", NotifyFlags::ALL))
            .await
            .expect("register");

        store
            .update_watermark(id, WatermarkKind::Payment, "T2")
            .await
            .expect("payment");
        store
            .update_watermark(id, WatermarkKind::Block, "B9")
            .await
            .expect("block");

        let account = &store.monitored_accounts().await.expect("list")[0];
        assert_eq!(account.watermark(WatermarkKind::Payment), Some("T2"));
        assert_eq!(account.watermark(WatermarkKind::Block), Some("B9"));
        assert_eq!(account.watermark(WatermarkKind::Mining), None);

        let err = store
            .update_watermark(404, WatermarkKind::Payment, "x")
            .await
            .expect_err("unknown row");
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn donations_and_faucets_are_appended() {
        let store = SqliteWatermarkStore::open_in_memory().expect("open");
        store
            .record_donation(&Donation {
                account: "5".into(),
                account_rs: "S-5".into(),
                transaction_id: "T1".into(),
                amount: Nqt(100),
            })
            .await
            .expect("donation");
        store
            .record_faucet(&FaucetPayout {
                account: "6".into(),
                account_rs: "S-6".into(),
                transaction_id: "T2".into(),
                amount: Nqt(200),
                fee: Nqt(3),
            })
            .await
            .expect("faucet");

        let (donations, faucet_fee): (i64, i64) = store
            .with_conn(|conn| {
                let donations = conn.query_row("SELECT COUNT(*) FROM donations", [], |r| r.get(0))?;
                let fee = conn.query_row("SELECT fee_nqt FROM faucets", [], |r| r.get(0))?;
                Ok((donations, fee))
            })
            .await
            .expect("query");
        assert_eq!((donations, faucet_fee), (1, 3));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("signum-notify-{}", std::process::id()));
        let path = dir.join("watermarks.db");
        let _ = std::fs::remove_file(&path);

        let id = {
            let store = SqliteWatermarkStore::open(&path).expect("open");
            let id = store
                .register(&subscription(1, "9", NotifyFlags::ALL))
                .await
                .expect("register");
            store
                .update_watermark(id, WatermarkKind::Message, "M1")
                .await
                .expect("update");
            id
        };

        let reopened = SqliteWatermarkStore::open(&path).expect("reopen");
        let accounts = reopened.monitored_accounts().await.expect("list");
        assert_eq!(accounts[0].id, id);
        assert_eq!(accounts[0].watermark(WatermarkKind::Message), Some("M1"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
