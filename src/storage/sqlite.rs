//! SQLite store.
//!
//! Decimals are stored as text to keep them exact, the account history as a
//! JSON array, and timestamps as fixed-width RFC 3339 (millisecond, `Z`) so
//! that text comparison orders them correctly.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use super::AccountStore;
use crate::types::{Account, DepositReceipt, HistoryEntry, Wager};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        balance TEXT NOT NULL,
        energy INTEGER NOT NULL,
        level INTEGER NOT NULL,
        total_wins INTEGER NOT NULL,
        total_losses INTEGER NOT NULL,
        history TEXT NOT NULL,
        last_energy_refill TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS wagers (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        pair TEXT NOT NULL,
        direction TEXT NOT NULL,
        amount TEXT NOT NULL,
        open_price TEXT NOT NULL,
        opened_at TEXT NOT NULL,
        closes_at TEXT NOT NULL,
        status TEXT NOT NULL,
        close_price TEXT,
        resolved_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_wagers_status_closes ON wagers (status, closes_at)",
    "CREATE TABLE IF NOT EXISTS processed_payments (
        event_id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        amount TEXT NOT NULL,
        processed_at TEXT NOT NULL
    )",
];

const UPSERT_ACCOUNT: &str = "INSERT INTO accounts
        (id, username, balance, energy, level, total_wins, total_losses, history, last_energy_refill)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        username = excluded.username,
        balance = excluded.balance,
        energy = excluded.energy,
        level = excluded.level,
        total_wins = excluded.total_wins,
        total_losses = excluded.total_losses,
        history = excluded.history,
        last_energy_refill = excluded.last_energy_refill";

const UPSERT_WAGER: &str = "INSERT INTO wagers
        (id, account_id, pair, direction, amount, open_price, opened_at, closes_at, status, close_price, resolved_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        status = excluded.status,
        close_price = excluded.close_price,
        resolved_at = excluded.resolved_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a database URL such as `sqlite://tickbet.db` and
    /// create the schema if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to SQLite at {url}"))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(url, "SQLite store ready");
        Ok(store)
    }

    /// A private in-memory database on a single pinned connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite")?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("Failed to create SQLite schema")?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in store: {s}"))?
        .with_timezone(&Utc))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("Invalid decimal in store: {s}"))
}

fn account_from_row(row: &SqliteRow) -> Result<Account> {
    let history: String = row.try_get("history")?;
    let history: Vec<HistoryEntry> =
        serde_json::from_str(&history).context("Invalid account history JSON")?;

    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        balance: parse_decimal(&row.try_get::<String, _>("balance")?)?,
        energy: u32::try_from(row.try_get::<i64, _>("energy")?)?,
        level: u32::try_from(row.try_get::<i64, _>("level")?)?,
        total_wins: u64::try_from(row.try_get::<i64, _>("total_wins")?)?,
        total_losses: u64::try_from(row.try_get::<i64, _>("total_losses")?)?,
        history,
        last_energy_refill: parse_ts(&row.try_get::<String, _>("last_energy_refill")?)?,
    })
}

fn wager_from_row(row: &SqliteRow) -> Result<Wager> {
    let close_price: Option<String> = row.try_get("close_price")?;
    let resolved_at: Option<String> = row.try_get("resolved_at")?;

    Ok(Wager {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        pair: row.try_get("pair")?,
        direction: row.try_get::<String, _>("direction")?.parse()?,
        amount: parse_decimal(&row.try_get::<String, _>("amount")?)?,
        open_price: parse_decimal(&row.try_get::<String, _>("open_price")?)?,
        opened_at: parse_ts(&row.try_get::<String, _>("opened_at")?)?,
        closes_at: parse_ts(&row.try_get::<String, _>("closes_at")?)?,
        status: row.try_get::<String, _>("status")?.parse()?,
        close_price: close_price.as_deref().map(parse_decimal).transpose()?,
        resolved_at: resolved_at.as_deref().map(parse_ts).transpose()?,
    })
}

async fn upsert_account<'e, E>(executor: E, account: &Account) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let history = serde_json::to_string(&account.history).context("Failed to serialise history")?;
    sqlx::query(UPSERT_ACCOUNT)
        .bind(&account.id)
        .bind(&account.username)
        .bind(account.balance.to_string())
        .bind(i64::from(account.energy))
        .bind(i64::from(account.level))
        .bind(i64::try_from(account.total_wins)?)
        .bind(i64::try_from(account.total_losses)?)
        .bind(history)
        .bind(ts(account.last_energy_refill))
        .execute(executor)
        .await
        .with_context(|| format!("Failed to write account {}", account.id))?;
    Ok(())
}

async fn upsert_wager<'e, E>(executor: E, wager: &Wager) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(UPSERT_WAGER)
        .bind(&wager.id)
        .bind(&wager.account_id)
        .bind(&wager.pair)
        .bind(wager.direction.to_string())
        .bind(wager.amount.to_string())
        .bind(wager.open_price.to_string())
        .bind(ts(wager.opened_at))
        .bind(ts(wager.closes_at))
        .bind(wager.status.to_string())
        .bind(wager.close_price.map(|p| p.to_string()))
        .bind(wager.resolved_at.map(ts))
        .execute(executor)
        .await
        .with_context(|| format!("Failed to write wager {}", wager.id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// AccountStore
// ---------------------------------------------------------------------------

#[async_trait]
impl AccountStore for SqliteStore {
    async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read account {id}"))?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn create_account_if_absent(&self, account: Account) -> Result<(Account, bool)> {
        let history = serde_json::to_string(&account.history)?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO accounts
                (id, username, balance, energy, level, total_wins, total_losses, history, last_energy_refill)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.id)
        .bind(&account.username)
        .bind(account.balance.to_string())
        .bind(i64::from(account.energy))
        .bind(i64::from(account.level))
        .bind(i64::try_from(account.total_wins)?)
        .bind(i64::try_from(account.total_losses)?)
        .bind(history)
        .bind(ts(account.last_energy_refill))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create account {}", account.id))?
        .rows_affected()
            == 1;

        if inserted {
            return Ok((account, true));
        }

        let existing = self
            .get_account(&account.id)
            .await?
            .with_context(|| format!("Account {} vanished after insert conflict", account.id))?;
        Ok((existing, false))
    }

    async fn save_account(&self, account: &Account) -> Result<()> {
        upsert_account(&self.pool, account).await
    }

    async fn get_wager(&self, id: &str) -> Result<Option<Wager>> {
        let row = sqlx::query("SELECT * FROM wagers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read wager {id}"))?;
        row.as_ref().map(wager_from_row).transpose()
    }

    async fn record_open(&self, account: &Account, wager: &Wager) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        upsert_wager(&mut *tx, wager).await?;
        upsert_account(&mut *tx, account).await?;
        tx.commit().await.context("Failed to commit wager open")?;
        Ok(())
    }

    async fn record_resolution(&self, account: &Account, wager: &Wager) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        upsert_wager(&mut *tx, wager).await?;
        upsert_account(&mut *tx, account).await?;
        tx.commit().await.context("Failed to commit wager resolution")?;
        Ok(())
    }

    async fn due_wagers(&self, now: DateTime<Utc>) -> Result<Vec<Wager>> {
        let rows = sqlx::query(
            "SELECT * FROM wagers WHERE status = 'active' AND closes_at <= ? ORDER BY closes_at",
        )
        .bind(ts(now))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query due wagers")?;
        rows.iter().map(wager_from_row).collect()
    }

    async fn is_payment_processed(&self, event_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM processed_payments WHERE event_id = ?")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query payment ledger")?;
        Ok(row.is_some())
    }

    async fn record_deposit(&self, account: &Account, receipt: &DepositReceipt) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO processed_payments (event_id, account_id, amount, processed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&receipt.event_id)
        .bind(&receipt.account_id)
        .bind(receipt.amount.to_string())
        .bind(ts(receipt.processed_at))
        .execute(&mut *tx)
        .await
        .context("Failed to write payment ledger")?
        .rows_affected()
            == 1;

        if !inserted {
            tx.rollback().await.context("Failed to roll back duplicate deposit")?;
            return Ok(false);
        }

        upsert_account(&mut *tx, account).await?;
        tx.commit().await.context("Failed to commit deposit")?;
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
